use crate::core::cluster::Cluster;
use crate::domain::model::Transaction;
use crate::domain::node::{Node, NodeState};
use crate::utils::error::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub source: String,
    pub target: String,
    pub partition_duration_ms: f64,
    pub balances_copied: usize,
    /// Ledger entries appended to the target, then to the source.
    pub entries_to_target: usize,
    pub entries_to_source: usize,
    /// Queued payments the master committed or failed during this sync.
    pub payments_settled: usize,
}

#[derive(Debug, Clone)]
struct ActivePartition {
    a: String,
    b: String,
    started_at_ms: f64,
}

/// Cuts and heals links between two nodes and reconciles them afterwards.
pub struct PartitionSimulator {
    sync_delay_ms: f64,
    active: Option<ActivePartition>,
}

impl PartitionSimulator {
    pub fn new(sync_delay_ms: f64) -> Self {
        Self {
            sync_delay_ms,
            active: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn create_partition(&mut self, cluster: &mut Cluster, a: &str, b: &str) -> Result<()> {
        tracing::info!("[PartitionSim] Creating partition between {} and {}", a, b);

        // resolve both ids before touching anything
        cluster.node(a)?;
        cluster.node(b)?;

        cluster.network.simulate_partition(a, b);
        for (node_id, peer) in [(a, b), (b, a)] {
            let node = cluster.node_mut(node_id)?;
            node.can_reach.insert(peer.to_string(), false);
            node.state = NodeState::Isolated;
        }

        self.active = Some(ActivePartition {
            a: a.to_string(),
            b: b.to_string(),
            started_at_ms: cluster.now_ms(),
        });

        tracing::warn!("[PartitionSim] {} and {} are now ISOLATED", a, b);
        Ok(())
    }

    pub async fn heal_partition(
        &mut self,
        cluster: &mut Cluster,
        a: &str,
        b: &str,
    ) -> Result<SyncReport> {
        tracing::info!("[PartitionSim] Healing partition between {} and {}", a, b);

        cluster.node(a)?;
        cluster.node(b)?;

        cluster.network.heal_partition(a, b);
        for (node_id, peer) in [(a, b), (b, a)] {
            let node = cluster.node_mut(node_id)?;
            node.can_reach.insert(peer.to_string(), true);
            node.state = NodeState::Healthy;
        }

        let started_at_ms = match self.active.take() {
            Some(active) if same_pair(&active, a, b) => Some(active.started_at_ms),
            other => {
                self.active = other;
                None
            }
        };
        let duration = started_at_ms
            .map(|start| cluster.clock.since(start))
            .unwrap_or(0.0);

        tracing::info!(
            "[PartitionSim] Partition healed after {:.1} seconds, synchronizing",
            duration / 1000.0
        );

        let mut report = self.synchronize(cluster, a, b).await?;
        report.partition_duration_ms = duration;

        tracing::info!(
            "[PartitionSim] Nodes synchronized ({} balances, {}+{} ledger entries)",
            report.balances_copied,
            report.entries_to_target,
            report.entries_to_source
        );
        Ok(report)
    }

    /// Master wins when one side is the master; otherwise the longer ledger.
    async fn synchronize(&self, cluster: &mut Cluster, a: &str, b: &str) -> Result<SyncReport> {
        cluster.advance(self.sync_delay_ms).await;

        let (source_id, target_id) = {
            let node_a = cluster.node(a)?;
            let node_b = cluster.node(b)?;
            if node_b.is_master()
                || (!node_a.is_master() && node_b.transactions.len() > node_a.transactions.len())
            {
                (b, a)
            } else {
                (a, b)
            }
        };

        let target_snapshot = cluster.node(target_id)?.clone();
        let at = cluster.now();

        let mut missing_on_source: Vec<Transaction> = {
            let source = cluster.node(source_id)?;
            target_snapshot
                .transactions
                .iter()
                .filter(|entry| !source.has_transaction(&entry.transaction.transaction_id))
                .map(|entry| entry.transaction.clone())
                .collect()
        };

        let source_node = cluster.node_mut(source_id)?;
        let mut settled = Vec::new();
        if source_node.is_master() {
            tracing::debug!("[PartitionSim]   Settling queued payments...");
            for transaction in missing_on_source.iter_mut().filter(|tx| tx.is_queued()) {
                settle_queued_payment(source_node, transaction, at);
                settled.push(transaction.clone());
            }
        }
        for transaction in &missing_on_source {
            source_node.add_transaction(transaction, at);
        }
        source_node.clear_cache();
        let source = source_node.clone();

        tracing::debug!("[PartitionSim]   Syncing accounts...");
        let target = cluster.node_mut(target_id)?;
        for (user_id, balance) in &source.accounts {
            target.set_balance(user_id, *balance);
        }

        tracing::debug!("[PartitionSim]   Syncing transactions...");
        let missing_on_target: Vec<_> = source
            .transactions
            .iter()
            .filter(|entry| !target_snapshot.has_transaction(&entry.transaction.transaction_id))
            .map(|entry| entry.transaction.clone())
            .collect();
        for transaction in &missing_on_target {
            target.add_transaction(transaction, at);
        }
        for transaction in &settled {
            target.update_transaction(transaction);
        }

        tracing::debug!("[PartitionSim]   Invalidating caches...");
        target.clear_cache();

        Ok(SyncReport {
            source: source_id.to_string(),
            target: target_id.to_string(),
            partition_duration_ms: 0.0,
            balances_copied: source.accounts.len(),
            entries_to_target: missing_on_target.len(),
            entries_to_source: missing_on_source.len(),
            payments_settled: settled.len(),
        })
    }

    /// Create, hold for `duration_ms` of simulated time, then heal.
    pub async fn simulate_partition_scenario(
        &mut self,
        cluster: &mut Cluster,
        a: &str,
        b: &str,
        duration_ms: f64,
    ) -> Result<SyncReport> {
        tracing::info!(
            "[PartitionSim] Starting partition scenario ({:.1}s)",
            duration_ms / 1000.0
        );
        self.create_partition(cluster, a, b)?;
        cluster.advance(duration_ms).await;
        let report = self.heal_partition(cluster, a, b).await?;
        tracing::info!("[PartitionSim] Scenario complete");
        Ok(report)
    }
}

/// Debit the master for a payment queued offline. Without funds the
/// payment fails and nothing moves.
fn settle_queued_payment(master: &mut Node, transaction: &mut Transaction, at: DateTime<Utc>) {
    match master.accounts.get(&transaction.from_user).copied() {
        Some(balance) if balance >= transaction.amount => {
            master.set_balance(&transaction.from_user, balance - transaction.amount);
            transaction.mark_committed(at);
            tracing::info!(
                "[PartitionSim]   {} settled on {}",
                transaction.transaction_id,
                master.id
            );
        }
        _ => {
            transaction.mark_failed("Insufficient balance", at);
            tracing::warn!(
                "[PartitionSim]   {} rejected on {}: insufficient balance",
                transaction.transaction_id,
                master.id
            );
        }
    }
}

fn same_pair(active: &ActivePartition, a: &str, b: &str) -> bool {
    (active.a == a && active.b == b) || (active.a == b && active.b == a)
}
