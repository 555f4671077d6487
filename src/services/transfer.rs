use crate::core::cluster::Cluster;
use crate::core::network::MessageKind;
use crate::domain::model::{Amount, OperationResult, ResultPayload, Transaction, TransactionType};
use crate::services::track;
use crate::utils::error::Result;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferStatistics {
    pub total_transfers: usize,
    pub successful: usize,
    pub aborted: usize,
    pub success_rate: f64,
}

enum PrepareOutcome {
    Prepared,
    Rejected(Vec<String>),
    TimedOut,
}

/// Peer-to-peer transfers coordinated by the master with two-phase commit.
pub struct TransferService {
    timeout_ms: f64,
    heartbeat_staleness_ms: f64,
    committed: BTreeMap<String, Transaction>,
    aborted: BTreeMap<String, Transaction>,
}

impl TransferService {
    pub fn new(timeout_ms: f64, heartbeat_staleness_ms: f64) -> Self {
        Self {
            timeout_ms,
            heartbeat_staleness_ms,
            committed: BTreeMap::new(),
            aborted: BTreeMap::new(),
        }
    }

    pub async fn transfer(
        &mut self,
        cluster: &mut Cluster,
        from_user: &str,
        to_user: &str,
        amount: Amount,
    ) -> Result<OperationResult> {
        let started = cluster.now_ms();
        let tx_id = cluster.next_id("TX");
        let mut transaction = Transaction::new(
            tx_id.clone(),
            TransactionType::Transfer,
            from_user,
            Some(to_user),
            amount,
            cluster.now(),
        );
        tracing::info!(
            "[Transfer] Starting {}: {} -> {} : {} FCFA",
            tx_id,
            from_user,
            to_user,
            amount
        );

        let master_id = cluster.master_id().to_string();

        if !self.pre_checks(cluster, &transaction)? {
            let result = self.abort(cluster, transaction, "Pre-checks failed", started);
            track(cluster, &master_id, &result)?;
            return Ok(result);
        }

        match self.prepare_phase(cluster, &transaction).await? {
            PrepareOutcome::Prepared => transaction.mark_prepared(),
            PrepareOutcome::Rejected(voters) => {
                tracing::warn!("[Transfer] PREPARE failed (NO votes from: {:?})", voters);
                let result = self.abort(cluster, transaction, "Prepare phase failed", started);
                track(cluster, &master_id, &result)?;
                return Ok(result);
            }
            PrepareOutcome::TimedOut => {
                let result = self.abort(
                    cluster,
                    transaction,
                    "Timeout: Prepare phase timeout",
                    started,
                );
                track(cluster, &master_id, &result)?;
                return Ok(result);
            }
        }

        self.commit_phase(cluster, &mut transaction).await?;

        let latency = cluster.clock.since(started);
        let master = cluster.node(&master_id)?;
        let payload = ResultPayload::Transfer {
            new_balance_from: master.accounts.get(from_user).copied(),
            new_balance_to: master.accounts.get(to_user).copied(),
        };
        tracing::info!("[Transfer] {} COMMITTED in {:.0}ms", tx_id, latency);
        self.committed.insert(tx_id.clone(), transaction);

        let result = OperationResult::succeeded(latency)
            .with_transaction(tx_id)
            .with_payload(payload);
        track(cluster, &master_id, &result)?;
        Ok(result)
    }

    fn pre_checks(&self, cluster: &mut Cluster, transaction: &Transaction) -> Result<bool> {
        let now = cluster.now_ms();
        let master = cluster.master_mut()?;

        if transaction.amount <= 0 {
            tracing::warn!("[Transfer] Invalid amount: {}", transaction.amount);
            return Ok(false);
        }

        let Some(balance) = master.get_balance(&transaction.from_user, false, now) else {
            tracing::warn!("[Transfer] Account {} not found", transaction.from_user);
            return Ok(false);
        };
        if balance < transaction.amount {
            tracing::warn!(
                "[Transfer] Insufficient balance: {} < {}",
                balance,
                transaction.amount
            );
            return Ok(false);
        }

        let receiver = transaction.to_user.as_deref().unwrap_or_default();
        if receiver == transaction.from_user {
            tracing::warn!("[Transfer] Sender and receiver are the same account");
            return Ok(false);
        }
        if master.get_balance(receiver, false, now).is_none() {
            tracing::warn!("[Transfer] Destination account {} not found", receiver);
            return Ok(false);
        }

        tracing::debug!("[Transfer] Pre-checks passed");
        Ok(true)
    }

    /// Every node must vote YES. Delivered PREPAREs double as heartbeats.
    async fn prepare_phase(
        &self,
        cluster: &mut Cluster,
        transaction: &Transaction,
    ) -> Result<PrepareOutcome> {
        tracing::debug!("[Transfer] PHASE 1: PREPARE");
        let started = cluster.now_ms();
        let master_id = cluster.master_id().to_string();

        let mut participants = vec![master_id.clone()];
        participants.extend(cluster.replica_ids());

        let mut no_voters = Vec::new();
        for node_id in participants {
            if cluster.clock.since(started) > self.timeout_ms {
                tracing::warn!("[Transfer] PREPARE timeout after {}ms", self.timeout_ms);
                return Ok(PrepareOutcome::TimedOut);
            }

            let delivered = cluster
                .send(&master_id, &node_id, MessageKind::Prepare)
                .await;
            if delivered.is_none() {
                tracing::debug!("[Transfer]   {} unreachable, voting NO", node_id);
                no_voters.push(node_id);
                continue;
            }

            let now = cluster.now_ms();
            let node = cluster.node_mut(&node_id)?;
            node.record_heartbeat(now);
            let mut vote = node.is_healthy(now, self.heartbeat_staleness_ms);
            if vote && node.is_master() {
                vote = node
                    .get_balance(&transaction.from_user, false, now)
                    .is_some_and(|balance| balance >= transaction.amount);
            }

            tracing::debug!(
                "[Transfer]   {} voted {}",
                node_id,
                if vote { "YES" } else { "NO" }
            );
            if !vote {
                no_voters.push(node_id);
            }
        }

        if no_voters.is_empty() {
            tracing::debug!("[Transfer] PREPARE successful (all voted YES)");
            Ok(PrepareOutcome::Prepared)
        } else {
            Ok(PrepareOutcome::Rejected(no_voters))
        }
    }

    /// Master applies first; replicas that miss the COMMIT catch up on heal.
    async fn commit_phase(&self, cluster: &mut Cluster, transaction: &mut Transaction) -> Result<()> {
        tracing::debug!("[Transfer] PHASE 2: COMMIT");
        let started = cluster.now_ms();
        let now = cluster.now_ms();
        let at = cluster.now();
        let master_id = cluster.master_id().to_string();
        let from_user = transaction.from_user.clone();
        let to_user = transaction.to_user.clone().unwrap_or_default();
        let amount = transaction.amount;

        transaction.mark_committed(at);

        let master = cluster.master_mut()?;
        let from_before = master.get_balance(&from_user, false, now).unwrap_or_default();
        let to_before = master.get_balance(&to_user, false, now).unwrap_or_default();
        master.set_balance(&from_user, from_before - amount);
        master.set_balance(&to_user, to_before + amount);
        master.add_transaction(transaction, at);
        tracing::debug!(
            "[Transfer]   MASTER committed ({}: {} -> {}, {}: {} -> {})",
            from_user,
            from_before,
            from_before - amount,
            to_user,
            to_before,
            to_before + amount
        );

        for replica_id in cluster.replica_ids() {
            if cluster.clock.since(started) > self.timeout_ms {
                tracing::warn!("[Transfer] COMMIT timeout, master already committed");
                return Ok(());
            }

            if cluster
                .send(&master_id, &replica_id, MessageKind::Commit)
                .await
                .is_none()
            {
                tracing::info!("[Transfer]   {} unreachable (will sync later)", replica_id);
                continue;
            }

            let now = cluster.now_ms();
            let at = cluster.now();
            let replica = cluster.node_mut(&replica_id)?;
            let from_bal = replica
                .get_balance(&from_user, false, now)
                .unwrap_or(from_before);
            let to_bal = replica.get_balance(&to_user, false, now).unwrap_or(to_before);
            replica.set_balance(&from_user, from_bal - amount);
            replica.set_balance(&to_user, to_bal + amount);
            replica.add_transaction(transaction, at);
            tracing::debug!("[Transfer]   {} committed", replica_id);
        }

        Ok(())
    }

    fn abort(
        &mut self,
        cluster: &Cluster,
        mut transaction: Transaction,
        reason: &str,
        started: f64,
    ) -> OperationResult {
        transaction.mark_aborted(reason, cluster.now());
        let tx_id = transaction.transaction_id.clone();
        tracing::warn!("[Transfer] {} ABORTED: {}", tx_id, reason);
        self.aborted.insert(tx_id.clone(), transaction);

        OperationResult::failed(reason, cluster.clock.since(started)).with_transaction(tx_id)
    }

    pub fn statistics(&self) -> TransferStatistics {
        let successful = self.committed.len();
        let aborted = self.aborted.len();
        let total = successful + aborted;
        TransferStatistics {
            total_transfers: total,
            successful,
            aborted,
            success_rate: if total > 0 {
                successful as f64 / total as f64 * 100.0
            } else {
                0.0
            },
        }
    }
}
