use crate::core::cluster::Cluster;
use crate::core::network::MessageKind;
use crate::domain::model::{Amount, OperationResult, StrategyTag};
use crate::services::{PaymentMode, ReadStrategy, ServiceSet, DEFAULT_HISTORY_LIMIT};
use crate::strategies::{BalanceContext, ConsistencyStrategy, StrategyProfile};
use crate::utils::error::Result;
use async_trait::async_trait;

const UNAVAILABLE: &str = "Service temporarily unavailable";

fn master_unreachable(reason: &str) -> OperationResult {
    OperationResult::failed(UNAVAILABLE, 0.0)
        .with_reason(reason)
        .with_strategy(StrategyTag::CpStrict)
}

/// Every operation goes through the master; nothing is served while it
/// cannot be reached.
pub struct PureCpStrategy {
    services: ServiceSet,
    history_timeout_ms: f64,
}

impl PureCpStrategy {
    pub fn new(services: ServiceSet, history_timeout_ms: f64) -> Self {
        tracing::debug!("[Strategy] Pure CP strategy initialized");
        Self {
            services,
            history_timeout_ms,
        }
    }
}

#[async_trait]
impl ConsistencyStrategy for PureCpStrategy {
    fn name(&self) -> &'static str {
        "Pure CP (Strict Consistency)"
    }

    fn profile(&self) -> StrategyProfile {
        StrategyProfile {
            name: self.name(),
            consistency: "Strong (100%)",
            availability: "Low during partition",
            transfer: "CP - Blocked if partition",
            balance: "CP - Master only",
            history: "CP - Master only",
            payment: "CP - Blocked if partition",
            pros: vec![
                "Perfect consistency",
                "No data conflicts",
                "Regulatory compliant",
            ],
            cons: vec![
                "Poor availability during partition",
                "High latency (always master)",
                "Bad user experience in unstable network",
            ],
        }
    }

    async fn execute_transfer(
        &mut self,
        cluster: &mut Cluster,
        origin: &str,
        from_user: &str,
        to_user: &str,
        amount: Amount,
    ) -> Result<OperationResult> {
        if !cluster.can_reach_master(origin)? {
            return Ok(master_unreachable(
                "Cannot reach master node (network partition)",
            ));
        }
        self.services
            .transfer
            .transfer(cluster, from_user, to_user, amount)
            .await
    }

    async fn execute_balance_query(
        &mut self,
        cluster: &mut Cluster,
        origin: &str,
        user_id: &str,
        _context: BalanceContext,
    ) -> Result<OperationResult> {
        if !cluster.can_reach_master(origin)? {
            return Ok(master_unreachable("Cannot reach master node"));
        }
        self.services
            .balance
            .get_balance(cluster, user_id, origin, ReadStrategy::Cp)
            .await
    }

    /// History is read from the master's ledger, after a query round trip.
    async fn execute_history_query(
        &mut self,
        cluster: &mut Cluster,
        origin: &str,
        user_id: &str,
    ) -> Result<OperationResult> {
        if !cluster.can_reach_master(origin)? {
            return Ok(master_unreachable("Cannot reach master node"));
        }

        let started = cluster.now_ms();
        let master_id = cluster.master_id().to_string();
        let delivered = cluster
            .send(origin, &master_id, MessageKind::HistoryQuery)
            .await;
        let elapsed = cluster.clock.since(started);
        if delivered.is_none() || elapsed > self.history_timeout_ms {
            return Ok(OperationResult::failed(UNAVAILABLE, elapsed)
                .with_reason("Master did not answer the history query")
                .with_strategy(StrategyTag::CpStrict));
        }

        let mut result = self
            .services
            .history
            .get_history(cluster, user_id, &master_id, DEFAULT_HISTORY_LIMIT)
            .await?;
        result.latency_ms = cluster.clock.since(started);
        Ok(result)
    }

    async fn execute_payment(
        &mut self,
        cluster: &mut Cluster,
        origin: &str,
        user_id: &str,
        provider: &str,
        amount: Amount,
    ) -> Result<OperationResult> {
        if !cluster.can_reach_master(origin)? {
            return Ok(master_unreachable("Cannot reach master node"));
        }
        self.services
            .payment
            .pay_bill(cluster, user_id, provider, amount, PaymentMode::CpStrict)
            .await
    }

    fn services(&self) -> &ServiceSet {
        &self.services
    }
}
