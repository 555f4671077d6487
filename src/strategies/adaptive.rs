use crate::core::cluster::Cluster;
use crate::domain::model::{
    Amount, OperationResult, PaymentStatus, ResultPayload, StrategyTag, Transaction,
    TransactionType,
};
use crate::services::{PaymentMode, ReadStrategy, ServiceSet, DEFAULT_HISTORY_LIMIT};
use crate::strategies::{BalanceContext, ConsistencyStrategy, StrategyProfile};
use crate::utils::error::Result;
use async_trait::async_trait;

/// Strong consistency for money movement, local reads for consultation,
/// and small payments queued while the master is out of reach.
pub struct AdaptiveStrategy {
    services: ServiceSet,
}

impl AdaptiveStrategy {
    pub fn new(services: ServiceSet) -> Self {
        tracing::debug!("[Strategy] Adaptive strategy initialized");
        Self { services }
    }

    /// Debit the origin's local balance and record the payment there as
    /// pending. The master settles it on the next partition heal.
    fn queue_locally(
        &self,
        cluster: &mut Cluster,
        origin: &str,
        user_id: &str,
        provider: &str,
        amount: Amount,
    ) -> Result<OperationResult> {
        if amount <= 0 {
            return Ok(OperationResult::failed("Invalid amount", 0.0)
                .with_strategy(StrategyTag::AdaptiveApQueue));
        }
        let local_balance = cluster.node(origin)?.accounts.get(user_id).copied();
        let balance = match local_balance {
            Some(balance) if balance >= amount => balance,
            Some(_) => {
                return Ok(OperationResult::failed("Insufficient balance", 0.0)
                    .with_strategy(StrategyTag::AdaptiveApQueue)
                    .in_partition_mode())
            }
            None => {
                return Ok(OperationResult::failed("Account not found", 0.0)
                    .with_strategy(StrategyTag::AdaptiveApQueue)
                    .in_partition_mode())
            }
        };

        let at = cluster.now();
        let mut transaction = Transaction::new(
            cluster.next_id("PAY"),
            TransactionType::Payment,
            user_id,
            Some(provider),
            amount,
            at,
        );
        transaction
            .metadata
            .insert("provider".to_string(), provider.into());
        transaction
            .metadata
            .insert("queued".to_string(), true.into());

        let node = cluster.node_mut(origin)?;
        node.set_balance(user_id, balance - amount);
        node.add_transaction(&transaction, at);
        tracing::info!(
            "[Strategy] {} queued on {} until the master is reachable",
            transaction.transaction_id,
            origin
        );

        Ok(OperationResult::succeeded(0.0)
            .with_transaction(transaction.transaction_id)
            .with_message(format!("Payment of {} FCFA queued", amount))
            .with_warning("Processing deferred until the network reconnects")
            .with_strategy(StrategyTag::AdaptiveApQueue)
            .with_payload(ResultPayload::Payment {
                receipt_id: None,
                status: PaymentStatus::Queued,
                new_balance: None,
            })
            .in_partition_mode())
    }
}

#[async_trait]
impl ConsistencyStrategy for AdaptiveStrategy {
    fn name(&self) -> &'static str {
        "Adaptive (Smart Balance)"
    }

    fn profile(&self) -> StrategyProfile {
        StrategyProfile {
            name: self.name(),
            consistency: "Strong for writes, Eventual for reads",
            availability: "High (70%+ during partition)",
            transfer: "CP - Blocked if partition (safety)",
            balance: "AP - Local replica (display) | CP - Master (verification)",
            history: "AP - Always available from local",
            payment: "Adaptive - Queue if <5000, CP if >=5000",
            pros: vec![
                "Best user experience",
                "High availability for consultations",
                "Safe for critical operations",
                "Graceful degradation",
            ],
            cons: vec![
                "Slightly complex logic",
                "Eventual consistency for some data",
                "User needs to understand warnings",
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
            return Ok(OperationResult::failed("Transfers temporarily unavailable", 0.0)
                .with_reason("Network connectivity problem detected")
                .with_message(
                    "For your security, transfers are temporarily suspended.\n\
                     You can still check your balance and history.\n\
                     Please try again in a few minutes.",
                )
                .with_actions(&["check_balance", "view_history"])
                .with_strategy(StrategyTag::AdaptiveCp));
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
        context: BalanceContext,
    ) -> Result<OperationResult> {
        let reaches_master = cluster.can_reach_master(origin)?;

        match context {
            BalanceContext::PreTransfer => {
                if !reaches_master {
                    return Ok(OperationResult::failed("Cannot verify balance", 0.0)
                        .with_strategy(StrategyTag::AdaptiveCp));
                }
                self.services
                    .balance
                    .get_balance(cluster, user_id, origin, ReadStrategy::Cp)
                    .await
            }
            BalanceContext::Display => {
                let result = self
                    .services
                    .balance
                    .get_balance(cluster, user_id, origin, ReadStrategy::Ap)
                    .await?;
                if reaches_master {
                    return Ok(result);
                }
                Ok(result
                    .with_warning("Showing local data. It may be a few minutes behind.")
                    .in_partition_mode())
            }
        }
    }

    async fn execute_history_query(
        &mut self,
        cluster: &mut Cluster,
        origin: &str,
        user_id: &str,
    ) -> Result<OperationResult> {
        let result = self
            .services
            .history
            .get_history(cluster, user_id, origin, DEFAULT_HISTORY_LIMIT)
            .await?;
        if cluster.can_reach_master(origin)? {
            return Ok(result);
        }
        Ok(result
            .with_warning("Degraded mode: recent transactions may not appear")
            .in_partition_mode())
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
            let threshold = self.services.payment.queue_threshold();
            if amount < threshold {
                return self.queue_locally(cluster, origin, user_id, provider, amount);
            }
            return Ok(OperationResult::failed(
                "Large payments temporarily unavailable",
                0.0,
            )
            .with_reason("Network connectivity problem")
            .with_message(format!(
                "Payments of {} FCFA or more need a secure connection.\n\
                 Smaller payments remain available in the meantime.",
                threshold
            ))
            .with_strategy(StrategyTag::Adaptive));
        }

        self.services
            .payment
            .pay_bill(cluster, user_id, provider, amount, PaymentMode::Adaptive)
            .await
    }

    fn services(&self) -> &ServiceSet {
        &self.services
    }
}
