use crate::config::toml_config::ProviderSettings;
use crate::core::cluster::Cluster;
use crate::core::network::MessageKind;
use crate::domain::model::{
    Amount, OperationResult, PaymentStatus, ResultPayload, Transaction, TransactionType,
};
use crate::services::track;
use crate::utils::error::Result;
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMode {
    CpStrict,
    /// Small amounts are debited at once and the provider is notified later.
    Adaptive,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentStatistics {
    pub total_payments: u64,
    pub successful: u64,
    pub failed: u64,
    pub success_rate: f64,
}

enum ProviderResponse {
    Confirmed { receipt_id: String },
    Failed,
}

/// Bill payments to external providers (SENELEC, Orange, ...).
pub struct PaymentService {
    provider: ProviderSettings,
    timeout_ms: f64,
    queue_threshold: Amount,
    payments: u64,
    successes: u64,
    failures: u64,
}

impl PaymentService {
    pub fn new(provider: ProviderSettings, timeout_ms: f64, queue_threshold: Amount) -> Self {
        Self {
            provider,
            timeout_ms,
            queue_threshold,
            payments: 0,
            successes: 0,
            failures: 0,
        }
    }

    pub fn queue_threshold(&self) -> Amount {
        self.queue_threshold
    }

    pub async fn pay_bill(
        &mut self,
        cluster: &mut Cluster,
        user_id: &str,
        provider: &str,
        amount: Amount,
        mode: PaymentMode,
    ) -> Result<OperationResult> {
        self.payments += 1;
        let started = cluster.now_ms();
        let master_id = cluster.master_id().to_string();

        let mut transaction = Transaction::new(
            cluster.next_id("PAY"),
            TransactionType::Payment,
            user_id,
            Some(provider),
            amount,
            cluster.now(),
        );
        transaction
            .metadata
            .insert("provider".to_string(), provider.into());
        tracing::info!(
            "[Payment] Starting {}: {} -> {} : {} FCFA",
            transaction.transaction_id,
            user_id,
            provider,
            amount
        );

        let balance = cluster.master_mut()?.get_balance(user_id, false, started);
        let result = match balance {
            Some(balance) if amount > 0 && balance >= amount => match mode {
                PaymentMode::Adaptive if amount < self.queue_threshold => {
                    self.queue(cluster, transaction, balance, started)?
                }
                _ => self.pay_strict(cluster, transaction, balance, started).await?,
            },
            _ => self.fail(cluster, transaction, "Insufficient balance", started),
        };

        track(cluster, &master_id, &result)?;
        Ok(result)
    }

    async fn pay_strict(
        &mut self,
        cluster: &mut Cluster,
        mut transaction: Transaction,
        balance: Amount,
        started: f64,
    ) -> Result<OperationResult> {
        let user_id = transaction.from_user.clone();
        let amount = transaction.amount;

        cluster.master_mut()?.set_balance(&user_id, balance - amount);
        tracing::debug!("[Payment]   User debited: {} -> {}", balance, balance - amount);

        let receipt_id = match self.call_provider(cluster, &transaction).await {
            ProviderResponse::Confirmed { receipt_id } => receipt_id,
            ProviderResponse::Failed => {
                cluster.master_mut()?.set_balance(&user_id, balance);
                tracing::warn!("[Payment]   Provider API failed, ROLLBACK");
                return Ok(self.fail(cluster, transaction, "Provider API failed", started));
            }
        };
        tracing::debug!("[Payment]   Provider confirmed: {}", receipt_id);

        let at = cluster.now();
        transaction.mark_committed(at);
        transaction
            .metadata
            .insert("receipt_id".to_string(), receipt_id.clone().into());
        cluster.master_mut()?.add_transaction(&transaction, at);

        let master_id = cluster.master_id().to_string();
        for replica_id in cluster.replica_ids() {
            if cluster
                .send(&master_id, &replica_id, MessageKind::PaymentReplicate)
                .await
                .is_none()
            {
                tracing::debug!("[Payment]   {} unreachable (will sync later)", replica_id);
                continue;
            }
            let now = cluster.now_ms();
            let at = cluster.now();
            let replica = cluster.node_mut(&replica_id)?;
            let current = replica.get_balance(&user_id, false, now).unwrap_or(balance);
            replica.set_balance(&user_id, current - amount);
            replica.add_transaction(&transaction, at);
        }

        self.successes += 1;
        let latency = cluster.clock.since(started);
        let new_balance = cluster.node(&master_id)?.accounts.get(&user_id).copied();
        tracing::info!(
            "[Payment] {} COMMITTED ({:.0}ms)",
            transaction.transaction_id,
            latency
        );

        Ok(OperationResult::succeeded(latency)
            .with_transaction(transaction.transaction_id)
            .with_payload(ResultPayload::Payment {
                receipt_id: Some(receipt_id),
                status: PaymentStatus::Committed,
                new_balance,
            }))
    }

    fn queue(
        &mut self,
        cluster: &mut Cluster,
        mut transaction: Transaction,
        balance: Amount,
        started: f64,
    ) -> Result<OperationResult> {
        let at = cluster.now();
        let new_balance = balance - transaction.amount;
        transaction
            .metadata
            .insert("queued".to_string(), true.into());
        transaction.mark_committed(at);

        let master = cluster.master_mut()?;
        master.set_balance(&transaction.from_user, new_balance);
        master.add_transaction(&transaction, at);

        self.successes += 1;
        tracing::info!(
            "[Payment] {} QUEUED, provider notification deferred",
            transaction.transaction_id
        );

        Ok(OperationResult::succeeded(cluster.clock.since(started))
            .with_transaction(transaction.transaction_id)
            .with_message("Payment is being processed (2-5 minutes)")
            .with_payload(ResultPayload::Payment {
                receipt_id: None,
                status: PaymentStatus::Pending,
                new_balance: Some(new_balance),
            }))
    }

    /// External API: base latency plus a seeded spread. Responses slower than
    /// the payment timeout count as failures.
    async fn call_provider(
        &self,
        cluster: &mut Cluster,
        transaction: &Transaction,
    ) -> ProviderResponse {
        tracing::debug!("[Payment]   Calling provider for {}", transaction.transaction_id);
        let bucket: u32 = cluster.rng_mut().gen_range(0..10);
        let latency =
            self.provider.base_latency_ms + self.provider.latency_spread_ms * bucket as f64 / 10.0;

        if latency > self.timeout_ms {
            cluster.advance(self.timeout_ms).await;
            tracing::warn!("[Payment]   Provider timeout after {}ms", self.timeout_ms);
            return ProviderResponse::Failed;
        }
        cluster.advance(latency).await;

        let draw: f64 = cluster.rng_mut().gen();
        if draw < self.provider.success_probability {
            ProviderResponse::Confirmed {
                receipt_id: cluster.next_id("RCPT"),
            }
        } else {
            ProviderResponse::Failed
        }
    }

    fn fail(
        &mut self,
        cluster: &Cluster,
        mut transaction: Transaction,
        reason: &str,
        started: f64,
    ) -> OperationResult {
        transaction.mark_failed(reason, cluster.now());
        self.failures += 1;
        let latency = cluster.clock.since(started);
        tracing::warn!(
            "[Payment] {} FAILED: {} ({:.0}ms)",
            transaction.transaction_id,
            reason,
            latency
        );
        OperationResult::failed(reason, latency).with_transaction(transaction.transaction_id)
    }

    pub fn statistics(&self) -> PaymentStatistics {
        PaymentStatistics {
            total_payments: self.payments,
            successful: self.successes,
            failed: self.failures,
            success_rate: if self.payments > 0 {
                self.successes as f64 / self.payments as f64 * 100.0
            } else {
                0.0
            },
        }
    }
}
