pub mod balance;
pub mod history;
pub mod payment;
pub mod transfer;

use crate::config::SimConfig;
use crate::core::cluster::Cluster;
use crate::domain::model::OperationResult;
use crate::utils::error::Result;
use serde::Serialize;

pub use balance::{BalanceService, ReadStrategy};
pub use history::{HistoryService, DEFAULT_HISTORY_LIMIT};
pub use payment::{PaymentMode, PaymentService};
pub use transfer::TransferService;

/// Charge an operation to the node that served it.
pub(crate) fn track(cluster: &mut Cluster, node_id: &str, result: &OperationResult) -> Result<()> {
    let node = cluster.node_mut(node_id)?;
    node.record_latency(result.latency_ms);
    if !result.success {
        node.record_error();
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatistics {
    pub transfer: transfer::TransferStatistics,
    pub balance: balance::BalanceStatistics,
    pub history: history::HistoryStatistics,
    pub payment: payment::PaymentStatistics,
}

/// The four business services, configured from one `SimConfig`.
pub struct ServiceSet {
    pub transfer: TransferService,
    pub balance: BalanceService,
    pub history: HistoryService,
    pub payment: PaymentService,
}

impl ServiceSet {
    pub fn new(config: &SimConfig) -> Self {
        Self {
            transfer: TransferService::new(
                config.timeouts.transfer_ms,
                config.timeouts.heartbeat_staleness_ms,
            ),
            balance: BalanceService::new(
                config.timeouts.balance_ms,
                config.storage.balance_read_ms,
                config.cache_ttl.balance_secs,
            ),
            history: HistoryService::new(
                config.storage.history_read_ms,
                config.cache_ttl.history_secs,
            ),
            payment: PaymentService::new(
                config.provider.clone(),
                config.timeouts.payment_ms,
                config.payment.queue_threshold,
            ),
        }
    }

    pub fn statistics(&self) -> ServiceStatistics {
        ServiceStatistics {
            transfer: self.transfer.statistics(),
            balance: self.balance.statistics(),
            history: self.history.statistics(),
            payment: self.payment.statistics(),
        }
    }
}
