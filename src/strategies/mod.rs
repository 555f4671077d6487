pub mod adaptive;
pub mod pure_cp;

use crate::core::cluster::Cluster;
use crate::domain::model::{Amount, OperationResult};
use crate::services::ServiceSet;
use crate::utils::error::Result;
use async_trait::async_trait;
use serde::Serialize;

pub use adaptive::AdaptiveStrategy;
pub use pure_cp::PureCpStrategy;

/// Why a balance is being read. Display reads may be stale, reads that
/// gate a transfer may not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceContext {
    Display,
    PreTransfer,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyProfile {
    pub name: &'static str,
    pub consistency: &'static str,
    pub availability: &'static str,
    pub transfer: &'static str,
    pub balance: &'static str,
    pub history: &'static str,
    pub payment: &'static str,
    pub pros: Vec<&'static str>,
    pub cons: Vec<&'static str>,
}

/// A policy deciding, per operation, how to trade consistency against
/// availability. `origin` is the node the client is connected to.
#[async_trait]
pub trait ConsistencyStrategy: Send {
    fn name(&self) -> &'static str;

    fn profile(&self) -> StrategyProfile;

    async fn execute_transfer(
        &mut self,
        cluster: &mut Cluster,
        origin: &str,
        from_user: &str,
        to_user: &str,
        amount: Amount,
    ) -> Result<OperationResult>;

    async fn execute_balance_query(
        &mut self,
        cluster: &mut Cluster,
        origin: &str,
        user_id: &str,
        context: BalanceContext,
    ) -> Result<OperationResult>;

    async fn execute_history_query(
        &mut self,
        cluster: &mut Cluster,
        origin: &str,
        user_id: &str,
    ) -> Result<OperationResult>;

    async fn execute_payment(
        &mut self,
        cluster: &mut Cluster,
        origin: &str,
        user_id: &str,
        provider: &str,
        amount: Amount,
    ) -> Result<OperationResult>;

    fn services(&self) -> &ServiceSet;
}
