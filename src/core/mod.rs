pub mod clock;
pub mod cluster;
pub mod daily_load;
pub mod network;
pub mod partition;

pub use crate::domain::model::{OperationKind, OperationResult, Phase};
pub use crate::utils::error::Result;
pub use cluster::Cluster;
