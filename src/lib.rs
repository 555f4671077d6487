pub mod analysis;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod services;
pub mod strategies;
pub mod utils;
pub mod workspace;

pub use config::cli::LocalStorage;
#[cfg(feature = "cli")]
pub use config::{CliConfig, SimCommand};

pub use app::SimulationEngine;
pub use config::SimConfig;
pub use crate::core::Cluster;
pub use strategies::{AdaptiveStrategy, ConsistencyStrategy, PureCpStrategy};
pub use utils::error::{Result, SimError};
pub use workspace::{Bootstrap, SystemRunner};
