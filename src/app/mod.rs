pub mod engine;
pub mod seed;

pub use engine::{DailyRun, PartitionComparison, SimulationEngine};
