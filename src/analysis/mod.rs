pub mod metrics;
pub mod report;

pub use metrics::{MetricsCollector, MetricsExport};
pub use report::ReportWriter;
