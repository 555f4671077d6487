use crate::domain::model::{OperationKind, OperationResult, Phase};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Per-operation, per-phase figures; outer key is the operation name.
pub type PhaseTable = BTreeMap<String, BTreeMap<String, f64>>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsExport {
    pub strategy: String,
    pub availability: PhaseTable,
    pub latency: PhaseTable,
}

/// Collects operation outcomes of one strategy, bucketed by partition phase.
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    strategy_name: String,
    results: BTreeMap<(OperationKind, Phase), Vec<OperationResult>>,
}

impl MetricsCollector {
    pub fn new(strategy_name: &str) -> Self {
        Self {
            strategy_name: strategy_name.to_string(),
            results: BTreeMap::new(),
        }
    }

    pub fn strategy_name(&self) -> &str {
        &self.strategy_name
    }

    pub fn record(&mut self, kind: OperationKind, phase: Phase, result: OperationResult) {
        self.results.entry((kind, phase)).or_default().push(result);
    }

    /// Record under a free-form label such as `during_partition`.
    pub fn record_labeled(&mut self, kind: OperationKind, label: &str, result: OperationResult) {
        self.record(kind, Phase::from_label(label), result);
    }

    fn bucket(&self, kind: OperationKind, phase: Phase) -> &[OperationResult] {
        self.results
            .get(&(kind, phase))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn count(&self, kind: OperationKind, phase: Phase) -> usize {
        self.bucket(kind, phase).len()
    }

    /// Success percentage; 0 when nothing was recorded.
    pub fn availability(&self, kind: OperationKind, phase: Phase) -> f64 {
        let results = self.bucket(kind, phase);
        if results.is_empty() {
            return 0.0;
        }
        let successes = results.iter().filter(|r| r.success).count();
        successes as f64 / results.len() as f64 * 100.0
    }

    /// Mean latency over successful operations only.
    pub fn average_latency(&self, kind: OperationKind, phase: Phase) -> f64 {
        let latencies: Vec<f64> = self
            .bucket(kind, phase)
            .iter()
            .filter(|r| r.success)
            .map(|r| r.latency_ms)
            .collect();
        if latencies.is_empty() {
            return 0.0;
        }
        latencies.iter().sum::<f64>() / latencies.len() as f64
    }

    pub fn summary(&self) -> String {
        let rule = "=".repeat(60);
        let mut out = String::new();
        let _ = writeln!(out, "{}", rule);
        let _ = writeln!(out, " METRICS - {}", self.strategy_name);
        let _ = writeln!(out, "{}", rule);

        for kind in OperationKind::ALL {
            let _ = writeln!(out, "{}:", kind.as_str().to_uppercase());
            for phase in Phase::ALL {
                let _ = writeln!(
                    out,
                    "  {:<8} - Availability: {:5.1}% | Latency: {:6.0}ms | Count: {}",
                    phase.as_str(),
                    self.availability(kind, phase),
                    self.average_latency(kind, phase),
                    self.count(kind, phase)
                );
            }
        }
        out
    }

    fn table(&self, value: impl Fn(OperationKind, Phase) -> f64) -> PhaseTable {
        OperationKind::ALL
            .iter()
            .map(|kind| {
                let phases = Phase::ALL
                    .iter()
                    .map(|phase| (phase.as_str().to_string(), value(*kind, *phase)))
                    .collect();
                (kind.as_str().to_string(), phases)
            })
            .collect()
    }

    pub fn export(&self) -> MetricsExport {
        MetricsExport {
            strategy: self.strategy_name.clone(),
            availability: self.table(|kind, phase| self.availability(kind, phase)),
            latency: self.table(|kind, phase| self.average_latency(kind, phase)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn availability_and_latency_per_bucket() {
        let mut metrics = MetricsCollector::new("Adaptive");
        metrics.record(OperationKind::Balance, Phase::During, OperationResult::succeeded(40.0));
        metrics.record(OperationKind::Balance, Phase::During, OperationResult::succeeded(60.0));
        metrics.record_labeled(
            OperationKind::Balance,
            "during_partition",
            OperationResult::failed("down", 999.0),
        );

        assert_eq!(metrics.count(OperationKind::Balance, Phase::During), 3);
        assert!((metrics.availability(OperationKind::Balance, Phase::During) - 66.666).abs() < 0.01);
        assert_eq!(metrics.average_latency(OperationKind::Balance, Phase::During), 50.0);
        assert_eq!(metrics.availability(OperationKind::Payment, Phase::After), 0.0);
        assert_eq!(metrics.average_latency(OperationKind::Payment, Phase::After), 0.0);
    }

    #[test]
    fn export_covers_every_operation_and_phase() {
        let mut metrics = MetricsCollector::new("Pure CP");
        metrics.record_labeled(
            OperationKind::Transfer,
            "before_partition",
            OperationResult::succeeded(250.0),
        );
        let export = metrics.export();
        assert_eq!(export.availability.len(), 4);
        assert_eq!(export.availability["transfer"]["before"], 100.0);
        assert_eq!(export.latency["transfer"]["before"], 250.0);
        assert_eq!(export.availability["history"].len(), 3);

        let summary = metrics.summary();
        assert!(summary.contains("METRICS - Pure CP"));
        assert!(summary.contains("TRANSFER:"));
    }
}
