use crate::analysis::metrics::{MetricsCollector, MetricsExport};
use crate::core::daily_load::HourlyMetrics;
use crate::domain::model::{OperationKind, Phase};
use crate::domain::ports::Storage;
use crate::utils::error::{Result, SimError};
use serde::Serialize;
use std::fmt::Write as _;

const BAR_WIDTH: usize = 40;

#[derive(Debug, Serialize)]
struct StrategyRow<'a> {
    strategy: &'a str,
    operation: &'a str,
    phase: &'a str,
    availability_pct: f64,
    avg_latency_ms: f64,
    count: usize,
}

#[derive(Debug, Serialize)]
struct HourRow {
    hour: u8,
    expected_load: u32,
    network_latency_ms: f64,
    network_mode: String,
    cap_position: String,
    success_count: usize,
    failure_count: usize,
    success_rate: f64,
    avg_latency_ms: f64,
}

#[derive(Debug, Serialize)]
struct PartitionReport<'a> {
    phase_order: Vec<&'static str>,
    strategies: &'a [MetricsExport],
}

fn csv_bytes(writer: csv::Writer<Vec<u8>>) -> Result<Vec<u8>> {
    writer
        .into_inner()
        .map_err(|e| SimError::IoError(e.into_error()))
}

fn bar(value: f64, max: f64) -> String {
    let filled = if max > 0.0 {
        ((value / max) * BAR_WIDTH as f64).round().clamp(0.0, BAR_WIDTH as f64) as usize
    } else {
        0
    };
    format!("{}{}", "#".repeat(filled), ".".repeat(BAR_WIDTH - filled))
}

/// Writes comparison tables, JSON snapshots and text charts for external
/// plotting. Paths are relative to the storage root.
pub struct ReportWriter<S: Storage> {
    storage: S,
}

impl<S: Storage> ReportWriter<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Returns the names of the files written.
    pub async fn write_partition_reports(
        &self,
        collectors: &[MetricsCollector],
    ) -> Result<Vec<String>> {
        let files = vec![
            (
                "comparison_strategies.csv",
                self.strategy_table(collectors)?,
            ),
            (
                "availability_comparison.csv",
                self.availability_table(collectors)?,
            ),
            ("latency_comparison.csv", self.latency_table(collectors)?),
            (
                "partition_comparison.json",
                self.partition_json(collectors)?,
            ),
            (
                "availability_comparison.txt",
                self.availability_chart(collectors).into_bytes(),
            ),
        ];
        self.write_all(files).await
    }

    pub async fn write_daily_reports(&self, hours: &[HourlyMetrics]) -> Result<Vec<String>> {
        let files = vec![
            ("24h_evolution.csv", self.hourly_table(hours)?),
            (
                "daily_simulation.json",
                serde_json::to_vec_pretty(hours)?,
            ),
            ("24h_evolution.txt", self.hourly_chart(hours).into_bytes()),
        ];
        self.write_all(files).await
    }

    async fn write_all(&self, files: Vec<(&str, Vec<u8>)>) -> Result<Vec<String>> {
        let mut written = Vec::with_capacity(files.len());
        for (name, data) in files {
            tracing::debug!("Writing {} ({} bytes)", name, data.len());
            self.storage.write_file(name, &data).await?;
            written.push(name.to_string());
        }
        Ok(written)
    }

    fn strategy_table(&self, collectors: &[MetricsCollector]) -> Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        for metrics in collectors {
            for kind in OperationKind::ALL {
                for phase in Phase::ALL {
                    writer.serialize(StrategyRow {
                        strategy: metrics.strategy_name(),
                        operation: kind.as_str(),
                        phase: phase.as_str(),
                        availability_pct: metrics.availability(kind, phase),
                        avg_latency_ms: metrics.average_latency(kind, phase),
                        count: metrics.count(kind, phase),
                    })?;
                }
            }
        }
        csv_bytes(writer)
    }

    /// Availability during the partition, one column per strategy, with a
    /// trailing mean row.
    fn availability_table(&self, collectors: &[MetricsCollector]) -> Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());

        let mut header = vec!["operation".to_string()];
        header.extend(collectors.iter().map(|m| m.strategy_name().to_string()));
        writer.write_record(&header)?;

        let mut sums = vec![0.0; collectors.len()];
        for kind in OperationKind::ALL {
            let mut record = vec![kind.as_str().to_string()];
            for (i, metrics) in collectors.iter().enumerate() {
                let value = metrics.availability(kind, Phase::During);
                sums[i] += value;
                record.push(format!("{:.1}", value));
            }
            writer.write_record(&record)?;
        }

        let mut mean = vec!["mean".to_string()];
        mean.extend(
            sums.iter()
                .map(|sum| format!("{:.1}", sum / OperationKind::ALL.len() as f64)),
        );
        writer.write_record(&mean)?;
        csv_bytes(writer)
    }

    fn latency_table(&self, collectors: &[MetricsCollector]) -> Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());

        let mut header = vec!["operation".to_string(), "phase".to_string()];
        header.extend(
            collectors
                .iter()
                .map(|m| format!("{} (ms)", m.strategy_name())),
        );
        writer.write_record(&header)?;

        for kind in OperationKind::ALL {
            for phase in Phase::ALL {
                let mut record = vec![kind.as_str().to_string(), phase.as_str().to_string()];
                record.extend(
                    collectors
                        .iter()
                        .map(|m| format!("{:.0}", m.average_latency(kind, phase))),
                );
                writer.write_record(&record)?;
            }
        }
        csv_bytes(writer)
    }

    fn partition_json(&self, collectors: &[MetricsCollector]) -> Result<Vec<u8>> {
        let exports: Vec<MetricsExport> = collectors.iter().map(|m| m.export()).collect();
        let report = PartitionReport {
            phase_order: Phase::ALL.iter().map(|p| p.as_str()).collect(),
            strategies: &exports,
        };
        Ok(serde_json::to_vec_pretty(&report)?)
    }

    fn availability_chart(&self, collectors: &[MetricsCollector]) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Availability during partition (%)");
        let _ = writeln!(out);
        for kind in OperationKind::ALL {
            let _ = writeln!(out, "{}", kind.as_str().to_uppercase());
            for metrics in collectors {
                let value = metrics.availability(kind, Phase::During);
                let _ = writeln!(
                    out,
                    "  {:<30} |{}| {:5.1}%",
                    metrics.strategy_name(),
                    bar(value, 100.0),
                    value
                );
            }
        }
        out
    }

    fn hourly_table(&self, hours: &[HourlyMetrics]) -> Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        for metrics in hours {
            writer.serialize(HourRow {
                hour: metrics.hour,
                expected_load: metrics.expected_load,
                network_latency_ms: metrics.network_latency,
                network_mode: metrics.network_mode.to_string(),
                cap_position: metrics.cap_position.to_string(),
                success_count: metrics.success_count,
                failure_count: metrics.failure_count,
                success_rate: metrics.success_rate,
                avg_latency_ms: metrics.avg_latency_ms,
            })?;
        }
        csv_bytes(writer)
    }

    fn hourly_chart(&self, hours: &[HourlyMetrics]) -> String {
        let max_load = hours
            .iter()
            .map(|h| h.expected_load as f64)
            .fold(0.0, f64::max);

        let mut out = String::new();
        let _ = writeln!(out, "24h evolution: load (tx/s) and success rate");
        let _ = writeln!(out);
        for metrics in hours {
            let _ = writeln!(
                out,
                "{:02}h {} load |{}| {:>6} tx/s  ok {:5.1}%  {:>4.0}ms",
                metrics.hour,
                metrics.cap_position,
                bar(metrics.expected_load as f64, max_load),
                metrics.expected_load,
                metrics.success_rate,
                metrics.network_latency
            );
        }
        out
    }
}
