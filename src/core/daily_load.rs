use crate::config::toml_config::LoadProfile;
use crate::core::cluster::Cluster;
use crate::core::network::NetworkMode;
use crate::domain::model::OperationResult;
use crate::utils::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;

const HOUR_MS: f64 = 3_600_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CapPosition {
    /// Quiet night hours: partitions are unlikely, both C and A hold.
    #[serde(rename = "CA")]
    Ca,
    #[serde(rename = "CP")]
    Cp,
    /// Evening peak: availability first.
    #[serde(rename = "AP")]
    Ap,
}

impl CapPosition {
    pub fn as_str(&self) -> &'static str {
        match self {
            CapPosition::Ca => "CA",
            CapPosition::Cp => "CP",
            CapPosition::Ap => "AP",
        }
    }
}

impl fmt::Display for CapPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runs one sampled operation of a simulated hour.
#[async_trait]
pub trait HourlyExecutor: Send {
    async fn execute(
        &mut self,
        cluster: &mut Cluster,
        hour: u8,
        index: usize,
    ) -> Result<OperationResult>;
}

#[derive(Debug, Clone, Serialize)]
pub struct HourlyMetrics {
    pub hour: u8,
    pub expected_load: u32,
    pub network_latency: f64,
    pub network_mode: NetworkMode,
    pub cap_position: CapPosition,
    pub success_count: usize,
    pub failure_count: usize,
    pub total_latency_ms: f64,
    pub success_rate: f64,
    /// Averaged over successful operations only.
    pub avg_latency_ms: f64,
    #[serde(skip)]
    pub results: Vec<OperationResult>,
}

impl HourlyMetrics {
    fn new(hour: u8, expected_load: u32, network_latency: f64, mode: NetworkMode) -> Self {
        Self {
            hour,
            expected_load,
            network_latency,
            network_mode: mode,
            cap_position: cap_position_for(hour),
            success_count: 0,
            failure_count: 0,
            total_latency_ms: 0.0,
            success_rate: 0.0,
            avg_latency_ms: 0.0,
            results: Vec::new(),
        }
    }

    fn record(&mut self, result: OperationResult) {
        if result.success {
            self.success_count += 1;
            self.total_latency_ms += result.latency_ms;
        } else {
            self.failure_count += 1;
        }
        self.results.push(result);
    }

    fn finish(&mut self) {
        let total = self.success_count + self.failure_count;
        if total > 0 {
            self.success_rate = self.success_count as f64 / total as f64 * 100.0;
        }
        if self.success_count > 0 {
            self.avg_latency_ms = self.total_latency_ms / self.success_count as f64;
        }
    }
}

fn cap_position_for(hour: u8) -> CapPosition {
    match hour {
        2..=5 => CapPosition::Ca,
        17..=19 => CapPosition::Ap,
        _ => CapPosition::Cp,
    }
}

pub struct DailyLoadSimulator {
    profile: LoadProfile,
    congestion_latency_ms: f64,
}

impl DailyLoadSimulator {
    pub fn new(profile: LoadProfile, congestion_latency_ms: f64) -> Self {
        tracing::debug!("[LoadSim] Daily load simulator initialized");
        Self {
            profile,
            congestion_latency_ms,
        }
    }

    pub fn load_for(&self, hour: u8) -> u32 {
        self.profile.load_for(hour)
    }

    pub fn latency_for(&self, hour: u8) -> f64 {
        self.profile.latency_for(hour)
    }

    pub fn cap_position(&self, hour: u8) -> CapPosition {
        cap_position_for(hour)
    }

    fn mode_for(&self, hour: u8) -> NetworkMode {
        if self.latency_for(hour) >= self.congestion_latency_ms {
            NetworkMode::Congested
        } else {
            NetworkMode::Normal
        }
    }

    /// Walk a whole day, one hour at a time, sampling `per_hour`
    /// operations per hour through `executor`.
    pub async fn simulate_24h<E>(
        &self,
        cluster: &mut Cluster,
        executor: &mut E,
        per_hour: usize,
    ) -> Result<Vec<HourlyMetrics>>
    where
        E: HourlyExecutor + ?Sized,
    {
        tracing::info!("[LoadSim] Starting 24-hour simulation ({} ops/hour)", per_hour);

        let mut hourly = Vec::with_capacity(24);
        for hour in 0..24u8 {
            cluster.clock.jump_to(hour as f64 * HOUR_MS);

            let mode = self.mode_for(hour);
            cluster.network.set_mode(mode);
            cluster.heartbeat_round();

            let mut metrics =
                HourlyMetrics::new(hour, self.load_for(hour), self.latency_for(hour), mode);
            tracing::info!(
                "[LoadSim] Hour {:02}:00 load={} tx/s latency={}ms mode={} cap={}",
                hour,
                metrics.expected_load,
                metrics.network_latency,
                mode,
                metrics.cap_position
            );

            for index in 0..per_hour {
                let result = executor.execute(cluster, hour, index).await?;
                metrics.record(result);
            }
            metrics.finish();

            tracing::info!(
                "[LoadSim]   {}/{} success ({:.1}%), avg latency {:.0}ms",
                metrics.success_count,
                metrics.success_count + metrics.failure_count,
                metrics.success_rate,
                metrics.avg_latency_ms
            );
            hourly.push(metrics);
        }

        tracing::info!("[LoadSim] 24-hour simulation complete");
        Ok(hourly)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use chrono::Utc;

    /// Fails every third operation and reports the mode it ran under.
    struct Scripted {
        modes: Vec<(u8, NetworkMode)>,
    }

    #[async_trait]
    impl HourlyExecutor for Scripted {
        async fn execute(
            &mut self,
            cluster: &mut Cluster,
            hour: u8,
            index: usize,
        ) -> Result<OperationResult> {
            self.modes.push((hour, cluster.network.mode()));
            cluster.advance(10.0).await;
            if index % 3 == 2 {
                Ok(OperationResult::failed("boom", 10.0))
            } else {
                Ok(OperationResult::succeeded(10.0 * (index + 1) as f64))
            }
        }
    }

    fn simulator(config: &SimConfig) -> DailyLoadSimulator {
        DailyLoadSimulator::new(
            config.load_profile.clone(),
            config.simulation.congestion_latency_ms,
        )
    }

    #[test]
    fn cap_position_follows_time_of_day() {
        let config = SimConfig::default();
        let sim = simulator(&config);
        assert_eq!(sim.cap_position(1), CapPosition::Cp);
        assert_eq!(sim.cap_position(2), CapPosition::Ca);
        assert_eq!(sim.cap_position(5), CapPosition::Ca);
        assert_eq!(sim.cap_position(17), CapPosition::Ap);
        assert_eq!(sim.cap_position(19), CapPosition::Ap);
        assert_eq!(sim.cap_position(20), CapPosition::Cp);
    }

    #[tokio::test]
    async fn day_produces_one_entry_per_hour() {
        let config = SimConfig::default();
        let sim = simulator(&config);
        let mut cluster = Cluster::from_config(&config, Utc::now()).unwrap();
        let mut executor = Scripted { modes: Vec::new() };

        let hours = sim.simulate_24h(&mut cluster, &mut executor, 3).await.unwrap();

        assert_eq!(hours.len(), 24);
        let evening = &hours[18];
        assert_eq!(evening.network_latency, 800.0);
        assert_eq!(evening.network_mode, NetworkMode::Congested);
        assert_eq!(hours[8].network_mode, NetworkMode::Normal);

        // 10 + 20 succeed, the third fails
        assert_eq!(evening.success_count, 2);
        assert_eq!(evening.failure_count, 1);
        assert_eq!(evening.avg_latency_ms, 15.0);
        assert!((evening.success_rate - 66.666).abs() < 0.01);

        assert!(executor
            .modes
            .iter()
            .any(|(hour, mode)| *hour == 18 && *mode == NetworkMode::Congested));
        assert!(cluster.now_ms() >= 23.0 * HOUR_MS);
    }

    #[tokio::test]
    async fn empty_hours_report_zero_rates() {
        let config = SimConfig::default();
        let sim = simulator(&config);
        let mut cluster = Cluster::from_config(&config, Utc::now()).unwrap();
        let mut executor = Scripted { modes: Vec::new() };

        let hours = sim.simulate_24h(&mut cluster, &mut executor, 0).await.unwrap();
        assert!(hours.iter().all(|h| h.success_rate == 0.0 && h.avg_latency_ms == 0.0));
    }
}
