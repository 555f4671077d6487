use crate::analysis::{MetricsCollector, ReportWriter};
use crate::config::SimConfig;
use crate::core::cluster::Cluster;
use crate::core::daily_load::{DailyLoadSimulator, HourlyExecutor, HourlyMetrics};
use crate::core::partition::{PartitionSimulator, SyncReport};
use crate::domain::model::{Amount, OperationKind, OperationResult, Phase, SeedData};
use crate::domain::ports::Storage;
use crate::services::ServiceSet;
use crate::strategies::{AdaptiveStrategy, BalanceContext, ConsistencyStrategy, PureCpStrategy};
use crate::utils::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Which replica a phase issues its operations from.
#[derive(Debug, Clone, Copy)]
enum Origin {
    /// Client-facing replica that keeps its master link.
    Healthy,
    /// Replica cut off from the master during the partition.
    Isolated,
}

/// The four operations a phase issues, in order.
struct PhaseWorkload {
    phase: Phase,
    origin: Origin,
    from_user: &'static str,
    to_user: &'static str,
    transfer_amount: Amount,
    payment_amount: Amount,
}

const PHASES: [PhaseWorkload; 3] = [
    PhaseWorkload {
        phase: Phase::Before,
        origin: Origin::Healthy,
        from_user: "user_001",
        to_user: "user_002",
        transfer_amount: 3_000,
        payment_amount: 6_000,
    },
    PhaseWorkload {
        phase: Phase::During,
        origin: Origin::Isolated,
        from_user: "user_003",
        to_user: "user_004",
        transfer_amount: 2_000,
        payment_amount: 6_000,
    },
    PhaseWorkload {
        phase: Phase::After,
        origin: Origin::Isolated,
        from_user: "user_003",
        to_user: "user_004",
        transfer_amount: 2_000,
        payment_amount: 6_000,
    },
];

/// Node ids the scenario runs against, resolved from the node roles.
struct ScenarioNodes<'a> {
    healthy: &'a str,
    isolated: &'a str,
}

impl<'a> ScenarioNodes<'a> {
    fn resolve(&self, origin: Origin) -> &'a str {
        match origin {
            Origin::Healthy => self.healthy,
            Origin::Isolated => self.isolated,
        }
    }
}

#[derive(Debug)]
pub struct PartitionComparison {
    pub collectors: Vec<MetricsCollector>,
    pub sync_reports: Vec<SyncReport>,
    pub files: Vec<String>,
}

#[derive(Debug)]
pub struct DailyRun {
    pub hours: Vec<HourlyMetrics>,
    pub files: Vec<String>,
}

/// Daily workload: transfer, balance display and history in rotation,
/// all issued from the healthy replica.
struct SampleWorkload {
    strategy: AdaptiveStrategy,
    origin: String,
}

#[async_trait]
impl HourlyExecutor for SampleWorkload {
    async fn execute(
        &mut self,
        cluster: &mut Cluster,
        _hour: u8,
        index: usize,
    ) -> Result<OperationResult> {
        match index % 3 {
            0 => {
                self.strategy
                    .execute_transfer(cluster, &self.origin, "user_001", "user_002", 1_000)
                    .await
            }
            1 => {
                self.strategy
                    .execute_balance_query(
                        cluster,
                        &self.origin,
                        "user_001",
                        BalanceContext::Display,
                    )
                    .await
            }
            _ => {
                self.strategy
                    .execute_history_query(cluster, &self.origin, "user_001")
                    .await
            }
        }
    }
}

pub struct SimulationEngine<S: Storage> {
    config: SimConfig,
    seed: SeedData,
    reports: ReportWriter<S>,
    start: DateTime<Utc>,
}

impl<S: Storage> SimulationEngine<S> {
    pub fn new(config: SimConfig, seed: SeedData, output: S) -> Self {
        Self {
            config,
            seed,
            reports: ReportWriter::new(output),
            start: Utc::now(),
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    fn fresh_cluster(&self) -> Result<Cluster> {
        let mut cluster = Cluster::from_config(&self.config, self.start)?;
        cluster.seed(&self.seed);
        Ok(cluster)
    }

    /// Same scripted partition against Pure CP and Adaptive, each on its
    /// own freshly seeded cluster.
    pub async fn run_partition_comparison(&self) -> Result<PartitionComparison> {
        println!("{}", "=".repeat(80));
        println!(" SIMULATION: NETWORK PARTITION - PURE CP VS ADAPTIVE");
        println!("{}", "=".repeat(80));

        let mut pure_cp = PureCpStrategy::new(
            ServiceSet::new(&self.config),
            self.config.timeouts.history_ms,
        );
        let mut adaptive = AdaptiveStrategy::new(ServiceSet::new(&self.config));

        let (cp_metrics, cp_sync) = self
            .run_partition_scenario(&mut pure_cp, "Pure CP", "SENELEC")
            .await?;
        let (adaptive_metrics, adaptive_sync) = self
            .run_partition_scenario(&mut adaptive, "Adaptive", "Orange")
            .await?;

        let collectors = vec![cp_metrics, adaptive_metrics];
        for metrics in &collectors {
            println!("{}", metrics.summary());
        }

        let files = self.reports.write_partition_reports(&collectors).await?;
        println!("Reports written: {}", files.join(", "));

        Ok(PartitionComparison {
            collectors,
            sync_reports: vec![cp_sync, adaptive_sync],
            files,
        })
    }

    async fn run_partition_scenario(
        &self,
        strategy: &mut dyn ConsistencyStrategy,
        label: &str,
        payee: &str,
    ) -> Result<(MetricsCollector, SyncReport)> {
        println!("{}", "-".repeat(80));
        println!(" STRATEGY: {}", strategy.name());
        println!("{}", "-".repeat(80));

        let (healthy, isolated) = self.config.scenario_nodes()?;
        let nodes = ScenarioNodes { healthy, isolated };
        let mut cluster = self.fresh_cluster()?;
        let mut partition = PartitionSimulator::new(self.config.simulation.sync_delay_ms);
        let mut metrics = MetricsCollector::new(label);
        let master_id = cluster.master_id().to_string();

        let [before, during, after] = &PHASES;

        self.run_phase(&mut cluster, strategy, &mut metrics, &nodes, before, payee)
            .await?;

        println!("[Phase] Creating partition {} <-> {}", master_id, isolated);
        partition.create_partition(&mut cluster, &master_id, isolated)?;
        cluster
            .advance(self.config.simulation.partition_hold_ms)
            .await;

        self.run_phase(&mut cluster, strategy, &mut metrics, &nodes, during, payee)
            .await?;

        cluster.advance(self.config.simulation.heal_delay_ms).await;
        let sync = partition
            .heal_partition(&mut cluster, &master_id, isolated)
            .await?;

        self.run_phase(&mut cluster, strategy, &mut metrics, &nodes, after, payee)
            .await?;

        tracing::debug!("{} service statistics: {:?}", label, strategy.services().statistics());
        for node in cluster.nodes() {
            tracing::debug!("{:?}", node.metrics());
        }
        Ok((metrics, sync))
    }

    async fn run_phase(
        &self,
        cluster: &mut Cluster,
        strategy: &mut dyn ConsistencyStrategy,
        metrics: &mut MetricsCollector,
        nodes: &ScenarioNodes<'_>,
        workload: &PhaseWorkload,
        payee: &str,
    ) -> Result<()> {
        let origin = nodes.resolve(workload.origin);
        println!(
            "[Phase] {} partition, operations from {}",
            workload.phase.as_str().to_uppercase(),
            origin
        );
        cluster.heartbeat_round();

        let transfer = strategy
            .execute_transfer(
                cluster,
                origin,
                workload.from_user,
                workload.to_user,
                workload.transfer_amount,
            )
            .await?;
        report_line(OperationKind::Transfer, &transfer);
        metrics.record(OperationKind::Transfer, workload.phase, transfer);

        let balance = strategy
            .execute_balance_query(
                cluster,
                origin,
                workload.from_user,
                BalanceContext::Display,
            )
            .await?;
        report_line(OperationKind::Balance, &balance);
        metrics.record(OperationKind::Balance, workload.phase, balance);

        let history = strategy
            .execute_history_query(cluster, origin, workload.from_user)
            .await?;
        report_line(OperationKind::History, &history);
        metrics.record(OperationKind::History, workload.phase, history);

        let payment = strategy
            .execute_payment(
                cluster,
                origin,
                workload.from_user,
                payee,
                workload.payment_amount,
            )
            .await?;
        report_line(OperationKind::Payment, &payment);
        metrics.record(OperationKind::Payment, workload.phase, payment);

        Ok(())
    }

    /// Adaptive strategy under the 24-hour load profile.
    pub async fn run_daily_simulation(&self) -> Result<DailyRun> {
        println!("{}", "=".repeat(80));
        println!(" SIMULATION: CAP EVOLUTION OVER 24 HOURS");
        println!("{}", "=".repeat(80));

        let (healthy, _) = self.config.scenario_nodes()?;
        let mut cluster = self.fresh_cluster()?;
        let simulator = DailyLoadSimulator::new(
            self.config.load_profile.clone(),
            self.config.simulation.congestion_latency_ms,
        );
        let mut workload = SampleWorkload {
            strategy: AdaptiveStrategy::new(ServiceSet::new(&self.config)),
            origin: healthy.to_string(),
        };

        let hours = simulator
            .simulate_24h(
                &mut cluster,
                &mut workload,
                self.config.simulation.transactions_per_hour,
            )
            .await?;

        for metrics in &hours {
            println!(
                "{:02}h [{}] load {:>6} tx/s latency {:>4.0}ms -> {}/{} ok ({:.1}%)",
                metrics.hour,
                metrics.cap_position,
                metrics.expected_load,
                metrics.network_latency,
                metrics.success_count,
                metrics.success_count + metrics.failure_count,
                metrics.success_rate
            );
        }

        let files = self.reports.write_daily_reports(&hours).await?;
        println!("Reports written: {}", files.join(", "));
        Ok(DailyRun { hours, files })
    }
}

fn report_line(kind: OperationKind, result: &OperationResult) {
    if result.success {
        println!("  {:<8} OK   {:>6.0}ms", kind.as_str(), result.latency_ms);
    } else {
        println!(
            "  {:<8} FAIL {}",
            kind.as_str(),
            result.error.as_deref().unwrap_or("unknown error")
        );
    }
}
