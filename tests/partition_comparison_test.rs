use anyhow::Result;
use chrono::Utc;
use wave_cap_sim::core::{OperationKind, Phase};
use wave_cap_sim::domain::model::SeedData;
use wave_cap_sim::{LocalStorage, SimConfig, SimulationEngine};
use tempfile::TempDir;

const KINDS: [OperationKind; 4] = [
    OperationKind::Transfer,
    OperationKind::Balance,
    OperationKind::History,
    OperationKind::Payment,
];

/// Lossless network and an always-successful provider, so only the
/// partition can make an operation fail.
fn lossless_config() -> SimConfig {
    let mut config = SimConfig::default();
    config.network.normal.packet_loss_pct = 0.0;
    config.network.congested.packet_loss_pct = 0.0;
    config.provider.success_probability = 1.0;
    config
}

#[tokio::test]
async fn test_pure_cp_refuses_everything_while_partitioned() -> Result<()> {
    let output = TempDir::new()?;
    let engine = SimulationEngine::new(
        lossless_config(),
        SeedData::sample(Utc::now()),
        LocalStorage::new(output.path()),
    );

    let comparison = engine.run_partition_comparison().await?;
    let pure_cp = &comparison.collectors[0];
    assert_eq!(pure_cp.strategy_name(), "Pure CP");

    for kind in KINDS {
        assert_eq!(pure_cp.count(kind, Phase::During), 1);
        assert_eq!(pure_cp.availability(kind, Phase::Before), 100.0, "{:?}", kind);
        assert_eq!(pure_cp.availability(kind, Phase::During), 0.0, "{:?}", kind);
        assert_eq!(pure_cp.availability(kind, Phase::After), 100.0, "{:?}", kind);
    }
    Ok(())
}

#[tokio::test]
async fn test_adaptive_keeps_reads_available_while_partitioned() -> Result<()> {
    let output = TempDir::new()?;
    let engine = SimulationEngine::new(
        lossless_config(),
        SeedData::sample(Utc::now()),
        LocalStorage::new(output.path()),
    );

    let comparison = engine.run_partition_comparison().await?;
    let adaptive = &comparison.collectors[1];
    assert_eq!(adaptive.strategy_name(), "Adaptive");

    assert_eq!(adaptive.availability(OperationKind::Balance, Phase::During), 100.0);
    assert_eq!(adaptive.availability(OperationKind::History, Phase::During), 100.0);
    // 6000 is above the queueing threshold, so the payment needs the master
    assert_eq!(adaptive.availability(OperationKind::Payment, Phase::During), 0.0);
    assert_eq!(adaptive.availability(OperationKind::Transfer, Phase::During), 0.0);

    for kind in KINDS {
        assert_eq!(adaptive.availability(kind, Phase::Before), 100.0, "{:?}", kind);
        assert_eq!(adaptive.availability(kind, Phase::After), 100.0, "{:?}", kind);
    }
    Ok(())
}

#[tokio::test]
async fn test_comparison_writes_all_reports() -> Result<()> {
    let output = TempDir::new()?;
    let engine = SimulationEngine::new(
        lossless_config(),
        SeedData::sample(Utc::now()),
        LocalStorage::new(output.path()),
    );

    let comparison = engine.run_partition_comparison().await?;
    assert_eq!(comparison.files.len(), 5);
    for file in &comparison.files {
        assert!(output.path().join(file).is_file(), "{} missing", file);
    }

    let csv = std::fs::read_to_string(output.path().join("availability_comparison.csv"))?;
    assert!(csv.contains("Pure CP"));
    assert!(csv.contains("Adaptive"));

    for sync in &comparison.sync_reports {
        assert_eq!(sync.source, "DAKAR");
        assert_eq!(sync.target, "ZIGUINCHOR");
        assert!(sync.partition_duration_ms > 0.0);
    }
    Ok(())
}

#[tokio::test]
async fn test_same_seed_gives_same_outcome() -> Result<()> {
    let run = |dir: &TempDir| {
        SimulationEngine::new(
            SimConfig::default(),
            SeedData::sample(Utc::now()),
            LocalStorage::new(dir.path()),
        )
    };
    let (first_dir, second_dir) = (TempDir::new()?, TempDir::new()?);

    let first = run(&first_dir).run_partition_comparison().await?;
    let second = run(&second_dir).run_partition_comparison().await?;

    for (a, b) in first.collectors.iter().zip(&second.collectors) {
        for kind in KINDS {
            for phase in [Phase::Before, Phase::During, Phase::After] {
                assert_eq!(a.availability(kind, phase), b.availability(kind, phase));
                assert_eq!(a.average_latency(kind, phase), b.average_latency(kind, phase));
            }
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_scenario_follows_node_roles_not_names() -> Result<()> {
    let mut config = lossless_config();
    let defaults = std::mem::take(&mut config.nodes);
    for (old, new) in [("DAKAR", "CORE"), ("SAINT_LOUIS", "EDGE"), ("ZIGUINCHOR", "ARCHIVE")] {
        let spec = defaults[old].clone();
        config.nodes.insert(new.to_string(), spec);
    }
    config.network.normal.links.clear();
    config.network.congested.links.clear();

    let output = TempDir::new()?;
    let engine = SimulationEngine::new(
        config,
        SeedData::sample(Utc::now()),
        LocalStorage::new(output.path()),
    );

    let comparison = engine.run_partition_comparison().await?;
    for sync in &comparison.sync_reports {
        assert_eq!(sync.source, "CORE");
        assert_eq!(sync.target, "ARCHIVE");
    }
    let pure_cp = &comparison.collectors[0];
    assert_eq!(pure_cp.availability(OperationKind::Balance, Phase::Before), 100.0);
    assert_eq!(pure_cp.availability(OperationKind::Balance, Phase::During), 0.0);

    let daily = engine.run_daily_simulation().await?;
    assert_eq!(daily.hours.len(), 24);
    assert!(daily.hours.iter().any(|hour| hour.success_count > 0));
    Ok(())
}
