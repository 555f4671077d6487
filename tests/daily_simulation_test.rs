use anyhow::Result;
use chrono::Utc;
use wave_cap_sim::core::daily_load::CapPosition;
use wave_cap_sim::core::network::NetworkMode;
use wave_cap_sim::domain::model::SeedData;
use wave_cap_sim::{LocalStorage, SimConfig, SimulationEngine};
use tempfile::TempDir;

#[tokio::test]
async fn test_daily_run_covers_every_hour() -> Result<()> {
    let output = TempDir::new()?;
    let mut config = SimConfig::default();
    config.simulation.transactions_per_hour = 3;

    let engine = SimulationEngine::new(
        config,
        SeedData::sample(Utc::now()),
        LocalStorage::new(output.path()),
    );
    let run = engine.run_daily_simulation().await?;

    assert_eq!(run.hours.len(), 24);
    for (hour, metrics) in run.hours.iter().enumerate() {
        assert_eq!(metrics.hour as usize, hour);
        assert_eq!(metrics.success_count + metrics.failure_count, 3);
    }

    assert_eq!(run.hours[3].cap_position, CapPosition::Ca);
    assert_eq!(run.hours[18].cap_position, CapPosition::Ap);
    assert_eq!(run.hours[10].cap_position, CapPosition::Cp);
    assert_eq!(run.hours[18].network_mode, NetworkMode::Congested);
    assert_eq!(run.hours[18].expected_load, 5000);
    assert_eq!(run.hours[0].network_mode, NetworkMode::Normal);

    for file in ["24h_evolution.csv", "daily_simulation.json", "24h_evolution.txt"] {
        assert!(output.path().join(file).is_file(), "{} missing", file);
    }
    Ok(())
}

#[tokio::test]
async fn test_seed_files_drive_the_run() -> Result<()> {
    let data = TempDir::new()?;
    std::fs::write(
        data.path().join("users.json"),
        r#"[{"user_id":"user_001","phone":"+221770000001","name":"Awa","balance":500000},
            {"user_id":"user_002","phone":"+221770000002","name":"Moussa","balance":0}]"#,
    )?;

    let seed = SeedData::load(&LocalStorage::new(data.path()), Utc::now()).await?;
    assert_eq!(seed.accounts.len(), 2);
    assert!(seed.transactions.is_empty());

    let output = TempDir::new()?;
    let mut config = SimConfig::default();
    config.simulation.transactions_per_hour = 1;
    let engine = SimulationEngine::new(config, seed, LocalStorage::new(output.path()));

    let run = engine.run_daily_simulation().await?;
    assert_eq!(run.hours.len(), 24);
    Ok(())
}
