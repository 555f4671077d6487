use chrono::Utc;
use clap::Parser;
use std::io::{self, BufRead, Write};
use wave_cap_sim::domain::model::SeedData;
use wave_cap_sim::strategies::StrategyProfile;
use wave_cap_sim::utils::{logger, validation::Validate};
use wave_cap_sim::{
    AdaptiveStrategy, CliConfig, ConsistencyStrategy, LocalStorage, PureCpStrategy, SimCommand,
    SimConfig, SimError, SimulationEngine,
};

#[tokio::main]
async fn main() {
    let cli = CliConfig::parse();

    if cli.json_logs {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(cli.verbose);
    }
    tracing::debug!("CLI config: {:?}", cli);

    if let Err(e) = run(cli).await {
        tracing::error!(
            "Simulation failed: {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        eprintln!("{}", e.user_friendly_message());
        eprintln!("Suggestion: {}", e.recovery_suggestion());

        std::process::exit(e.exit_code());
    }
}

async fn run(cli: CliConfig) -> Result<(), SimError> {
    let mut config = SimConfig::load(cli.config.as_deref())?;
    cli.apply_overrides(&mut config);
    config.validate()?;
    tracing::info!(
        "Configuration ready (seed {}, time scale {})",
        config.simulation.seed,
        config.simulation.time_scale
    );

    let command = match cli.command {
        Some(command) => command,
        None => match prompt_menu()? {
            Some(command) => command,
            None => {
                println!("Invalid choice");
                return Ok(());
            }
        },
    };

    if command == SimCommand::Describe {
        describe(&config);
        return Ok(());
    }

    let seed = SeedData::load(&LocalStorage::new(&config.simulation.data_dir), Utc::now()).await?;
    let output = LocalStorage::new(&config.simulation.output_dir);
    let engine = SimulationEngine::new(config, seed, output);

    match command {
        SimCommand::Partition => {
            engine.run_partition_comparison().await?;
        }
        SimCommand::Daily => {
            engine.run_daily_simulation().await?;
        }
        SimCommand::All => {
            engine.run_partition_comparison().await?;
            engine.run_daily_simulation().await?;
        }
        SimCommand::Describe => {}
    }

    println!(
        "Done. Results in {}/",
        engine.config().simulation.output_dir
    );
    Ok(())
}

fn prompt_menu() -> Result<Option<SimCommand>, SimError> {
    println!("{}", "=".repeat(80));
    println!(" WAVE CAP SIMULATOR");
    println!("{}", "=".repeat(80));
    println!("  1. Network partition (Pure CP vs Adaptive)");
    println!("  2. CAP evolution over 24 hours");
    println!("  3. Run both");
    print!("Choice: ");
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(match line.trim() {
        "1" => Some(SimCommand::Partition),
        "2" => Some(SimCommand::Daily),
        "3" => Some(SimCommand::All),
        _ => None,
    })
}

fn describe(config: &SimConfig) {
    let services = || wave_cap_sim::services::ServiceSet::new(config);
    let strategies: [Box<dyn ConsistencyStrategy>; 2] = [
        Box::new(PureCpStrategy::new(services(), config.timeouts.history_ms)),
        Box::new(AdaptiveStrategy::new(services())),
    ];
    for strategy in &strategies {
        print_profile(&strategy.profile());
    }
}

fn print_profile(profile: &StrategyProfile) {
    println!("{}", "-".repeat(80));
    println!(" {}", profile.name);
    println!("{}", "-".repeat(80));
    println!("  Consistency:  {}", profile.consistency);
    println!("  Availability: {}", profile.availability);
    println!("  Transfer:     {}", profile.transfer);
    println!("  Balance:      {}", profile.balance);
    println!("  History:      {}", profile.history);
    println!("  Payment:      {}", profile.payment);
    println!("  Pros:");
    for pro in &profile.pros {
        println!("    + {}", pro);
    }
    println!("  Cons:");
    for con in &profile.cons {
        println!("    - {}", con);
    }
}
