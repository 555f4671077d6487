pub mod cli;
pub mod toml_config;

pub use toml_config::SimConfig;

#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "wave-cap-sim")]
#[command(about = "CAP trade-off simulator for a replicated mobile-money platform")]
pub struct CliConfig {
    /// Path to a TOML configuration file (defaults to ./sim-config.toml when present)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Override the RNG seed from the configuration
    #[arg(long)]
    pub seed: Option<u64>,

    /// Override the wall-clock time scale (0 = instant)
    #[arg(long)]
    pub time_scale: Option<f64>,

    /// Override the output directory for exported reports
    #[arg(long)]
    pub output_dir: Option<String>,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON lines on stderr")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Option<SimCommand>,
}

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum SimCommand {
    /// Network partition: Pure CP vs Adaptive
    Partition,
    /// CAP position over 24 hours
    Daily,
    /// Both simulations
    All,
    /// Print both strategy profiles
    Describe,
}

#[cfg(feature = "cli")]
impl CliConfig {
    /// Apply command-line overrides on top of the loaded file.
    pub fn apply_overrides(&self, config: &mut SimConfig) {
        if let Some(seed) = self.seed {
            config.simulation.seed = seed;
        }
        if let Some(time_scale) = self.time_scale {
            config.simulation.time_scale = time_scale;
        }
        if let Some(output_dir) = &self.output_dir {
            config.simulation.output_dir = output_dir.clone();
        }
    }
}

#[cfg(all(test, feature = "cli"))]
mod tests {
    use super::*;

    #[test]
    fn overrides_replace_file_values() {
        let cli = CliConfig::parse_from([
            "wave-cap-sim",
            "--seed",
            "11",
            "--time-scale",
            "0.5",
            "partition",
        ]);
        let mut config = SimConfig::default();
        cli.apply_overrides(&mut config);

        assert_eq!(config.simulation.seed, 11);
        assert_eq!(config.simulation.time_scale, 0.5);
        assert_eq!(config.simulation.output_dir, "outputs");
        assert_eq!(cli.command, Some(SimCommand::Partition));
    }
}
