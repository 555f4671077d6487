use crate::core::network::NetworkMode;
use crate::domain::model::Amount;
use crate::domain::node::NodeRole;
use crate::utils::error::{Result, SimError};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const DEFAULT_CONFIG_FILE: &str = "sim-config.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub simulation: SimulationSettings,
    pub nodes: BTreeMap<String, NodeSpec>,
    pub network: NetworkSettings,
    pub timeouts: TimeoutSettings,
    pub cache_ttl: CacheTtlSettings,
    pub storage: StorageLatencySettings,
    pub provider: ProviderSettings,
    pub payment: PaymentSettings,
    pub load_profile: LoadProfile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    pub seed: u64,
    /// Wall-clock seconds slept per simulated second. 0 runs instantly.
    pub time_scale: f64,
    pub partition_hold_ms: f64,
    pub heal_delay_ms: f64,
    pub sync_delay_ms: f64,
    pub transactions_per_hour: usize,
    /// Hours whose profile latency reaches this run the network congested.
    pub congestion_latency_ms: f64,
    pub data_dir: String,
    pub output_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    pub name: String,
    pub role: NodeRole,
    pub location: (f64, f64),
    /// Transactions per second.
    pub capacity: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkLatency {
    pub a: String,
    pub b: String,
    /// Omitted for a link that cannot carry traffic.
    #[serde(default)]
    pub latency_ms: Option<f64>,
}

impl LinkLatency {
    fn new(a: &str, b: &str, latency_ms: Option<f64>) -> Self {
        Self {
            a: a.to_string(),
            b: b.to_string(),
            latency_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeProfile {
    pub packet_loss_pct: f64,
    pub links: Vec<LinkLatency>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    pub initial_mode: NetworkMode,
    pub default_latency_ms: f64,
    /// Relative jitter, drawn uniformly in [-jitter, +jitter].
    pub jitter: f64,
    pub normal: ModeProfile,
    pub congested: ModeProfile,
    pub partitioned: ModeProfile,
}

impl NetworkSettings {
    pub fn profile(&self, mode: NetworkMode) -> &ModeProfile {
        match mode {
            NetworkMode::Normal => &self.normal,
            NetworkMode::Congested => &self.congested,
            NetworkMode::Partitioned => &self.partitioned,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    pub transfer_ms: f64,
    pub payment_ms: f64,
    pub balance_ms: f64,
    pub history_ms: f64,
    pub heartbeat_ms: f64,
    /// A node whose last heartbeat is older than this is isolated.
    pub heartbeat_staleness_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheTtlSettings {
    pub balance_secs: u64,
    pub history_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageLatencySettings {
    pub balance_read_ms: f64,
    pub history_read_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub base_latency_ms: f64,
    pub latency_spread_ms: f64,
    pub success_probability: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentSettings {
    /// Amounts strictly below this may be queued instead of confirmed.
    pub queue_threshold: Amount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HourLatency {
    pub hour: u8,
    pub latency_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadProfile {
    /// Transactions per second, indexed by hour.
    pub hourly_load: Vec<u32>,
    pub hourly_latency: Vec<HourLatency>,
    pub default_load: u32,
    pub default_latency_ms: f64,
}

impl LoadProfile {
    pub fn load_for(&self, hour: u8) -> u32 {
        self.hourly_load
            .get(hour as usize)
            .copied()
            .unwrap_or(self.default_load)
    }

    /// Exact-hour lookup; hours without an entry use the default.
    pub fn latency_for(&self, hour: u8) -> f64 {
        self.hourly_latency
            .iter()
            .find(|entry| entry.hour == hour)
            .map(|entry| entry.latency_ms)
            .unwrap_or(self.default_latency_ms)
    }
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            seed: 42,
            time_scale: 0.0,
            partition_hold_ms: 1000.0,
            heal_delay_ms: 2000.0,
            sync_delay_ms: 500.0,
            transactions_per_hour: 5,
            congestion_latency_ms: 200.0,
            data_dir: "data".to_string(),
            output_dir: "outputs".to_string(),
        }
    }
}

pub fn default_nodes() -> BTreeMap<String, NodeSpec> {
    let mut nodes = BTreeMap::new();
    nodes.insert(
        "DAKAR".to_string(),
        NodeSpec {
            name: "Dakar".to_string(),
            role: NodeRole::Master,
            location: (14.7167, -17.4677),
            capacity: 10_000,
        },
    );
    nodes.insert(
        "SAINT_LOUIS".to_string(),
        NodeSpec {
            name: "Saint-Louis".to_string(),
            role: NodeRole::ReplicaRw,
            location: (16.0179, -16.5119),
            capacity: 5_000,
        },
    );
    nodes.insert(
        "ZIGUINCHOR".to_string(),
        NodeSpec {
            name: "Ziguinchor".to_string(),
            role: NodeRole::ReplicaAnalytics,
            location: (12.5833, -16.2667),
            capacity: 3_000,
        },
    );
    nodes
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            initial_mode: NetworkMode::Normal,
            default_latency_ms: 100.0,
            jitter: 0.2,
            normal: ModeProfile {
                packet_loss_pct: 0.1,
                links: vec![
                    LinkLatency::new("DAKAR", "SAINT_LOUIS", Some(50.0)),
                    LinkLatency::new("DAKAR", "ZIGUINCHOR", Some(150.0)),
                    LinkLatency::new("SAINT_LOUIS", "ZIGUINCHOR", Some(200.0)),
                ],
            },
            congested: ModeProfile {
                packet_loss_pct: 5.0,
                links: vec![
                    LinkLatency::new("DAKAR", "SAINT_LOUIS", Some(200.0)),
                    LinkLatency::new("DAKAR", "ZIGUINCHOR", Some(600.0)),
                    LinkLatency::new("SAINT_LOUIS", "ZIGUINCHOR", Some(800.0)),
                ],
            },
            partitioned: ModeProfile {
                packet_loss_pct: 100.0,
                links: vec![
                    LinkLatency::new("DAKAR", "ZIGUINCHOR", None),
                    LinkLatency::new("DAKAR", "SAINT_LOUIS", Some(50.0)),
                    LinkLatency::new("SAINT_LOUIS", "ZIGUINCHOR", None),
                ],
            },
        }
    }
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            transfer_ms: 5000.0,
            payment_ms: 10_000.0,
            balance_ms: 2000.0,
            history_ms: 3000.0,
            heartbeat_ms: 1000.0,
            heartbeat_staleness_ms: 3000.0,
        }
    }
}

impl Default for CacheTtlSettings {
    fn default() -> Self {
        Self {
            balance_secs: 60,
            history_secs: 300,
        }
    }
}

impl Default for StorageLatencySettings {
    fn default() -> Self {
        Self {
            balance_read_ms: 50.0,
            history_read_ms: 150.0,
        }
    }
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            base_latency_ms: 2000.0,
            latency_spread_ms: 1000.0,
            success_probability: 0.95,
        }
    }
}

impl Default for PaymentSettings {
    fn default() -> Self {
        Self {
            queue_threshold: 5000,
        }
    }
}

impl Default for LoadProfile {
    fn default() -> Self {
        Self {
            hourly_load: vec![
                10, 8, 5, 5, 5, 8, 50, 200, 500, 800, 600, 700, // 00h - 11h
                900, 800, 600, 700, 800, 1000, 5000, 4000, 2000, 800, 400, 100, // 12h - 23h
            ],
            hourly_latency: [
                (0, 20.0),
                (2, 15.0),
                (8, 50.0),
                (12, 100.0),
                (18, 800.0),
                (20, 200.0),
                (23, 30.0),
            ]
            .into_iter()
            .map(|(hour, latency_ms)| HourLatency { hour, latency_ms })
            .collect(),
            default_load: 100,
            default_latency_ms: 50.0,
        }
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            simulation: SimulationSettings::default(),
            nodes: default_nodes(),
            network: NetworkSettings::default(),
            timeouts: TimeoutSettings::default(),
            cache_ttl: CacheTtlSettings::default(),
            storage: StorageLatencySettings::default(),
            provider: ProviderSettings::default(),
            payment: PaymentSettings::default(),
            load_profile: LoadProfile::default(),
        }
    }
}

impl SimConfig {
    /// Load and parse a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(SimError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// Parse TOML text after substituting environment variables.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| SimError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Explicit path, else `sim-config.toml` in the working directory when
    /// present, else the built-in defaults.
    pub fn load(path: Option<&str>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                tracing::debug!("Using {}", DEFAULT_CONFIG_FILE);
                Self::from_file(DEFAULT_CONFIG_FILE)
            }
            None => Ok(Self::default()),
        }
    }

    /// Replace `${VAR}` references from the environment; unknown ones are kept.
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| SimError::ConfigValidationError {
            field: "environment".to_string(),
            message: e.to_string(),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn master_id(&self) -> Option<&str> {
        self.nodes
            .iter()
            .find(|(_, spec)| spec.role == NodeRole::Master)
            .map(|(id, _)| id.as_str())
    }

    /// Replicas the partition scenario runs through: the client-facing one
    /// that keeps its master link, then the one that gets cut off.
    pub fn scenario_nodes(&self) -> Result<(&str, &str)> {
        let replicas: Vec<(&str, NodeRole)> = self
            .nodes
            .iter()
            .filter(|(_, spec)| spec.role != NodeRole::Master)
            .map(|(id, spec)| (id.as_str(), spec.role))
            .collect();

        let pick = |preferred: &[NodeRole], skip: Option<&str>| {
            preferred
                .iter()
                .find_map(|role| {
                    replicas
                        .iter()
                        .find(|(id, r)| r == role && Some(*id) != skip)
                })
                .or_else(|| replicas.iter().find(|(id, _)| Some(*id) != skip))
                .map(|(id, _)| *id)
        };

        let healthy = pick(&[NodeRole::ReplicaRw], None);
        let isolated = healthy.and_then(|healthy| {
            pick(
                &[NodeRole::ReplicaAnalytics, NodeRole::ReplicaRo],
                Some(healthy),
            )
        });
        match (healthy, isolated) {
            (Some(healthy), Some(isolated)) => Ok((healthy, isolated)),
            _ => Err(SimError::InvalidConfigValueError {
                field: "nodes".to_string(),
                value: replicas.len().to_string(),
                reason: "At least two replica nodes are required".to_string(),
            }),
        }
    }

    pub fn validate_config(&self) -> Result<()> {
        validation::validate_path("simulation.data_dir", &self.simulation.data_dir)?;
        validation::validate_path("simulation.output_dir", &self.simulation.output_dir)?;
        validation::validate_positive_number(
            "simulation.transactions_per_hour",
            self.simulation.transactions_per_hour,
            1,
        )?;
        validation::validate_non_negative("simulation.time_scale", self.simulation.time_scale)?;

        if self.nodes.is_empty() {
            return Err(SimError::MissingConfigError {
                field: "nodes".to_string(),
            });
        }
        let masters = self
            .nodes
            .values()
            .filter(|spec| spec.role == NodeRole::Master)
            .count();
        if masters != 1 {
            return Err(SimError::InvalidConfigValueError {
                field: "nodes".to_string(),
                value: masters.to_string(),
                reason: "Exactly one node must have role 'master'".to_string(),
            });
        }
        for (id, spec) in &self.nodes {
            validation::validate_non_empty_string("nodes.<id>", id)?;
            validation::validate_non_empty_string(&format!("nodes.{}.name", id), &spec.name)?;
        }
        self.scenario_nodes()?;

        validation::validate_non_negative(
            "network.default_latency_ms",
            self.network.default_latency_ms,
        )?;
        validation::validate_range("network.jitter", self.network.jitter, 0.0, 1.0)?;
        for mode in NetworkMode::ALL {
            let profile = self.network.profile(mode);
            validation::validate_range(
                &format!("network.{}.packet_loss_pct", mode),
                profile.packet_loss_pct,
                0.0,
                100.0,
            )?;
            for link in &profile.links {
                if let Some(latency) = link.latency_ms {
                    validation::validate_non_negative(
                        &format!("network.{}.links.latency_ms", mode),
                        latency,
                    )?;
                }
            }
        }

        validation::validate_range(
            "provider.success_probability",
            self.provider.success_probability,
            0.0,
            1.0,
        )?;
        for entry in &self.load_profile.hourly_latency {
            validation::validate_range("load_profile.hourly_latency.hour", entry.hour, 0, 23)?;
        }
        if self.load_profile.hourly_load.len() > 24 {
            return Err(SimError::InvalidConfigValueError {
                field: "load_profile.hourly_load".to_string(),
                value: self.load_profile.hourly_load.len().to_string(),
                reason: "At most 24 hourly entries".to_string(),
            });
        }

        Ok(())
    }
}

impl Validate for SimConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_are_valid() {
        let config = SimConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.master_id(), Some("DAKAR"));
        assert_eq!(config.load_profile.load_for(18), 5000);
        assert_eq!(config.load_profile.latency_for(18), 800.0);
        assert_eq!(config.load_profile.latency_for(19), 50.0);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let toml_content = r#"
[simulation]
seed = 7
transactions_per_hour = 3

[payment]
queue_threshold = 2500
"#;

        let config = SimConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.simulation.seed, 7);
        assert_eq!(config.simulation.transactions_per_hour, 3);
        assert_eq!(config.simulation.partition_hold_ms, 1000.0);
        assert_eq!(config.payment.queue_threshold, 2500);
        assert_eq!(config.nodes.len(), 3);
    }

    #[test]
    fn test_unreachable_links_parse_without_latency() {
        let toml_content = r#"
[network.partitioned]
packet_loss_pct = 100.0
links = [
  { a = "DAKAR", b = "ZIGUINCHOR" },
  { a = "DAKAR", b = "SAINT_LOUIS", latency_ms = 40.0 },
]
"#;

        let config = SimConfig::from_toml_str(toml_content).unwrap();
        let links = &config.network.partitioned.links;
        assert_eq!(links[0].latency_ms, None);
        assert_eq!(links[1].latency_ms, Some(40.0));
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("WAVE_SIM_TEST_SEED", "99");

        let toml_content = r#"
[simulation]
seed = ${WAVE_SIM_TEST_SEED}
"#;

        let config = SimConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.simulation.seed, 99);

        std::env::remove_var("WAVE_SIM_TEST_SEED");
    }

    #[test]
    fn test_unknown_env_var_is_kept() {
        let content = "data_dir = \"${WAVE_SIM_UNSET_DIR}\"";
        assert_eq!(SimConfig::substitute_env_vars(content).unwrap(), content);
    }

    #[test]
    fn test_two_masters_rejected() {
        let toml_content = r#"
[nodes.DAKAR]
name = "Dakar"
role = "master"
location = [14.7, -17.4]
capacity = 10000

[nodes.THIES]
name = "Thies"
role = "master"
location = [14.8, -16.9]
capacity = 2000
"#;

        let config = SimConfig::from_toml_str(toml_content).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_scenario_nodes_follow_roles() {
        let toml_content = r#"
[nodes.CORE]
name = "Core"
role = "master"
location = [14.7, -17.4]
capacity = 10000

[nodes.ARCHIVE]
name = "Archive"
role = "replica_analytics"
location = [12.5, -16.2]
capacity = 3000

[nodes.EDGE]
name = "Edge"
role = "replica_rw"
location = [16.0, -16.5]
capacity = 5000
"#;

        let config = SimConfig::from_toml_str(toml_content).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.scenario_nodes().unwrap(), ("EDGE", "ARCHIVE"));
        assert_eq!(
            SimConfig::default().scenario_nodes().unwrap(),
            ("SAINT_LOUIS", "ZIGUINCHOR")
        );
    }

    #[test]
    fn test_single_replica_rejected() {
        let toml_content = r#"
[nodes.CORE]
name = "Core"
role = "master"
location = [14.7, -17.4]
capacity = 10000

[nodes.EDGE]
name = "Edge"
role = "replica_rw"
location = [16.0, -16.5]
capacity = 5000
"#;

        let config = SimConfig::from_toml_str(toml_content).unwrap();
        assert!(matches!(
            config.validate(),
            Err(SimError::InvalidConfigValueError { ref field, .. }) if field == "nodes"
        ));
    }

    #[test]
    fn test_invalid_loss_rejected() {
        let mut config = SimConfig::default();
        config.network.congested.packet_loss_pct = 150.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[simulation]\noutput_dir = \"reports\"\n")
            .unwrap();

        let config = SimConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.simulation.output_dir, "reports");
    }
}
