use crate::config::toml_config::NetworkSettings;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    Normal,
    Congested,
    Partitioned,
}

impl NetworkMode {
    pub const ALL: [NetworkMode; 3] = [
        NetworkMode::Normal,
        NetworkMode::Congested,
        NetworkMode::Partitioned,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkMode::Normal => "normal",
            NetworkMode::Congested => "congested",
            NetworkMode::Partitioned => "partitioned",
        }
    }
}

impl fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NetworkMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(NetworkMode::Normal),
            "congested" => Ok(NetworkMode::Congested),
            "partitioned" => Ok(NetworkMode::Partitioned),
            other => Err(format!("unknown network mode: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Heartbeat,
    Prepare,
    Commit,
    BalanceQuery,
    HistoryQuery,
    PaymentReplicate,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Delivery {
    pub latency_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommunicationRecord {
    pub at_ms: f64,
    pub from: String,
    pub to: String,
    pub kind: MessageKind,
    pub success: bool,
    pub latency_ms: f64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkStatistics {
    pub total_messages: usize,
    pub successful: usize,
    pub failed: usize,
    pub success_rate: f64,
    pub avg_latency_ms: f64,
    pub min_latency_ms: f64,
    pub max_latency_ms: f64,
}

fn ordered_pair(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

/// Simulated links between nodes: per-mode latency and packet loss, plus
/// explicit cuts laid over whatever mode is active.
#[derive(Debug, Clone)]
pub struct NetworkSimulator {
    settings: NetworkSettings,
    mode: NetworkMode,
    /// Symmetric link latency; `None` means the link cannot carry traffic.
    latencies: HashMap<(String, String), Option<f64>>,
    packet_loss_pct: f64,
    cuts: HashSet<(String, String)>,
    log: Vec<CommunicationRecord>,
}

impl NetworkSimulator {
    pub fn new(settings: NetworkSettings) -> Self {
        let mode = settings.initial_mode;
        let mut network = Self {
            settings,
            mode,
            latencies: HashMap::new(),
            packet_loss_pct: 0.0,
            cuts: HashSet::new(),
            log: Vec::new(),
        };
        network.load_mode(mode);
        tracing::debug!("[Network] Initialized in {} mode", mode);
        network
    }

    fn load_mode(&mut self, mode: NetworkMode) {
        let profile = self.settings.profile(mode);
        self.latencies = profile
            .links
            .iter()
            .map(|link| (ordered_pair(&link.a, &link.b), link.latency_ms))
            .collect();
        self.packet_loss_pct = profile.packet_loss_pct;
        self.mode = mode;
    }

    pub fn mode(&self) -> NetworkMode {
        self.mode
    }

    /// Switch latency and loss tables. Active cuts survive the switch.
    pub fn set_mode(&mut self, mode: NetworkMode) {
        if mode != self.mode {
            self.load_mode(mode);
            tracing::info!("[Network] Mode changed to {}", mode);
        }
    }

    pub fn is_cut(&self, a: &str, b: &str) -> bool {
        self.cuts.contains(&ordered_pair(a, b))
    }

    /// Base latency of a link, `None` when it is cut or unreachable.
    pub fn base_latency(&self, from: &str, to: &str) -> Option<f64> {
        if from == to {
            return Some(0.0);
        }
        if self.is_cut(from, to) {
            return None;
        }
        match self.latencies.get(&ordered_pair(from, to)) {
            Some(latency) => *latency,
            None => Some(self.settings.default_latency_ms),
        }
    }

    /// Attempt one message without charging any time.
    ///
    /// The caller decides whether the latency is waited for.
    pub fn transmit(
        &mut self,
        from: &str,
        to: &str,
        kind: MessageKind,
        now_ms: f64,
        rng: &mut ChaCha8Rng,
    ) -> Option<Delivery> {
        let Some(base) = self.base_latency(from, to) else {
            self.log_attempt(now_ms, from, to, kind, None, Some("Partitioned"));
            return None;
        };

        if from != to && self.is_packet_lost(rng) {
            self.log_attempt(now_ms, from, to, kind, None, Some("Packet lost"));
            return None;
        }

        let latency_ms = if from == to {
            0.0
        } else {
            let jitter = self.settings.jitter;
            let factor = if jitter > 0.0 {
                1.0 + rng.gen_range(-jitter..=jitter)
            } else {
                1.0
            };
            (base * factor).max(0.0)
        };

        self.log_attempt(now_ms, from, to, kind, Some(latency_ms), None);
        Some(Delivery { latency_ms })
    }

    fn is_packet_lost(&self, rng: &mut ChaCha8Rng) -> bool {
        self.packet_loss_pct > 0.0 && rng.gen::<f64>() * 100.0 < self.packet_loss_pct
    }

    fn log_attempt(
        &mut self,
        at_ms: f64,
        from: &str,
        to: &str,
        kind: MessageKind,
        latency_ms: Option<f64>,
        error: Option<&str>,
    ) {
        self.log.push(CommunicationRecord {
            at_ms,
            from: from.to_string(),
            to: to.to_string(),
            kind,
            success: latency_ms.is_some(),
            latency_ms: latency_ms.unwrap_or(0.0),
            error: error.map(str::to_string),
        });
    }

    pub fn communication_log(&self) -> &[CommunicationRecord] {
        &self.log
    }

    pub fn statistics(&self) -> Option<NetworkStatistics> {
        if self.log.is_empty() {
            return None;
        }

        let total = self.log.len();
        let latencies: Vec<f64> = self
            .log
            .iter()
            .filter(|record| record.success)
            .map(|record| record.latency_ms)
            .collect();
        let successful = latencies.len();

        let (avg, min, max) = if latencies.is_empty() {
            (0.0, 0.0, 0.0)
        } else {
            (
                latencies.iter().sum::<f64>() / successful as f64,
                latencies.iter().copied().fold(f64::INFINITY, f64::min),
                latencies.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            )
        };

        Some(NetworkStatistics {
            total_messages: total,
            successful,
            failed: total - successful,
            success_rate: successful as f64 / total as f64 * 100.0,
            avg_latency_ms: avg,
            min_latency_ms: min,
            max_latency_ms: max,
        })
    }

    pub fn simulate_partition(&mut self, a: &str, b: &str) {
        self.cuts.insert(ordered_pair(a, b));
        tracing::info!("[Network] Partition created between {} and {}", a, b);
    }

    pub fn heal_partition(&mut self, a: &str, b: &str) {
        self.cuts.remove(&ordered_pair(a, b));
        tracing::info!("[Network] Partition healed between {} and {}", a, b);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn lossless() -> NetworkSettings {
        let mut settings = NetworkSettings::default();
        settings.normal.packet_loss_pct = 0.0;
        settings
    }

    #[test]
    fn latency_is_symmetric_with_bounded_jitter() {
        let mut network = NetworkSimulator::new(lossless());
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        for _ in 0..50 {
            let there = network
                .transmit("DAKAR", "ZIGUINCHOR", MessageKind::Prepare, 0.0, &mut rng)
                .unwrap();
            let back = network
                .transmit("ZIGUINCHOR", "DAKAR", MessageKind::Commit, 0.0, &mut rng)
                .unwrap();
            for delivery in [there, back] {
                assert!(delivery.latency_ms >= 120.0 && delivery.latency_ms <= 180.0);
            }
        }
    }

    #[test]
    fn loopback_and_unknown_links() {
        let mut network = NetworkSimulator::new(lossless());
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let loopback = network
            .transmit("DAKAR", "DAKAR", MessageKind::Heartbeat, 0.0, &mut rng)
            .unwrap();
        assert_eq!(loopback.latency_ms, 0.0);
        assert_eq!(network.base_latency("DAKAR", "THIES"), Some(100.0));
    }

    #[test]
    fn cut_survives_mode_switch_until_healed() {
        let mut network = NetworkSimulator::new(lossless());
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        network.simulate_partition("DAKAR", "ZIGUINCHOR");
        network.set_mode(NetworkMode::Congested);
        assert!(network
            .transmit("ZIGUINCHOR", "DAKAR", MessageKind::Heartbeat, 0.0, &mut rng)
            .is_none());

        network.heal_partition("ZIGUINCHOR", "DAKAR");
        assert_eq!(network.base_latency("ZIGUINCHOR", "DAKAR"), Some(600.0));
    }

    #[test]
    fn partitioned_mode_drops_every_message() {
        let mut settings = lossless();
        settings.initial_mode = NetworkMode::Partitioned;
        let mut network = NetworkSimulator::new(settings);
        let mut rng = ChaCha8Rng::seed_from_u64(4);

        assert!(network
            .transmit("DAKAR", "SAINT_LOUIS", MessageKind::Prepare, 0.0, &mut rng)
            .is_none());
        assert!(network
            .transmit("DAKAR", "ZIGUINCHOR", MessageKind::Prepare, 0.0, &mut rng)
            .is_none());

        let stats = network.statistics().unwrap();
        assert_eq!(stats.total_messages, 2);
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.success_rate, 0.0);
        assert_eq!(network.communication_log()[1].error.as_deref(), Some("Partitioned"));
    }

    #[test]
    fn statistics_empty_without_traffic() {
        let network = NetworkSimulator::new(lossless());
        assert!(network.statistics().is_none());
    }

    #[test]
    fn mode_names_round_trip_through_from_str() {
        for mode in NetworkMode::ALL {
            assert_eq!(mode.as_str().parse::<NetworkMode>().unwrap(), mode);
        }
        assert!("flooded".parse::<NetworkMode>().is_err());
    }
}
