use crate::config::toml_config::{SimConfig, TimeoutSettings};
use crate::core::clock::SimClock;
use crate::core::network::{Delivery, MessageKind, NetworkSimulator};
use crate::domain::model::SeedData;
use crate::domain::node::Node;
use crate::utils::error::{Result, SimError};
use chrono::{DateTime, Utc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;

/// One simulated deployment: nodes, the links between them, virtual time
/// and the random source every component draws from.
pub struct Cluster {
    nodes: BTreeMap<String, Node>,
    master_id: String,
    pub network: NetworkSimulator,
    pub clock: SimClock,
    rng: ChaCha8Rng,
    timeouts: TimeoutSettings,
}

impl Cluster {
    pub fn from_config(config: &SimConfig, start: DateTime<Utc>) -> Result<Self> {
        let master_id = config
            .master_id()
            .ok_or_else(|| SimError::MissingConfigError {
                field: "nodes.<id>.role = \"master\"".to_string(),
            })?
            .to_string();

        let mut nodes = BTreeMap::new();
        for (id, spec) in &config.nodes {
            let mut node = Node::new(id, &spec.name, spec.role, spec.location, spec.capacity);
            for peer in config.nodes.keys().filter(|peer| *peer != id) {
                node.can_reach.insert(peer.clone(), true);
            }
            nodes.insert(id.clone(), node);
        }

        Ok(Self {
            nodes,
            master_id,
            network: NetworkSimulator::new(config.network.clone()),
            clock: SimClock::new(start, config.simulation.time_scale),
            rng: ChaCha8Rng::seed_from_u64(config.simulation.seed),
            timeouts: config.timeouts.clone(),
        })
    }

    /// Load the same accounts and ledger onto every node.
    pub fn seed(&mut self, seed: &SeedData) {
        let at = self.clock.now();
        for node in self.nodes.values_mut() {
            for account in &seed.accounts {
                node.accounts.insert(account.user_id.clone(), account.balance);
            }
            for transaction in &seed.transactions {
                node.add_transaction(transaction, at);
            }
        }
        tracing::debug!(
            "Seeded {} accounts and {} transactions on {} nodes",
            seed.accounts.len(),
            seed.transactions.len(),
            self.nodes.len()
        );
    }

    pub fn master_id(&self) -> &str {
        &self.master_id
    }

    pub fn replica_ids(&self) -> Vec<String> {
        self.nodes
            .keys()
            .filter(|id| **id != self.master_id)
            .cloned()
            .collect()
    }

    pub fn node_ids(&self) -> Vec<String> {
        self.nodes.keys().cloned().collect()
    }

    pub fn node(&self, node_id: &str) -> Result<&Node> {
        self.nodes.get(node_id).ok_or_else(|| SimError::UnknownNode {
            node_id: node_id.to_string(),
        })
    }

    pub fn node_mut(&mut self, node_id: &str) -> Result<&mut Node> {
        self.nodes.get_mut(node_id).ok_or_else(|| SimError::UnknownNode {
            node_id: node_id.to_string(),
        })
    }

    pub fn master_mut(&mut self) -> Result<&mut Node> {
        let master_id = self.master_id.clone();
        self.node_mut(&master_id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn can_reach_master(&self, origin: &str) -> Result<bool> {
        Ok(self.node(origin)?.can_reach_master(&self.master_id))
    }

    pub fn is_node_healthy(&mut self, node_id: &str) -> Result<bool> {
        let now = self.clock.now_ms();
        let staleness = self.timeouts.heartbeat_staleness_ms;
        Ok(self.node_mut(node_id)?.is_healthy(now, staleness))
    }

    pub fn now_ms(&self) -> f64 {
        self.clock.now_ms()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub async fn advance(&mut self, ms: f64) {
        self.clock.advance(ms).await;
    }

    /// Send a message and wait for it to arrive. `None` when it was lost or
    /// the link is down; no time is charged in that case.
    pub async fn send(&mut self, from: &str, to: &str, kind: MessageKind) -> Option<Delivery> {
        let now = self.clock.now_ms();
        let delivery = self.network.transmit(from, to, kind, now, &mut self.rng)?;
        self.clock.advance(delivery.latency_ms).await;
        Some(delivery)
    }

    /// Master pings every node; pings run in the background, so no time is
    /// charged. Returns the ids that answered within the heartbeat timeout.
    pub fn heartbeat_round(&mut self) -> Vec<String> {
        let now = self.clock.now_ms();
        let mut alive = Vec::new();

        for node_id in self.node_ids() {
            let delivered = self.network.transmit(
                &self.master_id,
                &node_id,
                MessageKind::Heartbeat,
                now,
                &mut self.rng,
            );
            let answered = matches!(
                delivered,
                Some(delivery) if delivery.latency_ms <= self.timeouts.heartbeat_ms
            );
            if answered {
                if let Some(node) = self.nodes.get_mut(&node_id) {
                    node.record_heartbeat(now);
                }
                alive.push(node_id);
            }
        }

        tracing::debug!("Heartbeat round: {}/{} nodes answered", alive.len(), self.nodes.len());
        alive
    }

    /// `PREFIX_` plus 8 hex digits, drawn from the seeded RNG.
    pub fn next_id(&mut self, prefix: &str) -> String {
        let bytes: [u8; 16] = self.rng.gen();
        let uuid = uuid::Builder::from_random_bytes(bytes).into_uuid();
        let simple = uuid.simple().to_string();
        format!("{}_{}", prefix, &simple[..8])
    }

    pub fn rng_mut(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::Account;
    use crate::domain::node::NodeState;

    fn cluster() -> Cluster {
        let mut config = SimConfig::default();
        config.network.normal.packet_loss_pct = 0.0;
        Cluster::from_config(&config, Utc::now()).unwrap()
    }

    #[test]
    fn master_and_replicas_follow_roles() {
        let cluster = cluster();
        assert_eq!(cluster.master_id(), "DAKAR");
        assert_eq!(cluster.replica_ids(), vec!["SAINT_LOUIS", "ZIGUINCHOR"]);
        assert!(cluster.node("THIES").is_err());
        assert!(cluster.can_reach_master("ZIGUINCHOR").unwrap());
    }

    #[test]
    fn seed_copies_accounts_to_every_node() {
        let mut cluster = cluster();
        cluster.seed(&SeedData {
            accounts: vec![Account::new("user_001", "+221770000001", "Awa", 5_000)],
            transactions: Vec::new(),
        });
        for node in cluster.nodes() {
            assert_eq!(node.accounts.get("user_001"), Some(&5_000));
        }
    }

    #[test]
    fn ids_are_reproducible_per_seed() {
        let mut first = cluster();
        let mut second = cluster();
        let id = first.next_id("TX");
        assert_eq!(id, second.next_id("TX"));
        assert!(id.starts_with("TX_"));
        assert_eq!(id.len(), 11);
    }

    #[tokio::test]
    async fn send_charges_latency_on_the_clock() {
        let mut cluster = cluster();
        let delivery = cluster
            .send("DAKAR", "SAINT_LOUIS", MessageKind::Prepare)
            .await
            .unwrap();
        assert_eq!(cluster.now_ms(), delivery.latency_ms);
    }

    #[test]
    fn heartbeat_skips_cut_nodes() {
        let mut cluster = cluster();
        cluster.network.simulate_partition("DAKAR", "ZIGUINCHOR");
        let alive = cluster.heartbeat_round();
        assert_eq!(alive, vec!["DAKAR", "SAINT_LOUIS"]);

        cluster.clock.jump_to(10_000.0);
        cluster.heartbeat_round();
        assert!(cluster.is_node_healthy("SAINT_LOUIS").unwrap());
        assert!(!cluster.is_node_healthy("ZIGUINCHOR").unwrap());
        assert_eq!(cluster.node("ZIGUINCHOR").unwrap().state, NodeState::Isolated);
    }
}
