use crate::domain::model::{Amount, LedgerEntry, Transaction};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    Master,
    /// Read-write replica.
    ReplicaRw,
    /// Read-only replica.
    ReplicaRo,
    /// Backup plus analytics workloads.
    ReplicaAnalytics,
}

impl NodeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::Master => "master",
            NodeRole::ReplicaRw => "replica_rw",
            NodeRole::ReplicaRo => "replica_ro",
            NodeRole::ReplicaAnalytics => "replica_analytics",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Healthy,
    Degraded,
    /// Cut off by a network partition or a stale heartbeat.
    Isolated,
    Down,
}

impl NodeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeState::Healthy => "healthy",
            NodeState::Degraded => "degraded",
            NodeState::Isolated => "isolated",
            NodeState::Down => "down",
        }
    }
}

pub fn balance_key(user_id: &str) -> String {
    format!("balance:{}", user_id)
}

pub fn history_key(user_id: &str) -> String {
    format!("history:{}", user_id)
}

#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    Balance(Amount),
    History(Vec<LedgerEntry>),
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: CachedValue,
    expires_at_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeMetrics {
    pub node_id: String,
    pub name: String,
    pub role: NodeRole,
    pub state: NodeState,
    pub request_count: u64,
    pub error_count: u64,
    pub error_rate: f64,
    pub avg_latency_ms: f64,
    pub cache_size: usize,
}

/// One server of the replicated deployment with its local database.
///
/// Times are virtual milliseconds on the simulation clock.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: String,
    pub name: String,
    pub role: NodeRole,
    pub location: (f64, f64),
    pub capacity: u32,
    pub state: NodeState,

    pub accounts: BTreeMap<String, Amount>,
    pub transactions: Vec<LedgerEntry>,
    cache: HashMap<String, CacheEntry>,

    pub last_heartbeat_ms: f64,
    pub request_count: u64,
    pub error_count: u64,
    pub total_latency_ms: f64,

    /// Peer id -> reachable. Missing peers are assumed reachable.
    pub can_reach: HashMap<String, bool>,
}

impl Node {
    pub fn new(id: &str, name: &str, role: NodeRole, location: (f64, f64), capacity: u32) -> Self {
        tracing::debug!("[Node] {} ({}) initialized", name, role.as_str());
        Self {
            id: id.to_string(),
            name: name.to_string(),
            role,
            location,
            capacity,
            state: NodeState::Healthy,
            accounts: BTreeMap::new(),
            transactions: Vec::new(),
            cache: HashMap::new(),
            last_heartbeat_ms: 0.0,
            request_count: 0,
            error_count: 0,
            total_latency_ms: 0.0,
            can_reach: HashMap::new(),
        }
    }

    pub fn is_master(&self) -> bool {
        self.role == NodeRole::Master
    }

    pub fn can_write(&self) -> bool {
        matches!(self.role, NodeRole::Master | NodeRole::ReplicaRw)
    }

    pub fn can_reach_node(&self, node_id: &str) -> bool {
        node_id == self.id || self.can_reach.get(node_id).copied().unwrap_or(true)
    }

    pub fn can_reach_master(&self, master_id: &str) -> bool {
        self.is_master() || self.can_reach_node(master_id)
    }

    fn reaches_every_peer(&self) -> bool {
        self.can_reach.values().all(|reachable| *reachable)
    }

    pub fn record_heartbeat(&mut self, now_ms: f64) {
        self.last_heartbeat_ms = now_ms;
        if self.state == NodeState::Isolated && self.reaches_every_peer() {
            self.state = NodeState::Healthy;
        }
    }

    pub fn is_healthy(&mut self, now_ms: f64, staleness_ms: f64) -> bool {
        if now_ms - self.last_heartbeat_ms > staleness_ms {
            self.state = NodeState::Isolated;
            return false;
        }
        self.state == NodeState::Healthy
    }

    pub fn get_balance(&mut self, user_id: &str, from_cache: bool, now_ms: f64) -> Option<Amount> {
        self.request_count += 1;

        if from_cache {
            if let Some(balance) = self.cached_balance(user_id, now_ms) {
                return Some(balance);
            }
        }

        self.accounts.get(user_id).copied()
    }

    /// Cache-only lookup; does not fall through to the local database.
    pub fn cached_balance(&mut self, user_id: &str, now_ms: f64) -> Option<Amount> {
        match self.cache_get(&balance_key(user_id), now_ms) {
            Some(CachedValue::Balance(balance)) => Some(balance),
            _ => None,
        }
    }

    pub fn set_balance(&mut self, user_id: &str, balance: Amount) {
        self.accounts.insert(user_id.to_string(), balance);
        self.invalidate(&balance_key(user_id));
    }

    pub fn add_transaction(&mut self, transaction: &Transaction, at: DateTime<Utc>) {
        self.transactions.push(LedgerEntry {
            transaction: transaction.clone(),
            node_id: self.id.clone(),
            recorded_at: at,
        });
    }

    /// Replace the ledger copy of `transaction`. False when it is not recorded here.
    pub fn update_transaction(&mut self, transaction: &Transaction) -> bool {
        match self
            .transactions
            .iter_mut()
            .find(|entry| entry.transaction.transaction_id == transaction.transaction_id)
        {
            Some(entry) => {
                entry.transaction = transaction.clone();
                true
            }
            None => false,
        }
    }

    pub fn has_transaction(&self, transaction_id: &str) -> bool {
        self.transactions
            .iter()
            .any(|entry| entry.transaction.transaction_id == transaction_id)
    }

    pub fn get_transactions(
        &mut self,
        user_id: &str,
        from_cache: bool,
        now_ms: f64,
    ) -> Vec<LedgerEntry> {
        self.request_count += 1;

        if from_cache {
            if let Some(CachedValue::History(history)) =
                self.cache_get(&history_key(user_id), now_ms)
            {
                return history;
            }
        }

        self.transactions
            .iter()
            .filter(|entry| entry.transaction.involves(user_id))
            .cloned()
            .collect()
    }

    pub fn cache_get(&mut self, key: &str, now_ms: f64) -> Option<CachedValue> {
        let expired = match self.cache.get(key) {
            Some(entry) if now_ms < entry.expires_at_ms => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.cache.remove(key);
        }
        None
    }

    pub fn cache_put(&mut self, key: &str, value: CachedValue, ttl_secs: u64, now_ms: f64) {
        let expires_at_ms = now_ms + ttl_secs as f64 * 1000.0;
        self.cache.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at_ms,
            },
        );
    }

    pub fn invalidate(&mut self, key: &str) {
        self.cache.remove(key);
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }

    pub fn record_latency(&mut self, latency_ms: f64) {
        self.total_latency_ms += latency_ms;
    }

    pub fn record_error(&mut self) {
        self.error_count += 1;
    }

    pub fn metrics(&self) -> NodeMetrics {
        let (avg_latency_ms, error_rate) = if self.request_count > 0 {
            (
                self.total_latency_ms / self.request_count as f64,
                self.error_count as f64 / self.request_count as f64 * 100.0,
            )
        } else {
            (0.0, 0.0)
        };

        NodeMetrics {
            node_id: self.id.clone(),
            name: self.name.clone(),
            role: self.role,
            state: self.state,
            request_count: self.request_count,
            error_count: self.error_count,
            error_rate,
            avg_latency_ms,
            cache_size: self.cache.len(),
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Node({}, {}, {})",
            self.name,
            self.role.as_str(),
            self.state.as_str()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::TransactionType;

    fn replica() -> Node {
        let mut node = Node::new(
            "SAINT_LOUIS",
            "Saint-Louis",
            NodeRole::ReplicaRw,
            (16.0179, -16.5119),
            5000,
        );
        node.accounts.insert("user_001".to_string(), 10_000);
        node
    }

    #[test]
    fn roles_decide_write_access() {
        let master = Node::new("DAKAR", "Dakar", NodeRole::Master, (0.0, 0.0), 1);
        let analytics = Node::new("ZIG", "Ziguinchor", NodeRole::ReplicaAnalytics, (0.0, 0.0), 1);
        assert!(master.can_write());
        assert!(replica().can_write());
        assert!(!analytics.can_write());
        assert!(master.can_reach_master("ANYWHERE"));
    }

    #[test]
    fn cached_balance_expires_after_ttl() {
        let mut node = replica();
        node.cache_put(&balance_key("user_001"), CachedValue::Balance(9_000), 60, 0.0);

        assert_eq!(node.cached_balance("user_001", 59_999.0), Some(9_000));
        assert_eq!(node.cached_balance("user_001", 60_000.0), None);
        assert_eq!(node.cache_size(), 0);
        // falls through to the local database once the entry is gone
        assert_eq!(node.get_balance("user_001", true, 60_000.0), Some(10_000));
    }

    #[test]
    fn set_balance_invalidates_cached_value() {
        let mut node = replica();
        node.cache_put(&balance_key("user_001"), CachedValue::Balance(1), 60, 0.0);
        node.set_balance("user_001", 7_500);
        assert_eq!(node.cached_balance("user_001", 1.0), None);
        assert_eq!(node.get_balance("user_001", true, 1.0), Some(7_500));
    }

    #[test]
    fn history_filters_by_participant() {
        let mut node = replica();
        let at = Utc::now();
        let tx = Transaction::new(
            "TX_1".to_string(),
            TransactionType::Transfer,
            "user_001",
            Some("user_002"),
            100,
            at,
        );
        let other = Transaction::new(
            "TX_2".to_string(),
            TransactionType::Transfer,
            "user_003",
            Some("user_004"),
            100,
            at,
        );
        node.add_transaction(&tx, at);
        node.add_transaction(&other, at);

        let history = node.get_transactions("user_002", false, 0.0);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].node_id, "SAINT_LOUIS");
        assert!(node.has_transaction("TX_2"));
    }

    #[test]
    fn stale_heartbeat_isolates_until_refreshed() {
        let mut node = replica();
        node.record_heartbeat(1_000.0);
        assert!(node.is_healthy(3_500.0, 3_000.0));
        assert!(!node.is_healthy(4_500.0, 3_000.0));
        assert_eq!(node.state, NodeState::Isolated);

        node.record_heartbeat(4_600.0);
        assert!(node.is_healthy(4_700.0, 3_000.0));
    }

    #[test]
    fn partitioned_node_stays_isolated_on_heartbeat() {
        let mut node = replica();
        node.can_reach.insert("DAKAR".to_string(), false);
        node.state = NodeState::Isolated;
        node.record_heartbeat(10.0);
        assert_eq!(node.state, NodeState::Isolated);
        assert!(!node.can_reach_master("DAKAR"));
    }

    #[test]
    fn metrics_average_over_requests() {
        let mut node = replica();
        node.get_balance("user_001", false, 0.0);
        node.get_balance("user_001", false, 0.0);
        node.record_latency(100.0);
        node.record_error();
        let metrics = node.metrics();
        assert_eq!(metrics.request_count, 2);
        assert_eq!(metrics.avg_latency_ms, 50.0);
        assert_eq!(metrics.error_rate, 50.0);
    }
}
