use crate::core::cluster::Cluster;
use crate::core::network::MessageKind;
use crate::domain::model::{Freshness, OperationResult, ReadSource, ResultPayload};
use crate::domain::node::{balance_key, CachedValue};
use crate::services::track;
use crate::utils::error::Result;
use serde::{Deserialize, Serialize};

const UNAVAILABLE: &str = "Service temporarily unavailable";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReadStrategy {
    /// Local cache, then the local replica.
    Ap,
    /// Master only.
    Cp,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceStatistics {
    pub total_queries: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_hit_rate: f64,
}

pub struct BalanceService {
    timeout_ms: f64,
    read_latency_ms: f64,
    cache_ttl_secs: u64,
    queries: u64,
    hits: u64,
    misses: u64,
}

impl BalanceService {
    pub fn new(timeout_ms: f64, read_latency_ms: f64, cache_ttl_secs: u64) -> Self {
        Self {
            timeout_ms,
            read_latency_ms,
            cache_ttl_secs,
            queries: 0,
            hits: 0,
            misses: 0,
        }
    }

    pub async fn get_balance(
        &mut self,
        cluster: &mut Cluster,
        user_id: &str,
        node_id: &str,
        strategy: ReadStrategy,
    ) -> Result<OperationResult> {
        self.queries += 1;
        tracing::debug!(
            "[Balance] Query balance for {} on {} ({:?})",
            user_id,
            node_id,
            strategy
        );

        let result = match strategy {
            ReadStrategy::Ap => self.read_ap(cluster, user_id, node_id).await?,
            ReadStrategy::Cp => self.read_cp(cluster, user_id, node_id).await?,
        };
        track(cluster, node_id, &result)?;
        Ok(result)
    }

    async fn read_ap(
        &mut self,
        cluster: &mut Cluster,
        user_id: &str,
        node_id: &str,
    ) -> Result<OperationResult> {
        let started = cluster.now_ms();

        if let Some(balance) = cluster.node_mut(node_id)?.cached_balance(user_id, started) {
            self.hits += 1;
            tracing::debug!("[Balance]   Cache HIT: {} FCFA", balance);
            return Ok(OperationResult::succeeded(0.0).with_payload(ResultPayload::Balance {
                balance,
                source: ReadSource::Cache,
                freshness: Freshness::Cached,
            }));
        }

        self.misses += 1;
        tracing::debug!("[Balance]   Cache MISS, reading local replica {}", node_id);
        cluster.advance(self.read_latency_ms).await;

        let now = cluster.now_ms();
        let latency = cluster.clock.since(started);
        let node = cluster.node_mut(node_id)?;
        match node.get_balance(user_id, false, now) {
            Some(balance) => {
                node.cache_put(
                    &balance_key(user_id),
                    CachedValue::Balance(balance),
                    self.cache_ttl_secs,
                    now,
                );
                Ok(OperationResult::succeeded(latency)
                    .with_payload(ResultPayload::Balance {
                        balance,
                        source: ReadSource::ReplicaLocal,
                        freshness: Freshness::Recent,
                    })
                    .with_warning("Data may be a few seconds behind"))
            }
            None => {
                tracing::debug!("[Balance]   Account {} not found", user_id);
                Ok(OperationResult::failed("Account not found", latency))
            }
        }
    }

    async fn read_cp(
        &mut self,
        cluster: &mut Cluster,
        user_id: &str,
        origin: &str,
    ) -> Result<OperationResult> {
        let started = cluster.now_ms();

        if !cluster.can_reach_master(origin)? {
            tracing::debug!("[Balance]   {} cannot reach master (partition?)", origin);
            return Ok(OperationResult::failed(UNAVAILABLE, 0.0)
                .with_reason("Cannot reach master node"));
        }

        let master_id = cluster.master_id().to_string();
        if cluster
            .send(origin, &master_id, MessageKind::BalanceQuery)
            .await
            .is_none()
        {
            return Ok(OperationResult::failed(UNAVAILABLE, cluster.clock.since(started))
                .with_reason("Master unreachable"));
        }
        if cluster.clock.since(started) > self.timeout_ms {
            return Ok(OperationResult::failed(UNAVAILABLE, cluster.clock.since(started))
                .with_reason("Balance query timeout"));
        }

        cluster.advance(self.read_latency_ms).await;
        let now = cluster.now_ms();
        let latency = cluster.clock.since(started);
        match cluster.master_mut()?.get_balance(user_id, false, now) {
            Some(balance) => Ok(OperationResult::succeeded(latency).with_payload(
                ResultPayload::Balance {
                    balance,
                    source: ReadSource::Master,
                    freshness: Freshness::GuaranteedAccurate,
                },
            )),
            None => Ok(OperationResult::failed("Account not found", latency)),
        }
    }

    pub fn statistics(&self) -> BalanceStatistics {
        BalanceStatistics {
            total_queries: self.queries,
            cache_hits: self.hits,
            cache_misses: self.misses,
            cache_hit_rate: if self.queries > 0 {
                self.hits as f64 / self.queries as f64 * 100.0
            } else {
                0.0
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;
    use crate::domain::model::{Account, SeedData};
    use chrono::Utc;

    fn cluster() -> Cluster {
        let mut config = SimConfig::default();
        config.network.normal.packet_loss_pct = 0.0;
        let mut cluster = Cluster::from_config(&config, Utc::now()).unwrap();
        cluster.seed(&SeedData {
            accounts: vec![Account::new("user_001", "+221770000001", "Awa", 10_000)],
            transactions: Vec::new(),
        });
        cluster
    }

    #[tokio::test]
    async fn ap_read_misses_then_hits_cache() {
        let mut cluster = cluster();
        let mut service = BalanceService::new(2_000.0, 50.0, 60);

        let first = service
            .get_balance(&mut cluster, "user_001", "SAINT_LOUIS", ReadStrategy::Ap)
            .await
            .unwrap();
        assert_eq!(first.read_source(), Some(ReadSource::ReplicaLocal));
        assert_eq!(first.latency_ms, 50.0);
        assert!(first.warning.is_some());

        let second = service
            .get_balance(&mut cluster, "user_001", "SAINT_LOUIS", ReadStrategy::Ap)
            .await
            .unwrap();
        assert_eq!(second.read_source(), Some(ReadSource::Cache));
        assert_eq!(second.balance(), Some(10_000));

        let stats = service.statistics();
        assert_eq!((stats.cache_hits, stats.cache_misses), (1, 1));
        assert_eq!(stats.cache_hit_rate, 50.0);
    }

    #[tokio::test]
    async fn ap_read_of_unknown_account_fails() {
        let mut cluster = cluster();
        let mut service = BalanceService::new(2_000.0, 50.0, 60);
        let result = service
            .get_balance(&mut cluster, "ghost", "ZIGUINCHOR", ReadStrategy::Ap)
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("Account not found"));
    }

    #[tokio::test]
    async fn cp_read_needs_the_master() {
        let mut cluster = cluster();
        let mut service = BalanceService::new(2_000.0, 50.0, 60);

        let ok = service
            .get_balance(&mut cluster, "user_001", "ZIGUINCHOR", ReadStrategy::Cp)
            .await
            .unwrap();
        assert_eq!(ok.read_source(), Some(ReadSource::Master));
        assert!(ok.latency_ms >= 170.0);

        cluster
            .node_mut("ZIGUINCHOR")
            .unwrap()
            .can_reach
            .insert("DAKAR".to_string(), false);
        let blocked = service
            .get_balance(&mut cluster, "user_001", "ZIGUINCHOR", ReadStrategy::Cp)
            .await
            .unwrap();
        assert!(!blocked.success);
        assert_eq!(blocked.error.as_deref(), Some(UNAVAILABLE));
        assert_eq!(blocked.reason.as_deref(), Some("Cannot reach master node"));
    }
}
