use crate::core::cluster::Cluster;
use crate::domain::model::{OperationResult, ReadSource, ResultPayload};
use crate::domain::node::{history_key, CachedValue};
use crate::services::track;
use crate::utils::error::Result;
use serde::Serialize;

pub const DEFAULT_HISTORY_LIMIT: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryStatistics {
    pub total_queries: u64,
}

/// Transaction history, always served from the node asked (AP).
pub struct HistoryService {
    read_latency_ms: f64,
    cache_ttl_secs: u64,
    queries: u64,
}

impl HistoryService {
    pub fn new(read_latency_ms: f64, cache_ttl_secs: u64) -> Self {
        Self {
            read_latency_ms,
            cache_ttl_secs,
            queries: 0,
        }
    }

    pub async fn get_history(
        &mut self,
        cluster: &mut Cluster,
        user_id: &str,
        node_id: &str,
        limit: usize,
    ) -> Result<OperationResult> {
        self.queries += 1;
        let started = cluster.now_ms();
        tracing::debug!("[History] Query history for {} on {}", user_id, node_id);

        let cached = match cluster.node_mut(node_id)?.cache_get(&history_key(user_id), started) {
            Some(CachedValue::History(entries)) => Some(entries),
            _ => None,
        };

        let result = if let Some(entries) = cached {
            tracing::debug!("[History]   Cache HIT: {} transactions", entries.len());
            let count = entries.len();
            OperationResult::succeeded(0.0).with_payload(ResultPayload::History {
                transactions: entries.into_iter().take(limit).collect(),
                count,
                source: ReadSource::Cache,
            })
        } else {
            cluster.advance(self.read_latency_ms).await;
            let now = cluster.now_ms();
            let latency = cluster.clock.since(started);
            let node = cluster.node_mut(node_id)?;
            let source = if node.is_master() {
                ReadSource::Master
            } else {
                ReadSource::ReplicaLocal
            };
            let entries = node.get_transactions(user_id, false, now);
            let count = entries.len();

            let mut result = OperationResult::succeeded(latency);
            if !entries.is_empty() {
                node.cache_put(
                    &history_key(user_id),
                    CachedValue::History(entries.clone()),
                    self.cache_ttl_secs,
                    now,
                );
                result = result.with_warning("Very recent transactions may not appear yet");
            }
            tracing::debug!("[History]   Found {} transactions ({:.0}ms)", count, latency);

            result.with_payload(ResultPayload::History {
                transactions: entries.into_iter().take(limit).collect(),
                count,
                source,
            })
        };

        track(cluster, node_id, &result)?;
        Ok(result)
    }

    pub fn statistics(&self) -> HistoryStatistics {
        HistoryStatistics {
            total_queries: self.queries,
        }
    }
}
