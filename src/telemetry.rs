// Telemetry service: cached query surface over the runtime and the host probe.

use futures_util::StreamExt;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::cache::{FreshnessCache, keys};
use crate::collector::Collector;
use crate::config::{AppConfig, CacheConfig};
use crate::logstream::history;
use crate::models::{ContainerDetail, ContainerSnapshot, LogLine, NetworkTopology, SystemSnapshot};
use crate::runtime::{ContainerAction, ContainerRuntime, LogQuery, RuntimeError};
use crate::sysinfo_repo::SysinfoRepo;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub message: String,
}

pub struct Telemetry {
    runtime: Arc<dyn ContainerRuntime>,
    collector: Collector,
    sysinfo_repo: Arc<SysinfoRepo>,
    cache: FreshnessCache,
    ttl: CacheConfig,
}

impl Telemetry {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        sysinfo_repo: Arc<SysinfoRepo>,
        config: &AppConfig,
    ) -> Self {
        let collector = Collector::new(
            runtime.clone(),
            config.runtime.max_workers,
            std::time::Duration::from_millis(config.runtime.stats_timeout_ms),
        );
        Self {
            runtime,
            collector,
            sysinfo_repo,
            cache: FreshnessCache::new(),
            ttl: config.cache.clone(),
        }
    }

    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    pub fn cache(&self) -> &FreshnessCache {
        &self.cache
    }

    /// Host snapshot, cached for the system TTL. A failed probe yields the zeroed fallback,
    /// which is not cached.
    pub async fn system_snapshot(&self) -> Arc<SystemSnapshot> {
        let result = self
            .cache
            .try_get_or_compute(keys::SYSTEM, self.ttl.system_ttl(), || {
                self.sysinfo_repo.get_system_snapshot()
            })
            .await;
        result.unwrap_or_else(|e| {
            warn!(error = %e, operation = "get_system_snapshot", "host probe failed; serving fallback");
            Arc::new(SystemSnapshot::fallback())
        })
    }

    /// Every container's snapshot, cached for the container TTL. An unreachable runtime yields
    /// an empty list.
    pub async fn containers(&self) -> Arc<Vec<ContainerSnapshot>> {
        let result = self
            .cache
            .try_get_or_compute(keys::CONTAINERS, self.ttl.container_ttl(), || {
                self.collector.collect_all()
            })
            .await;
        result.unwrap_or_else(|e| {
            warn!(error = %e, operation = "list_containers", "container listing failed");
            Arc::new(Vec::new())
        })
    }

    /// Recollect the container list now, replacing whatever is cached.
    pub async fn refresh_containers(&self) -> Result<Arc<Vec<ContainerSnapshot>>, RuntimeError> {
        let fresh = self.collector.collect_all().await?;
        Ok(self
            .cache
            .insert(keys::CONTAINERS, self.ttl.container_ttl(), fresh))
    }

    /// Full runtime id for a name or id prefix a caller has used before, else `reference` itself.
    fn canonical_id(&self, reference: &str) -> String {
        self.cache
            .get::<String>(&keys::container_alias(reference))
            .map_or_else(|| reference.to_string(), |full| full.as_str().to_string())
    }

    /// Detail view for a container addressed by full id, id prefix or name. Entries are keyed
    /// by the full id so lifecycle events, which carry full ids, evict them.
    pub async fn container_detail(&self, id: &str) -> Result<Arc<ContainerDetail>, RuntimeError> {
        let ttl = self.ttl.container_ttl();
        let key = keys::container_detail(&self.canonical_id(id));
        if let Some(hit) = self.cache.get::<ContainerDetail>(&key) {
            return Ok(hit);
        }
        let detail = self.collector.detail(id).await?;
        let full = match detail.snapshot.id.as_str() {
            "" => id.to_string(),
            full => full.to_string(),
        };
        if full != id {
            self.cache.insert(&keys::container_alias(id), ttl, full.clone());
        }
        Ok(self.cache.insert(&keys::container_detail(&full), ttl, detail))
    }

    /// Network topology, cached for the network TTL. Failures yield an empty topology.
    pub async fn networks(&self) -> Arc<NetworkTopology> {
        let result = self
            .cache
            .try_get_or_compute(keys::NETWORKS, self.ttl.network_ttl(), || {
                self.collector.network_topology()
            })
            .await;
        result.unwrap_or_else(|e| {
            warn!(error = %e, operation = "network_topology", "network scan failed");
            Arc::new(NetworkTopology::new())
        })
    }

    pub async fn daemon_info(&self) -> Result<Arc<serde_json::Value>, RuntimeError> {
        self.cache
            .try_get_or_compute(keys::DAEMON_INFO, self.ttl.daemon_info_ttl(), || {
                self.runtime.daemon_info()
            })
            .await
    }

    pub async fn health(&self) -> Health {
        match self.runtime.ping().await {
            Ok(()) => Health {
                status: "healthy",
                message: "All systems operational".into(),
            },
            Err(e) => Health {
                status: "unhealthy",
                message: e.to_string(),
            },
        }
    }

    /// Apply a lifecycle mutation, then evict everything cached for that container together
    /// with the network topology.
    pub async fn apply(&self, id: &str, action: ContainerAction) -> Result<(), RuntimeError> {
        let result = self.runtime.apply(id, action).await;
        self.cache.invalidate_container(&self.canonical_id(id));
        match &result {
            Ok(()) => info!(container = %id, action = action.past_tense(), "container mutated"),
            Err(e) => warn!(container = %id, error = %e, "container mutation failed"),
        }
        result
    }

    /// Already-written logs for one container, oldest first as the runtime returns them.
    pub async fn container_logs(
        &self,
        id: &str,
        tail: u32,
        since: Option<i64>,
    ) -> Result<Vec<LogLine>, RuntimeError> {
        let query = LogQuery {
            tail,
            since,
            follow: false,
        };
        let mut stream = self.runtime.logs(id, query);
        let mut lines = Vec::new();
        while let Some(item) = stream.next().await {
            match item {
                Ok(raw) => lines.push(LogLine::parse(&raw)),
                Err(e) if lines.is_empty() => return Err(e),
                Err(e) => {
                    warn!(container = %id, error = %e, "log fetch ended early");
                    break;
                }
            }
        }
        Ok(lines)
    }

    /// Merged historical view across every member of `network`, ordered by parsed timestamp.
    pub async fn network_logs(&self, network: &str, tail: u32) -> Result<Vec<LogLine>, RuntimeError> {
        let topology = self.networks().await;
        let entry = topology
            .get(network)
            .ok_or_else(|| RuntimeError::NotFound(format!("network {}", network)))?;
        Ok(history::merged(self.runtime.as_ref(), &entry.containers, tail).await)
    }
}
