// Parallel snapshot collection: inspect + usage + derivation per container, fanned out with a
// concurrency bound. One container's failure never fails the batch.

use bollard::models::ContainerInspectResponse;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::metrics;
use crate::models::{
    ContainerDetail, ContainerMetrics, ContainerRef, ContainerSnapshot, ContainerStatus,
    NetworkEntry, NetworkTopology,
};
use crate::runtime::{ContainerHandle, ContainerRuntime, RuntimeError};

const SHORT_ID_LEN: usize = 12;

pub struct Collector {
    runtime: Arc<dyn ContainerRuntime>,
    max_workers: usize,
    stats_timeout: Duration,
}

impl Collector {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, max_workers: usize, stats_timeout: Duration) -> Self {
        Self {
            runtime,
            max_workers: max_workers.max(1),
            stats_timeout,
        }
    }

    /// Snapshot every container the runtime knows about (running or not).
    pub async fn collect_all(&self) -> Result<Vec<ContainerSnapshot>, RuntimeError> {
        let handles = self.runtime.list_containers(true).await?;
        Ok(self.collect(handles).await)
    }

    /// Snapshot a batch with at most `min(max_workers, N)` fetches in flight.
    /// Results come back in completion order; containers whose inspect fails are omitted.
    pub async fn collect(&self, handles: Vec<ContainerHandle>) -> Vec<ContainerSnapshot> {
        let limit = self.max_workers.min(handles.len()).max(1);
        futures_util::stream::iter(handles)
            .map(|h| async move {
                match self.snapshot(&h.id).await {
                    Ok(s) => Some(s),
                    Err(e) => {
                        warn!(container = %h.name, error = %e, "skipping container: inspect failed");
                        None
                    }
                }
            })
            .buffer_unordered(limit)
            .filter_map(|s| async move { s })
            .collect()
            .await
    }

    /// Inspect one container and, when it is running, attach derived usage metrics.
    /// Usage failures zero-fill the metrics; inspect failures propagate.
    pub async fn snapshot(&self, id: &str) -> Result<ContainerSnapshot, RuntimeError> {
        Ok(self.detail(id).await?.snapshot)
    }

    pub async fn detail(&self, id: &str) -> Result<ContainerDetail, RuntimeError> {
        let inspect = self.runtime.inspect(id).await?;
        let status = status_of(&inspect);
        let metrics = if status.is_running() {
            self.usage_metrics(id).await
        } else {
            ContainerMetrics::default()
        };
        Ok(detail_from_inspect(&inspect, metrics, Utc::now()))
    }

    async fn usage_metrics(&self, id: &str) -> ContainerMetrics {
        match tokio::time::timeout(self.stats_timeout, self.runtime.usage_snapshot(id)).await {
            Ok(Ok(stats)) => metrics::derive(&stats),
            Ok(Err(e)) => {
                warn!(container = %id, error = %e, "usage snapshot failed; metrics zero-filled");
                ContainerMetrics::default()
            }
            Err(_) => {
                warn!(
                    container = %id,
                    timeout_ms = self.stats_timeout.as_millis() as u64,
                    "usage snapshot timed out; metrics zero-filled"
                );
                ContainerMetrics::default()
            }
        }
    }

    /// Full two-pass scan: enumerate networks, then enumerate containers and bucket them by
    /// membership.
    pub async fn network_topology(&self) -> Result<NetworkTopology, RuntimeError> {
        let networks = self.runtime.list_networks().await?;
        let containers = self.runtime.list_containers(true).await?;

        let mut topology: NetworkTopology = networks
            .into_iter()
            .map(|n| {
                let entry = NetworkEntry {
                    id: n.id,
                    name: n.name.clone(),
                    driver: n.driver,
                    scope: n.scope,
                    subnet: n.subnet,
                    created: n.created,
                    containers: Vec::new(),
                };
                (n.name, entry)
            })
            .collect();

        for c in &containers {
            for (network, ip) in &c.networks {
                match topology.get_mut(network) {
                    Some(entry) => entry.containers.push(ContainerRef {
                        id: c.id.clone(),
                        name: c.name.clone(),
                        status: c.status.clone(),
                        ip_address: ip.split('/').next().unwrap_or_default().to_string(),
                    }),
                    None => debug!(network = %network, container = %c.name, "member of unlisted network"),
                }
            }
        }
        for entry in topology.values_mut() {
            entry.containers.sort_by(|a, b| a.name.cmp(&b.name));
        }
        Ok(topology)
    }
}

fn status_of(inspect: &ContainerInspectResponse) -> ContainerStatus {
    inspect
        .state
        .as_ref()
        .and_then(|s| s.status.as_ref())
        .map(|s| ContainerStatus::from_docker(&s.to_string()))
        .unwrap_or(ContainerStatus::Unknown)
}

fn short(id: &str) -> String {
    id.chars().take(SHORT_ID_LEN).collect()
}

/// Render port mappings as `host_port:container_port`, or the bare container port when unbound.
fn port_mappings(inspect: &ContainerInspectResponse) -> Vec<String> {
    let Some(ports) = inspect
        .network_settings
        .as_ref()
        .and_then(|ns| ns.ports.as_ref())
    else {
        return Vec::new();
    };
    let mut out: Vec<String> = Vec::new();
    for (container_port, bindings) in ports {
        match bindings.as_ref().filter(|b| !b.is_empty()) {
            Some(bindings) => out.extend(bindings.iter().map(|b| {
                format!(
                    "{}:{}",
                    b.host_port.as_deref().unwrap_or_default(),
                    container_port
                )
            })),
            None => out.push(container_port.clone()),
        }
    }
    out.sort();
    out
}

/// Assemble a detail view from inspect attributes and already-derived metrics.
pub fn detail_from_inspect(
    inspect: &ContainerInspectResponse,
    metrics: ContainerMetrics,
    now: DateTime<Utc>,
) -> ContainerDetail {
    let id = inspect.id.clone().unwrap_or_default();
    let status = status_of(inspect);
    let state = inspect.state.as_ref();
    let started = state
        .and_then(|s| s.started_at.clone())
        .unwrap_or_default();
    let finished = state
        .and_then(|s| s.finished_at.clone())
        .unwrap_or_default();
    let config = inspect.config.as_ref();

    let image = config
        .and_then(|c| c.image.clone())
        .filter(|i| !i.is_empty())
        .unwrap_or_else(|| {
            let image_id = inspect.image.as_deref().unwrap_or_default();
            short(image_id.trim_start_matches("sha256:"))
        });

    let mut networks: Vec<String> = inspect
        .network_settings
        .as_ref()
        .and_then(|ns| ns.networks.as_ref())
        .map(|n| n.keys().cloned().collect())
        .unwrap_or_default();
    networks.sort();

    let uptime_seconds = if status.is_running() {
        metrics::uptime_seconds(now, &started)
    } else {
        0
    };

    let snapshot = ContainerSnapshot {
        short_id: short(&id),
        id,
        name: inspect
            .name
            .as_deref()
            .unwrap_or_default()
            .trim_start_matches('/')
            .to_string(),
        status,
        image,
        created: inspect
            .created
            .as_ref()
            .map(|c| c.to_string())
            .unwrap_or_default(),
        started,
        finished,
        metrics,
        uptime_seconds,
        ports: port_mappings(inspect),
        labels: config.and_then(|c| c.labels.clone()).unwrap_or_default(),
        restart_count: inspect.restart_count.unwrap_or(0),
        networks,
    };

    ContainerDetail {
        snapshot,
        platform: inspect
            .platform
            .clone()
            .unwrap_or_else(|| "unknown".into()),
        mounts: inspect
            .mounts
            .as_ref()
            .map(|mounts| {
                mounts
                    .iter()
                    .map(|m| {
                        format!(
                            "{}:{}",
                            m.source.as_deref().unwrap_or_default(),
                            m.destination.as_deref().unwrap_or_default()
                        )
                    })
                    .collect()
            })
            .unwrap_or_default(),
        env_vars: config.and_then(|c| c.env.clone()).unwrap_or_default(),
    }
}
