// Container snapshot models

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::metrics::{bytes_to_mb, round2};

/// Container lifecycle status; serializes to lowercase JSON (e.g. "running").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    Created,
    Running,
    Paused,
    Restarting,
    Removing,
    Exited,
    Dead,
    #[serde(other)]
    Unknown,
}

impl ContainerStatus {
    /// Parse from the runtime's status string (e.g. "running", "exited").
    pub fn from_docker(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "created" => ContainerStatus::Created,
            "running" => ContainerStatus::Running,
            "paused" => ContainerStatus::Paused,
            "restarting" => ContainerStatus::Restarting,
            "removing" => ContainerStatus::Removing,
            "exited" => ContainerStatus::Exited,
            "dead" => ContainerStatus::Dead,
            _ => ContainerStatus::Unknown,
        }
    }

    pub fn is_running(self) -> bool {
        self == ContainerStatus::Running
    }
}

/// Derived resource metrics at full precision. The JSON form reports MB rounded to two decimals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(into = "MetricsWire")]
pub struct ContainerMetrics {
    pub cpu_percent: f64,
    pub memory_usage_bytes: u64,
    pub memory_limit_bytes: u64,
    pub memory_percent: f64,
    pub memory_cache_bytes: u64,
    pub network_rx_bytes: u64,
    pub network_tx_bytes: u64,
    pub block_read_bytes: u64,
    pub block_write_bytes: u64,
}

#[derive(Serialize)]
struct MetricsWire {
    cpu_percent: f64,
    memory_usage_mb: f64,
    memory_limit_mb: f64,
    memory_percent: f64,
    memory_cache_mb: f64,
    network_rx_mb: f64,
    network_tx_mb: f64,
    block_read_mb: f64,
    block_write_mb: f64,
}

impl From<ContainerMetrics> for MetricsWire {
    fn from(m: ContainerMetrics) -> Self {
        Self {
            cpu_percent: round2(m.cpu_percent),
            memory_usage_mb: round2(bytes_to_mb(m.memory_usage_bytes)),
            memory_limit_mb: round2(bytes_to_mb(m.memory_limit_bytes)),
            memory_percent: round2(m.memory_percent),
            memory_cache_mb: round2(bytes_to_mb(m.memory_cache_bytes)),
            network_rx_mb: round2(bytes_to_mb(m.network_rx_bytes)),
            network_tx_mb: round2(bytes_to_mb(m.network_tx_bytes)),
            block_read_mb: round2(bytes_to_mb(m.block_read_bytes)),
            block_write_mb: round2(bytes_to_mb(m.block_write_bytes)),
        }
    }
}

/// Point-in-time capture of one container. Superseded by the next collection, never mutated.
#[derive(Debug, Clone, Serialize)]
pub struct ContainerSnapshot {
    pub id: String,
    pub short_id: String,
    pub name: String,
    pub status: ContainerStatus,
    pub image: String,
    pub created: String,
    pub started: String,
    pub finished: String,
    #[serde(flatten)]
    pub metrics: ContainerMetrics,
    pub uptime_seconds: u64,
    pub ports: Vec<String>,
    pub labels: HashMap<String, String>,
    pub restart_count: i64,
    pub networks: Vec<String>,
}

/// Snapshot plus the attributes only the single-container view carries.
#[derive(Debug, Clone, Serialize)]
pub struct ContainerDetail {
    #[serde(flatten)]
    pub snapshot: ContainerSnapshot,
    pub platform: String,
    pub mounts: Vec<String>,
    pub env_vars: Vec<String>,
}
