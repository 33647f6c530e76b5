// Host-level snapshot models

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub total: u64,
    pub used: u64,
    pub percent: f64,
    pub available: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiskStats {
    pub total: u64,
    pub used: u64,
    pub percent: f64,
    pub free: u64,
}

/// Host-lifetime interface counters summed over all interfaces.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkCounters {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadAverage {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemSnapshot {
    pub cpu_cores: u32,
    pub cpu_usage_percent: f64,
    pub memory: MemoryStats,
    pub disk: DiskStats,
    pub network: NetworkCounters,
    /// Absent on platforms without load averages.
    pub load_average: Option<LoadAverage>,
    pub uptime_seconds: u64,
    /// RFC 3339 capture time (UTC).
    pub timestamp: String,
}

impl SystemSnapshot {
    /// Zeroed snapshot served when the host probe fails.
    pub fn fallback() -> Self {
        Self {
            cpu_cores: 1,
            cpu_usage_percent: 0.0,
            memory: MemoryStats::default(),
            disk: DiskStats::default(),
            network: NetworkCounters::default(),
            load_average: None,
            uptime_seconds: 0,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
