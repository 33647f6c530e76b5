// Host stats via sysinfo

mod disk;

use crate::models::*;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use sysinfo::{Disks, Networks, System};
use tracing::instrument;

pub struct SysinfoRepo {
    sys: Arc<Mutex<System>>,
    disks: Arc<Mutex<Disks>>,
    networks: Arc<Mutex<Networks>>,
    last_cpu_refresh: Arc<Mutex<CpuSample>>,
}

/// Last global CPU refresh. `usage` stays `None` until a refresh has run a full
/// measurement interval after the baseline.
#[derive(Debug, Clone, Copy)]
struct CpuSample {
    at: Instant,
    usage: Option<f64>,
}

#[derive(Debug, PartialEq)]
enum CpuPlan {
    Reuse(f64),
    Refresh { wait: Duration },
}

fn plan_cpu_refresh(sample: CpuSample, now: Instant, min_interval: Duration) -> CpuPlan {
    let elapsed = now.saturating_duration_since(sample.at);
    match sample.usage {
        Some(usage) if elapsed < min_interval => CpuPlan::Reuse(usage),
        Some(_) => CpuPlan::Refresh { wait: Duration::ZERO },
        None => CpuPlan::Refresh {
            wait: min_interval.saturating_sub(elapsed),
        },
    }
}

impl Default for SysinfoRepo {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoRepo {
    pub fn new() -> Self {
        let mut sys = System::new();
        sys.refresh_cpu_all();
        let baseline = CpuSample {
            at: Instant::now(),
            usage: None,
        };
        sys.refresh_memory();
        let disks = Disks::new_with_refreshed_list();
        let networks = Networks::new_with_refreshed_list();
        Self {
            sys: Arc::new(Mutex::new(sys)),
            disks: Arc::new(Mutex::new(disks)),
            networks: Arc::new(Mutex::new(networks)),
            last_cpu_refresh: Arc::new(Mutex::new(baseline)),
        }
    }

    /// Capture a fresh host snapshot. Runs on the blocking pool.
    #[instrument(skip(self), fields(repo = "sysinfo", operation = "get_system_snapshot"))]
    pub async fn get_system_snapshot(&self) -> anyhow::Result<SystemSnapshot> {
        let sys = self.sys.clone();
        let disks = self.disks.clone();
        let networks = self.networks.clone();
        let last_cpu_refresh = self.last_cpu_refresh.clone();
        tokio::task::spawn_blocking(move || {
            let (cpu_cores, cpu_usage_percent, memory) = {
                let mut sys = sys
                    .lock()
                    .map_err(|e| anyhow::anyhow!("sysinfo lock poisoned: {}", e))?;
                let usage = cpu_usage(&mut sys, &last_cpu_refresh);
                sys.refresh_memory();
                let total = sys.total_memory();
                let available = sys.available_memory();
                let used = total.saturating_sub(available);
                let memory = MemoryStats {
                    total,
                    used,
                    percent: crate::metrics::percent_of(used, total),
                    available,
                };
                (sys.cpus().len() as u32, usage, memory)
            };

            let disk = {
                let mut disks = disks
                    .lock()
                    .map_err(|e| anyhow::anyhow!("sysinfo disks lock poisoned: {}", e))?;
                disks.refresh(false);
                let mounts: Vec<(&Path, u64, u64)> = disks
                    .list()
                    .iter()
                    .map(|d| (d.mount_point(), d.total_space(), d.available_space()))
                    .collect();
                disk::root_disk_stats(&mounts)
            };

            let network = {
                let mut networks = networks
                    .lock()
                    .map_err(|e| anyhow::anyhow!("sysinfo networks lock poisoned: {}", e))?;
                networks.refresh(true);
                networks
                    .list()
                    .values()
                    .fold(NetworkCounters::default(), |acc, data| NetworkCounters {
                        bytes_sent: acc.bytes_sent + data.total_transmitted(),
                        bytes_recv: acc.bytes_recv + data.total_received(),
                        packets_sent: acc.packets_sent + data.total_packets_transmitted(),
                        packets_recv: acc.packets_recv + data.total_packets_received(),
                    })
            };

            Ok(SystemSnapshot {
                cpu_cores,
                cpu_usage_percent,
                memory,
                disk,
                network,
                load_average: load_average(),
                uptime_seconds: System::uptime(),
                timestamp: chrono::Utc::now().to_rfc3339(),
            })
        })
        .await
        .map_err(|e| anyhow::anyhow!("sysinfo task join: {}", e))?
    }
}

/// Global CPU usage. Refreshes only when sysinfo's minimum interval has passed and otherwise
/// reuses the previous reading. The first call waits out the rest of the interval since the
/// baseline so it reports a real measurement. Runs on the blocking pool, so sleeping is fine.
fn cpu_usage(sys: &mut System, last_cpu_refresh: &Mutex<CpuSample>) -> f64 {
    let mut sample = last_cpu_refresh
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    let usage = match plan_cpu_refresh(*sample, Instant::now(), sysinfo::MINIMUM_CPU_UPDATE_INTERVAL) {
        CpuPlan::Reuse(usage) => usage,
        CpuPlan::Refresh { wait } => {
            if !wait.is_zero() {
                std::thread::sleep(wait);
            }
            sys.refresh_cpu_all();
            let usage = sys.global_cpu_usage() as f64;
            *sample = CpuSample {
                at: Instant::now(),
                usage: Some(usage),
            };
            usage
        }
    };
    usage.clamp(0.0, 100.0)
}

#[cfg(unix)]
fn load_average() -> Option<LoadAverage> {
    let l = System::load_average();
    Some(LoadAverage {
        one: l.one,
        five: l.five,
        fifteen: l.fifteen,
    })
}

#[cfg(not(unix))]
fn load_average() -> Option<LoadAverage> {
    None
}
