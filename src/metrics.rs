// Metric derivation: raw runtime counters -> percentages and byte totals.
// Every function here is total: absent counters count as zero and nothing fails.

use bollard::models::ContainerStatsResponse;
use chrono::{DateTime, Utc};

use crate::models::ContainerMetrics;

const BYTES_PER_MB: f64 = (1u64 << 20) as f64;

/// Cumulative CPU counters from two consecutive usage samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuCounters {
    pub cpu_total: u64,
    pub cpu_prev_total: u64,
    pub system_total: u64,
    pub system_prev_total: u64,
    pub online_cpus: u32,
}

/// `(cpu_delta / system_delta) * online_cpus * 100`, or 0.0 unless the system delta is positive
/// and the container delta non-negative.
pub fn cpu_percent(c: &CpuCounters) -> f64 {
    let cpu_delta = c.cpu_total as i128 - c.cpu_prev_total as i128;
    let system_delta = c.system_total as i128 - c.system_prev_total as i128;
    if system_delta > 0 && cpu_delta >= 0 {
        (cpu_delta as f64 / system_delta as f64) * c.online_cpus as f64 * 100.0
    } else {
        0.0
    }
}

pub fn memory_percent(usage_bytes: u64, limit_bytes: u64) -> f64 {
    percent_of(usage_bytes, limit_bytes)
}

/// `part / whole * 100`, or 0 for an empty whole.
pub fn percent_of(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    part as f64 / whole as f64 * 100.0
}

pub fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MB
}

/// Display rounding; callers keep the unrounded value for further arithmetic.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Seconds since `started_at` (RFC 3339), or 0 when it does not parse or lies in the future.
pub fn uptime_seconds(now: DateTime<Utc>, started_at: &str) -> u64 {
    match DateTime::parse_from_rfc3339(started_at) {
        Ok(started) => (now - started.with_timezone(&Utc)).num_seconds().max(0) as u64,
        Err(_) => 0,
    }
}

/// Sum `(rx, tx)` byte counters over every reported interface.
pub fn sum_network<I>(interfaces: I) -> (u64, u64)
where
    I: IntoIterator<Item = (Option<u64>, Option<u64>)>,
{
    interfaces
        .into_iter()
        .fold((0u64, 0u64), |(rx, tx), (r, t)| {
            (rx.saturating_add(r.unwrap_or(0)), tx.saturating_add(t.unwrap_or(0)))
        })
}

/// Sum `(read, write)` byte counters over block I/O entries, matching the op case-insensitively.
pub fn sum_block_io<'a, I>(entries: I) -> (u64, u64)
where
    I: IntoIterator<Item = (Option<&'a str>, Option<u64>)>,
{
    let mut read = 0u64;
    let mut write = 0u64;
    for (op, value) in entries {
        let value = value.unwrap_or(0);
        match op {
            Some(op) if op.eq_ignore_ascii_case("read") => read = read.saturating_add(value),
            Some(op) if op.eq_ignore_ascii_case("write") => write = write.saturating_add(value),
            _ => {}
        }
    }
    (read, write)
}

/// Pull the CPU counters out of a raw usage payload. Missing sections yield zeros.
pub fn cpu_counters(s: &ContainerStatsResponse) -> CpuCounters {
    let cpu_stats = s.cpu_stats.as_ref();
    let precpu_stats = s.precpu_stats.as_ref();
    let cpu_usage = cpu_stats.and_then(|c| c.cpu_usage.as_ref());
    let precpu_usage = precpu_stats.and_then(|c| c.cpu_usage.as_ref());

    let online_cpus = cpu_stats
        .and_then(|c| c.online_cpus)
        .map(|n| n as u32)
        .or_else(|| {
            cpu_usage
                .and_then(|u| u.percpu_usage.as_ref())
                .map(|p| p.len() as u32)
        })
        .unwrap_or(1);

    CpuCounters {
        cpu_total: cpu_usage.and_then(|u| u.total_usage).unwrap_or(0),
        cpu_prev_total: precpu_usage.and_then(|u| u.total_usage).unwrap_or(0),
        system_total: cpu_stats.and_then(|c| c.system_cpu_usage).unwrap_or(0),
        system_prev_total: precpu_stats.and_then(|c| c.system_cpu_usage).unwrap_or(0),
        online_cpus,
    }
}

/// Derive the full metric set from a raw usage payload.
pub fn derive(s: &ContainerStatsResponse) -> ContainerMetrics {
    let memory = s.memory_stats.as_ref();
    let memory_usage_bytes = memory.and_then(|m| m.usage).unwrap_or(0);
    let memory_limit_bytes = memory.and_then(|m| m.limit).unwrap_or(0);
    let memory_cache_bytes = memory
        .and_then(|m| m.stats.as_ref())
        .and_then(|st| st.get("cache").or_else(|| st.get("file")).copied())
        .unwrap_or(0);

    let (network_rx_bytes, network_tx_bytes) = s.networks.as_ref().map_or((0, 0), |n| {
        sum_network(n.values().map(|v| (v.rx_bytes, v.tx_bytes)))
    });

    let (block_read_bytes, block_write_bytes) = s
        .blkio_stats
        .as_ref()
        .and_then(|b| b.io_service_bytes_recursive.as_ref())
        .map_or((0, 0), |entries| {
            sum_block_io(entries.iter().map(|e| (e.op.as_deref(), e.value)))
        });

    ContainerMetrics {
        cpu_percent: cpu_percent(&cpu_counters(s)),
        memory_usage_bytes,
        memory_limit_bytes,
        memory_percent: memory_percent(memory_usage_bytes, memory_limit_bytes),
        memory_cache_bytes,
        network_rx_bytes,
        network_tx_bytes,
        block_read_bytes,
        block_write_bytes,
    }
}
