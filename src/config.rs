use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub streaming: StreamingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    /// Upper bound on concurrent per-container fetches during one collection pass.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// How long a single usage-snapshot call may take before the container is zero-filled.
    #[serde(default = "default_stats_timeout_ms")]
    pub stats_timeout_ms: u64,
}

fn default_max_workers() -> usize {
    8
}

fn default_stats_timeout_ms() -> u64 {
    5000
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            stats_timeout_ms: default_stats_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_system_ttl_secs")]
    pub system_ttl_secs: u64,
    #[serde(default = "default_container_ttl_secs")]
    pub container_ttl_secs: u64,
    #[serde(default = "default_network_ttl_secs")]
    pub network_ttl_secs: u64,
    #[serde(default = "default_daemon_info_ttl_secs")]
    pub daemon_info_ttl_secs: u64,
}

fn default_system_ttl_secs() -> u64 {
    5
}

fn default_container_ttl_secs() -> u64 {
    2
}

fn default_network_ttl_secs() -> u64 {
    10
}

fn default_daemon_info_ttl_secs() -> u64 {
    60
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            system_ttl_secs: default_system_ttl_secs(),
            container_ttl_secs: default_container_ttl_secs(),
            network_ttl_secs: default_network_ttl_secs(),
            daemon_info_ttl_secs: default_daemon_info_ttl_secs(),
        }
    }
}

impl CacheConfig {
    pub fn system_ttl(&self) -> Duration {
        Duration::from_secs(self.system_ttl_secs)
    }

    pub fn container_ttl(&self) -> Duration {
        Duration::from_secs(self.container_ttl_secs)
    }

    pub fn network_ttl(&self) -> Duration {
        Duration::from_secs(self.network_ttl_secs)
    }

    pub fn daemon_info_ttl(&self) -> Duration {
        Duration::from_secs(self.daemon_info_ttl_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamingConfig {
    /// Capacity of the shared queue between log tailers and the socket writer.
    #[serde(default = "default_log_queue_capacity")]
    pub log_queue_capacity: usize,
    /// A tailer gives up on a line after waiting this long for queue space.
    #[serde(default = "default_enqueue_timeout_ms")]
    pub enqueue_timeout_ms: u64,
    /// Consumer poll timeout; connection liveness is checked on every expiry.
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
    /// Bounded wait for tailers to exit when a log session is torn down.
    #[serde(default = "default_join_timeout_ms")]
    pub join_timeout_ms: u64,
    /// Backlog lines replayed before following a live log.
    #[serde(default = "default_follow_tail")]
    pub follow_tail: u32,
    #[serde(default = "default_history_default_tail")]
    pub history_default_tail: u32,
    /// Per-source cap for the merged historical log view.
    #[serde(default = "default_history_max_tail")]
    pub history_max_tail: u32,
    #[serde(default = "default_interval_ms")]
    pub default_interval_ms: u64,
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,
    /// Per-subscriber outbound buffer; a full buffer drops that subscriber's message.
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,
}

fn default_log_queue_capacity() -> usize {
    100
}

fn default_enqueue_timeout_ms() -> u64 {
    100
}

fn default_poll_timeout_ms() -> u64 {
    500
}

fn default_join_timeout_ms() -> u64 {
    2000
}

fn default_follow_tail() -> u32 {
    1000
}

fn default_history_default_tail() -> u32 {
    500
}

fn default_history_max_tail() -> u32 {
    5000
}

fn default_interval_ms() -> u64 {
    2000
}

fn default_min_interval_ms() -> u64 {
    500
}

fn default_max_interval_ms() -> u64 {
    60_000
}

fn default_subscriber_buffer() -> usize {
    16
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            log_queue_capacity: default_log_queue_capacity(),
            enqueue_timeout_ms: default_enqueue_timeout_ms(),
            poll_timeout_ms: default_poll_timeout_ms(),
            join_timeout_ms: default_join_timeout_ms(),
            follow_tail: default_follow_tail(),
            history_default_tail: default_history_default_tail(),
            history_max_tail: default_history_max_tail(),
            default_interval_ms: default_interval_ms(),
            min_interval_ms: default_min_interval_ms(),
            max_interval_ms: default_max_interval_ms(),
            subscriber_buffer: default_subscriber_buffer(),
        }
    }
}

impl StreamingConfig {
    /// Clamp a client-requested push interval into the configured window.
    pub fn clamp_interval(&self, requested_ms: Option<u64>) -> Duration {
        let ms = requested_ms
            .unwrap_or(self.default_interval_ms)
            .clamp(self.min_interval_ms, self.max_interval_ms);
        Duration::from_millis(ms)
    }

    /// Clamp a requested historical tail to `[1, history_max_tail]`.
    pub fn clamp_history_tail(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.history_default_tail)
            .clamp(1, self.history_max_tail)
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(
            self.runtime.max_workers > 0,
            "runtime.max_workers must be > 0, got {}",
            self.runtime.max_workers
        );
        anyhow::ensure!(
            self.runtime.stats_timeout_ms > 0,
            "runtime.stats_timeout_ms must be > 0, got {}",
            self.runtime.stats_timeout_ms
        );
        for (name, value) in [
            ("cache.system_ttl_secs", self.cache.system_ttl_secs),
            ("cache.container_ttl_secs", self.cache.container_ttl_secs),
            ("cache.network_ttl_secs", self.cache.network_ttl_secs),
            ("cache.daemon_info_ttl_secs", self.cache.daemon_info_ttl_secs),
            ("streaming.enqueue_timeout_ms", self.streaming.enqueue_timeout_ms),
            ("streaming.poll_timeout_ms", self.streaming.poll_timeout_ms),
            ("streaming.join_timeout_ms", self.streaming.join_timeout_ms),
            ("streaming.min_interval_ms", self.streaming.min_interval_ms),
        ] {
            anyhow::ensure!(value > 0, "{} must be > 0, got {}", name, value);
        }
        anyhow::ensure!(
            self.streaming.log_queue_capacity > 0,
            "streaming.log_queue_capacity must be > 0, got {}",
            self.streaming.log_queue_capacity
        );
        anyhow::ensure!(
            self.streaming.subscriber_buffer > 0,
            "streaming.subscriber_buffer must be > 0, got {}",
            self.streaming.subscriber_buffer
        );
        anyhow::ensure!(
            self.streaming.history_max_tail > 0,
            "streaming.history_max_tail must be > 0, got {}",
            self.streaming.history_max_tail
        );
        anyhow::ensure!(
            self.streaming.min_interval_ms <= self.streaming.max_interval_ms,
            "streaming.min_interval_ms ({}) must not exceed streaming.max_interval_ms ({})",
            self.streaming.min_interval_ms,
            self.streaming.max_interval_ms
        );
        Ok(())
    }
}
