// Config loading and validation tests

use logique::config::AppConfig;
use std::time::Duration;

const VALID_CONFIG: &str = r#"
[server]
port = 8081
host = "0.0.0.0"

[runtime]
max_workers = 4
stats_timeout_ms = 3000

[cache]
system_ttl_secs = 5
container_ttl_secs = 2
network_ttl_secs = 10
daemon_info_ttl_secs = 60

[streaming]
log_queue_capacity = 100
enqueue_timeout_ms = 100
poll_timeout_ms = 500
join_timeout_ms = 2000
follow_tail = 1000
history_default_tail = 500
history_max_tail = 5000
default_interval_ms = 2000
min_interval_ms = 500
max_interval_ms = 60000
subscriber_buffer = 16
"#;

const MINIMAL_CONFIG: &str = r#"
[server]
port = 8081
host = "0.0.0.0"
"#;

#[test]
fn test_config_loads_from_str() {
    let config = AppConfig::load_from_str(VALID_CONFIG).expect("load_from_str");
    assert_eq!(config.server.port, 8081);
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.runtime.max_workers, 4);
    assert_eq!(config.runtime.stats_timeout_ms, 3000);
    assert_eq!(config.cache.container_ttl(), Duration::from_secs(2));
    assert_eq!(config.streaming.log_queue_capacity, 100);
}

#[test]
fn test_config_defaults_when_sections_omitted() {
    let config = AppConfig::load_from_str(MINIMAL_CONFIG).expect("valid");
    assert_eq!(config.runtime.max_workers, 8);
    assert_eq!(config.runtime.stats_timeout_ms, 5000);
    assert_eq!(config.cache.system_ttl(), Duration::from_secs(5));
    assert_eq!(config.cache.container_ttl(), Duration::from_secs(2));
    assert_eq!(config.cache.network_ttl(), Duration::from_secs(10));
    assert_eq!(config.cache.daemon_info_ttl(), Duration::from_secs(60));
    assert_eq!(config.streaming.log_queue_capacity, 100);
    assert_eq!(config.streaming.enqueue_timeout_ms, 100);
    assert_eq!(config.streaming.poll_timeout_ms, 500);
    assert_eq!(config.streaming.join_timeout_ms, 2000);
    assert_eq!(config.streaming.follow_tail, 1000);
}

#[test]
fn test_config_validation_rejects_invalid_port() {
    let bad = VALID_CONFIG.replace("port = 8081", "port = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("server.port"));
}

#[test]
fn test_config_validation_rejects_max_workers_zero() {
    let bad = VALID_CONFIG.replace("max_workers = 4", "max_workers = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("runtime.max_workers"));
}

#[test]
fn test_config_validation_rejects_zero_ttl() {
    let bad = VALID_CONFIG.replace("network_ttl_secs = 10", "network_ttl_secs = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("cache.network_ttl_secs"));
}

#[test]
fn test_config_validation_rejects_queue_capacity_zero() {
    let bad = VALID_CONFIG.replace("log_queue_capacity = 100", "log_queue_capacity = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("streaming.log_queue_capacity"));
}

#[test]
fn test_config_validation_rejects_inverted_interval_window() {
    let bad = VALID_CONFIG.replace("max_interval_ms = 60000", "max_interval_ms = 100");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("streaming.max_interval_ms"));
}

#[test]
fn test_config_validation_rejects_invalid_toml() {
    let err = AppConfig::load_from_str("not valid toml [[[").unwrap_err();
    assert!(!err.to_string().is_empty());
}

#[test]
fn test_interval_clamps_into_window() {
    let config = AppConfig::load_from_str(VALID_CONFIG).unwrap();
    let s = &config.streaming;
    assert_eq!(s.clamp_interval(None), Duration::from_millis(2000));
    assert_eq!(s.clamp_interval(Some(10)), Duration::from_millis(500));
    assert_eq!(s.clamp_interval(Some(1_000_000)), Duration::from_millis(60000));
    assert_eq!(s.clamp_interval(Some(750)), Duration::from_millis(750));
}

#[test]
fn test_history_tail_clamps() {
    let config = AppConfig::load_from_str(VALID_CONFIG).unwrap();
    let s = &config.streaming;
    assert_eq!(s.clamp_history_tail(None), 500);
    assert_eq!(s.clamp_history_tail(Some(0)), 1);
    assert_eq!(s.clamp_history_tail(Some(10_000)), 5000);
}

#[test]
fn test_config_load_from_file_via_env() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, VALID_CONFIG).unwrap();
    unsafe { std::env::set_var("CONFIG_FILE", path.to_str().unwrap()) };
    let result = AppConfig::load();
    unsafe { std::env::remove_var("CONFIG_FILE") };
    let config = result.expect("load from CONFIG_FILE");
    assert_eq!(config.server.port, 8081);
    assert_eq!(config.runtime.max_workers, 4);
}
