// Shared test helpers: an in-memory container runtime and a compact config.
#![allow(dead_code)]

use async_trait::async_trait;
use bollard::models::{
    ContainerConfig, ContainerCpuStats, ContainerCpuUsage, ContainerInspectResponse,
    ContainerMemoryStats, ContainerState, ContainerStateStatusEnum, ContainerStatsResponse,
};
use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};
use logique::config::AppConfig;
use logique::runtime::{
    ContainerAction, ContainerHandle, ContainerRuntime, LogQuery, NetworkHandle, RuntimeError,
    RuntimeEvent,
};
use logique::sysinfo_repo::SysinfoRepo;
use logique::telemetry::Telemetry;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub const TEST_CONFIG: &str = r#"
[server]
port = 8081
host = "127.0.0.1"

[runtime]
max_workers = 2
stats_timeout_ms = 200

[streaming]
log_queue_capacity = 4
enqueue_timeout_ms = 20
poll_timeout_ms = 50
join_timeout_ms = 200
subscriber_buffer = 4
"#;

pub fn test_config() -> AppConfig {
    AppConfig::load_from_str(TEST_CONFIG).unwrap()
}

pub fn telemetry(runtime: Arc<FakeRuntime>) -> Arc<Telemetry> {
    Arc::new(Telemetry::new(
        runtime,
        Arc::new(SysinfoRepo::new()),
        &test_config(),
    ))
}

#[derive(Debug, Clone)]
pub struct FakeContainer {
    pub id: String,
    pub name: String,
    pub running: bool,
    pub networks: Vec<(String, String)>,
}

impl FakeContainer {
    pub fn running(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            running: true,
            networks: Vec::new(),
        }
    }

    pub fn stopped(id: &str, name: &str) -> Self {
        Self {
            running: false,
            ..Self::running(id, name)
        }
    }

    pub fn on(mut self, network: &str, ip: &str) -> Self {
        self.networks.push((network.to_string(), ip.to_string()));
        self
    }
}

/// Usage payload that derives to 20% CPU and 256 MiB of 512 MiB memory.
pub fn sample_stats() -> ContainerStatsResponse {
    let cpu = |total: u64, system: u64| ContainerCpuStats {
        cpu_usage: Some(ContainerCpuUsage {
            total_usage: Some(total),
            ..Default::default()
        }),
        system_cpu_usage: Some(system),
        online_cpus: Some(2),
        throttling_data: None,
    };
    ContainerStatsResponse {
        cpu_stats: Some(cpu(100_000_000, 1_000_000_000)),
        precpu_stats: Some(cpu(50_000_000, 500_000_000)),
        memory_stats: Some(ContainerMemoryStats {
            usage: Some(256 * 1024 * 1024),
            limit: Some(512 * 1024 * 1024),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// In-memory runtime. Unknown ids are not found; everything else is scripted by the test.
#[derive(Default)]
pub struct FakeRuntime {
    containers: Mutex<Vec<FakeContainer>>,
    networks: Mutex<Vec<NetworkHandle>>,
    failing_inspect: Mutex<HashSet<String>>,
    failing_logs: Mutex<HashSet<String>>,
    logs: Mutex<HashMap<String, Vec<String>>>,
    follow_open: AtomicBool,
    unavailable: AtomicBool,
    usage_delay: Mutex<Option<Duration>>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<Result<RuntimeEvent, RuntimeError>>>>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub inspect_calls: AtomicUsize,
    pub usage_calls: AtomicUsize,
    pub applied: Mutex<Vec<(String, ContainerAction)>>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_container(self, c: FakeContainer) -> Self {
        self.containers.lock().unwrap().push(c);
        self
    }

    pub fn with_network(self, name: &str) -> Self {
        self.networks.lock().unwrap().push(NetworkHandle {
            id: format!("net-{}", name),
            name: name.to_string(),
            driver: "bridge".into(),
            scope: "local".into(),
            subnet: "172.18.0.0/16".into(),
            created: "2024-05-01T00:00:00Z".into(),
        });
        self
    }

    pub fn with_logs(self, id: &str, lines: &[&str]) -> Self {
        self.logs.lock().unwrap().insert(
            id.to_string(),
            lines.iter().map(|l| l.to_string()).collect(),
        );
        self
    }

    pub fn fail_inspect(&self, id: &str) {
        self.failing_inspect.lock().unwrap().insert(id.to_string());
    }

    pub fn fail_logs(&self, id: &str) {
        self.failing_logs.lock().unwrap().insert(id.to_string());
    }

    /// Followed log streams stay open (never yield again) after replaying their lines.
    pub fn keep_follow_open(&self) {
        self.follow_open.store(true, Ordering::SeqCst);
    }

    pub fn set_unavailable(&self, down: bool) {
        self.unavailable.store(down, Ordering::SeqCst);
    }

    pub fn set_usage_delay(&self, delay: Duration) {
        *self.usage_delay.lock().unwrap() = Some(delay);
    }

    pub fn remove_container(&self, id: &str) {
        self.containers.lock().unwrap().retain(|c| c.id != id);
    }

    /// Sender feeding the next `events()` stream.
    pub fn event_sender(&self) -> mpsc::UnboundedSender<Result<RuntimeEvent, RuntimeError>> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.events_rx.lock().unwrap() = Some(rx);
        tx
    }

    fn check_available(&self) -> Result<(), RuntimeError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RuntimeError::Unavailable("socket closed".into()));
        }
        Ok(())
    }

    fn find(&self, id: &str) -> Option<FakeContainer> {
        self.containers
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }
}

struct InFlight<'a>(&'a FakeRuntime);

impl<'a> InFlight<'a> {
    fn enter(rt: &'a FakeRuntime) -> Self {
        let now = rt.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        rt.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(rt)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn ping(&self) -> Result<(), RuntimeError> {
        self.check_available()
    }

    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerHandle>, RuntimeError> {
        self.check_available()?;
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .containers
            .lock()
            .unwrap()
            .iter()
            .filter(|c| all || c.running)
            .map(|c| ContainerHandle {
                id: c.id.clone(),
                name: c.name.clone(),
                status: if c.running { "running" } else { "exited" }.into(),
                networks: c.networks.iter().cloned().collect(),
            })
            .collect())
    }

    async fn inspect(&self, id: &str) -> Result<ContainerInspectResponse, RuntimeError> {
        self.check_available()?;
        self.inspect_calls.fetch_add(1, Ordering::SeqCst);
        let _guard = InFlight::enter(self);
        tokio::time::sleep(Duration::from_millis(10)).await;
        if self.failing_inspect.lock().unwrap().contains(id) {
            return Err(RuntimeError::Api(format!("inspect {} failed", id)));
        }
        let c = self
            .find(id)
            .ok_or_else(|| RuntimeError::NotFound(format!("No such container: {}", id)))?;
        let status = if c.running {
            ContainerStateStatusEnum::RUNNING
        } else {
            ContainerStateStatusEnum::EXITED
        };
        Ok(ContainerInspectResponse {
            id: Some(format!("{}{}", c.id, "0".repeat(64usize.saturating_sub(c.id.len())))),
            name: Some(format!("/{}", c.name)),
            created: Some("2024-05-01T00:00:00Z".into()),
            state: Some(ContainerState {
                status: Some(status),
                started_at: Some("2024-05-01T00:00:00Z".into()),
                finished_at: Some("0001-01-01T00:00:00Z".into()),
                ..Default::default()
            }),
            config: Some(ContainerConfig {
                image: Some(format!("{}:latest", c.name)),
                ..Default::default()
            }),
            restart_count: Some(0),
            ..Default::default()
        })
    }

    async fn usage_snapshot(&self, id: &str) -> Result<ContainerStatsResponse, RuntimeError> {
        self.check_available()?;
        self.usage_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.usage_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.find(id)
            .map(|_| sample_stats())
            .ok_or_else(|| RuntimeError::NotFound(id.to_string()))
    }

    fn logs(&self, id: &str, query: LogQuery) -> BoxStream<'static, Result<String, RuntimeError>> {
        if let Err(e) = self.check_available() {
            return stream::once(async move { Err(e) }).boxed();
        }
        if self.failing_logs.lock().unwrap().contains(id) {
            let e = RuntimeError::Api(format!("log stream for {} broke", id));
            return stream::once(async move { Err(e) }).boxed();
        }
        let Some(lines) = self.logs.lock().unwrap().get(id).cloned() else {
            let e = RuntimeError::NotFound(format!("No such container: {}", id));
            return stream::once(async move { Err(e) }).boxed();
        };
        let skip = lines.len().saturating_sub(query.tail as usize);
        let replay = stream::iter(lines.into_iter().skip(skip).map(Ok));
        if query.follow && self.follow_open.load(Ordering::SeqCst) {
            replay.chain(stream::pending()).boxed()
        } else {
            replay.boxed()
        }
    }

    async fn list_networks(&self) -> Result<Vec<NetworkHandle>, RuntimeError> {
        self.check_available()?;
        Ok(self.networks.lock().unwrap().clone())
    }

    async fn daemon_info(&self) -> Result<serde_json::Value, RuntimeError> {
        self.check_available()?;
        Ok(serde_json::json!({ "ServerVersion": "fake-1.0", "Containers": self.containers.lock().unwrap().len() }))
    }

    fn events(&self) -> BoxStream<'static, Result<RuntimeEvent, RuntimeError>> {
        match self.events_rx.lock().unwrap().take() {
            Some(rx) => stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            })
            .boxed(),
            None => stream::empty().boxed(),
        }
    }

    async fn apply(&self, id: &str, action: ContainerAction) -> Result<(), RuntimeError> {
        self.check_available()?;
        if self.find(id).is_none() {
            return Err(RuntimeError::NotFound(format!("No such container: {}", id)));
        }
        self.applied.lock().unwrap().push((id.to_string(), action));
        Ok(())
    }
}

pub fn container_event(id: &str, action: &str) -> RuntimeEvent {
    RuntimeEvent {
        kind: "container".into(),
        action: action.into(),
        actor_id: Some(id.to_string()),
    }
}
