// Container runtime collaborator: the capability set the telemetry engine depends on.

mod docker;

pub use docker::DockerRuntime;

use async_trait::async_trait;
use bollard::models::{ContainerInspectResponse, ContainerStatsResponse};
use futures_util::stream::BoxStream;
use std::collections::HashMap;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("runtime unavailable: {0}")]
    Unavailable(String),

    #[error("runtime error: {0}")]
    Api(String),
}

impl RuntimeError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RuntimeError::NotFound(_))
    }
}

/// One entry of a container listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerHandle {
    pub id: String,
    pub name: String,
    pub status: String,
    /// Network name -> IPv4 address (may be empty) for every attached network.
    pub networks: HashMap<String, String>,
}

/// One entry of a network listing, before membership is attached.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkHandle {
    pub id: String,
    pub name: String,
    pub driver: String,
    pub scope: String,
    pub subnet: String,
    pub created: String,
}

/// Lifecycle event from the runtime's event feed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuntimeEvent {
    /// Event object type, e.g. "container", "network", "image".
    pub kind: String,
    pub action: String,
    pub actor_id: Option<String>,
}

impl RuntimeEvent {
    pub fn is_container(&self) -> bool {
        self.kind == "container"
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogQuery {
    pub tail: u32,
    /// Unix seconds; only lines written at or after this instant.
    pub since: Option<i64>,
    pub follow: bool,
}

/// Lifecycle mutations; `Remove` carries the force flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerAction {
    Start,
    Stop,
    Restart,
    Remove { force: bool },
}

impl ContainerAction {
    /// Parse a route segment (`start`, `stop`, `restart`, `remove`).
    pub fn parse(action: &str, force: bool) -> Option<Self> {
        match action {
            "start" => Some(ContainerAction::Start),
            "stop" => Some(ContainerAction::Stop),
            "restart" => Some(ContainerAction::Restart),
            "remove" => Some(ContainerAction::Remove { force }),
            _ => None,
        }
    }

    /// Past-tense status reported back to the caller.
    pub fn past_tense(self) -> &'static str {
        match self {
            ContainerAction::Start => "started",
            ContainerAction::Stop => "stopped",
            ContainerAction::Restart => "restarted",
            ContainerAction::Remove { .. } => "removed",
        }
    }
}

/// Everything the engine needs from a container runtime. Implementations must be cheap to share.
#[async_trait]
pub trait ContainerRuntime: Send + Sync + 'static {
    async fn ping(&self) -> Result<(), RuntimeError>;

    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerHandle>, RuntimeError>;

    async fn inspect(&self, id: &str) -> Result<ContainerInspectResponse, RuntimeError>;

    /// Point-in-time usage payload (one sample pair); may be slow.
    async fn usage_snapshot(&self, id: &str) -> Result<ContainerStatsResponse, RuntimeError>;

    /// Raw log lines, each still carrying the runtime's timestamp prefix. With `follow` the
    /// stream stays open until the container stops or the stream is dropped.
    fn logs(&self, id: &str, query: LogQuery) -> BoxStream<'static, Result<String, RuntimeError>>;

    async fn list_networks(&self) -> Result<Vec<NetworkHandle>, RuntimeError>;

    async fn daemon_info(&self) -> Result<serde_json::Value, RuntimeError>;

    /// Infinite lifecycle event feed; ends only on error or daemon shutdown.
    fn events(&self) -> BoxStream<'static, Result<RuntimeEvent, RuntimeError>>;

    async fn apply(&self, id: &str, action: ContainerAction) -> Result<(), RuntimeError>;
}
