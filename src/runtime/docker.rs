// Docker-backed runtime via bollard

use async_trait::async_trait;
use bollard::Docker;
use bollard::errors::Error as BollardError;
use bollard::query_parameters::{
    EventsOptions, InspectContainerOptions, ListContainersOptions, ListNetworksOptions,
    LogsOptions, RemoveContainerOptions, RestartContainerOptions, StartContainerOptions,
    StatsOptions, StopContainerOptions,
};
use bollard::models::{ContainerInspectResponse, ContainerStatsResponse};
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use tokio::sync::mpsc;

use super::{
    ContainerAction, ContainerHandle, ContainerRuntime, LogQuery, NetworkHandle, RuntimeError,
    RuntimeEvent,
};

/// Items buffered between a forwarding task and its consumer.
const FORWARD_CAPACITY: usize = 64;

impl From<BollardError> for RuntimeError {
    fn from(e: BollardError) -> Self {
        match e {
            BollardError::DockerResponseServerError {
                status_code: 404,
                message,
            } => RuntimeError::NotFound(message),
            e @ BollardError::IOError { .. } => RuntimeError::Unavailable(e.to_string()),
            e => RuntimeError::Api(e.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    pub fn connect() -> anyhow::Result<Self> {
        let docker = Docker::connect_with_unix_defaults()?;
        Ok(Self { docker })
    }
}

/// Turn an mpsc receiver into a boxed stream.
fn receiver_stream<T: Send + 'static>(rx: mpsc::Receiver<T>) -> BoxStream<'static, T> {
    futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    })
    .boxed()
}

/// Splits runtime output chunks into whole lines; a trailing partial line waits for the next chunk.
#[derive(Default)]
struct LineBuffer {
    pending: String,
}

impl LineBuffer {
    fn push(&mut self, chunk: &str) -> Vec<String> {
        self.pending.push_str(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.find('\n') {
            let line: String = self.pending.drain(..=pos).collect();
            let line = line.trim_end_matches(['\r', '\n']);
            if !line.is_empty() {
                lines.push(line.to_string());
            }
        }
        lines
    }

    fn finish(self) -> Option<String> {
        let rest = self.pending.trim_end_matches(['\r', '\n']);
        (!rest.is_empty()).then(|| rest.to_string())
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn ping(&self) -> Result<(), RuntimeError> {
        self.docker.ping().await?;
        Ok(())
    }

    async fn list_containers(&self, all: bool) -> Result<Vec<ContainerHandle>, RuntimeError> {
        let options = ListContainersOptions {
            all,
            ..Default::default()
        };
        let containers = self.docker.list_containers(Some(options)).await?;
        Ok(containers
            .into_iter()
            .map(|c| {
                let id = c.id.clone().unwrap_or_default();
                let name = c
                    .names
                    .as_ref()
                    .and_then(|n| n.first())
                    .cloned()
                    .unwrap_or_else(|| id.clone());
                let networks = c
                    .network_settings
                    .as_ref()
                    .and_then(|ns| ns.networks.as_ref())
                    .map(|n| {
                        n.iter()
                            .map(|(net, ep)| (net.clone(), ep.ip_address.clone().unwrap_or_default()))
                            .collect()
                    })
                    .unwrap_or_default();
                ContainerHandle {
                    id,
                    name: name.trim_start_matches('/').to_string(),
                    status: c.state.as_ref().map(|s| s.to_string()).unwrap_or_default(),
                    networks,
                }
            })
            .collect())
    }

    async fn inspect(&self, id: &str) -> Result<ContainerInspectResponse, RuntimeError> {
        Ok(self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await?)
    }

    async fn usage_snapshot(&self, id: &str) -> Result<ContainerStatsResponse, RuntimeError> {
        // stream=false waits for a second sample so precpu counters are populated
        let options = StatsOptions {
            stream: false,
            ..Default::default()
        };
        let mut stream = std::pin::pin!(self.docker.stats(id, Some(options)));
        match stream.next().await {
            Some(result) => Ok(result?),
            None => Err(RuntimeError::Api(format!("empty stats stream for {}", id))),
        }
    }

    fn logs(&self, id: &str, query: LogQuery) -> BoxStream<'static, Result<String, RuntimeError>> {
        let docker = self.docker.clone();
        let id = id.to_string();
        let options = LogsOptions {
            follow: query.follow,
            stdout: true,
            stderr: true,
            timestamps: true,
            tail: query.tail.to_string(),
            since: query.since.map_or(0, |s| s.clamp(0, i64::from(i32::MAX)) as i32),
            ..Default::default()
        };
        let (tx, rx) = mpsc::channel(FORWARD_CAPACITY);
        tokio::spawn(async move {
            let mut stream = std::pin::pin!(docker.logs(&id, Some(options)));
            let mut buffer = LineBuffer::default();
            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(output) => {
                        let bytes = output.into_bytes();
                        for line in buffer.push(&String::from_utf8_lossy(&bytes)) {
                            if tx.send(Ok(line)).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(RuntimeError::from(e))).await;
                        return;
                    }
                }
            }
            if let Some(rest) = buffer.finish() {
                let _ = tx.send(Ok(rest)).await;
            }
        });
        receiver_stream(rx)
    }

    async fn list_networks(&self) -> Result<Vec<NetworkHandle>, RuntimeError> {
        let networks = self
            .docker
            .list_networks(None::<ListNetworksOptions>)
            .await?;
        Ok(networks
            .into_iter()
            .map(|n| {
                let subnet = n
                    .ipam
                    .as_ref()
                    .and_then(|ipam| ipam.config.as_ref())
                    .and_then(|configs| configs.first())
                    .and_then(|c| c.subnet.clone())
                    .unwrap_or_else(|| "unknown".into());
                NetworkHandle {
                    id: n.id.unwrap_or_default(),
                    name: n.name.unwrap_or_default(),
                    driver: n.driver.unwrap_or_else(|| "unknown".into()),
                    scope: n.scope.unwrap_or_else(|| "unknown".into()),
                    subnet,
                    created: n.created.map(|c| c.to_string()).unwrap_or_default(),
                }
            })
            .collect())
    }

    async fn daemon_info(&self) -> Result<serde_json::Value, RuntimeError> {
        let info = self.docker.info().await?;
        serde_json::to_value(info).map_err(|e| RuntimeError::Api(e.to_string()))
    }

    fn events(&self) -> BoxStream<'static, Result<RuntimeEvent, RuntimeError>> {
        let docker = self.docker.clone();
        let (tx, rx) = mpsc::channel(FORWARD_CAPACITY);
        tokio::spawn(async move {
            let mut stream = std::pin::pin!(docker.events(None::<EventsOptions>));
            while let Some(item) = stream.next().await {
                let mapped = item.map_err(RuntimeError::from).map(|e| RuntimeEvent {
                    kind: e.typ.map(|t| t.to_string()).unwrap_or_default(),
                    action: e.action.unwrap_or_default(),
                    actor_id: e.actor.and_then(|a| a.id),
                });
                let failed = mapped.is_err();
                if tx.send(mapped).await.is_err() || failed {
                    return;
                }
            }
        });
        receiver_stream(rx)
    }

    async fn apply(&self, id: &str, action: ContainerAction) -> Result<(), RuntimeError> {
        match action {
            ContainerAction::Start => {
                self.docker
                    .start_container(id, None::<StartContainerOptions>)
                    .await?
            }
            ContainerAction::Stop => {
                self.docker
                    .stop_container(id, None::<StopContainerOptions>)
                    .await?
            }
            ContainerAction::Restart => {
                self.docker
                    .restart_container(id, None::<RestartContainerOptions>)
                    .await?
            }
            ContainerAction::Remove { force } => {
                let options = RemoveContainerOptions {
                    force,
                    ..Default::default()
                };
                self.docker.remove_container(id, Some(options)).await?
            }
        }
        Ok(())
    }
}
