// Live log sessions: one or many tailers feeding a single bounded queue drained by one consumer.
//
// Tailers check the session's cancel flag once per line. A tailer parked inside the runtime's
// stream only notices after its next line arrives, so teardown waits a bounded time and then
// aborts whatever is still running.

pub mod history;

use futures_util::StreamExt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::StreamingConfig;
use crate::models::{ContainerRef, LogLine};
use crate::runtime::{ContainerRuntime, LogQuery};

/// Shared cancellation flag for every tailer of one session.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub queue_capacity: usize,
    pub enqueue_timeout: Duration,
    pub join_timeout: Duration,
    pub follow_tail: u32,
}

impl From<&StreamingConfig> for SessionSettings {
    fn from(c: &StreamingConfig) -> Self {
        Self {
            queue_capacity: c.log_queue_capacity,
            enqueue_timeout: Duration::from_millis(c.enqueue_timeout_ms),
            join_timeout: Duration::from_millis(c.join_timeout_ms),
            follow_tail: c.follow_tail,
        }
    }
}

/// One log source: a container id, optionally labelled with its name in emitted lines.
#[derive(Debug, Clone)]
pub struct LogSource {
    pub id: String,
    pub label: Option<String>,
}

/// Outcome of one consumer poll.
#[derive(Debug, PartialEq, Eq)]
pub enum Recv {
    /// One serialized JSON object (`{timestamp, line[, container]}` or `{error}`).
    Line(String),
    /// Nothing arrived within the poll timeout.
    Idle,
    /// Every tailer has exited and the queue is drained.
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    pub joined: usize,
    pub abandoned: usize,
}

pub struct LogSession {
    rx: mpsc::Receiver<String>,
    cancel: CancelFlag,
    tailers: Vec<JoinHandle<()>>,
    join_timeout: Duration,
    dropped: Arc<AtomicU64>,
}

impl LogSession {
    /// Follow one container's log.
    pub fn single(runtime: Arc<dyn ContainerRuntime>, id: &str, settings: SessionSettings) -> Self {
        let source = LogSource {
            id: id.to_string(),
            label: None,
        };
        Self::spawn(runtime, vec![source], settings)
    }

    /// Follow every member of a network; lines are tagged with the member's name and
    /// interleave in arrival order.
    pub fn network(
        runtime: Arc<dyn ContainerRuntime>,
        members: &[ContainerRef],
        settings: SessionSettings,
    ) -> Self {
        let sources = members
            .iter()
            .map(|m| LogSource {
                id: m.id.clone(),
                label: Some(m.name.clone()),
            })
            .collect();
        Self::spawn(runtime, sources, settings)
    }

    pub fn spawn(
        runtime: Arc<dyn ContainerRuntime>,
        sources: Vec<LogSource>,
        settings: SessionSettings,
    ) -> Self {
        let (tx, rx) = mpsc::channel(settings.queue_capacity.max(1));
        let cancel = CancelFlag::default();
        let dropped = Arc::new(AtomicU64::new(0));
        let query = LogQuery {
            tail: settings.follow_tail,
            since: None,
            follow: true,
        };
        let tailers = sources
            .into_iter()
            .map(|source| {
                let tailer = Tailer {
                    runtime: runtime.clone(),
                    source,
                    tx: tx.clone(),
                    cancel: cancel.clone(),
                    enqueue_timeout: settings.enqueue_timeout,
                    dropped: dropped.clone(),
                };
                tokio::spawn(tailer.run(query.clone()))
            })
            .collect();
        Self {
            rx,
            cancel,
            tailers,
            join_timeout: settings.join_timeout,
            dropped,
        }
    }

    /// Wait up to `timeout` for the next queued line.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Recv {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(line)) => Recv::Line(line),
            Ok(None) => Recv::Finished,
            Err(_) => Recv::Idle,
        }
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Lines dropped because the queue stayed full past the enqueue timeout.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn tailer_count(&self) -> usize {
        self.tailers.len()
    }

    /// Cancel, close the queue, and wait up to the join timeout for tailers to exit.
    /// Stragglers are aborted rather than awaited.
    pub async fn shutdown(mut self) -> ShutdownReport {
        self.cancel.cancel();
        self.rx.close();
        let wait = futures_util::future::join_all(self.tailers.iter_mut());
        if tokio::time::timeout(self.join_timeout, wait).await.is_err() {
            debug!("log session join timed out; aborting remaining tailers");
        }
        let mut report = ShutdownReport {
            joined: 0,
            abandoned: 0,
        };
        for handle in &self.tailers {
            if handle.is_finished() {
                report.joined += 1;
            } else {
                handle.abort();
                report.abandoned += 1;
            }
        }
        info!(
            joined = report.joined,
            abandoned = report.abandoned,
            dropped = self.dropped(),
            "log session closed"
        );
        report
    }
}

struct Tailer {
    runtime: Arc<dyn ContainerRuntime>,
    source: LogSource,
    tx: mpsc::Sender<String>,
    cancel: CancelFlag,
    enqueue_timeout: Duration,
    dropped: Arc<AtomicU64>,
}

impl Tailer {
    async fn run(self, query: LogQuery) {
        let mut stream = self.runtime.logs(&self.source.id, query);
        while !self.cancel.is_cancelled() {
            let Some(item) = stream.next().await else {
                debug!(container = %self.source.id, "log stream ended");
                break;
            };
            match item {
                Ok(raw) => {
                    let mut line = LogLine::parse(&raw);
                    if let Some(label) = &self.source.label {
                        line = line.with_source(label.clone());
                    }
                    let json = match serde_json::to_string(&line) {
                        Ok(json) => json,
                        Err(e) => {
                            warn!(container = %self.source.id, error = %e, "unserializable log line");
                            continue;
                        }
                    };
                    if !self.enqueue(json).await {
                        break;
                    }
                }
                Err(e) => {
                    warn!(container = %self.source.id, error = %e, "log tailer failed");
                    let payload = serde_json::json!({ "error": e.to_string() }).to_string();
                    let _ = self.tx.try_send(payload);
                    break;
                }
            }
        }
    }

    /// Returns false once the consumer is gone. A full queue drops the line after the timeout.
    async fn enqueue(&self, json: String) -> bool {
        match self.tx.send_timeout(json, self.enqueue_timeout).await {
            Ok(()) => true,
            Err(SendTimeoutError::Timeout(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(SendTimeoutError::Closed(_)) => false,
        }
    }
}
