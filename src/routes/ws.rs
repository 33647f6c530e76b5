// WebSocket handlers: subscription pushes and live log sessions

use axum::{
    extract::{
        Path, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::time::{Duration, timeout};

use super::AppState;
use crate::broadcaster::Subscription;
use crate::logstream::{LogSession, Recv, SessionSettings};

pub(super) const WS_PING_INTERVAL: Duration = Duration::from_secs(30);
pub(super) const WS_SEND_TIMEOUT: Duration = Duration::from_secs(10);

type WsSink = SplitSink<WebSocket, Message>;

/// Send one frame; false when the client is gone or too slow.
async fn send(sink: &mut WsSink, msg: Message) -> bool {
    matches!(timeout(WS_SEND_TIMEOUT, sink.send(msg)).await, Ok(Ok(())))
}

async fn send_error(sink: &mut WsSink, message: &str) {
    let json = serde_json::json!({ "error": message }).to_string();
    if send(sink, Message::Text(json.into())).await {
        let _ = timeout(WS_SEND_TIMEOUT, sink.send(Message::Close(None))).await;
    }
}

fn is_closing(incoming: Option<Result<Message, axum::Error>>) -> bool {
    matches!(incoming, None | Some(Err(_)) | Some(Ok(Message::Close(_))))
}

#[derive(Debug, Deserialize)]
pub(super) struct SystemParams {
    interval_ms: Option<u64>,
}

pub(super) async fn ws_system(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<SystemParams>,
) -> impl IntoResponse {
    let every = state.config.streaming.clamp_interval(params.interval_ms);
    ws.on_upgrade(move |socket| async move {
        tracing::info!(interval_ms = every.as_millis() as u64, "Client connected to system stream");
        let sub = state.broadcaster.subscribe_system(every).await;
        forward_subscription(socket, sub).await;
    })
}

pub(super) async fn ws_containers(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        tracing::info!("Client connected to containers stream");
        let sub = state.broadcaster.subscribe_containers().await;
        forward_subscription(socket, sub).await;
    })
}

/// Relay a subscription's frames until either side goes away; dropping the subscription
/// unregisters it.
async fn forward_subscription(socket: WebSocket, mut sub: Subscription) {
    let (mut sink, mut stream) = socket.split();
    let mut ping_interval = tokio::time::interval(WS_PING_INTERVAL);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ping_interval.tick().await;
    loop {
        tokio::select! {
            frame = sub.recv() => {
                let Some(frame) = frame else { break };
                if !send(&mut sink, Message::Text(frame.as_ref().into())).await {
                    break;
                }
            }
            incoming = stream.next() => {
                if is_closing(incoming) {
                    break;
                }
            }
            _ = ping_interval.tick() => {
                if !send(&mut sink, Message::Ping(Bytes::new())).await {
                    break;
                }
            }
        }
    }
    tracing::debug!(subscriber = sub.id(), "subscription socket closed");
}

pub(super) async fn ws_container_logs(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        tracing::info!(container = %id, "Client connected to container log stream");
        let settings = SessionSettings::from(&state.config.streaming);
        let session = LogSession::single(state.telemetry.runtime().clone(), &id, settings);
        drain_session(socket, session, &state).await;
    })
}

pub(super) async fn ws_network_logs(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        tracing::info!(network = %name, "Client connected to network log stream");
        let topology = state.telemetry.networks().await;
        let Some(entry) = topology.get(&name) else {
            let (mut sink, _) = socket.split();
            send_error(&mut sink, &format!("network not found: {}", name)).await;
            return;
        };
        let settings = SessionSettings::from(&state.config.streaming);
        let session = LogSession::network(state.telemetry.runtime().clone(), &entry.containers, settings);
        drain_session(socket, session, &state).await;
    })
}

/// Watch the client side of a log socket; the flag flips once the client closes.
fn watch_client(mut stream: SplitStream<WebSocket>) -> (Arc<AtomicBool>, tokio::task::JoinHandle<()>) {
    let closed = Arc::new(AtomicBool::new(false));
    let flag = closed.clone();
    let handle = tokio::spawn(async move {
        while !is_closing(stream.next().await) {}
        flag.store(true, Ordering::Release);
    });
    (closed, handle)
}

/// Single consumer for a log session: forwards queued lines, polling with a timeout so a
/// client close is noticed even when no lines arrive.
async fn drain_session(socket: WebSocket, mut session: LogSession, state: &AppState) {
    let poll = Duration::from_millis(state.config.streaming.poll_timeout_ms);
    let (mut sink, stream) = socket.split();
    let (closed, watcher) = watch_client(stream);
    loop {
        match session.recv_timeout(poll).await {
            Recv::Line(json) => {
                if !send(&mut sink, Message::Text(json.into())).await {
                    break;
                }
            }
            Recv::Idle => {
                if closed.load(Ordering::Acquire) {
                    break;
                }
            }
            Recv::Finished => {
                let _ = timeout(WS_SEND_TIMEOUT, sink.send(Message::Close(None))).await;
                break;
            }
        }
    }
    watcher.abort();
    session.shutdown().await;
}
