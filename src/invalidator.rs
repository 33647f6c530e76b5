// Event-driven invalidation: follows the runtime's lifecycle feed, refreshes the container
// list, evicts the topology, and pushes the new list to container subscribers.
// When the feed ends or fails the loop exits and TTL expiry is the only refresh path.

use futures_util::StreamExt;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::broadcaster::Broadcaster;
use crate::cache::keys;
use crate::runtime::RuntimeEvent;
use crate::telemetry::Telemetry;

pub struct InvalidatorDeps {
    pub telemetry: Arc<Telemetry>,
    pub broadcaster: Arc<Broadcaster>,
    pub shutdown_rx: oneshot::Receiver<()>,
}

pub fn spawn(deps: InvalidatorDeps) -> tokio::task::JoinHandle<()> {
    let InvalidatorDeps {
        telemetry,
        broadcaster,
        mut shutdown_rx,
    } = deps;

    tokio::spawn(async move {
        let mut events = telemetry.runtime().events();
        loop {
            tokio::select! {
                item = events.next() => match item {
                    Some(Ok(event)) if event.is_container() => {
                        on_container_event(&telemetry, &broadcaster, &event).await;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, operation = "events", "event feed failed; relying on TTL expiry");
                        break;
                    }
                    None => {
                        info!("event feed closed; relying on TTL expiry");
                        break;
                    }
                },
                _ = &mut shutdown_rx => {
                    debug!("Invalidator shutting down");
                    break;
                }
            }
        }
    })
}

/// Handle one container lifecycle event.
pub async fn on_container_event(telemetry: &Telemetry, broadcaster: &Broadcaster, event: &RuntimeEvent) {
    debug!(action = %event.action, container = ?event.actor_id, "container event");
    if let Some(id) = &event.actor_id {
        telemetry.cache().invalidate_container(id);
    } else {
        telemetry.cache().invalidate(keys::NETWORKS);
    }
    match telemetry.refresh_containers().await {
        Ok(list) => {
            broadcaster.broadcast_containers(list);
        }
        Err(e) => warn!(error = %e, operation = "refresh_containers", "refresh after event failed"),
    }
}
