// Push fan-out to live subscribers.
//
// Two subscriber sets: system subscribers get a combined host+topology payload on a
// per-subscriber interval, container subscribers get the full list whenever it changes.
// Every subscriber owns a bounded channel; a slow or dead subscriber never blocks the others.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, warn};

use crate::models::{ContainerSnapshot, NetworkTopology, SystemSnapshot};
use crate::telemetry::Telemetry;

pub type SubscriberId = u64;

/// Serialized payloads, shared across every subscriber of one broadcast.
pub type Frame = Arc<str>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    System,
    Containers,
}

#[derive(Serialize)]
#[serde(untagged)]
pub enum Push {
    SystemInitial {
        system_stats: Arc<SystemSnapshot>,
        containers: Arc<Vec<ContainerSnapshot>>,
        networks: Arc<NetworkTopology>,
    },
    SystemUpdate {
        system_stats: Arc<SystemSnapshot>,
        networks: Arc<NetworkTopology>,
    },
    Containers {
        containers: Arc<Vec<ContainerSnapshot>>,
    },
}

impl Push {
    fn frame(&self) -> Option<Frame> {
        match serde_json::to_string(self) {
            Ok(s) => Some(s.into()),
            Err(e) => {
                warn!(error = %e, "push payload not serializable");
                None
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped: usize,
    pub removed: usize,
}

enum Delivery {
    Sent,
    Dropped,
    Gone,
}

fn deliver(tx: &mpsc::Sender<Frame>, frame: Frame) -> Delivery {
    match tx.try_send(frame) {
        Ok(()) => Delivery::Sent,
        Err(TrySendError::Full(_)) => Delivery::Dropped,
        Err(TrySendError::Closed(_)) => Delivery::Gone,
    }
}

struct Slot {
    tx: mpsc::Sender<Frame>,
    /// Set once the subscriber has been handed a container list, initial or pushed.
    seeded: bool,
}

type SlotMap = HashMap<SubscriberId, Slot>;

#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    system: Mutex<SlotMap>,
    containers: Mutex<SlotMap>,
}

impl Registry {
    fn set(&self, channel: Channel) -> MutexGuard<'_, SlotMap> {
        let set = match channel {
            Channel::System => &self.system,
            Channel::Containers => &self.containers,
        };
        set.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn register(&self, channel: Channel, tx: mpsc::Sender<Frame>) -> SubscriberId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.set(channel).insert(id, Slot { tx, seeded: false });
        id
    }

    fn unregister(&self, channel: Channel, id: SubscriberId) -> bool {
        self.set(channel).remove(&id).is_some()
    }

    fn sender(&self, channel: Channel, id: SubscriberId) -> Option<mpsc::Sender<Frame>> {
        self.set(channel).get(&id).map(|slot| slot.tx.clone())
    }
}

/// Receiving side of one subscriber. Dropping it unregisters the subscriber and stops its
/// pacing task, if it has one.
pub struct Subscription {
    id: SubscriberId,
    channel: Channel,
    rx: mpsc::Receiver<Frame>,
    registry: Arc<Registry>,
    _stop: Option<oneshot::Sender<()>>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub async fn recv(&mut self) -> Option<Frame> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.registry.unregister(self.channel, self.id) {
            debug!(subscriber = self.id, channel = ?self.channel, "subscriber closed");
        }
    }
}

pub struct Broadcaster {
    telemetry: Arc<Telemetry>,
    buffer: usize,
    registry: Arc<Registry>,
}

impl Broadcaster {
    pub fn new(telemetry: Arc<Telemetry>, buffer: usize) -> Self {
        Self {
            telemetry,
            buffer: buffer.max(1),
            registry: Arc::default(),
        }
    }

    fn register(&self, channel: Channel) -> Subscription {
        let (tx, rx) = mpsc::channel(self.buffer);
        let id = self.registry.register(channel, tx);
        debug!(subscriber = id, channel = ?channel, "subscriber registered");
        Subscription {
            id,
            channel,
            rx,
            registry: self.registry.clone(),
            _stop: None,
        }
    }

    /// Register a container-list subscriber and queue the current list as its first message.
    /// A push that reaches the subscriber while the list is being collected supersedes it.
    pub async fn subscribe_containers(&self) -> Subscription {
        let sub = self.register(Channel::Containers);
        let containers = self.telemetry.containers().await;
        let Some(frame) = (Push::Containers { containers }).frame() else {
            return sub;
        };
        let mut set = self.registry.set(Channel::Containers);
        let gone = match set.get_mut(&sub.id) {
            Some(slot) if !slot.seeded => {
                slot.seeded = true;
                matches!(deliver(&slot.tx, frame), Delivery::Gone)
            }
            Some(_) => {
                debug!(subscriber = sub.id, "initial list superseded by a push");
                false
            }
            None => false,
        };
        if gone {
            set.remove(&sub.id);
        }
        drop(set);
        sub
    }

    /// Register a system subscriber: one combined snapshot now, then host stats and topology
    /// every `every` until the subscriber goes away.
    pub async fn subscribe_system(&self, every: Duration) -> Subscription {
        let mut sub = self.register(Channel::System);
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        sub._stop = Some(stop_tx);
        let (system_stats, containers, networks) = tokio::join!(
            self.telemetry.system_snapshot(),
            self.telemetry.containers(),
            self.telemetry.networks(),
        );
        let initial = Push::SystemInitial {
            system_stats,
            containers,
            networks,
        };
        self.send_to(Channel::System, sub.id, &initial);

        let telemetry = self.telemetry.clone();
        let registry = self.registry.clone();
        let id = sub.id;
        tokio::spawn(async move {
            let mut tick = interval(every);
            tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
            tick.tick().await;
            loop {
                tokio::select! {
                    _ = tick.tick() => {}
                    _ = &mut stop_rx => break,
                }
                let Some(tx) = registry.sender(Channel::System, id) else {
                    break;
                };
                let (system_stats, networks) =
                    tokio::join!(telemetry.system_snapshot(), telemetry.networks());
                let Some(frame) = (Push::SystemUpdate {
                    system_stats,
                    networks,
                })
                .frame() else {
                    continue;
                };
                match deliver(&tx, frame) {
                    Delivery::Sent => {}
                    Delivery::Dropped => {
                        warn!(subscriber = id, "system subscriber lagging; update dropped")
                    }
                    Delivery::Gone => {
                        registry.unregister(Channel::System, id);
                        break;
                    }
                }
            }
            debug!(subscriber = id, "system pacing stopped");
        });
        sub
    }

    fn send_to(&self, channel: Channel, id: SubscriberId, push: &Push) {
        let (Some(tx), Some(frame)) = (self.registry.sender(channel, id), push.frame()) else {
            return;
        };
        if let Delivery::Gone = deliver(&tx, frame) {
            self.registry.unregister(channel, id);
        }
    }

    /// Push the container list to every container subscriber. Closed subscribers are removed;
    /// full ones miss this message.
    pub fn broadcast_containers(&self, containers: Arc<Vec<ContainerSnapshot>>) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let Some(frame) = (Push::Containers { containers }).frame() else {
            return report;
        };
        let mut set = self.registry.set(Channel::Containers);
        set.retain(|id, slot| match deliver(&slot.tx, frame.clone()) {
            Delivery::Sent => {
                slot.seeded = true;
                report.delivered += 1;
                true
            }
            Delivery::Dropped => {
                warn!(subscriber = *id, "container subscriber lagging; update dropped");
                report.dropped += 1;
                true
            }
            Delivery::Gone => {
                report.removed += 1;
                false
            }
        });
        drop(set);
        debug!(
            delivered = report.delivered,
            dropped = report.dropped,
            removed = report.removed,
            "container list broadcast"
        );
        report
    }

    pub fn subscriber_count(&self, channel: Channel) -> usize {
        self.registry.set(channel).len()
    }
}
