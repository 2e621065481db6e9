// src/broadcast/hub.rs

//! Subscriber registry and fan-out.
//!
//! The subscriber set lives behind a single mutex and is only reachable
//! through `subscribe` / `unsubscribe` / `publish`. `publish` never blocks on
//! a subscriber. A subscriber whose undelivered backlog would grow past the
//! capacity is evicted; one with an empty queue always takes the whole
//! message, however many lines it has.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use super::message::{BroadcastMessage, Line};

pub type SubscriberId = u64;

#[derive(Debug, Default)]
struct Registry {
    next_id: SubscriberId,
    subscribers: BTreeMap<SubscriberId, Sender<Line>>,
}

/// Fan-out hub shared by the build coordinator, the supervisor and the
/// control surface. Cloning is cheap; all clones share one registry.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    registry: Arc<Mutex<Registry>>,
    capacity: usize,
}

impl Broadcaster {
    /// `capacity` is the backlog of undelivered lines a subscriber may carry
    /// into a publish before it counts as slow and is evicted.
    pub fn new(capacity: usize) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
            capacity: capacity.max(1),
        }
    }

    /// Register a new viewer.
    pub fn subscribe(&self) -> Subscriber {
        let (tx, rx) = channel::unbounded();
        let mut registry = self.registry.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.subscribers.insert(id, tx);
        debug!(subscriber = id, total = registry.subscribers.len(), "subscriber added");

        Subscriber {
            id,
            rx,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Remove a viewer. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        remove(&self.registry, id)
    }

    /// Deliver every line of `message` to every currently registered
    /// subscriber. Returns how many subscribers received the whole message.
    pub fn publish(&self, message: BroadcastMessage) -> usize {
        let lines = message.lines();
        let mut registry = self.registry.lock();
        let mut evicted = Vec::new();

        for (&id, tx) in registry.subscribers.iter() {
            let backlog = tx.len();
            if backlog > 0 && backlog + lines.len() > self.capacity {
                warn!(subscriber = id, backlog, "subscriber queue full; evicting slow viewer");
                evicted.push(id);
                continue;
            }
            for line in &lines {
                if tx.send(line.clone()).is_err() {
                    debug!(subscriber = id, "subscriber receiver gone; removing");
                    evicted.push(id);
                    break;
                }
            }
        }

        for id in &evicted {
            registry.subscribers.remove(id);
        }

        let delivered = registry.subscribers.len();
        trace!(
            category = %message.category(),
            lines = lines.len(),
            delivered,
            "published message"
        );
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.lock().subscribers.len()
    }
}

fn remove(registry: &Mutex<Registry>, id: SubscriberId) -> bool {
    let mut registry = registry.lock();
    let removed = registry.subscribers.remove(&id).is_some();
    if removed {
        debug!(subscriber = id, total = registry.subscribers.len(), "subscriber removed");
    }
    removed
}

/// One live viewer. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscriber {
    id: SubscriberId,
    rx: Receiver<Line>,
    registry: Weak<Mutex<Registry>>,
}

impl Subscriber {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// True while the broadcaster still delivers to this subscriber.
    pub fn is_open(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|r| r.lock().subscribers.contains_key(&self.id))
    }

    /// Block until a line arrives or `timeout` elapses.
    ///
    /// `Disconnected` means the subscriber was evicted (or the broadcaster
    /// dropped) and every queued line has been consumed.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Line, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    pub fn try_recv(&self) -> Result<Line, TryRecvError> {
        self.rx.try_recv()
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            remove(&registry, self.id);
        }
    }
}
