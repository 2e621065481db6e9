// src/watch/debouncer.rs

//! Watch debouncer.
//!
//! A burst of notifications closer together than the debounce window becomes
//! exactly one build request, issued once the window has passed with no
//! further notification. Every notification pushes the deadline back.
//!
//! [`Debounce`] is the pure timing core; [`spawn_debouncer`] drives it from
//! a channel of [`WatchNotification`]s.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::broadcast::{BroadcastMessage, Broadcaster};
use crate::build::BuildRequester;
use crate::types::TriggerSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Removed,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Created => f.write_str("create"),
            ChangeKind::Modified => f.write_str("change"),
            ChangeKind::Removed => f.write_str("remove"),
        }
    }
}

/// A relevant filesystem change, path relative to the project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchNotification {
    pub path: String,
    pub kind: ChangeKind,
}

/// A closed burst of notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Burst {
    pub events: usize,
    /// The most recent notification of the burst.
    pub last: WatchNotification,
}

#[derive(Debug, Clone)]
pub struct Debounce {
    window: Duration,
    deadline: Option<Instant>,
    events: usize,
    last: Option<WatchNotification>,
}

impl Debounce {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
            events: 0,
            last: None,
        }
    }

    pub fn notify(&mut self, now: Instant, notification: WatchNotification) {
        self.deadline = Some(now + self.window);
        self.events += 1;
        self.last = Some(notification);
    }

    /// When the current burst closes, if one is open.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Close the burst if its quiet period has elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<Burst> {
        match self.deadline {
            Some(deadline) if now >= deadline => {}
            _ => return None,
        }
        self.flush()
    }

    /// Close the open burst now, whatever its deadline.
    pub fn flush(&mut self) -> Option<Burst> {
        self.deadline = None;
        let events = std::mem::take(&mut self.events);
        self.last.take().map(|last| Burst { events, last })
    }
}

/// Spawn the debouncer task. It ends when the notification channel closes or
/// the build requester goes away. A burst still open when the channel closes
/// is requested immediately.
pub fn spawn_debouncer(
    window: Duration,
    mut rx: mpsc::Receiver<WatchNotification>,
    requester: Arc<dyn BuildRequester>,
    broadcaster: Broadcaster,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut debounce = Debounce::new(window);
        loop {
            let deadline = debounce.deadline();
            tokio::select! {
                notification = rx.recv() => match notification {
                    Some(n) => {
                        debug!(path = %n.path, kind = %n.kind, "change notification");
                        debounce.notify(Instant::now(), n);
                    }
                    None => {
                        if let Some(burst) = debounce.flush() {
                            settle(burst, requester.as_ref(), &broadcaster).await;
                        }
                        break;
                    }
                },
                _ = sleep_until(deadline) => {
                    let Some(burst) = debounce.poll(Instant::now()) else {
                        continue;
                    };
                    if !settle(burst, requester.as_ref(), &broadcaster).await {
                        break;
                    }
                }
            }
        }
        debug!("debouncer finished");
    })
}

/// Announce a closed burst and request its build. False once the
/// coordinator is gone.
async fn settle(burst: Burst, requester: &dyn BuildRequester, broadcaster: &Broadcaster) -> bool {
    info!(events = burst.events, path = %burst.last.path, "change burst settled");
    broadcaster.publish(BroadcastMessage::lifecycle(describe(&burst)));
    if let Err(e) = requester.request(TriggerSource::Watch).await {
        warn!(error = %e, "build coordinator unavailable; debouncer stopping");
        return false;
    }
    true
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn describe(burst: &Burst) -> String {
    let more = burst.events.saturating_sub(1);
    if more == 0 {
        format!("🔁 Detected {} on {}, rebuilding...", burst.last.kind, burst.last.path)
    } else {
        format!(
            "🔁 Detected {} on {} (+{more} more), rebuilding...",
            burst.last.kind, burst.last.path
        )
    }
}
