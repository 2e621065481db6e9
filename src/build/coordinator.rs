// src/build/coordinator.rs

//! Async shell around [`BuildGate`].
//!
//! The coordinator is a single task that owns the gate. Requests arrive on an
//! mpsc channel; each admitted build runs on its own task against the
//! [`BuildBackend`] and reports back on a completion channel. On completion:
//!
//! - failure: the report is broadcast as a build error and the running
//!   program is left alone;
//! - success, not superseded: the artifact set is handed to the supervisor;
//! - success, superseded: the result is dropped because a newer build is
//!   about to start.
//!
//! The restart for build N is enqueued on the supervisor before build N+1 is
//! started, so restarts are applied in build order.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::backend::BuildBackend;
use super::gate::{BuildGate, BuildTicket, GateDecision};
use super::{BuildError, BuildJob};
use crate::broadcast::{BroadcastMessage, Broadcaster};
use crate::errors::{Result, SimwatchError};
use crate::supervisor::SupervisorHandle;
use crate::types::TriggerSource;

const COMMAND_BUFFER: usize = 64;

/// Something that accepts build requests. Implemented by
/// [`BuildCoordinatorHandle`]; the watcher only depends on this.
pub trait BuildRequester: Send + Sync {
    fn request(&self, trigger: TriggerSource) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Latest observable build state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildSnapshot {
    /// Most recently finished (or currently running) build.
    pub last: Option<BuildJob>,
    /// Artifacts of the last successful build that was applied.
    pub artifacts: Vec<PathBuf>,
    pub building: bool,
}

enum Command {
    Request {
        trigger: TriggerSource,
        reply: Option<oneshot::Sender<BuildJob>>,
    },
}

struct Completion {
    ticket: BuildTicket,
    result: std::result::Result<Vec<PathBuf>, BuildError>,
}

#[derive(Debug, Clone)]
pub struct BuildCoordinatorHandle {
    tx: mpsc::Sender<Command>,
    snapshot: watch::Receiver<BuildSnapshot>,
}

impl BuildCoordinatorHandle {
    /// Request a build. The returned receiver resolves with the build that
    /// covers this request: either the one started for it or the re-run it
    /// was coalesced into.
    pub async fn request_build(&self, trigger: TriggerSource) -> Result<oneshot::Receiver<BuildJob>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Request {
            trigger,
            reply: Some(reply),
        })
        .await?;
        Ok(rx)
    }

    /// Request a build and wait for its outcome.
    pub async fn build(&self, trigger: TriggerSource) -> Result<BuildJob> {
        let rx = self.request_build(trigger).await?;
        rx.await
            .map_err(|_| SimwatchError::ChannelClosed("build coordinator"))
    }

    pub fn snapshot(&self) -> BuildSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn current_artifacts(&self) -> Vec<PathBuf> {
        self.snapshot.borrow().artifacts.clone()
    }

    async fn send(&self, cmd: Command) -> Result<()> {
        self.tx
            .send(cmd)
            .await
            .map_err(|_| SimwatchError::ChannelClosed("build coordinator"))
    }
}

impl BuildRequester for BuildCoordinatorHandle {
    fn request(&self, trigger: TriggerSource) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(self.send(Command::Request {
            trigger,
            reply: None,
        }))
    }
}

/// Spawn the coordinator task.
pub fn spawn_build_coordinator(
    backend: Arc<dyn BuildBackend>,
    supervisor: SupervisorHandle,
    broadcaster: Broadcaster,
) -> (BuildCoordinatorHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
    let (done_tx, done_rx) = mpsc::unbounded_channel();
    let (snapshot_tx, snapshot_rx) = watch::channel(BuildSnapshot::default());

    let coordinator = Coordinator {
        gate: BuildGate::new(),
        rx,
        done_tx,
        done_rx,
        backend,
        supervisor,
        broadcaster,
        snapshot: snapshot_tx,
        in_flight_waiters: Vec::new(),
        pending_waiters: Vec::new(),
    };

    let join = tokio::spawn(coordinator.run());
    (
        BuildCoordinatorHandle {
            tx,
            snapshot: snapshot_rx,
        },
        join,
    )
}

struct Coordinator {
    gate: BuildGate,
    rx: mpsc::Receiver<Command>,
    done_tx: mpsc::UnboundedSender<Completion>,
    done_rx: mpsc::UnboundedReceiver<Completion>,
    backend: Arc<dyn BuildBackend>,
    supervisor: SupervisorHandle,
    broadcaster: Broadcaster,
    snapshot: watch::Sender<BuildSnapshot>,
    in_flight_waiters: Vec<oneshot::Sender<BuildJob>>,
    pending_waiters: Vec<oneshot::Sender<BuildJob>>,
}

impl Coordinator {
    async fn run(mut self) {
        info!("build coordinator started");
        loop {
            tokio::select! {
                cmd = self.rx.recv() => match cmd {
                    Some(cmd) => self.on_command(cmd),
                    None => break,
                },
                Some(done) = self.done_rx.recv() => self.on_completion(done).await,
            }
        }
        info!("build coordinator stopped");
    }

    fn on_command(&mut self, cmd: Command) {
        match cmd {
            Command::Request { trigger, reply } => match self.gate.request(trigger) {
                GateDecision::Start(ticket) => {
                    self.in_flight_waiters.extend(reply);
                    self.start(ticket);
                }
                GateDecision::Deferred { coalesced } => {
                    debug!(%trigger, coalesced, "build request deferred");
                    self.pending_waiters.extend(reply);
                }
            },
        }
    }

    fn start(&mut self, ticket: BuildTicket) {
        self.broadcaster.publish(BroadcastMessage::lifecycle(format!(
            "🔨 Build #{} started ({})",
            ticket.id, ticket.trigger
        )));
        self.snapshot.send_modify(|s| {
            s.last = Some(BuildJob::running(ticket));
            s.building = true;
        });

        let backend = Arc::clone(&self.backend);
        let done_tx = self.done_tx.clone();
        tokio::spawn(async move {
            let result = backend.build(ticket).await;
            // The coordinator only goes away on shutdown.
            let _ = done_tx.send(Completion { ticket, result });
        });
    }

    async fn on_completion(&mut self, done: Completion) {
        let Completion { ticket, result } = done;
        let finish = self.gate.finish(ticket.id);
        let job = BuildJob::finished(ticket, result, finish.superseded);

        match (&job.failure, job.superseded) {
            (Some(err), _) => {
                warn!(build = job.id, kind = ?err.kind(), error = %err, "build failed");
                self.broadcaster
                    .publish(BroadcastMessage::build_error(err.report()));
            }
            (None, true) => {
                info!(build = job.id, "build superseded by a newer request; result discarded");
                self.broadcaster.publish(BroadcastMessage::info(format!(
                    "Build #{} superseded by newer changes",
                    job.id
                )));
            }
            (None, false) => {
                self.broadcaster.publish(BroadcastMessage::info(format!(
                    "✅ Build #{} succeeded ({} artifact{})",
                    job.id,
                    job.artifacts.len(),
                    if job.artifacts.len() == 1 { "" } else { "s" }
                )));
                if let Err(e) = self.supervisor.restart(job.artifacts.clone()).await {
                    error!(build = job.id, error = %e, "could not hand artifacts to supervisor");
                }
            }
        }

        let applied = job.succeeded() && !job.superseded;
        self.snapshot.send_modify(|s| {
            if applied {
                s.artifacts = job.artifacts.clone();
            }
            s.last = Some(job.clone());
            s.building = finish.next.is_some();
        });

        for waiter in self.in_flight_waiters.drain(..) {
            let _ = waiter.send(job.clone());
        }

        if let Some(next) = finish.next {
            self.in_flight_waiters = std::mem::take(&mut self.pending_waiters);
            self.start(next);
        }
    }
}
