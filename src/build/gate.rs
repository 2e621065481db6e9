// src/build/gate.rs

//! Pure build admission state machine.
//!
//! Semantics:
//! - At most one build is in flight.
//! - A request arriving while a build runs never starts a second build; it
//!   marks one pending re-run. Further requests before the in-flight build
//!   finishes collapse into that same re-run (last request wins).
//! - When the in-flight build finishes, the pending re-run (if any) starts
//!   immediately and the finished build is reported as superseded.
//!
//! No Tokio, channels or processes here; the async shell lives in
//! [`super::coordinator`].

use tracing::{debug, warn};

use super::BuildId;
use crate::types::TriggerSource;

/// Admission ticket for one build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildTicket {
    pub id: BuildId,
    pub trigger: TriggerSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Nothing was running: start this build now.
    Start(BuildTicket),
    /// A build is running; the request is folded into the pending re-run.
    /// `coalesced` is true when a re-run was already pending.
    Deferred { coalesced: bool },
}

/// Outcome of finishing the in-flight build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Finish {
    /// A newer request is waiting, so this build's result is stale.
    pub superseded: bool,
    /// The re-run to start now, if one was pending.
    pub next: Option<BuildTicket>,
}

#[derive(Debug, Default)]
pub struct BuildGate {
    next_id: BuildId,
    in_flight: Option<BuildTicket>,
    pending: Option<TriggerSource>,
}

impl BuildGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight.is_none()
    }

    pub fn in_flight(&self) -> Option<BuildTicket> {
        self.in_flight
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Record a build request.
    pub fn request(&mut self, trigger: TriggerSource) -> GateDecision {
        if self.in_flight.is_none() {
            return GateDecision::Start(self.admit(trigger));
        }

        let coalesced = self.pending.replace(trigger).is_some();
        debug!(%trigger, coalesced, "build in flight; re-run pending");
        GateDecision::Deferred { coalesced }
    }

    /// Mark the in-flight build `id` as finished.
    pub fn finish(&mut self, id: BuildId) -> Finish {
        match self.in_flight {
            Some(ticket) if ticket.id == id => {}
            other => {
                warn!(
                    finished = id,
                    in_flight = ?other.map(|t| t.id),
                    "finish for a build that is not in flight; ignoring"
                );
                return Finish {
                    superseded: true,
                    next: None,
                };
            }
        }

        self.in_flight = None;
        let next = self.pending.take().map(|trigger| self.admit(trigger));
        Finish {
            superseded: next.is_some(),
            next,
        }
    }

    fn admit(&mut self, trigger: TriggerSource) -> BuildTicket {
        self.next_id += 1;
        let ticket = BuildTicket {
            id: self.next_id,
            trigger,
        };
        self.in_flight = Some(ticket);
        ticket
    }
}
