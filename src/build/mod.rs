// src/build/mod.rs

//! Build coordination.
//!
//! - [`gate`] is the pure at-most-one-in-flight / coalescing state machine.
//! - [`coordinator`] is the async actor around the gate: it runs builds on a
//!   [`BuildBackend`], reports failures on the event stream and hands
//!   successful artifact sets to the process supervisor.
//! - [`backend`] defines the `BuildBackend` seam and the shell-command
//!   implementation used in production.
//! - [`artifacts`] collects and filters the runnable artifact set.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::types::TriggerSource;

pub mod artifacts;
pub mod backend;
pub mod coordinator;
pub mod gate;

pub use artifacts::{collect_artifacts, ArtifactFilter};
pub use backend::{BuildBackend, ShellBuildBackend};
pub use coordinator::{spawn_build_coordinator, BuildCoordinatorHandle, BuildRequester, BuildSnapshot};
pub use gate::{BuildGate, BuildTicket, Finish, GateDecision};

pub type BuildId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

/// One build attempt as seen by the rest of the system.
#[derive(Debug, Clone, Serialize)]
pub struct BuildJob {
    pub id: BuildId,
    pub trigger: TriggerSource,
    pub status: BuildStatus,
    pub artifacts: Vec<PathBuf>,
    /// Rendered failure report, when `status == Failed`.
    pub error: Option<String>,
    #[serde(skip)]
    pub failure: Option<BuildError>,
    /// A newer request arrived while this build ran, so its result was not
    /// handed to the supervisor.
    pub superseded: bool,
}

impl BuildJob {
    pub fn running(ticket: BuildTicket) -> Self {
        Self {
            id: ticket.id,
            trigger: ticket.trigger,
            status: BuildStatus::Running,
            artifacts: Vec::new(),
            error: None,
            failure: None,
            superseded: false,
        }
    }

    pub fn finished(
        ticket: BuildTicket,
        result: Result<Vec<PathBuf>, BuildError>,
        superseded: bool,
    ) -> Self {
        match result {
            Ok(artifacts) => Self {
                status: BuildStatus::Succeeded,
                artifacts,
                superseded,
                ..Self::running(ticket)
            },
            Err(err) => Self {
                status: BuildStatus::Failed,
                error: Some(err.report()),
                failure: Some(err),
                superseded,
                ..Self::running(ticket)
            },
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == BuildStatus::Succeeded
    }
}

/// Coarse classification of a failed build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildErrorKind {
    /// The tool could not be launched or never finished.
    ToolInvocation,
    /// The tool ran and reported failure.
    BuildLogic,
    /// The tool succeeded but nothing runnable came out.
    EmptyOutput,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("could not run build tool `{program}`: {reason}")]
    ToolInvocation { program: String, reason: String },

    #[error("build tool `{program}` did not finish within {after:?}")]
    TimedOut { program: String, after: Duration },

    #[error("build failed with exit code {code}")]
    Failed { code: i32, diagnostics: String },

    #[error("build produced no runnable artifacts: {detail}")]
    NoArtifacts { detail: String },
}

impl BuildError {
    pub fn kind(&self) -> BuildErrorKind {
        match self {
            BuildError::ToolInvocation { .. } | BuildError::TimedOut { .. } => {
                BuildErrorKind::ToolInvocation
            }
            BuildError::Failed { .. } => BuildErrorKind::BuildLogic,
            BuildError::NoArtifacts { .. } => BuildErrorKind::EmptyOutput,
        }
    }

    /// Human-readable report for the event stream, including the tool's
    /// diagnostics when there are any.
    pub fn report(&self) -> String {
        match self {
            BuildError::Failed { diagnostics, .. } if !diagnostics.trim().is_empty() => {
                format!("{self}\n{}", diagnostics.trim_end())
            }
            _ => self.to_string(),
        }
    }
}
