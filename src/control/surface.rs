// src/control/surface.rs

//! Control operations, independent of HTTP.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::broadcast::{BroadcastMessage, Broadcaster, Subscriber};
use crate::build::{BuildCoordinatorHandle, BuildJob, BuildRequester};
use crate::config::ConfigFile;
use crate::errors::Result;
use crate::fs::FileSystem;
use crate::supervisor::{
    run_to_completion, ExecuteError, ExecuteReport, RuntimeSpec, RuntimeState, SupervisorHandle,
};
use crate::types::{PipelineMode, TriggerSource};

/// Snapshot returned by `/status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub running: bool,
    pub state: RuntimeState,
    pub pid: Option<u32>,
    pub generation: u64,
    pub artifacts: Vec<PathBuf>,
    pub target: PathBuf,
    pub pipeline: PipelineMode,
    pub last_build: Option<BuildJob>,
}

#[derive(Clone)]
pub struct ControlSurface {
    builds: BuildCoordinatorHandle,
    supervisor: SupervisorHandle,
    broadcaster: Broadcaster,
    fs: Arc<dyn FileSystem>,
    runtime: RuntimeSpec,
    target: PathBuf,
    pipeline: PipelineMode,
}

impl ControlSurface {
    pub fn new(
        cfg: &ConfigFile,
        builds: BuildCoordinatorHandle,
        supervisor: SupervisorHandle,
        broadcaster: Broadcaster,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        Self {
            builds,
            supervisor,
            broadcaster,
            fs,
            runtime: RuntimeSpec::from_config(cfg),
            target: cfg.project.target_path(),
            pipeline: cfg.build.pipeline,
        }
    }

    /// Request a manual build + restart. Returns once the request is queued;
    /// progress shows up on the event stream.
    pub async fn restart(&self) -> Result<()> {
        info!("restart requested through control surface");
        self.broadcaster
            .publish(BroadcastMessage::info("Restarting per user request..."));
        self.builds.request(TriggerSource::Manual).await
    }

    /// Stop the runtime. Stopping when nothing runs is not an error.
    pub async fn stop(&self) -> Result<bool> {
        info!("stop requested through control surface");
        self.supervisor.stop().await
    }

    pub fn status(&self) -> StatusReport {
        let runtime = self.supervisor.status();
        let build = self.builds.snapshot();
        let artifacts = if runtime.state == RuntimeState::Idle {
            build.artifacts
        } else {
            runtime.artifacts.clone()
        };

        StatusReport {
            running: runtime.is_running(),
            state: runtime.state,
            pid: runtime.pid,
            generation: runtime.generation,
            artifacts,
            target: self.target.clone(),
            pipeline: self.pipeline,
            last_build: build.last,
        }
    }

    /// Content of every current artifact, keyed by path relative to the
    /// project root. Unreadable artifacts get a placeholder instead of
    /// failing the whole call.
    pub fn compiled_files(&self) -> BTreeMap<String, String> {
        self.current_artifacts()
            .iter()
            .map(|path| {
                let content = self
                    .fs
                    .read_to_string(path)
                    .unwrap_or_else(|e| format!("<error reading file: {e:#}>"));
                (display_name(&self.runtime.cwd, path), content)
            })
            .collect()
    }

    /// Run the runtime synchronously over the current artifacts.
    pub async fn execute(&self) -> std::result::Result<ExecuteReport, ExecuteError> {
        let artifacts = self.current_artifacts();
        run_to_completion(&self.runtime, &artifacts).await
    }

    pub fn subscribe(&self) -> Subscriber {
        self.broadcaster.subscribe()
    }

    fn current_artifacts(&self) -> Vec<PathBuf> {
        let built = self.builds.current_artifacts();
        if built.is_empty() {
            self.supervisor.status().artifacts
        } else {
            built
        }
    }
}

fn display_name(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}
