// src/supervisor/mod.rs

//! Process supervisor.
//!
//! Exactly one runtime process exists at a time, and only the supervisor task
//! touches it. Everything else talks to it through a [`SupervisorHandle`],
//! whose commands are processed one at a time in arrival order.
//!
//! - [`actor`] owns the current process and handles restart / stop / exit.
//! - [`process`] spawns the runtime, pumps its output into the broadcaster
//!   and terminates it gracefully.
//! - [`execute`] runs the runtime to completion for the synchronous
//!   `/execute` mode.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot, watch};

use crate::config::ConfigFile;
use crate::errors::{Result, SimwatchError};

pub mod actor;
pub mod execute;
pub mod process;

pub use actor::spawn_supervisor;
pub use execute::{run_to_completion, ExecuteError, ExecuteReport};

const COMMAND_BUFFER: usize = 32;

/// How to launch the runtime.
#[derive(Debug, Clone)]
pub struct RuntimeSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub grace_period: Duration,
    pub echo: bool,
    pub execute_timeout: Duration,
}

impl RuntimeSpec {
    pub fn from_config(cfg: &ConfigFile) -> Self {
        Self {
            program: cfg.runtime.program.clone(),
            args: cfg.runtime.args.clone(),
            cwd: cfg.project.root.clone(),
            grace_period: cfg.runtime.grace_period,
            echo: cfg.runtime.echo,
            execute_timeout: cfg.runtime.execute_timeout,
        }
    }

    /// `program args... artifacts...` in the project root.
    pub fn command(&self, artifacts: &[PathBuf]) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).args(artifacts).current_dir(&self.cwd);
        cmd
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeState {
    /// Nothing has been started yet.
    #[default]
    Idle,
    Starting,
    Running,
    Exited,
}

/// Observable state of the runtime process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RuntimeStatus {
    pub state: RuntimeState,
    /// Incremented on every launch attempt.
    pub generation: u64,
    pub pid: Option<u32>,
    pub artifacts: Vec<PathBuf>,
    pub exit_code: Option<i32>,
}

impl RuntimeStatus {
    pub fn is_running(&self) -> bool {
        self.state == RuntimeState::Running
    }
}

#[derive(Debug)]
pub enum SupervisorCommand {
    /// Stop the current process (if any), then launch over `artifacts`.
    /// `done` receives the new generation or a launch error.
    Restart {
        artifacts: Vec<PathBuf>,
        done: Option<oneshot::Sender<std::result::Result<u64, String>>>,
    },
    /// Stop the current process; `done` receives whether one was running.
    Stop { done: Option<oneshot::Sender<bool>> },
}

#[derive(Debug, Clone)]
pub struct SupervisorHandle {
    tx: mpsc::Sender<SupervisorCommand>,
    status: watch::Receiver<RuntimeStatus>,
}

impl SupervisorHandle {
    pub(crate) fn new(
        tx: mpsc::Sender<SupervisorCommand>,
        status: watch::Receiver<RuntimeStatus>,
    ) -> Self {
        Self { tx, status }
    }

    /// A handle with no supervisor behind it; commands land in the returned
    /// receiver. Used to observe what callers ask the supervisor to do.
    pub fn detached() -> (Self, mpsc::Receiver<SupervisorCommand>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let (_status_tx, status_rx) = watch::channel(RuntimeStatus::default());
        (Self::new(tx, status_rx), rx)
    }

    /// Enqueue a restart without waiting for it to be applied.
    pub async fn restart(&self, artifacts: Vec<PathBuf>) -> Result<()> {
        self.send(SupervisorCommand::Restart {
            artifacts,
            done: None,
        })
        .await
    }

    /// Restart and wait until the new process has been launched.
    pub async fn restart_and_wait(&self, artifacts: Vec<PathBuf>) -> Result<u64> {
        let (done, rx) = oneshot::channel();
        self.send(SupervisorCommand::Restart {
            artifacts,
            done: Some(done),
        })
        .await?;
        rx.await
            .map_err(|_| SimwatchError::ChannelClosed("process supervisor"))?
            .map_err(|e| SimwatchError::Other(anyhow::anyhow!(e)))
    }

    /// Stop the runtime. Returns whether a process was running.
    pub async fn stop(&self) -> Result<bool> {
        let (done, rx) = oneshot::channel();
        self.send(SupervisorCommand::Stop { done: Some(done) }).await?;
        rx.await
            .map_err(|_| SimwatchError::ChannelClosed("process supervisor"))
    }

    pub fn status(&self) -> RuntimeStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<RuntimeStatus> {
        self.status.clone()
    }

    /// Wait until a process of generation `>= generation` has exited.
    pub async fn wait_for_exit(&self, generation: u64) -> Result<RuntimeStatus> {
        let mut rx = self.status.clone();
        let status = rx
            .wait_for(|s| s.generation >= generation && s.state == RuntimeState::Exited)
            .await
            .map_err(|_| SimwatchError::ChannelClosed("process supervisor"))?;
        Ok(status.clone())
    }

    async fn send(&self, cmd: SupervisorCommand) -> Result<()> {
        self.tx
            .send(cmd)
            .await
            .map_err(|_| SimwatchError::ChannelClosed("process supervisor"))
    }
}
