// src/supervisor/process.rs

//! One runtime process: spawn, output pumps, exit monitoring, termination.
//!
//! Each process gets a monitor task that races `child.wait()` against a stop
//! request. Whichever way it ends, the monitor drains the output pumps
//! before publishing the single exit line, so no output of a process can
//! appear after its own exit message.

use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::RuntimeSpec;
use crate::broadcast::{BroadcastMessage, Broadcaster, Category};

/// Upper bound on waiting for stdout/stderr to hit EOF after exit. A
/// grandchild that inherited the pipes can keep them open indefinitely.
const PUMP_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Sent by a monitor when its process exits on its own.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ExitNotice {
    pub generation: u64,
    pub code: Option<i32>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ExitReport {
    pub code: Option<i32>,
}

pub(crate) struct RuntimeProcess {
    pub generation: u64,
    pub pid: Option<u32>,
    pub artifacts: Vec<PathBuf>,
    stop_tx: Option<oneshot::Sender<()>>,
    monitor: JoinHandle<ExitReport>,
}

impl RuntimeProcess {
    /// Ask the process to stop and wait until it is gone and its exit line
    /// has been published. A process that already exited returns at once.
    pub async fn terminate(mut self) -> ExitReport {
        if let Some(stop) = self.stop_tx.take() {
            let _ = stop.send(());
        }
        self.join().await
    }

    pub async fn join(self) -> ExitReport {
        match self.monitor.await {
            Ok(report) => report,
            Err(e) => {
                error!(generation = self.generation, error = %e, "runtime monitor task failed");
                ExitReport { code: None }
            }
        }
    }
}

pub(crate) fn spawn_runtime(
    spec: &RuntimeSpec,
    artifacts: Vec<PathBuf>,
    generation: u64,
    broadcaster: &Broadcaster,
    exit_tx: mpsc::UnboundedSender<ExitNotice>,
) -> io::Result<RuntimeProcess> {
    let mut cmd = spec.command(&artifacts);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn()?;
    let pid = child.id();
    info!(generation, pid, program = %spec.program, "runtime process started");

    let mut pumps = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        pumps.push(spawn_pump(stdout, Category::RuntimeOutput, broadcaster.clone(), spec.echo));
    }
    if let Some(stderr) = child.stderr.take() {
        pumps.push(spawn_pump(stderr, Category::RuntimeError, broadcaster.clone(), spec.echo));
    }

    let (stop_tx, stop_rx) = oneshot::channel();
    let monitor = tokio::spawn(monitor(
        child,
        stop_rx,
        pumps,
        Monitor {
            generation,
            program: spec.program.clone(),
            grace_period: spec.grace_period,
            broadcaster: broadcaster.clone(),
            exit_tx,
        },
    ));

    Ok(RuntimeProcess {
        generation,
        pid,
        artifacts,
        stop_tx: Some(stop_tx),
        monitor,
    })
}

struct Monitor {
    generation: u64,
    program: String,
    grace_period: Duration,
    broadcaster: Broadcaster,
    exit_tx: mpsc::UnboundedSender<ExitNotice>,
}

async fn monitor(
    mut child: Child,
    stop_rx: oneshot::Receiver<()>,
    pumps: Vec<JoinHandle<()>>,
    ctx: Monitor,
) -> ExitReport {
    let generation = ctx.generation;
    let (status, stopped) = tokio::select! {
        status = child.wait() => (status, false),
        // A dropped sender means the supervisor is gone; stop as well.
        _ = stop_rx => (terminate_child(&mut child, ctx.grace_period).await, true),
    };

    drain_pumps(pumps).await;

    let code = match &status {
        Ok(status) => status.code(),
        Err(e) => {
            warn!(generation, error = %e, "failed to wait for runtime process");
            None
        }
    };

    let line = match (stopped, code) {
        (true, _) => format!("⏹ {} stopped", ctx.program),
        (false, Some(code)) => format!("🛑 {} exited with code {code}", ctx.program),
        (false, None) => format!("🛑 {} terminated by signal", ctx.program),
    };
    info!(generation, ?code, stopped, "runtime process exited");
    ctx.broadcaster.publish(BroadcastMessage::lifecycle(line));

    if !stopped {
        let _ = ctx.exit_tx.send(ExitNotice { generation, code });
    }

    ExitReport { code }
}

/// SIGTERM, then SIGKILL once `grace` has elapsed.
async fn terminate_child(child: &mut Child, grace: Duration) -> io::Result<ExitStatus> {
    request_shutdown(child).await;

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(status) => status,
        Err(_) => {
            warn!(pid = child.id(), ?grace, "runtime ignored termination request; killing");
            child.kill().await?;
            child.wait().await
        }
    }
}

#[cfg(unix)]
async fn request_shutdown(child: &mut Child) {
    let Some(pid) = child.id() else {
        return;
    };
    let sent = tokio::process::Command::new("kill")
        .arg("-TERM")
        .arg(pid.to_string())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false);

    if !sent {
        debug!(pid, "SIGTERM delivery failed; killing instead");
        let _ = child.start_kill();
    }
}

#[cfg(not(unix))]
async fn request_shutdown(child: &mut Child) {
    let _ = child.start_kill();
}

async fn drain_pumps(pumps: Vec<JoinHandle<()>>) {
    let deadline = Instant::now() + PUMP_DRAIN_TIMEOUT;
    for mut pump in pumps {
        if tokio::time::timeout_at(deadline, &mut pump).await.is_err() {
            debug!("output pipe still open after exit; abandoning pump");
            pump.abort();
            let _ = pump.await;
        }
    }
}

fn spawn_pump<R>(reader: R, category: Category, broadcaster: Broadcaster, echo: bool) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&buf);
                    let text = text.trim_end_matches(['\n', '\r']);
                    let message = BroadcastMessage::new(category, text);
                    if echo {
                        echo_line(&message);
                    }
                    broadcaster.publish(message);
                }
                Err(e) => {
                    debug!(%category, error = %e, "runtime output stream closed");
                    break;
                }
            }
        }
    })
}

fn echo_line(message: &BroadcastMessage) {
    for line in message.lines() {
        if message.category() == Category::RuntimeError {
            eprintln!("{line}");
        } else {
            println!("{line}");
        }
    }
}
