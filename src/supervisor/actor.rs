// src/supervisor/actor.rs

use std::path::PathBuf;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::process::{spawn_runtime, ExitNotice, RuntimeProcess};
use super::{
    RuntimeSpec, RuntimeState, RuntimeStatus, SupervisorCommand, SupervisorHandle,
    COMMAND_BUFFER,
};
use crate::broadcast::{BroadcastMessage, Broadcaster};

/// Spawn the supervisor task. Dropping every handle stops the current
/// process and ends the task.
pub fn spawn_supervisor(
    spec: RuntimeSpec,
    broadcaster: Broadcaster,
) -> (SupervisorHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
    let (exit_tx, exit_rx) = mpsc::unbounded_channel();
    let (status_tx, status_rx) = watch::channel(RuntimeStatus::default());

    let supervisor = Supervisor {
        spec,
        broadcaster,
        rx,
        exit_tx,
        exit_rx,
        status: status_tx,
        current: None,
        generation: 0,
    };

    let join = tokio::spawn(supervisor.run());
    (SupervisorHandle::new(tx, status_rx), join)
}

struct Supervisor {
    spec: RuntimeSpec,
    broadcaster: Broadcaster,
    rx: mpsc::Receiver<SupervisorCommand>,
    exit_tx: mpsc::UnboundedSender<ExitNotice>,
    exit_rx: mpsc::UnboundedReceiver<ExitNotice>,
    status: watch::Sender<RuntimeStatus>,
    current: Option<RuntimeProcess>,
    generation: u64,
}

impl Supervisor {
    async fn run(mut self) {
        info!(program = %self.spec.program, "process supervisor started");
        loop {
            tokio::select! {
                cmd = self.rx.recv() => match cmd {
                    Some(cmd) => self.on_command(cmd).await,
                    None => break,
                },
                Some(notice) = self.exit_rx.recv() => self.on_exit(notice).await,
            }
        }
        self.stop_current().await;
        info!("process supervisor stopped");
    }

    async fn on_command(&mut self, cmd: SupervisorCommand) {
        match cmd {
            SupervisorCommand::Restart { artifacts, done } => {
                let outcome = self.restart(artifacts).await;
                if let Some(done) = done {
                    let _ = done.send(outcome);
                }
            }
            SupervisorCommand::Stop { done } => {
                let stopped = self.stop_current().await;
                if !stopped {
                    debug!("stop requested with no runtime process; nothing to do");
                }
                reply(done, stopped);
            }
        }
    }

    async fn restart(&mut self, artifacts: Vec<PathBuf>) -> Result<u64, String> {
        // The old process is fully gone before the new one is spawned.
        self.stop_current().await;

        if artifacts.is_empty() {
            let msg = "nothing to run: artifact set is empty".to_string();
            warn!("{msg}");
            self.broadcaster.publish(BroadcastMessage::runtime_error(msg.clone()));
            return Err(msg);
        }

        self.generation += 1;
        let generation = self.generation;
        self.status.send_replace(RuntimeStatus {
            state: RuntimeState::Starting,
            generation,
            pid: None,
            artifacts: artifacts.clone(),
            exit_code: None,
        });

        let shown: Vec<String> = artifacts.iter().map(|p| p.display().to_string()).collect();
        self.broadcaster.publish(BroadcastMessage::lifecycle(format!(
            "🔁 Starting {}: {}",
            self.spec.program,
            shown.join(" ")
        )));

        match spawn_runtime(
            &self.spec,
            artifacts,
            generation,
            &self.broadcaster,
            self.exit_tx.clone(),
        ) {
            Ok(process) => {
                self.status.send_modify(|s| {
                    s.state = RuntimeState::Running;
                    s.pid = process.pid;
                });
                self.current = Some(process);
                Ok(generation)
            }
            Err(e) => {
                let msg = format!("could not launch runtime `{}`: {e}", self.spec.program);
                warn!(generation, error = %e, program = %self.spec.program, "runtime spawn failed");
                self.broadcaster.publish(BroadcastMessage::lifecycle(format!("⚠️ {msg}")));
                self.status.send_modify(|s| s.state = RuntimeState::Exited);
                Err(msg)
            }
        }
    }

    /// Returns whether a process was running.
    async fn stop_current(&mut self) -> bool {
        let Some(process) = self.current.take() else {
            return false;
        };
        let generation = process.generation;
        let artifacts = process.artifacts.clone();
        info!(generation, pid = process.pid, "stopping runtime process");
        let report = process.terminate().await;
        self.status.send_replace(RuntimeStatus {
            state: RuntimeState::Exited,
            generation,
            pid: None,
            artifacts,
            exit_code: report.code,
        });
        true
    }

    async fn on_exit(&mut self, notice: ExitNotice) {
        let is_current = self
            .current
            .as_ref()
            .is_some_and(|p| p.generation == notice.generation);
        if !is_current {
            debug!(generation = notice.generation, "exit of a replaced process; ignoring");
            return;
        }

        if let Some(process) = self.current.take() {
            process.join().await;
        }
        self.status.send_modify(|s| {
            s.state = RuntimeState::Exited;
            s.pid = None;
            s.exit_code = notice.code;
        });
    }
}

fn reply(done: Option<oneshot::Sender<bool>>, value: bool) {
    if let Some(done) = done {
        let _ = done.send(value);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::broadcast::Subscriber;

    fn spec(program: &str, args: &[&str], grace: Duration) -> RuntimeSpec {
        RuntimeSpec {
            program: program.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            cwd: std::env::temp_dir(),
            grace_period: grace,
            echo: false,
            execute_timeout: Duration::from_secs(5),
        }
    }

    async fn collect_until(sub: &Subscriber, needle: &str) -> Vec<String> {
        let mut lines = Vec::new();
        for _ in 0..400 {
            while let Ok(line) = sub.try_recv() {
                let done = line.text.contains(needle);
                lines.push(line.to_string());
                if done {
                    return lines;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("never saw {needle:?}; got {lines:?}");
    }

    #[tokio::test]
    async fn natural_exit_reports_not_running() {
        let hub = Broadcaster::new(256);
        let viewer = hub.subscribe();
        // `sh -c script sh artifact`: the artifact path lands in $1.
        let (handle, _join) = spawn_supervisor(
            spec("sh", &["-c", "echo hello from $1; exit 0", "sh"], Duration::from_secs(1)),
            hub,
        );

        let generation = handle
            .restart_and_wait(vec![PathBuf::from("main.brs")])
            .await
            .unwrap();
        let status = handle.wait_for_exit(generation).await.unwrap();
        assert!(!status.is_running());
        assert_eq!(status.exit_code, Some(0));

        let lines = collect_until(&viewer, "exited with code 0").await;
        assert!(lines.contains(&"[runtime] hello from main.brs".to_string()), "{lines:?}");
    }

    #[tokio::test]
    async fn restart_terminates_the_old_process_first() {
        let hub = Broadcaster::new(256);
        let viewer = hub.subscribe();
        let (handle, _join) = spawn_supervisor(
            spec("sh", &["-c", "echo up $1; exec sleep 30", "sh"], Duration::from_secs(2)),
            hub,
        );

        let first = handle.restart_and_wait(vec![PathBuf::from("a")]).await.unwrap();
        let second = handle.restart_and_wait(vec![PathBuf::from("b")]).await.unwrap();
        assert_eq!(second, first + 1);
        assert!(handle.status().is_running());

        let lines = collect_until(&viewer, "up b").await;
        let stopped = lines
            .iter()
            .position(|l| l.contains("stopped"))
            .expect("old process stop line");
        let started = lines
            .iter()
            .rposition(|l| l.starts_with("🔁 Starting"))
            .expect("second start line");
        assert!(stopped < started, "{lines:?}");

        assert!(handle.stop().await.unwrap());
        assert!(!handle.status().is_running());
    }

    #[tokio::test]
    async fn stubborn_process_is_killed_after_grace() {
        let hub = Broadcaster::new(64);
        let (handle, _join) = spawn_supervisor(
            spec("sh", &["-c", "trap '' TERM; echo ready; while true; do sleep 1; done", "sh"],
                Duration::from_millis(200)),
            hub,
        );

        handle.restart_and_wait(vec![PathBuf::from("x")]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let stopped = tokio::time::timeout(Duration::from_secs(5), handle.stop())
            .await
            .expect("stop is bounded by the grace period")
            .unwrap();
        assert!(stopped);
    }

    #[tokio::test]
    async fn stop_without_process_is_a_noop() {
        let (handle, _join) =
            spawn_supervisor(spec("sh", &[], Duration::from_secs(1)), Broadcaster::new(8));
        assert!(!handle.stop().await.unwrap());
        assert_eq!(handle.status().state, RuntimeState::Idle);
    }

    #[tokio::test]
    async fn missing_program_is_reported_not_fatal() {
        let hub = Broadcaster::new(64);
        let viewer = hub.subscribe();
        let (handle, _join) = spawn_supervisor(
            spec("definitely-not-a-runtime-xyz", &[], Duration::from_secs(1)),
            hub,
        );

        let err = handle
            .restart_and_wait(vec![PathBuf::from("main.brs")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("could not launch runtime"));
        assert!(!handle.status().is_running());

        let lines = collect_until(&viewer, "could not launch").await;
        let report = lines.last().unwrap();
        assert!(
            report.starts_with("⚠️ could not launch runtime `definitely-not-a-runtime-xyz`"),
            "{report}"
        );
        assert!(lines.iter().all(|l| !l.starts_with("[runtime error] ")), "{lines:?}");
    }

    #[tokio::test]
    async fn empty_artifact_set_is_rejected() {
        let (handle, _join) =
            spawn_supervisor(spec("sh", &[], Duration::from_secs(1)), Broadcaster::new(8));
        assert!(handle.restart_and_wait(Vec::new()).await.is_err());
        assert_eq!(handle.status().generation, 0);
    }
}
