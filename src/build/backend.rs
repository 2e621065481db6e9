// src/build/backend.rs

//! Pluggable build backend.
//!
//! The coordinator talks to a `BuildBackend` instead of spawning processes
//! itself, so tests can substitute a fake whose builds finish on command.
//! [`ShellBuildBackend`] is the production implementation: it runs the
//! configured shell command (if any) and then resolves the artifact set for
//! the configured pipeline.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info, warn};

use super::artifacts::{collect_artifacts, ArtifactFilter};
use super::gate::BuildTicket;
use super::BuildError;
use crate::config::ConfigFile;
use crate::fs::FileSystem;
use crate::types::PipelineMode;

/// `sh` exit status when the command itself could not be found.
const SHELL_COMMAND_NOT_FOUND: i32 = 127;
/// `sh` exit status when the command exists but is not executable.
const SHELL_NOT_EXECUTABLE: i32 = 126;

pub type BuildFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<PathBuf>, BuildError>> + Send + 'a>>;

/// Trait abstracting how a build is carried out.
pub trait BuildBackend: Send + Sync {
    /// Run one build and return the runnable artifact set.
    fn build(&self, ticket: BuildTicket) -> BuildFuture<'_>;
}

/// Production backend: shell command plus pipeline-specific artifact lookup.
#[derive(Debug, Clone)]
pub struct ShellBuildBackend {
    root: PathBuf,
    pipeline: PipelineMode,
    cmd: Option<String>,
    timeout: Duration,
    target: PathBuf,
    output_dir: PathBuf,
    filter: ArtifactFilter,
    fs: Arc<dyn FileSystem>,
}

impl ShellBuildBackend {
    pub fn from_config(cfg: &ConfigFile, fs: Arc<dyn FileSystem>) -> anyhow::Result<Self> {
        let filter = ArtifactFilter::new(&cfg.build.artifacts, &cfg.build.exclude_artifacts)?;
        Ok(Self {
            root: cfg.project.root.clone(),
            pipeline: cfg.build.pipeline,
            cmd: cfg.build.cmd.clone(),
            timeout: cfg.build.timeout,
            target: cfg.project.target_path(),
            output_dir: cfg.build.output_path(&cfg.project.root),
            filter,
            fs,
        })
    }

    async fn run_command(&self, cmd: &str) -> Result<(), BuildError> {
        let program = shell_program();
        let mut command = shell_command(cmd);
        command
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(cmd, root = %self.root.display(), "spawning build command");
        let child = command.spawn().map_err(|e| BuildError::ToolInvocation {
            program: program.to_string(),
            reason: e.to_string(),
        })?;

        // Dropping the `wait_with_output` future on timeout kills the child.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(BuildError::ToolInvocation {
                    program: program.to_string(),
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                warn!(cmd, timeout = ?self.timeout, "build command timed out");
                return Err(BuildError::TimedOut {
                    program: cmd.to_string(),
                    after: self.timeout,
                });
            }
        };

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let diagnostics = if stderr.trim().is_empty() { stdout } else { stderr };

        match output.status.code() {
            Some(code @ (SHELL_COMMAND_NOT_FOUND | SHELL_NOT_EXECUTABLE)) if cfg!(unix) => {
                Err(BuildError::ToolInvocation {
                    program: cmd.to_string(),
                    reason: format!("shell exited with {code}: {}", diagnostics.trim()),
                })
            }
            Some(code) => Err(BuildError::Failed { code, diagnostics }),
            None => Err(BuildError::Failed {
                code: -1,
                diagnostics: if diagnostics.trim().is_empty() {
                    "build tool terminated by signal".to_string()
                } else {
                    diagnostics
                },
            }),
        }
    }

    fn resolve_artifacts(&self) -> Result<Vec<PathBuf>, BuildError> {
        match self.pipeline {
            PipelineMode::Direct => {
                if self.fs.is_file(&self.target) {
                    Ok(vec![self.target.clone()])
                } else {
                    Err(BuildError::NoArtifacts {
                        detail: format!("target script {} not found", self.target.display()),
                    })
                }
            }
            PipelineMode::Compile => {
                let artifacts = collect_artifacts(self.fs.as_ref(), &self.output_dir, &self.filter)
                    .map_err(|e| BuildError::NoArtifacts {
                        detail: format!("{e:#}"),
                    })?;
                if artifacts.is_empty() {
                    return Err(BuildError::NoArtifacts {
                        detail: format!(
                            "no runnable files in {}",
                            self.output_dir.display()
                        ),
                    });
                }
                Ok(artifacts)
            }
        }
    }
}

impl BuildBackend for ShellBuildBackend {
    fn build(&self, ticket: BuildTicket) -> BuildFuture<'_> {
        Box::pin(async move {
            info!(build = ticket.id, trigger = %ticket.trigger, pipeline = %self.pipeline, "build started");

            if let Some(cmd) = &self.cmd {
                self.run_command(cmd).await?;
            }

            let artifacts = self.resolve_artifacts()?;
            info!(build = ticket.id, artifacts = artifacts.len(), "build succeeded");
            Ok(artifacts)
        })
    }
}

fn shell_program() -> &'static str {
    if cfg!(windows) { "cmd" } else { "sh" }
}

fn shell_command(cmd: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(cmd);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmd);
        c
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::fs;

    use super::*;
    use crate::build::BuildErrorKind;
    use crate::config::RawConfigFile;
    use crate::fs::RealFileSystem;
    use crate::types::TriggerSource;

    const TICKET: BuildTicket = BuildTicket {
        id: 1,
        trigger: TriggerSource::Manual,
    };

    fn backend(root: &std::path::Path, edit: impl FnOnce(&mut RawConfigFile)) -> ShellBuildBackend {
        let mut raw = RawConfigFile::default();
        raw.project.root = root.to_path_buf();
        raw.project.target = PathBuf::from("main.brs");
        edit(&mut raw);
        let cfg = ConfigFile::try_from(raw).expect("valid config");
        ShellBuildBackend::from_config(&cfg, Arc::new(RealFileSystem)).unwrap()
    }

    #[tokio::test]
    async fn direct_pipeline_returns_the_target() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("main.brs"), "print 1").unwrap();

        let artifacts = backend(dir.path(), |_| {}).build(TICKET).await.unwrap();
        assert_eq!(artifacts, vec![dir.path().join("main.brs")]);
    }

    #[tokio::test]
    async fn direct_pipeline_without_target_is_empty_output() {
        let dir = tempfile::tempdir().unwrap();
        let err = backend(dir.path(), |_| {}).build(TICKET).await.unwrap_err();
        assert_eq!(err.kind(), BuildErrorKind::EmptyOutput);
    }

    #[tokio::test]
    async fn failing_command_reports_diagnostics() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("main.brs"), "print 1").unwrap();

        let err = backend(dir.path(), |raw| {
            raw.build.cmd = Some("echo 'syntax error line 4' >&2; exit 3".into());
        })
        .build(TICKET)
        .await
        .unwrap_err();

        assert_eq!(err.kind(), BuildErrorKind::BuildLogic);
        assert_eq!(
            err,
            BuildError::Failed {
                code: 3,
                diagnostics: "syntax error line 4\n".into()
            }
        );
    }

    #[tokio::test]
    async fn missing_tool_is_a_tool_invocation_failure() {
        let dir = tempfile::tempdir().unwrap();
        let err = backend(dir.path(), |raw| {
            raw.build.cmd = Some("definitely-not-a-real-compiler-xyz".into());
        })
        .build(TICKET)
        .await
        .unwrap_err();
        assert_eq!(err.kind(), BuildErrorKind::ToolInvocation);
    }

    #[tokio::test]
    async fn slow_command_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let err = backend(dir.path(), |raw| {
            raw.build.cmd = Some("sleep 5".into());
            raw.build.timeout = "100ms".into();
        })
        .build(TICKET)
        .await
        .unwrap_err();
        assert!(matches!(err, BuildError::TimedOut { .. }));
    }

    #[tokio::test]
    async fn compile_pipeline_collects_filtered_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = backend(dir.path(), |raw| {
            raw.build.pipeline = PipelineMode::Compile;
            raw.build.cmd =
                Some("mkdir -p build && echo m > build/main.out && echo l > build/lib.out".into());
        })
        .build(TICKET)
        .await
        .unwrap();
        assert_eq!(artifacts, vec![dir.path().join("build").join("main.out")]);
    }

    #[tokio::test]
    async fn compile_pipeline_with_only_helpers_is_empty_output() {
        let dir = tempfile::tempdir().unwrap();
        let err = backend(dir.path(), |raw| {
            raw.build.pipeline = PipelineMode::Compile;
            raw.build.cmd = Some("mkdir -p build && echo l > build/lib.out".into());
        })
        .build(TICKET)
        .await
        .unwrap_err();
        assert_eq!(err.kind(), BuildErrorKind::EmptyOutput);
    }
}
