// src/lib.rs

pub mod broadcast;
pub mod build;
pub mod cli;
pub mod config;
pub mod control;
pub mod errors;
pub mod fs;
pub mod logging;
pub mod supervisor;
pub mod types;
pub mod watch;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::broadcast::Broadcaster;
use crate::build::{spawn_build_coordinator, BuildBackend, BuildCoordinatorHandle, BuildRequester, ShellBuildBackend};
use crate::cli::CliArgs;
use crate::config::{load_and_validate, ConfigFile, Overrides};
use crate::control::{ControlServer, ControlSurface, ServerHandle};
use crate::fs::{FileSystem, RealFileSystem};
use crate::supervisor::{spawn_supervisor, RuntimeSpec, SupervisorHandle};
use crate::types::TriggerSource;
use crate::watch::{
    collect_matching_files, spawn_debouncer, spawn_watcher, ContentHashes, WatchProfile,
    WatcherHandle,
};

const WATCH_BUFFER: usize = 256;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading (file, environment, CLI)
/// - broadcaster, supervisor and build coordinator
/// - (optional) file watcher + debouncer
/// - the HTTP control server
/// - the initial build and Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let overrides = Overrides {
        port: args.port,
        pipeline: args.pipeline,
    };
    let cfg = load_and_validate(&config_path, &overrides)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    if let Some(target) = cfg.missing_target() {
        warn!(target = %target.display(), "target script not found");
    }

    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let backend = Arc::new(ShellBuildBackend::from_config(&cfg, Arc::clone(&fs))?);
    let mut services = Services::start(&cfg, backend, fs, !args.once)?;

    let server = ControlServer::bind(&cfg.server.bind_addr())?;
    let addr = services.serve(server, cfg.server.keep_alive)?;
    info!("simulator web UI -> http://{addr}");
    info!(
        "serving project: {} -> {}",
        cfg.project.root.display(),
        cfg.project.target_path().display()
    );

    if args.once {
        let outcome = tokio::select! {
            outcome = run_once(&services) => outcome,
            _ = tokio::signal::ctrl_c() => Err(anyhow::anyhow!("interrupted")),
        };
        services.shutdown().await;
        return outcome;
    }

    services.builds.request(TriggerSource::Manual).await?;

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl+C; shutting down");
    } else {
        info!("Ctrl+C received; shutting down");
    }
    services.shutdown().await;
    Ok(())
}

/// One build, one run; the runtime's exit status becomes ours.
async fn run_once(services: &Services) -> Result<()> {
    let job = services.builds.build(TriggerSource::Manual).await?;
    if !job.succeeded() {
        bail!(
            "build failed: {}",
            job.error.unwrap_or_else(|| "unknown error".to_string())
        );
    }

    let status = services.supervisor.wait_for_exit(1).await?;
    match status.exit_code {
        Some(0) => Ok(()),
        Some(code) => bail!("runtime exited with code {code}"),
        None => bail!("runtime did not exit normally"),
    }
}

/// The running components, owned together so they can be shut down in
/// order.
pub struct Services {
    pub broadcaster: Broadcaster,
    pub supervisor: SupervisorHandle,
    pub builds: BuildCoordinatorHandle,
    pub surface: ControlSurface,
    watcher: Option<WatcherHandle>,
    debouncer: Option<JoinHandle<()>>,
    server: Option<ServerHandle>,
    tasks: Vec<JoinHandle<()>>,
}

impl Services {
    /// Start broadcaster, supervisor, coordinator and (when `watch` is set)
    /// the watcher + debouncer. Must run inside a Tokio runtime.
    pub fn start(
        cfg: &ConfigFile,
        backend: Arc<dyn BuildBackend>,
        fs: Arc<dyn FileSystem>,
        watch: bool,
    ) -> Result<Self> {
        let broadcaster = Broadcaster::new(cfg.server.subscriber_buffer);
        let (supervisor, supervisor_task) =
            spawn_supervisor(RuntimeSpec::from_config(cfg), broadcaster.clone());
        let (builds, coordinator_task) =
            spawn_build_coordinator(backend, supervisor.clone(), broadcaster.clone());
        let tasks = vec![supervisor_task, coordinator_task];

        let (watcher, debouncer) = if watch {
            let (watcher, debouncer) = start_watching(cfg, &fs, &builds, &broadcaster)?;
            (Some(watcher), Some(debouncer))
        } else {
            (None, None)
        };

        let surface = ControlSurface::new(
            cfg,
            builds.clone(),
            supervisor.clone(),
            broadcaster.clone(),
            fs,
        );

        Ok(Self {
            broadcaster,
            supervisor,
            builds,
            surface,
            watcher,
            debouncer,
            server: None,
            tasks,
        })
    }

    /// Start serving the control surface; returns the bound address.
    pub fn serve(&mut self, server: ControlServer, keep_alive: Duration) -> Result<SocketAddr> {
        let handle = server.start(
            self.surface.clone(),
            keep_alive,
            tokio::runtime::Handle::current(),
        )?;
        let addr = handle.addr();
        self.server = Some(handle);
        Ok(addr)
    }

    /// Stop watching, stop the runtime (bounded by its grace period) and
    /// close the HTTP server.
    pub async fn shutdown(mut self) {
        // Abort first: closing the watcher channel would flush a pending burst.
        if let Some(debouncer) = self.debouncer.take() {
            debouncer.abort();
        }
        self.watcher.take();
        match self.supervisor.stop().await {
            Ok(true) => debug!("runtime stopped on shutdown"),
            Ok(false) => {}
            Err(e) => debug!(error = %e, "supervisor already gone"),
        }
        if let Some(server) = self.server.take() {
            let _ = tokio::task::spawn_blocking(move || server.shutdown()).await;
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
        info!("simwatch stopped");
    }
}

fn start_watching(
    cfg: &ConfigFile,
    fs: &Arc<dyn FileSystem>,
    builds: &BuildCoordinatorHandle,
    broadcaster: &Broadcaster,
) -> Result<(WatcherHandle, JoinHandle<()>)> {
    let profile = WatchProfile::from_config(cfg)?;
    let root = watch_root(&cfg.project.root);

    let hashes = cfg.watch.use_hash.then(|| {
        let mut hashes = ContentHashes::new(Arc::clone(fs));
        match collect_matching_files(fs.as_ref(), &root, &profile) {
            Ok(files) => hashes.seed(files),
            Err(e) => warn!(error = %e, "could not seed content hashes"),
        }
        hashes
    });

    let (tx, rx) = mpsc::channel(WATCH_BUFFER);
    let watcher = spawn_watcher(root, profile, hashes, tx)?;
    let requester: Arc<dyn BuildRequester> = Arc::new(builds.clone());
    let debouncer = spawn_debouncer(cfg.watch.debounce, rx, requester, broadcaster.clone());
    Ok((watcher, debouncer))
}

/// The watcher canonicalizes its root; seed hashes under the same spelling.
fn watch_root(root: &Path) -> PathBuf {
    root.canonicalize().unwrap_or_else(|_| root.to_path_buf())
}

/// Print the effective configuration.
fn print_dry_run(cfg: &ConfigFile) {
    println!("simwatch dry-run");
    println!("  project.root = {}", cfg.project.root.display());
    if let Some(name) = &cfg.project.name {
        println!("  project.name = {name}");
    }
    println!("  project.target = {}", cfg.project.target_path().display());
    println!();

    println!("server:");
    println!("  listen: {}", cfg.server.bind_addr());
    println!("  subscriber_buffer: {}", cfg.server.subscriber_buffer);
    println!("  keep_alive: {:?}", cfg.server.keep_alive);
    println!();

    println!("watch:");
    println!("  include: {:?}", cfg.watch.include);
    if !cfg.watch.exclude.is_empty() {
        println!("  exclude: {:?}", cfg.watch.exclude);
    }
    println!("  debounce: {:?}", cfg.watch.debounce);
    println!("  use_hash: {}", cfg.watch.use_hash);
    println!();

    println!("build:");
    println!("  pipeline: {}", cfg.build.pipeline);
    if let Some(cmd) = &cfg.build.cmd {
        println!("  cmd: {cmd}");
    }
    if cfg.build.pipeline == types::PipelineMode::Compile {
        println!("  output_dir: {}", cfg.build.output_dir.display());
        println!("  artifacts: {:?}", cfg.build.artifacts);
        println!("  exclude_artifacts: {:?}", cfg.build.exclude_artifacts);
    }
    println!("  timeout: {:?}", cfg.build.timeout);
    println!();

    println!("runtime:");
    println!("  program: {}", cfg.runtime.program);
    if !cfg.runtime.args.is_empty() {
        println!("  args: {:?}", cfg.runtime.args);
    }
    println!("  grace_period: {:?}", cfg.runtime.grace_period);
    println!("  echo: {}", cfg.runtime.echo);

    debug!("dry-run complete (nothing started)");
}
