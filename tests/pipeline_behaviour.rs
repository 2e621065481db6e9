// tests/pipeline_behaviour.rs
//
// End-to-end runs with the real shell backend and a `sh` runtime.

#![cfg(unix)]

mod common;

use std::time::Duration;

use common::{init_tracing, start_services, wait_for_state, write_file};
use simwatch::build::BuildStatus;
use simwatch::supervisor::RuntimeState;
use simwatch::types::{PipelineMode, TriggerSource};
use simwatch_test_utils::builders::ConfigBuilder;
use simwatch_test_utils::viewer::{collect_until, drain};
use simwatch_test_utils::with_timeout;
use tempfile::tempdir;

const CHECK_CMD: &str =
    "if grep -q BROKEN main.brs; then echo 'main.brs(1): syntax error' >&2; exit 1; fi";

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn build_error_keeps_previous_runtime_alive() {
    init_tracing();
    let dir = tempdir().unwrap();
    write_file(dir.path(), "main.brs", "print \"hello\"\n");

    let cfg = ConfigBuilder::new(dir.path())
        .build_cmd(CHECK_CMD)
        .runtime_script("echo \"running $1\"; exec sleep 30")
        .build();
    let services = start_services(&cfg);
    let viewer = services.broadcaster.subscribe();

    with_timeout(async {
        let job = services.builds.build(TriggerSource::Manual).await.unwrap();
        assert_eq!(job.status, BuildStatus::Succeeded);
        wait_for_state(&services, RuntimeState::Running).await;
        let before = services.supervisor.status();

        write_file(dir.path(), "main.brs", "BROKEN\n");
        let job = services.builds.build(TriggerSource::Manual).await.unwrap();
        assert_eq!(job.status, BuildStatus::Failed);
        assert!(job.error.as_deref().unwrap_or_default().contains("syntax error"));

        let lines = collect_until(&viewer, "syntax error", Duration::from_secs(5)).await;
        assert!(lines.contains(&"[build error] build failed with exit code 1".to_string()));
        assert!(lines.contains(&"[build error] main.brs(1): syntax error".to_string()));

        let after = services.supervisor.status();
        assert_eq!(after.state, RuntimeState::Running);
        assert_eq!(after.generation, before.generation);
        assert_eq!(after.pid, before.pid);
        assert!(services.surface.status().running);
    })
    .await;

    services.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn compile_pipeline_runs_only_runnable_artifacts() {
    init_tracing();
    let dir = tempdir().unwrap();
    write_file(dir.path(), "source/main.brs", "print 1\n");

    let cfg = ConfigBuilder::new(dir.path())
        .pipeline(PipelineMode::Compile)
        .build_cmd("mkdir -p build && printf 'app' > build/app.out && printf 'lib' > build/lib.out")
        .runtime_script("for f in \"$@\"; do echo \"arg $(basename \"$f\")\"; done")
        .build();
    let services = start_services(&cfg);
    let viewer = services.broadcaster.subscribe();

    with_timeout(async {
        let job = services.builds.build(TriggerSource::Manual).await.unwrap();
        assert_eq!(job.status, BuildStatus::Succeeded);
        assert_eq!(job.artifacts.len(), 1);
        assert!(job.artifacts[0].ends_with("build/app.out"));

        let status = services.supervisor.wait_for_exit(1).await.unwrap();
        assert_eq!(status.exit_code, Some(0));

        let lines = collect_until(&viewer, "exited with code 0", Duration::from_secs(5)).await;
        assert!(lines.contains(&"[runtime] arg app.out".to_string()), "{lines:?}");
        assert!(!lines.iter().any(|l| l.contains("lib.out")), "{lines:?}");

        let files = services.surface.compiled_files();
        assert_eq!(files.get("build/app.out").map(String::as_str), Some("app"));
        assert_eq!(files.len(), 1);
    })
    .await;

    services.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn status_reports_not_running_after_exit() {
    init_tracing();
    let dir = tempdir().unwrap();
    write_file(dir.path(), "main.brs", "print 1\n");

    let cfg = ConfigBuilder::new(dir.path())
        .runtime_script("echo done; exit 3")
        .build();
    let services = start_services(&cfg);

    with_timeout(async {
        assert_eq!(services.surface.status().state, RuntimeState::Idle);

        services.builds.build(TriggerSource::Manual).await.unwrap();
        let exited = services.supervisor.wait_for_exit(1).await.unwrap();
        assert_eq!(exited.exit_code, Some(3));

        let report = services.surface.status();
        assert!(!report.running);
        assert_eq!(report.state, RuntimeState::Exited);
        assert_eq!(report.generation, 1);
        assert!(report.artifacts[0].ends_with("main.brs"));
        assert_eq!(
            report.last_build.map(|b| b.status),
            Some(BuildStatus::Succeeded)
        );
    })
    .await;

    services.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rebuild_replaces_the_running_process() {
    init_tracing();
    let dir = tempdir().unwrap();
    write_file(dir.path(), "main.brs", "print 1\n");

    let cfg = ConfigBuilder::new(dir.path())
        .runtime_script("echo up; exec sleep 30")
        .build();
    let services = start_services(&cfg);
    let viewer = services.broadcaster.subscribe();

    with_timeout(async {
        services.builds.build(TriggerSource::Manual).await.unwrap();
        wait_for_state(&services, RuntimeState::Running).await;
        collect_until(&viewer, "[runtime] up", Duration::from_secs(5)).await;

        services.surface.restart().await.unwrap();
        let mut rx = services.supervisor.subscribe_status();
        rx.wait_for(|s| s.generation == 2 && s.state == RuntimeState::Running)
            .await
            .unwrap();

        let lines = collect_until(&viewer, "[runtime] up", Duration::from_secs(5)).await;
        let stopped = lines.iter().position(|l| l.contains("stopped"));
        let started = lines.iter().position(|l| l.contains("Starting sh"));
        assert!(stopped.is_some() && started.is_some(), "{lines:?}");
        assert!(stopped < started, "{lines:?}");
        assert!(lines.iter().any(|l| l == "Restarting per user request..."));

        assert!(services.surface.stop().await.unwrap());
        assert!(!services.surface.stop().await.unwrap());
        drain(&viewer);
    })
    .await;

    services.shutdown().await;
}
