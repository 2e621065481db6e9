// tests/watch_rebuild.rs
//
// Real filesystem notifications through the watcher, debouncer, build and
// supervisor.

#![cfg(unix)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{init_tracing, wait_for_state, write_file};
use simwatch::Services;
use simwatch::build::ShellBuildBackend;
use simwatch::fs::{FileSystem, RealFileSystem};
use simwatch::supervisor::RuntimeState;
use simwatch::types::TriggerSource;
use simwatch_test_utils::builders::ConfigBuilder;
use simwatch_test_utils::viewer::collect_until;
use simwatch_test_utils::with_timeout;
use tempfile::tempdir;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn source_change_rebuilds_and_restarts() {
    init_tracing();
    let dir = tempdir().unwrap();
    write_file(dir.path(), "main.brs", "print 1\n");

    let cfg = ConfigBuilder::new(dir.path())
        .runtime_script("echo up; exec sleep 30")
        .build();
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let backend = Arc::new(ShellBuildBackend::from_config(&cfg, Arc::clone(&fs)).unwrap());
    let services = Services::start(&cfg, backend, fs, true).unwrap();
    let viewer = services.broadcaster.subscribe();

    with_timeout(async {
        services.builds.build(TriggerSource::Manual).await.unwrap();
        wait_for_state(&services, RuntimeState::Running).await;

        // Give the watcher a moment to register before editing.
        tokio::time::sleep(Duration::from_millis(200)).await;
        write_file(dir.path(), "main.brs", "print 2\n");

        let lines = collect_until(&viewer, "Detected", Duration::from_secs(5)).await;
        let detected = lines.last().unwrap();
        assert!(detected.contains("main.brs"), "{detected}");
        assert!(detected.ends_with("rebuilding..."), "{detected}");

        let mut rx = services.supervisor.subscribe_status();
        rx.wait_for(|s| s.generation >= 2 && s.state == RuntimeState::Running)
            .await
            .unwrap();
        let snapshot = services.builds.snapshot();
        assert_eq!(
            snapshot.last.map(|b| b.trigger),
            Some(TriggerSource::Watch)
        );
    })
    .await;

    services.shutdown().await;
}
