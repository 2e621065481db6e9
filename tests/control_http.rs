// tests/control_http.rs
//
// The control server over real TCP, with the fake build backend.

mod common;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{http, init_tracing, write_file, SseClient};
use simwatch::Services;
use simwatch::broadcast::BroadcastMessage;
use simwatch::control::ControlServer;
use simwatch::fs::{FileSystem, RealFileSystem};
use simwatch_test_utils::builders::ConfigBuilder;
use simwatch_test_utils::fake_backend::FakeBuildBackend;
use tempfile::tempdir;

fn serve(services: &mut Services) -> std::net::SocketAddr {
    let server = ControlServer::bind("127.0.0.1:0").unwrap();
    services.serve(server, Duration::from_millis(200)).unwrap()
}

async fn blocking<T: Send + 'static>(f: impl FnOnce() -> T + Send + 'static) -> T {
    tokio::task::spawn_blocking(f).await.unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn read_endpoints_and_routing_errors() {
    init_tracing();
    let dir = tempdir().unwrap();
    let cfg = ConfigBuilder::new(dir.path()).runtime_program("true").build();
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let backend = FakeBuildBackend::new(Vec::new());
    let mut services = Services::start(&cfg, backend, fs, false).unwrap();
    let addr = serve(&mut services);

    let (code, body) = blocking(move || http(addr, "GET", "/status")).await;
    assert_eq!(code, 200);
    let status: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(status["running"], false);
    assert_eq!(status["state"], "idle");
    assert_eq!(status["pipeline"], "direct");
    assert!(status["last_build"].is_null());

    let (code, body) = blocking(move || http(addr, "GET", "/")).await;
    assert_eq!(code, 200);
    assert!(body.contains("EventSource"));

    let (code, _) = blocking(move || http(addr, "GET", "/nope")).await;
    assert_eq!(code, 404);

    let (code, _) = blocking(move || http(addr, "POST", "/status")).await;
    assert_eq!(code, 405);

    let (code, _) = blocking(move || http(addr, "DELETE", "/restart")).await;
    assert_eq!(code, 405);

    // Nothing built yet: nothing to execute.
    let (code, body) = blocking(move || http(addr, "POST", "/execute")).await;
    assert_eq!(code, 409);
    assert!(body.contains("no compiled artifacts"), "{body}");

    services.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn restart_builds_and_compiled_files_reports_unreadable_artifacts() {
    init_tracing();
    let dir = tempdir().unwrap();
    write_file(dir.path(), "main.brs", "print 1\n");
    let missing = dir.path().join("gone.brs");

    let cfg = ConfigBuilder::new(dir.path()).runtime_program("true").build();
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let backend = FakeBuildBackend::new(vec![dir.path().join("main.brs"), missing]);
    let mut services = Services::start(&cfg, backend.clone(), fs, false).unwrap();
    let addr = serve(&mut services);

    let (code, body) = blocking(move || http(addr, "POST", "/restart")).await;
    assert_eq!(code, 200, "{body}");
    simwatch_test_utils::with_timeout(backend.wait_started(1)).await;
    simwatch_test_utils::with_timeout(services.supervisor.wait_for_exit(1))
        .await
        .unwrap();

    let (code, body) = blocking(move || http(addr, "GET", "/compiled-files")).await;
    assert_eq!(code, 200);
    let files: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(files["main.brs"], "print 1\n");
    let placeholder = files["gone.brs"].as_str().unwrap();
    assert!(placeholder.starts_with("<error reading file:"), "{placeholder}");

    let (code, body) = blocking(move || http(addr, "GET", "/stop")).await;
    assert_eq!(code, 200, "{body}");

    services.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn every_viewer_gets_every_line_and_a_disconnect_is_isolated() {
    init_tracing();
    let dir = tempdir().unwrap();
    let cfg = ConfigBuilder::new(dir.path()).runtime_program("true").build();
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let backend = FakeBuildBackend::new(vec![PathBuf::from("unused")]);
    let mut services = Services::start(&cfg, backend, fs, false).unwrap();
    let addr = serve(&mut services);
    let broadcaster = services.broadcaster.clone();

    blocking(move || {
        let mut a = SseClient::connect(addr);
        let mut b = SseClient::connect(addr);
        let c = SseClient::connect(addr);
        assert_eq!(broadcaster.subscriber_count(), 3);

        broadcaster.publish(BroadcastMessage::info("first\nsecond"));
        for viewer in [&mut a, &mut b] {
            let lines = viewer.read_until(|l| l == "data: second");
            assert!(lines.contains(&"data: first".to_string()));
        }

        drop(c);
        let deadline = Instant::now() + Duration::from_secs(5);
        while broadcaster.subscriber_count() > 2 {
            assert!(Instant::now() < deadline, "closed viewer never unsubscribed");
            broadcaster.publish(BroadcastMessage::lifecycle("tick"));
            std::thread::sleep(Duration::from_millis(50));
        }

        broadcaster.publish(BroadcastMessage::runtime_error("boom"));
        for viewer in [&mut a, &mut b] {
            viewer.read_until(|l| l == "data: [runtime error] boom");
        }
    })
    .await;

    services.shutdown().await;
}
