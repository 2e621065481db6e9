use std::collections::VecDeque;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use simwatch::build::backend::BuildFuture;
use simwatch::build::{BuildBackend, BuildError, BuildTicket, BuildRequester};
use simwatch::errors::Result;
use simwatch::types::TriggerSource;

/// A fake build backend that:
/// - records every build it is asked to run
/// - returns scripted results in order (falling back to `default_artifacts`)
/// - optionally holds each build until `release()` is called
pub struct FakeBuildBackend {
    default_artifacts: Vec<PathBuf>,
    results: Mutex<VecDeque<std::result::Result<Vec<PathBuf>, BuildError>>>,
    started: Mutex<Vec<BuildTicket>>,
    hold: AtomicBool,
    release: Notify,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

impl FakeBuildBackend {
    pub fn new(default_artifacts: Vec<PathBuf>) -> Arc<Self> {
        Arc::new(Self {
            default_artifacts,
            results: Mutex::new(VecDeque::new()),
            started: Mutex::new(Vec::new()),
            hold: AtomicBool::new(false),
            release: Notify::new(),
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
        })
    }

    /// Builds block until `release()` from now on.
    pub fn hold(&self) {
        self.hold.store(true, Ordering::SeqCst);
    }

    /// Let one held build finish.
    pub fn release(&self) {
        self.release.notify_one();
    }

    pub fn push_result(&self, result: std::result::Result<Vec<PathBuf>, BuildError>) {
        self.results.lock().unwrap().push_back(result);
    }

    pub fn started(&self) -> usize {
        self.started.lock().unwrap().len()
    }

    pub fn tickets(&self) -> Vec<BuildTicket> {
        self.started.lock().unwrap().clone()
    }

    /// Highest number of builds observed running at the same time.
    pub fn max_concurrent(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    /// Poll until `n` builds have started.
    pub async fn wait_started(&self, n: usize) {
        while self.started() < n {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    }
}

impl BuildBackend for FakeBuildBackend {
    fn build(&self, ticket: BuildTicket) -> BuildFuture<'_> {
        Box::pin(async move {
            self.started.lock().unwrap().push(ticket);
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now, Ordering::SeqCst);

            if self.hold.load(Ordering::SeqCst) {
                self.release.notified().await;
            }

            self.running.fetch_sub(1, Ordering::SeqCst);
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(self.default_artifacts.clone()))
        })
    }
}

/// A build requester that only counts requests.
#[derive(Default)]
pub struct RecordingRequester {
    requests: Mutex<Vec<TriggerSource>>,
}

impl RecordingRequester {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl BuildRequester for RecordingRequester {
    fn request(&self, trigger: TriggerSource) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        self.requests.lock().unwrap().push(trigger);
        Box::pin(async { Ok(()) })
    }
}
