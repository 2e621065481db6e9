#![allow(dead_code)]

use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use simwatch::Services;
use simwatch::build::ShellBuildBackend;
use simwatch::config::ConfigFile;
use simwatch::fs::{FileSystem, RealFileSystem};
use simwatch::supervisor::RuntimeState;

pub use simwatch_test_utils::init_tracing;

pub fn write_file(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

/// Services with the real shell backend and no file watcher.
pub fn start_services(cfg: &ConfigFile) -> Services {
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let backend = Arc::new(ShellBuildBackend::from_config(cfg, Arc::clone(&fs)).unwrap());
    Services::start(cfg, backend, fs, false).unwrap()
}

/// Wait until the supervisor reports a process in `state`.
pub async fn wait_for_state(services: &Services, state: RuntimeState) {
    let mut rx = services.supervisor.subscribe_status();
    tokio::time::timeout(Duration::from_secs(10), rx.wait_for(|s| s.state == state))
        .await
        .expect("timed out waiting for runtime state")
        .expect("supervisor gone");
}

/// Minimal blocking HTTP/1.1 client: returns (status, body).
pub fn http(addr: SocketAddr, method: &str, path: &str) -> (u16, String) {
    let mut stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(10))).unwrap();
    write!(
        stream,
        "{method} {path} HTTP/1.1\r\nHost: {addr}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
    )
    .unwrap();

    let mut raw = String::new();
    stream.read_to_string(&mut raw).unwrap();

    let status = raw
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .expect("malformed status line");
    let body = raw
        .split_once("\r\n\r\n")
        .map(|(_, b)| b.to_string())
        .unwrap_or_default();
    (status, body)
}

/// An open `/events` connection.
pub struct SseClient {
    reader: BufReader<TcpStream>,
}

impl SseClient {
    /// Connect and read up to the `: connected` comment, so the viewer is
    /// registered once this returns.
    pub fn connect(addr: SocketAddr) -> Self {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(10))).unwrap();
        write!(stream, "GET /events HTTP/1.1\r\nHost: {addr}\r\n\r\n").unwrap();
        let mut client = Self {
            reader: BufReader::new(stream),
        };
        client.read_until(|line| line == ": connected");
        client
    }

    /// Read lines until one satisfies `pred`; returns every line read.
    pub fn read_until(&mut self, pred: impl Fn(&str) -> bool) -> Vec<String> {
        let mut lines = Vec::new();
        loop {
            let mut line = String::new();
            let n = self.reader.read_line(&mut line).unwrap();
            assert!(n > 0, "stream closed; got {lines:?}");
            let line = line.trim_end_matches(['\r', '\n']).to_string();
            let done = pred(&line);
            lines.push(line);
            if done {
                return lines;
            }
        }
    }
}
