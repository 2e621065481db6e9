//! Helpers for reading what a `Subscriber` received.

use std::time::Duration;

use simwatch::broadcast::Subscriber;

/// Everything currently queued for `sub`, rendered with prefixes.
pub fn drain(sub: &Subscriber) -> Vec<String> {
    let mut out = Vec::new();
    while let Ok(line) = sub.try_recv() {
        out.push(line.to_string());
    }
    out
}

/// Collect lines until one contains `needle`. Panics after `timeout`.
pub async fn collect_until(sub: &Subscriber, needle: &str, timeout: Duration) -> Vec<String> {
    let deadline = tokio::time::Instant::now() + timeout;
    let mut lines = Vec::new();
    loop {
        while let Ok(line) = sub.try_recv() {
            let rendered = line.to_string();
            let found = rendered.contains(needle);
            lines.push(rendered);
            if found {
                return lines;
            }
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("never saw {needle:?}; got {lines:?}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
