// src/watch/watcher.rs

use std::path::{Path, PathBuf};

use anyhow::Result;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::watch::debouncer::{ChangeKind, WatchNotification};
use crate::watch::hash::ContentHashes;
use crate::watch::path_utils::relative_str;
use crate::watch::patterns::WatchProfile;

/// Handle for the filesystem watcher.
///
/// Keeps the underlying `RecommendedWatcher` alive; dropping it stops
/// watching and closes the notification channel.
pub struct WatcherHandle {
    _inner: RecommendedWatcher,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle").finish()
    }
}

/// Watch `root` recursively and forward relevant changes to `tx`.
///
/// - Paths are evaluated relative to `root` against `profile`.
/// - Access events are ignored.
/// - With `hashes`, a create/modify only counts when the content changed.
pub fn spawn_watcher(
    root: impl Into<PathBuf>,
    profile: WatchProfile,
    mut hashes: Option<ContentHashes>,
    tx: mpsc::Sender<WatchNotification>,
) -> Result<WatcherHandle> {
    let root = root.into();
    let root = root.canonicalize().unwrap_or(root);

    // Channel from the blocking notify callback into the async world.
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if let Err(err) = event_tx.send(event) {
                    eprintln!("simwatch: failed to forward notify event: {err}");
                }
            }
            Err(err) => {
                eprintln!("simwatch: file watch error: {err}");
            }
        },
        Config::default(),
    )?;

    watcher.watch(&root, RecursiveMode::Recursive)?;
    info!(root = %root.display(), "file watcher started");

    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            debug!(?event, "received notify event");
            for (abs, notification) in relevant_changes(&root, &profile, &event) {
                if notification.kind != ChangeKind::Removed {
                    if let Some(hashes) = hashes.as_mut() {
                        if !hashes.changed(&abs) {
                            debug!(path = %notification.path, "content unchanged; ignoring");
                            continue;
                        }
                    }
                }
                if tx.send(notification).await.is_err() {
                    warn!("debouncer gone; watcher event loop stopping");
                    return;
                }
            }
        }
        debug!("watcher event loop finished");
    });

    Ok(WatcherHandle { _inner: watcher })
}

/// The watched paths an event touches, with their change kind.
pub fn relevant_changes(
    root: &Path,
    profile: &WatchProfile,
    event: &Event,
) -> Vec<(PathBuf, WatchNotification)> {
    let kind = match event.kind {
        EventKind::Access(_) => return Vec::new(),
        EventKind::Create(_) => ChangeKind::Created,
        EventKind::Remove(_) => ChangeKind::Removed,
        EventKind::Modify(_) | EventKind::Any | EventKind::Other => ChangeKind::Modified,
    };

    event
        .paths
        .iter()
        .filter_map(|path| {
            let rel = relative_str(root, path)?;
            profile.matches(&rel).then(|| {
                (
                    path.clone(),
                    WatchNotification { path: rel, kind },
                )
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use notify::event::{AccessKind, CreateKind, DataChange, ModifyKind};

    use super::*;

    fn profile() -> WatchProfile {
        WatchProfile::new(&["**/*.brs".to_string()], &[]).unwrap()
    }

    #[test]
    fn modify_of_watched_file_is_relevant() {
        let event = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path(PathBuf::from("/proj/source/main.brs"))
            .add_path(PathBuf::from("/proj/README.md"));

        let changes = relevant_changes(Path::new("/proj"), &profile(), &event);
        assert_eq!(changes.len(), 1);
        assert_eq!(
            changes[0].1,
            WatchNotification {
                path: "source/main.brs".into(),
                kind: ChangeKind::Modified
            }
        );
    }

    #[test]
    fn access_events_are_ignored() {
        let event = Event::new(EventKind::Access(AccessKind::Any))
            .add_path(PathBuf::from("/proj/source/main.brs"));
        assert!(relevant_changes(Path::new("/proj"), &profile(), &event).is_empty());
    }

    #[test]
    fn create_is_reported_as_created() {
        let event = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/proj/a.brs"));
        let changes = relevant_changes(Path::new("/proj"), &profile(), &event);
        assert_eq!(changes[0].1.kind, ChangeKind::Created);
    }
}
