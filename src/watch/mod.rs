// src/watch/mod.rs

//! File watching and change detection.
//!
//! This module is responsible for:
//! - Compiling the project's include / exclude globs (`patterns`).
//! - Wiring up a cross-platform filesystem watcher (`notify`).
//! - Optionally ignoring notifications whose content did not change (`hash`).
//! - Collapsing bursts of changes into single build requests (`debouncer`).
//!
//! It does not know how builds run; it only turns filesystem changes into
//! `TriggerSource::Watch` build requests.

pub mod debouncer;
pub mod hash;
pub mod path_utils;
pub mod patterns;
pub mod watcher;

pub use debouncer::{spawn_debouncer, ChangeKind, Debounce, WatchNotification};
pub use hash::ContentHashes;
pub use patterns::{collect_matching_files, WatchProfile};
pub use watcher::{spawn_watcher, WatcherHandle};
