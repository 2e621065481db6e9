// src/watch/patterns.rs

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::GlobSet;

use crate::build::artifacts::build_globset;
use crate::config::ConfigFile;
use crate::fs::FileSystem;
use crate::types::PipelineMode;

/// Directories whose churn never means "the project changed".
const ALWAYS_IGNORED: &[&str] = &[".git/**"];

/// Compiled include/exclude globs for the project.
///
/// Patterns are relative to the project root; the watcher passes relative
/// paths (e.g. `"source/main.brs"`) into `matches`.
#[derive(Clone)]
pub struct WatchProfile {
    include: GlobSet,
    exclude: Option<GlobSet>,
}

impl fmt::Debug for WatchProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchProfile")
            .field("include", &self.include.len())
            .field("exclude", &self.exclude.as_ref().map(GlobSet::len))
            .finish()
    }
}

impl WatchProfile {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        let include = build_globset(include).context("building watch globset")?;
        let exclude = if exclude.is_empty() {
            None
        } else {
            Some(build_globset(exclude).context("building exclude globset")?)
        };
        Ok(Self { include, exclude })
    }

    /// Profile for a loaded config. In the compile pipeline the build output
    /// directory is excluded so a build never triggers itself.
    pub fn from_config(cfg: &ConfigFile) -> Result<Self> {
        let mut exclude = cfg.watch.exclude.clone();
        exclude.extend(ALWAYS_IGNORED.iter().map(|s| s.to_string()));

        if cfg.build.pipeline == PipelineMode::Compile && cfg.build.output_dir.is_relative() {
            let dir = cfg
                .build
                .output_dir
                .to_string_lossy()
                .replace('\\', "/");
            let dir = dir.trim_start_matches("./").trim_end_matches('/');
            if !dir.is_empty() && dir != "." {
                exclude.push(format!("{dir}/**"));
            }
        }

        Self::new(&cfg.watch.include, &exclude)
    }

    pub fn matches(&self, rel_path: &str) -> bool {
        if !self.include.is_match(rel_path) {
            return false;
        }
        match &self.exclude {
            Some(exclude) => !exclude.is_match(rel_path),
            None => true,
        }
    }
}

/// Collect all files under `root` that this profile watches.
///
/// Used to seed content hashes at startup.
pub fn collect_matching_files(
    fs: &dyn FileSystem,
    root: &Path,
    profile: &WatchProfile,
) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        for path in fs.read_dir(&dir)? {
            if fs.is_dir(&path) {
                stack.push(path);
            } else if fs.is_file(&path) {
                if let Ok(rel) = path.strip_prefix(root) {
                    let rel_str = rel.to_string_lossy().replace('\\', "/");
                    if profile.matches(&rel_str) {
                        files.push(path);
                    }
                }
            }
        }
    }

    Ok(files)
}
