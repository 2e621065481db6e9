// src/build/artifacts.rs

//! Runnable artifact selection for the compile pipeline.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::fs::FileSystem;

/// Include / exclude globs applied to paths relative to the output directory.
///
/// A file is runnable when it matches at least one include glob and no
/// exclude glob. Exclusion wins; it is how helper libraries such as
/// `lib.out` are kept off the runtime's command line.
#[derive(Clone)]
pub struct ArtifactFilter {
    include: GlobSet,
    exclude: Option<GlobSet>,
}

impl fmt::Debug for ArtifactFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtifactFilter")
            .field("include", &self.include.len())
            .field("exclude", &self.exclude.as_ref().map(GlobSet::len))
            .finish()
    }
}

impl ArtifactFilter {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        let include = build_globset(include).context("building artifact include globset")?;
        let exclude = if exclude.is_empty() {
            None
        } else {
            Some(build_globset(exclude).context("building artifact exclude globset")?)
        };
        Ok(Self { include, exclude })
    }

    pub fn is_runnable(&self, rel_path: &str) -> bool {
        if !self.include.is_match(rel_path) {
            return false;
        }
        match &self.exclude {
            Some(exclude) => !exclude.is_match(rel_path),
            None => true,
        }
    }
}

pub(crate) fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat).with_context(|| format!("invalid glob pattern: {pat}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

/// Every runnable file under `output_dir`, sorted so the runtime sees a
/// stable argument order across rebuilds.
pub fn collect_artifacts(
    fs: &dyn FileSystem,
    output_dir: &Path,
    filter: &ArtifactFilter,
) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut stack = vec![output_dir.to_path_buf()];

    while let Some(dir) = stack.pop() {
        for path in fs.read_dir(&dir)? {
            if fs.is_dir(&path) {
                stack.push(path);
            } else if fs.is_file(&path) {
                if let Ok(rel) = path.strip_prefix(output_dir) {
                    let rel_str = rel.to_string_lossy().replace('\\', "/");
                    if filter.is_runnable(&rel_str) {
                        files.push(path);
                    }
                }
            }
        }
    }

    files.sort();
    Ok(files)
}
