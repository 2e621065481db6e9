// src/watch/hash.rs

//! Content hashes for `watch.use_hash`: a notification only counts when the
//! file's bytes actually differ from what was last seen.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use blake3::Hasher;
use tracing::{debug, trace};

use crate::fs::FileSystem;

/// Compute the hash of a single file.
pub fn compute_file_hash(fs: &dyn FileSystem, path: &Path) -> Result<String> {
    let mut hasher = Hasher::new();
    let mut file = fs
        .open_read(path)
        .with_context(|| format!("opening file for hashing: {:?}", path))?;
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// Last seen content hash per watched file, kept in memory only.
#[derive(Debug)]
pub struct ContentHashes {
    fs: Arc<dyn FileSystem>,
    hashes: HashMap<PathBuf, String>,
}

impl ContentHashes {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self {
            fs,
            hashes: HashMap::new(),
        }
    }

    /// Record the current content of `paths` without reporting changes.
    pub fn seed<I>(&mut self, paths: I)
    where
        I: IntoIterator<Item = PathBuf>,
    {
        for path in paths {
            if let Ok(hash) = compute_file_hash(self.fs.as_ref(), &path) {
                self.hashes.insert(path, hash);
            }
        }
        debug!(files = self.hashes.len(), "seeded content hashes");
    }

    /// Whether `path` differs from its last recorded content. Removed and
    /// unreadable files always count as changed.
    pub fn changed(&mut self, path: &Path) -> bool {
        if !self.fs.is_file(path) {
            self.hashes.remove(path);
            return true;
        }

        let hash = match compute_file_hash(self.fs.as_ref(), path) {
            Ok(hash) => hash,
            Err(e) => {
                debug!(?path, error = %e, "could not hash file; treating as changed");
                self.hashes.remove(path);
                return true;
            }
        };

        if self.hashes.get(path) == Some(&hash) {
            trace!(?path, "content unchanged");
            return false;
        }
        self.hashes.insert(path.to_path_buf(), hash);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MockFileSystem;

    #[test]
    fn identical_rewrite_is_not_a_change() {
        let fs = MockFileSystem::new();
        fs.add_file("src/main.brs", "print 1");
        let mut hashes = ContentHashes::new(Arc::new(fs.clone()));
        hashes.seed([PathBuf::from("src/main.brs")]);

        assert!(!hashes.changed(Path::new("src/main.brs")));

        fs.add_file("src/main.brs", "print 2");
        assert!(hashes.changed(Path::new("src/main.brs")));
        assert!(!hashes.changed(Path::new("src/main.brs")));
    }

    #[test]
    fn unseen_and_removed_files_count_as_changes() {
        let fs = MockFileSystem::new();
        fs.add_file("src/new.brs", "x");
        let mut hashes = ContentHashes::new(Arc::new(fs.clone()));

        assert!(hashes.changed(Path::new("src/new.brs")));
        fs.remove("src/new.brs");
        assert!(hashes.changed(Path::new("src/new.brs")));
    }

    #[test]
    fn unreadable_files_count_as_changes() {
        let fs = MockFileSystem::new();
        fs.add_unreadable("src/locked.brs");
        let mut hashes = ContentHashes::new(Arc::new(fs));
        assert!(hashes.changed(Path::new("src/locked.brs")));
    }
}
