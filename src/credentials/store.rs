//! Cached credential record, kept between installer invocations.
//!
//! The cache is a single line of compact JSON. Writes take an exclusive lock
//! on a sibling `.lock` file and replace the cache through a temp file and a
//! rename, so a concurrent reader never sees a half-written record.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::CredentialRecord;
use crate::io::write_private;

#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw cached blob, or `None` when nothing has been cached yet.
    pub fn load_raw(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("reading credential cache '{}'", self.path.display()))?;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        Ok(Some(trimmed.to_string()))
    }

    /// Cached record used as prompt defaults.
    ///
    /// An unreadable or unparsable cache yields an empty record: stale cache
    /// contents must never block an interactive install.
    pub fn load_or_default(&self) -> CredentialRecord {
        match self.load_raw() {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|err| {
                debug!(path = %self.path.display(), %err, "ignoring unparsable credential cache");
                CredentialRecord::default()
            }),
            Ok(None) => CredentialRecord::default(),
            Err(err) => {
                debug!(path = %self.path.display(), err = %format!("{err:#}"), "ignoring unreadable credential cache");
                CredentialRecord::default()
            }
        }
    }

    pub fn save(&self, record: &CredentialRecord) -> Result<()> {
        let blob = record.to_compact_json()?;
        let parent = self
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        fs::create_dir_all(&parent)
            .with_context(|| format!("creating credential cache directory '{}'", parent.display()))?;

        let _lock = self.acquire_lock()?;

        write_private(&self.path, blob.as_bytes(), "credential cache")?;
        debug!(path = %self.path.display(), "credential cache updated");
        Ok(())
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        self.path.with_file_name(name)
    }

    fn acquire_lock(&self) -> Result<StoreLock> {
        let lock_path = self.lock_path();
        // A stale lock file is reused, never unlinked before locking.
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .with_context(|| format!("opening credential cache lock '{}'", lock_path.display()))?;
        if file.try_lock_exclusive().is_err() {
            anyhow::bail!(
                "credential cache is locked by another installer process: {}",
                lock_path.display()
            );
        }
        Ok(StoreLock { _file: file })
    }
}

/// Holds the exclusive lock until dropped.
///
/// The lock file itself stays on disk: unlinking a locked file would let the
/// next writer lock a fresh inode while this one is still held.
#[derive(Debug)]
struct StoreLock {
    _file: File,
}
