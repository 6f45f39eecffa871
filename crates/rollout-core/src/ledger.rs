//! Ledger of temporary files produced during an installation run.
//!
//! Files are registered as they are generated. When the run ends the ledger is
//! resolved exactly once: [`TempFileLedger::commit`] keeps everything in place,
//! [`TempFileLedger::restore`] puts every registered path back to the state it
//! had when it was registered. Both consume the ledger. A ledger dropped
//! without being resolved rolls back.
//!
//! ```ignore
//! let mut ledger = TempFileLedger::new();
//! ledger.register("helm-values-tmp.yaml")?;
//!
//! // On success:
//! ledger.commit(verbose);
//!
//! // On failure or cancellation:
//! ledger.restore(verbose)?;
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("cannot track {path}: {reason}")]
    Untrackable { path: PathBuf, reason: String },

    #[error("failed to read {path}")]
    Snapshot {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to restore {path}")]
    Restore {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A tracked path and the content it had before the run touched it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub path: PathBuf,
    /// `None` means the file did not exist and restore removes it
    pub original: Option<Vec<u8>>,
}

/// How a ledger was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerResolution {
    Committed,
    Restored,
}

#[derive(Debug, Default)]
pub struct TempFileLedger {
    entries: Vec<LedgerEntry>,
    resolved: bool,
}

impl TempFileLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_tracked(&self, path: &Path) -> bool {
        self.entries.iter().any(|e| e.path == path)
    }

    /// Track a file generated by this run. Restore removes it.
    pub fn register(&mut self, path: impl Into<PathBuf>) -> Result<(), LedgerError> {
        let path = path.into();
        ensure_trackable(&path)?;
        self.push(LedgerEntry {
            path,
            original: None,
        });
        Ok(())
    }

    /// Snapshot a file before this run modifies it. Restore writes the snapshot back,
    /// or removes the file if it did not exist.
    pub fn register_backup(&mut self, path: impl Into<PathBuf>) -> Result<(), LedgerError> {
        let path = path.into();
        ensure_trackable(&path)?;
        let original = match fs::read(&path) {
            Ok(content) => Some(content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(source) => return Err(LedgerError::Snapshot { path, source }),
        };
        self.push(LedgerEntry { path, original });
        Ok(())
    }

    fn push(&mut self, entry: LedgerEntry) {
        // The first registration wins; it holds the true pre-run state.
        if self.is_tracked(&entry.path) {
            debug!(path = %entry.path.display(), "Path already tracked");
            return;
        }
        debug!(path = %entry.path.display(), backup = entry.original.is_some(), "Tracking path");
        self.entries.push(entry);
    }

    /// Keep all tracked files and forget about them.
    pub fn commit(mut self, verbose: bool) -> LedgerResolution {
        if verbose {
            for entry in &self.entries {
                info!(path = %entry.path.display(), "Keeping generated file");
            }
        }
        self.entries.clear();
        self.resolved = true;
        LedgerResolution::Committed
    }

    /// Roll back every tracked path, newest first.
    ///
    /// Every entry is attempted; the first failure is returned.
    pub fn restore(mut self, verbose: bool) -> Result<LedgerResolution, LedgerError> {
        self.resolved = true;
        let entries = std::mem::take(&mut self.entries);
        rollback(entries, verbose)?;
        Ok(LedgerResolution::Restored)
    }
}

impl Drop for TempFileLedger {
    fn drop(&mut self) {
        if self.resolved || self.entries.is_empty() {
            return;
        }
        let entries = std::mem::take(&mut self.entries);
        if let Err(e) = rollback(entries, false) {
            warn!(error = %e, "Rollback of unresolved ledger failed");
        }
    }
}

fn ensure_trackable(path: &Path) -> Result<(), LedgerError> {
    if path.as_os_str().is_empty() {
        return Err(LedgerError::Untrackable {
            path: path.to_path_buf(),
            reason: "empty path".to_string(),
        });
    }
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    match fs::metadata(parent) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(LedgerError::Untrackable {
            path: path.to_path_buf(),
            reason: format!("{} is not a directory", parent.display()),
        }),
        Err(e) => Err(LedgerError::Untrackable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }),
    }
}

fn rollback(entries: Vec<LedgerEntry>, verbose: bool) -> Result<(), LedgerError> {
    let mut first_error = None;

    for entry in entries.into_iter().rev() {
        let result = match &entry.original {
            Some(content) => fs::write(&entry.path, content),
            None => match fs::remove_file(&entry.path) {
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                other => other,
            },
        };

        match result {
            Ok(()) => {
                if verbose {
                    let action = if entry.original.is_some() {
                        "Restored"
                    } else {
                        "Removed"
                    };
                    info!(path = %entry.path.display(), "{} temporary file", action);
                }
            }
            Err(source) => {
                warn!(path = %entry.path.display(), error = %source, "Failed to roll back file");
                if first_error.is_none() {
                    first_error = Some(LedgerError::Restore {
                        path: entry.path,
                        source,
                    });
                }
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
