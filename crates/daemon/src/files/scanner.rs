//! Recursive listing of the allowed files under the root.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use protocol::messages::ListingEntry;
use thiserror::Error;
use tracing::{debug, warn};

use super::extensions::extension_of;
use super::resolver::{is_within, relative_slash_path};
use super::FileScope;

/// Errors raised while scanning.
///
/// Only [`ScanError::RootNotFound`] is returned from [`DirectoryScanner::scan`];
/// the per-entry variants are logged and the entry is skipped.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The root is missing, not a directory, or cannot be read.
    #[error("root directory not found: {0}")]
    RootNotFound(PathBuf),

    /// A single entry could not be read or stat'ed.
    #[error("failed to read entry {path}: {source}")]
    Entry {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An entry name is not valid UTF-8 and cannot be reported to clients.
    #[error("entry name is not valid UTF-8: {0}")]
    NonUtf8Name(PathBuf),
}

/// Bounds on a single scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanLimits {
    /// Maximum directory nesting below the root that is descended into.
    pub max_depth: usize,
    /// Maximum number of entries returned.
    pub max_entries: usize,
}

impl Default for ScanLimits {
    fn default() -> Self {
        Self {
            max_depth: 32,
            max_entries: 10_000,
        }
    }
}

/// Result of a scan.
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    /// Entries in filesystem enumeration order.
    pub entries: Vec<ListingEntry>,
    /// Whether a limit cut the scan short.
    pub truncated: bool,
}

/// Walks the root and collects a [`ListingEntry`] for every allowed file.
///
/// Directory symlinks are not descended into. File symlinks are listed only
/// when their target lies inside the root, and report the target's size and
/// modification time.
#[derive(Debug, Clone)]
pub struct DirectoryScanner {
    scope: Arc<FileScope>,
}

/// Per-scan walk state.
struct Walk<'a> {
    root: &'a Path,
    real_root: PathBuf,
    outcome: ScanOutcome,
    /// Set once `max_entries` is reached; stops the whole walk.
    full: bool,
}

impl DirectoryScanner {
    /// Create a scanner over the given scope.
    pub fn new(scope: Arc<FileScope>) -> Self {
        Self { scope }
    }

    /// Scan the whole root. Blocks on filesystem I/O.
    pub fn scan(&self) -> Result<ScanOutcome, ScanError> {
        let root = self.scope.root();
        let real_root =
            fs::canonicalize(root).map_err(|_| ScanError::RootNotFound(root.to_path_buf()))?;

        let is_dir = fs::metadata(&real_root)
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !is_dir {
            return Err(ScanError::RootNotFound(root.to_path_buf()));
        }

        let top = fs::read_dir(root).map_err(|e| {
            warn!(root = %root.display(), error = %e, "Root directory is not readable");
            ScanError::RootNotFound(root.to_path_buf())
        })?;

        let mut walk = Walk {
            root,
            real_root,
            outcome: ScanOutcome::default(),
            full: false,
        };
        self.walk_entries(&mut walk, top, 0);

        debug!(
            root = %root.display(),
            entries = walk.outcome.entries.len(),
            truncated = walk.outcome.truncated,
            "Scan complete"
        );
        Ok(walk.outcome)
    }

    fn walk_dir(&self, walk: &mut Walk<'_>, dir: &Path, depth: usize) {
        match fs::read_dir(dir) {
            Ok(entries) => self.walk_entries(walk, entries, depth),
            Err(source) => skip(ScanError::Entry {
                path: dir.to_path_buf(),
                source,
            }),
        }
    }

    fn walk_entries(&self, walk: &mut Walk<'_>, entries: fs::ReadDir, depth: usize) {
        for entry in entries {
            if walk.full {
                return;
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(source) => {
                    skip(ScanError::Entry {
                        path: walk.root.to_path_buf(),
                        source,
                    });
                    continue;
                }
            };
            let path = entry.path();

            if entry.file_name().to_str().is_none() {
                skip(ScanError::NonUtf8Name(path));
                continue;
            }

            let file_type = match entry.file_type() {
                Ok(file_type) => file_type,
                Err(source) => {
                    skip(ScanError::Entry { path, source });
                    continue;
                }
            };

            if file_type.is_dir() {
                if depth + 1 > self.scope.limits().max_depth {
                    debug!(path = %path.display(), "Depth limit reached, not descending");
                    walk.outcome.truncated = true;
                    continue;
                }
                self.walk_dir(walk, &path, depth + 1);
                continue;
            }

            if !self.scope.extensions().allows(&path) {
                continue;
            }

            match self.listing_entry(walk, &path, file_type.is_symlink()) {
                Ok(Some(listing)) => {
                    if walk.outcome.entries.len() >= self.scope.limits().max_entries {
                        walk.outcome.truncated = true;
                        walk.full = true;
                        return;
                    }
                    walk.outcome.entries.push(listing);
                }
                Ok(None) => {}
                Err(err) => skip(err),
            }
        }
    }

    /// Build the entry for an allowed file, or `None` when it must be hidden.
    fn listing_entry(
        &self,
        walk: &Walk<'_>,
        path: &Path,
        is_symlink: bool,
    ) -> Result<Option<ListingEntry>, ScanError> {
        let real = if is_symlink {
            let target = fs::canonicalize(path).map_err(|source| ScanError::Entry {
                path: path.to_path_buf(),
                source,
            })?;
            if !is_within(&walk.real_root, &target) {
                debug!(path = %path.display(), "Skipping symlink pointing outside root");
                return Ok(None);
            }
            target
        } else {
            path.to_path_buf()
        };

        let metadata = fs::metadata(&real).map_err(|source| ScanError::Entry {
            path: path.to_path_buf(),
            source,
        })?;
        if !metadata.is_file() {
            return Ok(None);
        }

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ScanError::NonUtf8Name(path.to_path_buf()))?
            .to_string();
        let relative = relative_slash_path(walk.root, path)
            .ok_or_else(|| ScanError::NonUtf8Name(path.to_path_buf()))?;
        let file_type = extension_of(path)
            .map(|ext| ext.trim_start_matches('.').to_string())
            .unwrap_or_default();
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);

        Ok(Some(ListingEntry {
            name,
            path: relative,
            file_type,
            size: metadata.len(),
            modified: DateTime::<Utc>::from(modified),
        }))
    }
}

fn skip(err: ScanError) {
    warn!(error = %err, "Skipping entry during scan");
}
