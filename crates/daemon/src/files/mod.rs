//! Read-only access to the files under one root directory.
//!
//! This module provides the path-safety core of the daemon:
//! - [`PathResolver`] maps untrusted client paths onto the root
//! - [`DirectoryScanner`] lists every allowed file under the root
//! - [`FileAccessor`] opens a resolved file for preview or download
//!
//! # Security
//!
//! Every client path is decoded, normalized and checked for `..` segments
//! before it is joined onto the root, then canonicalized and checked again so
//! that symlinks cannot point outside the root. Only files whose extension is
//! in the [`AllowedExtensionSet`] are ever listed or opened.

pub mod accessor;
pub mod extensions;
pub mod resolver;
pub mod scanner;

use std::path::{Path, PathBuf};

pub use accessor::{FileAccessor, FileError, OpenedFile};
pub use extensions::{content_type_for, extension_of, AllowedExtensionSet, ExtensionError};
pub use resolver::{PathResolver, ResolveError, ResolvedPath};
pub use scanner::{DirectoryScanner, ScanError, ScanLimits, ScanOutcome};

/// Immutable description of what the daemon may serve.
///
/// Built once from the validated configuration and shared through `Arc`
/// between the scanner, the accessor and every request handler.
#[derive(Debug, Clone)]
pub struct FileScope {
    root: PathBuf,
    extensions: AllowedExtensionSet,
    limits: ScanLimits,
}

impl FileScope {
    /// Create a scope over `root`.
    pub fn new(root: impl Into<PathBuf>, extensions: AllowedExtensionSet, limits: ScanLimits) -> Self {
        Self {
            root: root.into(),
            extensions,
            limits,
        }
    }

    /// The configured root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Extensions that may be listed and opened.
    pub fn extensions(&self) -> &AllowedExtensionSet {
        &self.extensions
    }

    /// Bounds applied to a directory scan.
    pub fn limits(&self) -> ScanLimits {
        self.limits
    }

    /// A resolver bound to this scope's root.
    pub fn resolver(&self) -> PathResolver {
        PathResolver::new(&self.root)
    }
}
