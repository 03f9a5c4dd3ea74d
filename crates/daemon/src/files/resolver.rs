//! Resolution of untrusted client paths against the root directory.
//!
//! A client sends a percent-encoded path relative to the root. The resolver
//! decodes it, joins it onto the root, normalizes it lexically, and only then
//! asks the filesystem for the real (symlink-free, canonical-case) location.
//! Containment is checked on both the lexical and the real path, so neither a
//! `..` sequence nor a symlink can lead outside the root.

use std::fs;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

/// Reasons a client path is rejected before any file is touched.
///
/// Every variant carries the decoded client text, never an absolute server
/// path, so the message can be shown to the caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The path is empty, not valid percent-encoded UTF-8, or contains NUL.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// The path carries a `..` segment before or after normalization.
    #[error("path traversal rejected: {0}")]
    Traversal(String),

    /// The path, or the target of a symlink on it, lies outside the root.
    #[error("path is outside the root directory: {0}")]
    OutsideRoot(String),
}

/// A client path that passed every containment check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    /// Real on-disk location (or the lexical location when nothing exists yet).
    real: PathBuf,
    /// Location relative to the root with `/` separators.
    relative: String,
}

impl ResolvedPath {
    /// Absolute path to hand to the filesystem.
    pub fn path(&self) -> &Path {
        &self.real
    }

    /// Path relative to the root, as the client should see it.
    pub fn relative(&self) -> &str {
        &self.relative
    }

    /// Last component of the real path.
    pub fn file_name(&self) -> Option<&str> {
        self.real.file_name().and_then(|name| name.to_str())
    }

    /// Consume into the absolute path.
    pub fn into_path_buf(self) -> PathBuf {
        self.real
    }
}

/// Maps client-supplied relative paths onto a fixed root.
#[derive(Debug, Clone)]
pub struct PathResolver {
    /// Lexically normalized root.
    root: PathBuf,
}

impl PathResolver {
    /// Create a resolver for `root`. The root is normalized lexically here and
    /// canonicalized on every call, since it may appear after startup.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: normalize_lexically(&root.into()),
        }
    }

    /// The lexically normalized root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The real root, falling back to the lexical root when it does not exist.
    pub fn canonical_root(&self) -> PathBuf {
        fs::canonicalize(&self.root).unwrap_or_else(|_| self.root.clone())
    }

    /// Resolve a raw (still percent-encoded) client path.
    pub fn resolve(&self, raw: &str) -> Result<ResolvedPath, ResolveError> {
        let decoded = decode_request(raw)?;

        if has_traversal_token(&decoded) {
            warn!(requested = %decoded, "Rejected path with traversal segment");
            return Err(ResolveError::Traversal(decoded));
        }

        let joined = self.root.join(&decoded);
        let normalized = normalize_lexically(&joined);

        let relative = match relative_slash_path(&self.root, &normalized) {
            Some(relative) if is_within(&self.root, &normalized) => relative,
            _ => {
                warn!(
                    requested = %decoded,
                    normalized = %normalized.display(),
                    "Rejected path outside root"
                );
                return Err(ResolveError::OutsideRoot(decoded));
            }
        };

        // Only the part below the root is checked; the root may carry dotted names.
        if has_traversal_token(&relative) {
            warn!(requested = %decoded, "Rejected path with traversal segment after normalization");
            return Err(ResolveError::Traversal(decoded));
        }

        let real = resolve_real_path(&normalized);
        let real_root = self.canonical_root();
        if !is_within(&real_root, &real) {
            warn!(
                requested = %decoded,
                real = %real.display(),
                "Rejected path whose real location is outside root"
            );
            return Err(ResolveError::OutsideRoot(decoded));
        }

        debug!(
            requested = %decoded,
            real = %real.display(),
            relative = %relative,
            "Resolved client path"
        );

        Ok(ResolvedPath { real, relative })
    }
}

/// Strictly percent-decode `raw` into UTF-8.
///
/// Fails on a `%` that is not followed by two hex digits and on decoded
/// bytes that are not valid UTF-8. Nothing is replaced or passed through.
pub(crate) fn percent_decode_strict(raw: &str) -> Option<String> {
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let escape = bytes.get(i + 1..i + 3)?;
            if !escape.iter().all(u8::is_ascii_hexdigit) {
                return None;
            }
            i += 3;
        } else {
            i += 1;
        }
    }

    String::from_utf8(urlencoding::decode_binary(bytes).into_owned()).ok()
}

/// Percent-decode a client path.
fn decode_request(raw: &str) -> Result<String, ResolveError> {
    let decoded =
        percent_decode_strict(raw).ok_or_else(|| ResolveError::InvalidPath(raw.to_string()))?;

    if decoded.trim().is_empty() {
        return Err(ResolveError::InvalidPath("empty path".to_string()));
    }
    if decoded.contains('\0') {
        return Err(ResolveError::InvalidPath(decoded.replace('\0', "\\0")));
    }
    Ok(decoded)
}

/// Whether a path string carries a `..` token under either separator.
///
/// Matches any `../` sequence (so `x../y` is rejected too) and any segment
/// that is exactly `..`.
pub(crate) fn has_traversal_token(path: &str) -> bool {
    let unified = path.replace('\\', "/");
    unified.contains("../") || unified.split('/').any(|segment| segment == "..")
}

/// Collapse `.` and `..` components without touching the filesystem.
///
/// `..` never climbs above the root of an absolute path.
pub(crate) fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                let last_is_normal =
                    matches!(out.components().next_back(), Some(Component::Normal(_)));
                if last_is_normal {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}

/// Containment check: `candidate` equals `root` or starts with `root/`.
///
/// Compared both as `/`-normalized strings and component-wise, so a sibling
/// such as `/dataEvil` never matches `/data`.
pub(crate) fn is_within(root: &Path, candidate: &Path) -> bool {
    let root_str = slash_string(root);
    let candidate_str = slash_string(candidate);
    let prefix = format!("{}/", root_str.trim_end_matches('/'));

    let string_match = candidate_str == root_str || candidate_str.starts_with(&prefix);
    string_match && candidate.starts_with(root)
}

/// `/`-separated rendering of `path` for comparisons.
pub(crate) fn slash_string(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// `path` relative to `root`, joined with `/`.
pub(crate) fn relative_slash_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

/// Real location of `path`.
///
/// When `path` itself cannot be canonicalized (missing file, broken symlink),
/// the deepest existing ancestor is canonicalized instead and the remaining
/// components are appended, so a symlinked parent directory is still seen.
fn resolve_real_path(path: &Path) -> PathBuf {
    if let Ok(real) = fs::canonicalize(path) {
        return real;
    }

    let mut missing = Vec::new();
    let mut current = path;
    while let Some(parent) = current.parent() {
        if let Some(name) = current.file_name() {
            missing.push(name.to_os_string());
        }
        if let Ok(real_parent) = fs::canonicalize(parent) {
            debug!(path = %path.display(), "Target missing, resolved existing ancestor");
            let mut real = real_parent;
            for name in missing.iter().rev() {
                real.push(name);
            }
            return real;
        }
        current = parent;
    }

    path.to_path_buf()
}
