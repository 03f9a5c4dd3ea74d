//! Allowed file extensions and the fixed content-type table.

use std::collections::BTreeSet;
use std::path::Path;

use thiserror::Error;

/// Content type used for allowed extensions missing from the table.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Extension to MIME type mapping. Keys are lowercase and include the dot.
const CONTENT_TYPES: &[(&str, &str)] = &[
    (".jpg", "image/jpeg"),
    (".jpeg", "image/jpeg"),
    (".png", "image/png"),
    (".gif", "image/gif"),
    (".webp", "image/webp"),
    (".svg", "image/svg+xml"),
    (".pdf", "application/pdf"),
    (".txt", "text/plain; charset=utf-8"),
    (".csv", "text/csv; charset=utf-8"),
    (".json", "application/json"),
    (".xls", "application/vnd.ms-excel"),
    (
        ".xlsx",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    ),
    (
        ".docx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    ),
];

/// Errors raised while building an [`AllowedExtensionSet`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExtensionError {
    /// No extensions were given.
    #[error("at least one allowed extension is required")]
    Empty,

    /// An extension does not start with a dot or has nothing after it.
    #[error("extension must look like \".pdf\", got {0:?}")]
    Malformed(String),
}

/// Set of file extensions that may be listed, previewed or downloaded.
///
/// Extensions are stored lowercase with their leading dot. Membership is
/// exact apart from ASCII case: `.PDF` matches `.pdf`, `pdf` does not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedExtensionSet {
    extensions: BTreeSet<String>,
}

impl AllowedExtensionSet {
    /// Build a set from individual extensions such as `".pdf"`.
    pub fn new<I, S>(extensions: I) -> Result<Self, ExtensionError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = BTreeSet::new();
        for ext in extensions {
            let ext = ext.as_ref().trim();
            if ext.is_empty() {
                continue;
            }
            let body = ext
                .strip_prefix('.')
                .ok_or_else(|| ExtensionError::Malformed(ext.to_string()))?;
            if body.is_empty() || body.contains(['.', '/', '\\']) {
                return Err(ExtensionError::Malformed(ext.to_string()));
            }
            set.insert(ext.to_ascii_lowercase());
        }

        if set.is_empty() {
            return Err(ExtensionError::Empty);
        }
        Ok(Self { extensions: set })
    }

    /// Parse a comma-separated list such as `".pdf,.png"`.
    pub fn parse_list(list: &str) -> Result<Self, ExtensionError> {
        Self::new(list.split(','))
    }

    /// Whether `ext` (with its dot) is allowed.
    pub fn contains(&self, ext: &str) -> bool {
        self.extensions.contains(&ext.to_ascii_lowercase())
    }

    /// Whether the extension of `path` is allowed.
    pub fn allows(&self, path: &Path) -> bool {
        extension_of(path).is_some_and(|ext| self.contains(&ext))
    }

    /// Iterate over the allowed extensions in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.extensions.iter().map(String::as_str)
    }

    /// Number of allowed extensions.
    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    /// Always false for a constructed set; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }
}

impl std::fmt::Display for AllowedExtensionSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let joined: Vec<&str> = self.iter().collect();
        f.write_str(&joined.join(","))
    }
}

/// Lowercased extension of `path` including the dot, e.g. `".pdf"`.
///
/// Returns `None` for names without an extension, dotfiles such as
/// `.bashrc`, names ending in a bare dot, and non-UTF-8 extensions.
pub fn extension_of(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?;
    if ext.is_empty() {
        return None;
    }
    Some(format!(".{}", ext.to_ascii_lowercase()))
}

/// MIME type for an extension (with dot). Unknown extensions fall back to
/// [`DEFAULT_CONTENT_TYPE`].
pub fn content_type_for(ext: &str) -> &'static str {
    let ext = ext.to_ascii_lowercase();
    CONTENT_TYPES
        .iter()
        .find(|(known, _)| *known == ext)
        .map(|(_, mime)| *mime)
        .unwrap_or(DEFAULT_CONTENT_TYPE)
}
