//! Opening resolved files for preview or download.
//!
//! The accessor runs the checks that follow path resolution, in order:
//! allowed extension, existence (with a case-insensitive sibling suggestion
//! when missing), and read permission. The returned [`OpenedFile`] holds an
//! open handle; the bytes are read later, incrementally, by the HTTP layer.

use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::extensions::{content_type_for, extension_of};
use super::resolver::{PathResolver, ResolveError, ResolvedPath};
use super::FileScope;

/// Errors that can occur while opening a file.
///
/// Paths carried by the client-facing variants are relative to the root.
#[derive(Debug, Error)]
pub enum FileError {
    /// The client path was rejected by the resolver.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// The file's extension is not in the allowed set.
    #[error("unsupported file type: {extension}")]
    UnsupportedType { extension: String },

    /// Nothing readable exists at the path.
    #[error("{}", not_found_message(.path, .suggestion.as_deref()))]
    NotFound {
        path: String,
        suggestion: Option<String>,
    },

    /// The daemon may not read the file.
    #[error("permission denied: {path}")]
    PermissionDenied { path: String },

    /// Any other filesystem failure.
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FileError {
    /// Case-insensitive sibling name offered for a missing file.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            FileError::NotFound { suggestion, .. } => suggestion.as_deref(),
            _ => None,
        }
    }
}

fn not_found_message(path: &str, suggestion: Option<&str>) -> String {
    match suggestion {
        Some(name) => format!("file not found (case mismatch): {path}, did you mean {name}?"),
        None => format!("file not found: {path}"),
    }
}

/// A file that passed every check, opened for reading.
#[derive(Debug)]
pub struct OpenedFile {
    file: File,
    /// Real path on disk.
    pub path: PathBuf,
    /// Path relative to the root, as requested.
    pub relative: String,
    /// Name suggested to clients when downloading.
    pub file_name: String,
    /// MIME type selected from the extension.
    pub content_type: &'static str,
    /// Size in bytes at open time.
    pub size: u64,
    /// Last modification time.
    pub modified: SystemTime,
}

impl OpenedFile {
    /// Take the open handle, consuming the rest.
    pub fn into_file(self) -> File {
        self.file
    }
}

/// Opens resolved paths after checking extension, existence and permission.
#[derive(Debug, Clone)]
pub struct FileAccessor {
    scope: Arc<FileScope>,
    resolver: PathResolver,
}

impl FileAccessor {
    /// Create an accessor over the given scope.
    pub fn new(scope: Arc<FileScope>) -> Self {
        let resolver = scope.resolver();
        Self { scope, resolver }
    }

    /// The resolver for this accessor's root.
    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    /// Resolve a raw client path; convenience for callers holding only text.
    pub fn resolve(&self, raw: &str) -> Result<ResolvedPath, FileError> {
        Ok(self.resolver.resolve(raw)?)
    }

    /// Open a file to be shown inline.
    pub fn open_for_preview(&self, resolved: &ResolvedPath) -> Result<OpenedFile, FileError> {
        let opened = self.open(resolved)?;
        info!(path = %opened.relative, size = opened.size, "Opened file for preview");
        Ok(opened)
    }

    /// Open a file to be sent as an attachment.
    pub fn open_for_download(&self, resolved: &ResolvedPath) -> Result<OpenedFile, FileError> {
        let opened = self.open(resolved)?;
        info!(
            path = %opened.relative,
            file_name = %opened.file_name,
            size = opened.size,
            "Opened file for download"
        );
        Ok(opened)
    }

    fn open(&self, resolved: &ResolvedPath) -> Result<OpenedFile, FileError> {
        let real = resolved.path();
        let relative = resolved.relative();

        // Both the requested name and the symlink-resolved name must be allowed.
        for candidate in [Path::new(relative), real] {
            if !self.scope.extensions().allows(candidate) {
                let extension = extension_of(candidate).unwrap_or_default();
                debug!(path = %relative, extension = %extension, "Rejected unsupported type");
                return Err(FileError::UnsupportedType { extension });
            }
        }

        let metadata = match fs::metadata(real) {
            Ok(metadata) => metadata,
            Err(e) => return Err(self.metadata_error(real, relative, e)),
        };
        if !metadata.is_file() {
            return Err(FileError::NotFound {
                path: relative.to_string(),
                suggestion: None,
            });
        }

        let file = File::open(real).map_err(|e| match e.kind() {
            ErrorKind::PermissionDenied => FileError::PermissionDenied {
                path: relative.to_string(),
            },
            ErrorKind::NotFound => FileError::NotFound {
                path: relative.to_string(),
                suggestion: None,
            },
            _ => FileError::Io {
                path: real.to_path_buf(),
                source: e,
            },
        })?;

        let extension = extension_of(real).unwrap_or_default();
        let file_name = resolved
            .file_name()
            .map(str::to_string)
            .unwrap_or_else(|| relative.to_string());

        Ok(OpenedFile {
            file,
            path: real.to_path_buf(),
            relative: relative.to_string(),
            file_name,
            content_type: content_type_for(&extension),
            size: metadata.len(),
            modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        })
    }

    fn metadata_error(&self, real: &Path, relative: &str, e: std::io::Error) -> FileError {
        match e.kind() {
            ErrorKind::NotFound => {
                let suggestion = case_insensitive_sibling(real);
                debug!(path = %relative, suggestion = ?suggestion, "File not found");
                FileError::NotFound {
                    path: relative.to_string(),
                    suggestion,
                }
            }
            ErrorKind::PermissionDenied => FileError::PermissionDenied {
                path: relative.to_string(),
            },
            _ => FileError::Io {
                path: real.to_path_buf(),
                source: e,
            },
        }
    }
}

/// Name of an entry next to `path` that matches its file name ignoring case.
///
/// Only the name is returned; the sibling is not opened or checked.
fn case_insensitive_sibling(path: &Path) -> Option<String> {
    let wanted = path.file_name()?.to_str()?.to_lowercase();
    let parent = path.parent()?;

    let entries = match fs::read_dir(parent) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(dir = %parent.display(), error = %e, "Cannot list parent for suggestion");
            return None;
        }
    };

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(dir = %parent.display(), error = %e, "Failed to read entry for suggestion");
                continue;
            }
        };
        if let Some(name) = entry.file_name().to_str() {
            if name.to_lowercase() == wanted {
                return Some(name.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::{AllowedExtensionSet, ScanLimits};
    use std::io::Read;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    fn create_test_structure(dir: &Path) -> Vec<u8> {
        let content: Vec<u8> = (0..2048u32).map(|i| (i % 251) as u8).collect();
        fs::create_dir_all(dir.join("reports")).unwrap();
        fs::write(dir.join("reports/q1.pdf"), &content).unwrap();
        fs::write(dir.join("reports/photo.PNG"), "png").unwrap();
        fs::write(dir.join("reports/setup.exe"), "exe").unwrap();
        content
    }

    fn accessor_for(root: &Path) -> FileAccessor {
        let extensions = AllowedExtensionSet::parse_list(".pdf,.png").unwrap();
        FileAccessor::new(Arc::new(FileScope::new(
            root,
            extensions,
            ScanLimits::default(),
        )))
    }

    fn open_preview(accessor: &FileAccessor, raw: &str) -> Result<OpenedFile, FileError> {
        let resolved = accessor.resolve(raw)?;
        accessor.open_for_preview(&resolved)
    }

    #[test]
    fn test_open_for_preview() {
        let temp_dir = TempDir::new().unwrap();
        let content = create_test_structure(temp_dir.path());
        let accessor = accessor_for(temp_dir.path());

        let opened = open_preview(&accessor, "reports/q1.pdf").unwrap();
        assert_eq!(opened.content_type, "application/pdf");
        assert_eq!(opened.size, 2048);
        assert_eq!(opened.relative, "reports/q1.pdf");

        let mut bytes = Vec::new();
        opened.into_file().read_to_end(&mut bytes).unwrap();
        assert_eq!(bytes, content);
    }

    #[test]
    fn test_open_for_download_file_name() {
        let temp_dir = TempDir::new().unwrap();
        create_test_structure(temp_dir.path());
        let accessor = accessor_for(temp_dir.path());

        let resolved = accessor.resolve("reports/photo.PNG").unwrap();
        let opened = accessor.open_for_download(&resolved).unwrap();
        assert_eq!(opened.file_name, "photo.PNG");
        assert_eq!(opened.content_type, "image/png");
    }

    #[test]
    fn test_case_mismatch_suggestion() {
        let temp_dir = TempDir::new().unwrap();
        create_test_structure(temp_dir.path());
        let accessor = accessor_for(temp_dir.path());

        let err = open_preview(&accessor, "reports/Q1.pdf").unwrap_err();
        assert!(matches!(err, FileError::NotFound { .. }));
        assert_eq!(err.suggestion(), Some("q1.pdf"));
        assert!(err.to_string().contains("q1.pdf"));
    }

    #[test]
    fn test_not_found_without_suggestion() {
        let temp_dir = TempDir::new().unwrap();
        create_test_structure(temp_dir.path());
        let accessor = accessor_for(temp_dir.path());

        let err = open_preview(&accessor, "reports/q2.pdf").unwrap_err();
        assert!(matches!(err, FileError::NotFound { suggestion: None, .. }));
        assert_eq!(err.to_string(), "file not found: reports/q2.pdf");
    }

    #[test]
    fn test_not_found_in_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let accessor = accessor_for(temp_dir.path());

        let err = open_preview(&accessor, "nowhere/q1.pdf").unwrap_err();
        assert!(matches!(err, FileError::NotFound { suggestion: None, .. }));
    }

    #[test]
    fn test_unsupported_type_checked_before_existence() {
        let temp_dir = TempDir::new().unwrap();
        create_test_structure(temp_dir.path());
        let accessor = accessor_for(temp_dir.path());

        let err = open_preview(&accessor, "reports/q1.exe").unwrap_err();
        assert!(matches!(
            err,
            FileError::UnsupportedType { ref extension } if extension == ".exe"
        ));

        let err = open_preview(&accessor, "reports/setup.exe").unwrap_err();
        assert!(matches!(err, FileError::UnsupportedType { .. }));
    }

    #[test]
    fn test_symlink_to_disallowed_type_rejected() {
        let temp_dir = TempDir::new().unwrap();
        create_test_structure(temp_dir.path());
        symlink(
            temp_dir.path().join("reports/setup.exe"),
            temp_dir.path().join("innocent.pdf"),
        )
        .unwrap();
        let accessor = accessor_for(temp_dir.path());

        let err = open_preview(&accessor, "innocent.pdf").unwrap_err();
        assert!(matches!(err, FileError::UnsupportedType { .. }));
    }

    #[test]
    fn test_directory_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("archive.pdf")).unwrap();
        let accessor = accessor_for(temp_dir.path());

        let err = open_preview(&accessor, "archive.pdf").unwrap_err();
        assert!(matches!(err, FileError::NotFound { .. }));
    }

    #[test]
    fn test_resolver_errors_pass_through() {
        let temp_dir = TempDir::new().unwrap();
        let accessor = accessor_for(temp_dir.path());

        let err = open_preview(&accessor, "../../etc/passwd").unwrap_err();
        assert!(matches!(err, FileError::Resolve(ResolveError::Traversal(_))));
    }

    #[test]
    fn test_permission_denied() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let locked = temp_dir.path().join("locked.pdf");
        fs::write(&locked, "secret").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // Privileged users bypass mode bits.
        if File::open(&locked).is_ok() {
            return;
        }

        let accessor = accessor_for(temp_dir.path());
        let err = open_preview(&accessor, "locked.pdf").unwrap_err();
        assert!(matches!(
            err,
            FileError::PermissionDenied { ref path } if path == "locked.pdf"
        ));
    }

    #[test]
    fn test_case_insensitive_sibling() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("Report.PDF"), "x").unwrap();

        assert_eq!(
            case_insensitive_sibling(&temp_dir.path().join("report.pdf")),
            Some("Report.PDF".to_string())
        );
        assert_eq!(
            case_insensitive_sibling(&temp_dir.path().join("other.pdf")),
            None
        );
        assert_eq!(
            case_insensitive_sibling(&temp_dir.path().join("missing/report.pdf")),
            None
        );
    }
}
