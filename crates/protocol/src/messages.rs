//! Wire types for the RootView HTTP API.
//!
//! This module defines the JSON bodies exchanged between the daemon and its
//! clients. Every body is plain JSON; file contents travel as raw response
//! bytes and are not modelled here.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Status string reported by a healthy daemon.
pub const HEALTH_OK: &str = "OK";

/// One file discovered under the root that can be previewed or downloaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingEntry {
    /// File name (last path component).
    pub name: String,
    /// Path relative to the root, always with `/` separators.
    pub path: String,
    /// Extension without the leading dot, lowercased (e.g. `pdf`).
    #[serde(rename = "type")]
    pub file_type: String,
    /// Size in bytes of the on-disk file.
    pub size: u64,
    /// Last modification time of the on-disk file.
    pub modified: DateTime<Utc>,
}

/// Body of a successful `GET /list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListResponse {
    /// Always `true`.
    pub success: bool,
    /// Discovered entries in filesystem enumeration order.
    pub data: Vec<ListingEntry>,
    /// Number of entries in `data`.
    pub count: usize,
    /// Set when the scan stopped early at a depth or entry limit.
    #[serde(default)]
    pub truncated: bool,
}

impl ListResponse {
    /// Build a listing body; `count` is derived from `data`.
    pub fn new(data: Vec<ListingEntry>, truncated: bool) -> Self {
        Self {
            success: true,
            count: data.len(),
            data,
            truncated,
        }
    }
}

/// Body of every failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Always `false`.
    pub success: bool,
    /// Error code for programmatic handling.
    pub code: ErrorCode,
    /// Human-readable message. Never contains absolute server paths.
    pub message: String,
    /// Case-insensitive sibling name when a requested file was not found.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl ErrorResponse {
    /// Create an error body without a suggestion.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            code,
            message: message.into(),
            suggestion: None,
        }
    }

    /// Attach a "did you mean" suggestion.
    pub fn with_suggestion(mut self, suggestion: Option<String>) -> Self {
        self.suggestion = suggestion;
        self
    }
}

/// Body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `"OK"` while the daemon is serving.
    pub status: String,
    /// Time the health check was answered.
    pub timestamp: DateTime<Utc>,
}

impl HealthResponse {
    /// A healthy response stamped with the current time.
    pub fn ok() -> Self {
        Self {
            status: HEALTH_OK.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Error codes for the failure taxonomy of the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// The path parameter is missing, undecodable or malformed.
    InvalidPath,
    /// The path tries to climb out of the root with `..` segments.
    Traversal,
    /// The path (or its symlink target) lies outside the root.
    OutsideRoot,
    /// The file extension is not in the allowed set.
    UnsupportedType,
    /// No file exists at the requested path.
    NotFound,
    /// The daemon cannot read the file.
    PermissionDenied,
    /// The configured root directory is missing or unreadable.
    RootNotFound,
    /// The directory scan failed as a whole.
    ScanFailed,
    /// No route matches the request.
    EndpointNotFound,
    /// Unexpected server-side failure.
    InternalError,
}

impl ErrorCode {
    /// The wire spelling of this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidPath => "INVALID_PATH",
            Self::Traversal => "TRAVERSAL",
            Self::OutsideRoot => "OUTSIDE_ROOT",
            Self::UnsupportedType => "UNSUPPORTED_TYPE",
            Self::NotFound => "NOT_FOUND",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::RootNotFound => "ROOT_NOT_FOUND",
            Self::ScanFailed => "SCAN_FAILED",
            Self::EndpointNotFound => "ENDPOINT_NOT_FOUND",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serialize any wire type to a JSON string.
pub fn to_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

/// Serialize any wire type to indented JSON.
pub fn to_json_pretty<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Parse a wire type from JSON.
pub fn from_json<T: DeserializeOwned>(json: &str) -> Result<T> {
    Ok(serde_json::from_str(json)?)
}
