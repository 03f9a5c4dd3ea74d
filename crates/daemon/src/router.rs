//! HTTP routing for the file gateway.
//!
//! This module builds the axum [`Router`] that exposes `/list`, `/view`,
//! `/download` and `/health`, and converts every failure of the file layer
//! into the JSON error body of [`protocol::ErrorResponse`].

use std::any::Any;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{RawQuery, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures_util::TryStreamExt;
use protocol::messages::{ErrorCode, ErrorResponse, HealthResponse, ListResponse};
use tokio_util::io::ReaderStream;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::files::resolver::percent_decode_strict;
use crate::files::{
    DirectoryScanner, FileAccessor, FileError, FileScope, OpenedFile, ResolveError, ScanError,
};

/// Message of every 500 response.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal Server Error";

/// Message of the fallback 404 response.
pub const ENDPOINT_NOT_FOUND_MESSAGE: &str = "Endpoint not found";

/// Errors that can occur while handling a request.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// Opening a file failed.
    #[error("file error: {0}")]
    File(#[from] FileError),

    /// Listing the root failed.
    #[error("scan error: {0}")]
    Scan(#[from] ScanError),

    /// `/view` or `/download` was called without `path`.
    #[error("path parameter is required")]
    MissingPath,

    /// No route matched.
    #[error("endpoint not found")]
    EndpointNotFound,

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ResolveError> for RouterError {
    fn from(err: ResolveError) -> Self {
        RouterError::File(FileError::Resolve(err))
    }
}

impl From<tokio::task::JoinError> for RouterError {
    fn from(err: tokio::task::JoinError) -> Self {
        RouterError::Internal(format!("blocking task failed: {err}"))
    }
}

impl RouterError {
    /// HTTP status of this error.
    pub fn status(&self) -> StatusCode {
        match self {
            RouterError::File(FileError::Io { .. }) => StatusCode::INTERNAL_SERVER_ERROR,
            RouterError::File(_) => StatusCode::BAD_REQUEST,
            RouterError::Scan(ScanError::RootNotFound(_)) => StatusCode::NOT_FOUND,
            RouterError::Scan(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RouterError::MissingPath => StatusCode::BAD_REQUEST,
            RouterError::EndpointNotFound => StatusCode::NOT_FOUND,
            RouterError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable code of this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            RouterError::File(e) => match e {
                FileError::Resolve(ResolveError::InvalidPath(_)) => ErrorCode::InvalidPath,
                FileError::Resolve(ResolveError::Traversal(_)) => ErrorCode::Traversal,
                FileError::Resolve(ResolveError::OutsideRoot(_)) => ErrorCode::OutsideRoot,
                FileError::UnsupportedType { .. } => ErrorCode::UnsupportedType,
                FileError::NotFound { .. } => ErrorCode::NotFound,
                FileError::PermissionDenied { .. } => ErrorCode::PermissionDenied,
                FileError::Io { .. } => ErrorCode::InternalError,
            },
            RouterError::Scan(ScanError::RootNotFound(_)) => ErrorCode::RootNotFound,
            RouterError::Scan(_) => ErrorCode::ScanFailed,
            RouterError::MissingPath => ErrorCode::InvalidPath,
            RouterError::EndpointNotFound => ErrorCode::EndpointNotFound,
            RouterError::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Convert the error to the JSON body sent to clients.
    ///
    /// Server-side detail (absolute paths, OS errors) is never included.
    pub fn to_error_response(&self) -> ErrorResponse {
        let message = match self {
            RouterError::File(FileError::Io { .. }) => INTERNAL_ERROR_MESSAGE.to_string(),
            RouterError::File(e) => e.to_string(),
            RouterError::Scan(ScanError::RootNotFound(_)) => "root directory not found".to_string(),
            RouterError::Scan(_) => INTERNAL_ERROR_MESSAGE.to_string(),
            RouterError::MissingPath => self.to_string(),
            RouterError::EndpointNotFound => ENDPOINT_NOT_FOUND_MESSAGE.to_string(),
            RouterError::Internal(_) => INTERNAL_ERROR_MESSAGE.to_string(),
        };
        let suggestion = match self {
            RouterError::File(e) => e.suggestion().map(str::to_string),
            _ => None,
        };
        ErrorResponse::new(self.code(), message).with_suggestion(suggestion)
    }
}

impl IntoResponse for RouterError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        } else {
            debug!(error = %self, status = status.as_u16(), "Request rejected");
        }
        (status, Json(self.to_error_response())).into_response()
    }
}

/// Shared state of every handler. Read-only after construction.
#[derive(Debug, Clone)]
pub struct AppState {
    scanner: DirectoryScanner,
    accessor: FileAccessor,
    cache_max_age: u64,
}

impl AppState {
    /// Build handler state over `scope`.
    pub fn new(scope: Arc<FileScope>, cache_max_age: u64) -> Self {
        Self {
            scanner: DirectoryScanner::new(Arc::clone(&scope)),
            accessor: FileAccessor::new(scope),
            cache_max_age,
        }
    }
}

/// Build the application router.
///
/// API routes are mounted under `server.base_path`; `/health` is also served
/// at the top level. Unmatched requests get the JSON 404 body and panics in
/// handlers become the JSON 500 body.
pub fn build_router(state: AppState, server: &ServerConfig) -> Router {
    let api = Router::new()
        .route("/list", get(list_files))
        .route("/view", get(view_file))
        .route("/download", get(download_file))
        .route("/health", get(health));

    let app = if server.base_path == "/" {
        api
    } else {
        Router::new()
            .route("/health", get(health))
            .nest(&server.base_path, api)
    };

    let app = app
        .fallback(endpoint_not_found)
        .with_state(state)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http());

    if server.cors_permissive {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

async fn list_files(State(state): State<AppState>) -> Result<Json<ListResponse>, RouterError> {
    let scanner = state.scanner.clone();
    let outcome = tokio::task::spawn_blocking(move || scanner.scan()).await??;

    info!(
        count = outcome.entries.len(),
        truncated = outcome.truncated,
        "Listed files"
    );
    Ok(Json(ListResponse::new(outcome.entries, outcome.truncated)))
}

async fn view_file(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> Result<Response, RouterError> {
    let raw = required_path(query.as_deref())?;
    let accessor = state.accessor.clone();
    let opened = tokio::task::spawn_blocking(move || {
        let resolved = accessor.resolve(&raw)?;
        accessor.open_for_preview(&resolved)
    })
    .await??;

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(opened.content_type));
    headers.insert(CACHE_CONTROL, cache_control(state.cache_max_age));
    headers.insert(CONTENT_LENGTH, HeaderValue::from(opened.size));

    Ok((StatusCode::OK, headers, stream_body(opened)).into_response())
}

async fn download_file(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> Result<Response, RouterError> {
    let raw = required_path(query.as_deref())?;
    let accessor = state.accessor.clone();
    let opened = tokio::task::spawn_blocking(move || {
        let resolved = accessor.resolve(&raw)?;
        accessor.open_for_download(&resolved)
    })
    .await??;

    let disposition = content_disposition(&opened.file_name)
        .map_err(|e| RouterError::Internal(format!("invalid Content-Disposition: {e}")))?;

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(opened.content_type));
    headers.insert(CONTENT_DISPOSITION, disposition);
    headers.insert(CONTENT_LENGTH, HeaderValue::from(opened.size));

    Ok((StatusCode::OK, headers, stream_body(opened)).into_response())
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}

async fn endpoint_not_found() -> RouterError {
    RouterError::EndpointNotFound
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    RouterError::Internal(format!("handler panicked: {detail}")).into_response()
}

/// Extract the `path` parameter from the raw query string.
///
/// The value is form-decoded once (`+` is a space) without any lossy
/// replacement; a malformed escape or invalid UTF-8 is an `InvalidPath`. The
/// result is still percent-encoded from the resolver's point of view.
fn required_path(query: Option<&str>) -> Result<String, RouterError> {
    let value = query
        .unwrap_or_default()
        .split('&')
        .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
        .find(|(key, _)| *key == "path")
        .map(|(_, value)| value);

    let value = match value {
        Some(value) if !value.is_empty() => value,
        _ => return Err(RouterError::MissingPath),
    };

    percent_decode_strict(&value.replace('+', " ")).ok_or_else(|| {
        warn!(raw = %value, "Rejected undecodable path parameter");
        RouterError::from(ResolveError::InvalidPath(value.to_string()))
    })
}

/// Stream an opened file without buffering it.
///
/// Headers are already committed when a read fails, so the failure is only
/// logged and the body is cut short.
fn stream_body(opened: OpenedFile) -> Body {
    let relative = opened.relative.clone();
    let file = tokio::fs::File::from_std(opened.into_file());
    let stream = ReaderStream::new(file).inspect_err(move |e| {
        error!(path = %relative, error = %e, "File stream failed after headers were sent");
    });
    Body::from_stream(stream)
}

fn cache_control(max_age: u64) -> HeaderValue {
    match HeaderValue::from_str(&format!("public, max-age={max_age}")) {
        Ok(value) => value,
        Err(_) => HeaderValue::from_static("public, max-age=3600"),
    }
}

/// `attachment; filename="..."`, with an RFC 5987 `filename*` for non-ASCII names.
fn content_disposition(file_name: &str) -> Result<HeaderValue, axum::http::header::InvalidHeaderValue> {
    let fallback: String = file_name
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let value = if file_name.is_ascii() && fallback == file_name {
        format!("attachment; filename=\"{fallback}\"")
    } else {
        format!(
            "attachment; filename=\"{fallback}\"; filename*=UTF-8''{}",
            urlencoding::encode(file_name)
        )
    };
    HeaderValue::from_str(&value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_resolve_errors_are_bad_requests() {
        for (err, code) in [
            (ResolveError::InvalidPath("x".into()), ErrorCode::InvalidPath),
            (ResolveError::Traversal("../x".into()), ErrorCode::Traversal),
            (ResolveError::OutsideRoot("/etc".into()), ErrorCode::OutsideRoot),
        ] {
            let err = RouterError::from(err);
            assert_eq!(err.status(), StatusCode::BAD_REQUEST);
            assert_eq!(err.code(), code);
        }
    }

    #[test]
    fn test_not_found_is_bad_request_with_suggestion() {
        let err = RouterError::from(FileError::NotFound {
            path: "reports/Q1.pdf".to_string(),
            suggestion: Some("q1.pdf".to_string()),
        });
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let body = err.to_error_response();
        assert!(!body.success);
        assert_eq!(body.code, ErrorCode::NotFound);
        assert_eq!(body.suggestion.as_deref(), Some("q1.pdf"));
        assert!(body.message.contains("q1.pdf"));
    }

    #[test]
    fn test_unsupported_type_and_permission() {
        let err = RouterError::from(FileError::UnsupportedType {
            extension: ".exe".to_string(),
        });
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), ErrorCode::UnsupportedType);

        let err = RouterError::from(FileError::PermissionDenied {
            path: "locked.pdf".to_string(),
        });
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), ErrorCode::PermissionDenied);
    }

    #[test]
    fn test_io_error_hides_detail() {
        let err = RouterError::from(FileError::Io {
            path: PathBuf::from("/srv/secret/q1.pdf"),
            source: std::io::Error::other("disk on fire"),
        });
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = err.to_error_response();
        assert_eq!(body.message, INTERNAL_ERROR_MESSAGE);
        assert!(!body.message.contains("/srv"));
    }

    #[test]
    fn test_root_not_found_hides_path() {
        let err = RouterError::from(ScanError::RootNotFound(PathBuf::from("/srv/data")));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.code(), ErrorCode::RootNotFound);
        assert!(!err.to_error_response().message.contains("/srv"));
    }

    #[test]
    fn test_scan_entry_error_is_internal() {
        let err = RouterError::from(ScanError::NonUtf8Name(PathBuf::from("/srv/x")));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code(), ErrorCode::ScanFailed);
        assert_eq!(err.to_error_response().message, INTERNAL_ERROR_MESSAGE);
    }

    #[test]
    fn test_missing_path_and_fallback() {
        assert_eq!(RouterError::MissingPath.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            RouterError::MissingPath.to_error_response().message,
            "path parameter is required"
        );

        let body = RouterError::EndpointNotFound.to_error_response();
        assert_eq!(RouterError::EndpointNotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(body.message, ENDPOINT_NOT_FOUND_MESSAGE);
    }

    #[test]
    fn test_internal_error_is_generic() {
        let err = RouterError::Internal("handler panicked: boom".to_string());
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_error_response().message, INTERNAL_ERROR_MESSAGE);
    }

    #[test]
    fn test_handle_panic_renders_json_500() {
        let response = handle_panic(Box::new("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }

    #[test]
    fn test_content_disposition_ascii() {
        let value = content_disposition("q1 report.pdf").unwrap();
        assert_eq!(value, "attachment; filename=\"q1 report.pdf\"");
    }

    #[test]
    fn test_content_disposition_escapes_quotes() {
        let value = content_disposition("a\"b.pdf").unwrap();
        assert_eq!(
            value,
            "attachment; filename=\"a_b.pdf\"; filename*=UTF-8''a%22b.pdf"
        );
    }

    #[test]
    fn test_content_disposition_non_ascii() {
        let value = content_disposition("laporan é.pdf").unwrap();
        assert_eq!(
            value,
            "attachment; filename=\"laporan _.pdf\"; filename*=UTF-8''laporan%20%C3%A9.pdf"
        );
    }

    #[test]
    fn test_cache_control() {
        assert_eq!(cache_control(3600), "public, max-age=3600");
        assert_eq!(cache_control(0), "public, max-age=0");
    }

    #[test]
    fn test_required_path() {
        assert_eq!(
            required_path(Some("path=reports/q1.pdf")).unwrap(),
            "reports/q1.pdf"
        );
        assert_eq!(
            required_path(Some("x=1&path=my+report%2Epdf")).unwrap(),
            "my report.pdf"
        );
        // One decode only; the resolver decodes the rest.
        assert_eq!(
            required_path(Some("path=reports%252Fq1.pdf")).unwrap(),
            "reports%2Fq1.pdf"
        );
        assert!(matches!(required_path(None), Err(RouterError::MissingPath)));
        assert!(matches!(
            required_path(Some("path=")),
            Err(RouterError::MissingPath)
        ));
        assert!(matches!(
            required_path(Some("other=1")),
            Err(RouterError::MissingPath)
        ));
    }

    #[test]
    fn test_required_path_rejects_undecodable_values() {
        for query in ["path=%FF%FE.pdf", "path=q1%ZZ.pdf", "path=%E0%A4.pdf", "path=a%"] {
            let err = required_path(Some(query)).unwrap_err();
            assert_eq!(err.code(), ErrorCode::InvalidPath, "{query}");
            assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        }
    }
}
