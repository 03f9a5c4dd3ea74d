//! # RootView Protocol Library
//!
//! Wire types shared by the RootView daemon and its clients.
//!
//! ## Overview
//!
//! RootView exposes one directory of a host over HTTP. This crate holds the
//! JSON shapes of that API so that clients and tests do not re-declare them:
//!
//! - **Listing**: [`ListingEntry`] and the [`ListResponse`] envelope of `GET /list`
//! - **Errors**: the [`ErrorResponse`] body and its [`ErrorCode`] taxonomy
//! - **Health**: the [`HealthResponse`] body of `GET /health`
//!
//! ## Example Usage
//!
//! ```rust
//! use protocol::{ErrorCode, ErrorResponse};
//!
//! let body = ErrorResponse::new(ErrorCode::NotFound, "file not found: reports/Q1.pdf")
//!     .with_suggestion(Some("q1.pdf".to_string()));
//! let json = protocol::messages::to_json(&body).unwrap();
//! assert!(json.contains("NOT_FOUND"));
//! ```
//!
//! ## Modules
//!
//! - [`messages`]: Response bodies and error codes
//! - [`error`]: Error types

pub mod error;
pub mod messages;

pub use error::{ProtocolError, Result};
pub use messages::{
    ErrorCode, ErrorResponse, HealthResponse, ListResponse, ListingEntry, HEALTH_OK,
};
