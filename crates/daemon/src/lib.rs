//! # RootView Daemon Library
//!
//! This crate provides the server side of RootView, a read-only HTTP gateway
//! over one directory of the host.
//!
//! ## Overview
//!
//! Clients list the files under the configured root, preview them inline or
//! download them. The daemon provides:
//!
//! - **Path Resolution**: Untrusted client paths are decoded, normalized and
//!   canonicalized, and rejected if they escape the root
//! - **Directory Scanning**: Recursive listing filtered by an extension allow-list
//! - **File Access**: Extension, existence and permission checks before a file
//!   is streamed to the client
//! - **HTTP API**: `/list`, `/view`, `/download` and `/health` served with axum
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                       FileServer                         │
//! ├──────────────────────────────────────────────────────────┤
//! │  ┌────────────────────────────────────────────────────┐  │
//! │  │        Router (axum, CORS, trace, catch-panic)     │  │
//! │  └────────────────────────────────────────────────────┘  │
//! │                                                          │
//! │  ┌──────────────────┐  ┌──────────────────────────────┐  │
//! │  │ DirectoryScanner │  │ FileAccessor                 │  │
//! │  └──────────────────┘  │   └── PathResolver           │  │
//! │                        └──────────────────────────────┘  │
//! │                                                          │
//! │  ┌────────────────────────────────────────────────────┐  │
//! │  │   FileScope (root + allowed extensions + limits)   │  │
//! │  └────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use daemon::{Config, FileServer};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut config = Config::load_default()?;
//!     config.apply_env_overrides();
//!
//!     let mut server = FileServer::new(config)?;
//!     let addr = server.start().await?;
//!     println!("listening on {addr}");
//!
//!     tokio::signal::ctrl_c().await?;
//!     server.stop().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading, environment overrides and validation
//! - [`files`]: Path resolution, directory scanning and file access
//! - [`router`]: HTTP routes and error responses
//! - [`server`]: Listener and graceful shutdown
//! - [`logging`]: Tracing subscriber setup

pub mod config;
pub mod files;
pub mod logging;
pub mod router;
pub mod server;

// Re-export protocol for convenience
pub use protocol;

// Re-export config types for convenience
pub use config::{Config, ConfigError};

// Re-export files types for convenience
pub use files::{
    AllowedExtensionSet, DirectoryScanner, FileAccessor, FileError, FileScope, OpenedFile,
    PathResolver, ResolveError, ResolvedPath, ScanError, ScanLimits, ScanOutcome,
};

// Re-export router types for convenience
pub use router::{build_router, AppState, RouterError};

// Re-export server types for convenience
pub use server::{FileServer, ServerState};
