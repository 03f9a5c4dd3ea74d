//! HTTP server lifecycle.
//!
//! This module provides the `FileServer` that validates the configuration,
//! binds the listener, serves the router on a background task and shuts it
//! down gracefully through a [`CancellationToken`].

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::files::FileScope;
use crate::router::{build_router, AppState};

/// Server lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Initial state, not started.
    Stopped,
    /// Binding the listener.
    Starting,
    /// Accepting requests.
    Running,
    /// Draining in-flight requests.
    ShuttingDown,
}

/// The RootView HTTP server.
pub struct FileServer {
    /// Validated configuration.
    config: Config,
    /// What is served, shared with every handler.
    scope: Arc<FileScope>,
    /// Current state.
    state: Arc<RwLock<ServerState>>,
    /// Address actually bound, once started.
    local_addr: Option<SocketAddr>,
    /// Background task running `axum::serve`.
    task: Option<JoinHandle<std::io::Result<()>>>,
    /// Cancellation token for graceful shutdown.
    shutdown_token: CancellationToken,
}

impl FileServer {
    /// Create a server from a configuration. Fails if the configuration is invalid.
    pub fn new(config: Config) -> Result<Self> {
        let scope = config.file_scope().context("Invalid configuration")?;
        Ok(Self {
            config,
            scope: Arc::new(scope),
            state: Arc::new(RwLock::new(ServerState::Stopped)),
            local_addr: None,
            task: None,
            shutdown_token: CancellationToken::new(),
        })
    }

    /// The configuration this server was built from.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// What this server exposes.
    pub fn scope(&self) -> &Arc<FileScope> {
        &self.scope
    }

    /// Build the router without binding anything.
    pub fn app(&self) -> Router {
        let state = AppState::new(Arc::clone(&self.scope), self.config.server.cache_max_age);
        build_router(state, &self.config.server)
    }

    /// Returns the current state.
    pub async fn state(&self) -> ServerState {
        *self.state.read().await
    }

    /// Address the listener is bound to, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Returns the shutdown token for external tasks to observe shutdown.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Bind the listener and start serving in the background.
    ///
    /// Returns the bound address, which differs from the configured one when
    /// the configured port is 0.
    pub async fn start(&mut self) -> Result<SocketAddr> {
        {
            let mut state = self.state.write().await;
            if *state != ServerState::Stopped {
                anyhow::bail!("Server is already running");
            }
            *state = ServerState::Starting;
        }

        let (listener, addr) = match self.bind().await {
            Ok(bound) => bound,
            Err(e) => {
                *self.state.write().await = ServerState::Stopped;
                return Err(e);
            }
        };

        if self.shutdown_token.is_cancelled() {
            self.shutdown_token = CancellationToken::new();
        }
        let token = self.shutdown_token.clone();
        let app = self.app();
        let state = Arc::clone(&self.state);

        self.task = Some(tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(ref e) = result {
                error!("HTTP server terminated with error: {}", e);
            }
            *state.write().await = ServerState::Stopped;
            result
        }));
        self.local_addr = Some(addr);

        *self.state.write().await = ServerState::Running;
        self.log_banner(addr);
        Ok(addr)
    }

    async fn bind(&self) -> Result<(TcpListener, SocketAddr)> {
        let listen_addr = self.config.server.listen_addr();
        let listener = TcpListener::bind(&listen_addr)
            .await
            .with_context(|| format!("Failed to bind {listen_addr}"))?;
        let addr = listener
            .local_addr()
            .context("Failed to read bound address")?;
        Ok((listener, addr))
    }

    fn log_banner(&self, addr: SocketAddr) {
        let root = self.scope.root();
        info!(
            address = %addr,
            base_path = %self.config.server.base_path,
            "RootView listening on http://{}{}",
            addr,
            self.config.server.base_path
        );
        info!(root = %root.display(), "Serving root directory");
        info!(extensions = %self.scope.extensions(), "Allowed extensions");
        if !root.is_dir() {
            warn!(
                root = %root.display(),
                "Root directory does not exist yet; listings will fail until it does"
            );
        }
    }

    /// Stop serving, waiting for in-flight requests to finish.
    pub async fn stop(&mut self) -> Result<()> {
        {
            let mut state = self.state.write().await;
            if *state == ServerState::Stopped && self.task.is_none() {
                return Ok(());
            }
            if *state == ServerState::ShuttingDown {
                anyhow::bail!("Server is already shutting down");
            }
            *state = ServerState::ShuttingDown;
        }

        info!("Stopping HTTP server...");
        self.shutdown_token.cancel();

        if let Some(task) = self.task.take() {
            match task.await {
                Ok(Ok(())) => debug!("HTTP server task finished"),
                Ok(Err(e)) => warn!("HTTP server finished with error: {}", e),
                Err(e) => warn!("HTTP server task failed: {}", e),
            }
        }

        *self.state.write().await = ServerState::Stopped;
        self.local_addr = None;
        info!("HTTP server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn create_test_config(temp_dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.server.bind_address = "127.0.0.1".to_string();
        config.server.port = 0;
        config.files.root = Some(temp_dir.path().to_path_buf());
        config.files.allowed_extensions = vec![".pdf".to_string()];
        config
    }

    #[tokio::test]
    async fn test_server_creation() {
        let temp_dir = TempDir::new().unwrap();
        let server = FileServer::new(create_test_config(&temp_dir)).unwrap();

        assert_eq!(server.state().await, ServerState::Stopped);
        assert!(server.local_addr().is_none());
        assert_eq!(server.scope().root(), temp_dir.path());
    }

    #[tokio::test]
    async fn test_server_rejects_invalid_config() {
        let mut config = Config::default();
        config.files.root = Some(PathBuf::from("relative"));
        config.files.allowed_extensions = vec![".pdf".to_string()];

        let err = FileServer::new(config).err().unwrap();
        assert!(format!("{err:#}").contains("absolute"));
    }

    #[tokio::test]
    async fn test_server_start_stop() {
        let temp_dir = TempDir::new().unwrap();
        let mut server = FileServer::new(create_test_config(&temp_dir)).unwrap();

        let addr = server.start().await.unwrap();
        assert_ne!(addr.port(), 0);
        assert_eq!(server.local_addr(), Some(addr));
        assert_eq!(server.state().await, ServerState::Running);

        assert!(server.start().await.is_err());

        server.stop().await.unwrap();
        assert_eq!(server.state().await, ServerState::Stopped);
        assert!(server.shutdown_token().is_cancelled());
        assert!(server.local_addr().is_none());
    }

    #[tokio::test]
    async fn test_stop_without_start() {
        let temp_dir = TempDir::new().unwrap();
        let mut server = FileServer::new(create_test_config(&temp_dir)).unwrap();

        server.stop().await.unwrap();
        assert_eq!(server.state().await, ServerState::Stopped);
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let temp_dir = TempDir::new().unwrap();
        let mut server = FileServer::new(create_test_config(&temp_dir)).unwrap();

        server.start().await.unwrap();
        server.stop().await.unwrap();
        server.start().await.unwrap();
        assert_eq!(server.state().await, ServerState::Running);
        server.stop().await.unwrap();
    }
}
