//! RootView Daemon
//!
//! Read-only HTTP gateway over one directory.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::SecondsFormat;
use clap::{Parser, Subcommand};
use daemon::config::Config;
use daemon::files::{DirectoryScanner, FileAccessor};
use daemon::protocol::messages::{to_json_pretty, ListResponse};
use daemon::{logging, FileServer, RouterError};

/// RootView Daemon - read-only HTTP gateway over one directory.
#[derive(Parser, Debug)]
#[command(name = "rootview-daemon")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for the daemon.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Serve the HTTP API
    Serve {
        /// Root directory to expose (overrides config and MONITORING_BASE_DIR)
        #[arg(long, value_name = "DIR")]
        root: Option<PathBuf>,

        /// Port to listen on (overrides config and PORT)
        #[arg(long, short)]
        port: Option<u16>,

        /// Address to bind
        #[arg(long)]
        bind: Option<String>,
    },

    /// Scan the root once and print the listing
    List {
        /// Print the JSON body `/list` would return
        #[arg(long)]
        json: bool,
    },

    /// Check a client path the way `/view` would, without serving it
    Resolve {
        /// Path relative to the root, percent-encoded as a client would send it
        path: String,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default()?
    };

    // Apply environment variable overrides
    config.apply_env_overrides();

    if let Commands::Serve { root, port, bind } = &cli.command {
        if let Some(root) = root {
            config.files.root = Some(root.clone());
        }
        if let Some(port) = port {
            config.server.port = *port;
        }
        if let Some(bind) = bind {
            config.server.bind_address = bind.clone();
        }
    }

    // Initialize tracing
    let _log_guard = logging::init(&config.daemon, cli.verbose)?;
    if let Some(config_path) = &cli.config {
        tracing::info!("Using config file: {:?}", config_path);
    }

    match cli.command {
        Commands::Serve { .. } => {
            let mut server = FileServer::new(config)?;
            server.start().await?;

            wait_for_shutdown_signal().await;
            tracing::info!("Received shutdown signal");

            server.stop().await?;
        }
        Commands::List { json } => {
            let scope = Arc::new(config.file_scope()?);
            let scanner = DirectoryScanner::new(scope);
            let outcome = match tokio::task::spawn_blocking(move || scanner.scan()).await? {
                Ok(outcome) => outcome,
                Err(e) => {
                    eprintln!("Failed to list files: {}", e);
                    std::process::exit(1);
                }
            };

            let body = ListResponse::new(outcome.entries, outcome.truncated);
            if json {
                println!("{}", to_json_pretty(&body)?);
            } else {
                print_listing(&body);
            }
        }
        Commands::Resolve { path } => {
            let scope = Arc::new(config.file_scope()?);
            let accessor = FileAccessor::new(scope);
            let result = tokio::task::spawn_blocking(move || {
                let resolved = accessor.resolve(&path)?;
                accessor.open_for_preview(&resolved)
            })
            .await?;

            match result {
                Ok(opened) => {
                    println!("OK {}", opened.relative);
                    println!("  Real path:    {}", opened.path.display());
                    println!("  Content-Type: {}", opened.content_type);
                    println!("  Size:         {} bytes", opened.size);
                }
                Err(e) => {
                    let err = RouterError::from(e);
                    let body = err.to_error_response();
                    eprintln!("{} ({}): {}", body.code, err.status().as_u16(), body.message);
                    if let Some(suggestion) = body.suggestion {
                        eprintln!("  Did you mean: {}", suggestion);
                    }
                    std::process::exit(1);
                }
            }
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
            if let Err(e) = config.validate() {
                eprintln!("Warning: configuration is not valid: {}", e);
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

/// Print a listing as a table.
fn print_listing(listing: &ListResponse) {
    if listing.data.is_empty() {
        println!("No files found.");
        return;
    }

    println!("{:<12} {:<21} {:<6} PATH", "SIZE", "MODIFIED", "TYPE");
    println!("{}", "-".repeat(72));
    for entry in &listing.data {
        println!(
            "{:<12} {:<21} {:<6} {}",
            entry.size,
            entry.modified.to_rfc3339_opts(SecondsFormat::Secs, true),
            entry.file_type,
            entry.path
        );
    }
    println!();
    print!("{} file(s)", listing.count);
    if listing.truncated {
        print!(" (truncated by scan limits)");
    }
    println!();
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            tracing::warn!("Failed to register SIGTERM handler: {}", e);
            wait_for_ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM");
        }
        _ = wait_for_ctrl_c() => {
            tracing::info!("Received SIGINT");
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
