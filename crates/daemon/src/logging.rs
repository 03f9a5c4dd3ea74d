//! Tracing subscriber setup.
//!
//! Logs always go to stderr. When `daemon.log_dir` is configured they are also
//! written, without ANSI colors, to a daily rolling file in that directory.

use std::fs;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::DaemonConfig;

/// Prefix of the rolling log files.
const LOG_FILE_PREFIX: &str = "rootview";

/// Filter directive used when `RUST_LOG` is unset.
pub fn default_directive(config: &DaemonConfig, verbose: bool) -> String {
    if verbose {
        "debug".to_string()
    } else {
        config.log_level.to_lowercase()
    }
}

/// Install the global subscriber.
///
/// The returned guard flushes the file sink on drop and must be held for the
/// lifetime of the process.
pub fn init(config: &DaemonConfig, verbose: bool) -> Result<Option<WorkerGuard>> {
    let directive = std::env::var(EnvFilter::DEFAULT_ENV)
        .ok()
        .filter(|d| !d.trim().is_empty())
        .unwrap_or_else(|| default_directive(config, verbose));
    let env_filter = EnvFilter::try_new(&directive)
        .with_context(|| format!("parsing log filter directive {directive:?}"))?;

    let console_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating log directory at {}", dir.display()))?;
            let rolling = tracing_appender::rolling::Builder::new()
                .rotation(tracing_appender::rolling::Rotation::DAILY)
                .filename_prefix(LOG_FILE_PREFIX)
                .filename_suffix("log")
                .build(dir)
                .context("creating rolling log appender")?;
            let (writer, guard) = tracing_appender::non_blocking(rolling);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err))?;

    Ok(guard)
}
