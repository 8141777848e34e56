//! Bootstrap utilities for ordermesh binaries.
//!
//! Shared initialization code for all service binaries.

use std::future::Future;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{Config, ConfigError, LogFormat, LoggingConfig, LOG_ENV_VAR};

/// Initialize tracing with the ORDERMESH_LOG environment variable.
///
/// Defaults to "info" level if ORDERMESH_LOG is not set.
pub fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match config.format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

/// Value of `--config <path>` or `--config=<path>` in `args`.
pub fn parse_config_path<I>(args: I) -> Option<String>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next();
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(path.to_string());
        }
    }
    None
}

/// Load configuration from the process arguments and environment, then
/// install the tracing subscriber it describes.
pub fn load_config_and_tracing() -> Result<Config, ConfigError> {
    let path = parse_config_path(std::env::args().skip(1));
    let config = Config::load(path.as_deref())?;
    init_tracing(&config.logging);
    Ok(config)
}

/// Run until ctrl-c (or SIGTERM on unix) arrives.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

/// Drive `serve` until it finishes or a shutdown signal arrives.
pub async fn run_until_shutdown<F, E>(serve: F) -> Result<(), E>
where
    F: Future<Output = Result<(), E>>,
{
    tokio::select! {
        result = serve => result,
        _ = shutdown_signal() => Ok(()),
    }
}
