//! Logging setup
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `RUST_LOG` | `coin_cache=info` | Log level filter (standard tracing format) |
//! | `LOG_FORMAT` | `json` | Output format: `json` or `pretty` |
//!
//! # Usage
//! ```rust,ignore
//! use coin_cache::config::logging::init_logging;
//! init_logging();
//! tracing::info!("Application started");
//! ```

use std::env;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing_subscriber::{fmt as ts_fmt, prelude::*, EnvFilter};

/// Flag to track if logging has been initialized (prevents double-init)
static LOGGING_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Default log level when RUST_LOG is not set
pub const DEFAULT_LOG_LEVEL: &str = "coin_cache=info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Log level filter string (e.g., "coin_cache=debug,coin_cache::adapters=trace")
    pub level_filter: String,
    /// Use pretty format instead of JSON
    pub use_pretty_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level_filter: DEFAULT_LOG_LEVEL.to_string(),
            use_pretty_format: false,
        }
    }
}

impl LoggingConfig {
    /// Read `RUST_LOG` and `LOG_FORMAT`
    pub fn from_env() -> Self {
        let level_filter = env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string());
        let use_pretty_format = env::var("LOG_FORMAT")
            .map(|v| v.to_lowercase() == "pretty")
            .unwrap_or(false);

        Self {
            level_filter,
            use_pretty_format,
        }
    }
}

/// Initialize logging from the environment. Subsequent calls are no-ops.
pub fn init_logging() {
    init_logging_with_config(LoggingConfig::from_env());
}

pub fn init_logging_with_config(config: LoggingConfig) {
    if LOGGING_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    let env_filter = EnvFilter::try_new(&config.level_filter)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));

    if config.use_pretty_format {
        // Human-readable for development
        tracing_subscriber::registry()
            .with(ts_fmt::layer().pretty().with_target(true))
            .with(env_filter)
            .init();
    } else {
        // JSON for production (default)
        tracing_subscriber::registry()
            .with(ts_fmt::layer().json().with_target(true).with_current_span(true))
            .with(env_filter)
            .init();
    }
}
