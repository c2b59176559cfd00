//! Structured logging utilities for chonk components.
//!
//! Provides consistent logging with component prefixes and structured
//! fields.
//!
//! # Usage
//!
//! ```ignore
//! use chonk_config::logging::*;
//!
//! chonk_config::logging::init_logging(&chonk_config::config());
//! log_index_info!("walk started", root = "/srv/data");
//! log_store_debug!("slab bound", start = 4096, count = 120);
//! ```

use serde::{Deserialize, Serialize};

use crate::Config;

/// Component identifiers for log filtering
pub struct Component;

impl Component {
    pub const STORE: &'static str = "STORE";
    pub const INDEX: &'static str = "INDEX";
    pub const READ: &'static str = "READ";
}

/// Default verbosity, settable from the `[log]` config section
/// (`level = "debug"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Filter directive used when no environment override is present.
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

// === STORE logging macros ===

#[macro_export]
macro_rules! log_store_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = "STORE", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_store_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "STORE", $($key = $value,)* $msg)
    };
}

// === INDEX logging macros ===

#[macro_export]
macro_rules! log_index_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = "INDEX", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_index_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = "INDEX", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_index_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "INDEX", $($key = $value,)* $msg)
    };
}

// === READ logging macros ===

#[macro_export]
macro_rules! log_read_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "READ", $($key = $value,)* $msg)
    };
}

/// Pick the active filter directive. `CHONK_LOG` wins, then the standard
/// `RUST_LOG`, then the configured default level.
fn resolve_filter(default_level: LogLevel) -> String {
    std::env::var("CHONK_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| default_level.as_filter().to_string())
}

/// Install the global subscriber for a chonk process.
/// Call this once at startup, after the config is loaded.
pub fn init_logging(config: &Config) {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(resolve_filter(config.log.level)))
        .with_target(false)
        .compact()
        .init();
}
