//! Structured logging setup.
//!
//! The library only emits `tracing` events; installing a subscriber is the
//! binary's job (or the embedding application's).
//!
//! ## Environment Variables
//!
//! - `EXECLINK_LOG` or `RUST_LOG`: filter directive (e.g. `execlink=debug,warn`)
//! - `EXECLINK_LOG_FORMAT`: output format (`pretty`, `compact`, `json`)
//!
//! ```bash
//! # Every dial attempt and frame tag
//! EXECLINK_LOG=execlink=trace execlink watch
//!
//! # One JSON object per log line
//! EXECLINK_LOG_FORMAT=json execlink watch
//! ```

use std::str::FromStr;
use strum::{Display, EnumString};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

pub const LOG_ENV: &str = "EXECLINK_LOG";
pub const LOG_FORMAT_ENV: &str = "EXECLINK_LOG_FORMAT";
const DEFAULT_FILTER: &str = "execlink=info,warn";

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum LogFormat {
    /// Human-readable, multi-line
    #[default]
    Pretty,
    /// Single-line
    Compact,
    /// JSON for log aggregation
    Json,
}

impl LogFormat {
    /// Parse a format name; unknown names fall back to [`LogFormat::Pretty`].
    pub fn parse_lossy(s: &str) -> Self {
        Self::from_str(s.trim()).unwrap_or_default()
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Filter directive
    pub filter: String,
    pub format: LogFormat,
    /// Include file/line in logs
    pub with_file: bool,
    /// Include target (module path)
    pub with_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            format: LogFormat::Pretty,
            with_file: false,
            with_target: true,
        }
    }
}

impl LogConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let filter = lookup(LOG_ENV)
            .or_else(|| lookup("RUST_LOG"))
            .filter(|f| !f.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_FILTER.to_string());

        let format = lookup(LOG_FORMAT_ENV)
            .map(|s| LogFormat::parse_lossy(&s))
            .unwrap_or_default();

        Self {
            filter,
            format,
            ..Default::default()
        }
    }

    /// Verbose output with source locations
    pub fn debug() -> Self {
        Self {
            filter: "execlink=debug,info".to_string(),
            with_file: true,
            ..Default::default()
        }
    }
}

/// Install the global subscriber. Later calls are ignored.
pub fn init(config: LogConfig) {
    let env_filter =
        EnvFilter::try_new(&config.filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_file(config.with_file)
        .with_line_number(config.with_file)
        .with_target(config.with_target);

    let registry = tracing_subscriber::registry().with(env_filter);
    let _ = match config.format {
        LogFormat::Json => tracing::subscriber::set_global_default(registry.with(layer.json())),
        LogFormat::Compact => {
            tracing::subscriber::set_global_default(registry.with(layer.compact()))
        }
        LogFormat::Pretty => tracing::subscriber::set_global_default(registry.with(layer.pretty())),
    };
}
