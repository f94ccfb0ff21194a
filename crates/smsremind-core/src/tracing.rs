//! Logging setup for the smsremind binary.
//!
//! Diagnostics always go to stderr; stdout is reserved for dry-run output and
//! command results. The filter is `smsremind=<level>` unless `RUST_LOG` is
//! set, in which case `RUST_LOG` wins.
//!
//! Two formats are available:
//! - [`LogFormat::Compact`]: one terse line per event, no timestamps
//! - [`LogFormat::Json`]: one JSON object per line, for runs under cron or a
//!   systemd timer where a collector adds the context
//!
//! ```ignore
//! use smsremind_core::{LogFormat, TracingConfig, init_tracing};
//!
//! init_tracing(TracingConfig::new(false, LogFormat::Json))?;
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt as subscriber_fmt, prelude::*};

/// Errors that can occur during tracing initialization
#[derive(Debug, Error)]
pub enum TracingError {
    /// Failed to set global subscriber
    #[error("failed to set global tracing subscriber: {0}")]
    SetGlobalSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("unknown log format {0:?} (expected compact or json)")]
    UnknownFormat(String),
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl LogFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Compact => "compact",
            Self::Json => "json",
        }
    }
}

impl FromStr for LogFormat {
    type Err = TracingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            _ => Err(TracingError::UnknownFormat(s.to_string())),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the subscriber logs and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    /// Level for the `smsremind` crates when `RUST_LOG` is unset
    pub level: Level,
    pub format: LogFormat,
    /// Adds file, line and target to every event
    pub include_location: bool,
}

impl TracingConfig {
    /// Debug runs log everything from smsremind with source locations.
    /// Normal runs only report warnings and errors.
    #[must_use]
    pub fn new(debug: bool, format: LogFormat) -> Self {
        Self {
            level: if debug { Level::DEBUG } else { Level::WARN },
            format,
            include_location: debug,
        }
    }

    /// The filter directive used when `RUST_LOG` is unset.
    pub fn directive(&self) -> String {
        format!("smsremind={}", self.level.to_string().to_ascii_lowercase())
    }
}

/// Installs the global subscriber. Call once, before any other work.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(config: TracingConfig) -> Result<(), TracingError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.directive()));
    let location = config.include_location;

    let compact = (config.format == LogFormat::Compact).then(|| {
        subscriber_fmt::layer()
            .with_writer(std::io::stderr)
            .compact()
            .without_time()
            .with_file(location)
            .with_line_number(location)
            .with_target(location)
    });
    let json = (config.format == LogFormat::Json).then(|| {
        subscriber_fmt::layer()
            .with_writer(std::io::stderr)
            .json()
            .with_file(location)
            .with_line_number(location)
            .with_target(location)
    });

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(compact)
        .with(json);
    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}
