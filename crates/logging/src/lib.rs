//! MerkleDrop Logging
//!
//! Installs the global tracing subscriber: an fmt layer filtered by
//! `RUST_LOG` when set, or by the requested level otherwise.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use tracing_subscriber::{fmt as fmt_layer, prelude::*, EnvFilter};

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Invalid log filter {filter}: {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("Logging already initialized: {0}")]
    AlreadyInitialized(String),
}

pub type Result<T> = std::result::Result<T, LoggingError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn from_verbose(verbose: bool) -> Self {
        if verbose {
            LogLevel::Debug
        } else {
            LogLevel::Info
        }
    }

    /// Filter directive for this level; crate-local logs one step louder at
    /// debug and above.
    pub fn directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "info,merkledrop=debug",
            LogLevel::Trace => "debug,merkledrop=trace",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        };
        f.write_str(name)
    }
}

impl FromStr for LogLevel {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(LoggingError::InvalidFilter {
                filter: other.to_string(),
                reason: "unknown level".to_string(),
            }),
        }
    }
}

/// Build the filter: `RUST_LOG` wins, then `fallback`.
pub fn build_filter(fallback: &str) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(fallback).map_err(|e| LoggingError::InvalidFilter {
        filter: fallback.to_string(),
        reason: e.to_string(),
    })
}

/// Install the subscriber at `level`.
pub fn try_init_logging(level: LogLevel) -> Result<()> {
    try_init_with_filter(level.directive())
}

/// Install the subscriber with an explicit filter directive string.
pub fn try_init_with_filter(directives: &str) -> Result<()> {
    let filter = build_filter(directives)?;
    tracing_subscriber::registry()
        .with(fmt_layer::layer())
        .with(filter)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;
    tracing::debug!("Logging initialized ({})", directives);
    Ok(())
}

/// Install the subscriber, ignoring a second initialization.
pub fn init_logging(verbose: bool) {
    let _ = try_init_logging(LogLevel::from_verbose(verbose));
}
