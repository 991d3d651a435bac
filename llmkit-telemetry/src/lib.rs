//! Observability utilities for llmkit.
//!
//! Everything in the workspace logs through `tracing`; this crate installs the
//! subscriber that renders those events.

#![warn(missing_docs, clippy::pedantic)]

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Result alias for telemetry setup.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Errors raised while installing the logging subscriber.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The configured level is not a valid filter directive.
    #[error("invalid log filter `{directive}`: {reason}")]
    InvalidFilter {
        /// The rejected directive.
        directive: String,
        /// Parser message.
        reason: String,
    },

    /// A global subscriber was already installed.
    #[error("logging already initialised: {reason}")]
    AlreadyInitialised {
        /// Reason reported by `tracing-subscriber`.
        reason: String,
    },
}

/// Settings for the formatted log output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `debug` or `llmkit_engine=debug,info`.
    pub level: String,
    /// Include the event target (module path).
    pub with_target: bool,
    /// Include the source file name.
    pub with_file: bool,
    /// Include the source line number.
    pub with_line_number: bool,
    /// Emit ANSI colour codes.
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            with_target: true,
            with_file: false,
            with_line_number: false,
            ansi: true,
        }
    }
}

impl LoggingConfig {
    /// Builds the filter, letting `RUST_LOG` win over the configured level.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::InvalidFilter`] if neither `RUST_LOG` nor the
    /// configured level parses.
    pub fn env_filter(&self) -> TelemetryResult<EnvFilter> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        EnvFilter::try_new(&self.level).map_err(|err| TelemetryError::InvalidFilter {
            directive: self.level.clone(),
            reason: err.to_string(),
        })
    }
}

/// Installs a global `fmt` subscriber configured by `config`.
///
/// # Errors
///
/// Returns [`TelemetryError::InvalidFilter`] for a bad level and
/// [`TelemetryError::AlreadyInitialised`] if a global subscriber already exists.
pub fn init_logging(config: &LoggingConfig) -> TelemetryResult<()> {
    let filter = config.env_filter()?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target)
        .with_file(config.with_file)
        .with_line_number(config.with_line_number)
        .with_ansi(config.ansi)
        .try_init()
        .map_err(|err| TelemetryError::AlreadyInitialised {
            reason: err.to_string(),
        })
}
