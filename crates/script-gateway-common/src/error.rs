//! Error types for script-gateway.
//!
//! This module defines the error taxonomy using `thiserror`:
//! - [`ConfigError`]: Setup-time failures (unknown strategy, bad config file)
//! - [`ExecuteError`]: Failures of a single script execution
//! - [`GatewayError`]: Server lifecycle failures

use std::io;

use thiserror::Error;

/// Message fragment interpreters use to report an unresolvable script.
///
/// Any [`ExecuteError`] whose message contains this fragment is treated as a
/// missing script rather than an interpreter fault.
pub const SCRIPT_NOT_FOUND_SIGNATURE: &str = "Script not found";

/// Configuration errors.
///
/// These are fatal at startup. A configuration error never falls back to a
/// default strategy.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The rewrite strategy name is not one of the known strategies.
    #[error("Unknown rewrite strategy: {name}")]
    UnknownStrategy {
        /// The name that was requested.
        name: String,
    },

    /// A required field is absent.
    #[error("Missing required field: {field}")]
    MissingField {
        /// Dotted path of the missing field.
        field: String,
    },

    /// An option value is present but unusable.
    #[error("Invalid option: {reason}")]
    InvalidOption {
        /// Description of the problem.
        reason: String,
    },

    /// Failed to read a configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Failed to parse a configuration file.
    #[error("Failed to parse config file: {message}")]
    Parse { message: String },
}

impl ConfigError {
    /// Create a new `UnknownStrategy` error.
    pub fn unknown_strategy(name: impl Into<String>) -> Self {
        Self::UnknownStrategy { name: name.into() }
    }

    /// Create a new `MissingField` error.
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Create a new `InvalidOption` error.
    pub fn invalid_option(reason: impl Into<String>) -> Self {
        Self::InvalidOption {
            reason: reason.into(),
        }
    }
}

/// Errors from executing a script.
///
/// A rejected execution carries a descriptive message. Whether it maps to a
/// 404 or a 500 is decided by [`ExecuteError::is_script_not_found`].
#[derive(Error, Debug)]
pub enum ExecuteError {
    /// The resolved script does not exist.
    #[error("Script not found: {path}")]
    ScriptNotFound {
        /// The resolved script path.
        path: String,
    },

    /// The script exists but could not be read.
    #[error("Failed to load script '{path}': {source}")]
    Load {
        path: String,
        #[source]
        source: io::Error,
    },

    /// The interpreter rejected the call.
    ///
    /// The message is forwarded verbatim as the response body.
    #[error("{0}")]
    Interpreter(String),
}

impl ExecuteError {
    /// Create a new `ScriptNotFound` error.
    pub fn script_not_found(path: impl Into<String>) -> Self {
        Self::ScriptNotFound { path: path.into() }
    }

    /// Create a new `Interpreter` error.
    pub fn interpreter(message: impl Into<String>) -> Self {
        Self::Interpreter(message.into())
    }

    /// Returns `true` if this failure means the script could not be resolved.
    pub fn is_script_not_found(&self) -> bool {
        match self {
            Self::ScriptNotFound { .. } => true,
            Self::Load { .. } => false,
            Self::Interpreter(message) => message.contains(SCRIPT_NOT_FOUND_SIGNATURE),
        }
    }
}

/// Server lifecycle errors.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// The listener could not be bound.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The server loop failed.
    #[error("Server error: {0}")]
    Serve(#[source] io::Error),
}
