//! Configuration structures for script-gateway.
//!
//! This module defines configuration options for the gateway components:
//! - [`GatewayConfig`]: Document root, rewrite strategy, request adaptation
//! - [`InterpreterConfig`]: How the CGI interpreter backend is launched

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{ConfigError, StrategyConfig};

/// Routing and request-adaptation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
    /// Directory every request path is resolved against.
    ///
    /// Required; may be supplied on the command line instead of the file.
    #[serde(default)]
    pub docroot: Option<PathBuf>,

    /// Rewrite strategy. When absent, scripts are addressed directly.
    #[serde(default)]
    pub rewrite: Option<StrategyConfig>,

    /// How request headers are presented to the interpreter.
    #[serde(default)]
    pub header_mode: HeaderMode,

    /// Forward the `Host` header to the interpreter.
    #[serde(default = "defaults::forward_host_header")]
    pub forward_host_header: bool,

    /// Largest request body passed to the interpreter, in bytes.
    #[serde(default = "defaults::max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            docroot: None,
            rewrite: None,
            header_mode: HeaderMode::default(),
            forward_host_header: defaults::forward_host_header(),
            max_body_bytes: defaults::max_body_bytes(),
        }
    }
}

impl GatewayConfig {
    /// Create a config for the given document root with default settings.
    pub fn new(docroot: impl Into<PathBuf>) -> Self {
        Self {
            docroot: Some(docroot.into()),
            ..Self::default()
        }
    }

    /// Set the rewrite strategy.
    #[must_use]
    pub fn with_rewrite(mut self, rewrite: impl Into<StrategyConfig>) -> Self {
        self.rewrite = Some(rewrite.into());
        self
    }

    /// Get the document root.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] if no document root was configured.
    pub fn docroot(&self) -> Result<&Path, ConfigError> {
        self.docroot
            .as_deref()
            .ok_or_else(|| ConfigError::missing_field("gateway.docroot"))
    }
}

/// Request header presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaderMode {
    /// Header names as the HTTP layer reports them, each value wrapped in a list.
    Raw,
    /// Title-cased names (`Content-Type`), repeated headers folded in arrival order.
    #[default]
    Capitalized,
}

/// CGI interpreter launch configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InterpreterConfig {
    /// Interpreter executable.
    #[serde(default = "defaults::program")]
    pub program: String,

    /// Extra arguments passed before any CGI processing.
    #[serde(default)]
    pub args: Vec<String>,

    /// Extra environment variables for every invocation.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            program: defaults::program(),
            args: Vec::new(),
            env: BTreeMap::new(),
        }
    }
}

/// Default value functions for serde.
mod defaults {
    pub const fn forward_host_header() -> bool {
        true
    }

    pub const fn max_body_bytes() -> usize {
        10 * 1024 * 1024
    }

    pub fn program() -> String {
        "php-cgi".to_string()
    }
}
