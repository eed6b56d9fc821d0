//! Shared application state.
//!
//! This module provides [`AppState`], which holds shared resources
//! across all HTTP request handlers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tower_http::services::ServeDir;

use script_gateway_common::{ConfigError, GatewayConfig, HeaderMode, InterpreterConfig};
use script_gateway_core::{CgiInterpreter, Interpreter, Rewriter, ScriptCache};

/// Shared state across all request handlers.
///
/// This struct is cloned for each request, so it uses `Arc` for shared data.
#[derive(Clone)]
pub struct AppState {
    /// Rewrite engine (built once from configuration).
    rewriter: Arc<Rewriter>,

    /// Script handle cache (resolved path -> handle).
    cache: Arc<ScriptCache>,

    /// Interpreter shared by every request.
    interpreter: Arc<dyn Interpreter>,

    /// Document root.
    docroot: PathBuf,

    /// Static file service rooted at the document root.
    static_files: ServeDir,

    /// Header presentation for the interpreter.
    header_mode: HeaderMode,

    /// Whether `Host` reaches the interpreter.
    forward_host: bool,

    /// Request body limit in bytes.
    max_body_bytes: usize,
}

impl AppState {
    /// Create new application state around an interpreter.
    ///
    /// # Errors
    ///
    /// Returns an error if the document root is missing or the rewrite
    /// configuration is invalid.
    pub fn new(
        config: &GatewayConfig,
        interpreter: Arc<dyn Interpreter>,
    ) -> Result<Self, ConfigError> {
        let docroot = config.docroot()?.to_path_buf();

        let rewriter = match &config.rewrite {
            Some(rewrite) => Rewriter::from_config(rewrite, &docroot)?,
            None => Rewriter::direct(&docroot),
        };

        Ok(Self {
            rewriter: Arc::new(rewriter),
            cache: Arc::new(ScriptCache::new()),
            interpreter,
            static_files: ServeDir::new(&docroot).append_index_html_on_directories(true),
            docroot,
            header_mode: config.header_mode,
            forward_host: config.forward_host_header,
            max_body_bytes: config.max_body_bytes,
        })
    }

    /// Create application state with the CGI interpreter backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn from_config(
        config: &GatewayConfig,
        interpreter: &InterpreterConfig,
    ) -> Result<Self, ConfigError> {
        let docroot = config.docroot()?;
        let cgi = CgiInterpreter::from_config(interpreter, docroot);
        Self::new(config, Arc::new(cgi))
    }

    /// Get the rewrite engine.
    pub fn rewriter(&self) -> &Rewriter {
        &self.rewriter
    }

    /// Get the script cache.
    pub fn cache(&self) -> &ScriptCache {
        &self.cache
    }

    /// Get the interpreter.
    pub fn interpreter(&self) -> &dyn Interpreter {
        self.interpreter.as_ref()
    }

    /// Get the document root.
    pub fn docroot(&self) -> &Path {
        &self.docroot
    }

    /// Get the static file service.
    pub fn static_files(&self) -> &ServeDir {
        &self.static_files
    }

    /// Get the header mode.
    pub fn header_mode(&self) -> HeaderMode {
        self.header_mode
    }

    /// Whether the `Host` header is forwarded.
    pub fn forward_host(&self) -> bool {
        self.forward_host
    }

    /// Get the request body limit.
    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("docroot", &self.docroot)
            .field("strategy", &self.rewriter.strategy())
            .field("interpreter", &self.interpreter.name())
            .field("scripts_cached", &self.cache.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use script_gateway_common::{Strategy, StrategyConfig};

    #[test]
    fn test_app_state_creation() {
        let config = GatewayConfig::new("/srv/www").with_rewrite(Strategy::Laravel);
        let state = AppState::from_config(&config, &InterpreterConfig::default()).unwrap();

        assert_eq!(state.docroot(), Path::new("/srv/www"));
        assert_eq!(state.rewriter().strategy(), Some(Strategy::Laravel));
        assert_eq!(state.interpreter().name(), "php-cgi");
        assert!(state.cache().is_empty());
    }

    #[test]
    fn test_no_rewrite_uses_direct_mode() {
        let config = GatewayConfig::new("/srv/www");
        let state = AppState::from_config(&config, &InterpreterConfig::default()).unwrap();
        assert_eq!(state.rewriter().strategy(), None);
    }

    #[test]
    fn test_missing_docroot_rejected() {
        let err =
            AppState::from_config(&GatewayConfig::default(), &InterpreterConfig::default())
                .unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { .. }));
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        let config =
            GatewayConfig::new("/srv/www").with_rewrite(StrategyConfig::Named("nope".into()));
        let err = AppState::from_config(&config, &InterpreterConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownStrategy { .. }));
    }
}
