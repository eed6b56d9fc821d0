//! Interpreter interface.
//!
//! The interpreter is an external collaborator. The gateway hands it a
//! prepared [`ScriptHandle`] and an [`ExecutionRequest`], and gets back an
//! [`ExecutionResult`] or a rejection carrying a descriptive message.

use async_trait::async_trait;
use bytes::Bytes;

use script_gateway_common::ExecuteError;

use crate::{HeaderMultimap, ScriptHandle};

/// The interpreter's canonical input.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    /// HTTP method (GET, POST, etc.)
    pub method: String,
    /// Absolute URL, e.g. `http://localhost:8080/index.php/blog?page=2`.
    pub url: String,
    /// Request headers, every value wrapped in a list.
    pub headers: HeaderMultimap,
    /// Raw request body, never decoded.
    pub body: Bytes,
    /// PATH_INFO supplied by a `pathinfo` rewrite.
    pub path_info: Option<String>,
}

impl ExecutionRequest {
    /// Create a request with no headers and an empty body.
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: HeaderMultimap::new(),
            body: Bytes::new(),
            path_info: None,
        }
    }

    /// Set the headers.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMultimap) -> Self {
        self.headers = headers;
        self
    }

    /// Set the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Set PATH_INFO.
    #[must_use]
    pub fn with_path_info(mut self, path_info: Option<String>) -> Self {
        self.path_info = path_info;
        self
    }
}

/// The interpreter's structured output.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// HTTP status code.
    pub status: u16,
    /// Response headers; repeated names are kept.
    pub headers: HeaderMultimap,
    /// Response body.
    pub body: Bytes,
    /// Diagnostic output produced while running (e.g. stderr).
    pub log: String,
    /// Error raised by the script on an otherwise successful call.
    pub exception: Option<String>,
}

impl ExecutionResult {
    /// Create an empty result with the given status.
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HeaderMultimap::new(),
            body: Bytes::new(),
            log: String::new(),
            exception: None,
        }
    }

    /// Add a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Set the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Set the log text.
    #[must_use]
    pub fn with_log(mut self, log: impl Into<String>) -> Self {
        self.log = log.into();
        self
    }

    /// Set the soft exception.
    #[must_use]
    pub fn with_exception(mut self, exception: impl Into<String>) -> Self {
        self.exception = Some(exception.into());
        self
    }
}

impl Default for ExecutionResult {
    fn default() -> Self {
        Self::new(200)
    }
}

/// A script interpreter.
///
/// Implementations must be safe to call concurrently; the gateway shares one
/// instance across all requests and awaits each call before responding.
#[async_trait]
pub trait Interpreter: Send + Sync {
    /// Run `script` for `request`.
    ///
    /// # Errors
    ///
    /// Rejections are classified by the gateway: a message containing
    /// `Script not found` becomes a 404, anything else a 500 carrying the
    /// message.
    async fn execute(
        &self,
        script: &ScriptHandle,
        request: ExecutionRequest,
    ) -> Result<ExecutionResult, ExecuteError>;

    /// Name used in logs.
    fn name(&self) -> &str {
        "interpreter"
    }
}
