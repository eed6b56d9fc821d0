//! HTTP response conversion from script execution.
//!
//! This module provides [`GatewayResponse`] and the mapping from
//! interpreter results and failures to HTTP responses.

use axum::body::Body;
use axum::http::header::LOCATION;
use axum::http::{HeaderName, HeaderValue, Response, StatusCode};
use bytes::Bytes;
use tracing::{error, info, warn};

use script_gateway_common::ExecuteError;
use script_gateway_core::ExecutionResult;

/// Buffered HTTP response.
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers in order; repeated names are kept
    pub headers: Vec<(String, String)>,
    /// Response body
    pub body: Bytes,
}

impl GatewayResponse {
    /// Create a simple text response.
    pub fn text(status: u16, body: &str) -> Self {
        Self {
            status,
            headers: vec![(
                "content-type".to_string(),
                "text/plain; charset=utf-8".to_string(),
            )],
            body: Bytes::copy_from_slice(body.as_bytes()),
        }
    }

    /// Create a JSON response.
    pub fn json(status: u16, body: &str) -> Self {
        Self {
            status,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: Bytes::copy_from_slice(body.as_bytes()),
        }
    }

    /// Create an error response with JSON body.
    pub fn error(status: u16, message: &str) -> Self {
        let body = serde_json::json!({
            "error": message
        })
        .to_string();
        Self::json(status, &body)
    }

    /// Create an empty response with just a status code.
    pub fn empty(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// The standard not-found response.
    pub fn not_found() -> Self {
        Self::error(404, "Not found")
    }

    /// A permanent redirect to `location`, used verbatim.
    pub fn redirect(location: &str) -> Self {
        Self::empty(301).with_header(LOCATION.as_str(), location)
    }

    /// Add a header to the response.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Map an interpreter result to a response.
    ///
    /// Log text is emitted at `info` and a soft exception at `warn`; neither
    /// changes the response the script produced.
    pub fn from_execution(result: ExecutionResult) -> Self {
        if !result.log.is_empty() {
            info!(log = %result.log.trim_end(), "Interpreter output");
        }
        if let Some(exception) = &result.exception {
            warn!(exception = %exception, "Script raised an exception");
        }

        let status = if (100..=599).contains(&result.status) {
            result.status
        } else {
            warn!(status = result.status, "Interpreter returned an invalid status");
            500
        };

        Self {
            status,
            headers: result
                .headers
                .iter_flat()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
            body: result.body,
        }
    }

    /// Map a failed execute call to a response.
    ///
    /// Script-not-found failures get the standard 404; anything else is a
    /// 500 carrying the raw message.
    pub fn from_failure(err: &ExecuteError) -> Self {
        if err.is_script_not_found() {
            warn!(error = %err, "Script not found");
            return Self::not_found();
        }

        error!(error = %err, "Interpreter failed");
        Self::text(500, &err.to_string())
    }

    /// Convert to Axum response.
    pub fn into_axum_response(self) -> Response<Body> {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = status;

        let headers = response.headers_mut();
        for (name, value) in &self.headers {
            match (
                HeaderName::try_from(name.as_str()),
                HeaderValue::try_from(value.as_str()),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.append(name, value);
                }
                _ => warn!(header = %name, "Dropping invalid response header"),
            }
        }

        response
    }
}
