//! HTTP request conversion for script execution.
//!
//! This module turns an inbound request plus a rewrite decision into the
//! interpreter's [`ExecutionRequest`].

use axum::http::header::HOST;
use axum::http::request::Parts;
use bytes::Bytes;

use script_gateway_common::HeaderMode;
use script_gateway_core::{ExecutionRequest, HeaderMultimap};

const DEFAULT_SCHEME: &str = "http";
const DEFAULT_HOST: &str = "localhost";

/// Build the absolute URL presented to the interpreter.
///
/// The result is `scheme://host` followed by `path_and_query`, with no
/// normalization: an explicit default port such as `h:80` is kept.
pub fn absolute_url(path_and_query: &str, scheme: Option<&str>, host: Option<&str>) -> String {
    let scheme = scheme.filter(|s| !s.is_empty()).unwrap_or(DEFAULT_SCHEME);
    let host = host.filter(|h| !h.is_empty()).unwrap_or(DEFAULT_HOST);
    format!("{scheme}://{host}{path_and_query}")
}

/// The request's host: the `Host` header, else the URI authority.
pub fn request_host(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .or_else(|| parts.uri.authority().map(|a| a.as_str().to_string()))
}

/// Build the interpreter header set from the request's native header entries.
pub fn request_headers(parts: &Parts, mode: HeaderMode, forward_host: bool) -> HeaderMultimap {
    let entries = parts.headers.iter().map(|(name, value)| {
        (
            name.as_str(),
            String::from_utf8_lossy(value.as_bytes()).into_owned(),
        )
    });
    HeaderMultimap::from_request(entries, mode, forward_host)
}

/// Header handling options for [`build_execution_request`].
#[derive(Debug, Clone, Copy)]
pub struct HeaderOptions {
    /// How names are presented.
    pub mode: HeaderMode,
    /// Whether `Host` is kept.
    pub forward_host: bool,
}

/// Convert request parts into an [`ExecutionRequest`].
///
/// # Arguments
///
/// * `parts` - The inbound request head
/// * `url` - The rewritten URL (path and query)
/// * `path_info` - PATH_INFO from a `pathinfo` rewrite
/// * `body` - The raw request body, passed through untouched
/// * `options` - Header presentation
pub fn build_execution_request(
    parts: &Parts,
    url: &str,
    path_info: Option<String>,
    body: Bytes,
    options: HeaderOptions,
) -> ExecutionRequest {
    let host = request_host(parts);
    let absolute = absolute_url(url, parts.uri.scheme_str(), host.as_deref());

    ExecutionRequest::new(parts.method.as_str(), absolute)
        .with_headers(request_headers(parts, options.mode, options.forward_host))
        .with_body(body)
        .with_path_info(path_info)
}
