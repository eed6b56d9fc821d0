//! Request handlers for the gateway.
//!
//! [`handle_request`] runs every non-reserved request through the rewrite
//! engine and dispatches on the decision: execute a script, redirect, serve
//! a static file, or answer not found.

use std::convert::Infallible;
use std::path::Path;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header::CONTENT_LENGTH;
use axum::http::request::Parts;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use http_body_util::LengthLimitError;
use tower::util::ServiceExt;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use script_gateway_common::Strategy;
use script_gateway_core::RouteDecision;

use crate::request::{HeaderOptions, build_execution_request};
use crate::response::GatewayResponse;
use crate::state::AppState;

/// Methods routed to the gateway.
const ALLOWED_METHODS: [Method; 7] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::PATCH,
    Method::OPTIONS,
    Method::TRACE,
];

/// Route one request through the rewrite engine.
///
/// This handler:
/// 1. Rejects methods outside the routed set
/// 2. Rewrites the path and re-attaches the query string
/// 3. Dispatches on the [`RouteDecision`]
#[instrument(skip_all, fields(method = %request.method(), path = %request.uri().path()))]
pub async fn handle_request(State(state): State<AppState>, request: Request) -> Response {
    let start = Instant::now();
    let request_id = Uuid::new_v4().to_string();

    if !ALLOWED_METHODS.contains(request.method()) {
        debug!(request_id = %request_id, "Method not routed");
        return method_not_allowed();
    }

    let (parts, body) = request.into_parts();

    let decision = state
        .rewriter()
        .rewrite(parts.uri.path())
        .await
        .with_query(parts.uri.query());

    info!(
        request_id = %request_id,
        decision = decision.kind(),
        "Handling request"
    );

    let response = match decision {
        RouteDecision::Execute {
            script_path,
            url,
            path_info,
        } => execute_script(&state, &parts, body, &script_path, &url, path_info).await,
        RouteDecision::Redirect { location } => {
            GatewayResponse::redirect(&location).into_axum_response()
        }
        RouteDecision::Static { .. } => serve_static(&state, parts, body).await,
        RouteDecision::NotFound => GatewayResponse::not_found().into_axum_response(),
    };

    info!(
        request_id = %request_id,
        status = response.status().as_u16(),
        duration_ms = start.elapsed().as_millis(),
        "Request completed"
    );

    response
}

/// Run a script and adapt its result.
async fn execute_script(
    state: &AppState,
    parts: &Parts,
    body: Body,
    script_path: &Path,
    url: &str,
    path_info: Option<String>,
) -> Response {
    let limit = state.max_body_bytes();
    if declared_length(parts).is_some_and(|len| len > limit as u64) {
        debug!(limit, "Declared body length over limit");
        return payload_too_large();
    }

    let body = match axum::body::to_bytes(body, limit).await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(error = %e, limit, "Failed to read request body");
            return if exceeds_limit(&e) {
                payload_too_large()
            } else {
                GatewayResponse::error(400, "Bad request").into_axum_response()
            };
        }
    };

    let handle = match state.cache().get_or_create(script_path).await {
        Ok(handle) => handle,
        Err(e) => return GatewayResponse::from_failure(&e).into_axum_response(),
    };

    let request = build_execution_request(
        parts,
        url,
        path_info,
        body,
        HeaderOptions {
            mode: state.header_mode(),
            forward_host: state.forward_host(),
        },
    );

    debug!(
        script = %handle.path().display(),
        url = %request.url,
        interpreter = state.interpreter().name(),
        "Executing script"
    );

    let response = match state.interpreter().execute(&handle, request).await {
        Ok(result) => GatewayResponse::from_execution(result),
        Err(e) => GatewayResponse::from_failure(&e),
    };
    response.into_axum_response()
}

/// Serve a file from the document root.
///
/// Script sources are never served as bytes, and the file layer's own 404s
/// become the standard not-found response.
async fn serve_static(state: &AppState, parts: Parts, body: Body) -> Response {
    if state.rewriter().is_script_path(parts.uri.path()) {
        debug!(path = %parts.uri.path(), "Refusing to serve script source");
        return GatewayResponse::not_found().into_axum_response();
    }

    let request = Request::from_parts(parts, body);
    let result: Result<_, Infallible> = state.static_files().clone().oneshot(request).await;

    match result {
        Ok(response) if response.status() == StatusCode::NOT_FOUND => {
            GatewayResponse::not_found().into_axum_response()
        }
        Ok(response) => response.map(Body::new),
        Err(never) => match never {},
    }
}

fn declared_length(parts: &Parts) -> Option<u64> {
    parts
        .headers
        .get(CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

/// Whether a body read failed on the length limit rather than the transport.
fn exceeds_limit(err: &axum::Error) -> bool {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = current {
        if e.is::<LengthLimitError>() {
            return true;
        }
        current = e.source();
    }
    false
}

fn payload_too_large() -> Response {
    GatewayResponse::error(413, "Payload too large").into_axum_response()
}

fn method_not_allowed() -> Response {
    let allow = ALLOWED_METHODS
        .iter()
        .map(Method::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    GatewayResponse::error(405, "Method not allowed")
        .with_header("allow", &allow)
        .into_axum_response()
}

/// Health check handler.
///
/// Returns 200 OK if the server is running.
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Readiness check handler.
///
/// Returns 200 once the document root is reachable, 503 otherwise.
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let docroot_ok = tokio::fs::metadata(state.docroot())
        .await
        .is_ok_and(|m| m.is_dir());

    let body = serde_json::json!({
        "status": if docroot_ok { "ready" } else { "unavailable" },
        "strategy": state.rewriter().strategy().map(Strategy::as_str),
        "interpreter": state.interpreter().name(),
        "scripts_cached": state.cache().len(),
    });

    let status = if docroot_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, axum::Json(body))
}

/// List cached scripts.
pub async fn list_scripts(State(state): State<AppState>) -> impl IntoResponse {
    let scripts: Vec<serde_json::Value> = state
        .cache()
        .handles()
        .iter()
        .map(|handle| {
            serde_json::json!({
                "path": handle.path().display().to_string(),
                "content_hash": handle.content_hash(),
                "bytes": handle.size(),
                "age_secs": handle.loaded_at().elapsed().as_secs(),
            })
        })
        .collect();

    axum::Json(serde_json::json!({
        "count": scripts.len(),
        "scripts": scripts,
    }))
}
