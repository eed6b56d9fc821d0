//! HTTP router configuration.
//!
//! This module provides functions to build the Axum router with all
//! necessary routes and middleware.

use std::time::Duration;

use axum::Router;
use axum::routing::get;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handler::{handle_request, health_check, list_scripts, readiness_check};
use crate::state::AppState;

/// Prefix for the gateway's own endpoints.
pub const RESERVED_PREFIX: &str = "/_gateway";

/// Build the main application router.
///
/// Routes:
/// - `GET /_gateway/health` - Health check
/// - `GET /_gateway/ready` - Readiness check
/// - `GET /_gateway/scripts` - List cached scripts
/// - everything else - Rewrite and dispatch
pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    // Introspection routes
    let gateway_routes = Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/scripts", get(list_scripts));

    Router::new()
        .nest(RESERVED_PREFIX, gateway_routes)
        .fallback(handle_request)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tempfile::TempDir;
    use tower::util::ServiceExt;

    use script_gateway_common::{ExecuteError, GatewayConfig, Strategy};
    use script_gateway_core::{ExecutionRequest, ExecutionResult, Interpreter, ScriptHandle};

    /// Echoes the request back as the response body.
    #[derive(Default)]
    struct EchoInterpreter {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Interpreter for EchoInterpreter {
        async fn execute(
            &self,
            script: &ScriptHandle,
            request: ExecutionRequest,
        ) -> Result<ExecutionResult, ExecuteError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let body = format!(
                "{} {} {} {}",
                script.path().file_name().unwrap().to_string_lossy(),
                request.method,
                request.url,
                request.path_info.unwrap_or_default(),
            );
            Ok(ExecutionResult::new(200)
                .with_header("Content-Type", "text/plain")
                .with_body(body))
        }
    }

    fn docroot() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.php"), "<?php").unwrap();
        std::fs::write(dir.path().join("about.php"), "<?php").unwrap();
        std::fs::write(dir.path().join("style.css"), "body { color: blue; }").unwrap();
        dir
    }

    fn setup_router(root: &TempDir, strategy: Option<Strategy>) -> (Router, Arc<EchoInterpreter>) {
        let mut config = GatewayConfig::new(root.path());
        if let Some(strategy) = strategy {
            config = config.with_rewrite(strategy);
        }
        let interpreter = Arc::new(EchoInterpreter::default());
        let state = AppState::new(&config, interpreter.clone()).unwrap();
        (build_router(state, Duration::from_secs(30)), interpreter)
    }

    async fn body_string(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header("host", "example.com")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let root = docroot();
        let (app, _) = setup_router(&root, None);

        let response = app.oneshot(get_request("/_gateway/health")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_readiness_check() {
        let root = docroot();
        let (app, _) = setup_router(&root, Some(Strategy::Laravel));

        let response = app.oneshot(get_request("/_gateway/ready")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["status"], "ready");
        assert_eq!(body["strategy"], "laravel");
    }

    #[tokio::test]
    async fn test_front_controller_execution() {
        let root = docroot();
        let (app, interpreter) = setup_router(&root, Some(Strategy::Laravel));

        let response = app
            .oneshot(get_request("/blog/post/123?page=2"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_string(response).await,
            "index.php GET http://example.com/index.php/blog/post/123?page=2 "
        );
        assert_eq!(interpreter.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_pathinfo_execution() {
        let root = docroot();
        let config = GatewayConfig::new(root.path()).with_rewrite(
            script_gateway_common::StrategyConfig::Inline {
                base: Some("front-controller".into()),
                options: Some(script_gateway_common::RewriteOptions {
                    rewrite_method: Some(script_gateway_common::RewriteMethod::PathInfo),
                    ..Default::default()
                }),
            },
        );
        let state = AppState::new(&config, Arc::new(EchoInterpreter::default())).unwrap();
        let app = build_router(state, Duration::from_secs(30));

        let response = app.oneshot(get_request("/api/users")).await.unwrap();

        assert_eq!(
            body_string(response).await,
            "index.php GET http://example.com/index.php /api/users"
        );
    }

    #[tokio::test]
    async fn test_pretty_urls_redirect() {
        let root = docroot();
        let (app, interpreter) = setup_router(&root, Some(Strategy::PrettyUrls));

        let response = app.oneshot(get_request("/about.php?x=1")).await.unwrap();

        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(response.headers()["location"], "/about?x=1");
        assert_eq!(interpreter.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_static_file_served() {
        let root = docroot();
        let (app, interpreter) = setup_router(&root, Some(Strategy::Laravel));

        let response = app.oneshot(get_request("/style.css")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "body { color: blue; }");
        assert_eq!(interpreter.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_static_miss_is_not_found() {
        let root = docroot();
        let (app, _) = setup_router(&root, Some(Strategy::ExtensionHiding));

        let response = app.oneshot(get_request("/contact")).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body_string(response).await.contains("Not found"));
    }

    #[tokio::test]
    async fn test_script_source_never_served() {
        let root = docroot();
        // nothing strategy routes unmatched paths to the static layer
        let config = GatewayConfig::new(root.path()).with_rewrite(
            script_gateway_common::StrategyConfig::Inline {
                base: Some("custom".into()),
                options: Some(script_gateway_common::RewriteOptions {
                    rewrite_method: Some(script_gateway_common::RewriteMethod::Nothing),
                    ..Default::default()
                }),
            },
        );
        let state = AppState::new(&config, Arc::new(EchoInterpreter::default())).unwrap();
        let app = build_router(state, Duration::from_secs(30));

        let response = app.oneshot(get_request("/ghost.php")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_php_source_hidden_under_other_extension() {
        let root = docroot();
        std::fs::write(root.path().join("index.php5"), "<?php").unwrap();
        std::fs::write(root.path().join("config.php"), "<?php $password = 'x';").unwrap();
        let config = GatewayConfig::new(root.path()).with_rewrite(
            script_gateway_common::StrategyConfig::Inline {
                base: Some("laravel".into()),
                options: Some(script_gateway_common::RewriteOptions {
                    extension: Some(".php5".into()),
                    front_controller: Some("index.php5".into()),
                    ..Default::default()
                }),
            },
        );
        let state = AppState::new(&config, Arc::new(EchoInterpreter::default())).unwrap();
        let app = build_router(state, Duration::from_secs(30));

        let response = app.clone().oneshot(get_request("/config.php")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(!body_string(response).await.contains("password"));

        let response = app.oneshot(get_request("/style.css")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_declared_oversized_body_rejected() {
        let root = docroot();
        let mut config = GatewayConfig::new(root.path()).with_rewrite(Strategy::Laravel);
        config.max_body_bytes = 8;
        let interpreter = Arc::new(EchoInterpreter::default());
        let state = AppState::new(&config, interpreter.clone()).unwrap();
        let app = build_router(state, Duration::from_secs(30));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/upload")
                    .header("host", "example.com")
                    .header("content-length", "64")
                    .body(Body::from(vec![b'x'; 64]))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(interpreter.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_body_within_limit_accepted() {
        let root = docroot();
        let mut config = GatewayConfig::new(root.path()).with_rewrite(Strategy::Laravel);
        config.max_body_bytes = 8;
        let state = AppState::new(&config, Arc::new(EchoInterpreter::default())).unwrap();
        let app = build_router(state, Duration::from_secs(30));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/upload")
                    .header("host", "example.com")
                    .body(Body::from("12345678"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_traversal_not_found() {
        let root = docroot();
        let (app, interpreter) = setup_router(&root, Some(Strategy::Laravel));

        let response = app
            .oneshot(get_request("/%2e%2e/%2e%2e/etc/passwd"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(interpreter.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_method_not_allowed() {
        let root = docroot();
        let (app, _) = setup_router(&root, Some(Strategy::Laravel));

        let response = app
            .oneshot(
                Request::builder()
                    .method("HEAD")
                    .uri("/")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_list_scripts_after_execution() {
        let root = docroot();
        let (app, _) = setup_router(&root, None);

        let response = app.clone().oneshot(get_request("/about.php")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.oneshot(get_request("/_gateway/scripts")).await.unwrap();
        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["count"], 1);
        assert_eq!(body["scripts"][0]["bytes"], 5);
        assert!(
            body["scripts"][0]["path"]
                .as_str()
                .unwrap()
                .ends_with("about.php")
        );
    }
}
