//! End-to-end HTTP tests for script-gateway-server.
//!
//! Each test starts a real server on an ephemeral port and talks to it with
//! `reqwest`:
//! - Request bodies and headers reach the interpreter intact
//! - Interpreter failures are classified into 404 and 500
//! - A CGI program's output is relayed with repeated headers

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use script_gateway_common::{ExecuteError, GatewayConfig, Strategy};
use script_gateway_core::{ExecutionRequest, ExecutionResult, Interpreter, ScriptHandle};
use script_gateway_server::{AppState, GatewayServer};

/// Records the last request and answers with a fixed outcome.
struct RecordingInterpreter {
    last: Mutex<Option<ExecutionRequest>>,
    outcome: fn() -> Result<ExecutionResult, ExecuteError>,
}

impl RecordingInterpreter {
    fn new(outcome: fn() -> Result<ExecutionResult, ExecuteError>) -> Arc<Self> {
        Arc::new(Self {
            last: Mutex::new(None),
            outcome,
        })
    }

    fn last_request(&self) -> ExecutionRequest {
        self.last.lock().unwrap().clone().expect("interpreter was not called")
    }
}

#[async_trait]
impl Interpreter for RecordingInterpreter {
    async fn execute(
        &self,
        _script: &ScriptHandle,
        request: ExecutionRequest,
    ) -> Result<ExecutionResult, ExecuteError> {
        *self.last.lock().unwrap() = Some(request);
        (self.outcome)()
    }
}

fn ok_result() -> Result<ExecutionResult, ExecuteError> {
    Ok(ExecutionResult::new(200)
        .with_header("Set-Cookie", "a=1")
        .with_header("Set-Cookie", "b=2")
        .with_body("ok"))
}

fn docroot() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.php"), "<?php").unwrap();
    std::fs::write(dir.path().join("robots.txt"), "User-agent: *").unwrap();
    dir
}

async fn start(
    root: &TempDir,
    interpreter: Arc<dyn Interpreter>,
) -> script_gateway_server::TestHandle {
    let config = GatewayConfig::new(root.path()).with_rewrite(Strategy::Laravel);
    let state = AppState::new(&config, interpreter).unwrap();
    GatewayServer::start_test(state).await.unwrap()
}

// ============================================================================
// Test: Request Adaptation
// ============================================================================

#[tokio::test]
async fn test_post_body_reaches_interpreter_unmodified() {
    let root = docroot();
    let interpreter = RecordingInterpreter::new(ok_result);
    let server = start(&root, interpreter.clone()).await;

    let body: &[u8] = b"\x00\x01{\"not\": json at all\xff";
    let response = reqwest::Client::new()
        .post(format!("{}/api/items?draft=1", server.url()))
        .header("Content-Type", "application/json")
        .header("x-custom", "one")
        .header("x-custom", "two")
        .body(body.to_vec())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let cookies: Vec<&str> = response
        .headers()
        .get_all("set-cookie")
        .iter()
        .map(|v| v.to_str().unwrap())
        .collect();
    assert_eq!(cookies, vec!["a=1", "b=2"]);

    let request = interpreter.last_request();
    assert_eq!(request.method, "POST");
    assert_eq!(
        request.url,
        format!("http://{}/index.php/api/items?draft=1", server.addr())
    );
    assert_eq!(request.body.as_ref(), body);
    assert_eq!(
        request.headers.get_first("Content-Type"),
        Some("application/json")
    );
    assert_eq!(
        request.headers.get("X-Custom").unwrap(),
        &["one".to_string(), "two".to_string()]
    );
    assert!(request.headers.iter().any(|(name, _)| name == "X-Custom"));

    server.shutdown().await;
}

#[tokio::test]
async fn test_oversized_body_rejected() {
    let root = docroot();
    let interpreter = RecordingInterpreter::new(ok_result);
    let mut config = GatewayConfig::new(root.path()).with_rewrite(Strategy::Laravel);
    config.max_body_bytes = 16;
    let state = AppState::new(&config, interpreter.clone()).unwrap();
    let server = GatewayServer::start_test(state).await.unwrap();

    let response = reqwest::Client::new()
        .post(format!("{}/upload", server.url()))
        .body(vec![b'x'; 1024])
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 413);
    assert!(interpreter.last.lock().unwrap().is_none());

    server.shutdown().await;
}

// ============================================================================
// Test: Failure Classification
// ============================================================================

#[tokio::test]
async fn test_script_not_found_rejection_is_404() {
    let root = docroot();
    let interpreter = RecordingInterpreter::new(|| {
        Err(ExecuteError::interpreter(
            "Script not found: /srv/www/index.php",
        ))
    });
    let server = start(&root, interpreter).await;

    let response = reqwest::get(format!("{}/anything", server.url()))
        .await
        .unwrap();

    assert_eq!(response.status(), 404);

    server.shutdown().await;
}

#[tokio::test]
async fn test_interpreter_fault_is_500_with_message() {
    let root = docroot();
    let interpreter = RecordingInterpreter::new(|| {
        Err(ExecuteError::interpreter(
            "PHP Parse error: syntax error in index.php on line 3",
        ))
    });
    let server = start(&root, interpreter).await;

    let response = reqwest::get(format!("{}/anything", server.url()))
        .await
        .unwrap();

    assert_eq!(response.status(), 500);
    assert_eq!(
        response.text().await.unwrap(),
        "PHP Parse error: syntax error in index.php on line 3"
    );

    server.shutdown().await;
}

#[tokio::test]
async fn test_soft_exception_keeps_script_response() {
    let root = docroot();
    let interpreter = RecordingInterpreter::new(|| {
        Ok(ExecutionResult::new(418)
            .with_body("teapot")
            .with_log("Notice: something")
            .with_exception("Warning: undefined index"))
    });
    let server = start(&root, interpreter).await;

    let response = reqwest::get(format!("{}/brew", server.url()))
        .await
        .unwrap();

    assert_eq!(response.status(), 418);
    assert_eq!(response.text().await.unwrap(), "teapot");

    server.shutdown().await;
}

// ============================================================================
// Test: Static Files and Cache
// ============================================================================

#[tokio::test]
async fn test_static_file_bypasses_interpreter() {
    let root = docroot();
    let interpreter = RecordingInterpreter::new(ok_result);
    let server = start(&root, interpreter.clone()).await;

    let response = reqwest::get(format!("{}/robots.txt", server.url()))
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "User-agent: *");
    assert!(interpreter.last.lock().unwrap().is_none());
    assert!(server.state().cache().is_empty());

    server.shutdown().await;
}

#[tokio::test]
async fn test_many_requests_share_one_handle() {
    let root = docroot();
    let server = start(&root, RecordingInterpreter::new(ok_result)).await;
    let client = reqwest::Client::new();

    let requests = (0..16).map(|i| {
        let client = client.clone();
        let url = format!("{}/page/{i}", server.url());
        async move { client.get(url).send().await.unwrap().status() }
    });
    for status in spawn_all(requests).await {
        assert_eq!(status, 200);
    }

    assert_eq!(server.state().cache().len(), 1);
    assert_eq!(server.state().cache().load_count(), 1);

    server.shutdown().await;
}

async fn spawn_all<F>(futures: impl Iterator<Item = F>) -> Vec<F::Output>
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    let handles: Vec<_> = futures.map(tokio::spawn).collect();
    let mut outputs = Vec::with_capacity(handles.len());
    for handle in handles {
        outputs.push(handle.await.unwrap());
    }
    outputs
}

// ============================================================================
// Test: CGI Backend
// ============================================================================

#[cfg(unix)]
#[tokio::test]
async fn test_cgi_program_output_is_relayed() {
    use script_gateway_core::CgiInterpreter;

    let root = docroot();
    let script = r#"printf 'Status: 201 Created\r\nContent-Type: text/plain\r\nSet-Cookie: a=1\r\nSet-Cookie: b=2\r\n\r\n'; printf '%s %s %s|' "$REQUEST_METHOD" "$SCRIPT_NAME" "$PATH_INFO"; cat"#;
    let interpreter = CgiInterpreter::new("/bin/sh", root.path()).with_args(["-c", script]);
    let server = start(&root, Arc::new(interpreter)).await;

    let response = reqwest::Client::new()
        .put(format!("{}/items/7", server.url()))
        .body("payload")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 201);
    let cookies: Vec<&str> = response
        .headers()
        .get_all("set-cookie")
        .iter()
        .map(|v| v.to_str().unwrap())
        .collect();
    assert_eq!(cookies, vec!["a=1", "b=2"]);
    assert_eq!(
        response.text().await.unwrap(),
        "PUT /index.php /items/7|payload"
    );

    server.shutdown().await;
}
