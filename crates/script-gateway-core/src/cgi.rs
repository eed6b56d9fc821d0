//! CGI interpreter backend.
//!
//! [`CgiInterpreter`] runs one process per request (typically `php-cgi`),
//! passing request metadata through CGI/1.1 environment variables and the
//! body on stdin, then parses the CGI response from stdout. Anything the
//! process writes to stderr becomes the result's log.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, instrument, warn};
use url::Url;

use script_gateway_common::{ExecuteError, InterpreterConfig};

use crate::{ExecutionRequest, ExecutionResult, HeaderMultimap, Interpreter, ScriptHandle};

const SERVER_SOFTWARE: &str = concat!("script-gateway/", env!("CARGO_PKG_VERSION"));

/// Interpreter that spawns a CGI executable per request.
#[derive(Debug, Clone)]
pub struct CgiInterpreter {
    program: String,
    args: Vec<String>,
    docroot: PathBuf,
    env: BTreeMap<String, String>,
}

impl CgiInterpreter {
    /// Create an interpreter running `program` for scripts under `docroot`.
    pub fn new(program: impl Into<String>, docroot: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            docroot: docroot.into(),
            env: BTreeMap::new(),
        }
    }

    /// Create from configuration.
    pub fn from_config(config: &InterpreterConfig, docroot: impl Into<PathBuf>) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            docroot: docroot.into(),
            env: config.env.clone(),
        }
    }

    /// Add command-line arguments.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Build the CGI environment for one request.
    fn environment(
        &self,
        script: &ScriptHandle,
        request: &ExecutionRequest,
    ) -> Result<Vec<(String, String)>, ExecuteError> {
        let url = Url::parse(&request.url).map_err(|e| {
            ExecuteError::interpreter(format!("Invalid request URL '{}': {e}", request.url))
        })?;

        let script_name = script_name(&self.docroot, script.path());
        let path_info = request
            .path_info
            .clone()
            .or_else(|| derive_path_info(url.path(), &script_name))
            .unwrap_or_default();
        let query = url.query().unwrap_or_default();
        let request_uri = match url.query() {
            Some(q) => format!("{}?{q}", url.path()),
            None => url.path().to_string(),
        };

        let mut env: Vec<(String, String)> = vec![
            ("GATEWAY_INTERFACE".into(), "CGI/1.1".into()),
            ("SERVER_SOFTWARE".into(), SERVER_SOFTWARE.into()),
            ("SERVER_PROTOCOL".into(), "HTTP/1.1".into()),
            ("SERVER_NAME".into(), url.host_str().unwrap_or("localhost").into()),
            (
                "SERVER_PORT".into(),
                url.port_or_known_default().unwrap_or(80).to_string(),
            ),
            ("REQUEST_SCHEME".into(), url.scheme().into()),
            ("REQUEST_METHOD".into(), request.method.clone()),
            ("REQUEST_URI".into(), request_uri),
            ("QUERY_STRING".into(), query.into()),
            ("DOCUMENT_ROOT".into(), self.docroot.display().to_string()),
            ("SCRIPT_FILENAME".into(), script.path().display().to_string()),
            ("SCRIPT_NAME".into(), script_name),
            ("PATH_INFO".into(), path_info),
            ("CONTENT_LENGTH".into(), request.body.len().to_string()),
            // php-cgi refuses to run without it when force-cgi-redirect is on.
            ("REDIRECT_STATUS".into(), "200".into()),
        ];

        if let Some(content_type) = request.headers.get_first("content-type") {
            env.push(("CONTENT_TYPE".into(), content_type.to_string()));
        }

        for (name, values) in request.headers.iter() {
            // httpoxy: a `Proxy` request header must never become HTTP_PROXY.
            if name.eq_ignore_ascii_case("proxy")
                || name.eq_ignore_ascii_case("content-type")
                || name.eq_ignore_ascii_case("content-length")
            {
                continue;
            }
            let key = format!("HTTP_{}", name.to_ascii_uppercase().replace('-', "_"));
            env.push((key, values.join(", ")));
        }

        if let Ok(path) = std::env::var("PATH") {
            env.push(("PATH".into(), path));
        }
        env.extend(self.env.iter().map(|(k, v)| (k.clone(), v.clone())));

        Ok(env)
    }
}

#[async_trait]
impl Interpreter for CgiInterpreter {
    #[instrument(skip_all, fields(script = %script.path().display(), method = %request.method))]
    async fn execute(
        &self,
        script: &ScriptHandle,
        request: ExecutionRequest,
    ) -> Result<ExecutionResult, ExecuteError> {
        let start = Instant::now();

        // The handle outlives the file; a deleted script is a missing script.
        if tokio::fs::metadata(script.path()).await.is_err() {
            return Err(ExecuteError::script_not_found(
                script.path().display().to_string(),
            ));
        }

        let env = self.environment(script, &request)?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .env_clear()
            .envs(env)
            .current_dir(script.path().parent().unwrap_or(self.docroot.as_path()))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ExecuteError::interpreter(format!(
                    "Failed to start interpreter '{}': {e}",
                    self.program
                ))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            let body = request.body.clone();
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(&body).await {
                    debug!(error = %e, "Interpreter closed stdin early");
                }
            });
        }

        let output = child.wait_with_output().await.map_err(|e| {
            ExecuteError::interpreter(format!("Interpreter '{}' failed: {e}", self.program))
        })?;

        let log = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() && output.stdout.is_empty() {
            let message = if log.trim().is_empty() {
                format!("Interpreter '{}' exited with {}", self.program, output.status)
            } else {
                log.trim().to_string()
            };
            return Err(ExecuteError::interpreter(message));
        }

        let (status, headers, body) = parse_cgi_response(&output.stdout)?;

        let mut result = ExecutionResult {
            status,
            headers,
            body,
            log,
            exception: None,
        };
        if !output.status.success() {
            warn!(status = %output.status, "Interpreter exited unsuccessfully");
            result.exception = Some(format!("Interpreter exited with {}", output.status));
        }

        debug!(
            status = result.status,
            duration_ms = start.elapsed().as_millis(),
            "CGI execution finished"
        );

        Ok(result)
    }

    fn name(&self) -> &str {
        &self.program
    }
}

/// URL path of `script` relative to `docroot`, e.g. `/blog/index.php`.
fn script_name(docroot: &Path, script: &Path) -> String {
    match script.strip_prefix(docroot) {
        Ok(relative) => {
            let parts: Vec<String> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            format!("/{}", parts.join("/"))
        }
        Err(_) => script
            .file_name()
            .map(|name| format!("/{}", name.to_string_lossy()))
            .unwrap_or_default(),
    }
}

/// PATH_INFO implied by a URL path that extends past the script name.
fn derive_path_info(url_path: &str, script_name: &str) -> Option<String> {
    url_path
        .strip_prefix(script_name)
        .filter(|rest| rest.starts_with('/'))
        .map(str::to_string)
}

/// Split a CGI response into status, headers, and body.
///
/// The `Status` header sets the status code and is not forwarded. Without
/// it, a `Location` header means 302 and anything else 200.
///
/// # Errors
///
/// Fails if the header block is not terminated by an empty line or the
/// status line is unreadable.
pub fn parse_cgi_response(output: &[u8]) -> Result<(u16, HeaderMultimap, Bytes), ExecuteError> {
    let (head, body) = split_head(output).ok_or_else(|| {
        ExecuteError::interpreter("Malformed CGI response: missing header terminator")
    })?;

    let head = String::from_utf8_lossy(head);
    let mut headers = HeaderMultimap::new();
    let mut status = None;

    for line in head.lines() {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let (name, value) = (name.trim(), value.trim());

        if name.eq_ignore_ascii_case("status") {
            let code = value
                .split_whitespace()
                .next()
                .and_then(|code| code.parse::<u16>().ok())
                .ok_or_else(|| {
                    ExecuteError::interpreter(format!("Malformed CGI status line: '{value}'"))
                })?;
            status = Some(code);
        } else {
            headers.append(name, value);
        }
    }

    let status = status.unwrap_or(if headers.contains("location") { 302 } else { 200 });

    Ok((status, headers, Bytes::copy_from_slice(body)))
}

fn split_head(output: &[u8]) -> Option<(&[u8], &[u8])> {
    let crlf = find(output, b"\r\n\r\n").map(|i| (i, 4));
    let lf = find(output, b"\n\n").map(|i| (i, 2));

    let (index, len) = match (crlf, lf) {
        (Some(a), Some(b)) => {
            if a.0 <= b.0 {
                a
            } else {
                b
            }
        }
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => return None,
    };

    Some((&output[..index], &output[index + len..]))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
