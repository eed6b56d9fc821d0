//! HTTP server lifecycle.
//!
//! [`GatewayServer::bind`] claims the listening socket up front so address
//! conflicts surface before any request is accepted; [`GatewayServer::run`]
//! then serves until a shutdown signal arrives.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{error, info};

use script_gateway_common::{ConfigError, GatewayError, ServerConfigFile};

use crate::router::build_router;
use crate::state::AppState;

const TEST_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Listener settings resolved from the `[server]` section.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server.
    pub bind_addr: SocketAddr,
    /// Per-request timeout applied by the router.
    pub request_timeout: Duration,
    /// Stop on SIGTERM/SIGINT after draining in-flight requests.
    pub graceful_shutdown: bool,
}

impl ServerConfig {
    /// Build from the `[server]` section of a config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOption`] if the bind address does not parse.
    pub fn from_file(file: &ServerConfigFile) -> Result<Self, ConfigError> {
        let bind_addr = file.bind_addr.parse().map_err(|e| {
            ConfigError::invalid_option(format!("bind_addr '{}': {e}", file.bind_addr))
        })?;

        Ok(Self {
            bind_addr,
            request_timeout: Duration::from_secs(file.request_timeout_secs),
            graceful_shutdown: file.graceful_shutdown,
        })
    }

    /// Replace the bind address, as the `--bind` flag does.
    #[must_use]
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }
}

/// Script gateway HTTP server.
///
/// # Example
///
/// ```ignore
/// use script_gateway_common::{ConfigFile, InterpreterConfig};
/// use script_gateway_server::{AppState, GatewayServer, ServerConfig};
///
/// let file = ConfigFile::from_file("gateway.toml")?;
/// let state = AppState::from_config(&file.gateway, &file.interpreter)?;
/// let config = ServerConfig::from_file(&file.server)?;
///
/// GatewayServer::bind(state, &config).await?.run().await?;
/// ```
pub struct GatewayServer {
    listener: TcpListener,
    app: Router,
    graceful_shutdown: bool,
}

impl GatewayServer {
    /// Bind the listener and build the router.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Bind`] if the address cannot be bound.
    pub async fn bind(state: AppState, config: &ServerConfig) -> Result<Self, GatewayError> {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(|e| GatewayError::Bind {
                addr: config.bind_addr.to_string(),
                source: e,
            })?;

        Ok(Self {
            listener,
            app: build_router(state, config.request_timeout),
            graceful_shutdown: config.graceful_shutdown,
        })
    }

    /// The address actually bound, which differs from the configured one
    /// when port 0 was requested.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Serve`] if the socket cannot report it.
    pub fn local_addr(&self) -> Result<SocketAddr, GatewayError> {
        self.listener.local_addr().map_err(GatewayError::Serve)
    }

    /// Serve until shutdown.
    ///
    /// With graceful shutdown enabled this returns after SIGTERM or SIGINT
    /// once in-flight requests finish; otherwise it serves until the
    /// process is killed.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Serve`] if the accept loop fails.
    pub async fn run(self) -> Result<(), GatewayError> {
        if self.graceful_shutdown {
            self.serve_until(shutdown_signal()).await
        } else {
            self.serve_until(std::future::pending()).await
        }
    }

    async fn serve_until<F>(self, shutdown: F) -> Result<(), GatewayError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.local_addr()?;
        info!(addr = %addr, graceful = self.graceful_shutdown, "Gateway listening");

        axum::serve(self.listener, self.app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(GatewayError::Serve)?;

        info!(addr = %addr, "Gateway stopped");
        Ok(())
    }

    /// Start a server on an ephemeral loopback port and return a handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the loopback listener cannot be bound.
    pub async fn start_test(state: AppState) -> Result<TestHandle, GatewayError> {
        let config = ServerConfig {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            request_timeout: TEST_REQUEST_TIMEOUT,
            graceful_shutdown: false,
        };
        let server = Self::bind(state.clone(), &config).await?;
        let addr = server.local_addr()?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(server.serve_until(async {
            let _ = shutdown_rx.await;
        }));

        Ok(TestHandle {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
            handle,
        })
    }
}

/// A running test server.
pub struct TestHandle {
    addr: SocketAddr,
    state: AppState,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<Result<(), GatewayError>>,
}

impl TestHandle {
    /// Get the server address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the server URL.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Shared state, for inspecting the script cache.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Stop accepting connections and wait for the server task.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        match self.handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "Test server failed"),
            Err(e) => error!(error = %e, "Test server task panicked"),
        }
    }
}

/// Resolve on SIGTERM or SIGINT.
///
/// If the handlers cannot be installed the failure is logged and the
/// future never resolves.
#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let (mut terminate, mut interrupt) =
        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(terminate), Ok(interrupt)) => (terminate, interrupt),
            (Err(e), _) | (_, Err(e)) => {
                error!(error = %e, "Failed to install signal handlers");
                return std::future::pending().await;
            }
        };

    let name = tokio::select! {
        _ = terminate.recv() => "SIGTERM",
        _ = interrupt.recv() => "SIGINT",
    };

    info!(signal = name, "Shutdown signal received");
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!(signal = "ctrl-c", "Shutdown signal received"),
        Err(e) => {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    }
}
