//! HTTP server for script-gateway.
//!
//! This crate puts the rewrite engine and interpreter behind HTTP. It handles:
//!
//! - Routing every path through the configured rewrite strategy
//! - Request/response transformation for the interpreter
//! - Static files and redirects
//! - Health, readiness, and cache introspection under `/_gateway`
//!
//! # Quick Start
//!
//! ```ignore
//! use script_gateway_common::{GatewayConfig, InterpreterConfig, ServerConfigFile, Strategy};
//! use script_gateway_server::{AppState, GatewayServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = GatewayConfig::new("./public").with_rewrite(Strategy::WordPress);
//!     let state = AppState::from_config(&config, &InterpreterConfig::default())?;
//!     let server_config = ServerConfig::from_file(&ServerConfigFile::default())?;
//!
//!     GatewayServer::bind(state, &server_config).await?.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod handler;
pub mod request;
pub mod response;
pub mod router;
pub mod server;
pub mod state;

pub use response::GatewayResponse;
pub use server::{GatewayServer, ServerConfig, TestHandle};
pub use state::AppState;
