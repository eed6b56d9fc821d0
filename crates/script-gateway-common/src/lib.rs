//! Common types, errors, and configuration for script-gateway.
//!
//! This crate provides shared functionality used across the workspace:
//! - Error types using `thiserror` for type-safe error handling
//! - Rewrite strategy selection and option types
//! - Configuration structures and TOML file loading

pub mod config;
pub mod config_file;
pub mod error;
pub mod strategy;

pub use config::{GatewayConfig, HeaderMode, InterpreterConfig};
pub use config_file::{ConfigFile, ServerConfigFile};
pub use error::{ConfigError, ExecuteError, GatewayError};
pub use strategy::{RewriteMethod, RewriteOptions, Strategy, StrategyConfig};
