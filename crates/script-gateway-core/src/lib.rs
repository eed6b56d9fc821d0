//! Core routing and execution plumbing for script-gateway.
//!
//! This crate provides everything between "a request path arrived" and
//! "the interpreter produced a result":
//! - [`Rewriter`]: URL rewrite strategies producing a [`RouteDecision`]
//! - [`HeaderMultimap`]: Ordered, case-insensitive header multimap
//! - [`Interpreter`]: The execution interface, with [`ExecutionRequest`] and
//!   [`ExecutionResult`]
//! - [`ScriptCache`]: One [`ScriptHandle`] per resolved script path
//! - [`CgiInterpreter`]: An [`Interpreter`] backed by a CGI executable
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                      Rewriter                           │
//! │  (Built once from configuration, shared)                │
//! │  path ──► Execute | Redirect | Static | NotFound        │
//! └─────────────────────────────────────────────────────────┘
//!                            │ Execute
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                     ScriptCache                         │
//! │  (Process-wide, single-flight per path)                 │
//! │  - Source read once                                     │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │          Interpreter::execute(handle, request)          │
//! │  (Per-request)                                          │
//! │  - status, headers, body, log, exception                │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod cgi;
pub mod headers;
pub mod interpreter;
pub mod lookup;
pub mod rewrite;

pub use cache::{ScriptCache, ScriptHandle};
pub use cgi::CgiInterpreter;
pub use headers::{HeaderMultimap, canonicalize_header_name};
pub use interpreter::{ExecutionRequest, ExecutionResult, Interpreter};
pub use lookup::PathStatus;
pub use rewrite::{RouteDecision, Rewriter};
