//! HTTP API module.
//!
//! Axum server exposing pipeline execution and the named-pipeline registry,
//! plus the SSE log stream.

pub mod logs;
pub mod server;
pub mod types;

pub use logs::*;
pub use server::start_server;
pub use types::*;
