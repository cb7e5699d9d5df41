//! # Tabpipe - declarative transformation pipelines over tabular data
//!
//! Tabpipe executes JSON-described pipelines over tabular datasets: a
//! client supplies a delimited-text file and an ordered list of operations
//! (`filter`, `rename`, `aggregate`, `sort`, `tag`, `col_assign`,
//! `col_apply`, `series_transform`); the engine compiles each step and
//! applies them in sequence.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  CSV bytes  │────▶│   Parser    │────▶│  Pipeline   │────▶│ {columns,   │
//! │  (any enc)  │     │ (auto-enc)  │     │ (ops + expr)│     │  rows} JSON │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use tabpipe::{ingest_str, Pipeline};
//!
//! let frame = ingest_str("region;units\nn;10\ns;20\nn;30", ';').unwrap();
//! let pipeline = Pipeline::from_json_str(
//!     r#"[{"type": "filter", "params": {"condition": "units > 15"}}]"#,
//! ).unwrap();
//! let out = pipeline.execute(&frame).unwrap();
//! assert_eq!(out.n_rows(), 2);
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`frame`] - In-memory dataset with a stable row index
//! - [`expr`] - Closed-grammar expression evaluator
//! - [`ops`] - Step specifications, operations, and the executor
//! - [`parser`] - Delimited-text ingestion with auto-detection
//! - [`store`] - Named-pipeline registry
//! - [`api`] - HTTP API server

// Core modules
pub mod error;
pub mod frame;

// Expressions
pub mod expr;

// Operations
pub mod ops;

// Parsing
pub mod parser;

// Storage
pub mod store;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ExprError, ExprResult, OpError, OpResult, PipelineError, PipelineResult, ServerError,
    ServerResult, StoreError, StoreResult,
};

// =============================================================================
// Re-exports - Frame
// =============================================================================

pub use frame::{compare_values, Column, Frame};

// =============================================================================
// Re-exports - Expressions
// =============================================================================

pub use expr::{CompiledExpr, SeriesFn};

// =============================================================================
// Re-exports - Operations
// =============================================================================

pub use ops::{operations_description, parse_steps, Operation, Pipeline, PipelineSpec, StepSpec};

// =============================================================================
// Re-exports - CSV Parsing
// =============================================================================

pub use parser::{
    decode_content, detect_delimiter, detect_encoding, ingest_bytes_auto, ingest_file_auto,
    ingest_str, CsvError, IngestResult,
};

// =============================================================================
// Re-exports - Store
// =============================================================================

pub use store::{PipelineRegistry, StoredPipeline};

// =============================================================================
// Re-exports - API
// =============================================================================

pub use api::types::{error_response, RunResponse, SavePipelineRequest, SavePipelineResponse};

// Server
pub mod server {
    pub use crate::api::server::start_server;
}
