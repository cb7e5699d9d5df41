//! Error types for the tabpipe transformation engine.
//!
//! This module defines a hierarchy of error types:
//!
//! - [`ExprError`] - expression parse/evaluation errors
//! - [`OpError`] - per-operation errors without step context
//! - [`PipelineError`] - top-level pipeline errors carrying step context
//! - [`StoreError`] - named-pipeline registry errors
//! - [`ServerError`] - HTTP server errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use thiserror::Error;

// =============================================================================
// Expression Errors
// =============================================================================

/// Errors from the expression parser/evaluator.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExprError {
    /// Expression failed to parse.
    #[error("parse error in '{expr}': {message}")]
    Parse { expr: String, message: String },

    /// Expression references a column that does not exist.
    #[error("unknown column '{name}' in '{expr}'")]
    UnknownColumn { expr: String, name: String },

    /// Expression calls a function outside the allow-list.
    #[error("unknown function '{name}' in '{expr}'")]
    UnknownFunction { expr: String, name: String },

    /// Function called with the wrong number of arguments.
    #[error("function '{name}' expects {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: String,
        got: usize,
    },

    /// Condition expression did not evaluate to a boolean mask.
    #[error("condition '{expr}' did not produce a boolean mask")]
    NotBoolean { expr: String },

    /// Expression does not resolve to a series callable.
    #[error("'{expr}' does not resolve to a series callable")]
    NotCallable { expr: String },

    /// Operand types incompatible with the operator or function.
    #[error("type error in '{expr}': {message}")]
    Type { expr: String, message: String },
}

// =============================================================================
// Operation Errors (step context attached by the parser/executor)
// =============================================================================

/// Errors raised while building or applying a single operation.
#[derive(Debug, Error)]
pub enum OpError {
    /// Step specification is structurally invalid (missing parameter,
    /// mismatched paired lists, unsupported method tag).
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A condition or value expression failed.
    #[error(transparent)]
    Expr(#[from] ExprError),

    /// Referenced column absent from the dataset where the operation
    /// cannot proceed without it.
    #[error("unknown column '{0}'")]
    MissingColumn(String),

    /// A transform raised during application.
    #[error("failed on column '{column}': {message}")]
    Execution { column: String, message: String },
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level pipeline errors.
///
/// This is the main error type returned by the pipeline parser and executor.
/// Operation errors are wrapped with the position and kind of the step that
/// produced them.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// An operation failed while being built or applied.
    #[error("step {step} ({kind}): {source}")]
    Step {
        step: usize,
        kind: &'static str,
        source: OpError,
    },

    /// The pipeline specification itself could not be decoded.
    #[error("invalid pipeline specification: {0}")]
    Spec(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    /// Attach step position and kind to an operation error.
    pub fn at_step(step: usize, kind: &'static str, source: OpError) -> Self {
        PipelineError::Step { step, kind, source }
    }
}

// =============================================================================
// Store Errors
// =============================================================================

/// Errors from the named-pipeline registry.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Insertion rejected: the name is already taken.
    #[error("pipeline name '{0}' already exists")]
    Duplicate(String),

    /// Exact-name lookup found nothing.
    #[error("pipeline '{0}' not found")]
    NotFound(String),

    /// IO error.
    #[error("store IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("store JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Pipeline error.
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Invalid request.
    #[error("invalid request: {0}")]
    BadRequest(String),

    /// Server internal error.
    #[error("internal server error: {0}")]
    Internal(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for expression evaluation.
pub type ExprResult<T> = Result<T, ExprError>;

/// Result type for single-operation work.
pub type OpResult<T> = Result<T, OpError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type for registry operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        // ExprError -> OpError
        let expr_err = ExprError::UnknownColumn {
            expr: "x > 1".into(),
            name: "x".into(),
        };
        let op_err: OpError = expr_err.into();
        assert!(op_err.to_string().contains("unknown column 'x'"));

        // OpError -> PipelineError with step context
        let pipeline_err = PipelineError::at_step(2, "filter", op_err);
        let msg = pipeline_err.to_string();
        assert!(msg.contains("step 2"));
        assert!(msg.contains("filter"));
        assert!(msg.contains("'x'"));
    }

    #[test]
    fn test_store_error_format() {
        let err = StoreError::Duplicate("daily-report".into());
        assert!(err.to_string().contains("daily-report"));
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_config_error_format() {
        let err = OpError::Config("'tags' and 'conditions' must have the same length".into());
        let pipeline_err = PipelineError::at_step(0, "tag", err);
        assert!(pipeline_err.to_string().contains("same length"));
    }
}
