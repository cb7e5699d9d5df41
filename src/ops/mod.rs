//! Pipeline operation DSL
//!
//! A pipeline is an ordered JSON list of steps, each `{"type": ...,
//! "params": {...}}` over a closed kind set. [`spec`] holds the serde wire
//! types and the pipeline parser, [`operations`] the compiled operations and
//! their per-kind semantics, [`executor`] the sequential runner.

pub mod executor;
pub mod operations;
pub mod spec;

pub use executor::Pipeline;
pub use operations::Operation;
pub use spec::{parse_steps, PipelineSpec, StepSpec};

/// Human-readable reference of the available step kinds, for the CLI.
pub fn operations_description() -> String {
    let rows = [
        ("filter", "select rows by condition; optional 'by' column subset"),
        ("rename", "rename columns per an old -> new map"),
        ("aggregate", "group by key columns and reduce 'on' columns"),
        ("sort", "stable multi-key sort, missing values last"),
        ("tag", "label rows by their first matching condition"),
        ("col_assign", "compute a column over matching rows (lambda/vectorized)"),
        ("col_apply", "apply a series callable to listed columns"),
        ("series_transform", "subset-scoped sequence transform (shift/diff/...)"),
    ];
    let mut out = String::from("Available pipeline operations:\n\n");
    for (kind, help) in rows {
        out.push_str(&format!("  {kind:<18}{help}\n"));
    }
    out.push_str("\nEach step is {\"type\": <kind>, \"params\": {...}}.\n");
    out
}
