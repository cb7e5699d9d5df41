//! Sequential pipeline executor.
//!
//! Steps run eagerly in authoring order; the first failure terminates the
//! run and discards the failing step's partial output. There is no retry,
//! reordering, or fusion, so identical failing pipelines produce identical
//! errors.

use serde_json::Value;

use crate::api::logs::{log_info, log_success};
use crate::error::{PipelineError, PipelineResult};
use crate::frame::Frame;

use super::operations::Operation;
use super::spec::parse_steps;

/// A parsed, compiled pipeline ready to run.
#[derive(Debug, Clone)]
pub struct Pipeline {
    /// Compiled operations with the authoring position of the step each
    /// came from (filter-with-map expands to two operations at one
    /// position).
    steps: Vec<(usize, Operation)>,
}

impl Pipeline {
    /// Parse and compile a pipeline document (bare step list or
    /// `{"pipeline": [...]}` envelope).
    pub fn parse(doc: &Value) -> PipelineResult<Self> {
        let mut steps = Vec::new();
        for (pos, spec) in parse_steps(doc)? {
            let kind = spec.kind();
            let op = Operation::build(spec)
                .map_err(|e| PipelineError::at_step(pos, kind, e))?;
            steps.push((pos, op));
        }
        Ok(Pipeline { steps })
    }

    /// Parse from raw JSON text.
    pub fn from_json_str(text: &str) -> PipelineResult<Self> {
        let doc: Value = serde_json::from_str(text)?;
        Self::parse(&doc)
    }

    /// Number of compiled operations (after expansion).
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run the pipeline over a frame.
    pub fn execute(&self, frame: &Frame) -> PipelineResult<Frame> {
        let mut current = frame.clone();
        for (pos, op) in &self.steps {
            log_info(format!(
                "step {pos}: {} ({} rows in)",
                op.kind(),
                current.n_rows()
            ));
            current = op
                .apply(&current)
                .map_err(|e| PipelineError::at_step(*pos, op.kind(), e))?;
        }
        log_success(format!(
            "pipeline done: {} rows, {} columns",
            current.n_rows(),
            current.n_cols()
        ));
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::frame_of;
    use serde_json::json;

    fn orders() -> Frame {
        frame_of(&[
            ("region", vec![json!("n"), json!("s"), json!("n"), json!("s")]),
            ("units", vec![json!(10), json!(20), json!(30), json!(40)]),
        ])
    }

    #[test]
    fn test_execute_chains_steps() {
        let pipeline = Pipeline::from_json_str(
            r#"[
                {"type": "filter", "params": {"condition": "units > 10"}},
                {"type": "aggregate", "params": {
                    "by": ["region"],
                    "actions": {"method": "sum", "on": ["units"]}
                }},
                {"type": "sort", "params": {"by": ["units"], "ascending": [false]}}
            ]"#,
        )
        .unwrap();
        let out = pipeline.execute(&orders()).unwrap();
        assert_eq!(out.column("region").unwrap(), &[json!("s"), json!("n")]);
        assert_eq!(out.column("units").unwrap(), &[json!(60.0), json!(30.0)]);
    }

    #[test]
    fn test_empty_pipeline_is_identity() {
        let pipeline = Pipeline::from_json_str("[]").unwrap();
        let frame = orders();
        assert_eq!(pipeline.execute(&frame).unwrap(), frame);
    }

    #[test]
    fn test_build_error_carries_step_position() {
        let err = Pipeline::from_json_str(
            r#"[
                {"type": "rename", "params": {"map": {}}},
                {"type": "sort", "params": {"by": ["a"], "ascending": []}}
            ]"#,
        )
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("step 1"));
        assert!(msg.contains("sort"));
    }

    #[test]
    fn test_runtime_error_discards_partial_output() {
        let pipeline = Pipeline::from_json_str(
            r#"[
                {"type": "filter", "params": {"condition": "units > 10"}},
                {"type": "sort", "params": {"by": ["ghost"], "ascending": [true]}}
            ]"#,
        )
        .unwrap();
        let err = pipeline.execute(&orders()).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("step 1"));
        assert!(msg.contains("ghost"));
    }

    #[test]
    fn test_expanded_filter_map_runs_as_two_operations() {
        let pipeline = Pipeline::from_json_str(
            r#"[
                {"type": "filter", "params": {
                    "map": {"units": "qty"},
                    "condition": "qty > 15"
                }}
            ]"#,
        )
        .unwrap();
        assert_eq!(pipeline.len(), 2);
        let out = pipeline.execute(&orders()).unwrap();
        assert_eq!(out.column_names(), vec!["qty"]);
        assert_eq!(out.n_rows(), 3);
    }

    #[test]
    fn test_malformed_json_is_error() {
        assert!(Pipeline::from_json_str("{not json").is_err());
    }
}
