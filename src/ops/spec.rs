//! Wire-format step specifications and the pipeline parser.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PipelineError, PipelineResult};

/// Condition applied when a step omits one: selects every row.
pub const MATCH_ALL_CONDITION: &str = "index > -1";

/// One pipeline step as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "params", rename_all = "snake_case")]
pub enum StepSpec {
    /// Select rows by condition, optionally projecting to a column subset.
    Filter {
        /// Column subset to keep (intersection; absent names dropped).
        #[serde(default, alias = "requiredCols")]
        by: Option<Vec<String>>,
        #[serde(default)]
        condition: Option<String>,
        /// Inline rename applied before filtering; expands to a `rename`
        /// step followed by a `filter` over the renamed columns.
        #[serde(default)]
        map: Option<HashMap<String, String>>,
    },

    /// Rename columns; unmapped columns pass through.
    Rename { map: HashMap<String, String> },

    /// Group-and-reduce.
    Aggregate {
        by: Vec<String>,
        actions: AggregateActions,
    },

    /// Stable multi-key sort.
    Sort {
        by: Vec<String>,
        ascending: Vec<bool>,
    },

    /// First-matching-condition labelling into a tag column.
    Tag {
        conditions: Vec<String>,
        tags: Vec<Value>,
        tag_col_name: String,
        #[serde(default)]
        default_tag: Option<Value>,
    },

    /// Compute a new (or overwritten) column over matching rows.
    ColAssign {
        method: String,
        col_name: String,
        value_expr: String,
        #[serde(default)]
        condition: Option<String>,
    },

    /// Apply a series callable to each listed column over matching rows.
    ColApply {
        on: Vec<String>,
        method: String,
        /// Destination mapping: object, list zipped with `on`, single
        /// string, or absent (write in place).
        #[serde(default)]
        value_expr: Option<Value>,
        #[serde(default)]
        condition: Option<String>,
    },

    /// Subset-scoped sequence transform preserving filtered adjacency.
    SeriesTransform {
        on: Vec<String>,
        transform_expr: String,
        /// Destination names: string or list matching `on` in length;
        /// absent means overwrite in place.
        #[serde(default)]
        rename: Option<Value>,
        #[serde(default)]
        condition: Option<String>,
    },
}

/// The `actions` block of an aggregate step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateActions {
    /// Reduction tag (`sum`, `mean`, ...) or the literal `func` selecting a
    /// caller-supplied reduction expression in `expr`.
    pub method: String,
    pub on: Vec<String>,
    /// Output names zipped positionally with `on`.
    #[serde(default)]
    pub rename: Option<Vec<String>>,
    /// Reduction expression over `x`, required when `method` is `func`.
    #[serde(default)]
    pub expr: Option<String>,
}

impl StepSpec {
    /// Wire tag of this step kind.
    pub fn kind(&self) -> &'static str {
        match self {
            StepSpec::Filter { .. } => "filter",
            StepSpec::Rename { .. } => "rename",
            StepSpec::Aggregate { .. } => "aggregate",
            StepSpec::Sort { .. } => "sort",
            StepSpec::Tag { .. } => "tag",
            StepSpec::ColAssign { .. } => "col_assign",
            StepSpec::ColApply { .. } => "col_apply",
            StepSpec::SeriesTransform { .. } => "series_transform",
        }
    }
}

/// A pipeline document: either a bare list of steps or an envelope object.
///
/// Steps stay raw here so each one can be decoded individually, keeping its
/// position in the error when a step is malformed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PipelineSpec {
    Steps(Vec<Value>),
    Envelope { pipeline: Vec<Value> },
}

impl PipelineSpec {
    pub fn into_steps(self) -> Vec<Value> {
        match self {
            PipelineSpec::Steps(steps) => steps,
            PipelineSpec::Envelope { pipeline } => pipeline,
        }
    }
}

/// Normalize an optional condition: absent or blank means match-all.
pub(crate) fn condition_or_default(condition: Option<String>) -> String {
    match condition {
        Some(c) if !c.trim().is_empty() => c,
        _ => MATCH_ALL_CONDITION.to_string(),
    }
}

/// Decode a pipeline document and expand special cases.
///
/// Each returned entry keeps the authoring position of the step it came
/// from, so errors from expanded steps still point at the step the author
/// wrote. A `filter` carrying an inline `map` expands to `rename` followed
/// by `filter` over the renamed columns.
pub fn parse_steps(doc: &Value) -> PipelineResult<Vec<(usize, StepSpec)>> {
    let spec: PipelineSpec = serde_json::from_value(doc.clone())
        .map_err(|e| PipelineError::Spec(e.to_string()))?;
    let mut out = Vec::new();
    for (pos, raw) in spec.into_steps().into_iter().enumerate() {
        let step: StepSpec = serde_json::from_value(raw)
            .map_err(|e| PipelineError::Spec(format!("step {pos}: {e}")))?;
        match step {
            StepSpec::Filter {
                condition,
                map: Some(map),
                ..
            } if !map.is_empty() => {
                // Filter-with-map: rename first, then filter projected onto
                // the renamed (map-value) columns; an explicit 'by' is
                // ignored in this form.
                let renamed: Vec<String> = map.values().cloned().collect();
                out.push((pos, StepSpec::Rename { map }));
                out.push((
                    pos,
                    StepSpec::Filter {
                        by: Some(renamed),
                        condition,
                        map: None,
                    },
                ));
            }
            other => out.push((pos, other)),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_bare_list() {
        let doc = json!([
            {"type": "filter", "params": {"condition": "x > 0"}},
            {"type": "rename", "params": {"map": {"a": "b"}}}
        ]);
        let steps = parse_steps(&doc).unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].1.kind(), "filter");
        assert_eq!(steps[1].1.kind(), "rename");
    }

    #[test]
    fn test_decode_envelope() {
        let doc = json!({"pipeline": [
            {"type": "sort", "params": {"by": ["a"], "ascending": [true]}}
        ]});
        let steps = parse_steps(&doc).unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].1.kind(), "sort");
    }

    #[test]
    fn test_filter_required_cols_alias() {
        let doc = json!([
            {"type": "filter", "params": {"requiredCols": ["a", "b"], "condition": "a > 1"}}
        ]);
        let steps = parse_steps(&doc).unwrap();
        match &steps[0].1 {
            StepSpec::Filter { by: Some(by), .. } => assert_eq!(by, &["a", "b"]),
            other => panic!("unexpected step: {other:?}"),
        }
    }

    #[test]
    fn test_filter_map_expands_keeping_position() {
        let doc = json!([
            {"type": "rename", "params": {"map": {}}},
            {"type": "filter", "params": {
                "map": {"raw": "clean"},
                "condition": "clean > 0"
            }}
        ]);
        let steps = parse_steps(&doc).unwrap();
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[1], (1, StepSpec::Rename {
            map: HashMap::from([("raw".to_string(), "clean".to_string())]),
        }));
        match &steps[2] {
            (1, StepSpec::Filter { by: Some(by), map: None, .. }) => {
                assert_eq!(by, &["clean"]);
            }
            other => panic!("unexpected step: {other:?}"),
        }
    }

    #[test]
    fn test_filter_map_ignores_explicit_column_subset() {
        // The map form projects onto the map values alone.
        let doc = json!([
            {"type": "filter", "params": {
                "requiredCols": ["keepme"],
                "map": {"raw": "clean"},
                "condition": "clean > 0"
            }}
        ]);
        let steps = parse_steps(&doc).unwrap();
        match &steps[1] {
            (0, StepSpec::Filter { by: Some(by), .. }) => assert_eq!(by, &["clean"]),
            other => panic!("unexpected step: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_kind_error_names_step() {
        let doc = json!([
            {"type": "rename", "params": {"map": {}}},
            {"type": "explode", "params": {}}
        ]);
        let err = parse_steps(&doc).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("step 1"));
        assert!(msg.contains("explode"));
    }

    #[test]
    fn test_missing_required_key_names_step_and_key() {
        let doc = json!([{"type": "sort", "params": {"by": ["a"]}}]);
        let err = parse_steps(&doc).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("step 0"));
        assert!(msg.contains("ascending"));
    }

    #[test]
    fn test_condition_default() {
        assert_eq!(condition_or_default(None), MATCH_ALL_CONDITION);
        assert_eq!(condition_or_default(Some("  ".into())), MATCH_ALL_CONDITION);
        assert_eq!(condition_or_default(Some("x > 1".into())), "x > 1");
    }
}
