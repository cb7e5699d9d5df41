//! Compiled pipeline operations.
//!
//! A [`StepSpec`] is the wire form; [`Operation::build`] validates it and
//! compiles every embedded expression, so configuration errors surface
//! before any data is touched. Applying an operation is a pure function
//! from one frame to the next.

use std::collections::HashMap;

use serde_json::Value;

use crate::api::logs::log_warning;
use crate::error::{OpError, OpResult};
use crate::expr::{reduce, CompiledExpr, SeriesFn};
use crate::frame::{compare_values, Frame};

use super::spec::{condition_or_default, AggregateActions, StepSpec};

const NAMED_REDUCTIONS: &[&str] = &[
    "sum", "mean", "min", "max", "count", "std", "median", "first", "last", "nunique",
];

/// How an aggregate step reduces each `on` column per group.
#[derive(Debug, Clone)]
pub enum AggMethod {
    /// Built-in reduction tag.
    Named(String),
    /// Caller-supplied reduction expression over `x`.
    Custom(SeriesFn),
}

/// How `col_assign` evaluates its value expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignMode {
    /// Row-wise, every column bound to the row's scalar.
    Lambda,
    /// Once over the whole matching sub-frame.
    Vectorized,
}

/// A bound, validated pipeline operation.
#[derive(Debug, Clone)]
pub enum Operation {
    Filter {
        by: Option<Vec<String>>,
        condition: CompiledExpr,
    },
    Rename {
        map: HashMap<String, String>,
    },
    Aggregate {
        by: Vec<String>,
        method: AggMethod,
        on: Vec<String>,
        /// Destination name per `on` column.
        dests: Vec<String>,
    },
    Sort {
        by: Vec<String>,
        ascending: Vec<bool>,
    },
    Tag {
        arms: Vec<(CompiledExpr, Value)>,
        tag_col_name: String,
        default_tag: Value,
    },
    ColAssign {
        mode: AssignMode,
        col_name: String,
        value: CompiledExpr,
        condition: CompiledExpr,
    },
    ColApply {
        on: Vec<String>,
        callable: SeriesFn,
        /// Source column to destination; sources not mapped write in place.
        dests: HashMap<String, String>,
        condition: CompiledExpr,
    },
    SeriesTransform {
        on: Vec<String>,
        callable: SeriesFn,
        /// Destination name per `on` column.
        dests: Vec<String>,
        condition: CompiledExpr,
    },
}

fn compile_condition(condition: Option<String>) -> OpResult<CompiledExpr> {
    Ok(CompiledExpr::compile(&condition_or_default(condition))?)
}

impl Operation {
    /// Validate a step specification and compile its expressions.
    pub fn build(spec: StepSpec) -> OpResult<Self> {
        match spec {
            StepSpec::Filter { by, condition, map } => {
                // The parser expands filter-with-map before building.
                debug_assert!(map.as_ref().map_or(true, HashMap::is_empty));
                Ok(Operation::Filter {
                    by,
                    condition: compile_condition(condition)?,
                })
            }
            StepSpec::Rename { map } => Ok(Operation::Rename { map }),
            StepSpec::Aggregate { by, actions } => Self::build_aggregate(by, actions),
            StepSpec::Sort { by, ascending } => {
                if by.is_empty() {
                    return Err(OpError::Config("'by' must name at least one column".into()));
                }
                if by.len() != ascending.len() {
                    return Err(OpError::Config(
                        "'by' and 'ascending' must have the same length".into(),
                    ));
                }
                Ok(Operation::Sort { by, ascending })
            }
            StepSpec::Tag {
                conditions,
                tags,
                tag_col_name,
                default_tag,
            } => {
                if conditions.len() != tags.len() {
                    return Err(OpError::Config(
                        "'conditions' and 'tags' must have the same length".into(),
                    ));
                }
                let arms = conditions
                    .into_iter()
                    .zip(tags)
                    .map(|(cond, tag)| Ok((CompiledExpr::compile(&cond)?, tag)))
                    .collect::<OpResult<Vec<_>>>()?;
                Ok(Operation::Tag {
                    arms,
                    tag_col_name,
                    default_tag: default_tag.unwrap_or(Value::Null),
                })
            }
            StepSpec::ColAssign {
                method,
                col_name,
                value_expr,
                condition,
            } => {
                let mode = match method.as_str() {
                    "lambda" => AssignMode::Lambda,
                    "vectorized" => AssignMode::Vectorized,
                    other => {
                        return Err(OpError::Config(format!(
                            "unsupported col_assign method '{other}'"
                        )))
                    }
                };
                Ok(Operation::ColAssign {
                    mode,
                    col_name,
                    value: CompiledExpr::compile(&value_expr)?,
                    condition: compile_condition(condition)?,
                })
            }
            StepSpec::ColApply {
                on,
                method,
                value_expr,
                condition,
            } => {
                let dests = col_apply_dests(&on, value_expr)?;
                Ok(Operation::ColApply {
                    on,
                    callable: SeriesFn::resolve(&method)?,
                    dests,
                    condition: compile_condition(condition)?,
                })
            }
            StepSpec::SeriesTransform {
                on,
                transform_expr,
                rename,
                condition,
            } => {
                let dests = series_transform_dests(&on, rename)?;
                Ok(Operation::SeriesTransform {
                    on,
                    callable: SeriesFn::resolve(&transform_expr)?,
                    dests,
                    condition: compile_condition(condition)?,
                })
            }
        }
    }

    fn build_aggregate(by: Vec<String>, actions: AggregateActions) -> OpResult<Self> {
        let AggregateActions {
            method,
            on,
            rename,
            expr,
        } = actions;
        if by.is_empty() {
            return Err(OpError::Config("'by' must name at least one column".into()));
        }
        if on.is_empty() {
            return Err(OpError::Config("'on' must name at least one column".into()));
        }
        let dests = match rename {
            Some(names) => {
                if names.len() != on.len() {
                    return Err(OpError::Config(
                        "'rename' and 'on' must have the same length".into(),
                    ));
                }
                names
            }
            None => on.clone(),
        };
        let method = match method.as_str() {
            "func" => {
                let expr = expr.ok_or_else(|| {
                    OpError::Config("aggregate method 'func' requires 'expr'".into())
                })?;
                AggMethod::Custom(SeriesFn::resolve(&expr)?)
            }
            m if NAMED_REDUCTIONS.contains(&m) => AggMethod::Named(m.to_string()),
            other => {
                return Err(OpError::Config(format!(
                    "unsupported aggregate method '{other}'"
                )))
            }
        };
        Ok(Operation::Aggregate {
            by,
            method,
            on,
            dests,
        })
    }

    /// Wire tag of this operation kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Filter { .. } => "filter",
            Operation::Rename { .. } => "rename",
            Operation::Aggregate { .. } => "aggregate",
            Operation::Sort { .. } => "sort",
            Operation::Tag { .. } => "tag",
            Operation::ColAssign { .. } => "col_assign",
            Operation::ColApply { .. } => "col_apply",
            Operation::SeriesTransform { .. } => "series_transform",
        }
    }

    /// Apply this operation, producing a new frame.
    pub fn apply(&self, frame: &Frame) -> OpResult<Frame> {
        match self {
            Operation::Filter { by, condition } => {
                let mask = condition.eval_mask(frame)?;
                let mut out = frame.filter_rows(&mask);
                if let Some(keep) = by {
                    out = out.project(keep);
                }
                Ok(out)
            }
            Operation::Rename { map } => Ok(frame.rename_columns(map)),
            Operation::Aggregate {
                by,
                method,
                on,
                dests,
            } => apply_aggregate(frame, by, method, on, dests),
            Operation::Sort { by, ascending } => apply_sort(frame, by, ascending),
            Operation::Tag {
                arms,
                tag_col_name,
                default_tag,
            } => {
                let mut masks = Vec::with_capacity(arms.len());
                for (condition, _) in arms {
                    masks.push(condition.eval_mask(frame)?);
                }
                let tags: Vec<Value> = (0..frame.n_rows())
                    .map(|row| {
                        masks
                            .iter()
                            .position(|mask| mask[row])
                            .map(|arm| arms[arm].1.clone())
                            .unwrap_or_else(|| default_tag.clone())
                    })
                    .collect();
                let mut out = frame.clone();
                out.set_column(tag_col_name, tags);
                Ok(out)
            }
            Operation::ColAssign {
                mode,
                col_name,
                value,
                condition,
            } => {
                let mask = condition.eval_mask(frame)?;
                let sub = frame.filter_rows(&mask);
                let values = match mode {
                    AssignMode::Vectorized => value.eval_values(&sub)?,
                    AssignMode::Lambda => (0..sub.n_rows())
                        .map(|row| value.eval_row(&sub, row))
                        .collect::<Result<_, _>>()?,
                };
                let mut out = frame.clone();
                out.write_subset(col_name, sub.index(), &values);
                Ok(out)
            }
            Operation::ColApply {
                on,
                callable,
                dests,
                condition,
            } => {
                let mask = condition.eval_mask(frame)?;
                if !mask.iter().any(|&m| m) {
                    return Ok(frame.clone());
                }
                let sub = frame.filter_rows(&mask);
                let mut out = frame.clone();
                for col in on {
                    // Columns absent from the frame are skipped.
                    let Some(input) = sub.column(col) else { continue };
                    let values = callable.apply(input).map_err(|e| OpError::Execution {
                        column: col.clone(),
                        message: e.to_string(),
                    })?;
                    let dest = dests.get(col).map(String::as_str).unwrap_or(col);
                    out.write_subset(dest, sub.index(), &values);
                }
                Ok(out)
            }
            Operation::SeriesTransform {
                on,
                callable,
                dests,
                condition,
            } => {
                // A failing condition degrades to the full frame rather than
                // failing the run.
                let mask = match condition.eval_mask(frame) {
                    Ok(mask) => mask,
                    Err(e) => {
                        log_warning(format!(
                            "series_transform condition '{}' failed ({e}); applying to all rows",
                            condition.source()
                        ));
                        vec![true; frame.n_rows()]
                    }
                };
                if !mask.iter().any(|&m| m) {
                    return Ok(frame.clone());
                }
                let sub = frame.filter_rows(&mask);
                let mut out = frame.clone();
                for (col, dest) in on.iter().zip(dests) {
                    // Columns absent from the frame are skipped.
                    let Some(input) = sub.column(col) else { continue };
                    let values = callable.apply(input).map_err(|e| OpError::Execution {
                        column: col.clone(),
                        message: e.to_string(),
                    })?;
                    out.write_subset(dest, sub.index(), &values);
                }
                Ok(out)
            }
        }
    }
}

fn col_apply_dests(on: &[String], value_expr: Option<Value>) -> OpResult<HashMap<String, String>> {
    match value_expr {
        None | Some(Value::Null) => Ok(HashMap::new()),
        Some(Value::Object(map)) => map
            .into_iter()
            .map(|(k, v)| match v {
                Value::String(s) => Ok((k, s)),
                other => Err(OpError::Config(format!(
                    "col_apply rename for '{k}' must be a string, got {other}"
                ))),
            })
            .collect(),
        Some(Value::Array(items)) => {
            if items.len() != on.len() {
                return Err(OpError::Config(
                    "col_apply rename list must match 'on' in length".into(),
                ));
            }
            on.iter()
                .zip(items)
                .map(|(col, item)| match item {
                    Value::String(s) => Ok((col.clone(), s)),
                    other => Err(OpError::Config(format!(
                        "col_apply rename entries must be strings, got {other}"
                    ))),
                })
                .collect()
        }
        Some(Value::String(s)) => {
            if on.len() != 1 {
                return Err(OpError::Config(
                    "a single col_apply rename requires a single 'on' column".into(),
                ));
            }
            Ok(HashMap::from([(on[0].clone(), s)]))
        }
        Some(other) => Err(OpError::Config(format!(
            "unsupported col_apply rename: {other}"
        ))),
    }
}

fn series_transform_dests(on: &[String], rename: Option<Value>) -> OpResult<Vec<String>> {
    match rename {
        None | Some(Value::Null) => Ok(on.to_vec()),
        Some(Value::String(s)) => {
            if on.len() != 1 {
                return Err(OpError::Config(
                    "a single series_transform rename requires a single 'on' column".into(),
                ));
            }
            Ok(vec![s])
        }
        Some(Value::Array(items)) => {
            if items.len() != on.len() {
                return Err(OpError::Config(
                    "series_transform rename list must match 'on' in length".into(),
                ));
            }
            items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s),
                    other => Err(OpError::Config(format!(
                        "series_transform rename entries must be strings, got {other}"
                    ))),
                })
                .collect()
        }
        Some(other) => Err(OpError::Config(format!(
            "unsupported series_transform rename: {other}"
        ))),
    }
}

fn apply_sort(frame: &Frame, by: &[String], ascending: &[bool]) -> OpResult<Frame> {
    let keys: Vec<&[Value]> = by
        .iter()
        .map(|name| {
            frame
                .column(name)
                .ok_or_else(|| OpError::MissingColumn(name.clone()))
        })
        .collect::<OpResult<_>>()?;
    let mut positions: Vec<usize> = (0..frame.n_rows()).collect();
    positions.sort_by(|&a, &b| {
        for (key, &asc) in keys.iter().zip(ascending) {
            let ord = compare_values(&key[a], &key[b], asc);
            if ord != std::cmp::Ordering::Equal {
                return ord;
            }
        }
        std::cmp::Ordering::Equal
    });
    Ok(frame.take_rows(&positions))
}

fn apply_aggregate(
    frame: &Frame,
    by: &[String],
    method: &AggMethod,
    on: &[String],
    dests: &[String],
) -> OpResult<Frame> {
    let key_cols: Vec<&[Value]> = by
        .iter()
        .map(|name| {
            frame
                .column(name)
                .ok_or_else(|| OpError::MissingColumn(name.clone()))
        })
        .collect::<OpResult<_>>()?;
    let value_cols: Vec<&[Value]> = on
        .iter()
        .map(|name| {
            frame
                .column(name)
                .ok_or_else(|| OpError::MissingColumn(name.clone()))
        })
        .collect::<OpResult<_>>()?;

    // Bucket rows by key, then order groups by key ascending, nulls last.
    let mut groups: Vec<(Vec<Value>, Vec<usize>)> = Vec::new();
    let mut lookup: HashMap<String, usize> = HashMap::new();
    for row in 0..frame.n_rows() {
        let key: Vec<Value> = key_cols.iter().map(|col| col[row].clone()).collect();
        let fingerprint = serde_json::to_string(&key).unwrap_or_default();
        match lookup.get(&fingerprint) {
            Some(&slot) => groups[slot].1.push(row),
            None => {
                lookup.insert(fingerprint, groups.len());
                groups.push((key, vec![row]));
            }
        }
    }
    groups.sort_by(|(a, _), (b, _)| {
        for (x, y) in a.iter().zip(b.iter()) {
            let ord = compare_values(x, y, true);
            if ord != std::cmp::Ordering::Equal {
                return ord;
            }
        }
        std::cmp::Ordering::Equal
    });

    let mut out_by: Vec<Vec<Value>> = vec![Vec::with_capacity(groups.len()); by.len()];
    let mut out_on: Vec<Vec<Value>> = vec![Vec::with_capacity(groups.len()); on.len()];
    for (key, rows) in &groups {
        for (slot, part) in key.iter().enumerate() {
            out_by[slot].push(part.clone());
        }
        for (slot, col) in value_cols.iter().enumerate() {
            let values: Vec<Value> = rows.iter().map(|&row| col[row].clone()).collect();
            let reduced = match method {
                AggMethod::Named(name) => reduce(name, name, &values)?,
                AggMethod::Custom(f) => {
                    f.apply_scalar(&values).map_err(|e| OpError::Execution {
                        column: on[slot].clone(),
                        message: e.to_string(),
                    })?
                }
            };
            out_on[slot].push(reduced);
        }
    }

    let mut out = Frame::new();
    for (name, values) in by.iter().zip(out_by) {
        out.set_column(name, values);
    }
    for (name, values) in dests.iter().zip(out_on) {
        out.set_column(name, values);
    }
    Ok(out)
}
