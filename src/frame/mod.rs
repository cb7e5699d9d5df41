//! In-memory tabular dataset with a stable row index.
//!
//! A [`Frame`] is an ordered collection of named columns of JSON values,
//! aligned by row position, plus a row index holding a stable identifier
//! per row. Operations never mutate a frame in place: every transformation
//! builds a new frame (or clones and edits the clone).
//!
//! The row index is what makes subset-scoped writes well defined: a filtered
//! sub-frame keeps the row ids of its parent, and written values are aligned
//! back into the parent by id, not by raw position.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};

/// A single named column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<Value>,
}

/// An ordered, row-aligned collection of named columns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frame {
    columns: Vec<Column>,
    index: Vec<i64>,
}

impl Frame {
    /// Create an empty frame with no columns and no rows.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a frame from `(name, values)` pairs with a fresh `0..n` index.
    ///
    /// Returns `None` when column lengths differ or a name repeats.
    pub fn from_columns(pairs: Vec<(String, Vec<Value>)>) -> Option<Self> {
        let mut seen = HashSet::new();
        let mut len: Option<usize> = None;
        for (name, values) in &pairs {
            if !seen.insert(name.clone()) {
                return None;
            }
            match len {
                Some(n) if n != values.len() => return None,
                None => len = Some(values.len()),
                _ => {}
            }
        }
        let n = len.unwrap_or(0);
        Some(Frame {
            columns: pairs
                .into_iter()
                .map(|(name, values)| Column { name, values })
                .collect(),
            index: (0..n as i64).collect(),
        })
    }

    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.index.len()
    }

    /// Number of columns.
    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    /// Column names in frame order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// True when the frame has a column with this name.
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    /// Values of a column, if present.
    pub fn column(&self, name: &str) -> Option<&[Value]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    /// The stable row index.
    pub fn index(&self) -> &[i64] {
        &self.index
    }

    /// Replace the row index. Length must match the row count.
    pub fn set_index(&mut self, index: Vec<i64>) {
        debug_assert_eq!(index.len(), self.n_rows());
        self.index = index;
    }

    /// Single cell by column name and row position.
    pub fn cell(&self, name: &str, row: usize) -> Option<&Value> {
        self.column(name).and_then(|values| values.get(row))
    }

    /// Add a column or replace an existing one. Length must match the row
    /// count (or define it when the frame has no columns yet).
    pub fn set_column(&mut self, name: &str, values: Vec<Value>) {
        if self.columns.is_empty() && self.index.is_empty() {
            self.index = (0..values.len() as i64).collect();
        }
        debug_assert_eq!(values.len(), self.n_rows());
        if let Some(col) = self.columns.iter_mut().find(|c| c.name == name) {
            col.values = values;
        } else {
            self.columns.push(Column {
                name: name.to_string(),
                values,
            });
        }
    }

    /// New frame containing the rows at the given positions, in that order.
    /// Row ids are carried over from the source rows.
    pub fn take_rows(&self, positions: &[usize]) -> Frame {
        Frame {
            columns: self
                .columns
                .iter()
                .map(|c| Column {
                    name: c.name.clone(),
                    values: positions.iter().map(|&p| c.values[p].clone()).collect(),
                })
                .collect(),
            index: positions.iter().map(|&p| self.index[p]).collect(),
        }
    }

    /// New frame keeping rows where the mask is true. Row order and row ids
    /// are preserved.
    pub fn filter_rows(&self, mask: &[bool]) -> Frame {
        let positions: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(i, &keep)| keep.then_some(i))
            .collect();
        self.take_rows(&positions)
    }

    /// New frame projected to the intersection of `keep` with the existing
    /// columns, preserving frame column order. Names absent from the frame
    /// are silently dropped.
    pub fn project(&self, keep: &[String]) -> Frame {
        let wanted: HashSet<&str> = keep.iter().map(String::as_str).collect();
        Frame {
            columns: self
                .columns
                .iter()
                .filter(|c| wanted.contains(c.name.as_str()))
                .cloned()
                .collect(),
            index: self.index.clone(),
        }
    }

    /// New frame with columns renamed per the map; unmapped columns pass
    /// through unchanged.
    pub fn rename_columns(&self, map: &HashMap<String, String>) -> Frame {
        Frame {
            columns: self
                .columns
                .iter()
                .map(|c| Column {
                    name: map.get(&c.name).cloned().unwrap_or_else(|| c.name.clone()),
                    values: c.values.clone(),
                })
                .collect(),
            index: self.index.clone(),
        }
    }

    /// Write `values` into the destination column at the rows identified by
    /// `ids` (zipped positionally with `values`). A missing destination
    /// column is created filled with null, so rows outside the write hold
    /// null; a pre-existing column keeps its prior values there.
    pub fn write_subset(&mut self, dest: &str, ids: &[i64], values: &[Value]) {
        debug_assert_eq!(ids.len(), values.len());
        if !self.has_column(dest) {
            let nulls = vec![Value::Null; self.n_rows()];
            self.set_column(dest, nulls);
        }
        let by_id: HashMap<i64, usize> = self
            .index
            .iter()
            .enumerate()
            .map(|(pos, &id)| (id, pos))
            .collect();
        if let Some(col) = self.columns.iter_mut().find(|c| c.name == dest) {
            for (id, value) in ids.iter().zip(values.iter()) {
                if let Some(&pos) = by_id.get(id) {
                    col.values[pos] = value.clone();
                }
            }
        }
    }

    /// Rows as JSON objects in column order, for the `{columns, rows}`
    /// output contract.
    pub fn to_records(&self) -> Vec<Value> {
        (0..self.n_rows())
            .map(|row| {
                let mut obj = Map::new();
                for col in &self.columns {
                    obj.insert(col.name.clone(), sanitize_value(&col.values[row]));
                }
                Value::Object(obj)
            })
            .collect()
    }

    /// Owned column names, for serialization.
    pub fn column_names_owned(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// Normalize a cell for serialization. `serde_json` numbers cannot hold
/// non-finite values, so the only remaining normalization is recursive
/// passthrough; kept as the single choke point for the output contract.
fn sanitize_value(value: &Value) -> Value {
    match value {
        Value::Number(n) => match n.as_f64() {
            Some(f) if !f.is_finite() => Value::Null,
            _ => value.clone(),
        },
        other => other.clone(),
    }
}

/// Compare two cells for sorting, missing values last regardless of
/// direction. Non-null cells compare within their type; mixed types fall
/// back to a fixed type rank so the sort stays total.
pub fn compare_values(a: &Value, b: &Value, ascending: bool) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => {
            let order = compare_non_null(a, b);
            if ascending {
                order
            } else {
                order.reverse()
            }
        }
    }
}

fn compare_non_null(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(f64::NAN), y.as_f64().unwrap_or(f64::NAN));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Convenience constructor used across the test suites.
#[cfg(test)]
pub fn frame_of(pairs: &[(&str, Vec<Value>)]) -> Frame {
    Frame::from_columns(
        pairs
            .iter()
            .map(|(name, values)| (name.to_string(), values.clone()))
            .collect(),
    )
    .expect("well-formed test frame")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Frame {
        frame_of(&[
            ("g", vec![json!("A"), json!("A"), json!("B")]),
            ("v", vec![json!(1), json!(2), json!(5)]),
        ])
    }

    #[test]
    fn test_from_columns_rejects_ragged() {
        let frame = Frame::from_columns(vec![
            ("a".into(), vec![json!(1)]),
            ("b".into(), vec![json!(1), json!(2)]),
        ]);
        assert!(frame.is_none());
    }

    #[test]
    fn test_from_columns_rejects_duplicate_names() {
        let frame = Frame::from_columns(vec![
            ("a".into(), vec![json!(1)]),
            ("a".into(), vec![json!(2)]),
        ]);
        assert!(frame.is_none());
    }

    #[test]
    fn test_filter_preserves_row_ids() {
        let frame = sample();
        let filtered = frame.filter_rows(&[false, true, true]);
        assert_eq!(filtered.n_rows(), 2);
        assert_eq!(filtered.index(), &[1, 2]);
        assert_eq!(filtered.column("v").unwrap(), &[json!(2), json!(5)]);
    }

    #[test]
    fn test_project_intersection_keeps_frame_order() {
        let frame = sample();
        let projected = frame.project(&["v".into(), "missing".into(), "g".into()]);
        assert_eq!(projected.column_names(), vec!["g", "v"]);
        assert_eq!(projected.n_rows(), 3);
    }

    #[test]
    fn test_rename_passthrough() {
        let frame = sample();
        let mut map = HashMap::new();
        map.insert("g".to_string(), "group".to_string());
        let renamed = frame.rename_columns(&map);
        assert_eq!(renamed.column_names(), vec!["group", "v"]);
        assert_eq!(renamed.column("group").unwrap(), frame.column("g").unwrap());
    }

    #[test]
    fn test_write_subset_creates_null_elsewhere() {
        let mut frame = sample();
        frame.write_subset("doubled", &[1, 2], &[json!(4), json!(10)]);
        assert_eq!(
            frame.column("doubled").unwrap(),
            &[Value::Null, json!(4), json!(10)]
        );
    }

    #[test]
    fn test_write_subset_keeps_existing_outside_mask() {
        let mut frame = sample();
        frame.write_subset("v", &[2], &[json!(50)]);
        assert_eq!(
            frame.column("v").unwrap(),
            &[json!(1), json!(2), json!(50)]
        );
    }

    #[test]
    fn test_write_subset_aligns_by_id_not_position() {
        let frame = sample();
        // Subset holds rows 1 and 2; writing through the subset ids must land
        // at the parent positions of those ids.
        let subset = frame.filter_rows(&[false, true, true]);
        let mut parent = frame.clone();
        parent.write_subset("w", subset.index(), &[json!("x"), json!("y")]);
        assert_eq!(
            parent.column("w").unwrap(),
            &[Value::Null, json!("x"), json!("y")]
        );
    }

    #[test]
    fn test_compare_values_nulls_last_both_directions() {
        assert_eq!(
            compare_values(&Value::Null, &json!(1), true),
            Ordering::Greater
        );
        assert_eq!(
            compare_values(&Value::Null, &json!(1), false),
            Ordering::Greater
        );
        assert_eq!(compare_values(&json!(1), &json!(2), false), Ordering::Greater);
    }

    #[test]
    fn test_to_records_column_order() {
        let frame = sample();
        let records = frame.to_records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0]["g"], json!("A"));
        assert_eq!(records[2]["v"], json!(5));
    }
}
