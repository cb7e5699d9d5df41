//! Request and response payloads for the HTTP API.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::frame::Frame;

/// Successful pipeline run: column names in frame order plus one JSON
/// object per row. Non-finite numerics are already normalized to null by
/// the frame serializer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResponse {
    pub columns: Vec<String>,
    pub rows: Vec<Value>,
}

impl From<&Frame> for RunResponse {
    fn from(frame: &Frame) -> Self {
        Self {
            columns: frame.column_names_owned(),
            rows: frame.to_records(),
        }
    }
}

/// Body of `POST /dp/pipeline/save`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavePipelineRequest {
    pub name: String,
    pub pipeline: Value,
}

/// Response of a successful save.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavePipelineResponse {
    pub id: String,
    pub name: String,
}

/// The error envelope every failing endpoint returns.
pub fn error_response(message: &str) -> Value {
    json!({ "error": message })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::frame_of;

    #[test]
    fn test_run_response_from_frame() {
        let frame = frame_of(&[
            ("a", vec![json!(1), json!(2)]),
            ("b", vec![json!("x"), Value::Null]),
        ]);
        let response = RunResponse::from(&frame);
        assert_eq!(response.columns, vec!["a", "b"]);
        assert_eq!(response.rows.len(), 2);
        assert_eq!(response.rows[1], json!({"a": 2, "b": null}));
    }

    #[test]
    fn test_error_envelope_shape() {
        let err = error_response("step 0 (filter): unknown column 'x'");
        assert!(err["error"].as_str().unwrap().contains("step 0"));
    }
}
