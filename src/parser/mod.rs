//! Delimited-text ingestion with encoding and delimiter auto-detection.
//!
//! Decodes uploaded bytes into a [`Frame`]: the first line is the header,
//! short rows pad with empty cells, long rows drop extras. Cells are typed
//! on the way in (numbers, booleans, null for empty) so conditions like
//! `x > 0` work directly on ingested data.

use std::path::Path;

use serde_json::{Number, Value};

use crate::frame::Frame;

/// Ingestion error with line/column context.
#[derive(Debug, Clone)]
pub struct CsvError {
    pub line: usize,
    pub column: Option<String>,
    pub message: String,
}

impl std::fmt::Display for CsvError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.column {
            Some(col) => write!(f, "line {}, column '{}': {}", self.line, col, self.message),
            None => write!(f, "line {}: {}", self.line, self.message),
        }
    }
}

impl std::error::Error for CsvError {}

impl CsvError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            column: None,
            message: message.into(),
        }
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }
}

/// A decoded dataset plus what was detected on the way in.
#[derive(Debug, Clone)]
pub struct IngestResult {
    pub frame: Frame,
    pub encoding: String,
    pub delimiter: char,
    pub headers: Vec<String>,
}

/// Detect the encoding of raw bytes, normalized to a canonical label.
pub fn detect_encoding(bytes: &[u8]) -> String {
    let (charset, _, _) = chardet::detect(bytes);
    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        other => other.to_string(),
    }
}

/// Decode bytes using a detected encoding label.
pub fn decode_content(bytes: &[u8], encoding: &str) -> String {
    match encoding.to_lowercase().as_str() {
        "iso-8859-1" | "latin-1" | "latin1" => encoding_rs::ISO_8859_15.decode(bytes).0.to_string(),
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.to_string(),
        _ => String::from_utf8_lossy(bytes).to_string(),
    }
}

/// Detect the delimiter by counting candidates in the header line.
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");
    let candidates = [';', ',', '\t', '|'];
    let mut best = ';';
    let mut best_count = 0;
    for &sep in &candidates {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best = sep;
        }
    }
    best
}

/// Type a raw cell: empty becomes null, numeric text becomes a number,
/// bare `true`/`false` become booleans, everything else stays a string.
fn infer_cell(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::Null;
    }
    match raw {
        "true" | "True" => return Value::Bool(true),
        "false" | "False" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Value::Number(i.into());
    }
    if let Ok(f) = raw.parse::<f64>() {
        if f.is_finite() {
            if let Some(n) = Number::from_f64(f) {
                return Value::Number(n);
            }
        }
    }
    Value::String(raw.to_string())
}

fn split_line<'a>(line: &'a str, delimiter: char) -> Vec<&'a str> {
    line.split(delimiter)
        .map(|s| s.trim().trim_matches('"'))
        .collect()
}

/// Parse decoded text with an explicit delimiter.
pub fn ingest_str(content: &str, delimiter: char) -> Result<Frame, CsvError> {
    Ok(ingest_with_metadata(content, delimiter, "utf-8".to_string())?.frame)
}

/// Parse decoded text with an explicit delimiter, keeping detection
/// metadata.
pub fn ingest_with_metadata(
    content: &str,
    delimiter: char,
    encoding: String,
) -> Result<IngestResult, CsvError> {
    let mut lines = content.lines();
    let header_line = lines
        .next()
        .filter(|l| !l.trim().is_empty())
        .ok_or_else(|| CsvError::new(1, "empty input"))?;

    let headers: Vec<String> = split_line(header_line, delimiter)
        .into_iter()
        .map(str::to_string)
        .collect();
    if headers.iter().all(|h| h.is_empty()) {
        return Err(CsvError::new(1, "no headers found"));
    }
    for (i, header) in headers.iter().enumerate() {
        if headers[..i].contains(header) {
            return Err(CsvError::new(1, "duplicate header").with_column(header.clone()));
        }
    }

    let mut columns: Vec<Vec<Value>> = vec![Vec::new(); headers.len()];
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let cells = split_line(line, delimiter);
        // Short rows pad with empty cells; extras beyond the header drop.
        for (slot, column) in columns.iter_mut().enumerate() {
            column.push(infer_cell(cells.get(slot).copied().unwrap_or("")));
        }
    }

    let frame = Frame::from_columns(headers.iter().cloned().zip(columns).collect())
        .ok_or_else(|| CsvError::new(1, "malformed header row"))?;
    Ok(IngestResult {
        frame,
        encoding,
        delimiter,
        headers,
    })
}

/// Parse raw bytes with auto-detection of encoding and delimiter.
pub fn ingest_bytes_auto(bytes: &[u8]) -> Result<IngestResult, CsvError> {
    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding);
    let delimiter = detect_delimiter(&content);
    ingest_with_metadata(&content, delimiter, encoding)
}

/// Parse a file with auto-detection of encoding and delimiter.
pub fn ingest_file_auto<P: AsRef<Path>>(path: P) -> Result<IngestResult, CsvError> {
    let bytes = std::fs::read(path.as_ref())
        .map_err(|e| CsvError::new(0, format!("cannot read file: {e}")))?;
    ingest_bytes_auto(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_typed_cells() {
        let frame = ingest_str("name;age;active;score\nAlice;30;true;1.5\nBob;;false;", ';')
            .unwrap();
        assert_eq!(frame.column("name").unwrap(), &[json!("Alice"), json!("Bob")]);
        assert_eq!(frame.column("age").unwrap(), &[json!(30), Value::Null]);
        assert_eq!(frame.column("active").unwrap(), &[json!(true), json!(false)]);
        assert_eq!(frame.column("score").unwrap(), &[json!(1.5), Value::Null]);
    }

    #[test]
    fn test_quoted_values() {
        let frame = ingest_str("name;note\n\"Alice\";\"hello world\"", ';').unwrap();
        assert_eq!(frame.column("note").unwrap(), &[json!("hello world")]);
    }

    #[test]
    fn test_short_rows_pad_long_rows_drop() {
        let frame = ingest_str("a;b\n1\n1;2;3", ';').unwrap();
        assert_eq!(frame.column("a").unwrap(), &[json!(1), json!(1)]);
        assert_eq!(frame.column("b").unwrap(), &[Value::Null, json!(2)]);
    }

    #[test]
    fn test_empty_lines_skipped() {
        let frame = ingest_str("a;b\n1;2\n\n3;4\n", ';').unwrap();
        assert_eq!(frame.n_rows(), 2);
    }

    #[test]
    fn test_empty_input_errors() {
        let err = ingest_str("", ';').unwrap_err();
        assert!(err.message.contains("empty"));
        assert_eq!(err.line, 1);
    }

    #[test]
    fn test_duplicate_header_errors() {
        let err = ingest_str("a;a\n1;2", ';').unwrap_err();
        assert_eq!(err.column.as_deref(), Some("a"));
    }

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("a;b;c\n1;2;3"), ';');
        assert_eq!(detect_delimiter("a,b,c\n1,2,3"), ',');
        assert_eq!(detect_delimiter("a\tb\tc"), '\t');
        assert_eq!(detect_delimiter("a|b|c"), '|');
    }

    #[test]
    fn test_auto_detection_end_to_end() {
        let result = ingest_bytes_auto(b"name,units\nAlice,3\nBob,5").unwrap();
        assert_eq!(result.delimiter, ',');
        assert_eq!(result.headers, vec!["name", "units"]);
        assert_eq!(result.frame.n_rows(), 2);
    }

    #[test]
    fn test_latin1_decoding() {
        // "Societe" with accented e's in ISO-8859-1
        let bytes: &[u8] = &[0x53, 0x6F, 0x63, 0x69, 0xE9, 0x74, 0xE9];
        let decoded = decode_content(bytes, "iso-8859-1");
        assert!(decoded.starts_with("Soci"));
    }

    #[test]
    fn test_error_display_format() {
        let err = CsvError::new(5, "bad value").with_column("age");
        let msg = err.to_string();
        assert!(msg.contains("line 5"));
        assert!(msg.contains("'age'"));
    }
}
