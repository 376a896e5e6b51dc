//! Page extractor
//!
//! Locates the result array inside a response body. Jira endpoints disagree
//! on where records live: search wraps them in `issues`, paged endpoints in
//! `values`, and some return a bare array.

use crate::error::{Error, Result};
use crate::types::{JsonValue, Record};

/// Which rule located the records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionRule {
    /// The configured data path was a key of the body
    DataPath,
    /// The body itself was an array
    BareArray,
    /// The body carried a `values` key
    Values,
    /// Nothing matched; the body is used as-is
    WholeBody,
}

/// Pick the first rule that applies to `body`
pub fn resolve_rule(body: &JsonValue, data_path: Option<&str>) -> ExtractionRule {
    if let (Some(path), JsonValue::Object(map)) = (data_path, body) {
        if map.contains_key(path) {
            return ExtractionRule::DataPath;
        }
    }
    match body {
        JsonValue::Array(_) => ExtractionRule::BareArray,
        JsonValue::Object(map) if map.contains_key("values") => ExtractionRule::Values,
        _ => ExtractionRule::WholeBody,
    }
}

/// Extract the records of one page
///
/// An empty or missing result yields an empty vector, which upstream
/// treats as the end of the run.
pub fn extract_records(body: &JsonValue, data_path: Option<&str>) -> Result<Vec<Record>> {
    let selected = match resolve_rule(body, data_path) {
        ExtractionRule::DataPath => data_path.and_then(|p| body.get(p)),
        ExtractionRule::Values => body.get("values"),
        ExtractionRule::BareArray | ExtractionRule::WholeBody => Some(body),
    };

    match selected {
        None | Some(JsonValue::Null) => Ok(Vec::new()),
        Some(JsonValue::Array(items)) => Ok(items.clone()),
        Some(JsonValue::Object(map)) if map.is_empty() => Ok(Vec::new()),
        Some(obj @ JsonValue::Object(_)) => Ok(vec![obj.clone()]),
        Some(other) => Err(Error::malformed(format!(
            "no record structure found{}: got {}",
            data_path
                .map(|p| format!(" at '{p}'"))
                .unwrap_or_default(),
            type_name(other)
        ))),
    }
}

/// Parse a response body
pub fn parse_body(text: &str) -> Result<JsonValue> {
    serde_json::from_str(text)
        .map_err(|e| Error::malformed(format!("Failed to parse JSON: {e}")))
}

fn type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
