use rusqlite::types::Value as SqlValue;
use serde_json::Value;
use threadloom_common::Result;

/// Maps a JSON value onto a single SQLite scalar.
///
/// `null` becomes SQL `NULL`, objects and arrays are stored as compact JSON
/// text, and strings, numbers and booleans keep their scalar form. Object keys
/// come out sorted, so the same value always produces the same text.
pub fn normalize(value: &Value) -> Result<SqlValue> {
    let normalized = match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => n.as_f64().map_or(SqlValue::Null, SqlValue::Real),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(serde_json::to_string(value)?),
    };
    Ok(normalized)
}

/// Same as [`normalize`], treating a missing value like `null`.
pub fn normalize_opt(value: Option<&Value>) -> Result<SqlValue> {
    value.map_or(Ok(SqlValue::Null), normalize)
}
