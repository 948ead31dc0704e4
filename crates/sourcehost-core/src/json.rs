//! Import: json (spec.md §4.4 "Import: json"; the `json` namespace proper is
//! a single operation — byte buffer to generic value).

use crate::value::Value;

/// Parse a byte buffer as JSON and convert it into the dynamic [`Value`]
/// model the `std`/`defaults` imports traffic in, so a parsed JSON document
/// can be read back through the same `typeof`/`read_*` entry points as any
/// other dynamic value.
pub fn parse(bytes: &[u8]) -> Result<Value, JsonError> {
    let parsed: serde_json::Value = serde_json::from_slice(bytes).map_err(|_| JsonError::InvalidJson)?;
    Ok(from_serde_json(parsed))
}

#[derive(Debug, thiserror::Error)]
pub enum JsonError {
    #[error("invalid JSON")]
    InvalidJson,
}

fn from_serde_json(value: serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(items) => Value::Array(items.into_iter().map(from_serde_json).collect()),
        serde_json::Value::Object(map) => {
            Value::Object(map.into_iter().map(|(k, v)| (k, from_serde_json(v))).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_structures() {
        let value = parse(br#"{"a": 1, "b": [true, null, "x"]}"#).unwrap();
        assert_eq!(value.object_get("a"), Some(&Value::Int(1)));
        match value.object_get("b") {
            Some(Value::Array(items)) => {
                assert_eq!(items[0], Value::Bool(true));
                assert_eq!(items[1], Value::Null);
                assert_eq!(items[2], Value::String("x".into()));
            }
            _ => panic!("expected array"),
        }
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(parse(b"{not json"), Err(JsonError::InvalidJson)));
    }
}
