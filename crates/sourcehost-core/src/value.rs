//! The dynamic, any-typed value model the `std`/`defaults` import
//! namespaces traffic in.
//!
//! Historically these imports accept dynamic, any-typed values mirroring a
//! scripting-language object model (spec.md §9, "Dynamic values through
//! imports"). We represent that as a tagged sum stored in the resource
//! table and dispatched through `typeof`/`read_*` entry points, rather than
//! threading a dozen near-identical host functions through `serde_json`.

use std::collections::HashMap;

/// A dynamic value, as seen by the `std`/`defaults`/legacy `aidoku` imports.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
    Array(Vec<Value>),
    /// Insertion-ordered object, matching the iteration order a plugin's
    /// own object model would expose through `keys`/`values`.
    Object(Vec<(String, Value)>),
    /// Seconds since the Unix epoch.
    Date(i64),
    /// The raw encoded form returned by `defaults.get` before the plugin's
    /// own postcard reader interprets it, or arbitrary opaque bytes.
    Bytes(Vec<u8>),
}

/// The logical kind reported by the `typeof` import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeTag {
    Null = 0,
    Int = 1,
    Float = 2,
    String = 3,
    Bool = 4,
    Array = 5,
    Object = 6,
    Date = 7,
    Node = 8,
    Unknown = 9,
}

impl Value {
    pub fn type_tag(&self) -> TypeTag {
        match self {
            Value::Null => TypeTag::Null,
            Value::Int(_) => TypeTag::Int,
            Value::Float(_) => TypeTag::Float,
            Value::String(_) => TypeTag::String,
            Value::Bool(_) => TypeTag::Bool,
            Value::Array(_) => TypeTag::Array,
            Value::Object(_) => TypeTag::Object,
            Value::Date(_) => TypeTag::Date,
            Value::Bytes(_) => TypeTag::Unknown,
        }
    }

    /// Postcard-encode this value the way `defaults.get` does: bool -> bool
    /// byte, integer -> zigzag varint i32, float -> f32, string -> string,
    /// array -> vec of strings, null -> empty bytes.
    pub fn encode_for_settings(&self) -> Vec<u8> {
        match self {
            Value::Null => Vec::new(),
            Value::Bool(b) => postcard::to_allocvec(b).unwrap_or_default(),
            Value::Int(i) => postcard::to_allocvec(&(*i as i32)).unwrap_or_default(),
            Value::Float(f) => postcard::to_allocvec(&(*f as f32)).unwrap_or_default(),
            Value::String(s) => postcard::to_allocvec(s).unwrap_or_default(),
            Value::Array(items) => {
                let strings: Vec<String> = items.iter().map(|v| v.as_display_string()).collect();
                postcard::to_allocvec(&strings).unwrap_or_default()
            }
            Value::Bytes(b) => b.clone(),
            Value::Date(d) => postcard::to_allocvec(d).unwrap_or_default(),
        }
    }

    fn as_display_string(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Null => String::new(),
            _ => String::new(),
        }
    }

    /// Opportunistically decode a raw-bytes value as a settings-path
    /// integer: try postcard string, then i64, then f32, then bool. This is
    /// the compatibility wart spec.md §9 calls out for `read_int` et al.
    /// operating on the encoded form `defaults.get` produces.
    pub fn coerce_int(bytes: &[u8]) -> Option<i64> {
        if let Ok(s) = postcard::from_bytes::<String>(bytes) {
            if let Ok(i) = s.parse::<i64>() {
                return Some(i);
            }
        }
        if let Ok(i) = postcard::from_bytes::<i32>(bytes) {
            return Some(i as i64);
        }
        if let Ok(f) = postcard::from_bytes::<f32>(bytes) {
            return Some(f as i64);
        }
        if let Ok(b) = postcard::from_bytes::<bool>(bytes) {
            return Some(b as i64);
        }
        None
    }

    pub fn coerce_float(bytes: &[u8]) -> Option<f64> {
        if let Ok(s) = postcard::from_bytes::<String>(bytes) {
            if let Ok(f) = s.parse::<f64>() {
                return Some(f);
            }
        }
        if let Ok(f) = postcard::from_bytes::<f32>(bytes) {
            return Some(f as f64);
        }
        if let Ok(i) = postcard::from_bytes::<i32>(bytes) {
            return Some(i as f64);
        }
        None
    }

    pub fn coerce_bool(bytes: &[u8]) -> Option<bool> {
        if let Ok(b) = postcard::from_bytes::<bool>(bytes) {
            return Some(b);
        }
        if let Ok(s) = postcard::from_bytes::<String>(bytes) {
            return Some(!s.is_empty() && s != "false" && s != "0");
        }
        None
    }

    pub fn object_get<'a>(&'a self, key: &str) -> Option<&'a Value> {
        match self {
            Value::Object(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn object_set(&mut self, key: impl Into<String>, value: Value) {
        if let Value::Object(entries) = self {
            let key = key.into();
            if let Some(existing) = entries.iter_mut().find(|(k, _)| *k == key) {
                existing.1 = value;
            } else {
                entries.push((key, value));
            }
        }
    }

    pub fn object_remove(&mut self, key: &str) -> Option<Value> {
        if let Value::Object(entries) = self {
            if let Some(pos) = entries.iter().position(|(k, _)| k == key) {
                return Some(entries.remove(pos).1);
            }
        }
        None
    }
}

impl From<HashMap<String, String>> for Value {
    fn from(map: HashMap<String, String>) -> Self {
        Value::Object(map.into_iter().map(|(k, v)| (k, Value::String(v))).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_tags_match_spec_order() {
        assert_eq!(Value::Null.type_tag(), TypeTag::Null);
        assert_eq!(Value::Int(1).type_tag(), TypeTag::Int);
        assert_eq!(Value::Date(0).type_tag(), TypeTag::Date);
    }

    #[test]
    fn settings_encoding_matches_shapes() {
        assert_eq!(Value::Null.encode_for_settings(), Vec::<u8>::new());
        assert!(!Value::Bool(true).encode_for_settings().is_empty());
    }

    #[test]
    fn coerce_int_tries_string_then_numeric() {
        let bytes = postcard::to_allocvec(&"42".to_string()).unwrap();
        assert_eq!(Value::coerce_int(&bytes), Some(42));

        let bytes = postcard::to_allocvec(&7i32).unwrap();
        assert_eq!(Value::coerce_int(&bytes), Some(7));
    }

    #[test]
    fn object_get_set_remove_roundtrip() {
        let mut v = Value::Object(Vec::new());
        v.object_set("a", Value::Int(1));
        assert_eq!(v.object_get("a"), Some(&Value::Int(1)));
        v.object_set("a", Value::Int(2));
        assert_eq!(v.object_get("a"), Some(&Value::Int(2)));
        assert_eq!(v.object_remove("a"), Some(Value::Int(2)));
        assert_eq!(v.object_get("a"), None);
    }
}
