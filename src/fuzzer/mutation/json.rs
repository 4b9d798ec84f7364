//! JSON Mutations - Value-level mutation helpers
//!
//! Building blocks the registry composes into candidates: wrong-typed
//! values, nesting bombs, unicode splicing and object surgery.

use rand::Rng;
use serde_json::{json, Map, Value};

use crate::schema::{Schema, SchemaKind};

/// JSON-level mutation operations
pub struct JsonMutator;

impl JsonMutator {
    /// Values of the wrong JSON type for a slot of `kind`
    pub fn type_confused(kind: &SchemaKind) -> Vec<Value> {
        match kind {
            SchemaKind::String(_) => vec![json!(12345), json!(true)],
            SchemaKind::Integer(_) | SchemaKind::Number(_) => vec![json!("abc")],
            SchemaKind::Boolean => vec![json!("maybe"), json!(2)],
            SchemaKind::Array(_) => vec![json!({"not": "an-array"})],
            SchemaKind::Object(_) => vec![json!("not-an-object"), json!([])],
        }
    }

    /// An element whose type differs from the declared item kind
    pub fn wrong_element(items: &Schema) -> Value {
        match items.kind {
            SchemaKind::String(_) => json!(123),
            SchemaKind::Integer(_) | SchemaKind::Number(_) | SchemaKind::Boolean => {
                json!("abc")
            }
            SchemaKind::Array(_) => json!("abc"),
            SchemaKind::Object(_) => json!(42),
        }
    }

    /// Deep nesting to stress parsers
    pub fn deep_nest(depth: usize, array_mode: bool) -> Value {
        let mut v = json!("leaf");
        for _ in 0..depth {
            if array_mode {
                v = json!([v]);
            } else {
                v = json!({"nested": v});
            }
        }
        v
    }

    /// Splice a unicode token into `s` at an RNG-chosen position
    pub fn unicode_inject(s: &str, token: &str, rng: &mut impl Rng) -> String {
        match rng.gen_range(0..4) {
            0 => format!("{}{}", token, s),
            1 => format!("{}{}", s, token),
            2 => {
                let chars: Vec<char> = s.chars().collect();
                let mid = chars.len() / 2;
                let head: String = chars[..mid].iter().collect();
                let tail: String = chars[mid..].iter().collect();
                format!("{}{}{}", head, token, tail)
            }
            _ => format!("{}{}{}", token, s, token),
        }
    }

    /// `len` copies of `item`
    pub fn repeated(item: &Value, len: usize) -> Value {
        Value::Array(vec![item.clone(); len])
    }

    /// Object view of a baseline; non-objects start empty
    pub fn as_map(value: &Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    /// Copy of `base` with `key` set to `value`
    pub fn with_field(base: &Value, key: &str, value: Value) -> Value {
        let mut map = Self::as_map(base);
        map.insert(key.to_string(), value);
        Value::Object(map)
    }

    /// Copy of `base` without `key`
    pub fn without_field(base: &Value, key: &str) -> Value {
        let mut map = Self::as_map(base);
        map.remove(key);
        Value::Object(map)
    }

    /// Text form of a baseline for string-level splicing
    pub fn text_of(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}
