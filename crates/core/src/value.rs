//! JSON value type with a canonical encoding.
//!
//! Values are stored, replicated, and hashed as canonical JSON: object keys
//! sorted ascending, no insignificant whitespace. Using `BTreeMap` for the
//! object variant makes the derived serde encoding canonical by
//! construction, so equality of encoded forms is well-defined across nodes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Result;

/// A JSON-serializable document.
///
/// The untagged representation round-trips through plain JSON: `null`,
/// booleans, numbers, strings, arrays, and string-keyed objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// JSON null
    Null,
    /// JSON boolean
    Bool(bool),
    /// JSON number (stored as f64, as in the wire format)
    Number(f64),
    /// JSON string
    String(String),
    /// JSON array
    Array(Vec<Value>),
    /// JSON object; BTreeMap keeps keys sorted for canonical encoding
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// Encode to canonical JSON (sorted object keys, compact separators).
    ///
    /// This is the byte form used for Merkle leaf hashing and for snapshot
    /// storage. Serialization cannot fail for this type: object keys are
    /// strings and serde_json renders non-finite floats as `null`.
    pub fn canonical_json(&self) -> String {
        serde_json::to_string(self).expect("Value serialization is infallible")
    }

    /// Decode a value from its JSON text form.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// True for `Value::Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn obj(entries: &[(&str, Value)]) -> Value {
        Value::Object(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn test_canonical_sorts_object_keys() {
        let value = obj(&[
            ("zeta", Value::from(1i64)),
            ("alpha", Value::from(2i64)),
            ("mid", Value::from(3i64)),
        ]);
        assert_eq!(
            value.canonical_json(),
            r#"{"alpha":2.0,"mid":3.0,"zeta":1.0}"#
        );
    }

    #[test]
    fn test_roundtrip_all_variants() {
        let samples = vec![
            Value::Null,
            Value::Bool(true),
            Value::from(42i64),
            Value::from(2.5),
            Value::from("hello"),
            Value::Array(vec![Value::Null, Value::from("x")]),
            obj(&[("nested", Value::Array(vec![Value::Bool(false)]))]),
        ];
        for value in samples {
            let encoded = value.canonical_json();
            let decoded = Value::from_json(&encoded).unwrap();
            assert_eq!(value, decoded, "roundtrip of {encoded}");
        }
    }

    #[test]
    fn test_from_json_accepts_integers() {
        let value = Value::from_json("7").unwrap();
        assert_eq!(value, Value::Number(7.0));
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(Value::from_json("{oops").is_err());
    }

    #[test]
    fn test_is_null() {
        assert!(Value::Null.is_null());
        assert!(!Value::Bool(false).is_null());
    }

    fn arb_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            (-1e9f64..1e9).prop_map(Value::Number),
            "[a-z0-9 ]{0,12}".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,6}", inner, 0..4).prop_map(Value::Object),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_encode_decode_identity(value in arb_value()) {
            let decoded = Value::from_json(&value.canonical_json()).unwrap();
            prop_assert_eq!(&value, &decoded);
        }

        #[test]
        fn prop_canonical_is_deterministic(value in arb_value()) {
            prop_assert_eq!(value.canonical_json(), value.clone().canonical_json());
        }
    }
}
