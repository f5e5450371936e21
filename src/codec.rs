//! # Attribute Value Codec
//!
//! Converts between native value trees ([`StructuredValue`]) and the tagged
//! wire representation ([`WireAttribute`]) that the document store persists.
//! User profiles and conversation history pass through here on every read and
//! write.
//!
//! ## Wire Tags:
//! - **S**: string payload
//! - **N**: number, carried as decimal text
//! - **BOOL**: boolean payload
//! - **NULL**: always the literal `true`
//! - **L**: list of wire attributes
//! - **M**: map of wire attributes
//!
//! ## Numeric Round Trips:
//! Decoding tries an integer parse first and falls back to a real parse, so
//! `"3"` becomes `Integer(3)` and `"3.14"` becomes `Real(3.14)`. Reals are
//! always written with a fractional part or exponent (`3.0`, `1e20`) so they
//! come back as reals. Text written by other producers that spells a whole
//! integer as `"3.0"` decodes as a real; the original subtype is not recoverable
//! from the text alone.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A stored document: top-level attribute names mapped to wire attributes.
pub type Item = BTreeMap<String, WireAttribute>;

/// Native value tree used for conversation and profile state.
#[derive(Debug, Clone, PartialEq)]
pub enum StructuredValue {
    String(String),
    Integer(i64),
    Real(f64),
    Bool(bool),
    Null,
    List(Vec<StructuredValue>),
    Map(BTreeMap<String, StructuredValue>),
}

/// Tagged on-wire form of a [`StructuredValue`].
///
/// Serde's external tagging gives exactly the single-key shape the store
/// expects, e.g. `{"S": "hello"}` or `{"M": {"a": {"N": "1"}}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WireAttribute {
    #[serde(rename = "S")]
    S(String),
    #[serde(rename = "N")]
    N(String),
    #[serde(rename = "BOOL")]
    Bool(bool),
    #[serde(rename = "NULL")]
    Null(bool),
    #[serde(rename = "L")]
    L(Vec<WireAttribute>),
    #[serde(rename = "M")]
    M(BTreeMap<String, WireAttribute>),
}

impl WireAttribute {
    /// The tag key this attribute is written under.
    pub fn tag(&self) -> &'static str {
        match self {
            WireAttribute::S(_) => "S",
            WireAttribute::N(_) => "N",
            WireAttribute::Bool(_) => "BOOL",
            WireAttribute::Null(_) => "NULL",
            WireAttribute::L(_) => "L",
            WireAttribute::M(_) => "M",
        }
    }
}

/// Encode a native value into its wire attribute.
pub fn encode(value: &StructuredValue) -> WireAttribute {
    match value {
        StructuredValue::Null => WireAttribute::Null(true),
        StructuredValue::Bool(b) => WireAttribute::Bool(*b),
        StructuredValue::String(s) => WireAttribute::S(s.clone()),
        StructuredValue::Integer(i) => WireAttribute::N(i.to_string()),
        // NaN and infinities have no numeric wire spelling
        StructuredValue::Real(f) if !f.is_finite() => WireAttribute::Null(true),
        StructuredValue::Real(f) => WireAttribute::N(format_real(*f)),
        StructuredValue::List(items) => WireAttribute::L(items.iter().map(encode).collect()),
        StructuredValue::Map(entries) => WireAttribute::M(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), encode(v)))
                .collect(),
        ),
    }
}

/// Decode a wire attribute back into a native value.
pub fn decode(attr: &WireAttribute) -> StructuredValue {
    match attr {
        WireAttribute::Null(_) => StructuredValue::Null,
        WireAttribute::S(s) => StructuredValue::String(s.clone()),
        WireAttribute::N(text) => decode_number(text),
        WireAttribute::Bool(b) => StructuredValue::Bool(*b),
        WireAttribute::L(items) => StructuredValue::List(items.iter().map(decode).collect()),
        WireAttribute::M(entries) => StructuredValue::Map(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), decode(v)))
                .collect(),
        ),
    }
}

/// Encode every top-level field of a map into a storable item.
pub fn encode_item(fields: &BTreeMap<String, StructuredValue>) -> Item {
    fields.iter().map(|(k, v)| (k.clone(), encode(v))).collect()
}

/// Decode a stored item back into its top-level fields.
pub fn decode_item(item: &Item) -> BTreeMap<String, StructuredValue> {
    item.iter().map(|(k, v)| (k.clone(), decode(v))).collect()
}

fn decode_number(text: &str) -> StructuredValue {
    if let Ok(i) = text.parse::<i64>() {
        return StructuredValue::Integer(i);
    }
    match text.parse::<f64>() {
        Ok(f) => StructuredValue::Real(f),
        // Not numeric text at all; keep it rather than fail the whole item
        Err(_) => StructuredValue::String(text.to_string()),
    }
}

/// Debug formatting keeps a `.0` on whole reals and switches to exponent
/// notation for very large or small magnitudes.
fn format_real(f: f64) -> String {
    format!("{:?}", f)
}

impl StructuredValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            StructuredValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            StructuredValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Integers widen to reals here.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            StructuredValue::Integer(i) => Some(*i as f64),
            StructuredValue::Real(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, StructuredValue>> {
        match self {
            StructuredValue::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Look up a key when this value is a map.
    pub fn get(&self, key: &str) -> Option<&StructuredValue> {
        self.as_map().and_then(|entries| entries.get(key))
    }

    /// Convert into a JSON value for HTTP responses.
    ///
    /// Non-finite reals have no JSON spelling and become `null`.
    pub fn to_json(&self) -> Value {
        match self {
            StructuredValue::String(s) => Value::String(s.clone()),
            StructuredValue::Integer(i) => Value::from(*i),
            StructuredValue::Real(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            StructuredValue::Bool(b) => Value::Bool(*b),
            StructuredValue::Null => Value::Null,
            StructuredValue::List(items) => {
                Value::Array(items.iter().map(StructuredValue::to_json).collect())
            }
            StructuredValue::Map(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

impl From<Value> for StructuredValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => StructuredValue::Null,
            Value::Bool(b) => StructuredValue::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    StructuredValue::Integer(i)
                } else if n.is_u64() {
                    // Beyond i64 range: fall back to the textual form
                    StructuredValue::String(n.to_string())
                } else {
                    n.as_f64()
                        .map(StructuredValue::Real)
                        .unwrap_or_else(|| StructuredValue::String(n.to_string()))
                }
            }
            Value::String(s) => StructuredValue::String(s),
            Value::Array(items) => {
                StructuredValue::List(items.into_iter().map(StructuredValue::from).collect())
            }
            Value::Object(entries) => StructuredValue::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, StructuredValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for StructuredValue {
    fn from(s: &str) -> Self {
        StructuredValue::String(s.to_string())
    }
}

impl From<String> for StructuredValue {
    fn from(s: String) -> Self {
        StructuredValue::String(s)
    }
}

impl From<i64> for StructuredValue {
    fn from(i: i64) -> Self {
        StructuredValue::Integer(i)
    }
}

impl From<u32> for StructuredValue {
    fn from(i: u32) -> Self {
        StructuredValue::Integer(i64::from(i))
    }
}

impl From<usize> for StructuredValue {
    fn from(n: usize) -> Self {
        i64::try_from(n)
            .map(StructuredValue::Integer)
            .unwrap_or_else(|_| StructuredValue::String(n.to_string()))
    }
}

impl From<f64> for StructuredValue {
    fn from(f: f64) -> Self {
        StructuredValue::Real(f)
    }
}

impl From<bool> for StructuredValue {
    fn from(b: bool) -> Self {
        StructuredValue::Bool(b)
    }
}

/// Timestamps have no native tag and are stored as RFC 3339 text.
impl From<DateTime<Utc>> for StructuredValue {
    fn from(ts: DateTime<Utc>) -> Self {
        StructuredValue::String(ts.to_rfc3339())
    }
}

impl<T: Into<StructuredValue>> From<Option<T>> for StructuredValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(StructuredValue::Null)
    }
}

impl From<Vec<StructuredValue>> for StructuredValue {
    fn from(items: Vec<StructuredValue>) -> Self {
        StructuredValue::List(items)
    }
}

impl From<BTreeMap<String, StructuredValue>> for StructuredValue {
    fn from(entries: BTreeMap<String, StructuredValue>) -> Self {
        StructuredValue::Map(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_tree() -> StructuredValue {
        StructuredValue::from(json!({
            "phone_number": "+919876543210",
            "total_interactions": 7,
            "verified": true,
            "location": null,
            "history": [
                {"user_input": "मौसम कैसा है?", "turn": 1},
                {"user_input": "धन्यवाद", "turn": -2}
            ],
            "tags": ["wheat", "", "rabi"]
        }))
    }

    #[test]
    fn test_round_trip_nested_tree() {
        let value = sample_tree();
        assert_eq!(decode(&encode(&value)), value);
    }

    #[test]
    fn test_scalar_encoding() {
        assert_eq!(encode(&StructuredValue::Null), WireAttribute::Null(true));
        assert_eq!(encode(&StructuredValue::Bool(false)), WireAttribute::Bool(false));
        assert_eq!(encode(&StructuredValue::Integer(42)), WireAttribute::N("42".to_string()));
        assert_eq!(encode(&StructuredValue::Real(3.14)), WireAttribute::N("3.14".to_string()));
        assert_eq!(encode(&StructuredValue::Real(3.0)), WireAttribute::N("3.0".to_string()));
    }

    #[test]
    fn test_non_finite_reals_encode_as_null() {
        for f in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let value = StructuredValue::Real(f);
            assert_eq!(encode(&value), WireAttribute::Null(true));
            assert_eq!(decode(&encode(&value)), StructuredValue::Null);
            assert_eq!(value.to_json(), Value::Null);
        }
    }

    #[test]
    fn test_booleans_never_become_numbers() {
        let value = StructuredValue::from(json!(true));
        assert_eq!(encode(&value).tag(), "BOOL");
    }

    #[test]
    fn test_numeric_decode_prefers_integer() {
        assert_eq!(decode(&WireAttribute::N("3".into())), StructuredValue::Integer(3));
        assert_eq!(decode(&WireAttribute::N("3.14".into())), StructuredValue::Real(3.14));
        assert_eq!(decode(&WireAttribute::N("3.0".into())), StructuredValue::Real(3.0));
        assert_eq!(decode(&WireAttribute::N("-17".into())), StructuredValue::Integer(-17));
    }

    #[test]
    fn test_real_round_trip_keeps_subtype() {
        for f in [0.5, 3.0, -2.25, 1e20, 1.5e-7] {
            let value = StructuredValue::Real(f);
            assert_eq!(decode(&encode(&value)), value, "round trip failed for {}", f);
        }
    }

    #[test]
    fn test_non_numeric_text_decodes_as_string() {
        assert_eq!(
            decode(&WireAttribute::N("twelve".into())),
            StructuredValue::String("twelve".to_string())
        );
    }

    #[test]
    fn test_wire_json_shape() {
        let attr = encode(&StructuredValue::from(json!({"a": [1, "x", null]})));
        let wire = serde_json::to_value(&attr).unwrap();
        assert_eq!(
            wire,
            json!({"M": {"a": {"L": [{"N": "1"}, {"S": "x"}, {"NULL": true}]}}})
        );

        let parsed: WireAttribute = serde_json::from_value(wire).unwrap();
        assert_eq!(parsed, attr);
    }

    #[test]
    fn test_oversized_unsigned_falls_back_to_string() {
        let value = StructuredValue::from(json!(u64::MAX));
        assert_eq!(value, StructuredValue::String(u64::MAX.to_string()));
        assert_eq!(encode(&value).tag(), "S");
    }

    #[test]
    fn test_item_helpers() {
        let mut fields = BTreeMap::new();
        fields.insert("phone_number".to_string(), StructuredValue::from("+911234567890"));
        fields.insert("total_interactions".to_string(), StructuredValue::from(3i64));

        let item = encode_item(&fields);
        assert_eq!(item["phone_number"], WireAttribute::S("+911234567890".to_string()));
        assert_eq!(decode_item(&item), fields);
    }

    #[test]
    fn test_to_json_mirrors_from_json() {
        let original = json!({"a": 1, "b": [true, null, "s"], "c": 2.5});
        assert_eq!(StructuredValue::from(original.clone()).to_json(), original);
    }
}
