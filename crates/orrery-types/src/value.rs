//! Self-describing values and the schemas that constrain them.
//!
//! [`SerializedValue`] is the representation used everywhere a typed Rust
//! value crosses the engine boundary: activity arguments, exported resource
//! samples, and the per-event payloads written to the event log. It maps
//! one-to-one onto JSON.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A tree of primitive values.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SerializedValue {
    /// The absent value.
    #[default]
    Null,
    /// A boolean.
    Boolean(bool),
    /// A signed integer.
    Int(i64),
    /// A floating-point number.
    Real(f64),
    /// A string.
    String(String),
    /// An ordered list of values.
    List(Vec<SerializedValue>),
    /// A string-keyed map of values, ordered by key.
    Map(BTreeMap<String, SerializedValue>),
}

impl SerializedValue {
    /// Build a map value from `(key, value)` pairs.
    pub fn map<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Self)>,
    {
        Self::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Whether this is [`SerializedValue::Null`].
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The boolean payload, if any.
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// The integer payload, if any.
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// The numeric payload as `f64`. Integers are widened.
    #[allow(clippy::cast_precision_loss)]
    pub const fn as_real(&self) -> Option<f64> {
        match self {
            Self::Real(r) => Some(*r),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// The string payload, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// The list payload, if any.
    pub fn as_list(&self) -> Option<&[Self]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// The map payload, if any.
    pub const fn as_map(&self) -> Option<&BTreeMap<String, Self>> {
        match self {
            Self::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// A short name for the variant, used in error messages.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean(_) => "boolean",
            Self::Int(_) => "int",
            Self::Real(_) => "real",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }
}

impl core::fmt::Display for SerializedValue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            // Non-finite reals have no JSON form.
            Err(_) => write!(f, "{self:?}"),
        }
    }
}

impl From<bool> for SerializedValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i64> for SerializedValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for SerializedValue {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<String> for SerializedValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for SerializedValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<Vec<SerializedValue>> for SerializedValue {
    fn from(value: Vec<Self>) -> Self {
        Self::List(value)
    }
}

impl From<BTreeMap<String, SerializedValue>> for SerializedValue {
    fn from(value: BTreeMap<String, Self>) -> Self {
        Self::Map(value)
    }
}

// ----------------------------------------------------------------------
// Schemas
// ----------------------------------------------------------------------

/// One admissible choice of a [`ValueSchema::Variant`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    /// The string stored in the serialized value.
    pub key: String,
    /// Human-readable label.
    pub label: String,
}

/// Structural description of the values a parameter or resource admits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValueSchema {
    /// A floating-point number (integers are accepted).
    Real,
    /// A signed integer.
    Int,
    /// A boolean.
    Boolean,
    /// A string.
    String,
    /// A duration, serialized as integer microseconds.
    Duration,
    /// A homogeneous list.
    Series {
        /// Schema of every element.
        items: Box<ValueSchema>,
    },
    /// A record with a fixed set of named fields.
    Struct {
        /// Schema of each field, by name.
        items: BTreeMap<String, ValueSchema>,
    },
    /// One of a fixed set of string keys.
    Variant {
        /// The admissible keys.
        variants: Vec<Variant>,
    },
}

impl ValueSchema {
    /// A series of `items`.
    pub fn series(items: Self) -> Self {
        Self::Series {
            items: Box::new(items),
        }
    }

    /// A struct with the given fields.
    pub fn structure<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Self)>,
    {
        Self::Struct {
            items: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// A variant whose keys double as labels.
    pub fn variant<S: Into<String>, I: IntoIterator<Item = S>>(keys: I) -> Self {
        Self::Variant {
            variants: keys
                .into_iter()
                .map(|key| {
                    let key = key.into();
                    Variant {
                        label: key.clone(),
                        key,
                    }
                })
                .collect(),
        }
    }

    /// Whether `value` conforms to this schema.
    pub fn validate(&self, value: &SerializedValue) -> bool {
        match (self, value) {
            (Self::Real, SerializedValue::Real(_) | SerializedValue::Int(_))
            | (Self::Int | Self::Duration, SerializedValue::Int(_))
            | (Self::Boolean, SerializedValue::Boolean(_))
            | (Self::String, SerializedValue::String(_)) => true,
            (Self::Series { items }, SerializedValue::List(values)) => {
                values.iter().all(|v| items.validate(v))
            }
            (Self::Struct { items }, SerializedValue::Map(fields)) => {
                items.len() == fields.len()
                    && items.iter().all(|(name, schema)| {
                        fields.get(name).is_some_and(|v| schema.validate(v))
                    })
            }
            (Self::Variant { variants }, SerializedValue::String(key)) => {
                variants.iter().any(|v| &v.key == key)
            }
            _ => false,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn json_shape_is_untagged() {
        let value = SerializedValue::map([
            ("size", SerializedValue::Real(1.5)),
            ("count", SerializedValue::Int(2)),
            ("tags", SerializedValue::List(vec!["a".into(), SerializedValue::Null])),
        ]);
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, r#"{"count":2,"size":1.5,"tags":["a",null]}"#);
        let back: SerializedValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn integers_widen_to_real() {
        assert_eq!(SerializedValue::Int(3).as_real(), Some(3.0));
        assert_eq!(SerializedValue::Boolean(true).as_real(), None);
    }

    #[test]
    fn validation_follows_structure() {
        let schema = ValueSchema::structure([
            ("x", ValueSchema::Real),
            ("mode", ValueSchema::variant(["ON", "OFF"])),
            ("samples", ValueSchema::series(ValueSchema::Int)),
        ]);
        let good = SerializedValue::map([
            ("x", SerializedValue::Int(1)),
            ("mode", "ON".into()),
            ("samples", SerializedValue::List(vec![1_i64.into(), 2_i64.into()])),
        ]);
        assert!(schema.validate(&good));

        let bad_variant = SerializedValue::map([
            ("x", SerializedValue::Int(1)),
            ("mode", "MAYBE".into()),
            ("samples", SerializedValue::List(vec![])),
        ]);
        assert!(!schema.validate(&bad_variant));

        let missing_field = SerializedValue::map([("x", SerializedValue::Int(1))]);
        assert!(!schema.validate(&missing_field));
    }

    #[test]
    fn schema_serializes_with_type_tag() {
        let json = serde_json::to_value(ValueSchema::series(ValueSchema::Boolean)).unwrap();
        assert_eq!(json, serde_json::json!({"type": "series", "items": {"type": "boolean"}}));
    }
}
