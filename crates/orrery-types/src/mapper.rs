//! Conversions between typed Rust values and [`SerializedValue`].
//!
//! Mission models register one mapper per exported parameter or resource.
//! There is no reflection: each mapper is a plain value chosen at
//! registration time, and compound mappers are built by composition
//! (for example `ListValueMapper::new(RealValueMapper)`).

use crate::duration::Duration;
use crate::value::{SerializedValue, ValueSchema};

/// Errors produced when a serialized value does not have the expected shape.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MapperError {
    /// The value is of the wrong kind.
    #[error("expected {expected}, found {found}")]
    UnexpectedKind {
        /// What the mapper accepts.
        expected: &'static str,
        /// What was supplied.
        found: &'static str,
    },

    /// An element of a list failed to map.
    #[error("element {index}: {source}")]
    Element {
        /// Position of the failing element.
        index: usize,
        /// Why it failed.
        #[source]
        source: Box<MapperError>,
    },
}

/// Bidirectional conversion between `T` and [`SerializedValue`].
pub trait ValueMapper<T>: Send + Sync {
    /// Schema of the serialized form.
    fn value_schema(&self) -> ValueSchema;

    /// Convert a typed value to its serialized form.
    fn serialize_value(&self, value: &T) -> SerializedValue;

    /// Convert a serialized value back to `T`.
    fn deserialize_value(&self, value: &SerializedValue) -> Result<T, MapperError>;
}

fn unexpected(expected: &'static str, value: &SerializedValue) -> MapperError {
    MapperError::UnexpectedKind {
        expected,
        found: value.kind(),
    }
}

/// Maps `bool`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BooleanValueMapper;

impl ValueMapper<bool> for BooleanValueMapper {
    fn value_schema(&self) -> ValueSchema {
        ValueSchema::Boolean
    }

    fn serialize_value(&self, value: &bool) -> SerializedValue {
        SerializedValue::Boolean(*value)
    }

    fn deserialize_value(&self, value: &SerializedValue) -> Result<bool, MapperError> {
        value.as_bool().ok_or_else(|| unexpected("boolean", value))
    }
}

/// Maps `i64`.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntValueMapper;

impl ValueMapper<i64> for IntValueMapper {
    fn value_schema(&self) -> ValueSchema {
        ValueSchema::Int
    }

    fn serialize_value(&self, value: &i64) -> SerializedValue {
        SerializedValue::Int(*value)
    }

    fn deserialize_value(&self, value: &SerializedValue) -> Result<i64, MapperError> {
        value.as_int().ok_or_else(|| unexpected("int", value))
    }
}

/// Maps `f64`. Accepts integers on input.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealValueMapper;

impl ValueMapper<f64> for RealValueMapper {
    fn value_schema(&self) -> ValueSchema {
        ValueSchema::Real
    }

    fn serialize_value(&self, value: &f64) -> SerializedValue {
        SerializedValue::Real(*value)
    }

    fn deserialize_value(&self, value: &SerializedValue) -> Result<f64, MapperError> {
        value.as_real().ok_or_else(|| unexpected("real", value))
    }
}

/// Maps `String`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringValueMapper;

impl ValueMapper<String> for StringValueMapper {
    fn value_schema(&self) -> ValueSchema {
        ValueSchema::String
    }

    fn serialize_value(&self, value: &String) -> SerializedValue {
        SerializedValue::String(value.clone())
    }

    fn deserialize_value(&self, value: &SerializedValue) -> Result<String, MapperError> {
        value
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| unexpected("string", value))
    }
}

/// Maps [`Duration`] as integer microseconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct DurationValueMapper;

impl ValueMapper<Duration> for DurationValueMapper {
    fn value_schema(&self) -> ValueSchema {
        ValueSchema::Duration
    }

    fn serialize_value(&self, value: &Duration) -> SerializedValue {
        SerializedValue::Int(value.micros())
    }

    fn deserialize_value(&self, value: &SerializedValue) -> Result<Duration, MapperError> {
        value
            .as_int()
            .map(Duration::from_micros)
            .ok_or_else(|| unexpected("duration", value))
    }
}

/// Maps `Vec<T>` given a mapper for `T`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListValueMapper<M> {
    element: M,
}

impl<M> ListValueMapper<M> {
    /// Build a list mapper from an element mapper.
    pub const fn new(element: M) -> Self {
        Self { element }
    }
}

impl<T, M: ValueMapper<T>> ValueMapper<Vec<T>> for ListValueMapper<M> {
    fn value_schema(&self) -> ValueSchema {
        ValueSchema::series(self.element.value_schema())
    }

    fn serialize_value(&self, value: &Vec<T>) -> SerializedValue {
        SerializedValue::List(value.iter().map(|v| self.element.serialize_value(v)).collect())
    }

    fn deserialize_value(&self, value: &SerializedValue) -> Result<Vec<T>, MapperError> {
        let items = value.as_list().ok_or_else(|| unexpected("list", value))?;
        items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                self.element
                    .deserialize_value(item)
                    .map_err(|e| MapperError::Element {
                        index,
                        source: Box::new(e),
                    })
            })
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn real_mapper_accepts_integers() {
        assert_eq!(RealValueMapper.deserialize_value(&SerializedValue::Int(4)).unwrap(), 4.0);
        assert!(matches!(
            RealValueMapper.deserialize_value(&"4".into()),
            Err(MapperError::UnexpectedKind { expected: "real", found: "string" })
        ));
    }

    #[test]
    fn list_mapper_reports_failing_element() {
        let mapper = ListValueMapper::new(IntValueMapper);
        let value = SerializedValue::List(vec![1_i64.into(), true.into()]);
        let err = mapper.deserialize_value(&value).unwrap_err();
        assert!(matches!(err, MapperError::Element { index: 1, .. }));
        assert_eq!(mapper.value_schema(), ValueSchema::series(ValueSchema::Int));
    }

    #[test]
    fn duration_mapper_uses_micros() {
        let d = Duration::of(3, Duration::SECOND);
        let serialized = DurationValueMapper.serialize_value(&d);
        assert_eq!(serialized, SerializedValue::Int(3_000_000));
        assert_eq!(DurationValueMapper.deserialize_value(&serialized).unwrap(), d);
    }
}
