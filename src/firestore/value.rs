//! Conversion between JSON records and Firestore's typed values.

use super::models::{ArrayValue, MapValue, Value};
use crate::backend::{BackendError, BackendResult, Record};
use serde_json::{json, Number, Value as JsonValue};
use std::collections::HashMap;

pub(crate) fn encode_record(record: &Record) -> BackendResult<HashMap<String, Value>> {
    record
        .iter()
        .map(|(field, value)| Ok((field.clone(), encode_value(value)?)))
        .collect()
}

fn encode_value(value: &JsonValue) -> BackendResult<Value> {
    Ok(match value {
        JsonValue::Null => Value::NullValue(()),
        JsonValue::Bool(b) => Value::BooleanValue(*b),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::IntegerValue(i.to_string())
            } else if let Some(f) = n.as_f64() {
                // u64 above i64::MAX lands here too; Firestore has no unsigned type.
                Value::DoubleValue(f)
            } else {
                return Err(BackendError::InvalidDocument(format!(
                    "unsupported number: {}",
                    n
                )));
            }
        }
        JsonValue::String(s) => Value::StringValue(s.clone()),
        JsonValue::Array(values) => Value::ArrayValue(ArrayValue {
            values: values.iter().map(encode_value).collect::<BackendResult<_>>()?,
        }),
        JsonValue::Object(map) => Value::MapValue(MapValue {
            fields: encode_record(map)?,
        }),
    })
}

pub(crate) fn decode_fields(fields: HashMap<String, Value>) -> BackendResult<Record> {
    fields
        .into_iter()
        .map(|(field, value)| Ok((field, decode_value(value)?)))
        .collect()
}

fn decode_value(value: Value) -> BackendResult<JsonValue> {
    Ok(match value {
        Value::StringValue(s) => JsonValue::String(s),
        Value::IntegerValue(s) => {
            let i: i64 = s.parse().map_err(|e| {
                BackendError::InvalidDocument(format!("bad integer value '{}': {}", s, e))
            })?;
            JsonValue::Number(i.into())
        }
        // JSON has no NaN or infinity.
        Value::DoubleValue(d) => Number::from_f64(d).map_or(JsonValue::Null, JsonValue::Number),
        Value::BooleanValue(b) => JsonValue::Bool(b),
        Value::MapValue(map) => JsonValue::Object(decode_fields(map.fields)?),
        Value::ArrayValue(array) => JsonValue::Array(
            array
                .values
                .into_iter()
                .map(decode_value)
                .collect::<BackendResult<_>>()?,
        ),
        Value::NullValue(()) => JsonValue::Null,
        Value::GeoPointValue(point) => {
            json!({ "latitude": point.latitude, "longitude": point.longitude })
        }
        Value::TimestampValue(s) | Value::BytesValue(s) | Value::ReferenceValue(s) => {
            JsonValue::String(s)
        }
    })
}

/// Quotes a top-level field name for use in an update mask.
pub(crate) fn field_path(field: &str) -> String {
    let mut chars = field.chars();
    let simple = matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric());

    if simple {
        field.to_string()
    } else {
        let escaped = field.replace('\\', "\\\\").replace('`', "\\`");
        format!("`{}`", escaped)
    }
}
