//! Schema validation of raw anomaly records at the feed boundary.
//!
//! Feeds deliver loosely-typed JSON. Every record passes through
//! [`validate_record`] before it can become an [`AnomalyEvent`]; a record that
//! fails produces a tagged [`ValidationError`] naming the offending field
//! instead of slipping through partially shaped.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::event::AnomalyEvent;
use crate::geometry::Coordinate;

/// Why a raw record was refused.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    /// The payload was not parseable JSON at all.
    #[error("payload is not valid JSON: {0}")]
    MalformedJson(String),

    /// The record (or payload) is neither an object nor an array of objects.
    #[error("record is not a JSON object")]
    NotAnObject,

    /// A required field is absent or `null`.
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    /// A field is present but has the wrong JSON type.
    #[error("field `{field}` must be {expected}")]
    WrongType {
        /// Name of the field.
        field: &'static str,
        /// Human-readable expected type.
        expected: &'static str,
    },

    /// `parameter` is empty or whitespace.
    #[error("field `parameter` must not be empty")]
    EmptyParameter,

    /// `value` is not a finite number.
    #[error("field `value` must be finite")]
    NonFiniteValue,

    /// `time` is not an RFC 3339 instant.
    #[error("field `time` is not an RFC 3339 instant: {0}")]
    InvalidTimestamp(String),

    /// Only one of `latitude` / `longitude` was supplied.
    #[error("latitude and longitude must be both present or both absent")]
    PartialCoordinates,

    /// The coordinate is non-finite or outside degree ranges.
    #[error("coordinate out of range: ({latitude}, {longitude})")]
    CoordinateOutOfRange {
        /// Supplied latitude.
        latitude: f64,
        /// Supplied longitude.
        longitude: f64,
    },
}

/// Validate one raw JSON record and build an [`AnomalyEvent`].
///
/// Field rules:
///
/// | Field | Rule |
/// |-------|------|
/// | `parameter` | required, non-empty string |
/// | `value` | required, number |
/// | `time` | required, RFC 3339 string |
/// | `latitude` / `longitude` | optional numbers, both or neither (`null` = absent) |
/// | `description` | optional string, defaults to empty |
pub fn validate_record(record: &Value) -> Result<AnomalyEvent, ValidationError> {
    let object = record.as_object().ok_or(ValidationError::NotAnObject)?;

    let parameter = required_str(object, "parameter")?;
    let value = required(object, "value")?
        .as_f64()
        .ok_or(ValidationError::WrongType {
            field: "value",
            expected: "a number",
        })?;
    let time = required_str(object, "time")?;
    let timestamp = DateTime::parse_from_rfc3339(time)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| ValidationError::InvalidTimestamp(format!("{time}: {e}")))?;

    let latitude = optional_f64(object, "latitude")?;
    let longitude = optional_f64(object, "longitude")?;
    let location = match (latitude, longitude) {
        (Some(lat), Some(lon)) => Some(Coordinate::new(lat, lon)),
        (None, None) => None,
        _ => return Err(ValidationError::PartialCoordinates),
    };

    let description = match object.get("description") {
        None | Some(Value::Null) => "",
        Some(Value::String(s)) => s.as_str(),
        Some(_) => {
            return Err(ValidationError::WrongType {
                field: "description",
                expected: "a string",
            });
        }
    };

    AnomalyEvent::new(parameter, value, timestamp, location, description)
}

/// Split a feed payload (one record or an array of records) and validate
/// each element independently.
///
/// The outer `Err` is returned only when the payload as a whole is
/// unusable (not JSON, or a scalar). Per-record failures are reported in
/// the inner results so one bad element never discards its siblings.
pub fn decode_payload(text: &str) -> Result<Vec<Result<AnomalyEvent, ValidationError>>, ValidationError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| ValidationError::MalformedJson(e.to_string()))?;
    split_payload(&value)
}

/// Like [`decode_payload`], for an already-parsed JSON value.
pub fn split_payload(value: &Value) -> Result<Vec<Result<AnomalyEvent, ValidationError>>, ValidationError> {
    match value {
        Value::Array(items) => Ok(items.iter().map(validate_record).collect()),
        Value::Object(_) => Ok(vec![validate_record(value)]),
        _ => Err(ValidationError::NotAnObject),
    }
}

fn required<'a>(object: &'a Map<String, Value>, field: &'static str) -> Result<&'a Value, ValidationError> {
    match object.get(field) {
        None | Some(Value::Null) => Err(ValidationError::MissingField(field)),
        Some(value) => Ok(value),
    }
}

fn required_str<'a>(object: &'a Map<String, Value>, field: &'static str) -> Result<&'a str, ValidationError> {
    required(object, field)?
        .as_str()
        .ok_or(ValidationError::WrongType {
            field,
            expected: "a string",
        })
}

fn optional_f64(object: &Map<String, Value>, field: &'static str) -> Result<Option<f64>, ValidationError> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value.as_f64().map(Some).ok_or(ValidationError::WrongType {
            field,
            expected: "a number",
        }),
    }
}
