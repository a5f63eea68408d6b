//! Wire models for the core service objects.
//!
//! Field names follow the service's JSON rendering of its protobuf types:
//! snake_case fields, UPPERCASE enum tags, uuids wrapped in `{"value": ..}`
//! objects. Fields the bridge may omit are optional.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A wrapped object identifier, `{"value": "..."}` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UuidRef {
    /// The identifier text.
    pub value: String,
}

impl UuidRef {
    /// Wraps an identifier string.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

impl std::fmt::Display for UuidRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.value)
    }
}

/// A monitored input in the field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Point {
    /// System identifier.
    pub uuid: Option<UuidRef>,
    /// Unique configured name.
    pub name: String,
    /// ANALOG, COUNTER or STATUS.
    #[serde(rename = "type")]
    pub point_type: Option<String>,
    /// Engineering unit of the point's measurements.
    pub unit: Option<String>,
}

/// A controllable output in the field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    /// System identifier.
    pub uuid: Option<UuidRef>,
    /// Unique configured name.
    pub name: String,
    /// Human-readable name.
    pub display_name: Option<String>,
    /// CONTROL or SETPOINT kind.
    #[serde(rename = "type")]
    pub command_type: Option<String>,
}

/// A node in the system model tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    /// System identifier.
    pub uuid: Option<UuidRef>,
    /// Unique configured name.
    pub name: Option<String>,
    /// Type tags attached to the entity.
    #[serde(default)]
    pub types: Vec<String>,
}

/// A user or service account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    /// System identifier.
    pub uuid: Option<UuidRef>,
    /// Login name.
    pub name: String,
}

/// Tag naming which value field of a measurement is populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MeasurementType {
    /// `int_val` carries the value.
    Int,
    /// `double_val` carries the value.
    Double,
    /// `bool_val` carries the value.
    Bool,
    /// `string_val` carries the value.
    String,
    /// No value field is populated.
    None,
}

/// Validity and detail flags attached to a measurement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quality {
    /// GOOD, INVALID or QUESTIONABLE.
    pub validity: Option<String>,
    /// Open-ended detail flags (`inconsistent`, `old_data`, ...).
    pub detail_qual: Option<Value>,
}

/// One sampled value for a point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Measurement {
    /// Name of the point the sample belongs to.
    pub name: String,
    /// Which value field is populated.
    #[serde(rename = "type")]
    pub measurement_type: Option<MeasurementType>,
    /// Integer value, when `type` is INT.
    pub int_val: Option<i64>,
    /// Floating-point value, when `type` is DOUBLE.
    pub double_val: Option<f64>,
    /// Boolean value, when `type` is BOOL.
    pub bool_val: Option<bool>,
    /// Text value, when `type` is STRING.
    pub string_val: Option<String>,
    /// Quality attached to the sample.
    pub quality: Option<Quality>,
    /// Engineering unit.
    pub unit: Option<String>,
    /// Sample time in milliseconds since the epoch.
    pub time: Option<i64>,
}

/// A measurement value extracted from whichever field its type tag names.
#[derive(Debug, Clone, PartialEq)]
pub enum MeasurementValue {
    /// Integer sample.
    Int(i64),
    /// Floating-point sample.
    Double(f64),
    /// Boolean sample.
    Bool(bool),
    /// Text sample.
    Text(String),
    /// No value present.
    None,
}

impl Measurement {
    /// The sample's value per its type tag; `None` when the tag is absent,
    /// NONE, or the named field is missing.
    pub fn value(&self) -> MeasurementValue {
        match self.measurement_type {
            Some(MeasurementType::Int) => self
                .int_val
                .map(MeasurementValue::Int)
                .unwrap_or(MeasurementValue::None),
            Some(MeasurementType::Double) => self
                .double_val
                .map(MeasurementValue::Double)
                .unwrap_or(MeasurementValue::None),
            Some(MeasurementType::Bool) => self
                .bool_val
                .map(MeasurementValue::Bool)
                .unwrap_or(MeasurementValue::None),
            Some(MeasurementType::String) => self
                .string_val
                .clone()
                .map(MeasurementValue::Text)
                .unwrap_or(MeasurementValue::None),
            Some(MeasurementType::None) | None => MeasurementValue::None,
        }
    }
}
