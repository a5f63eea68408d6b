//! Response-shape interpretation.
//!
//! Every call declares one of three shape contracts for its response body:
//! SINGLE (a bare JSON value), MULTI (an ordered `results` sequence), or
//! OPTIONAL (zero-or-one, transported as a `results` sequence). The shaper
//! turns the raw decoded body into the caller-facing value and is the only
//! place these rules live.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ClientError, Result};

/// Declared response-shape contract for a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseStyle {
    /// The body is the value.
    Single,
    /// The body carries `results`, a possibly-empty ordered sequence.
    Multi,
    /// Like MULTI, but only the first element is surfaced; an empty
    /// sequence is success-with-none, never an error.
    Optional,
}

impl ResponseStyle {
    /// Wire name of the style, as the generated bindings declare it.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseStyle::Single => "SINGLE",
            ResponseStyle::Multi => "MULTI",
            ResponseStyle::Optional => "OPTIONAL",
        }
    }
}

impl std::fmt::Display for ResponseStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A response body after shape interpretation.
#[derive(Debug, Clone, PartialEq)]
pub enum Shaped {
    /// SINGLE result.
    Single(Value),
    /// MULTI results, in response order.
    Multi(Vec<Value>),
    /// OPTIONAL result.
    Optional(Option<Value>),
}

impl Shaped {
    /// Unwraps a SINGLE value.
    pub fn into_single(self) -> Result<Value> {
        match self {
            Shaped::Single(value) => Ok(value),
            other => Err(other.mismatch("SINGLE")),
        }
    }

    /// Unwraps a MULTI sequence.
    pub fn into_multi(self) -> Result<Vec<Value>> {
        match self {
            Shaped::Multi(values) => Ok(values),
            other => Err(other.mismatch("MULTI")),
        }
    }

    /// Unwraps an OPTIONAL value.
    pub fn into_optional(self) -> Result<Option<Value>> {
        match self {
            Shaped::Optional(value) => Ok(value),
            other => Err(other.mismatch("OPTIONAL")),
        }
    }

    fn style(&self) -> ResponseStyle {
        match self {
            Shaped::Single(_) => ResponseStyle::Single,
            Shaped::Multi(_) => ResponseStyle::Multi,
            Shaped::Optional(_) => ResponseStyle::Optional,
        }
    }

    fn mismatch(&self, wanted: &str) -> ClientError {
        ClientError::protocol(format!(
            "expected {} shape, got {}",
            wanted,
            self.style()
        ))
    }
}

/// Interprets a decoded response body under the declared style.
///
/// The rules are exact:
/// - SINGLE returns the body unchanged; a null/absent body is [`ClientError::NoData`].
/// - MULTI returns `results` (possibly empty); a missing `results` field is a
///   protocol error.
/// - OPTIONAL returns none on empty `results` (success, not an error) and the
///   first element otherwise, silently discarding the rest.
pub fn shape(style: ResponseStyle, body: Value) -> Result<Shaped> {
    match style {
        ResponseStyle::Single => {
            if body.is_null() {
                Err(ClientError::NoData)
            } else {
                Ok(Shaped::Single(body))
            }
        }
        ResponseStyle::Multi => Ok(Shaped::Multi(take_results(body)?)),
        ResponseStyle::Optional => {
            let mut results = take_results(body)?;
            if results.is_empty() {
                Ok(Shaped::Optional(None))
            } else {
                Ok(Shaped::Optional(Some(results.swap_remove(0))))
            }
        }
    }
}

fn take_results(body: Value) -> Result<Vec<Value>> {
    match body {
        Value::Object(mut map) => match map.remove("results") {
            Some(Value::Array(values)) => Ok(values),
            Some(other) => Err(ClientError::protocol(format!(
                "results field is not a sequence (got {})",
                kind_of(&other)
            ))),
            None => Err(ClientError::protocol("response body missing results field")),
        },
        other => Err(ClientError::protocol(format!(
            "expected an object with a results field, got {}",
            kind_of(&other)
        ))),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
