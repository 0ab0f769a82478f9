//! Handler parameters.
//!
//! HTTP query parameters arrive as strings, WebSocket parameters as
//! arbitrary JSON. [`Params`] wraps both as a JSON object and offers
//! accessors that accept either representation for scalar values, so the
//! same handler serves `/cmd/add?a=2&b=3` and `{"cmd":"add","q":{"a":2,"b":3}}`.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::ParamError;

/// Parameters passed to a handler.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Params(Map<String, Value>);

impl Params {
    /// Creates an empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the raw value of `key`, if present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns `true` if `key` is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Returns `key` as a string slice.
    ///
    /// # Errors
    ///
    /// [`ParamError::Missing`] if absent, [`ParamError::Invalid`] if not a string.
    pub fn str(&self, key: &str) -> Result<&str, ParamError> {
        let value = self.require(key)?;
        value.as_str().ok_or_else(|| invalid(key, value))
    }

    /// Returns `key` as an integer, parsing numeric strings.
    ///
    /// # Errors
    ///
    /// [`ParamError::Missing`] if absent, [`ParamError::Invalid`] if the
    /// value is neither an integer nor a string holding one.
    pub fn int(&self, key: &str) -> Result<i64, ParamError> {
        let value = self.require(key)?;
        match value {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
        .ok_or_else(|| invalid(key, value))
    }

    /// Returns `key` as a float, parsing numeric strings.
    ///
    /// # Errors
    ///
    /// [`ParamError::Missing`] if absent, [`ParamError::Invalid`] if the
    /// value is neither a number nor a string holding one.
    pub fn float(&self, key: &str) -> Result<f64, ParamError> {
        let value = self.require(key)?;
        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
        .ok_or_else(|| invalid(key, value))
    }

    /// Borrows the underlying JSON object.
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no parameters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn require(&self, key: &str) -> Result<&Value, ParamError> {
        self.0
            .get(key)
            .ok_or_else(|| ParamError::Missing(key.to_string()))
    }
}

fn invalid(key: &str, value: &Value) -> ParamError {
    ParamError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
    }
}

impl From<Map<String, Value>> for Params {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Params> for Value {
    fn from(params: Params) -> Self {
        Value::Object(params.0)
    }
}

impl FromIterator<(String, String)> for Params {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k, Value::String(v))).collect())
    }
}
