//! Normalized request input
//!
//! Every operation reads its fields from a JSON body with the query string
//! as a per-key fallback. Aliases are resolved here so the services only
//! ever see one canonical field.

use crate::errors::{AppError, Result};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Body object plus query-string fallbacks for one call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestData {
    pub body: Map<String, Value>,
    pub query: HashMap<String, String>,
}

impl RequestData {
    pub fn new(body: Map<String, Value>, query: HashMap<String, String>) -> Self {
        Self { body, query }
    }

    /// Build from a JSON value; anything but an object is rejected
    pub fn from_value(body: Value) -> Result<Self> {
        match body {
            Value::Object(map) => Ok(Self::new(map, HashMap::new())),
            Value::Null => Ok(Self::default()),
            _ => Err(AppError::validation("Request body must be a JSON object.")),
        }
    }

    /// Build from raw request bytes; an empty body reads as `{}`
    pub fn from_bytes(bytes: &[u8], query: HashMap<String, String>) -> Result<Self> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::new(Map::new(), query));
        }

        let body: Value = serde_json::from_slice(bytes)
            .map_err(|e| AppError::validation(format!("Request body is not valid JSON: {}", e)))?;

        let mut data = Self::from_value(body)?;
        data.query = query;
        Ok(data)
    }

    /// Value for `key`: the body wins, the query string is the fallback
    pub fn get(&self, key: &str) -> Option<Value> {
        match self.body.get(key) {
            Some(value) if !value.is_null() => Some(value.clone()),
            _ => self.query.get(key).map(|v| Value::String(v.clone())),
        }
    }

    /// First present value across `keys`, each checked body-then-query
    pub fn first(&self, keys: &[&str]) -> Option<Value> {
        keys.iter().find_map(|key| self.get(key))
    }

    /// Trimmed string for the first present alias, empty when absent
    pub fn string(&self, keys: &[&str]) -> String {
        self.first(keys).map(|v| normalize_string(&v)).unwrap_or_default()
    }

    /// Trimmed string, with `fallback` when absent or blank
    pub fn string_or(&self, key: &str, fallback: &str) -> String {
        let value = self.string(&[key]);
        if value.is_empty() {
            fallback.to_string()
        } else {
            value
        }
    }

    /// Body-only field, for values that never come from the query string
    pub fn body_field(&self, key: &str) -> Option<&Value> {
        self.body.get(key).filter(|v| !v.is_null())
    }
}

/// String form of a JSON scalar, trimmed
pub fn normalize_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        other => other.to_string().trim().to_string(),
    }
}

/// Parse a numeric field; absent or empty yields `fallback`
pub fn parse_number(value: Option<&Value>, fallback: f64, label: &str) -> Result<f64> {
    let parsed = match value {
        None | Some(Value::Null) => return Ok(fallback),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(fallback),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(Value::Number(n)) => n.as_f64(),
        Some(_) => None,
    };

    parsed
        .filter(|n| n.is_finite())
        .ok_or_else(|| AppError::validation(format!("{} must be a number.", label)))
}

/// Parse an integer field; fractional values fail with `message`
pub fn parse_integer(value: Option<&Value>, fallback: i64, label: &str, message: &str) -> Result<i64> {
    let number = parse_number(value, fallback as f64, label)?;
    if number.fract() != 0.0 || number.abs() > i64::MAX as f64 {
        return Err(AppError::validation(message));
    }
    Ok(number as i64)
}
