//! Schema-conformant results.

use crate::types::serialize_duration_ms;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::time::Duration;

/// A decoded output that satisfied its contract, plus invocation metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatedResult {
    pub contract: String,
    pub value: Map<String, Value>,
    pub attempts: u32,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_duration_ms")]
    pub elapsed: Duration,
}

impl ValidatedResult {
    pub fn new(contract: impl Into<String>, value: Map<String, Value>) -> Self {
        Self {
            contract: contract.into(),
            value,
            attempts: 1,
            elapsed: Duration::ZERO,
        }
    }

    pub fn with_metadata(mut self, attempts: u32, elapsed: Duration) -> Self {
        self.attempts = attempts;
        self.elapsed = elapsed;
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.value.get(field)
    }

    pub fn number(&self, field: &str) -> Option<f64> {
        self.value.get(field).and_then(Value::as_f64)
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        self.value.get(field).and_then(Value::as_str)
    }

    /// Decodes the payload into a caller-defined type.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.value.clone()))
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.value.clone())
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.value)
    }
}
