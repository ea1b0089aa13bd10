//! Field declarations for output contracts.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Runtime JSON type a declared field must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl FieldType {
    pub fn is_numeric(self) -> bool {
        matches!(self, FieldType::Integer | FieldType::Number)
    }

    /// Integer accepts integral floating values such as `9.0`.
    pub fn matches(self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Integer => match value {
                Value::Number(n) => {
                    n.is_i64()
                        || n.is_u64()
                        || n.as_f64().map(|f| f.is_finite() && f.fract() == 0.0).unwrap_or(false)
                }
                _ => false,
            },
            FieldType::Number => value.is_number(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Array => value.is_array(),
            FieldType::Object => value.is_object(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Array => "array",
            FieldType::Object => "object",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name of the JSON kind of `value`, as reported in type mismatches.
pub fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn default_required() -> bool {
    true
}

/// One declared field of a contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Element type for array fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<FieldType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: true,
            min: None,
            max: None,
            items: None,
            description: None,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::String)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Integer)
    }

    pub fn number(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Number)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Boolean)
    }

    pub fn object(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Object)
    }

    pub fn array_of(name: impl Into<String>, items: FieldType) -> Self {
        let mut spec = Self::new(name, FieldType::Array);
        spec.items = Some(items);
        spec
    }

    /// Closed interval `[min, max]`.
    pub fn bounded(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub fn at_least(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn at_most(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn is_bounded(&self) -> bool {
        self.min.is_some() || self.max.is_some()
    }

    /// Checks the declaration itself, independent of any output.
    pub fn check(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("field name cannot be empty".to_string());
        }
        if self.is_bounded() && !self.field_type.is_numeric() {
            return Err(format!(
                "field `{}` declares bounds but has non-numeric type {}",
                self.name, self.field_type
            ));
        }
        for bound in [self.min, self.max].into_iter().flatten() {
            if !bound.is_finite() {
                return Err(format!("field `{}` has a non-finite bound", self.name));
            }
        }
        if let (Some(min), Some(max)) = (self.min, self.max) {
            if min > max {
                return Err(format!(
                    "field `{}` has min {} greater than max {}",
                    self.name,
                    format_number(min),
                    format_number(max)
                ));
            }
        }
        if self.items.is_some() && self.field_type != FieldType::Array {
            return Err(format!(
                "field `{}` declares an item type but is not an array",
                self.name
            ));
        }
        Ok(())
    }

    /// One-line description used when presenting the contract to a model.
    pub fn describe(&self) -> String {
        let mut line = format!("- {}: ", self.name);
        match (self.field_type, self.items) {
            (FieldType::Array, Some(items)) => line.push_str(&format!("array of {}", items)),
            (field_type, _) => line.push_str(field_type.as_str()),
        }
        line.push_str(if self.required { ", required" } else { ", optional" });
        match (self.min, self.max) {
            (Some(min), Some(max)) => line.push_str(&format!(
                ", between {} and {}",
                format_number(min),
                format_number(max)
            )),
            (Some(min), None) => line.push_str(&format!(", at least {}", format_number(min))),
            (None, Some(max)) => line.push_str(&format!(", at most {}", format_number(max))),
            (None, None) => {}
        }
        if let Some(description) = &self.description {
            line.push_str(&format!(" ({})", description));
        }
        line
    }
}

/// Renders integral values without a trailing `.0`.
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}
