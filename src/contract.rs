//! Output contracts.
//!
//! A [`SchemaContract`] is the declared shape a generated output must have:
//! required fields, per-field JSON types, and closed numeric bounds. Contracts
//! are built once, shared read-only behind `Arc`, and never inferred from data.

pub mod catalog;
pub mod extract;
pub mod field;
pub mod validated;
pub mod violation;

pub use catalog::{ContractCatalog, ContractDefinition};
pub use field::{FieldSpec, FieldType};
pub use validated::ValidatedResult;
pub use violation::{ContractViolation, RangeViolation, TypeMismatch};

use crate::error::OrchestrationError;
use crate::provider::RawOutput;
use field::json_kind;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaContract {
    name: String,
    fields: Vec<FieldSpec>,
}

impl SchemaContract {
    /// Builds a contract, rejecting declarations that could never be
    /// satisfied consistently.
    pub fn new(name: impl Into<String>, fields: Vec<FieldSpec>) -> Result<Self, OrchestrationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(OrchestrationError::configuration(
                "Contract name cannot be empty",
            ));
        }
        if fields.is_empty() {
            return Err(OrchestrationError::Configuration(format!(
                "Contract '{}' must declare at least one field",
                name
            )));
        }

        let mut seen = HashSet::new();
        for field in &fields {
            field.check().map_err(|reason| {
                OrchestrationError::Configuration(format!("Contract '{}': {}", name, reason))
            })?;
            if !seen.insert(field.name.as_str()) {
                return Err(OrchestrationError::Configuration(format!(
                    "Contract '{}' declares field `{}` more than once",
                    name, field.name
                )));
            }
        }

        Ok(Self { name, fields })
    }

    pub fn builder(name: impl Into<String>) -> SchemaContractBuilder {
        SchemaContractBuilder {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Field list as presented to a model alongside the instructions.
    pub fn describe(&self) -> String {
        self.fields
            .iter()
            .map(FieldSpec::describe)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Validates a raw port output against this contract.
    pub fn validate(&self, raw: &RawOutput) -> Result<ValidatedResult, ContractViolation> {
        let object = extract::extract_object(raw)
            .map_err(|reason| ContractViolation::malformed(&self.name, reason))?;
        self.validate_object(object)
    }

    pub fn validate_value(&self, value: &Value) -> Result<ValidatedResult, ContractViolation> {
        self.validate(&RawOutput::Structured(value.clone()))
    }

    fn validate_object(
        &self,
        mut object: Map<String, Value>,
    ) -> Result<ValidatedResult, ContractViolation> {
        let mut violation = ContractViolation::new(&self.name);

        for spec in &self.fields {
            let value = match object.get(&spec.name) {
                None | Some(Value::Null) if !spec.required => continue,
                None => {
                    violation.missing_fields.push(spec.name.clone());
                    continue;
                }
                Some(value) => value,
            };

            if !spec.field_type.matches(value) {
                violation.type_mismatches.push(TypeMismatch {
                    field: spec.name.clone(),
                    expected: spec.field_type,
                    actual: json_kind(value).to_string(),
                });
                continue;
            }

            if let (Some(items), Value::Array(elements)) = (spec.items, value) {
                for (index, element) in elements.iter().enumerate() {
                    if !items.matches(element) {
                        violation.type_mismatches.push(TypeMismatch {
                            field: format!("{}[{}]", spec.name, index),
                            expected: items,
                            actual: json_kind(element).to_string(),
                        });
                    }
                }
            }

            if spec.is_bounded() {
                if let Some(number) = value.as_f64() {
                    let below = spec.min.map(|min| number < min).unwrap_or(false);
                    let above = spec.max.map(|max| number > max).unwrap_or(false);
                    if below || above {
                        violation.out_of_range_fields.push(RangeViolation {
                            field: spec.name.clone(),
                            value: number,
                            min: spec.min,
                            max: spec.max,
                        });
                    }
                }
            }
        }

        if !violation.is_empty() {
            return Err(violation);
        }

        // Integral floats accepted as integers are stored as integers.
        for spec in &self.fields {
            let Some(value) = object.get_mut(&spec.name) else {
                continue;
            };
            if spec.field_type == FieldType::Integer {
                normalize_integer(value);
            } else if let (Some(FieldType::Integer), Value::Array(elements)) = (spec.items, value) {
                elements.iter_mut().for_each(normalize_integer);
            }
        }
        Ok(ValidatedResult::new(&self.name, object))
    }
}

fn normalize_integer(value: &mut Value) {
    let float = match value {
        Value::Number(n) if n.is_f64() => n.as_f64(),
        _ => None,
    };
    let Some(float) = float.filter(|f| f.fract() == 0.0) else {
        return;
    };
    if float >= i64::MIN as f64 && float < i64::MAX as f64 {
        *value = Value::from(float as i64);
    } else if float >= 0.0 && float < u64::MAX as f64 {
        *value = Value::from(float as u64);
    }
}

/// Incremental construction; validation happens in [`SchemaContractBuilder::build`].
#[derive(Debug, Clone)]
pub struct SchemaContractBuilder {
    name: String,
    fields: Vec<FieldSpec>,
}

impl SchemaContractBuilder {
    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    pub fn build(self) -> Result<SchemaContract, OrchestrationError> {
        SchemaContract::new(self.name, self.fields)
    }
}
