//! Contract violation reports and corrective notes.

use crate::contract::field::{format_number, FieldType};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeMismatch {
    pub field: String,
    pub expected: FieldType,
    pub actual: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeViolation {
    pub field: String,
    pub value: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl RangeViolation {
    fn requirement(&self) -> String {
        match (self.min, self.max) {
            (Some(min), _) if self.value < min => format!("must be ≥ {}", format_number(min)),
            (_, Some(max)) if self.value > max => format!("must be ≤ {}", format_number(max)),
            (Some(min), Some(max)) => format!(
                "must be between {} and {}",
                format_number(min),
                format_number(max)
            ),
            _ => "is out of range".to_string(),
        }
    }
}

/// Every way a raw output failed to satisfy a contract.
///
/// Validation never stops at the first problem; all violations of one output
/// are collected so the corrective note can name each of them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Error)]
#[error(
    "Output violates contract '{contract}' ({} violation(s))",
    .missing_fields.len() + .type_mismatches.len() + .out_of_range_fields.len() + usize::from(.malformed.is_some())
)]
pub struct ContractViolation {
    pub contract: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub malformed: Option<String>,
    #[serde(default)]
    pub missing_fields: Vec<String>,
    #[serde(default)]
    pub type_mismatches: Vec<TypeMismatch>,
    #[serde(default)]
    pub out_of_range_fields: Vec<RangeViolation>,
}

impl ContractViolation {
    pub fn new(contract: impl Into<String>) -> Self {
        Self {
            contract: contract.into(),
            ..Self::default()
        }
    }

    pub fn malformed(contract: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            contract: contract.into(),
            malformed: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.violation_count() == 0
    }

    pub fn violation_count(&self) -> usize {
        self.missing_fields.len()
            + self.type_mismatches.len()
            + self.out_of_range_fields.len()
            + usize::from(self.malformed.is_some())
    }

    /// One human-readable line per violation.
    pub fn lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.violation_count());
        if let Some(reason) = &self.malformed {
            lines.push(format!("output was not a usable JSON object: {}", reason));
        }
        for field in &self.missing_fields {
            lines.push(format!("field `{}` is missing", field));
        }
        for mismatch in &self.type_mismatches {
            lines.push(format!(
                "field `{}` must be {}, got {}",
                mismatch.field, mismatch.expected, mismatch.actual
            ));
        }
        for range in &self.out_of_range_fields {
            lines.push(format!(
                "field `{}` was {}, {}",
                range.field,
                format_number(range.value),
                range.requirement()
            ));
        }
        lines
    }

    /// Feedback text appended to the next attempt's instructions.
    pub fn corrective_note(&self) -> String {
        let mut note = format!(
            "Your previous response did not satisfy the '{}' output format:",
            self.contract
        );
        for line in self.lines() {
            note.push_str("\n- ");
            note.push_str(&line);
        }
        note.push_str("\nRespond again with a single JSON object that fixes every issue above.");
        note
    }
}
