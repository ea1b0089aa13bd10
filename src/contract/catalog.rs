//! Named contract declarations loaded from configuration.

use crate::contract::field::FieldSpec;
use crate::contract::SchemaContract;
use crate::error::OrchestrationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A contract as declared in configuration, keyed by name elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub fields: Vec<FieldSpec>,
}

impl ContractDefinition {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self {
            description: None,
            fields,
        }
    }

    pub fn build(&self, name: &str) -> Result<SchemaContract, OrchestrationError> {
        SchemaContract::new(name, self.fields.clone())
    }
}

/// Validated contracts shared by every stage that names them.
#[derive(Debug, Clone, Default)]
pub struct ContractCatalog {
    contracts: BTreeMap<String, Arc<SchemaContract>>,
}

impl ContractCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_definitions(
        definitions: &BTreeMap<String, ContractDefinition>,
    ) -> Result<Self, OrchestrationError> {
        let mut catalog = Self::new();
        for (name, definition) in definitions {
            catalog.insert(definition.build(name)?);
        }
        Ok(catalog)
    }

    /// Adds or replaces a contract under its own name.
    pub fn insert(&mut self, contract: SchemaContract) -> Arc<SchemaContract> {
        let contract = Arc::new(contract);
        self.contracts
            .insert(contract.name().to_string(), Arc::clone(&contract));
        contract
    }

    /// Contracts from `other` win on name collisions.
    pub fn extend(&mut self, other: ContractCatalog) {
        self.contracts.extend(other.contracts);
    }

    pub fn get(&self, name: &str) -> Result<Arc<SchemaContract>, OrchestrationError> {
        self.contracts.get(name).cloned().ok_or_else(|| {
            OrchestrationError::Configuration(format!("Unknown contract: {}", name))
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.contracts.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.contracts.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }
}
