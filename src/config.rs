//! Configuration System
//!
//! Layered configuration for the orchestration core: provider connection,
//! retry budget, fan-out defaults, logging, plus declarative contracts and
//! pipelines. Built-in scenario contracts and pipelines are always available
//! and configuration entries with the same name take precedence.

use crate::contract::{ContractCatalog, ContractDefinition};
use crate::error::OrchestrationError;
use crate::fanout::FanOutConfig;
use crate::invoker::RetryPolicy;
use crate::logging::LoggingConfig;
use crate::pipeline::PipelineDefinition;
use crate::provider::ProviderSettings;
use crate::scenarios::{builtin_catalog, ScenarioKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

mod loader;
mod merge;
mod sources;

pub use loader::ConfigLoader;
pub use sources::global_file::global_config_path;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemperConfig {
    /// Model provider connection
    #[serde(default)]
    pub provider: ProviderSettings,

    /// Attempt budget per invocation
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Default concurrency cap for fan-out stages
    #[serde(default)]
    pub fanout: FanOutConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Named output contracts
    #[serde(default)]
    pub contracts: BTreeMap<String, ContractDefinition>,

    /// Named pipeline definitions
    #[serde(default)]
    pub pipelines: BTreeMap<String, PipelineDefinition>,
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    Provider(String),
    Retry(String),
    FanOut(String),
    Logging(String),
    Contract(String, String),
    Pipeline(String, String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Provider(msg) => write!(f, "Provider: {}", msg),
            ValidationError::Retry(msg) => write!(f, "Retry: {}", msg),
            ValidationError::FanOut(msg) => write!(f, "Fan-out: {}", msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
            ValidationError::Contract(name, msg) => write!(f, "Contract '{}': {}", name, msg),
            ValidationError::Pipeline(name, msg) => write!(f, "Pipeline '{}': {}", name, msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl TemperConfig {
    /// Validate the entire configuration, collecting every problem.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(problems) = self.provider.validate() {
            errors.extend(problems.into_iter().map(ValidationError::Provider));
        }
        if let Err(e) = self.retry.validate() {
            errors.push(ValidationError::Retry(e.to_string()));
        }
        if let Err(e) = self.fanout.validate() {
            errors.push(ValidationError::FanOut(e.to_string()));
        }
        if let Err(e) = self.logging.validate() {
            errors.push(ValidationError::Logging(e));
        }

        // Pipelines are checked against whatever contracts did build.
        let mut catalog = match builtin_catalog() {
            Ok(catalog) => catalog,
            Err(e) => {
                errors.push(ValidationError::Contract("<builtin>".to_string(), e.to_string()));
                ContractCatalog::new()
            }
        };
        for (name, definition) in &self.contracts {
            match definition.build(name) {
                Ok(contract) => {
                    catalog.insert(contract);
                }
                Err(e) => errors.push(ValidationError::Contract(name.clone(), e.to_string())),
            }
        }

        for (name, pipeline) in &self.pipelines {
            if let Err(e) = pipeline.validate(&catalog) {
                errors.push(ValidationError::Pipeline(name.clone(), e.to_string()));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Built-in contracts overlaid with configured ones.
    pub fn catalog(&self) -> Result<ContractCatalog, OrchestrationError> {
        let mut catalog = builtin_catalog()?;
        catalog.extend(ContractCatalog::from_definitions(&self.contracts)?);
        Ok(catalog)
    }

    /// Configured pipeline, or the built-in scenario of the same name.
    pub fn pipeline(&self, name: &str) -> Result<PipelineDefinition, OrchestrationError> {
        if let Some(definition) = self.pipelines.get(name) {
            return Ok(definition.clone());
        }
        name.parse::<ScenarioKind>()
            .map(ScenarioKind::definition)
            .map_err(|_| OrchestrationError::Configuration(format!("Unknown pipeline: {}", name)))
    }

    pub fn pipeline_names(&self) -> Vec<String> {
        let names: BTreeSet<String> = self
            .pipelines
            .keys()
            .cloned()
            .chain(ScenarioKind::ALL.iter().map(|kind| kind.name().to_string()))
            .collect();
        names.into_iter().collect()
    }
}
