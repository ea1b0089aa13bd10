//! Declarative pipeline definitions.
//!
//! The configuration-file form of a pipeline: stages name their contracts,
//! carry `{placeholder}` instruction templates, and optionally declare a
//! refine loop or a fan-out. Definitions are resolved against a
//! [`ContractCatalog`] into [`Stage`]s.

use crate::contract::ContractCatalog;
use crate::error::OrchestrationError;
use crate::invoker::RetryingInvoker;
use crate::pipeline::stage::{FanOutSpec, Stage};
use crate::pipeline::PipelineOrchestrator;
use crate::refine::LoopConfig;
use crate::request::{Instructions, Step};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Top-level keys the input context must provide.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_inputs: Vec<String>,
    pub stages: Vec<StageDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDefinition {
    pub name: String,
    pub instructions: String,
    pub contract: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_key: Option<String>,
    /// Stage context key → dotted path in the accumulated context.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub inputs: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refine: Option<RefineDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fan_out: Option<FanOutSpec>,
}

fn default_score_field() -> String {
    "score".to_string()
}

fn default_rationale_field() -> String {
    "evaluation".to_string()
}

/// Evaluation half of a refine stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefineDefinition {
    pub instructions: String,
    pub contract: String,
    pub threshold: f64,
    pub max_iterations: u32,
    #[serde(default = "default_score_field")]
    pub score_field: String,
    #[serde(default = "default_rationale_field")]
    pub rationale_field: String,
}

impl RefineDefinition {
    pub fn loop_config(&self) -> LoopConfig {
        LoopConfig::new(self.threshold, self.max_iterations)
            .with_fields(&self.score_field, &self.rationale_field)
    }
}

impl StageDefinition {
    pub fn new(name: &str, instructions: &str, contract: &str) -> Self {
        Self {
            name: name.to_string(),
            instructions: instructions.to_string(),
            contract: contract.to_string(),
            output_key: None,
            inputs: BTreeMap::new(),
            refine: None,
            fan_out: None,
        }
    }

    pub fn to_stage(&self, catalog: &ContractCatalog) -> Result<Stage, OrchestrationError> {
        let in_stage = |err: OrchestrationError| OrchestrationError::StageFailed {
            stage: self.name.clone(),
            source: Box::new(err),
        };

        let contract = catalog.get(&self.contract).map_err(in_stage)?;
        let generate = Step::new(
            &self.name,
            Instructions::Template(self.instructions.clone()),
            contract,
        );

        let mut stage = match &self.refine {
            None => Stage::invoke(&self.name, generate),
            Some(refine) => {
                let evaluation_contract = catalog.get(&refine.contract).map_err(in_stage)?;
                let evaluate = Step::new(
                    format!("{}_evaluation", self.name),
                    Instructions::Template(refine.instructions.clone()),
                    evaluation_contract,
                );
                Stage::refine(&self.name, generate, evaluate, refine.loop_config())
            }
        };

        if !self.inputs.is_empty() {
            stage = stage.select(self.inputs.clone());
        }
        if let Some(key) = &self.output_key {
            stage = stage.output_key(key.clone());
        }
        if let Some(spec) = &self.fan_out {
            stage = stage.parallel_over(spec.clone());
        }
        Ok(stage)
    }
}

impl PipelineDefinition {
    pub fn to_stages(&self, catalog: &ContractCatalog) -> Result<Vec<Stage>, OrchestrationError> {
        self.stages.iter().map(|d| d.to_stage(catalog)).collect()
    }

    pub fn new(stages: Vec<StageDefinition>) -> Self {
        Self {
            description: None,
            required_inputs: Vec::new(),
            stages,
        }
    }

    /// Checks everything construction would check, without a port.
    pub fn validate(&self, catalog: &ContractCatalog) -> Result<(), OrchestrationError> {
        if self.required_inputs.iter().any(|key| key.trim().is_empty()) {
            return Err(OrchestrationError::configuration(
                "required input names cannot be empty",
            ));
        }
        PipelineOrchestrator::validate_stages(&self.to_stages(catalog)?)
    }

    pub fn build(
        &self,
        name: &str,
        catalog: &ContractCatalog,
        invoker: RetryingInvoker,
    ) -> Result<PipelineOrchestrator, OrchestrationError> {
        self.validate(catalog)?;
        Ok(PipelineOrchestrator::new(name, invoker, self.to_stages(catalog)?)?
            .with_required_inputs(self.required_inputs.clone()))
    }

    pub fn contract_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        for stage in &self.stages {
            names.push(stage.contract.as_str());
            if let Some(refine) = &stage.refine {
                names.push(refine.contract.as_str());
            }
        }
        names
    }
}
