//! Pipeline orchestration.
//!
//! A pipeline is an ordered list of stages sharing an accumulated context.
//! Each stage maps that context to its own input, runs a single invocation or
//! a refine loop (optionally fanned out over a collection), and writes its
//! output back under its output key. Stages run strictly in order; the first
//! failing stage aborts the rest.

pub mod definition;
pub mod stage;

pub use definition::{PipelineDefinition, RefineDefinition, StageDefinition};
pub use stage::{ContextMapper, FanOutSpec, Stage, StageInput, StageMode, StageTask};

use crate::cancel::CancelSignal;
use crate::contract::ValidatedResult;
use crate::error::OrchestrationError;
use crate::fanout::{BatchItem, FanOutConfig, FanOutExecutor};
use crate::invoker::RetryingInvoker;
use crate::refine::{EvaluationLoopController, LoopState, Termination};
use crate::request::{Context, Step};
use crate::types::serialize_duration_ms;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// What a stage produced.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageOutput {
    Validated(ValidatedResult),
    Refined(LoopState),
    Batch { items: Vec<BatchItem<Value, StageOutput>> },
}

impl StageOutput {
    /// The value written back into the accumulated context.
    pub fn value(&self) -> Value {
        match self {
            StageOutput::Validated(result) => result.to_value(),
            StageOutput::Refined(state) => state
                .outcome()
                .map(|candidate| candidate.artifact.clone())
                .unwrap_or(Value::Null),
            StageOutput::Batch { items } => Value::Array(
                items
                    .iter()
                    .map(|item| item.output().map(StageOutput::value).unwrap_or(Value::Null))
                    .collect(),
            ),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StageRecord {
    pub stage: String,
    pub output_key: String,
    pub started_at: DateTime<Utc>,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_duration_ms")]
    pub elapsed: Duration,
    pub output: StageOutput,
}

#[derive(Debug, Serialize)]
pub struct PipelineResult {
    pub pipeline: String,
    pub stages: Vec<StageRecord>,
    pub context: Context,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_duration_ms")]
    pub elapsed: Duration,
}

impl PipelineResult {
    pub fn final_output(&self) -> Option<&StageOutput> {
        self.stages.last().map(|record| &record.output)
    }

    pub fn final_value(&self) -> Value {
        self.final_output()
            .map(StageOutput::value)
            .unwrap_or(Value::Null)
    }

    pub fn stage(&self, name: &str) -> Option<&StageRecord> {
        self.stages.iter().find(|record| record.stage == name)
    }
}

#[derive(Clone)]
enum StageRunner {
    Invoke { invoker: RetryingInvoker, step: Step },
    Refine(Arc<EvaluationLoopController>),
}

impl StageRunner {
    async fn run(
        &self,
        context: &Context,
        cancel: Option<&CancelSignal>,
    ) -> Result<StageOutput, OrchestrationError> {
        match self {
            StageRunner::Invoke { invoker, step } => {
                Ok(StageOutput::Validated(invoker.invoke(step, context).await?))
            }
            StageRunner::Refine(controller) => {
                let state = controller.run_until(context, cancel).await?;
                match state.termination {
                    Some(Termination::Accepted) => Ok(StageOutput::Refined(state)),
                    Some(Termination::Cancelled) => Err(OrchestrationError::Cancelled),
                    _ => Err(OrchestrationError::LoopExhausted {
                        state: Box::new(state),
                    }),
                }
            }
        }
    }
}

struct PreparedStage {
    stage: Stage,
    runner: StageRunner,
}

pub struct PipelineOrchestrator {
    name: String,
    stages: Vec<PreparedStage>,
    fanout_defaults: FanOutConfig,
    required_inputs: Vec<String>,
    cancel: Option<CancelSignal>,
}

impl PipelineOrchestrator {
    /// Validates every stage eagerly; nothing reaches the port on failure.
    pub fn new(
        name: impl Into<String>,
        invoker: RetryingInvoker,
        stages: Vec<Stage>,
    ) -> Result<Self, OrchestrationError> {
        Self::validate_stages(&stages)?;

        let mut prepared = Vec::with_capacity(stages.len());
        for stage in stages {
            let runner = match &stage.task {
                StageTask::Invoke(step) => StageRunner::Invoke {
                    invoker: invoker.clone(),
                    step: step.clone(),
                },
                StageTask::Refine {
                    generate,
                    evaluate,
                    config,
                } => StageRunner::Refine(Arc::new(EvaluationLoopController::new(
                    invoker.clone(),
                    generate.clone(),
                    evaluate.clone(),
                    config.clone(),
                )?)),
            };
            prepared.push(PreparedStage { stage, runner });
        }

        Ok(Self {
            name: name.into(),
            stages: prepared,
            fanout_defaults: FanOutConfig::default(),
            required_inputs: Vec::new(),
            cancel: None,
        })
    }

    /// Concurrency cap for fan-out stages that do not declare their own.
    pub fn with_fanout_defaults(mut self, config: FanOutConfig) -> Result<Self, OrchestrationError> {
        config.validate()?;
        self.fanout_defaults = config;
        Ok(self)
    }

    /// Top-level input keys checked before the first stage runs.
    pub fn with_required_inputs<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_inputs = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_cancel(mut self, signal: CancelSignal) -> Self {
        self.cancel = Some(signal);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|p| p.stage.name.as_str()).collect()
    }

    pub fn validate_stages(stages: &[Stage]) -> Result<(), OrchestrationError> {
        if stages.is_empty() {
            return Err(OrchestrationError::configuration(
                "pipeline must declare at least one stage",
            ));
        }

        let mut names = HashSet::new();
        for stage in stages {
            let invalid = |reason: String| {
                OrchestrationError::Configuration(format!("stage '{}': {}", stage.name, reason))
            };
            if stage.name.trim().is_empty() {
                return Err(OrchestrationError::configuration("stage name cannot be empty"));
            }
            if !names.insert(stage.name.as_str()) {
                return Err(OrchestrationError::Configuration(format!(
                    "duplicate stage name '{}'",
                    stage.name
                )));
            }
            if stage.output_key.trim().is_empty() {
                return Err(invalid("output_key cannot be empty".to_string()));
            }
            stage.input.validate().map_err(invalid)?;
            if let StageMode::ParallelOver(spec) = &stage.mode {
                spec.validate().map_err(invalid)?;
            }
            if let StageTask::Refine {
                evaluate, config, ..
            } = &stage.task
            {
                config
                    .validate(&evaluate.contract)
                    .map_err(|err| invalid(err.to_string()))?;
            }
        }
        Ok(())
    }

    pub async fn run(&self, input: Context) -> Result<PipelineResult, OrchestrationError> {
        self.check_inputs(&input)?;
        let started = Instant::now();
        let mut context = input;
        let mut records = Vec::with_capacity(self.stages.len());

        for (index, prepared) in self.stages.iter().enumerate() {
            let stage = &prepared.stage;
            let fail = |err: OrchestrationError| {
                error!(pipeline = %self.name, stage = %stage.name, error = %err, "Stage failed");
                OrchestrationError::StageFailed {
                    stage: stage.name.clone(),
                    source: Box::new(err),
                }
            };

            if self.is_cancelled() {
                return Err(fail(OrchestrationError::Cancelled));
            }

            info!(pipeline = %self.name, stage = %stage.name, index, "Executing stage");
            let stage_started = Instant::now();
            let started_at = Utc::now();
            let output = self.execute_stage(prepared, &context).await.map_err(fail)?;
            let elapsed = stage_started.elapsed();

            context.insert(stage.output_key.clone(), output.value());
            info!(
                pipeline = %self.name,
                stage = %stage.name,
                duration_ms = elapsed.as_millis() as u64,
                "Stage completed"
            );
            records.push(StageRecord {
                stage: stage.name.clone(),
                output_key: stage.output_key.clone(),
                started_at,
                elapsed,
                output,
            });
        }

        Ok(PipelineResult {
            pipeline: self.name.clone(),
            stages: records,
            context,
            elapsed: started.elapsed(),
        })
    }

    fn check_inputs(&self, input: &Context) -> Result<(), OrchestrationError> {
        let missing: Vec<&str> = self
            .required_inputs
            .iter()
            .filter(|key| matches!(input.get(key), None | Some(Value::Null)))
            .map(String::as_str)
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        error!(pipeline = %self.name, missing = ?missing, "Required inputs missing");
        Err(OrchestrationError::Input(format!(
            "missing required input(s): {}",
            missing.join(", ")
        )))
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(CancelSignal::is_cancelled)
            .unwrap_or(false)
    }

    async fn execute_stage(
        &self,
        prepared: &PreparedStage,
        accumulated: &Context,
    ) -> Result<StageOutput, OrchestrationError> {
        let mapped = prepared.stage.input.apply(accumulated)?;

        let spec = match &prepared.stage.mode {
            StageMode::Sequential => {
                return prepared.runner.run(&mapped, self.cancel.as_ref()).await;
            }
            StageMode::ParallelOver(spec) => spec,
        };

        let elements = match mapped.get_path(&spec.collection) {
            Some(Value::Array(elements)) => elements.clone(),
            Some(_) => {
                return Err(OrchestrationError::Input(format!(
                    "collection '{}' is not an array",
                    spec.collection
                )))
            }
            None => {
                return Err(OrchestrationError::Input(format!(
                    "collection '{}' not found in stage context",
                    spec.collection
                )))
            }
        };

        let mut executor = FanOutExecutor::new(FanOutConfig {
            max_concurrency: spec.max_concurrency.or(self.fanout_defaults.max_concurrency),
        })?;
        if let Some(signal) = &self.cancel {
            executor = executor.with_cancel(signal.clone());
        }

        let runner = prepared.runner.clone();
        let item_key = spec.item_key.clone();
        let cancel = self.cancel.clone();
        let items = executor
            .run(elements, move |element| {
                let runner = runner.clone();
                let context = mapped.clone().with(item_key.clone(), element);
                let cancel = cancel.clone();
                async move { runner.run(&context, cancel.as_ref()).await }
            })
            .await?;

        if self.is_cancelled() {
            return Err(OrchestrationError::Cancelled);
        }

        let failures: Vec<(usize, String)> = items
            .iter()
            .filter_map(|item| item.error().map(|err| (item.index, err.to_string())))
            .collect();
        if !failures.is_empty() && !spec.tolerate_failures {
            return Err(OrchestrationError::BatchFailed {
                total: items.len(),
                failures,
            });
        }

        Ok(StageOutput::Batch { items })
    }
}
