//! Evaluate-and-refine loop.
//!
//! Drives `Generating → Evaluating → Deciding` until a candidate's score
//! meets the threshold or the iteration budget runs out. Later iterations
//! regenerate from the same seed with the previous evaluator rationale
//! passed along as text.

use crate::cancel::CancelSignal;
use crate::contract::{FieldType, SchemaContract, ValidatedResult};
use crate::contract::field::format_number;
use crate::error::OrchestrationError;
use crate::invoker::RetryingInvoker;
use crate::request::{Context, Step};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

/// Context key carrying the previous evaluator rationale into generation.
pub const FEEDBACK_KEY: &str = "evaluator_feedback";
/// Context key carrying the candidate artifact into evaluation.
pub const CANDIDATE_KEY: &str = "candidate";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Score {
    pub value: f64,
    pub rationale: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub artifact: Value,
    pub score: Option<Score>,
    pub iteration: u32,
}

impl Candidate {
    pub fn score_value(&self) -> Option<f64> {
        self.score.as_ref().map(|s| s.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    Accepted,
    Exhausted,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopPhase {
    Generating,
    Evaluating,
    Deciding,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoopState {
    pub current: Option<Candidate>,
    pub best: Option<Candidate>,
    pub iterations: u32,
    pub accepted: bool,
    pub threshold: f64,
    pub termination: Option<Termination>,
    /// Transition boundary at which cancellation was observed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<LoopPhase>,
    pub score_history: Vec<f64>,
}

impl LoopState {
    fn new(threshold: f64) -> Self {
        Self {
            current: None,
            best: None,
            iterations: 0,
            accepted: false,
            threshold,
            termination: None,
            cancelled_at: None,
            score_history: Vec::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.termination.is_some()
    }

    /// The accepted candidate, or the best one seen when not accepted.
    pub fn outcome(&self) -> Option<&Candidate> {
        if self.accepted {
            self.current.as_ref()
        } else {
            self.best.as_ref()
        }
    }

    pub fn best_score(&self) -> Option<f64> {
        self.best.as_ref().and_then(Candidate::score_value)
    }

    /// Strictly higher scores replace the best candidate; ties keep the first.
    fn record(&mut self, candidate: Candidate) {
        if let Some(value) = candidate.score_value() {
            self.score_history.push(value);
            let improves = match self.best_score() {
                Some(best) => value > best,
                None => true,
            };
            if improves {
                self.best = Some(candidate.clone());
            }
        }
        self.current = Some(candidate);
    }

    fn cancel(mut self, phase: LoopPhase) -> Self {
        self.termination = Some(Termination::Cancelled);
        self.cancelled_at = Some(phase);
        self
    }
}

fn default_score_field() -> String {
    "score".to_string()
}

fn default_rationale_field() -> String {
    "evaluation".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopConfig {
    pub threshold: f64,
    pub max_iterations: u32,
    #[serde(default = "default_score_field")]
    pub score_field: String,
    #[serde(default = "default_rationale_field")]
    pub rationale_field: String,
}

impl LoopConfig {
    pub fn new(threshold: f64, max_iterations: u32) -> Self {
        Self {
            threshold,
            max_iterations,
            score_field: default_score_field(),
            rationale_field: default_rationale_field(),
        }
    }

    pub fn with_fields(mut self, score_field: &str, rationale_field: &str) -> Self {
        self.score_field = score_field.to_string();
        self.rationale_field = rationale_field.to_string();
        self
    }

    /// Checks the loop settings against the evaluation contract.
    pub fn validate(&self, evaluation: &SchemaContract) -> Result<(), OrchestrationError> {
        if self.max_iterations < 1 {
            return Err(OrchestrationError::configuration(
                "max_iterations must be at least 1",
            ));
        }
        if !self.threshold.is_finite() {
            return Err(OrchestrationError::configuration(
                "threshold must be a finite number",
            ));
        }

        let score = evaluation.field(&self.score_field).ok_or_else(|| {
            OrchestrationError::Configuration(format!(
                "score field `{}` is not declared in contract '{}'",
                self.score_field,
                evaluation.name()
            ))
        })?;
        if !score.field_type.is_numeric() {
            return Err(OrchestrationError::Configuration(format!(
                "score field `{}` in contract '{}' must be numeric, found {}",
                self.score_field,
                evaluation.name(),
                score.field_type
            )));
        }
        if !score.required {
            return Err(OrchestrationError::Configuration(format!(
                "score field `{}` in contract '{}' must be required",
                self.score_field,
                evaluation.name()
            )));
        }
        if let Some(max) = score.max {
            if self.threshold > max {
                return Err(OrchestrationError::Configuration(format!(
                    "threshold {} can never be met: `{}` in contract '{}' is at most {}",
                    format_number(self.threshold),
                    self.score_field,
                    evaluation.name(),
                    format_number(max)
                )));
            }
        }

        match evaluation.field(&self.rationale_field) {
            Some(field) if field.field_type == FieldType::String => Ok(()),
            Some(field) => Err(OrchestrationError::Configuration(format!(
                "rationale field `{}` in contract '{}' must be a string, found {}",
                self.rationale_field,
                evaluation.name(),
                field.field_type
            ))),
            None => Err(OrchestrationError::Configuration(format!(
                "rationale field `{}` is not declared in contract '{}'",
                self.rationale_field,
                evaluation.name()
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EvaluationLoopController {
    generator: RetryingInvoker,
    evaluator: RetryingInvoker,
    generate: Step,
    evaluate: Step,
    config: LoopConfig,
}

impl EvaluationLoopController {
    /// Validates the configuration before any port call can happen.
    pub fn new(
        invoker: RetryingInvoker,
        generate: Step,
        evaluate: Step,
        config: LoopConfig,
    ) -> Result<Self, OrchestrationError> {
        config.validate(&evaluate.contract)?;
        Ok(Self {
            evaluator: invoker.clone(),
            generator: invoker,
            generate,
            evaluate,
            config,
        })
    }

    /// Uses a separate invoker (and attempt budget) for evaluation.
    pub fn with_evaluator(mut self, evaluator: RetryingInvoker) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    pub async fn run(&self, seed: &Context) -> Result<LoopState, OrchestrationError> {
        self.run_until(seed, None).await
    }

    pub async fn run_with_cancel(
        &self,
        seed: &Context,
        cancel: &CancelSignal,
    ) -> Result<LoopState, OrchestrationError> {
        self.run_until(seed, Some(cancel)).await
    }

    /// Runs the loop to a terminal state.
    ///
    /// Cancellation is observed only between phases; an in-flight call is
    /// always allowed to finish.
    pub async fn run_until(
        &self,
        seed: &Context,
        cancel: Option<&CancelSignal>,
    ) -> Result<LoopState, OrchestrationError> {
        let cancelled = || cancel.map(CancelSignal::is_cancelled).unwrap_or(false);
        let mut state = LoopState::new(self.config.threshold);
        let mut feedback: Option<String> = None;

        loop {
            if cancelled() {
                info!(iterations = state.iterations, "Refine loop cancelled");
                return Ok(state.cancel(LoopPhase::Generating));
            }

            let iteration = state.iterations + 1;
            let generation_context = match &feedback {
                Some(text) => seed.clone().with(FEEDBACK_KEY, text.clone()),
                None => seed.clone(),
            };
            debug!(iteration, step = %self.generate.name, "Generating candidate");
            let generated = self
                .generator
                .invoke(&self.generate, &generation_context)
                .await?;
            let artifact = generated.into_value();

            if cancelled() {
                info!(iteration, "Refine loop cancelled");
                state.iterations = iteration;
                state.current = Some(Candidate {
                    artifact,
                    score: None,
                    iteration,
                });
                return Ok(state.cancel(LoopPhase::Evaluating));
            }

            let evaluation_context = seed.clone().with(CANDIDATE_KEY, artifact.clone());
            debug!(iteration, step = %self.evaluate.name, "Evaluating candidate");
            let evaluation = self
                .evaluator
                .invoke(&self.evaluate, &evaluation_context)
                .await?;
            let score = self.extract_score(&evaluation)?;
            state.iterations = iteration;
            state.record(Candidate {
                artifact,
                score: Some(score.clone()),
                iteration,
            });

            if cancelled() {
                info!(iteration, "Refine loop cancelled");
                return Ok(state.cancel(LoopPhase::Deciding));
            }

            if score.value >= self.config.threshold {
                info!(
                    iteration,
                    score = score.value,
                    threshold = self.config.threshold,
                    "Candidate accepted"
                );
                state.accepted = true;
                state.termination = Some(Termination::Accepted);
                return Ok(state);
            }

            if iteration >= self.config.max_iterations {
                warn!(
                    iterations = iteration,
                    best_score = ?state.best_score(),
                    threshold = self.config.threshold,
                    "Refine loop exhausted"
                );
                state.termination = Some(Termination::Exhausted);
                return Ok(state);
            }

            debug!(
                iteration,
                score = score.value,
                threshold = self.config.threshold,
                "Score below threshold, refining"
            );
            feedback = Some(score.rationale);
        }
    }

    fn extract_score(&self, evaluation: &ValidatedResult) -> Result<Score, OrchestrationError> {
        let value = evaluation.number(&self.config.score_field).ok_or_else(|| {
            OrchestrationError::Configuration(format!(
                "evaluation output has no numeric `{}`",
                self.config.score_field
            ))
        })?;
        let rationale = evaluation
            .text(&self.config.rationale_field)
            .unwrap_or_default()
            .to_string();
        Ok(Score { value, rationale })
    }
}
