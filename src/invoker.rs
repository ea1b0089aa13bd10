//! Retrying invoker.
//!
//! The only component that talks to a [`GenerationPort`]. Each invocation is
//! an explicit bounded loop: submit, validate against the step's contract,
//! and on failure either retry with corrective feedback or give up.

use crate::contract::{SchemaContract, ValidatedResult};
use crate::error::{AttemptFailure, ExhaustedRetries, InvokeError, OrchestrationError};
use crate::provider::GenerationPort;
use crate::request::{Context, Request, Step};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

fn default_max_attempts() -> u32 {
    3
}

/// Attempt budget shared by every invocation of one invoker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total port calls per invocation, first attempt included.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay between attempts (milliseconds)
    #[serde(default)]
    pub retry_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_ms: 0,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            retry_delay_ms: 0,
        }
    }

    pub fn with_delay_ms(mut self, retry_delay_ms: u64) -> Self {
        self.retry_delay_ms = retry_delay_ms;
        self
    }

    pub fn validate(&self) -> Result<(), OrchestrationError> {
        if self.max_attempts == 0 {
            return Err(OrchestrationError::configuration(
                "max_attempts must be at least 1",
            ));
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct RetryingInvoker {
    port: Arc<dyn GenerationPort>,
    policy: RetryPolicy,
}

impl std::fmt::Debug for RetryingInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingInvoker")
            .field("port", &self.port.port_name())
            .field("policy", &self.policy)
            .finish()
    }
}

impl RetryingInvoker {
    pub fn new(port: Arc<dyn GenerationPort>, policy: RetryPolicy) -> Result<Self, OrchestrationError> {
        policy.validate()?;
        Ok(Self { port, policy })
    }

    pub fn with_defaults(port: Arc<dyn GenerationPort>) -> Self {
        Self {
            port,
            policy: RetryPolicy::default(),
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn port_name(&self) -> &str {
        self.port.port_name()
    }

    /// Renders the step's instructions against `context` and invokes it.
    pub async fn invoke(
        &self,
        step: &Step,
        context: &Context,
    ) -> Result<ValidatedResult, InvokeError> {
        let instructions = step.instructions.render(context);
        self.invoke_with(instructions, context, &step.contract, self.policy.max_attempts)
            .await
    }

    /// Lower-level entry point with an explicit attempt budget.
    ///
    /// A budget of zero is treated as one attempt; policies reject zero at
    /// construction.
    pub async fn invoke_with(
        &self,
        instructions: String,
        context: &Context,
        contract: &Arc<SchemaContract>,
        max_attempts: u32,
    ) -> Result<ValidatedResult, InvokeError> {
        let max_attempts = max_attempts.max(1);
        let started = Instant::now();
        let mut notes: Vec<String> = Vec::new();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let request = Request {
                instructions: compose_instructions(&instructions, &notes),
                context: context.clone(),
                contract: Arc::clone(contract),
                attempt,
            };

            debug!(
                contract = contract.name(),
                attempt,
                max_attempts,
                port = self.port.port_name(),
                "Submitting request"
            );

            let failure = match self.port.submit(&request).await {
                Ok(raw) => match contract.validate(&raw) {
                    Ok(result) => {
                        let elapsed = started.elapsed();
                        info!(
                            contract = contract.name(),
                            attempt,
                            duration_ms = elapsed.as_millis() as u64,
                            "Output satisfied contract"
                        );
                        return Ok(result.with_metadata(attempt, elapsed));
                    }
                    Err(violation) => {
                        warn!(
                            contract = contract.name(),
                            attempt,
                            max_attempts,
                            violations = violation.violation_count(),
                            "Output violated contract"
                        );
                        AttemptFailure::Contract(violation)
                    }
                },
                Err(failure) if failure.is_retryable() => {
                    warn!(
                        contract = contract.name(),
                        attempt,
                        max_attempts,
                        kind = failure.kind(),
                        error = %failure,
                        "Transport failure"
                    );
                    AttemptFailure::Transport(failure)
                }
                Err(failure) => {
                    error!(
                        contract = contract.name(),
                        attempt,
                        error = %failure,
                        "Non-retryable transport failure"
                    );
                    return Err(InvokeError::Rejected {
                        contract: contract.name().to_string(),
                        attempt,
                        failure,
                    });
                }
            };

            if attempt >= max_attempts {
                error!(
                    contract = contract.name(),
                    attempts = attempt,
                    error = %failure,
                    "Attempts exhausted"
                );
                return Err(InvokeError::Exhausted(ExhaustedRetries {
                    contract: contract.name().to_string(),
                    attempts: attempt,
                    last: failure,
                }));
            }

            if let AttemptFailure::Contract(violation) = &failure {
                notes.push(format!(
                    "Correction after attempt {}: {}",
                    attempt,
                    violation.corrective_note()
                ));
            }

            if self.policy.retry_delay_ms > 0 {
                sleep(Duration::from_millis(self.policy.retry_delay_ms)).await;
            }
        }
    }
}

/// Original instructions followed by every accumulated corrective note.
fn compose_instructions(instructions: &str, notes: &[String]) -> String {
    if notes.is_empty() {
        return instructions.to_string();
    }
    let mut composed = instructions.to_string();
    for note in notes {
        composed.push_str("\n\n");
        composed.push_str(note);
    }
    composed
}
