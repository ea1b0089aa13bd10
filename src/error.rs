//! Error types for the Temper orchestration core.
//!
//! Failures are layered: a port reports a [`TransportFailure`], a contract
//! reports a [`ContractViolation`], and the retrying invoker folds both into
//! [`InvokeError`] once its attempt budget is spent. Everything above the
//! invoker speaks [`OrchestrationError`].

use crate::contract::ContractViolation;
use crate::refine::LoopState;
use thiserror::Error;

/// Classified failure reported by a generation port.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportFailure {
    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Malformed request: {0}")]
    Malformed(String),

    #[error("Endpoint unavailable: {0}")]
    Unavailable(String),
}

impl TransportFailure {
    /// Timeouts, rate limits and unavailability are transient; a malformed
    /// request will fail the same way every time.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportFailure::Malformed(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TransportFailure::Timeout(_) => "timeout",
            TransportFailure::RateLimited(_) => "rate_limited",
            TransportFailure::Malformed(_) => "malformed",
            TransportFailure::Unavailable(_) => "unavailable",
        }
    }
}

/// Why a single attempt did not produce a conformant result.
#[derive(Debug, Clone, Error)]
pub enum AttemptFailure {
    #[error(transparent)]
    Transport(#[from] TransportFailure),

    #[error(transparent)]
    Contract(#[from] ContractViolation),
}

/// The attempt budget ran out without a conformant result.
#[derive(Debug, Clone, Error)]
#[error("Gave up on contract '{contract}' after {attempts} attempt(s): {last}")]
pub struct ExhaustedRetries {
    pub contract: String,
    pub attempts: u32,
    pub last: AttemptFailure,
}

/// Terminal outcome of a failed invocation.
#[derive(Debug, Clone, Error)]
pub enum InvokeError {
    #[error(transparent)]
    Exhausted(#[from] ExhaustedRetries),

    #[error("Non-retryable failure on attempt {attempt} for contract '{contract}': {failure}")]
    Rejected {
        contract: String,
        attempt: u32,
        failure: TransportFailure,
    },
}

impl InvokeError {
    /// Number of port calls consumed before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            InvokeError::Exhausted(exhausted) => exhausted.attempts,
            InvokeError::Rejected { attempt, .. } => *attempt,
        }
    }
}

/// Errors surfaced by the loop, batch and pipeline layers.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Invoke(#[from] InvokeError),

    #[error(
        "Refine loop exhausted after {} iteration(s) without reaching threshold {} (best score: {:?})",
        .state.iterations,
        .state.threshold,
        .state.best_score()
    )]
    LoopExhausted { state: Box<LoopState> },

    #[error("Cancelled")]
    Cancelled,

    #[error("Task panicked: {0}")]
    TaskPanicked(String),

    #[error("{} of {total} batch item(s) failed", .failures.len())]
    BatchFailed {
        total: usize,
        failures: Vec<(usize, String)>,
    },

    #[error("Invalid stage input: {0}")]
    Input(String),

    #[error("Stage '{stage}' failed: {source}")]
    StageFailed {
        stage: String,
        #[source]
        source: Box<OrchestrationError>,
    },
}

impl OrchestrationError {
    pub fn configuration(message: impl Into<String>) -> Self {
        OrchestrationError::Configuration(message.into())
    }

    /// Name of the failing pipeline stage, when the error came from one.
    pub fn failed_stage(&self) -> Option<&str> {
        match self {
            OrchestrationError::StageFailed { stage, .. } => Some(stage),
            _ => None,
        }
    }

    /// Innermost cause, looking through stage wrappers.
    pub fn root_cause(&self) -> &OrchestrationError {
        match self {
            OrchestrationError::StageFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.root_cause(), OrchestrationError::Cancelled)
    }
}

/// Crate-wide errors for configuration, logging and the command layer.
#[derive(Debug, Error)]
pub enum TemperError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error(transparent)]
    Orchestration(#[from] OrchestrationError),
}

impl From<config::ConfigError> for TemperError {
    fn from(err: config::ConfigError) -> Self {
        TemperError::ConfigError(err.to_string())
    }
}
