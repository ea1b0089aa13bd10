//! Temper: schema-enforced generation orchestration
//!
//! Turns a free-form text generator into a dependable component. Every
//! invocation is checked against a declared output contract and retried with
//! corrective feedback; generate/evaluate loops refine an artifact until a
//! score threshold is met; independent inputs fan out over a bounded worker
//! pool; pipelines chain all of these over a shared context.

pub mod cancel;
pub mod cli;
pub mod config;
pub mod contract;
pub mod error;
pub mod fanout;
pub mod invoker;
pub mod logging;
pub mod pipeline;
pub mod provider;
pub mod refine;
pub mod request;
pub mod scenarios;
pub mod types;

pub use cancel::CancelSignal;
pub use config::{ConfigLoader, TemperConfig};
pub use contract::{ContractViolation, FieldSpec, FieldType, SchemaContract, ValidatedResult};
pub use error::{
    AttemptFailure, ExhaustedRetries, InvokeError, OrchestrationError, TemperError,
    TransportFailure,
};
pub use fanout::{BatchItem, BatchOutcome, FanOutConfig, FanOutExecutor};
pub use invoker::{RetryPolicy, RetryingInvoker};
pub use pipeline::{PipelineOrchestrator, PipelineResult, Stage, StageOutput};
pub use provider::{GenerationPort, RawOutput};
pub use refine::{Candidate, EvaluationLoopController, LoopConfig, LoopState, Score, Termination};
pub use request::{Context, Instructions, Request, Step};
