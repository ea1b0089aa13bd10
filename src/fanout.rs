//! Fan-out executor: runs one task per input concurrently and fans the
//! results back in, aligned index-for-index with the inputs.
//! Failures stay with their own item; siblings always run to completion.

use crate::cancel::CancelSignal;
use crate::error::OrchestrationError;
use crate::types::serialize_display;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanOutConfig {
    /// `None` runs every input at once.
    #[serde(default)]
    pub max_concurrency: Option<usize>,
}

impl FanOutConfig {
    pub fn bounded(max_concurrency: usize) -> Self {
        Self {
            max_concurrency: Some(max_concurrency),
        }
    }

    pub fn validate(&self) -> Result<(), OrchestrationError> {
        if self.max_concurrency == Some(0) {
            return Err(OrchestrationError::configuration(
                "max_concurrency must be at least 1",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum BatchOutcome<T> {
    Pending,
    Succeeded(T),
    Failed(#[serde(serialize_with = "serialize_display")] OrchestrationError),
}

#[derive(Debug, Serialize)]
pub struct BatchItem<I, T> {
    pub index: usize,
    pub input: I,
    pub outcome: BatchOutcome<T>,
}

impl<I, T> BatchItem<I, T> {
    pub fn is_succeeded(&self) -> bool {
        matches!(self.outcome, BatchOutcome::Succeeded(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, BatchOutcome::Failed(_))
    }

    pub fn output(&self) -> Option<&T> {
        match &self.outcome {
            BatchOutcome::Succeeded(output) => Some(output),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&OrchestrationError> {
        match &self.outcome {
            BatchOutcome::Failed(err) => Some(err),
            _ => None,
        }
    }

    pub fn into_result(self) -> Result<T, OrchestrationError> {
        match self.outcome {
            BatchOutcome::Succeeded(output) => Ok(output),
            BatchOutcome::Failed(err) => Err(err),
            BatchOutcome::Pending => Err(OrchestrationError::Cancelled),
        }
    }
}

/// Bounded concurrent execution of independent tasks.
#[derive(Debug, Clone, Default)]
pub struct FanOutExecutor {
    config: FanOutConfig,
    cancel: Option<CancelSignal>,
}

impl FanOutExecutor {
    pub fn new(config: FanOutConfig) -> Result<Self, OrchestrationError> {
        config.validate()?;
        Ok(Self {
            config,
            cancel: None,
        })
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn with_cancel(mut self, signal: CancelSignal) -> Self {
        self.cancel = Some(signal);
        self
    }

    pub fn config(&self) -> FanOutConfig {
        self.config
    }

    /// Runs `task` once per input and returns every item settled.
    ///
    /// The returned vector has the same length and order as `inputs`. A task
    /// that errors or panics marks only its own item as failed. On
    /// cancellation, unfinished tasks are dropped and their items fail with
    /// [`OrchestrationError::Cancelled`].
    pub async fn run<I, T, F, Fut>(
        &self,
        inputs: Vec<I>,
        task: F,
    ) -> Result<Vec<BatchItem<I, T>>, OrchestrationError>
    where
        I: Clone + Send + 'static,
        T: Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, OrchestrationError>> + Send + 'static,
    {
        if inputs.is_empty() {
            return Err(OrchestrationError::configuration(
                "fan-out batch must contain at least one input",
            ));
        }
        self.config.validate()?;

        let total = inputs.len();
        let limit = self.config.max_concurrency.unwrap_or(total).min(total);
        let semaphore = Arc::new(Semaphore::new(limit));
        let task = Arc::new(task);

        info!(total, max_concurrency = limit, "Dispatching fan-out batch");

        let mut items: Vec<BatchItem<I, T>> = inputs
            .iter()
            .cloned()
            .enumerate()
            .map(|(index, input)| BatchItem {
                index,
                input,
                outcome: BatchOutcome::Pending,
            })
            .collect();

        let mut running = FuturesUnordered::new();
        for (index, input) in inputs.into_iter().enumerate() {
            let task = Arc::clone(&task);
            let semaphore = Arc::clone(&semaphore);
            let cancel = self.cancel.clone();

            let handle = tokio::spawn(async move {
                let work = async move {
                    let _permit = match semaphore.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => return Err(OrchestrationError::Cancelled),
                    };
                    (task.as_ref())(input).await
                };
                match cancel {
                    Some(signal) => {
                        tokio::select! {
                            biased;
                            _ = signal.cancelled() => Err(OrchestrationError::Cancelled),
                            result = work => result,
                        }
                    }
                    None => work.await,
                }
            });
            running.push(async move { (index, handle.await) });
        }

        let mut succeeded = 0usize;
        let mut failed = 0usize;
        while let Some((index, joined)) = running.next().await {
            let outcome = match joined {
                Ok(Ok(output)) => {
                    succeeded += 1;
                    debug!(index, "Batch item succeeded");
                    BatchOutcome::Succeeded(output)
                }
                Ok(Err(err)) => {
                    failed += 1;
                    warn!(index, error = %err, "Batch item failed");
                    BatchOutcome::Failed(err)
                }
                Err(join_error) => {
                    failed += 1;
                    warn!(index, error = %join_error, "Batch task panicked");
                    BatchOutcome::Failed(OrchestrationError::TaskPanicked(join_error.to_string()))
                }
            };
            items[index].outcome = outcome;
        }

        info!(total, succeeded, failed, "Fan-out batch settled");
        Ok(items)
    }
}
