//! In-process scripted generation port.
//!
//! Replays canned outputs per contract, optionally via responder closures and
//! with simulated latency, and records every request it receives. Used by the
//! test suites and for dry runs without a model server.

use crate::error::TransportFailure;
use crate::provider::{GenerationPort, RawOutput};
use crate::request::Request;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

pub type ScriptedResponse = Result<RawOutput, TransportFailure>;
pub type Responder = Arc<dyn Fn(&Request) -> ScriptedResponse + Send + Sync>;
pub type Latency = Arc<dyn Fn(&Request) -> Duration + Send + Sync>;

#[derive(Default)]
struct Script {
    queue: VecDeque<ScriptedResponse>,
    responder: Option<Responder>,
    latency: Option<Latency>,
}

impl Script {
    /// Pops the next queued response; the final one repeats forever.
    fn next(&mut self, request: &Request) -> Option<ScriptedResponse> {
        if let Some(responder) = &self.responder {
            return Some(responder(request));
        }
        if self.queue.len() > 1 {
            self.queue.pop_front()
        } else {
            self.queue.front().cloned()
        }
    }
}

#[derive(Default)]
pub struct ScriptedPort {
    scripts: Mutex<HashMap<String, Script>>,
    requests: Mutex<Vec<Request>>,
}

impl ScriptedPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues responses for a contract, served in order.
    pub fn respond<I>(self, contract: &str, responses: I) -> Self
    where
        I: IntoIterator<Item = ScriptedResponse>,
    {
        self.scripts
            .lock()
            .entry(contract.to_string())
            .or_default()
            .queue
            .extend(responses);
        self
    }

    /// Queues structured outputs for a contract.
    pub fn reply<I>(self, contract: &str, values: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        self.respond(contract, values.into_iter().map(|v| Ok(RawOutput::Structured(v))))
    }

    /// Computes each response from the request instead of a queue.
    pub fn respond_with<F>(self, contract: &str, responder: F) -> Self
    where
        F: Fn(&Request) -> ScriptedResponse + Send + Sync + 'static,
    {
        self.scripts
            .lock()
            .entry(contract.to_string())
            .or_default()
            .responder = Some(Arc::new(responder));
        self
    }

    /// Delays each response for a contract by a per-request duration.
    pub fn with_latency<F>(self, contract: &str, latency: F) -> Self
    where
        F: Fn(&Request) -> Duration + Send + Sync + 'static,
    {
        self.scripts
            .lock()
            .entry(contract.to_string())
            .or_default()
            .latency = Some(Arc::new(latency));
        self
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().clone()
    }

    pub fn requests_for(&self, contract: &str) -> Vec<Request> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.contract_name() == contract)
            .cloned()
            .collect()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn calls_for(&self, contract: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.contract_name() == contract)
            .count()
    }
}

#[async_trait]
impl GenerationPort for ScriptedPort {
    async fn submit(&self, request: &Request) -> Result<RawOutput, TransportFailure> {
        self.requests.lock().push(request.clone());

        let (response, delay) = {
            let mut scripts = self.scripts.lock();
            match scripts.get_mut(request.contract_name()) {
                Some(script) => (
                    script.next(request),
                    script.latency.as_ref().map(|latency| latency(request)),
                ),
                None => (None, None),
            }
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        response.unwrap_or_else(|| {
            Err(TransportFailure::Malformed(format!(
                "No scripted response for contract '{}'",
                request.contract_name()
            )))
        })
    }

    fn port_name(&self) -> &str {
        "scripted"
    }
}
