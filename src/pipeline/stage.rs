//! Stage declarations.

use crate::error::OrchestrationError;
use crate::refine::LoopConfig;
use crate::request::{Context, Step};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Pure mapping from the accumulated pipeline context to a stage context.
pub type ContextMapper = Arc<dyn Fn(&Context) -> Result<Context, OrchestrationError> + Send + Sync>;

/// What a stage does with its mapped context.
#[derive(Debug, Clone)]
pub enum StageTask {
    Invoke(Step),
    Refine {
        generate: Step,
        evaluate: Step,
        config: LoopConfig,
    },
}

fn default_item_key() -> String {
    "item".to_string()
}

/// Fan-out over a collection in the mapped stage context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanOutSpec {
    /// Dotted path to a JSON array.
    pub collection: String,
    /// Key under which each element is exposed to the task.
    #[serde(default = "default_item_key")]
    pub item_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,
    /// Write `null` for failed items instead of failing the stage.
    #[serde(default)]
    pub tolerate_failures: bool,
}

impl FanOutSpec {
    pub fn over(collection: impl Into<String>, item_key: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            item_key: item_key.into(),
            max_concurrency: None,
            tolerate_failures: false,
        }
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = Some(max_concurrency);
        self
    }

    pub fn tolerating_failures(mut self) -> Self {
        self.tolerate_failures = true;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if !is_valid_path(&self.collection) {
            return Err(format!("invalid collection path '{}'", self.collection));
        }
        if self.item_key.trim().is_empty() {
            return Err("item_key cannot be empty".to_string());
        }
        if self.max_concurrency == Some(0) {
            return Err("max_concurrency must be at least 1".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum StageMode {
    Sequential,
    ParallelOver(FanOutSpec),
}

/// How the stage context is derived from the accumulated context.
#[derive(Clone)]
pub enum StageInput {
    /// The whole accumulated context.
    Whole,
    /// Stage key → dotted path in the accumulated context.
    Select(BTreeMap<String, String>),
    Map(ContextMapper),
}

impl StageInput {
    pub fn apply(&self, accumulated: &Context) -> Result<Context, OrchestrationError> {
        match self {
            StageInput::Whole => Ok(accumulated.clone()),
            StageInput::Select(paths) => {
                let mut context = Context::new();
                for (key, path) in paths {
                    let value = accumulated.get_path(path).ok_or_else(|| {
                        OrchestrationError::Input(format!(
                            "path '{}' (for input '{}') not found in pipeline context",
                            path, key
                        ))
                    })?;
                    context.insert(key.clone(), value.clone());
                }
                Ok(context)
            }
            StageInput::Map(mapper) => mapper(accumulated),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if let StageInput::Select(paths) = self {
            for (key, path) in paths {
                if key.trim().is_empty() {
                    return Err("input key cannot be empty".to_string());
                }
                if !is_valid_path(path) {
                    return Err(format!("invalid input path '{}' for '{}'", path, key));
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for StageInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageInput::Whole => f.write_str("Whole"),
            StageInput::Select(paths) => f.debug_tuple("Select").field(paths).finish(),
            StageInput::Map(_) => f.write_str("Map(<fn>)"),
        }
    }
}

/// Dotted path of non-empty identifier segments.
pub fn is_valid_path(path: &str) -> bool {
    !path.is_empty()
        && path.split('.').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        })
}

#[derive(Debug, Clone)]
pub struct Stage {
    pub name: String,
    pub task: StageTask,
    pub mode: StageMode,
    pub input: StageInput,
    pub output_key: String,
}

impl Stage {
    pub fn invoke(name: impl Into<String>, step: Step) -> Self {
        Self::with_task(name.into(), StageTask::Invoke(step))
    }

    pub fn refine(name: impl Into<String>, generate: Step, evaluate: Step, config: LoopConfig) -> Self {
        Self::with_task(
            name.into(),
            StageTask::Refine {
                generate,
                evaluate,
                config,
            },
        )
    }

    fn with_task(name: String, task: StageTask) -> Self {
        Self {
            output_key: name.clone(),
            name,
            task,
            mode: StageMode::Sequential,
            input: StageInput::Whole,
        }
    }

    pub fn select<K, P, I>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = (K, P)>,
        K: Into<String>,
        P: Into<String>,
    {
        self.input = StageInput::Select(
            inputs
                .into_iter()
                .map(|(key, path)| (key.into(), path.into()))
                .collect(),
        );
        self
    }

    pub fn map_input<F>(mut self, mapper: F) -> Self
    where
        F: Fn(&Context) -> Result<Context, OrchestrationError> + Send + Sync + 'static,
    {
        self.input = StageInput::Map(Arc::new(mapper));
        self
    }

    pub fn parallel_over(mut self, spec: FanOutSpec) -> Self {
        self.mode = StageMode::ParallelOver(spec);
        self
    }

    pub fn output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = key.into();
        self
    }
}
