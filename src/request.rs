//! Requests, contexts and instruction builders.

use crate::contract::SchemaContract;
use crate::error::OrchestrationError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Named JSON values handed to a step.
///
/// Keys keep insertion order as serialized by `serde_json`. Lookups accept
/// dotted paths (`benefits.consumer_benefits`, `datasets.0`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context(Map<String, Value>);

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Wraps a JSON object; any other value is rejected.
    pub fn from_value(value: Value) -> Result<Self, OrchestrationError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(OrchestrationError::Input(format!(
                "context must be a JSON object, got {}",
                crate::contract::field::json_kind(&other)
            ))),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Resolves a dotted path through nested objects and arrays.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.0.get(first)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Replaces `{key}` and `{dotted.path}` placeholders with context values.
    ///
    /// Strings are inserted verbatim, other values as compact JSON. Braces that
    /// do not name a resolvable path are left untouched, so literal JSON in a
    /// template survives rendering.
    pub fn render(&self, template: &str) -> String {
        let mut rendered = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            rendered.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let replacement = after.find('}').and_then(|close| {
                let key = &after[..close];
                if is_placeholder(key) {
                    self.get_path(key).map(|value| (close, value_to_text(value)))
                } else {
                    None
                }
            });
            match replacement {
                Some((close, text)) => {
                    rendered.push_str(&text);
                    rest = &after[close + 1..];
                }
                None => {
                    rendered.push('{');
                    rest = after;
                }
            }
        }
        rendered.push_str(rest);
        rendered
    }
}

fn is_placeholder(key: &str) -> bool {
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

impl From<Map<String, Value>> for Context {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Context {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut context = Context::new();
        for (key, value) in iter {
            context.insert(key, value);
        }
        context
    }
}

/// Pure function from context to instruction text.
pub type InstructionFn = Arc<dyn Fn(&Context) -> String + Send + Sync>;

/// How a step's instructions are produced before dispatch.
#[derive(Clone)]
pub enum Instructions {
    Fixed(String),
    /// `{placeholder}` template rendered against the request context.
    Template(String),
    Builder(InstructionFn),
}

impl Instructions {
    pub fn template(text: impl Into<String>) -> Self {
        Instructions::Template(text.into())
    }

    pub fn builder<F>(build: F) -> Self
    where
        F: Fn(&Context) -> String + Send + Sync + 'static,
    {
        Instructions::Builder(Arc::new(build))
    }

    pub fn render(&self, context: &Context) -> String {
        match self {
            Instructions::Fixed(text) => text.clone(),
            Instructions::Template(template) => context.render(template),
            Instructions::Builder(build) => build(context),
        }
    }
}

impl fmt::Debug for Instructions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instructions::Fixed(text) => f.debug_tuple("Fixed").field(text).finish(),
            Instructions::Template(template) => f.debug_tuple("Template").field(template).finish(),
            Instructions::Builder(_) => f.write_str("Builder(<fn>)"),
        }
    }
}

impl From<&str> for Instructions {
    fn from(text: &str) -> Self {
        Instructions::Template(text.to_string())
    }
}

impl From<String> for Instructions {
    fn from(text: String) -> Self {
        Instructions::Template(text)
    }
}

/// A named unit of generation: instructions plus the contract its output
/// must satisfy.
#[derive(Debug, Clone)]
pub struct Step {
    pub name: String,
    pub instructions: Instructions,
    pub contract: Arc<SchemaContract>,
}

impl Step {
    pub fn new(
        name: impl Into<String>,
        instructions: impl Into<Instructions>,
        contract: Arc<SchemaContract>,
    ) -> Self {
        Self {
            name: name.into(),
            instructions: instructions.into(),
            contract,
        }
    }
}

/// One attempt's worth of input to a generation port.
#[derive(Debug, Clone)]
pub struct Request {
    pub instructions: String,
    pub context: Context,
    pub contract: Arc<SchemaContract>,
    pub attempt: u32,
}

impl Request {
    pub fn contract_name(&self) -> &str {
        self.contract.name()
    }
}
