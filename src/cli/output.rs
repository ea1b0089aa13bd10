//! CLI output: error mapping and text rendering.

use crate::config::{TemperConfig, ValidationError};
use crate::contract::ContractCatalog;
use crate::error::{OrchestrationError, TemperError};
use crate::scenarios::ScenarioKind;

/// Map errors to a string for CLI output, naming the failed stage first.
pub fn map_error(e: &anyhow::Error) -> String {
    let stage_error = e.downcast_ref::<OrchestrationError>().or_else(|| {
        match e.downcast_ref::<TemperError>() {
            Some(TemperError::Orchestration(inner)) => Some(inner),
            _ => None,
        }
    });
    match stage_error {
        Some(err) => match err.failed_stage() {
            Some(stage) => format!("Stage '{}' failed: {}", stage, err.root_cause()),
            None => err.to_string(),
        },
        None => format!("{:#}", e),
    }
}

pub fn format_validation_report(config: &TemperConfig, catalog: &ContractCatalog) -> String {
    let mut lines = vec!["Configuration is valid.".to_string(), String::new()];
    lines.push(format!("Provider: {} ({})", config.provider.kind, config.provider.model));
    lines.push(format!("Max attempts: {}", config.retry.max_attempts));
    lines.push(String::new());
    lines.push(format!("Contracts ({}):", catalog.len()));
    lines.extend(catalog.names().map(|name| format!("  {}", name)));
    lines.push(String::new());
    let pipelines = config.pipeline_names();
    lines.push(format!("Pipelines ({}):", pipelines.len()));
    lines.extend(pipelines.iter().map(|name| format!("  {}", name)));
    lines.join("\n")
}

pub fn format_validation_errors(errors: &[ValidationError]) -> String {
    let messages: Vec<String> = errors.iter().map(|e| format!("  - {}", e)).collect();
    format!("Configuration validation failed:\n{}", messages.join("\n"))
}

pub fn format_scenarios_text() -> String {
    ScenarioKind::ALL
        .iter()
        .map(|kind| {
            format!(
                "{}\n  {}\n  inputs: {}",
                kind.name(),
                kind.description(),
                kind.required_inputs().join(", ")
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
