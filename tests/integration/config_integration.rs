//! Integration tests for Configuration System

use super::test_utils::with_xdg_config_home;
use std::collections::HashMap;
use temper::config::{global_config_path, ConfigLoader, TemperConfig, ValidationError};
use temper::provider::ProviderKind;
use tempfile::TempDir;

fn write_global(test_dir: &TempDir, contents: &str) {
    let dir = test_dir.path().join("temper");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("config.toml"), contents).unwrap();
}

#[test]
fn test_global_config_file_is_loaded() {
    let test_dir = TempDir::new().unwrap();
    write_global(
        &test_dir,
        r#"
[provider]
model = "llama3.1:8b"

[retry]
max_attempts = 4
"#,
    );

    let config = with_xdg_config_home(&test_dir, || {
        assert_eq!(
            global_config_path().unwrap(),
            test_dir.path().join("temper").join("config.toml")
        );
        ConfigLoader::new()
            .with_env_vars(HashMap::new())
            .build()
            .unwrap()
    });

    assert_eq!(config.provider.model, "llama3.1:8b");
    assert_eq!(config.provider.kind, ProviderKind::Ollama);
    assert_eq!(config.retry.max_attempts, 4);
}

#[test]
fn test_explicit_file_overrides_global_file() {
    let test_dir = TempDir::new().unwrap();
    write_global(&test_dir, "[retry]\nmax_attempts = 4\nretry_delay_ms = 250\n");
    let explicit = test_dir.path().join("project.toml");
    std::fs::write(&explicit, "[retry]\nmax_attempts = 6\n").unwrap();

    let config = with_xdg_config_home(&test_dir, || {
        ConfigLoader::new()
            .with_file(&explicit)
            .with_env_vars(HashMap::new())
            .build()
            .unwrap()
    });

    assert_eq!(config.retry.max_attempts, 6);
    // Keys the explicit file does not set still come from the global file.
    assert_eq!(config.retry.retry_delay_ms, 250);
}

#[test]
fn test_missing_global_file_falls_back_to_defaults() {
    let test_dir = TempDir::new().unwrap();
    let config = with_xdg_config_home(&test_dir, || {
        ConfigLoader::new()
            .with_env_vars(HashMap::new())
            .build()
            .unwrap()
    });
    assert_eq!(config, TemperConfig::default());
}

#[test]
fn test_declarative_contracts_and_pipelines_validate() {
    let test_dir = TempDir::new().unwrap();
    let config_file = test_dir.path().join("temper.toml");
    std::fs::write(
        &config_file,
        r#"
[fanout]
max_concurrency = 4

[contracts.tagline]
description = "A product tagline"
fields = [
    { name = "tagline", type = "string" },
    { name = "tone", type = "string", required = false },
]

[contracts.tagline_score]
fields = [
    { name = "evaluation", type = "string" },
    { name = "score", type = "number", min = 0, max = 10 },
]

[[pipelines.tagline.stages]]
name = "tagline"
instructions = "Write a tagline for {product}"
contract = "tagline"
inputs = { product = "product" }
[pipelines.tagline.stages.refine]
instructions = "Score this tagline: {candidate}"
contract = "tagline_score"
threshold = 8.5
max_iterations = 3
"#,
    )
    .unwrap();

    let config = ConfigLoader::load_from_file(&config_file).unwrap();
    assert!(config.validate().is_ok());
    assert_eq!(config.fanout.max_concurrency, Some(4));

    let catalog = config.catalog().unwrap();
    let tagline = catalog.get("tagline").unwrap();
    assert!(!tagline.field("tone").unwrap().required);
    assert!(catalog.contains("ad_evaluation"));

    let definition = config.pipeline("tagline").unwrap();
    assert_eq!(definition.stages[0].refine.as_ref().unwrap().threshold, 8.5);
}

#[test]
fn test_invalid_configuration_reports_every_problem() {
    let test_dir = TempDir::new().unwrap();
    let config_file = test_dir.path().join("broken.toml");
    std::fs::write(
        &config_file,
        r#"
[provider]
kind = "openai"
model = "gpt-4o"

[contracts.empty]
fields = []

[[pipelines.dangling.stages]]
name = "only"
instructions = "Go"
contract = "does_not_exist"
"#,
    )
    .unwrap();

    let config = ConfigLoader::load_from_file(&config_file).unwrap();
    let errors = config.validate().unwrap_err();

    assert!(errors
        .iter()
        .any(|e| matches!(e, ValidationError::Provider(msg) if msg.contains("api_key"))));
    assert!(errors
        .iter()
        .any(|e| matches!(e, ValidationError::Contract(name, _) if name == "empty")));
    assert!(errors
        .iter()
        .any(|e| matches!(e, ValidationError::Pipeline(name, _) if name == "dangling")));
}

#[test]
fn test_unreadable_file_is_a_config_error() {
    let test_dir = TempDir::new().unwrap();
    let config_file = test_dir.path().join("bad.toml");
    std::fs::write(&config_file, "[retry\nmax_attempts = ").unwrap();
    assert!(ConfigLoader::load_from_file(&config_file).is_err());
}
