//! CLI route: single route table and run context.

use crate::cli::output::{format_scenarios_text, format_validation_errors, format_validation_report};
use crate::cli::parse::Commands;
use crate::config::{ConfigLoader, TemperConfig};
use crate::fanout::FanOutConfig;
use crate::invoker::{RetryPolicy, RetryingInvoker};
use crate::provider::ProviderFactory;
use crate::request::Context;
use crate::scenarios::{builtin_contracts, builtin_pipelines};
use anyhow::{anyhow, bail, Context as _, Result};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

/// Loaded configuration plus the dispatch table.
pub struct RunContext {
    config: TemperConfig,
}

impl RunContext {
    pub fn new(config_path: Option<PathBuf>) -> Result<Self> {
        let config = ConfigLoader::load(config_path.as_deref())
            .context("Failed to load configuration")?;
        Ok(Self { config })
    }

    pub fn from_config(config: TemperConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TemperConfig {
        &self.config
    }

    pub fn execute(&self, command: &Commands) -> Result<String> {
        match command {
            Commands::Validate => self.handle_validate(),
            Commands::Run {
                pipeline,
                input,
                max_concurrency,
                max_attempts,
                final_only,
            } => self.handle_run(pipeline, input, *max_concurrency, *max_attempts, *final_only),
            Commands::Scenarios { toml } => self.handle_scenarios(*toml),
        }
    }

    fn handle_validate(&self) -> Result<String> {
        if let Err(errors) = self.config.validate() {
            bail!(format_validation_errors(&errors));
        }
        let catalog = self.config.catalog()?;
        Ok(format_validation_report(&self.config, &catalog))
    }

    fn handle_run(
        &self,
        pipeline: &str,
        input: &str,
        max_concurrency: Option<usize>,
        max_attempts: Option<u32>,
        final_only: bool,
    ) -> Result<String> {
        if let Err(errors) = self.config.validate() {
            bail!(format_validation_errors(&errors));
        }

        let context = parse_input(input)?;
        let definition = self.config.pipeline(pipeline)?;
        let catalog = self.config.catalog()?;

        let policy = RetryPolicy {
            max_attempts: max_attempts.unwrap_or(self.config.retry.max_attempts),
            ..self.config.retry
        };
        let fanout = FanOutConfig {
            max_concurrency: max_concurrency.or(self.config.fanout.max_concurrency),
        };

        let port = ProviderFactory::create_port(&self.config.provider)?;
        let invoker = RetryingInvoker::new(port, policy)?;
        let orchestrator = definition
            .build(pipeline, &catalog, invoker)?
            .with_fanout_defaults(fanout)?;

        info!(pipeline, stages = orchestrator.stage_names().len(), "Running pipeline");
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("Failed to start async runtime")?;
        let result = runtime.block_on(orchestrator.run(context))?;

        if final_only {
            Ok(serde_json::to_string_pretty(&result.final_value())?)
        } else {
            Ok(serde_json::to_string_pretty(&result)?)
        }
    }

    fn handle_scenarios(&self, as_toml: bool) -> Result<String> {
        if !as_toml {
            return Ok(format_scenarios_text());
        }

        #[derive(Serialize)]
        struct BuiltinSections {
            contracts: std::collections::BTreeMap<String, crate::contract::ContractDefinition>,
            pipelines: std::collections::BTreeMap<String, crate::pipeline::PipelineDefinition>,
        }

        let sections = BuiltinSections {
            contracts: builtin_contracts(),
            pipelines: builtin_pipelines(),
        };
        toml::to_string_pretty(&sections).context("Failed to render scenarios as TOML")
    }
}

/// `--input` value: inline JSON object, or `@path` to a JSON file.
pub fn parse_input(input: &str) -> Result<Context> {
    let text = match input.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read input file {}", path))?,
        None => input.to_string(),
    };
    let value: serde_json::Value =
        serde_json::from_str(&text).context("Input is not valid JSON")?;
    Context::from_value(value).map_err(|e| anyhow!(e))
}
