//! Layered configuration loading.

use super::merge::merge_policy::builder_with_defaults;
use super::sources::{environment, explicit_file, global_file};
use super::TemperConfig;
use crate::error::TemperError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Loads [`TemperConfig`] from defaults, the global file, an optional
/// explicit file and `TEMPER__*` environment overrides, in that order.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    file: Option<PathBuf>,
    include_global: bool,
    env_vars: Option<HashMap<String, String>>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            file: None,
            include_global: true,
            env_vars: None,
        }
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    pub fn without_global(mut self) -> Self {
        self.include_global = false;
        self
    }

    /// Use `vars` instead of the process environment.
    pub fn with_env_vars(mut self, vars: HashMap<String, String>) -> Self {
        self.env_vars = Some(vars);
        self
    }

    /// Load everything: defaults, global file, `path` if given, environment.
    pub fn load(path: Option<&Path>) -> Result<TemperConfig, TemperError> {
        let loader = Self::new();
        match path {
            Some(path) => loader.with_file(path).build(),
            None => loader.build(),
        }
    }

    /// Load a single file over the defaults, skipping the global file.
    pub fn load_from_file(path: &Path) -> Result<TemperConfig, TemperError> {
        Self::new().without_global().with_file(path).build()
    }

    pub fn build(&self) -> Result<TemperConfig, TemperError> {
        let mut builder = builder_with_defaults()?;
        if self.include_global {
            builder = global_file::add_to_builder(builder)?;
        }
        if let Some(path) = &self.file {
            builder = explicit_file::add_to_builder(builder, path)?;
        }
        builder = environment::add_to_builder(builder, self.env_vars.clone());

        let config: TemperConfig = builder.build()?.try_deserialize()?;
        debug!(
            contracts = config.contracts.len(),
            pipelines = config.pipelines.len(),
            provider = %config.provider.kind,
            "Configuration loaded"
        );
        Ok(config)
    }
}
