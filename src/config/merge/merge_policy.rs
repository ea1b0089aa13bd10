//! Merge rules: defaults, override order, conflict handling.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
///
/// Later sources replace scalar values; tables such as `contracts` and
/// `pipelines` merge key by key.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("provider.kind", "ollama")?
        .set_default("provider.model", "qwen2.5:7b")?
        .set_default("provider.timeout_secs", 120)?
        .set_default("retry.max_attempts", 3)?
        .set_default("retry.retry_delay_ms", 0)?
        .set_default("logging.level", "info")?
        .set_default("logging.format", "text")?
        .set_default("logging.output", "stderr")
}
