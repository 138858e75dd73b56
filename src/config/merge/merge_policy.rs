//! Merge rules: defaults, override order, conflict handling.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
///
/// Later sources replace scalar values and whole arrays; `[[sections]]` from a higher layer
/// therefore replaces the catalog rather than appending to it.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("budget.chars_per_token", crate::types::DEFAULT_CHARS_PER_TOKEN as i64)?
        .set_default("scheduler.failure_policy", "degrade")?
        .set_default("storage.enabled", true)
}
