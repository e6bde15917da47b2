//! Engine configuration.

#[cfg(feature = "config")]
use clap::Args;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// Default platform tag attached to traces.
pub const DEFAULT_PLATFORM: &str = "optimization_studio";

/// Default environment tag attached to traces.
pub const DEFAULT_ENVIRONMENT: &str = "development";

/// Default maximum number of concurrent executions.
pub const DEFAULT_MAX_CONCURRENT_EXECUTIONS: usize = 10;

/// Configuration for the single-node execution engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
#[cfg_attr(feature = "config", derive(Args))]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct EngineConfig {
    /// Platform tag attached to every trace.
    #[cfg_attr(
        feature = "config",
        arg(long = "studio-platform", env = "STUDIO_PLATFORM", default_value = DEFAULT_PLATFORM)
    )]
    #[builder(default = "DEFAULT_PLATFORM.to_owned()")]
    #[serde(default = "default_platform")]
    pub platform: String,

    /// Environment tag attached to every trace.
    #[cfg_attr(
        feature = "config",
        arg(long = "studio-environment", env = "STUDIO_ENVIRONMENT", default_value = DEFAULT_ENVIRONMENT)
    )]
    #[builder(default = "DEFAULT_ENVIRONMENT.to_owned()")]
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Maximum number of executions running at once.
    #[cfg_attr(
        feature = "config",
        arg(
            long = "studio-max-concurrent-executions",
            env = "STUDIO_MAX_CONCURRENT_EXECUTIONS",
            default_value_t = DEFAULT_MAX_CONCURRENT_EXECUTIONS
        )
    )]
    #[builder(default = "DEFAULT_MAX_CONCURRENT_EXECUTIONS")]
    #[serde(default = "default_max_concurrent_executions")]
    pub max_concurrent_executions: usize,
}

fn default_platform() -> String {
    DEFAULT_PLATFORM.to_owned()
}

fn default_environment() -> String {
    DEFAULT_ENVIRONMENT.to_owned()
}

fn default_max_concurrent_executions() -> usize {
    DEFAULT_MAX_CONCURRENT_EXECUTIONS
}

impl EngineConfig {
    /// Returns a builder for creating a configuration.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }
}

impl EngineConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(max) = self.max_concurrent_executions
            && max == 0
        {
            return Err("max_concurrent_executions must be at least 1".into());
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            platform: default_platform(),
            environment: default_environment(),
            max_concurrent_executions: DEFAULT_MAX_CONCURRENT_EXECUTIONS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = EngineConfig::builder().build().unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.platform, "optimization_studio");
        assert_eq!(config.environment, "development");
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let result = EngineConfig::builder()
            .max_concurrent_executions(0usize)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: EngineConfig =
            serde_json::from_str(r#"{ "environment": "production" }"#).unwrap();
        assert_eq!(config.environment, "production");
        assert_eq!(config.platform, DEFAULT_PLATFORM);
    }
}
