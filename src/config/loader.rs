//! Configuration Loader
//!
//! Environment-aware loading: base file, then environment file, then
//! `RESILIENCE__SECTION__KEY` environment variables. Missing files are fine;
//! every field has a default.

use super::error::ConfigResult;
use super::ResilienceConfig;
use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const BASE_NAME: &str = "resilience";
const ENV_PREFIX: &str = "RESILIENCE";

/// Loads [`ResilienceConfig`] from a directory of config files
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    config_directory: PathBuf,
    environment: String,
}

impl ConfigLoader {
    /// Loader for `config_directory` with the detected environment
    pub fn new(config_directory: impl Into<PathBuf>) -> Self {
        Self {
            config_directory: config_directory.into(),
            environment: Self::detect_environment(),
        }
    }

    /// Override the environment instead of reading it from the process
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Detect current environment from environment variables
    pub fn detect_environment() -> String {
        env::var("RESILIENCE_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }

    /// Load, merge and validate configuration
    pub fn load(&self) -> ConfigResult<ResilienceConfig> {
        let base = self.config_directory.join(BASE_NAME);
        let overrides = self
            .config_directory
            .join(format!("{BASE_NAME}.{}", self.environment));

        debug!(
            environment = %self.environment,
            directory = %self.config_directory.display(),
            "Loading resilience configuration"
        );

        let settings = config::Config::builder()
            .add_source(config::File::from(base).required(false))
            .add_source(config::File::from(overrides).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: ResilienceConfig = settings.try_deserialize()?;
        config.validate()?;

        info!(
            environment = %self.environment,
            check_interval_ms = config.health.check_interval_ms,
            circuit_breaker_overrides = config.circuit_breakers.component_configs.len(),
            "⚙️ Resilience configuration loaded"
        );

        Ok(config)
    }
}
