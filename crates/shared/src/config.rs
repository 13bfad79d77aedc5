//! Configuration
//!
//! Layered loading: built-in defaults, then `config/default.toml`, then
//! `config/{env}.toml`, then `config/{service}.toml`, then `INSIGHT_*`
//! environment variables.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

use crate::observability::ObservabilityConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub service_name: String,
    pub environment: String,
    #[serde(default)]
    pub rules: RulesConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Where the session's rule document lives
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    pub path: String,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            path: "config/rules.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// `strict` evaluates both operands of `&&`/`||`; `short_circuit` stops
    /// at the first decisive operand
    pub operand_policy: String,
    /// Record the facts each rule read
    pub trace: bool,
    /// Charges evaluated at once by the batch runner
    pub concurrency: usize,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            operand_policy: "strict".to_string(),
            trace: false,
            concurrency: 8,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service_name: "insight-engine".to_string(),
            environment: "development".to_string(),
            rules: RulesConfig::default(),
            evaluation: EvaluationConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn load(service_name: &str) -> Result<Self, ConfigError> {
        let env = std::env::var("INSIGHT_ENV").unwrap_or_else(|_| "development".to_string());

        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());

        Self::builder(service_name, &env, Path::new(&config_dir))?
            .add_source(
                // INSIGHT_EVALUATION__OPERAND_POLICY -> evaluation.operand_policy
                Environment::with_prefix("INSIGHT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// File layers only, without the environment override
    fn builder(
        service_name: &str,
        env: &str,
        config_dir: &Path,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Ok(Config::builder()
            .set_default("service_name", service_name)?
            .set_default("environment", env)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join(format!("{env}.toml"))).required(false))
            .add_source(
                File::from(config_dir.join(format!("{service_name}.toml"))).required(false),
            ))
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}
