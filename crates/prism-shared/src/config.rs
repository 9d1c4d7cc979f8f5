//! Configuration management for Prism components

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure for Prism
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrismConfig {
    /// Persistence provider the generated queries target
    pub provider: ProviderConfig,

    /// SQL dialect used to shape statements
    pub dialect: DialectConfig,

    /// Query generation settings
    pub query: QueryConfig,

    /// Observability configuration
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Preset: hibernate, eclipselink, datanucleus or standard
    pub profile: String,

    /// Overrides whether `FUNCTION('name', ...)` is understood
    #[serde(default)]
    pub supports_dynamic_function: Option<bool>,

    /// Overrides the collection value function (empty string disables it)
    #[serde(default)]
    pub collection_value_function: Option<String>,

    /// Overrides parenthesising of multi-valued list parameters
    #[serde(default)]
    pub list_parameter_brackets: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialectConfig {
    /// default, postgres or mysql
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Substitute path-typed select aliases in later clauses
    pub resolve_select_aliases: bool,

    /// Prefix prepended to every join alias when rendering
    #[serde(default)]
    pub alias_prefix: Option<String>,

    /// Database functions callable through `FUNCTION('name', ...)`
    #[serde(default)]
    pub registered_functions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Logging configuration
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json or pretty)
    pub format: String,
}

impl Default for PrismConfig {
    fn default() -> Self {
        Self {
            provider: ProviderConfig {
                profile: "hibernate".to_string(),
                supports_dynamic_function: None,
                collection_value_function: None,
                list_parameter_brackets: None,
            },
            dialect: DialectConfig {
                kind: "default".to_string(),
            },
            query: QueryConfig {
                resolve_select_aliases: true,
                alias_prefix: None,
                registered_functions: Vec::new(),
            },
            observability: ObservabilityConfig {
                logging: LoggingConfig {
                    level: "info".to_string(),
                    format: "json".to_string(),
                },
            },
        }
    }
}

impl PrismConfig {
    /// Load configuration from file and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("prism.toml")
    }

    /// Load configuration from a specific file; environment variables win over
    /// the file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut builder = Config::builder().add_source(Config::try_from(&PrismConfig::default())?);

        if path.as_ref().exists() {
            builder = builder.add_source(File::from(path.as_ref()));
        }

        builder
            .add_source(Environment::with_prefix("PRISM").separator("__"))
            .build()?
            .try_deserialize()
    }

    /// Load configuration from environment variables only
    pub fn load_from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Config::try_from(&PrismConfig::default())?)
            .add_source(Environment::with_prefix("PRISM").separator("__"))
            .build()?
            .try_deserialize()
    }
}
