//! Configuration schema definitions.
//!
//! The raw configuration is a nested TOML mapping. The `[aioli]` table holds
//! application settings; every other top-level table is the section of the
//! unit with that name.

use serde::{Deserialize, Serialize};

use crate::config::env::{resolve_fields, EnvSource, FieldSpec};
use crate::config::loader::ConfigError;
use crate::config::validation::validate_config;

/// Raw, unvalidated configuration mapping keyed by section name.
pub type RawConfig = toml::Table;

/// Key of the application settings table.
pub const APPLICATION_SECTION: &str = "aioli";

/// Env prefix of application settings.
pub const APPLICATION_ENV_PREFIX: &str = "AIOLI_";

/// Root application settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Prefix prepended to every unit path.
    pub api_base: String,

    /// Debug mode (verbose logging).
    pub debug: bool,

    /// Indent JSON responses.
    pub pretty_json: bool,

    /// CORS allowed origins; `*` allows any.
    pub allow_origins: Vec<String>,

    /// Development server listen host.
    pub dev_host: String,

    /// Development server listen port.
    pub dev_port: u16,

    /// State database file.
    pub state_path: String,

    /// Per-hook timeout in seconds (0 disables).
    pub hook_timeout_secs: u64,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,

    pub admin: AdminConfig,

    pub observability: ObservabilityConfig,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            api_base: "/api".to_string(),
            debug: false,
            pretty_json: false,
            allow_origins: vec!["*".to_string()],
            dev_host: "127.0.0.1".to_string(),
            dev_port: 5000,
            state_path: ".aioli-state".to_string(),
            hook_timeout_secs: 30,
            request_timeout_secs: 30,
            admin: AdminConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl ApplicationConfig {
    /// Scalar settings that may be overridden from the environment.
    pub fn fields() -> Vec<FieldSpec> {
        vec![
            FieldSpec::string("api_base"),
            FieldSpec::bool("debug"),
            FieldSpec::bool("pretty_json"),
            FieldSpec::string_list("allow_origins"),
            FieldSpec::string("dev_host"),
            FieldSpec::integer("dev_port"),
            FieldSpec::string("state_path"),
            FieldSpec::integer("hook_timeout_secs"),
            FieldSpec::integer("request_timeout_secs"),
        ]
    }

    /// Resolve settings from the `[aioli]` section, env and defaults.
    pub fn resolve(raw: &RawConfig, env: &dyn EnvSource) -> Result<Self, ConfigError> {
        let empty = toml::Table::new();
        let section = match raw.get(APPLICATION_SECTION) {
            None => &empty,
            Some(toml::Value::Table(table)) => table,
            Some(other) => {
                return Err(ConfigError::NotATable {
                    section: APPLICATION_SECTION.to_string(),
                    found: other.type_str(),
                })
            }
        };

        let resolved = resolve_fields(&Self::fields(), section, APPLICATION_ENV_PREFIX, env, false)
            .map_err(ConfigError::Fields)?;

        let config: ApplicationConfig = toml::Value::Table(resolved)
            .try_into()
            .map_err(ConfigError::Parse)?;

        validate_config(&config).map_err(ConfigError::Validation)?;

        Ok(config)
    }

    /// Hook timeout, `None` when disabled.
    pub fn hook_timeout(&self) -> Option<std::time::Duration> {
        (self.hook_timeout_secs > 0).then(|| std::time::Duration::from_secs(self.hook_timeout_secs))
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log filter used when `RUST_LOG` is unset and debug is off.
    pub log_level: String,

    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    /// Prometheus endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
