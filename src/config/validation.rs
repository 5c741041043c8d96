//! Application settings validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ports valid)
//! - Check the API base against the unit path grammar
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ApplicationConfig → Result<(), Vec<SettingError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::ApplicationConfig;
use crate::validation::validate_path;

/// A rejected application setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for SettingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate resolved application settings.
pub fn validate_config(config: &ApplicationConfig) -> Result<(), Vec<SettingError>> {
    let mut errors = Vec::new();

    if let Err(e) = validate_path(&config.api_base) {
        errors.push(SettingError {
            field: "api_base",
            message: e.to_string(),
        });
    }

    if config.request_timeout_secs == 0 {
        errors.push(SettingError {
            field: "request_timeout_secs",
            message: "must be greater than zero".to_string(),
        });
    }

    if config.state_path.trim().is_empty() {
        errors.push(SettingError {
            field: "state_path",
            message: "must not be empty".to_string(),
        });
    }

    if config.admin.enabled && config.admin.api_key.is_empty() {
        errors.push(SettingError {
            field: "admin.api_key",
            message: "required when the admin API is enabled".to_string(),
        });
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(SettingError {
            field: "observability.metrics_address",
            message: format!("{} is not a socket address", config.observability.metrics_address),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&ApplicationConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = ApplicationConfig::default();
        config.api_base = "api/".to_string();
        config.request_timeout_secs = 0;
        config.admin.enabled = true;
        config.admin.api_key.clear();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["api_base", "request_timeout_secs", "admin.api_key"]);
    }
}
