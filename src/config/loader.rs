//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::RawConfig;
use crate::config::validation::SettingError;
use crate::error::FieldErrors;

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    NotATable { section: String, found: &'static str },
    Fields(FieldErrors),
    Validation(Vec<SettingError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::NotATable { section, found } => {
                write!(f, "Section [{}] must be a table, found {}", section, found)
            }
            ConfigError::Fields(errors) => write!(f, "Invalid settings: {}", errors),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
            _ => None,
        }
    }
}

/// Load the raw configuration mapping from a TOML file.
///
/// Only syntax is checked here; sections are validated when the
/// application and each unit resolve them.
pub fn load_config(path: &Path) -> Result<RawConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    parse_config(&content)
}

/// Parse the raw configuration mapping from TOML text.
pub fn parse_config(content: &str) -> Result<RawConfig, ConfigError> {
    toml::from_str(content).map_err(ConfigError::Parse)
}
