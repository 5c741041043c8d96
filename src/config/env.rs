//! Environment overrides and typed field resolution.
//!
//! # Responsibilities
//! - Abstract the environment behind `EnvSource`
//! - Resolve a config section against a list of typed fields
//! - Apply the env-always-wins override rule
//!
//! # Design Decisions
//! - Env keys are `<PREFIX><FIELD_UPPER>`; the prefix carries the trailing `_`
//! - Booleans from env are true for `1`, `true`, `yes` (case-insensitive)
//! - All field errors are collected, not just the first

use std::collections::HashMap;
use std::fmt;

use toml::Value;

use crate::error::FieldErrors;

/// Source of environment variables.
pub trait EnvSource: Send + Sync + fmt::Debug {
    fn var(&self, key: &str) -> Option<String>;
}

/// Reads the process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Fixed set of variables, used by tests and embedders that must not
/// observe the process environment.
#[derive(Debug, Default, Clone)]
pub struct MapEnv {
    vars: HashMap<String, String>,
}

impl MapEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }
}

impl EnvSource for MapEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

/// Env prefix for a unit's fields: `billing-api` -> `BILLING_API_`.
pub fn unit_env_prefix(unit_name: &str) -> String {
    format!("{}_", unit_name.to_uppercase().replace('-', "_"))
}

/// Parse an env boolean.
pub fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes")
}

/// Type of a configuration field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Bool,
    Integer,
    Float,
    /// Comma separated when read from env.
    StringList,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::String => "string",
            FieldKind::Bool => "boolean",
            FieldKind::Integer => "integer",
            FieldKind::Float => "float",
            FieldKind::StringList => "list of strings",
        };
        f.write_str(name)
    }
}

/// A typed configuration field.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
    pub default: Option<Value>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            default: None,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::String)
    }

    pub fn bool(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Bool)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Integer)
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Float)
    }

    pub fn string_list(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::StringList)
    }

    /// Fail resolution when the field is absent and has no default.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    fn parse_env(&self, raw: &str) -> Result<Value, String> {
        match self.kind {
            FieldKind::String => Ok(Value::String(raw.to_string())),
            FieldKind::Bool => Ok(Value::Boolean(parse_bool(raw))),
            FieldKind::Integer => raw
                .trim()
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|_| format!("environment value {raw:?} is not a valid integer")),
            FieldKind::Float => raw
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| format!("environment value {raw:?} is not a valid float")),
            FieldKind::StringList => Ok(Value::Array(
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| Value::String(s.to_string()))
                    .collect(),
            )),
        }
    }

    fn check(&self, value: &Value) -> Result<Value, String> {
        let ok = match (self.kind, value) {
            (FieldKind::String, Value::String(_))
            | (FieldKind::Bool, Value::Boolean(_))
            | (FieldKind::Integer, Value::Integer(_))
            | (FieldKind::Float, Value::Float(_)) => true,
            (FieldKind::Float, Value::Integer(i)) => return Ok(Value::Float(*i as f64)),
            (FieldKind::StringList, Value::Array(items)) => items.iter().all(Value::is_str),
            _ => false,
        };

        if ok {
            Ok(value.clone())
        } else {
            Err(format!("expected {}, got {}", self.kind, value.type_str()))
        }
    }
}

/// Resolve `section` against `fields`, applying env overrides.
///
/// Keys not named by `fields` are copied through unless `reject_unknown`
/// is set, in which case each is reported as a field error.
pub fn resolve_fields(
    fields: &[FieldSpec],
    section: &toml::Table,
    prefix: &str,
    env: &dyn EnvSource,
    reject_unknown: bool,
) -> Result<toml::Table, FieldErrors> {
    let mut errors = FieldErrors::new();
    let mut resolved = toml::Table::new();

    for (key, value) in section {
        if !fields.iter().any(|f| &f.name == key) {
            if reject_unknown {
                errors.insert(key.clone(), "unknown field");
            } else {
                resolved.insert(key.clone(), value.clone());
            }
        }
    }

    for field in fields {
        let env_key = format!("{}{}", prefix, field.name.to_uppercase());

        let value = if let Some(raw) = env.var(&env_key) {
            tracing::debug!(field = %field.name, env = %env_key, "Config value taken from environment");
            field.parse_env(&raw)
        } else if let Some(value) = section.get(&field.name) {
            field.check(value)
        } else if let Some(default) = &field.default {
            Ok(default.clone())
        } else if field.required {
            Err("missing required field".to_string())
        } else {
            continue;
        };

        match value {
            Ok(value) => {
                resolved.insert(field.name.clone(), value);
            }
            Err(message) => errors.insert(field.name.clone(), message),
        }
    }

    errors.into_result().map(|_| resolved)
}
