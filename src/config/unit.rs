//! Per-unit configuration schema and resolved view.
//!
//! # Responsibilities
//! - Define the base fields every unit understands
//! - Let units extend the schema with their own typed fields
//! - Resolve a unit's section: env override, type check, defaults, path
//!
//! # Design Decisions
//! - Unknown keys in a unit section are rejected
//! - `path` defaults to `/{name}` and must match the path grammar
//! - The resolved view is immutable and shared via `Arc`

use std::time::Duration;

use serde::de::DeserializeOwned;
use toml::Value;

use crate::config::env::{resolve_fields, unit_env_prefix, EnvSource, FieldSpec};
use crate::error::FieldErrors;
use crate::validation::validate_path;

/// Schema applied to a unit's configuration section.
#[derive(Debug, Clone)]
pub struct UnitConfigSchema {
    fields: Vec<FieldSpec>,
}

impl Default for UnitConfigSchema {
    fn default() -> Self {
        Self {
            fields: vec![
                FieldSpec::string("path"),
                FieldSpec::bool("debug"),
                FieldSpec::bool("should_import_services").default_value(true),
                FieldSpec::bool("should_import_controllers").default_value(true),
                FieldSpec::integer("state_lifetime_secs"),
            ],
        }
    }
}

impl UnitConfigSchema {
    /// Schema with only the base fields.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field, replacing any existing field of the same name.
    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.retain(|f| f.name != spec.name);
        self.fields.push(spec);
        self
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Resolve `section` (the unit's raw table, if any) for `unit_name`.
    pub fn resolve(
        &self,
        unit_name: &str,
        section: Option<&Value>,
        env: &dyn EnvSource,
    ) -> Result<UnitConfig, FieldErrors> {
        self.resolve_section(unit_name, section, env, true)
    }

    /// Resolve this schema against another unit's section. Keys the schema
    /// does not declare are passed through. Used for integrated services.
    pub fn resolve_foreign(
        &self,
        unit_name: &str,
        section: Option<&Value>,
        env: &dyn EnvSource,
    ) -> Result<UnitConfig, FieldErrors> {
        self.resolve_section(unit_name, section, env, false)
    }

    fn resolve_section(
        &self,
        unit_name: &str,
        section: Option<&Value>,
        env: &dyn EnvSource,
        reject_unknown: bool,
    ) -> Result<UnitConfig, FieldErrors> {
        let empty = toml::Table::new();
        let table = match section {
            None => &empty,
            Some(Value::Table(table)) => table,
            Some(other) => {
                let mut errors = FieldErrors::new();
                errors.insert("_section", format!("expected table, got {}", other.type_str()));
                return Err(errors);
            }
        };

        let mut values = resolve_fields(
            &self.fields,
            table,
            &unit_env_prefix(unit_name),
            env,
            reject_unknown,
        )?;

        let path = values
            .get("path")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("/{}", unit_name));

        if let Err(e) = validate_path(&path) {
            let mut errors = FieldErrors::new();
            errors.insert("path", e.to_string());
            return Err(errors);
        }
        values.insert("path".to_string(), Value::String(path));

        if let Some(secs) = values.get("state_lifetime_secs").and_then(Value::as_integer) {
            if secs <= 0 {
                let mut errors = FieldErrors::new();
                errors.insert("state_lifetime_secs", "must be greater than zero");
                return Err(errors);
            }
        }

        Ok(UnitConfig { values })
    }
}

/// Validated configuration of one unit.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitConfig {
    values: toml::Table,
}

impl UnitConfig {
    /// Mount path of the unit, e.g. `/billing`.
    pub fn path(&self) -> &str {
        self.get_str("path").unwrap_or("/")
    }

    /// Per-unit debug override.
    pub fn debug(&self) -> Option<bool> {
        self.get_bool("debug")
    }

    pub fn should_import_services(&self) -> bool {
        self.get_bool("should_import_services").unwrap_or(true)
    }

    pub fn should_import_controllers(&self) -> bool {
        self.get_bool("should_import_controllers").unwrap_or(true)
    }

    /// Lifetime of entries in the unit's state store.
    pub fn state_lifetime(&self) -> Option<Duration> {
        self.get_integer("state_lifetime_secs")
            .and_then(|secs| u64::try_from(secs).ok())
            .map(Duration::from_secs)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    pub fn get_integer(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_integer)
    }

    pub fn get_float(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::as_float)
    }

    pub fn values(&self) -> &toml::Table {
        &self.values
    }

    /// Deserialize the whole view into a typed struct.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, toml::de::Error> {
        Value::Table(self.values.clone()).try_into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::env::MapEnv;
    use serde::Deserialize;

    fn section(s: &str) -> Value {
        Value::Table(toml::from_str(s).unwrap())
    }

    #[test]
    fn test_path_defaults_to_name() {
        let config = UnitConfigSchema::new().resolve("billing", None, &MapEnv::new()).unwrap();
        assert_eq!(config.path(), "/billing");
        assert!(config.should_import_services());
        assert!(config.should_import_controllers());
        assert_eq!(config.debug(), None);
    }

    #[test]
    fn test_path_from_section() {
        let s = section("path = \"/invoices\"");
        let config = UnitConfigSchema::new().resolve("billing", Some(&s), &MapEnv::new()).unwrap();
        assert_eq!(config.get_str("path"), Some("/invoices"));
    }

    #[test]
    fn test_invalid_paths() {
        for p in ["test", "/test/", "/test.test", "\\test"] {
            let s = section(&format!("path = {:?}", p));
            let errors = UnitConfigSchema::new()
                .resolve("billing", Some(&s), &MapEnv::new())
                .unwrap_err();
            assert!(errors.contains("path"), "{p}");
        }
    }

    #[test]
    fn test_env_override() {
        let s = section("path = \"/billing\"\nshould_import_controllers = true");
        let env = MapEnv::new()
            .with("BILLING_PATH", "/money")
            .with("BILLING_SHOULD_IMPORT_CONTROLLERS", "no");
        let config = UnitConfigSchema::new().resolve("billing", Some(&s), &env).unwrap();
        assert_eq!(config.path(), "/money");
        assert!(!config.should_import_controllers());
    }

    #[test]
    fn test_extended_schema() {
        #[derive(Deserialize)]
        struct Billing {
            currency: String,
            max_invoices: i64,
        }

        let schema = UnitConfigSchema::new()
            .field(FieldSpec::string("currency").default_value("EUR"))
            .field(FieldSpec::integer("max_invoices").required());

        let errors = schema.resolve("billing", None, &MapEnv::new()).unwrap_err();
        assert!(errors.contains("max_invoices"));

        let s = section("max_invoices = 10");
        let config = schema.resolve("billing", Some(&s), &MapEnv::new()).unwrap();
        let typed: Billing = config.deserialize().unwrap();
        assert_eq!(typed.currency, "EUR");
        assert_eq!(typed.max_invoices, 10);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let s = section("colour = \"red\"");
        let errors = UnitConfigSchema::new()
            .resolve("billing", Some(&s), &MapEnv::new())
            .unwrap_err();
        assert!(errors.contains("colour"));
    }

    #[test]
    fn test_foreign_resolve_passes_unknown_keys() {
        let schema = UnitConfigSchema::new().field(FieldSpec::string("currency").default_value("EUR"));
        let s = section("colour = \"red\"\ncurrency = \"USD\"");
        let config = schema.resolve_foreign("shop", Some(&s), &MapEnv::new()).unwrap();
        assert_eq!(config.get_str("currency"), Some("USD"));
        assert_eq!(config.path(), "/shop");
        assert_eq!(config.get_str("colour"), Some("red"));
    }

    #[test]
    fn test_state_lifetime() {
        let s = section("state_lifetime_secs = 10");
        let config = UnitConfigSchema::new().resolve("billing", Some(&s), &MapEnv::new()).unwrap();
        assert_eq!(config.state_lifetime(), Some(Duration::from_secs(10)));

        let s = section("state_lifetime_secs = 0");
        assert!(UnitConfigSchema::new().resolve("billing", Some(&s), &MapEnv::new()).is_err());
    }

    #[test]
    fn test_section_must_be_table() {
        let errors = UnitConfigSchema::new()
            .resolve("billing", Some(&Value::Integer(1)), &MapEnv::new())
            .unwrap_err();
        assert!(errors.contains("_section"));
    }
}
