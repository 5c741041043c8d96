//! Error taxonomy for unit registration and lifecycle hooks.
//!
//! # Responsibilities
//! - `BootstrapError`: structural problems found while attaching a unit
//! - `FieldErrors`: field -> message map carried by metadata/config failures
//! - `StartupHandlerError`: failures raised by component hooks
//!
//! # Design Decisions
//! - Registration errors are recovered per unit by the registry
//! - Hook errors are recovered per unit and counted, never propagated
//! - State store failures never surface here (absorbed in `state`)

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::config::loader::ConfigError;

/// Boxed error returned by component hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result of a component `on_startup` / `on_shutdown` hook.
pub type HookResult = Result<(), BoxError>;

/// Field name -> validation message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure for `field`. The first message per field is kept.
    pub fn insert(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_insert_with(|| message.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Field names in sorted order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// `Ok(())` when empty, otherwise `Err(self)`.
    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (field, message)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", field, message)?;
        }
        Ok(())
    }
}

/// Structural misconfiguration found before or during unit registration.
///
/// Fatal to the offending unit only; the registry keeps loading the rest.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Unit declared with neither `meta` nor `auto_meta`.
    #[error("unit meta or auto_meta must be supplied")]
    MissingMetadata,

    /// Unit declared with both `meta` and `auto_meta`.
    #[error("unit meta and auto_meta are mutually exclusive")]
    ConflictingMetadata,

    /// The metadata resolver could not produce metadata.
    #[error("unable to resolve metadata from {source_name}: {reason}")]
    MetadataUnavailable { source_name: String, reason: String },

    /// Name, version or description failed validation.
    #[error("unit {unit} failed metadata validation: {errors}")]
    UnitMeta { unit: String, errors: FieldErrors },

    /// The unit's configuration section failed validation.
    #[error("unit {unit} failed configuration validation: {errors}")]
    UnitConfig { unit: String, errors: FieldErrors },

    /// Another attached unit already uses this name.
    #[error("unit name {0} is already attached")]
    DuplicateUnit(String),

    /// A service or controller references a unit that is not attached.
    #[error("unit exporting {component} must be registered with the application before {requester}")]
    UnresolvedIntegration { component: String, requester: String },

    /// `connect` found no existing instance of the requested service.
    #[error("service {component} has no registered instance to connect to from {requester}")]
    NotConnected { component: String, requester: String },

    /// Component relations form a cycle.
    #[error("cyclic dependency in unit {unit}: {}", .cycle.join(" -> "))]
    CyclicDependency { unit: String, cycle: Vec<String> },

    /// Two controllers claim the same path and method.
    #[error("route {method} {path} is already registered")]
    DuplicateRoute { method: String, path: String },

    /// A controller route the HTTP router cannot mount.
    #[error("route {path} is not a valid path: {reason}")]
    InvalidRoute { path: String, reason: String },

    /// A component constructor refused to build.
    #[error("component {component} of unit {unit} failed to build: {reason}")]
    Component { unit: String, component: String, reason: String },

    /// Application settings could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl BootstrapError {
    /// Field-level errors for metadata and config failures.
    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            BootstrapError::UnitMeta { errors, .. } | BootstrapError::UnitConfig { errors, .. } => {
                Some(errors)
            }
            _ => None,
        }
    }
}

/// Which lifecycle hook was running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    Startup,
    Shutdown,
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookKind::Startup => write!(f, "on_startup"),
            HookKind::Shutdown => write!(f, "on_shutdown"),
        }
    }
}

/// Failure raised inside a component hook.
#[derive(Debug, Error)]
pub enum StartupHandlerError {
    /// The hook returned an error.
    #[error("{hook} of {component} in unit {unit} failed: {source}")]
    Hook {
        unit: String,
        component: String,
        hook: HookKind,
        #[source]
        source: BoxError,
    },

    /// The hook did not finish within the configured timeout.
    #[error("{hook} of {component} in unit {unit} timed out after {after:?}")]
    Timeout {
        unit: String,
        component: String,
        hook: HookKind,
        after: Duration,
    },

    /// A dependency failed earlier, so the dependent was not started.
    #[error("{component} in unit {unit} not started: dependency {dependency} failed")]
    DependencyFailed {
        unit: String,
        component: String,
        dependency: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_errors_keep_first_message() {
        let mut errors = FieldErrors::new();
        errors.insert("name", "reserved");
        errors.insert("name", "too long");
        errors.insert("version", "not semver");

        assert_eq!(errors.len(), 2);
        assert_eq!(errors.get("name"), Some("reserved"));
        assert_eq!(errors.to_string(), "name: reserved, version: not semver");
    }

    #[test]
    fn test_meta_error_exposes_fields() {
        let mut errors = FieldErrors::new();
        errors.insert("name", "reserved");
        let err = BootstrapError::UnitMeta {
            unit: "aioli".into(),
            errors,
        };

        assert!(err.field_errors().unwrap().contains("name"));
        assert!(err.to_string().contains("name: reserved"));
        assert!(BootstrapError::DuplicateUnit("x".into()).field_errors().is_none());
    }
}
