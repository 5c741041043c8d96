//! Unit metadata: explicit literals or a pluggable resolver.
//!
//! # Responsibilities
//! - Define the `MetadataResolver` seam and its strategies
//! - Validate resolved name, version and description together
//!
//! # Design Decisions
//! - Resolution runs at registration, not at declaration
//! - Validation reports every failing field, not just the first

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use toml::Value;

use crate::error::{BootstrapError, FieldErrors};
use crate::validation::{validate_description, validate_name, validate_version};

/// Validated identity of a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitMeta {
    pub name: String,
    pub version: String,
    pub description: String,
}

/// Metadata as produced by a resolver, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawMeta {
    pub name: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
}

impl RawMeta {
    /// Check every field. A missing description is treated as empty.
    pub fn validate(self) -> Result<UnitMeta, FieldErrors> {
        let mut errors = FieldErrors::new();

        match &self.name {
            Some(name) => {
                if let Err(e) = validate_name(name) {
                    errors.insert("name", e.to_string());
                }
            }
            None => errors.insert("name", "missing"),
        }

        match &self.version {
            Some(version) => {
                if let Err(e) = validate_version(version) {
                    errors.insert("version", e.to_string());
                }
            }
            None => errors.insert("version", "missing"),
        }

        let description = self.description.unwrap_or_default();
        if let Err(e) = validate_description(&description) {
            errors.insert("description", e.to_string());
        }

        errors.into_result()?;
        Ok(UnitMeta {
            name: self.name.unwrap_or_default(),
            version: self.version.unwrap_or_default(),
            description,
        })
    }
}

/// Source of a unit's name, version and description.
pub trait MetadataResolver: Send + Sync + fmt::Debug {
    /// Human-readable origin, used in errors and logs.
    fn source_name(&self) -> String;

    fn resolve(&self) -> Result<RawMeta, BootstrapError>;
}

/// Metadata given as literals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplicitMeta {
    pub name: String,
    pub version: String,
    pub description: String,
}

impl ExplicitMeta {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: description.into(),
        }
    }
}

impl MetadataResolver for ExplicitMeta {
    fn source_name(&self) -> String {
        self.name.clone()
    }

    fn resolve(&self) -> Result<RawMeta, BootstrapError> {
        Ok(RawMeta {
            name: Some(self.name.clone()),
            version: Some(self.version.clone()),
            description: Some(self.description.clone()),
        })
    }
}

/// Metadata read from a project manifest.
///
/// Understands Cargo's `[package]`, PEP 621 `[project]` and
/// `[tool.poetry]` tables, first match wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestMeta {
    path: PathBuf,
}

impl ManifestMeta {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Extract metadata from manifest text.
    pub fn parse(&self, content: &str) -> Result<RawMeta, BootstrapError> {
        let doc: toml::Table = toml::from_str(content).map_err(|e| self.unavailable(e))?;

        let table = doc
            .get("package")
            .or_else(|| doc.get("project"))
            .or_else(|| doc.get("tool").and_then(|tool| tool.get("poetry")))
            .and_then(Value::as_table)
            .ok_or_else(|| {
                self.unavailable("no [package], [project] or [tool.poetry] table")
            })?;

        let field = |key: &str| table.get(key).and_then(Value::as_str).map(str::to_string);

        Ok(RawMeta {
            name: field("name"),
            version: field("version"),
            description: field("description"),
        })
    }

    fn unavailable(&self, reason: impl fmt::Display) -> BootstrapError {
        BootstrapError::MetadataUnavailable {
            source_name: self.source_name(),
            reason: reason.to_string(),
        }
    }
}

impl MetadataResolver for ManifestMeta {
    fn source_name(&self) -> String {
        self.path.display().to_string()
    }

    fn resolve(&self) -> Result<RawMeta, BootstrapError> {
        let content = fs::read_to_string(&self.path).map_err(|e| self.unavailable(e))?;
        self.parse(&content)
    }
}

/// Metadata of the crate being compiled, taken from Cargo's environment.
///
/// ```ignore
/// let unit = Unit::builder().auto_meta(aioli::crate_meta!()).build()?;
/// ```
#[macro_export]
macro_rules! crate_meta {
    () => {
        $crate::unit::ExplicitMeta::new(
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            env!("CARGO_PKG_DESCRIPTION"),
        )
    };
}
