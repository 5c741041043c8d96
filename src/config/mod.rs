//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse into a raw nested mapping)
//!     → [aioli] section → schema.rs (ApplicationConfig)
//!         → env.rs (AIOLI_* overrides) → validation.rs (semantic checks)
//!     → [<unit>] sections → unit.rs (UnitConfigSchema per unit)
//!         → env.rs (<UNIT>_* overrides) → path default/validation
//!     → immutable views shared via Arc
//! ```
//!
//! # Design Decisions
//! - Environment always wins over supplied config
//! - The environment is read through `EnvSource` so callers can isolate it
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod env;
pub mod loader;
pub mod schema;
pub mod unit;
pub mod validation;

pub use env::{EnvSource, FieldKind, FieldSpec, MapEnv, ProcessEnv};
pub use loader::{load_config, ConfigError};
pub use schema::{AdminConfig, ApplicationConfig, ObservabilityConfig, RawConfig};
pub use unit::{UnitConfig, UnitConfigSchema};
