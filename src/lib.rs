//! Modular application runtime.
//!
//! An application is assembled from *units*: named, versioned packages of
//! services and controllers with their own configuration section, state
//! store and HTTP mount point. The registry attaches units, builds their
//! components once per unit, orders startup by dependency and keeps one
//! faulty unit from taking the others down.
//!
//! ```text
//! Unit::builder() ──▶ Application::builder().units(..).build()
//!                          │
//!                          ▼
//!                  load_units()  ── Registry ── ComponentCache
//!                          │            │
//!                          │            └── StateRegistry (TTL stores)
//!                          ▼
//!                  startup() ─▶ HttpServer ─▶ shutdown()
//! ```

pub mod admin;
pub mod app;
pub mod component;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod registry;
pub mod state;
pub mod unit;
pub mod units;
pub mod validation;

pub use app::{Application, ApplicationBuilder};
pub use component::{Component, ComponentContext, ComponentHandle, Controller, Route, Service};
pub use config::{ApplicationConfig, EnvSource, FieldSpec, MapEnv, RawConfig, UnitConfig, UnitConfigSchema};
pub use error::{BootstrapError, BoxError, FieldErrors, HookResult, StartupHandlerError};
pub use http::{HttpError, HttpServer, JsonBody};
pub use lifecycle::Shutdown;
pub use registry::{HookSummary, LoadSummary, Registry};
pub use state::{StateRegistry, StateStore};
pub use unit::{ExplicitMeta, ManifestMeta, MetadataResolver, Unit, UnitMeta, UnitPhase};
