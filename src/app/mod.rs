//! Application: one registry, its routes and its lifecycle.
//!
//! # Data Flow
//! ```text
//! Application::builder()
//!     .config(raw) .env(source) .state(registry) .units(..)
//!     .build()          → ApplicationConfig resolved from [aioli] + AIOLI_*
//!     .load_units()     → Registry::register_units → RouteTable
//!     .startup()        → Registry::call_startup_handlers
//!     .router()         → axum::Router for the HTTP layer
//!     .shutdown()       → Registry::call_shutdown_handlers
//! ```

pub mod routes;

use std::path::Path;
use std::sync::Arc;

use axum::Router;

use crate::config::{load_config, ApplicationConfig, EnvSource, ProcessEnv, RawConfig};
use crate::error::BootstrapError;
use crate::registry::{HookSummary, LoadSummary, Registry};
use crate::state::{StateDb, StateRegistry, SystemClock};
use crate::unit::Unit;

pub use routes::{format_path, validate_route_path, RouteEntry, RouteSink, RouteTable};

/// Host of attached units.
pub struct Application {
    config: Arc<ApplicationConfig>,
    registry: Registry,
    routes: RouteTable,
    pending: Vec<Unit>,
}

impl Application {
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::default()
    }

    pub fn config(&self) -> &Arc<ApplicationConfig> {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Queue more units for the next `load_units`.
    pub fn add_units(&mut self, units: impl IntoIterator<Item = Unit>) {
        self.pending.extend(units);
    }

    /// Register every queued unit.
    pub fn load_units(&mut self) -> LoadSummary {
        let units = std::mem::take(&mut self.pending);
        self.registry.register_units(units.iter(), &mut self.routes)
    }

    /// Run startup hooks. Failures degrade units, they never abort.
    pub async fn startup(&self) -> HookSummary {
        let summary = self.registry.call_startup_handlers().await;
        if summary.failed == 0 {
            tracing::info!(units = summary.total, "{} units loaded", summary.total);
        } else {
            tracing::warn!(
                units = summary.total,
                degraded = summary.failed,
                "{} units loaded, {} degraded",
                summary.total,
                summary.failed
            );
        }
        summary
    }

    pub async fn shutdown(&self) -> HookSummary {
        let summary = self.registry.call_shutdown_handlers().await;
        tracing::info!(
            units = summary.total,
            failed = summary.failed,
            "Units shut down"
        );
        summary
    }

    /// Router serving every mounted controller route.
    pub fn router(&self) -> Router {
        self.routes.router()
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("registry", &self.registry)
            .field("routes", &self.routes)
            .field("pending", &self.pending.len())
            .finish()
    }
}

/// Assembles an [`Application`].
#[derive(Default)]
pub struct ApplicationBuilder {
    raw: RawConfig,
    env: Option<Arc<dyn EnvSource>>,
    states: Option<Arc<StateRegistry>>,
    units: Vec<Unit>,
}

impl ApplicationBuilder {
    /// Raw configuration: `[aioli]` plus one table per unit.
    pub fn config(mut self, raw: RawConfig) -> Self {
        self.raw = raw;
        self
    }

    /// Read the raw configuration from a TOML file.
    pub fn config_file(self, path: impl AsRef<Path>) -> Result<Self, BootstrapError> {
        let raw = load_config(path.as_ref())?;
        Ok(self.config(raw))
    }

    /// Environment used for overrides; the process environment by default.
    pub fn env(mut self, env: impl EnvSource + 'static) -> Self {
        self.env = Some(Arc::new(env));
        self
    }

    /// State stores; by default a database at `state_path`.
    pub fn state(mut self, states: Arc<StateRegistry>) -> Self {
        self.states = Some(states);
        self
    }

    pub fn unit(mut self, unit: Unit) -> Self {
        self.units.push(unit);
        self
    }

    pub fn units(mut self, units: impl IntoIterator<Item = Unit>) -> Self {
        self.units.extend(units);
        self
    }

    pub fn build(self) -> Result<Application, BootstrapError> {
        let env: Arc<dyn EnvSource> = self.env.unwrap_or_else(|| Arc::new(ProcessEnv));
        let config = Arc::new(ApplicationConfig::resolve(&self.raw, env.as_ref())?);

        let states = self.states.unwrap_or_else(|| {
            Arc::new(StateRegistry::new(StateDb::open(
                &config.state_path,
                Arc::new(SystemClock),
            )))
        });

        tracing::debug!(
            api_base = %config.api_base,
            state_path = %config.state_path,
            units = self.units.len(),
            "Application configured"
        );

        let registry = Registry::new(config.clone(), Arc::new(self.raw), env, states);

        Ok(Application {
            config,
            registry,
            routes: RouteTable::new(),
            pending: self.units,
        })
    }
}
