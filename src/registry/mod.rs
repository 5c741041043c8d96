//! Registry of attached units.
//!
//! # Responsibilities
//! - Register units: metadata, configuration, components, routes
//! - Keep attached units in attachment order with O(1) lookup by name
//! - Drive startup and shutdown across units, isolating failures
//!
//! # Data Flow
//! ```text
//! register_units(units)
//!     → per unit: resolve meta → validate → resolve config section
//!         → Session (components) → startup order → route plan
//!         → commit | rollback
//!     → LoadSummary { attached, failed }
//!
//! call_startup_handlers()  units in attachment order
//! call_shutdown_handlers() units in reverse attachment order
//! ```
//!
//! # Design Decisions
//! - One failing unit never stops the others
//! - A failed registration leaves no components, routes or name behind
//! - Units start sequentially to keep ordering and attribution simple

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::Method;
use serde::Serialize;

use crate::app::routes::{format_path, route_shape, validate_route_path, RouteSink};
use crate::component::controller::Route;
use crate::component::{ComponentCache, ComponentHandle, ComponentKind, Session};
use crate::config::{ApplicationConfig, EnvSource, RawConfig, UnitConfig};
use crate::error::BootstrapError;
use crate::observability::metrics;
use crate::state::StateRegistry;
use crate::unit::{Attachment, Instantiated, RouteInfo, Unit, UnitMeta};

/// Outcome of `register_units`.
#[derive(Debug, Default)]
pub struct LoadSummary {
    /// Names of the units attached by this call, in order.
    pub attached: Vec<String>,
    /// Unit label and the reason it was not attached.
    pub failed: Vec<(String, BootstrapError)>,
}

impl LoadSummary {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Outcome of running hooks across units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HookSummary {
    pub total: usize,
    pub failed: usize,
}

impl HookSummary {
    pub fn as_tuple(&self) -> (usize, usize) {
        (self.total, self.failed)
    }
}

struct Mount {
    path: String,
    route: Route,
}

/// Application-scoped owner of attached units.
pub struct Registry {
    app_config: Arc<ApplicationConfig>,
    raw: Arc<RawConfig>,
    env: Arc<dyn EnvSource>,
    states: Arc<StateRegistry>,
    cache: ComponentCache,
    imported: Vec<Unit>,
    index: HashMap<String, usize>,
}

impl Registry {
    pub fn new(
        app_config: Arc<ApplicationConfig>,
        raw: Arc<RawConfig>,
        env: Arc<dyn EnvSource>,
        states: Arc<StateRegistry>,
    ) -> Self {
        Self {
            app_config,
            raw,
            env,
            states,
            cache: ComponentCache::new(),
            imported: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn app_config(&self) -> &Arc<ApplicationConfig> {
        &self.app_config
    }

    pub fn states(&self) -> &Arc<StateRegistry> {
        &self.states
    }

    /// Committed components of every attached unit.
    pub fn components(&self) -> &ComponentCache {
        &self.cache
    }

    /// Attached units in attachment order.
    pub fn imported(&self) -> &[Unit] {
        &self.imported
    }

    pub fn get_import(&self, name: &str) -> Option<&Unit> {
        self.index.get(name).map(|&i| &self.imported[i])
    }

    pub fn get_config(&self, name: &str) -> Option<&Arc<UnitConfig>> {
        self.get_import(name).and_then(Unit::config)
    }

    /// Services bound to `unit`, or to every attached unit.
    pub fn services(&self, unit: Option<&str>) -> Vec<Arc<ComponentHandle>> {
        self.cache
            .handles()
            .iter()
            .filter(|h| h.kind() == ComponentKind::Service)
            .filter(|h| unit.map_or(true, |name| h.unit() == name))
            .cloned()
            .collect()
    }

    /// Register `units`, mounting their routes into `routes`.
    ///
    /// A handle given twice is registered once.
    ///
    /// # Panics
    /// If a unit handle was already registered by an earlier call.
    pub fn register_units<'a>(
        &mut self,
        units: impl IntoIterator<Item = &'a Unit>,
        routes: &mut dyn RouteSink,
    ) -> LoadSummary {
        let mut unique: Vec<&Unit> = Vec::new();
        for unit in units {
            if !unique.iter().any(|u| u.ptr_eq(unit)) {
                unique.push(unit);
            }
        }

        let mut summary = LoadSummary::default();
        for unit in unique {
            match self.register(unit, routes) {
                Ok(name) => summary.attached.push(name),
                Err(e) => {
                    unit.mark_failed();
                    metrics::record_registration_failure(&e);
                    let label = unit.label();
                    tracing::error!(unit = %label, error = %e, "Unit registration failed");
                    summary.failed.push((label, e));
                }
            }
        }

        tracing::info!(
            attached = summary.attached.len(),
            failed = summary.failed.len(),
            total = self.imported.len(),
            "Units registered"
        );
        summary
    }

    fn register(&mut self, unit: &Unit, routes: &mut dyn RouteSink) -> Result<String, BootstrapError> {
        unit.begin_registration();

        let meta = unit.resolve_meta()?;
        if self.index.contains_key(&meta.name) {
            return Err(BootstrapError::DuplicateUnit(meta.name));
        }

        let config = unit
            .schema()
            .resolve(&meta.name, self.raw.get(&meta.name), self.env.as_ref())
            .map_err(|errors| BootstrapError::UnitConfig {
                unit: meta.name.clone(),
                errors,
            })?;
        let config = Arc::new(config);
        let state = self
            .states
            .store_with_lifetime(&meta.name, config.state_lifetime());

        let mut session = Session::new(
            std::mem::take(&mut self.cache),
            Arc::from(meta.name.as_str()),
            config.clone(),
            state.clone(),
            self.app_config.clone(),
            self.raw.clone(),
            self.env.clone(),
        );

        let built = unit
            .instantiate(&mut session, &config)
            .and_then(|instantiated| {
                let mounts = plan_routes(
                    &self.app_config.api_base,
                    &config,
                    &instantiated.routes,
                    &*routes,
                )?;
                Ok((instantiated, mounts))
            });

        self.cache = match &built {
            Ok(_) => session.commit(),
            Err(_) => session.rollback(),
        };
        let (instantiated, mounts) = built?;

        let Instantiated {
            services,
            controllers,
            startup_order,
            ..
        } = instantiated;

        let mut infos = Vec::with_capacity(mounts.len());
        for Mount { path, route } in mounts {
            infos.push(RouteInfo {
                method: route.method.to_string(),
                path: path.clone(),
                name: route.name.clone(),
            });
            routes.add_route(path, route.handler, route.method, route.name);
        }

        log_attached(&meta, &config, services.len(), controllers.len(), infos.len());
        let name = meta.name.clone();
        unit.attach(Attachment {
            meta,
            config,
            state,
            services,
            controllers,
            routes: infos,
            startup_order,
        });

        self.index.insert(name.clone(), self.imported.len());
        self.imported.push(unit.clone());
        metrics::record_unit_attached(&name);
        Ok(name)
    }

    /// Run startup hooks of every attached unit in attachment order.
    ///
    /// A unit whose startup fails is counted and logged; the remaining
    /// units still start.
    pub async fn call_startup_handlers(&self) -> HookSummary {
        let timeout = self.app_config.hook_timeout();
        let mut failed = 0;

        for unit in &self.imported {
            let name = unit.label();
            tracing::debug!(unit = %name, "Starting unit");
            if let Err(e) = unit.call_startup_handlers(timeout).await {
                failed += 1;
                tracing::error!(unit = %name, error = %e, "Unit startup failed, unit degraded");
            }
        }

        metrics::set_units_degraded(failed);
        HookSummary {
            total: self.imported.len(),
            failed,
        }
    }

    /// Run shutdown hooks of every attached unit in reverse attachment order.
    pub async fn call_shutdown_handlers(&self) -> HookSummary {
        let timeout = self.app_config.hook_timeout();
        let mut failed = 0;

        for unit in self.imported.iter().rev() {
            let name = unit.label();
            let errors = unit.call_shutdown_handlers(timeout).await;
            if !errors.is_empty() {
                failed += 1;
                for e in &errors {
                    tracing::error!(unit = %name, error = %e, "Shutdown hook failed");
                }
            }
        }

        HookSummary {
            total: self.imported.len(),
            failed,
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("imported", &self.imported)
            .field("components", &self.cache.len())
            .finish()
    }
}

fn plan_routes(
    api_base: &str,
    config: &UnitConfig,
    routes: &[Route],
    sink: &dyn RouteSink,
) -> Result<Vec<Mount>, BootstrapError> {
    let mut mounts: Vec<Mount> = Vec::with_capacity(routes.len());
    let mut seen: Vec<(String, Method)> = Vec::new();

    for route in routes {
        let path = format_path(api_base, config.path(), &route.path);
        validate_route_path(&path).map_err(|reason| BootstrapError::InvalidRoute {
            path: path.clone(),
            reason: reason.to_string(),
        })?;

        // same shape under other capture names collides inside the router
        let shape = route_shape(&path);
        let clash = sink
            .paths()
            .into_iter()
            .chain(seen.iter().map(|(p, _)| p.as_str()))
            .find(|existing| *existing != path && route_shape(existing) == shape);
        if let Some(existing) = clash {
            return Err(BootstrapError::InvalidRoute {
                reason: format!("captures conflict with {existing}"),
                path,
            });
        }

        let taken = sink.contains(&path, &route.method)
            || seen.iter().any(|(p, m)| *p == path && *m == route.method);
        if taken {
            return Err(BootstrapError::DuplicateRoute {
                method: route.method.to_string(),
                path,
            });
        }

        seen.push((path.clone(), route.method.clone()));
        mounts.push(Mount {
            path,
            route: route.clone(),
        });
    }
    Ok(mounts)
}

fn log_attached(
    meta: &UnitMeta,
    config: &UnitConfig,
    services: usize,
    controllers: usize,
    routes: usize,
) {
    tracing::info!(
        unit = %meta.name,
        version = %meta.version,
        path = %config.path(),
        services,
        controllers,
        routes,
        "Unit attached"
    );
}
