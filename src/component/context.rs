//! Registration session and the context handed to component constructors.
//!
//! # Responsibilities
//! - Build components for the unit being registered
//! - Enforce one instance per (type, unit), except integrated instances
//! - Record the dependencies of each component while it is built
//! - Detect construction cycles
//!
//! # Design Decisions
//! - A session takes the registry's cache by value and gives it back on
//!   commit or rollback, so a failed unit leaves no trace in it
//! - Every component built in a session is bound to the session's unit

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::component::cache::{ComponentCache, Export};
use crate::component::{short_type_name, Component, ComponentHandle, ComponentKind, Service};
use crate::config::{ApplicationConfig, EnvSource, RawConfig, UnitConfig, UnitConfigSchema};
use crate::error::BootstrapError;
use crate::state::StateStore;

type BuildFn<T> = fn(&mut ComponentContext<'_>) -> Result<T, BootstrapError>;

/// Components built while one unit registers.
pub(crate) struct Session {
    cache: ComponentCache,
    unit: Arc<str>,
    config: Arc<UnitConfig>,
    state: StateStore,
    app_config: Arc<ApplicationConfig>,
    raw: Arc<RawConfig>,
    env: Arc<dyn EnvSource>,
    pending: HashMap<TypeId, Arc<ComponentHandle>>,
    created: Vec<Arc<ComponentHandle>>,
    exports: Vec<(TypeId, Export)>,
    constructing: Vec<(TypeId, &'static str)>,
}

impl Session {
    pub(crate) fn new(
        cache: ComponentCache,
        unit: Arc<str>,
        config: Arc<UnitConfig>,
        state: StateStore,
        app_config: Arc<ApplicationConfig>,
        raw: Arc<RawConfig>,
        env: Arc<dyn EnvSource>,
    ) -> Self {
        Self {
            cache,
            unit,
            config,
            state,
            app_config,
            raw,
            env,
            pending: HashMap::new(),
            created: Vec::new(),
            exports: Vec::new(),
            constructing: Vec::new(),
        }
    }

    pub(crate) fn unit(&self) -> &Arc<str> {
        &self.unit
    }

    /// Handles built so far, in construction order.
    pub(crate) fn created(&self) -> &[Arc<ComponentHandle>] {
        &self.created
    }

    /// Advertise this unit as the producer of service `type_id`.
    pub(crate) fn export(&mut self, type_id: TypeId, schema: UnitConfigSchema) {
        self.exports.push((
            type_id,
            Export {
                unit: self.unit.clone(),
                schema,
            },
        ));
    }

    /// Singleton service of this unit, built on first request.
    pub(crate) fn service<T: Service>(&mut self) -> Result<Arc<ComponentHandle>, BootstrapError> {
        self.singleton::<T>(ComponentKind::Service, T::build)
    }

    /// Singleton controller of this unit, built on first request.
    pub(crate) fn controller<T: crate::component::Controller>(
        &mut self,
    ) -> Result<Arc<ComponentHandle>, BootstrapError> {
        self.singleton::<T>(ComponentKind::Controller, T::build)
    }

    /// Fresh instance of a service exported by some unit, bound to this one.
    fn integrate<T: Service>(&mut self) -> Result<Arc<ComponentHandle>, BootstrapError> {
        let type_id = TypeId::of::<T>();
        let export = self
            .export_of(type_id)
            .ok_or_else(|| BootstrapError::UnresolvedIntegration {
                component: short_type_name::<T>().to_string(),
                requester: self.unit.to_string(),
            })?;

        let section = self.raw.get(&*self.unit);
        let config = export
            .schema
            .resolve_foreign(&self.unit, section, self.env.as_ref())
            .map_err(|errors| BootstrapError::UnitConfig {
                unit: self.unit.to_string(),
                errors,
            })?;

        let producer = self.lookup(type_id, &export.unit).into_iter().collect();

        tracing::debug!(
            unit = %self.unit,
            component = short_type_name::<T>(),
            producer = %export.unit,
            "Integrating service"
        );
        self.build::<T>(ComponentKind::Service, Arc::new(config), true, producer, T::build)
    }

    /// Existing singleton of `T` in any unit, committed units first.
    fn connect<T: Service>(&self) -> Result<Arc<ComponentHandle>, BootstrapError> {
        let type_id = TypeId::of::<T>();
        self.cache
            .any_singleton(type_id)
            .or_else(|| self.pending.get(&type_id))
            .cloned()
            .ok_or_else(|| BootstrapError::NotConnected {
                component: short_type_name::<T>().to_string(),
                requester: self.unit.to_string(),
            })
    }

    fn singleton<T: Component>(
        &mut self,
        kind: ComponentKind,
        build: BuildFn<T>,
    ) -> Result<Arc<ComponentHandle>, BootstrapError> {
        let type_id = TypeId::of::<T>();
        if let Some(existing) = self.lookup(type_id, &self.unit) {
            return Ok(existing);
        }

        let handle = self.build::<T>(kind, self.config.clone(), false, Vec::new(), build)?;
        self.pending.insert(type_id, handle.clone());
        Ok(handle)
    }

    fn build<T: Component>(
        &mut self,
        kind: ComponentKind,
        config: Arc<UnitConfig>,
        integrated: bool,
        dependencies: Vec<Arc<ComponentHandle>>,
        build: BuildFn<T>,
    ) -> Result<Arc<ComponentHandle>, BootstrapError> {
        let type_id = TypeId::of::<T>();
        let type_name = short_type_name::<T>();

        if let Some(pos) = self.constructing.iter().position(|(id, _)| *id == type_id) {
            let mut cycle: Vec<String> = self.constructing[pos..]
                .iter()
                .map(|(_, name)| name.to_string())
                .collect();
            cycle.push(type_name.to_string());
            return Err(BootstrapError::CyclicDependency {
                unit: self.unit.to_string(),
                cycle,
            });
        }

        let debug_enabled = config.debug().unwrap_or(self.app_config.debug);
        let span = tracing::info_span!(
            "component",
            unit = %self.unit,
            component = type_name,
            debug = debug_enabled
        );
        self.constructing.push((type_id, type_name));

        let mut ctx = ComponentContext {
            session: &mut *self,
            config,
            span,
            debug: debug_enabled,
            component: type_name,
            dependencies,
        };
        let built = build(&mut ctx);
        let ComponentContext {
            dependencies, span, ..
        } = ctx;

        self.constructing.pop();
        let instance = Arc::new(built?);

        let id = self.cache.next_id();
        let handle = Arc::new(ComponentHandle::new(
            id,
            kind,
            self.unit.clone(),
            integrated,
            instance,
            dependencies,
        )
        .with_span(span));

        tracing::debug!(
            unit = %self.unit,
            component = type_name,
            kind = %kind,
            id,
            integrated,
            dependencies = handle.dependencies().len(),
            "Component built"
        );
        self.created.push(handle.clone());
        Ok(handle)
    }

    fn lookup(&self, type_id: TypeId, unit: &str) -> Option<Arc<ComponentHandle>> {
        if unit == &*self.unit {
            self.pending.get(&type_id).cloned()
        } else {
            self.cache.singleton(type_id, unit).cloned()
        }
    }

    fn export_of(&self, type_id: TypeId) -> Option<Export> {
        self.cache.export(type_id).cloned().or_else(|| {
            self.exports
                .iter()
                .find(|(id, _)| *id == type_id)
                .map(|(_, export)| export.clone())
        })
    }

    /// Merge everything built into the cache and hand it back.
    pub(crate) fn commit(mut self) -> ComponentCache {
        let created = std::mem::take(&mut self.created);
        let exports = std::mem::take(&mut self.exports);
        self.cache.commit(created, exports);
        self.cache
    }

    /// Drop everything built and hand the cache back untouched.
    pub(crate) fn rollback(self) -> ComponentCache {
        tracing::debug!(unit = %self.unit, discarded = self.created.len(), "Discarding components");
        self.cache
    }
}

/// What a component constructor can see and request.
///
/// Lives only while one component is being built. Everything requested
/// through it becomes a dependency of that component and starts first.
pub struct ComponentContext<'a> {
    session: &'a mut Session,
    config: Arc<UnitConfig>,
    span: tracing::Span,
    debug: bool,
    component: &'static str,
    dependencies: Vec<Arc<ComponentHandle>>,
}

impl ComponentContext<'_> {
    /// Name of the unit the component is bound to.
    pub fn unit_name(&self) -> &str {
        &self.session.unit
    }

    /// Configuration view of the component. For integrated services this
    /// is the producer's schema applied to the requesting unit's section.
    pub fn config(&self) -> &Arc<UnitConfig> {
        &self.config
    }

    pub fn app_config(&self) -> &Arc<ApplicationConfig> {
        &self.session.app_config
    }

    /// State store of the unit.
    pub fn state(&self) -> &StateStore {
        &self.session.state
    }

    /// Span carrying `unit`, `component` and `debug` fields; keep a clone
    /// to log from.
    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    /// Whether the component logs at debug level: the unit's `debug`
    /// setting, else the application's.
    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Singleton `T` of this unit, built on first request.
    pub fn service<T: Service>(&mut self) -> Result<Arc<T>, BootstrapError> {
        let handle = self.session.service::<T>()?;
        self.depend_on::<T>(handle)
    }

    /// A fresh `T` bound to this unit, configured with the schema of the
    /// unit that exports `T`. Starts after the exporter's own instance.
    pub fn integrate<T: Service>(&mut self) -> Result<Arc<T>, BootstrapError> {
        let handle = self.session.integrate::<T>()?;
        self.depend_on::<T>(handle)
    }

    /// The existing singleton `T` of whichever unit registered it first.
    pub fn connect<T: Service>(&mut self) -> Result<Arc<T>, BootstrapError> {
        let handle = self.session.connect::<T>()?;
        self.depend_on::<T>(handle)
    }

    /// Construction failure attributed to this component.
    pub fn error(&self, reason: impl fmt::Display) -> BootstrapError {
        BootstrapError::Component {
            unit: self.session.unit.to_string(),
            component: self.component.to_string(),
            reason: reason.to_string(),
        }
    }

    fn depend_on<T: Component>(
        &mut self,
        handle: Arc<ComponentHandle>,
    ) -> Result<Arc<T>, BootstrapError> {
        let typed = handle
            .downcast::<T>()
            .ok_or_else(|| self.error(format!("{} has an unexpected type", handle.type_name())))?;

        if !self.dependencies.iter().any(|d| d.id() == handle.id()) {
            self.dependencies.push(handle);
        }
        Ok(typed)
    }
}

impl fmt::Debug for ComponentContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentContext")
            .field("unit", &self.session.unit)
            .field("component", &self.component)
            .field("dependencies", &self.dependencies.len())
            .finish()
    }
}
