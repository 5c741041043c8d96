//! Units: named, versioned bundles of services and controllers.
//!
//! # Responsibilities
//! - Declare a unit: metadata source, config schema, component types
//! - Instantiate its components during registration
//! - Compute and run dependency-ordered startup, then reverse shutdown
//!
//! # Data Flow
//! ```text
//! Unit::builder() ... build()          Declared
//!     → Registry::register_units        Registering
//!         → resolve meta, resolve config, instantiate components
//!         → startup order (graph.rs), routes
//!     → attach                          Attached
//!     → call_startup_handlers           Started | Degraded
//!     → call_shutdown_handlers          Stopped
//! ```
//!
//! # Design Decisions
//! - `Unit` is a cheap handle; clones refer to the same unit
//! - Registration state lives in a `OnceLock`, set exactly once
//! - A handle may only be registered once; a second attempt panics

pub mod graph;
pub mod meta;

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use serde::Serialize;

use crate::component::controller::{guarded_routes, Route};
use crate::component::{
    short_type_name, ComponentHandle, ComponentId, ComponentKind, ComponentPhase,
    Controller, Service, Session,
};
use crate::config::{UnitConfig, UnitConfigSchema};
use crate::error::{BootstrapError, HookKind, StartupHandlerError};
use crate::lifecycle::hooks::run_hook;
use crate::state::StateStore;

pub use graph::{CyclicDependencyError, DependencyGraph};
pub use meta::{ExplicitMeta, ManifestMeta, MetadataResolver, RawMeta, UnitMeta};

type ServiceFactory = fn(&mut Session) -> Result<Arc<ComponentHandle>, BootstrapError>;
type ControllerFactory =
    fn(&mut Session) -> Result<(Arc<ComponentHandle>, Vec<Route>), BootstrapError>;

fn build_service<T: Service>(session: &mut Session) -> Result<Arc<ComponentHandle>, BootstrapError> {
    session.service::<T>()
}

fn build_controller<T: Controller>(
    session: &mut Session,
) -> Result<(Arc<ComponentHandle>, Vec<Route>), BootstrapError> {
    let handle = session.controller::<T>()?;
    let controller = handle
        .downcast::<T>()
        .ok_or_else(|| BootstrapError::Component {
            unit: session.unit().to_string(),
            component: short_type_name::<T>().to_string(),
            reason: "controller has an unexpected type".to_string(),
        })?;
    let routes = guarded_routes(controller, handle.span().clone());
    Ok((handle, routes))
}

#[derive(Clone, Copy)]
struct Declared<F> {
    type_id: TypeId,
    name: &'static str,
    factory: F,
}

/// Registration progress of a unit.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitPhase {
    Declared = 0,
    Registering = 1,
    Attached = 2,
    Started = 3,
    Degraded = 4,
    Stopped = 5,
    Failed = 6,
}

impl From<u8> for UnitPhase {
    fn from(val: u8) -> Self {
        match val {
            1 => UnitPhase::Registering,
            2 => UnitPhase::Attached,
            3 => UnitPhase::Started,
            4 => UnitPhase::Degraded,
            5 => UnitPhase::Stopped,
            6 => UnitPhase::Failed,
            _ => UnitPhase::Declared,
        }
    }
}

impl fmt::Display for UnitPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnitPhase::Declared => "declared",
            UnitPhase::Registering => "registering",
            UnitPhase::Attached => "attached",
            UnitPhase::Started => "started",
            UnitPhase::Degraded => "degraded",
            UnitPhase::Stopped => "stopped",
            UnitPhase::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// An endpoint registered by one of the unit's controllers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteInfo {
    pub method: String,
    pub path: String,
    pub name: String,
}

/// Components built for a unit, before routes are mounted.
pub(crate) struct Instantiated {
    pub services: Vec<Arc<ComponentHandle>>,
    pub controllers: Vec<Arc<ComponentHandle>>,
    pub routes: Vec<Route>,
    pub startup_order: Vec<Arc<ComponentHandle>>,
}

/// Everything a unit owns once attached.
#[derive(Debug)]
pub(crate) struct Attachment {
    pub meta: UnitMeta,
    pub config: Arc<UnitConfig>,
    pub state: StateStore,
    pub services: Vec<Arc<ComponentHandle>>,
    pub controllers: Vec<Arc<ComponentHandle>>,
    pub routes: Vec<RouteInfo>,
    pub startup_order: Vec<Arc<ComponentHandle>>,
}

struct UnitInner {
    meta: Box<dyn MetadataResolver>,
    schema: UnitConfigSchema,
    services: Vec<Declared<ServiceFactory>>,
    controllers: Vec<Declared<ControllerFactory>>,
    phase: AtomicU8,
    attachment: OnceLock<Attachment>,
}

/// Handle to a declared unit.
#[derive(Clone)]
pub struct Unit(Arc<UnitInner>);

impl Unit {
    pub fn builder() -> UnitBuilder {
        UnitBuilder::default()
    }

    /// Whether both handles refer to the same unit.
    pub fn ptr_eq(&self, other: &Unit) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn phase(&self) -> UnitPhase {
        UnitPhase::from(self.0.phase.load(Ordering::Acquire))
    }

    pub fn is_attached(&self) -> bool {
        self.0.attachment.get().is_some()
    }

    /// Resolved name, once attached.
    pub fn name(&self) -> Option<&str> {
        self.attachment().map(|a| a.meta.name.as_str())
    }

    /// Name if attached, otherwise the metadata source.
    pub fn label(&self) -> String {
        match self.name() {
            Some(name) => name.to_string(),
            None => self.0.meta.source_name(),
        }
    }

    pub fn meta(&self) -> Option<&UnitMeta> {
        self.attachment().map(|a| &a.meta)
    }

    pub fn config(&self) -> Option<&Arc<UnitConfig>> {
        self.attachment().map(|a| &a.config)
    }

    pub fn state(&self) -> Option<&StateStore> {
        self.attachment().map(|a| &a.state)
    }

    pub fn schema(&self) -> &UnitConfigSchema {
        &self.0.schema
    }

    /// Services bound to this unit: declared ones first, then the ones
    /// created while building them.
    pub fn services(&self) -> &[Arc<ComponentHandle>] {
        self.attachment().map(|a| a.services.as_slice()).unwrap_or(&[])
    }

    pub fn controllers(&self) -> &[Arc<ComponentHandle>] {
        self.attachment()
            .map(|a| a.controllers.as_slice())
            .unwrap_or(&[])
    }

    pub fn routes(&self) -> &[RouteInfo] {
        self.attachment().map(|a| a.routes.as_slice()).unwrap_or(&[])
    }

    /// Components in the order their startup hooks run. May include
    /// services of other units this unit depends on.
    pub fn startup_order(&self) -> &[Arc<ComponentHandle>] {
        self.attachment()
            .map(|a| a.startup_order.as_slice())
            .unwrap_or(&[])
    }

    /// The unit's own singleton `T`.
    pub fn service<T: Service>(&self) -> Option<Arc<T>> {
        self.services()
            .iter()
            .find(|h| h.type_id() == TypeId::of::<T>() && !h.is_integrated())
            .and_then(|h| h.downcast::<T>())
    }

    /// The unit's controller `T`.
    pub fn controller<T: Controller>(&self) -> Option<Arc<T>> {
        self.controllers()
            .iter()
            .find(|h| h.type_id() == TypeId::of::<T>())
            .and_then(|h| h.downcast::<T>())
    }

    /// Run `on_startup` of every component in dependency order.
    ///
    /// Components already started (for example a shared dependency
    /// started by an earlier unit) are skipped. Stops at the first failure;
    /// the unit is then `Degraded`.
    pub async fn call_startup_handlers(
        &self,
        timeout: Option<Duration>,
    ) -> Result<(), StartupHandlerError> {
        let Some(attachment) = self.attachment() else {
            return Ok(());
        };

        let result = start_in_order(&attachment.startup_order, timeout).await;
        let phase = if result.is_ok() {
            UnitPhase::Started
        } else {
            UnitPhase::Degraded
        };
        self.set_phase(phase);
        result
    }

    /// Run `on_shutdown` of this unit's started components in reverse
    /// startup order. Keeps going after a failure; returns every failure.
    pub async fn call_shutdown_handlers(
        &self,
        timeout: Option<Duration>,
    ) -> Vec<StartupHandlerError> {
        let Some(attachment) = self.attachment() else {
            return Vec::new();
        };

        let mut errors = Vec::new();
        let own = attachment
            .startup_order
            .iter()
            .rev()
            .filter(|h| h.unit() == attachment.meta.name);

        for handle in own {
            if handle.phase() != ComponentPhase::Started {
                continue;
            }
            let result = run_hook(handle, HookKind::Shutdown, timeout).await;
            handle.set_phase(ComponentPhase::Stopped);
            if let Err(e) = result {
                errors.push(e);
            }
        }

        self.set_phase(UnitPhase::Stopped);
        errors
    }

    fn attachment(&self) -> Option<&Attachment> {
        self.0.attachment.get()
    }

    fn set_phase(&self, phase: UnitPhase) {
        self.0.phase.store(phase as u8, Ordering::Release);
    }

    /// Move `Declared -> Registering`.
    ///
    /// # Panics
    /// If the unit was already registered (successfully or not).
    pub(crate) fn begin_registration(&self) {
        let swapped = self.0.phase.compare_exchange(
            UnitPhase::Declared as u8,
            UnitPhase::Registering as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        if let Err(current) = swapped {
            panic!(
                "unit {} registered twice (phase: {})",
                self.label(),
                UnitPhase::from(current)
            );
        }
    }

    /// Resolve and validate metadata.
    pub(crate) fn resolve_meta(&self) -> Result<UnitMeta, BootstrapError> {
        let raw = self.0.meta.resolve()?;
        let unit = raw
            .name
            .clone()
            .unwrap_or_else(|| self.0.meta.source_name());
        raw.validate()
            .map_err(|errors| BootstrapError::UnitMeta { unit, errors })
    }

    /// Build the declared components inside `session`.
    pub(crate) fn instantiate(
        &self,
        session: &mut Session,
        config: &UnitConfig,
    ) -> Result<Instantiated, BootstrapError> {
        for declared in &self.0.services {
            session.export(declared.type_id, self.0.schema.clone());
        }

        let mut services: Vec<Arc<ComponentHandle>> = Vec::new();
        if config.should_import_services() {
            for declared in &self.0.services {
                tracing::debug!(unit = %session.unit(), service = declared.name, "Importing service");
                push_unique(&mut services, (declared.factory)(session)?);
            }
        }

        let mut controllers: Vec<Arc<ComponentHandle>> = Vec::new();
        let mut routes = Vec::new();
        if config.should_import_controllers() {
            for declared in &self.0.controllers {
                tracing::debug!(unit = %session.unit(), controller = declared.name, "Importing controller");
                let (handle, controller_routes) = (declared.factory)(session)?;
                if push_unique(&mut controllers, handle) {
                    routes.extend(controller_routes);
                }
            }
        }

        for handle in session.created() {
            if handle.kind() == ComponentKind::Service {
                push_unique(&mut services, handle.clone());
            }
        }

        let startup_order = startup_order(session.unit(), &services, &controllers)?;

        Ok(Instantiated {
            services,
            controllers,
            routes,
            startup_order,
        })
    }

    pub(crate) fn attach(&self, attachment: Attachment) {
        if self.0.attachment.set(attachment).is_err() {
            panic!("unit {} attached twice", self.label());
        }
        self.set_phase(UnitPhase::Attached);
    }

    pub(crate) fn mark_failed(&self) {
        self.set_phase(UnitPhase::Failed);
    }
}

impl fmt::Debug for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unit")
            .field("label", &self.label())
            .field("phase", &self.phase())
            .field("services", &self.0.services.iter().map(|d| d.name).collect::<Vec<_>>())
            .field(
                "controllers",
                &self.0.controllers.iter().map(|d| d.name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Declares a unit.
///
/// Exactly one of [`meta`](UnitBuilder::meta) or
/// [`auto_meta`](UnitBuilder::auto_meta) must be given. Component types
/// are kept in declaration order, each at most once.
#[derive(Default)]
pub struct UnitBuilder {
    meta: Option<ExplicitMeta>,
    auto_meta: Option<Box<dyn MetadataResolver>>,
    schema: UnitConfigSchema,
    services: Vec<Declared<ServiceFactory>>,
    controllers: Vec<Declared<ControllerFactory>>,
}

impl UnitBuilder {
    pub fn meta(mut self, meta: ExplicitMeta) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Resolve metadata at registration through `resolver`.
    pub fn auto_meta(mut self, resolver: impl MetadataResolver + 'static) -> Self {
        self.auto_meta = Some(Box::new(resolver));
        self
    }

    /// Replace the configuration schema.
    pub fn config(mut self, schema: UnitConfigSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn service<T: Service>(mut self) -> Self {
        let type_id = TypeId::of::<T>();
        if !self.services.iter().any(|d| d.type_id == type_id) {
            self.services.push(Declared {
                type_id,
                name: short_type_name::<T>(),
                factory: build_service::<T>,
            });
        }
        self
    }

    pub fn controller<T: Controller>(mut self) -> Self {
        let type_id = TypeId::of::<T>();
        if !self.controllers.iter().any(|d| d.type_id == type_id) {
            self.controllers.push(Declared {
                type_id,
                name: short_type_name::<T>(),
                factory: build_controller::<T>,
            });
        }
        self
    }

    pub fn build(self) -> Result<Unit, BootstrapError> {
        let meta: Box<dyn MetadataResolver> = match (self.meta, self.auto_meta) {
            (Some(meta), None) => Box::new(meta),
            (None, Some(resolver)) => resolver,
            (None, None) => return Err(BootstrapError::MissingMetadata),
            (Some(_), Some(_)) => return Err(BootstrapError::ConflictingMetadata),
        };

        Ok(Unit(Arc::new(UnitInner {
            meta,
            schema: self.schema,
            services: self.services,
            controllers: self.controllers,
            phase: AtomicU8::new(UnitPhase::Declared as u8),
            attachment: OnceLock::new(),
        })))
    }
}

fn push_unique(handles: &mut Vec<Arc<ComponentHandle>>, handle: Arc<ComponentHandle>) -> bool {
    if handles.iter().any(|h| h.id() == handle.id()) {
        false
    } else {
        handles.push(handle);
        true
    }
}

/// Order the graph reachable from `services` then `controllers`.
fn startup_order(
    unit: &str,
    services: &[Arc<ComponentHandle>],
    controllers: &[Arc<ComponentHandle>],
) -> Result<Vec<Arc<ComponentHandle>>, BootstrapError> {
    let mut graph: DependencyGraph<ComponentId> = DependencyGraph::new();
    let mut handles: HashMap<ComponentId, Arc<ComponentHandle>> = HashMap::new();
    let roots: Vec<ComponentId> = services.iter().chain(controllers).map(|h| h.id()).collect();

    let mut stack: Vec<Arc<ComponentHandle>> = services.iter().chain(controllers).cloned().collect();
    while let Some(handle) = stack.pop() {
        if handles.contains_key(&handle.id()) {
            continue;
        }
        graph.add_node(handle.id());
        for dependency in handle.dependencies() {
            graph.add_edge(handle.id(), dependency.id());
            stack.push(dependency.clone());
        }
        handles.insert(handle.id(), handle);
    }

    // Edges only point at handles built earlier in the session, whose
    // construction stack already rejects cycles. The graph is acyclic here.
    let order = graph.startup_order(&roots).map_err(|e| BootstrapError::CyclicDependency {
        unit: unit.to_string(),
        cycle: e
            .cycle
            .iter()
            .map(|id| {
                handles
                    .get(id)
                    .map(|h| h.type_name().to_string())
                    .unwrap_or_else(|| id.to_string())
            })
            .collect(),
    })?;

    Ok(order
        .into_iter()
        .filter_map(|id| handles.get(&id).cloned())
        .collect())
}

async fn start_in_order(
    order: &[Arc<ComponentHandle>],
    timeout: Option<Duration>,
) -> Result<(), StartupHandlerError> {
    for handle in order {
        if handle.phase() != ComponentPhase::Pending {
            continue;
        }

        let blocked = handle
            .dependencies()
            .iter()
            .find(|d| d.phase() != ComponentPhase::Started);
        if let Some(dependency) = blocked {
            handle.set_phase(ComponentPhase::Failed);
            return Err(StartupHandlerError::DependencyFailed {
                unit: handle.unit().to_string(),
                component: handle.type_name().to_string(),
                dependency: dependency.type_name().to_string(),
            });
        }

        if !handle.try_begin_startup() {
            continue;
        }

        match run_hook(handle, HookKind::Startup, timeout).await {
            Ok(()) => handle.set_phase(ComponentPhase::Started),
            Err(e) => {
                handle.set_phase(ComponentPhase::Failed);
                return Err(e);
            }
        }
    }
    Ok(())
}
