//! Components: services and controllers attached to units.
//!
//! # Data Flow
//! ```text
//! Unit::register
//!     → Session (one per registering unit, owns the ComponentCache)
//!         → Service::build / Controller::build with a ComponentContext
//!             → ctx.service::<T>()   singleton in this unit
//!             → ctx.integrate::<T>() fresh instance of another unit's service
//!             → ctx.connect::<T>()   existing singleton of any unit
//!         → ComponentHandle (instance + hooks + recorded dependencies)
//!     → commit into the cache on success, discard on failure
//! ```
//!
//! # Design Decisions
//! - One instance per (component type, owning unit); the cache is owned by
//!   the registry, there is no global
//! - Construction is synchronous; only hooks are async
//! - Dependencies are recorded while building, so the graph is known
//!   before any hook runs

pub mod cache;
pub mod context;
pub mod controller;
pub mod service;

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::HookResult;

pub use cache::ComponentCache;
pub use context::ComponentContext;
pub(crate) use context::Session;
pub use controller::{Controller, Route};
pub use service::Service;

/// Lifecycle hooks shared by services and controllers.
#[async_trait]
pub trait Component: Send + Sync + 'static {
    /// Called once after the owning unit is attached, after every
    /// dependency has started.
    async fn on_startup(&self) -> HookResult {
        Ok(())
    }

    /// Called once during application shutdown, in reverse startup order.
    async fn on_shutdown(&self) -> HookResult {
        Ok(())
    }
}

/// Identity of a component instance, unique within a registry.
pub type ComponentId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    Service,
    Controller,
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentKind::Service => write!(f, "service"),
            ComponentKind::Controller => write!(f, "controller"),
        }
    }
}

/// Hook progress of one component.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentPhase {
    Pending = 0,
    Starting = 1,
    Started = 2,
    Failed = 3,
    Stopped = 4,
}

impl From<u8> for ComponentPhase {
    fn from(val: u8) -> Self {
        match val {
            1 => ComponentPhase::Starting,
            2 => ComponentPhase::Started,
            3 => ComponentPhase::Failed,
            4 => ComponentPhase::Stopped,
            _ => ComponentPhase::Pending,
        }
    }
}

/// A built component and everything the runtime needs to drive it.
pub struct ComponentHandle {
    id: ComponentId,
    kind: ComponentKind,
    type_id: TypeId,
    type_name: &'static str,
    unit: Arc<str>,
    integrated: bool,
    instance: Arc<dyn Any + Send + Sync>,
    hooks: Arc<dyn Component>,
    dependencies: Vec<Arc<ComponentHandle>>,
    phase: AtomicU8,
    span: tracing::Span,
}

impl ComponentHandle {
    pub(crate) fn new<T: Component>(
        id: ComponentId,
        kind: ComponentKind,
        unit: Arc<str>,
        integrated: bool,
        instance: Arc<T>,
        dependencies: Vec<Arc<ComponentHandle>>,
    ) -> Self {
        Self {
            id,
            kind,
            type_id: TypeId::of::<T>(),
            type_name: short_type_name::<T>(),
            unit,
            integrated,
            instance: instance.clone(),
            hooks: instance,
            dependencies,
            phase: AtomicU8::new(ComponentPhase::Pending as u8),
            span: tracing::Span::none(),
        }
    }

    pub(crate) fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }

    /// Span the component was built in. Hooks and requests run inside it.
    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    pub fn id(&self) -> ComponentId {
        self.id
    }

    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Type name without its module path.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Unit the instance is bound to.
    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Whether this is a fresh instance of another unit's service.
    pub fn is_integrated(&self) -> bool {
        self.integrated
    }

    /// Components that must start before this one.
    pub fn dependencies(&self) -> &[Arc<ComponentHandle>] {
        &self.dependencies
    }

    pub fn hooks(&self) -> &dyn Component {
        self.hooks.as_ref()
    }

    /// The typed instance, if this handle holds a `T`.
    pub fn downcast<T: Component>(&self) -> Option<Arc<T>> {
        self.instance.clone().downcast::<T>().ok()
    }

    pub fn phase(&self) -> ComponentPhase {
        ComponentPhase::from(self.phase.load(Ordering::Acquire))
    }

    pub(crate) fn set_phase(&self, phase: ComponentPhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    /// Move `Pending -> Starting`. False if another caller got there first.
    pub(crate) fn try_begin_startup(&self) -> bool {
        self.phase
            .compare_exchange(
                ComponentPhase::Pending as u8,
                ComponentPhase::Starting as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

impl fmt::Debug for ComponentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentHandle")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("type_name", &self.type_name)
            .field("unit", &self.unit)
            .field("integrated", &self.integrated)
            .field("phase", &self.phase())
            .field(
                "dependencies",
                &self.dependencies.iter().map(|d| d.id).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// `my_crate::billing::InvoiceService` -> `InvoiceService`.
pub fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    match base.rfind("::") {
        Some(idx) => &full[idx + 2..],
        None => full,
    }
}
