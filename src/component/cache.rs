//! Committed component instances of a registry.
//!
//! # Responsibilities
//! - Map (component type, owning unit) to the singleton instance
//! - Remember which unit exports each service type
//! - Hand out component ids
//!
//! # Design Decisions
//! - Mutated only through `&mut self` during registration, so no lock
//! - Entries of a failed registration never reach the cache (see `Session`)

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use crate::component::{ComponentHandle, ComponentId};
use crate::config::UnitConfigSchema;

/// Descriptor of the unit that exports a service type.
#[derive(Debug, Clone)]
pub struct Export {
    pub unit: Arc<str>,
    pub schema: UnitConfigSchema,
}

#[derive(Debug, Default)]
pub struct ComponentCache {
    next_id: ComponentId,
    singletons: HashMap<(TypeId, Arc<str>), Arc<ComponentHandle>>,
    handles: Vec<Arc<ComponentHandle>>,
    exports: HashMap<TypeId, Export>,
}

impl ComponentCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn next_id(&mut self) -> ComponentId {
        self.next_id += 1;
        self.next_id
    }

    /// Singleton of `type_id` owned by `unit`.
    pub fn singleton(&self, type_id: TypeId, unit: &str) -> Option<&Arc<ComponentHandle>> {
        self.singletons.get(&(type_id, Arc::from(unit)))
    }

    /// First committed singleton of `type_id`, in registration order.
    pub fn any_singleton(&self, type_id: TypeId) -> Option<&Arc<ComponentHandle>> {
        self.handles
            .iter()
            .find(|h| h.type_id() == type_id && !h.is_integrated())
    }

    pub fn export(&self, type_id: TypeId) -> Option<&Export> {
        self.exports.get(&type_id)
    }

    /// All committed handles in registration order.
    pub fn handles(&self) -> &[Arc<ComponentHandle>] {
        &self.handles
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Merge the outcome of a successful registration.
    pub(crate) fn commit(
        &mut self,
        created: Vec<Arc<ComponentHandle>>,
        exports: Vec<(TypeId, Export)>,
    ) {
        for handle in created {
            if !handle.is_integrated() {
                self.singletons
                    .insert((handle.type_id(), Arc::from(handle.unit())), handle.clone());
            }
            self.handles.push(handle);
        }

        for (type_id, export) in exports {
            self.exports.entry(type_id).or_insert(export);
        }
    }
}
