//! Provider descriptor table.
//!
//! Holds the immutable base descriptor set seeded at construction plus
//! runtime-registered dynamic descriptors and their alias mappings. The
//! table is an explicitly constructed object; a single process-default
//! instance lives at the composition root (see [`default_table`]).

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use once_cell::sync::Lazy;
use tracing::{debug, warn};

use crate::error::RelayError;

pub mod descriptor;
pub mod ids;
pub mod schema;

pub use descriptor::{
    ClientFactory, DynamicRegistration, FnClientFactory, ProviderDescriptor, ProviderInfo,
};

#[derive(Default)]
struct TableState {
    descriptors: HashMap<String, ProviderDescriptor>,
    base_ids: HashSet<String>,
    dynamic_ids: HashSet<String>,
    mappings: HashMap<String, String>,
}

/// Registry of provider descriptors (base + dynamic).
pub struct ProviderTable {
    inner: RwLock<TableState>,
}

impl ProviderTable {
    /// A table seeded with the built-in base providers.
    pub fn new() -> Self {
        let table = Self::empty();
        {
            let mut state = table.write_state();
            for descriptor in ids::base_descriptors() {
                state.base_ids.insert(descriptor.id.clone());
                state.descriptors.insert(descriptor.id.clone(), descriptor);
            }
        }
        table
    }

    /// A table with no descriptors at all. `get` only falls back to
    /// `openai-compatible` once such a descriptor has been registered.
    pub fn empty() -> Self {
        Self {
            inner: RwLock::new(TableState::default()),
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, TableState> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, TableState> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Register (or replace) a base descriptor. Base descriptors survive
    /// [`cleanup`](Self::cleanup) and block dynamic ids from colliding.
    pub fn register_base(&self, descriptor: ProviderDescriptor) -> Result<(), RelayError> {
        schema::validate_descriptor(&descriptor)?;
        let mut state = self.write_state();
        debug!(provider_id = %descriptor.id, "registering base provider");
        state.base_ids.insert(descriptor.id.clone());
        state.descriptors.insert(descriptor.id.clone(), descriptor);
        Ok(())
    }

    /// Register a dynamic descriptor with optional alias mappings.
    ///
    /// Returns `false` instead of failing for malformed input, base-id
    /// collisions, or unresolvable mappings; batch registration relies on
    /// this to continue past individual failures.
    pub fn register_dynamic(&self, registration: DynamicRegistration) -> bool {
        let mut state = self.write_state();
        if let Err(e) = schema::validate_dynamic(&registration, &state.base_ids) {
            warn!(
                provider_id = %registration.descriptor.id,
                error = %e,
                "rejected dynamic provider registration"
            );
            return false;
        }

        // Every mapping value must resolve, with at most one extra hop,
        // to a descriptor id once this registration is admitted.
        let id = registration.descriptor.id.clone();
        for target in registration.mappings.values() {
            let resolves = target == &id
                || state.descriptors.contains_key(target)
                || state
                    .mappings
                    .get(target)
                    .is_some_and(|t| t == &id || state.descriptors.contains_key(t));
            if !resolves {
                warn!(
                    provider_id = %id,
                    target = %target,
                    "rejected dynamic provider registration: unresolvable alias target"
                );
                return false;
            }
        }

        debug!(provider_id = %id, mappings = registration.mappings.len(), "registering dynamic provider");
        state.dynamic_ids.insert(id.clone());
        state.descriptors.insert(id, registration.descriptor);
        state.mappings.extend(registration.mappings);
        true
    }

    /// Apply [`register_dynamic`](Self::register_dynamic) to each entry and
    /// return the number of successes.
    pub fn register_many(&self, registrations: Vec<DynamicRegistration>) -> usize {
        registrations
            .into_iter()
            .filter(|r| self.register_dynamic(r.clone()))
            .count()
    }

    /// Remove one dynamic descriptor and the aliases pointing at it.
    pub fn unregister_dynamic(&self, id: &str) -> bool {
        let mut state = self.write_state();
        if !state.dynamic_ids.remove(id) {
            return false;
        }
        state.descriptors.remove(id);
        state.mappings.retain(|alias, target| alias != id && target != id);
        debug!(provider_id = %id, "unregistered dynamic provider");
        true
    }

    /// Drop every dynamic descriptor and alias mapping. Base descriptors
    /// are untouched.
    pub fn cleanup(&self) {
        let mut state = self.write_state();
        let dynamic: Vec<String> = state.dynamic_ids.drain().collect();
        for id in &dynamic {
            state.descriptors.remove(id);
        }
        state.mappings.clear();
        debug!(removed = dynamic.len(), "cleaned up dynamic providers");
    }

    /// Descriptor lookup with universal fallback: unknown ids resolve to the
    /// `openai-compatible` adapter so every non-empty id yields a
    /// constructible client.
    pub fn get(&self, id: &str) -> Option<ProviderDescriptor> {
        let state = self.read_state();
        state
            .descriptors
            .get(id)
            .or_else(|| state.descriptors.get(ids::OPENAI_COMPATIBLE))
            .cloned()
    }

    /// Schema-level support check: any non-empty id is addressable.
    pub fn is_supported(&self, id: &str) -> bool {
        schema::is_valid_provider_id(id)
    }

    pub fn is_base(&self, id: &str) -> bool {
        self.read_state().base_ids.contains(id)
    }

    pub fn is_dynamic(&self, id: &str) -> bool {
        self.read_state().dynamic_ids.contains(id)
    }

    pub fn list_dynamic(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.read_state().dynamic_ids.iter().cloned().collect();
        ids.sort();
        ids
    }

    /// All registered descriptors (base + dynamic).
    pub fn list_descriptors(&self) -> Vec<ProviderDescriptor> {
        self.read_state().descriptors.values().cloned().collect()
    }

    /// All valid provider ids (base + dynamic), sorted.
    pub fn all_ids(&self) -> Vec<String> {
        let state = self.read_state();
        let mut ids: Vec<String> = state.descriptors.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Snapshot of the alias map.
    pub fn alias_map(&self) -> HashMap<String, String> {
        self.read_state().mappings.clone()
    }

    /// Resolve an alias to its canonical provider id.
    ///
    /// A registered dynamic id resolves to itself; alias values that are
    /// themselves aliases are followed one hop.
    pub fn resolve_alias(&self, name: &str) -> Option<String> {
        let state = self.read_state();
        if let Some(target) = state.mappings.get(name) {
            if state.descriptors.contains_key(target) {
                return Some(target.clone());
            }
            return state.mappings.get(target).cloned();
        }
        if state.dynamic_ids.contains(name) {
            return Some(name.to_string());
        }
        None
    }

    /// Introspection record for one provider id.
    pub fn provider_info(&self, id: &str) -> ProviderInfo {
        let state = self.read_state();
        let effective = if state.descriptors.contains_key(id) {
            id.to_string()
        } else {
            ids::OPENAI_COMPATIBLE.to_string()
        };
        let display_name = state
            .descriptors
            .get(&effective)
            .map(|d| d.display_name.clone())
            .unwrap_or_else(|| id.to_string());
        ProviderInfo {
            id: id.to_string(),
            display_name,
            is_supported: schema::is_valid_provider_id(id),
            effective_provider: effective,
        }
    }
}

impl Default for ProviderTable {
    fn default() -> Self {
        Self::new()
    }
}

static DEFAULT_TABLE: Lazy<Arc<ProviderTable>> = Lazy::new(|| Arc::new(ProviderTable::new()));

/// Process-default descriptor table used by [`crate::executor::create_executor`].
pub fn default_table() -> Arc<ProviderTable> {
    DEFAULT_TABLE.clone()
}
