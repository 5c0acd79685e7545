//! Type-indexed layered state storage.
//!
//! A scope's or route's `.state(value)` builder calls must accept arbitrary
//! user types that are not known ahead of time, so each value is boxed
//! behind its `TypeId` rather than described by a fixed, compile-time schema.
//!
//! A [`StateLayers`] is an ordered stack of [`StateMap`]s. Lookup scans
//! front-to-back and returns the first match, which is how an inner scope's
//! state shadows an outer one of the same type without removing the outer
//! value from the stack.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
    sync::Arc,
};

/// A single flat layer of type-indexed values.
///
/// Values are stored as `Arc<dyn Any + Send + Sync>` so that a layer built
/// once at `Builder::build()` time can be shared across every worker thread
/// and every request without cloning the underlying value.
#[derive(Default, Clone)]
pub struct StateMap {
    entries: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl StateMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, overwriting any previous value of the same type in
    /// this layer (not in layers beneath it).
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) {
        self.entries.insert(TypeId::of::<T>(), Arc::new(value));
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.entries
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
    }

    pub fn get_arc<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.entries
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|v| v.downcast::<T>().ok())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// An error returned when a requested state type is absent from every layer.
#[derive(thiserror::Error, Debug)]
#[error("no state of the requested type was registered on this route or its enclosing scopes")]
pub struct StateNotFound;

/// An ordered stack of [`StateMap`] layers, outermost (shallowest scope)
/// first. Lookup scans front-to-back so the outermost registered value wins
/// unless a deeper layer shadows it with a value of the same type.
#[derive(Default, Clone)]
pub struct StateLayers {
    layers: Vec<Arc<StateMap>>,
}

impl StateLayers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a new, innermost layer. Scopes push their own layer in front of
    /// their parent's so that a route declared deeper in the tree is
    /// checked first, letting an inner scope's state shadow an outer one of
    /// the same type.
    pub fn push_front(&mut self, layer: StateMap) {
        if !layer.is_empty() {
            self.layers.insert(0, Arc::new(layer));
        }
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.layers.iter().find_map(|l| l.get::<T>())
    }

    pub fn try_get<T: Send + Sync + 'static>(&self) -> Result<&T, StateNotFound> {
        self.get::<T>().ok_or(StateNotFound)
    }
}
