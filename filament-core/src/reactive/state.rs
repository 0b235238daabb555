//! The reactive state proxy.
//!
//! A host's observable surface is a descriptor table of declared property
//! slots. Reads go through an explicit get indirection that records the
//! `(host, key)` pair into the active tracking session; writes go through a
//! set indirection that updates the slot and then requests change detection
//! per the host's strategy. Only declared slots are visible — undeclared
//! keys are invisible to tracking and writing one is a contract violation.
//!
//! Tracking is shallow by default: only top-level identity changes are
//! observed. Deep mode is an explicit request (`prop_map`) that wraps a
//! nested map value in its own reactive view, cached by target identity so
//! repeated reads return the same wrapper.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::ReactorError;
use crate::lifecycle::Phase;
use crate::reactive::context::{self, Owner};
use crate::reactive::value::{MapRef, Observed, Value};
use crate::registry::{with_registry, DetectionStrategy, HostId};

/// Declared property slots for one host.
#[derive(Debug, Default)]
pub struct StateTable {
    slots: IndexMap<String, Value>,
}

impl StateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a slot. Builder-style, used at connect time.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.slots.insert(key.into(), value.into());
        self
    }

    /// Declare a slot on an existing table.
    pub fn declare(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.slots.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.slots.get(key)
    }

    /// Write a declared slot. Undeclared keys are rejected before any
    /// mutation happens.
    pub fn set(&mut self, key: &str, value: Value) -> Result<(), ReactorError> {
        match self.slots.get_mut(key) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(ReactorError::UnknownProperty {
                key: key.to_string(),
            }),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }

    /// Iterate declared slots in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.slots.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl FromIterator<(String, Value)> for StateTable {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            slots: iter.into_iter().collect(),
        }
    }
}

/// Tracked read of the current host's property.
///
/// Clones the slot value and, if a tracking session is active, records the
/// `(host, key)` pair with the observed value.
pub fn prop(key: &str) -> Result<Value, ReactorError> {
    let host = context::current_host()?;
    let value = with_registry(|registry| {
        registry
            .host(host)?
            .props
            .get(key)
            .cloned()
            .ok_or(ReactorError::UnknownProperty {
                key: key.to_string(),
            })
    })?;
    context::record_read(Owner::Host(host), key, Observed::of(&value));
    Ok(value)
}

/// Tracked write of the current host's property.
pub fn set_prop(key: &str, value: impl Into<Value>) -> Result<(), ReactorError> {
    let host = context::current_host()?;
    set_property(host, key, value)
}

/// Untracked external read, for the framework side of the boundary.
pub fn get_property(host: HostId, key: &str) -> Result<Value, ReactorError> {
    with_registry(|registry| {
        registry
            .host(host)?
            .props
            .get(key)
            .cloned()
            .ok_or(ReactorError::UnknownProperty {
                key: key.to_string(),
            })
    })
}

/// External write: update the slot, then request change detection.
pub fn set_property(host: HostId, key: &str, value: impl Into<Value>) -> Result<(), ReactorError> {
    let value = value.into();
    with_registry(|registry| registry.host_mut(host)?.props.set(key, value))?;
    notify_write(host)
}

/// Deep-mode read: wrap the map held by `key` in a reactive view.
///
/// The top-level dependency is recorded like any tracked read; the returned
/// wrapper records nested dependencies on its own accesses. Wrappers are
/// cached by target identity, so two reads of the same property yield views
/// over the same tracked object.
pub fn prop_map(key: &str) -> Result<ReactiveMap, ReactorError> {
    let host = context::current_host()?;
    let (wrapper, map) = with_registry(|registry| {
        let record = registry.host_mut(host)?;
        let value = record
            .props
            .get(key)
            .cloned()
            .ok_or(ReactorError::UnknownProperty {
                key: key.to_string(),
            })?;
        let Value::Map(map) = value else {
            return Err(ReactorError::NotAnObject {
                key: key.to_string(),
            });
        };
        let ptr = Arc::as_ptr(&map) as usize;
        let wrapper = record
            .wrappers
            .entry(ptr)
            .or_insert_with(|| ReactiveMap::new(host, map.clone()))
            .clone();
        Ok((wrapper, map))
    })?;
    context::record_read(Owner::Host(host), key, Observed::of(&Value::Map(map)));
    Ok(wrapper)
}

/// Collect the identities of every map reachable from `value`, nested maps
/// and maps inside lists included. The seen-set doubles as a cycle guard.
fn live_map_ptrs(value: &Value, out: &mut Vec<usize>) {
    match value {
        Value::Map(map) => {
            let ptr = Arc::as_ptr(map) as usize;
            if out.contains(&ptr) {
                return;
            }
            out.push(ptr);
            for nested in map.read().values() {
                live_map_ptrs(nested, out);
            }
        }
        Value::List(list) => {
            for nested in list.read().iter() {
                live_map_ptrs(nested, out);
            }
        }
        _ => {}
    }
}

/// Request change detection for `host` after a write.
///
/// `Detect` runs the pass synchronously unless a dispatch is already in
/// flight, in which case the pass is deferred to the end of that dispatch
/// (the single-deferral analog of a microtask). `Schedule` enqueues the host
/// for the framework to drain.
///
/// Writes are also the point where the deep-mode wrapper cache is pruned:
/// wrappers whose target is no longer reachable from the state table are
/// dropped.
pub(crate) fn notify_write(host: HostId) -> Result<(), ReactorError> {
    let run_now = with_registry(|registry| -> Result<bool, ReactorError> {
        let record = registry.host_mut(host)?;
        if !record.wrappers.is_empty() {
            let mut live = Vec::new();
            for (_, value) in record.props.iter() {
                live_map_ptrs(value, &mut live);
            }
            record.wrappers.retain(|ptr, _| live.contains(ptr));
        }
        match record.options.strategy {
            DetectionStrategy::Detect => {
                if record.dispatching {
                    record.detect_pending = true;
                    Ok(false)
                } else {
                    Ok(true)
                }
            }
            DetectionStrategy::Schedule => {
                registry.enqueue_detection(host);
                Ok(false)
            }
        }
    })?;

    if run_now {
        crate::lifecycle::schedule(host, Phase::ChangeCheck)?;
    }
    Ok(())
}

/// Reactive view over a nested map value (deep mode).
///
/// Accesses record `(map identity, key)` pairs into the active tracking
/// session; writes mutate the target in place (identity is stable) and
/// request change detection on the owning host.
#[derive(Clone)]
pub struct ReactiveMap {
    host: HostId,
    target: MapRef,
}

impl ReactiveMap {
    pub(crate) fn new(host: HostId, target: MapRef) -> Self {
        Self { host, target }
    }

    /// Tracked read of a nested key. Missing keys read as `Unit` and are
    /// still tracked, so a later insertion invalidates dependents.
    pub fn get(&self, key: &str) -> Value {
        let value = self
            .target
            .read()
            .get(key)
            .cloned()
            .unwrap_or(Value::Unit);
        context::record_read(Owner::Map(self.target.clone()), key, Observed::of(&value));
        value
    }

    /// Tracked descent into a nested map, through the same wrapper cache.
    pub fn map(&self, key: &str) -> Result<ReactiveMap, ReactorError> {
        let value = self
            .target
            .read()
            .get(key)
            .cloned()
            .ok_or(ReactorError::UnknownProperty {
                key: key.to_string(),
            })?;
        let Value::Map(inner) = value else {
            return Err(ReactorError::NotAnObject {
                key: key.to_string(),
            });
        };
        context::record_read(
            Owner::Map(self.target.clone()),
            key,
            Observed::of(&Value::Map(inner.clone())),
        );
        let ptr = Arc::as_ptr(&inner) as usize;
        let host = self.host;
        with_registry(|registry| {
            let record = registry.host_mut(host)?;
            Ok(record
                .wrappers
                .entry(ptr)
                .or_insert_with(|| ReactiveMap::new(host, inner.clone()))
                .clone())
        })
    }

    /// In-place write of a nested key, followed by a change-detection
    /// request. Nested maps are free-form; new keys may be inserted.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) -> Result<(), ReactorError> {
        self.target.write().insert(key.into(), value.into());
        notify_write(self.host)
    }

    pub fn len(&self) -> usize {
        self.target.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.target.read().is_empty()
    }

    /// Whether two views observe the same underlying map.
    pub fn same_target(&self, other: &ReactiveMap) -> bool {
        Arc::ptr_eq(&self.target, &other.target)
    }
}

impl std::fmt::Debug for ReactiveMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactiveMap")
            .field("host", &self.host)
            .field("target", &(Arc::as_ptr(&self.target) as usize))
            .field("len", &self.len())
            .finish()
    }
}
