//! The host context registry.
//!
//! An arena of host records addressed by a stable `HostId` handle. The
//! framework owns the handle's lifetime: records are created by `connect`
//! and released only when the framework schedules `Destroy` — the registry
//! never frees a record on its own. All metadata the core attaches to a host
//! (state table, phase bus, cleanup buckets, invalidation entries) lives in
//! its record and becomes unreachable with it.
//!
//! The registry is thread-local. The scheduling model is single-threaded
//! cooperative, so there is no cross-thread sharing and no locking; the only
//! rule is that user callbacks always run with the registry borrow released.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{BoxError, ReactorError};
use crate::injector::Injector;
use crate::lifecycle::{CleanupBucket, PerPhase, PhaseBus};
use crate::reactive::effect::{EffectRegistration, InvalidationEntry};
use crate::reactive::state::{ReactiveMap, StateTable};

/// Stable handle addressing one connected host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostId(u64);

impl HostId {
    /// Generate a fresh handle. Uses an atomic counter so handles are unique
    /// across threads even though each registry is thread-local.
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// How the core requests change detection after a tracked write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetectionStrategy {
    /// Run a change-check pass synchronously. Writes that land while a
    /// dispatch is in flight are deferred to the end of that dispatch.
    #[default]
    Detect,
    /// Enqueue the host; the framework drains the queue via
    /// [`pending_detections`] and schedules the pass itself.
    Schedule,
}

/// Per-host connection options.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectOptions {
    pub strategy: DetectionStrategy,
}

/// Everything the core attaches to one host instance.
pub(crate) struct HostRecord {
    pub injector: Arc<dyn Injector>,
    pub options: ConnectOptions,
    pub props: StateTable,
    pub bus: PhaseBus,
    pub cleanups: PerPhase<CleanupBucket>,
    pub pending_effects: Vec<EffectRegistration>,
    pub invalidations: Vec<InvalidationEntry>,
    /// Deep-mode wrapper cache, keyed by target map pointer.
    pub wrappers: IndexMap<usize, ReactiveMap>,
    pub init_done: bool,
    pub view_ready_done: bool,
    /// One-shot flag feeding `Rendered`; set by a detected change, reset
    /// when `Rendered` fires.
    pub render_dirty: bool,
    /// Set while a schedule() call is processing this host.
    pub dispatching: bool,
    /// A write landed mid-dispatch; a follow-up change-check is owed.
    pub detect_pending: bool,
}

#[derive(Default)]
pub(crate) struct Registry {
    hosts: IndexMap<HostId, HostRecord>,
    /// Hosts with a deferred (`Schedule`-strategy) detection pass pending.
    scheduled: Vec<HostId>,
}

impl Registry {
    pub fn host(&self, id: HostId) -> Result<&HostRecord, ReactorError> {
        self.hosts.get(&id).ok_or(ReactorError::UnknownHost(id))
    }

    pub fn host_mut(&mut self, id: HostId) -> Result<&mut HostRecord, ReactorError> {
        self.hosts.get_mut(&id).ok_or(ReactorError::UnknownHost(id))
    }

    pub fn remove(&mut self, id: HostId) {
        self.hosts.shift_remove(&id);
        self.scheduled.retain(|host| *host != id);
    }

    pub fn enqueue_detection(&mut self, id: HostId) {
        if !self.scheduled.contains(&id) {
            self.scheduled.push(id);
        }
    }
}

thread_local! {
    static REGISTRY: RefCell<Registry> = RefCell::new(Registry::default());
}

pub(crate) fn with_registry<R>(f: impl FnOnce(&mut Registry) -> R) -> R {
    REGISTRY.with(|registry| f(&mut registry.borrow_mut()))
}

/// Connect a host: create its record, seed the phase bus and buckets, and
/// run `setup` with the ambient context pointer designating the new host.
///
/// `setup` is where hooks and effects are registered; it runs synchronously
/// and the context is cleared when it returns. A failing setup surfaces as a
/// `Hook` error for the `Init` phase; the record stays connected so the
/// framework can tear it down through its normal destroy path.
pub fn connect(
    props: StateTable,
    injector: Arc<dyn Injector>,
    options: ConnectOptions,
    setup: impl FnOnce() -> Result<(), BoxError>,
) -> Result<HostId, ReactorError> {
    let id = HostId::next();
    let record = HostRecord {
        injector,
        options,
        props,
        bus: PhaseBus::new(),
        cleanups: PerPhase::new(),
        pending_effects: Vec::new(),
        invalidations: Vec::new(),
        wrappers: IndexMap::new(),
        init_done: false,
        view_ready_done: false,
        render_dirty: false,
        dispatching: false,
        detect_pending: false,
    };
    with_registry(|registry| {
        registry.hosts.insert(id, record);
    });
    tracing::debug!(host = ?id, "host connected");

    crate::reactive::context::with_context(id, None, setup).map_err(|source| {
        ReactorError::Hook {
            phase: crate::lifecycle::Phase::Init,
            source,
        }
    })?;

    Ok(id)
}

/// Whether a host is currently connected.
pub fn is_connected(id: HostId) -> bool {
    with_registry(|registry| registry.hosts.contains_key(&id))
}

/// Drain the deferred-detection queue.
///
/// Hosts land here when a write occurs under the `Schedule` strategy; the
/// framework is expected to call `schedule(host, Phase::ChangeCheck)` for
/// each entry at its next convenient point.
pub fn pending_detections() -> Vec<HostId> {
    with_registry(|registry| std::mem::take(&mut registry.scheduled))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::injector::StaticInjector;

    #[test]
    fn connect_registers_host() {
        let id = connect(
            StateTable::new(),
            Arc::new(StaticInjector::new()),
            ConnectOptions::default(),
            || Ok(()),
        )
        .unwrap();

        assert!(is_connected(id));
    }

    #[test]
    fn setup_runs_under_host_context() {
        let id = connect(
            StateTable::new(),
            Arc::new(StaticInjector::new()),
            ConnectOptions::default(),
            || {
                let current = crate::reactive::context::current_host()?;
                assert!(is_connected(current));
                Ok(())
            },
        )
        .unwrap();

        // Context is cleared once setup returns.
        assert!(crate::reactive::context::current_host().is_err());
        assert!(is_connected(id));
    }

    #[test]
    fn setup_failure_surfaces_as_hook_error() {
        let result = connect(
            StateTable::new(),
            Arc::new(StaticInjector::new()),
            ConnectOptions::default(),
            || Err("setup exploded".into()),
        );

        assert!(matches!(result, Err(ReactorError::Hook { .. })));
    }

    #[test]
    fn detection_queue_dedupes() {
        let id = HostId::next();
        with_registry(|registry| {
            registry.enqueue_detection(id);
            registry.enqueue_detection(id);
        });

        let drained = pending_detections();
        assert_eq!(drained.iter().filter(|host| **host == id).count(), 1);
        assert!(pending_detections().is_empty());
    }
}
