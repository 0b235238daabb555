//! The effect runner and invalidation engine.
//!
//! An effect is a unit of work whose property reads are recorded while it
//! executes. The captured read-set plus the observed values form its
//! dependency snapshot; the invalidation pass compares every snapshot
//! element-wise against current values and re-runs stale effects, tearing
//! the previous run down first.
//!
//! Registrations are pending until the next change-check pass consumes them
//! (the first run happens under `ChangeCheck`, not at registration time).
//! Each live effect owns one invalidation entry; re-runs replace the entry
//! in place so the per-host check order stays the registration order.

use std::any::Any;

use crate::error::{BoxError, ReactorError};
use crate::lifecycle::cleanup::{classify, Teardown};
use crate::lifecycle::Phase;
use crate::reactive::context::{self, Owner, ReadSet};
use crate::reactive::value::Value;
use crate::registry::{with_registry, HostId};

/// An effect body: runs, reads tracked state, and returns a teardown shape
/// (`()`, a `Teardown`, or a `Subscription`) boxed as `Any`.
pub type EffectFn = Box<dyn FnMut() -> Result<Box<dyn Any>, BoxError>>;

/// Options attached to one effect registration.
#[derive(Debug, Clone, Copy)]
pub struct EffectOptions {
    /// Record dependencies while the body runs. Untracked effects run once
    /// and are never auto-invalidated.
    pub track: bool,
}

impl Default for EffectOptions {
    fn default() -> Self {
        Self { track: true }
    }
}

impl EffectOptions {
    pub fn tracked() -> Self {
        Self { track: true }
    }

    pub fn untracked() -> Self {
        Self { track: false }
    }
}

/// A declared effect waiting to be consumed by the effect runner.
pub(crate) struct EffectRegistration {
    pub callback: EffectFn,
    pub options: EffectOptions,
}

/// One live effect: its callback, dependency snapshot, and owned teardown.
pub(crate) struct InvalidationEntry {
    pub callback: EffectFn,
    pub options: EffectOptions,
    pub snapshot: ReadSet,
    pub teardown: Teardown,
}

/// Register an effect on the current host.
///
/// The registration is drained by the next change-check pass, which gives
/// the effect its first run.
pub fn use_effect(
    callback: impl FnMut() -> Result<Box<dyn Any>, BoxError> + 'static,
    options: EffectOptions,
) -> Result<(), ReactorError> {
    let host = context::current_host()?;
    with_registry(|registry| {
        registry.host_mut(host)?.pending_effects.push(EffectRegistration {
            callback: Box::new(callback),
            options,
        });
        Ok(())
    })
}

/// Execute one effect run under an already-entered host context.
///
/// Begins a tracking session (clearing any stale read-set), invokes the
/// body, captures the dependency snapshot, and classifies the returned
/// value into a teardown artifact. Classification failures are eager.
pub(crate) fn run_effect(
    mut callback: EffectFn,
    options: EffectOptions,
) -> Result<InvalidationEntry, ReactorError> {
    if options.track {
        context::begin_tracking();
    }
    let outcome = callback();
    // Always close the session so a failed run cannot leak reads into the
    // next one.
    let snapshot = if options.track {
        context::take_read_set()
    } else {
        ReadSet::new()
    };

    let returned = outcome.map_err(|source| ReactorError::Effect { source })?;
    let teardown = classify(returned)?;

    Ok(InvalidationEntry {
        callback,
        options,
        snapshot,
        teardown,
    })
}

/// Compare a dependency snapshot against current values.
///
/// A host property that disappeared counts as changed (the tracked pair
/// count changed); a missing nested-map key reads as `Unit`, mirroring
/// `ReactiveMap::get`.
fn snapshot_changed(snapshot: &ReadSet) -> Result<bool, ReactorError> {
    for dep in snapshot {
        let current = match &dep.owner {
            Owner::Host(id) => {
                let value = with_registry(|registry| {
                    Ok::<_, ReactorError>(registry.host(*id)?.props.get(&dep.key).cloned())
                })?;
                match value {
                    Some(value) => value,
                    None => return Ok(true),
                }
            }
            Owner::Map(map) => map
                .read()
                .get(&dep.key)
                .cloned()
                .unwrap_or(Value::Unit),
        };
        if !dep.observed.matches(&current) {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Run one invalidation pass for `host`.
///
/// Checks every live entry in registration order, re-running stale ones
/// (previous teardown released first, at most one re-run per entry per
/// pass), then gives pending registrations their first run. Returns whether
/// any tracked difference was found; first runs do not count as changes.
///
/// On a callback failure the pass stops, surviving entries and unconsumed
/// registrations are restored, and the error is routed to the phase bus
/// error channel by the caller.
pub(crate) fn invalidation_pass(host: HostId) -> Result<bool, ReactorError> {
    let (entries, pending) = with_registry(|registry| {
        let record = registry.host_mut(host)?;
        Ok::<_, ReactorError>((
            std::mem::take(&mut record.invalidations),
            std::mem::take(&mut record.pending_effects),
        ))
    })?;

    let mut rebuilt = Vec::with_capacity(entries.len() + pending.len());
    let mut leftover = Vec::new();
    let mut changed = false;
    let mut failure: Option<ReactorError> = None;

    for entry in entries {
        if failure.is_some() {
            rebuilt.push(entry);
            continue;
        }
        let stale = if entry.snapshot.is_empty() {
            false
        } else {
            match snapshot_changed(&entry.snapshot) {
                Ok(stale) => stale,
                Err(err) => {
                    failure = Some(err);
                    rebuilt.push(entry);
                    continue;
                }
            }
        };
        if !stale {
            rebuilt.push(entry);
            continue;
        }

        changed = true;
        let InvalidationEntry {
            callback,
            options,
            teardown,
            ..
        } = entry;
        // The previous run's artifact goes before the new run exists.
        teardown.release();
        match context::with_context(host, Some(Phase::ChangeCheck), || {
            run_effect(callback, options)
        }) {
            Ok(fresh) => rebuilt.push(fresh),
            Err(err) => failure = Some(err),
        }
    }

    for registration in pending {
        if failure.is_some() {
            leftover.push(registration);
            continue;
        }
        let EffectRegistration { callback, options } = registration;
        match context::with_context(host, Some(Phase::ChangeCheck), || {
            run_effect(callback, options)
        }) {
            Ok(entry) => rebuilt.push(entry),
            Err(err) => failure = Some(err),
        }
    }

    with_registry(|registry| {
        if let Ok(record) = registry.host_mut(host) {
            record.invalidations = rebuilt;
            if !leftover.is_empty() {
                // Unconsumed registrations go back in front of anything
                // registered during the pass.
                leftover.extend(std::mem::take(&mut record.pending_effects));
                record.pending_effects = leftover;
            }
        }
    });

    match failure {
        Some(err) => Err(err),
        None => Ok(changed),
    }
}

/// Release every live effect's teardown, in registration order. Used at
/// destroy time.
pub(crate) fn release_all_entries(host: HostId) {
    let entries = with_registry(|registry| match registry.host_mut(host) {
        Ok(record) => std::mem::take(&mut record.invalidations),
        Err(_) => Vec::new(),
    });
    for entry in entries {
        entry.teardown.release();
    }
}
