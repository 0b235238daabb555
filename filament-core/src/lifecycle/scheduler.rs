//! The lifecycle scheduler.
//!
//! A state machine per host, driven only by the framework's
//! change-detection pipeline calling [`schedule`]. Each external trigger is
//! processed synchronously: the matching phase's cleanup bucket is flushed,
//! its hooks run in registration order (each wrapped in the ambient
//! context), and derived phases (`ViewReady` once, `Rendered` when the
//! dirty flag is set, `InputsChanged` when invalidation found a change) are
//! fired as part of the same trigger.
//!
//! Writes that land while a dispatch is in flight never recurse: they set a
//! pending flag and the owed change-check pass runs after the current
//! dispatch completes.
//!
//! User callbacks always run with the registry borrow released; hooks are
//! taken off the bus, executed, and restored afterward.

use crate::error::{BoxError, ReactorError};
use crate::reactive::{context, effect};
use crate::registry::{with_registry, DetectionStrategy, HostId};

use super::cleanup::{self, Teardown};
use super::phase::Phase;

/// Push a lifecycle phase onto a host's phase bus.
///
/// The external driver for the whole engine: the framework calls this once
/// at creation (`Init`), once per detection pass (`ChangeCheck`), once per
/// render-checked pass (`ViewChecked`, which derives `ViewReady` and
/// `Rendered`), and once at teardown (`Destroy`). Scheduling a derived
/// phase directly is tolerated as a no-op.
pub fn schedule(host: HostId, phase: Phase) -> Result<(), ReactorError> {
    if phase.is_derived() {
        tracing::warn!(host = ?host, ?phase, "derived phase scheduled directly; ignored");
        return Ok(());
    }

    let owns_dispatch = with_registry(|registry| {
        let record = registry.host_mut(host)?;
        if record.dispatching {
            Ok(false)
        } else {
            record.dispatching = true;
            Ok(true)
        }
    })?;

    if !owns_dispatch {
        // Re-entrant change-check requests defer: a Detect host folds them
        // into the pending flag consumed by the owning call's drain loop, a
        // Schedule host lands in the framework-drained queue.
        if phase == Phase::ChangeCheck {
            with_registry(|registry| {
                let strategy = match registry.host_mut(host) {
                    Ok(record) => record.options.strategy,
                    Err(_) => return,
                };
                match strategy {
                    DetectionStrategy::Detect => {
                        if let Ok(record) = registry.host_mut(host) {
                            record.detect_pending = true;
                        }
                    }
                    DetectionStrategy::Schedule => registry.enqueue_detection(host),
                }
            });
            return Ok(());
        }
        return process(host, phase);
    }

    let mut result = process(host, phase);

    // Run change-check passes owed by writes that landed mid-dispatch,
    // until the host stabilizes.
    while result.is_ok() {
        let owed = with_registry(|registry| match registry.host_mut(host) {
            Ok(record)
                if record.detect_pending
                    && !record.bus.is_terminated()
                    && record.options.strategy == DetectionStrategy::Detect =>
            {
                record.detect_pending = false;
                true
            }
            _ => false,
        });
        if !owed {
            break;
        }
        result = process(host, Phase::ChangeCheck);
    }

    with_registry(|registry| {
        if let Ok(record) = registry.host_mut(host) {
            record.dispatching = false;
        }
    });
    result
}

fn process(host: HostId, phase: Phase) -> Result<(), ReactorError> {
    match phase {
        Phase::Init => {
            let fire = with_registry(|registry| {
                let record = registry.host_mut(host)?;
                if record.init_done {
                    Ok(false)
                } else {
                    record.init_done = true;
                    Ok(true)
                }
            })?;
            if fire {
                dispatch(host, Phase::Init)?;
            }
            Ok(())
        }
        Phase::ChangeCheck => change_check(host),
        Phase::ViewReady => fire_view_ready(host),
        Phase::ViewChecked => {
            // The first view-checked trigger also delivers ViewReady.
            fire_view_ready(host)?;
            dispatch(host, Phase::ViewChecked)?;
            let render = with_registry(|registry| {
                let record = registry.host_mut(host)?;
                if record.render_dirty {
                    record.render_dirty = false;
                    Ok(true)
                } else {
                    Ok(false)
                }
            })?;
            if render {
                dispatch(host, Phase::Rendered)?;
            }
            Ok(())
        }
        Phase::Destroy => destroy(host),
        // Guarded in schedule().
        Phase::InputsChanged | Phase::Rendered => Ok(()),
    }
}

/// One change-detection pass: invalidation first, then the derived
/// `InputsChanged` emission, then the `ChangeCheck` hooks themselves.
fn change_check(host: HostId) -> Result<(), ReactorError> {
    let changed = match effect::invalidation_pass(host) {
        Ok(changed) => changed,
        Err(err) => {
            fail(host, Phase::ChangeCheck, &err);
            return Err(err);
        }
    };
    if changed {
        with_registry(|registry| {
            if let Ok(record) = registry.host_mut(host) {
                record.render_dirty = true;
            }
        });
        dispatch(host, Phase::InputsChanged)?;
    }
    dispatch(host, Phase::ChangeCheck)
}

fn fire_view_ready(host: HostId) -> Result<(), ReactorError> {
    let fire = with_registry(|registry| {
        let record = registry.host_mut(host)?;
        if record.view_ready_done {
            Ok(false)
        } else {
            record.view_ready_done = true;
            Ok(true)
        }
    })?;
    if fire {
        dispatch(host, Phase::ViewReady)?;
    }
    Ok(())
}

/// Emit one phase: flush its cleanup bucket, then run its hooks in
/// registration order under the ambient context.
///
/// A hook failure stops the phase, routes through the error channel, and
/// surfaces to the caller; remaining hooks do not run.
fn dispatch(host: HostId, phase: Phase) -> Result<(), ReactorError> {
    let taken = with_registry(|registry| {
        let record = registry.host_mut(host)?;
        if record.bus.is_terminated() {
            return Ok(None);
        }
        Ok(Some((
            record.cleanups.get_mut(phase).take(),
            record.bus.take(phase),
        )))
    })?;
    let Some((artifacts, mut hooks)) = taken else {
        return Ok(());
    };

    tracing::debug!(host = ?host, ?phase, hooks = hooks.len(), "dispatching phase");

    // The previous run's side effects go away before new ones are created.
    cleanup::release_all(artifacts);

    let mut failure = None;
    for hook in hooks.iter_mut() {
        let outcome = context::with_context(host, Some(phase), || hook());
        if let Err(source) = outcome {
            failure = Some(ReactorError::Hook { phase, source });
            break;
        }
    }

    with_registry(|registry| {
        if let Ok(record) = registry.host_mut(host) {
            if !record.bus.is_terminated() {
                record.bus.restore(phase, hooks);
            }
        }
    });

    if let Some(err) = failure {
        fail(host, phase, &err);
        return Err(err);
    }
    Ok(())
}

/// Terminal transition: Destroy hooks fire once, then every phase's
/// cleanup bucket and every live effect's teardown is released, the bus
/// terminates, and the record is removed.
fn destroy(host: HostId) -> Result<(), ReactorError> {
    dispatch(host, Phase::Destroy)?;

    let artifacts = with_registry(|registry| {
        let record = registry.host_mut(host)?;
        let mut all = Vec::new();
        for (_, bucket) in record.cleanups.iter_mut() {
            all.extend(bucket.take());
        }
        record.bus.terminate();
        Ok(all)
    })?;
    cleanup::release_all(artifacts);
    effect::release_all_entries(host);
    with_registry(|registry| registry.remove(host));

    tracing::debug!(host = ?host, "host destroyed");
    Ok(())
}

/// The phase bus error channel.
///
/// Logs the failure with enough context to identify the offending path and
/// flushes every cleanup bucket so partially created resources cannot leak.
/// The bus survives unless the failure occurred during `Destroy`, in which
/// case it terminates and the record is disposed.
pub(crate) fn fail(host: HostId, phase: Phase, err: &ReactorError) {
    tracing::error!(
        host = ?host,
        ?phase,
        error = %err,
        "lifecycle callback failed; flushing cleanup buckets"
    );
    let artifacts = with_registry(|registry| match registry.host_mut(host) {
        Ok(record) => {
            let mut all = Vec::new();
            for (_, bucket) in record.cleanups.iter_mut() {
                all.extend(bucket.take());
            }
            if phase == Phase::Destroy {
                record.bus.terminate();
            }
            all
        }
        Err(_) => Vec::new(),
    });
    cleanup::release_all(artifacts);

    if phase == Phase::Destroy {
        effect::release_all_entries(host);
        with_registry(|registry| registry.remove(host));
    }
}

/// Register a lifecycle hook on the current host.
///
/// The hook fires every time its phase is emitted, in registration order.
pub fn use_hook(
    phase: Phase,
    hook: impl FnMut() -> Result<(), BoxError> + 'static,
) -> Result<(), ReactorError> {
    let host = context::current_host()?;
    with_registry(|registry| {
        registry.host_mut(host)?.bus.subscribe(phase, Box::new(hook));
        Ok(())
    })
}

/// Register a teardown artifact against the phase currently running.
///
/// During `connect` setup (no phase) the artifact goes to the `Destroy`
/// bucket: setup never re-runs, so teardown is its only flush point.
pub fn register_artifact(artifact: Teardown) -> Result<(), ReactorError> {
    let host = context::current_host()?;
    let phase = context::current_phase().unwrap_or(Phase::Destroy);
    with_registry(|registry| {
        registry.host_mut(host)?.cleanups.get_mut(phase).push(artifact);
        Ok(())
    })
}

/// Register a cleanup closure against the phase currently running.
pub fn on_cleanup(f: impl FnOnce() + 'static) -> Result<(), ReactorError> {
    register_artifact(Teardown::from_fn(f))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn use_hook_requires_context() {
        let err = use_hook(Phase::Init, || Ok(())).unwrap_err();
        assert!(matches!(err, ReactorError::NoActiveContext));
    }

    #[test]
    fn on_cleanup_requires_context() {
        let err = on_cleanup(|| {}).unwrap_err();
        assert!(matches!(err, ReactorError::NoActiveContext));
    }

    #[test]
    fn scheduling_unknown_host_fails() {
        let ghost = HostId::next();
        let err = schedule(ghost, Phase::Init).unwrap_err();
        assert!(matches!(err, ReactorError::UnknownHost(_)));
    }

    #[test]
    fn derived_phases_are_ignored() {
        let ghost = HostId::next();
        // No record exists, but derived phases never reach the registry.
        assert!(schedule(ghost, Phase::Rendered).is_ok());
        assert!(schedule(ghost, Phase::InputsChanged).is_ok());
    }
}
