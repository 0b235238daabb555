//! The per-host phase bus.
//!
//! A multicast dispatcher scoped to one host: hooks subscribe to exactly one
//! phase, and a phase emission notifies that phase's bucket synchronously,
//! in registration order. After termination no further emissions happen and
//! late subscriptions are dropped with a warning.
//!
//! The bus itself does not run hooks; the scheduler takes a bucket out,
//! runs the hooks without holding the registry borrow, and restores them.
//! Hooks registered to the in-flight phase during a dispatch land after the
//! restored originals, preserving registration order.

use crate::error::BoxError;

use super::phase::{PerPhase, Phase};

/// A user-registered lifecycle callback bound to one phase.
pub type Hook = Box<dyn FnMut() -> Result<(), BoxError>>;

/// Multicast notification channel for one host's lifecycle phases.
pub struct PhaseBus {
    hooks: PerPhase<Vec<Hook>>,
    terminated: bool,
}

impl PhaseBus {
    /// Create a bus with empty buckets.
    ///
    /// The `Init` bucket is seeded with a no-op so the bus always has a
    /// first tick to synchronize on, even for hosts that register nothing.
    pub fn new() -> Self {
        let mut bus = Self {
            hooks: PerPhase::new(),
            terminated: false,
        };
        bus.hooks.get_mut(Phase::Init).push(Box::new(|| Ok(())));
        bus
    }

    /// Register a hook for one phase. Insertion order is run order.
    pub fn subscribe(&mut self, phase: Phase, hook: Hook) {
        if self.terminated {
            tracing::warn!(?phase, "hook registered after bus termination; dropped");
            return;
        }
        self.hooks.get_mut(phase).push(hook);
    }

    /// Take a phase's hooks for dispatch.
    pub fn take(&mut self, phase: Phase) -> Vec<Hook> {
        std::mem::take(self.hooks.get_mut(phase))
    }

    /// Put a phase's hooks back after dispatch, in front of any hooks that
    /// were registered to the same phase while it was running.
    pub fn restore(&mut self, phase: Phase, mut original: Vec<Hook>) {
        if self.terminated {
            return;
        }
        let added = std::mem::take(self.hooks.get_mut(phase));
        original.extend(added);
        *self.hooks.get_mut(phase) = original;
    }

    /// Terminate the bus: drop every bucket; no further emissions.
    pub fn terminate(&mut self) {
        for (_, bucket) in self.hooks.iter_mut() {
            bucket.clear();
        }
        self.terminated = true;
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Number of hooks registered for a phase.
    pub fn subscriber_count(&self, phase: Phase) -> usize {
        self.hooks.get(phase).len()
    }
}

impl Default for PhaseBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PhaseBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseBus")
            .field("terminated", &self.terminated)
            .finish_non_exhaustive()
    }
}
