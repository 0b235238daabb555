//! Lifecycle phases.
//!
//! A `Phase` is one discrete stage of the per-host lifecycle state machine.
//! The enumeration is fixed and ordered; `InputsChanged` and `Rendered` are
//! derived phases (the scheduler fires them, the framework never schedules
//! them directly) and `Destroy` is terminal.

/// One stage of the host lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Fires exactly once, when the framework first schedules the host.
    Init,
    /// Fires once per change-detection pass, after the invalidation pass.
    ChangeCheck,
    /// Derived: fires only on passes where invalidation found a difference.
    InputsChanged,
    /// Fires exactly once, on the first view-checked trigger.
    ViewReady,
    /// Fires on every view-checked trigger.
    ViewChecked,
    /// Derived: fires per view-checked trigger iff a change occurred since
    /// the previous `Rendered` (one-shot dirty flag).
    Rendered,
    /// Terminal: flushes every cleanup bucket and terminates the phase bus.
    Destroy,
}

impl Phase {
    /// Number of phases.
    pub const COUNT: usize = 7;

    /// All phases in lifecycle order.
    pub const ALL: [Phase; Phase::COUNT] = [
        Phase::Init,
        Phase::ChangeCheck,
        Phase::InputsChanged,
        Phase::ViewReady,
        Phase::ViewChecked,
        Phase::Rendered,
        Phase::Destroy,
    ];

    /// Stable index into per-phase storage.
    pub fn index(self) -> usize {
        match self {
            Phase::Init => 0,
            Phase::ChangeCheck => 1,
            Phase::InputsChanged => 2,
            Phase::ViewReady => 3,
            Phase::ViewChecked => 4,
            Phase::Rendered => 5,
            Phase::Destroy => 6,
        }
    }

    /// Whether the phase is derived by the scheduler rather than driven by
    /// an external trigger.
    pub fn is_derived(self) -> bool {
        matches!(self, Phase::InputsChanged | Phase::Rendered)
    }
}

/// Fixed-size map from `Phase` to `T`.
///
/// Backed by a plain array so per-phase lookups are index operations and
/// iteration order is the lifecycle order.
#[derive(Debug)]
pub struct PerPhase<T> {
    slots: [T; Phase::COUNT],
}

impl<T: Default> PerPhase<T> {
    /// Create a map with one default slot per phase.
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| T::default()),
        }
    }
}

impl<T: Default> Default for PerPhase<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PerPhase<T> {
    pub fn get(&self, phase: Phase) -> &T {
        &self.slots[phase.index()]
    }

    pub fn get_mut(&mut self, phase: Phase) -> &mut T {
        &mut self.slots[phase.index()]
    }

    /// Iterate over all slots in lifecycle order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Phase, &mut T)> {
        Phase::ALL.into_iter().zip(self.slots.iter_mut())
    }
}
