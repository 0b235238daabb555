//! Lifecycle machinery: phases, the per-host phase bus, cleanup buckets,
//! and the scheduler that drives them.

pub(crate) mod bus;
pub(crate) mod cleanup;
pub(crate) mod phase;
pub(crate) mod scheduler;

pub use bus::{Hook, PhaseBus};
pub use cleanup::{
    classify, no_teardown, release_all, teardown, CleanupBucket, Subscription, Teardown,
    Unsubscribe,
};
pub use phase::{PerPhase, Phase};
pub use scheduler::{on_cleanup, register_artifact, schedule, use_hook};
