//! Reactive context and lifecycle scheduling for framework-hosted
//! instances.
//!
//! A host framework creates instances, runs change detection over them, and
//! eventually tears them down. This crate attaches a reactive layer to each
//! such instance (a *host*): declared property slots with dependency
//! tracking, effects that re-run when their tracked reads go stale, a
//! multicast phase bus for lifecycle hooks, and cleanup buckets that release
//! side effects at well-defined points.
//!
//! The framework drives everything through two calls: [`connect`] to attach
//! a host (running its setup function under the ambient context pointer),
//! and [`schedule`] to push lifecycle phases at it. Inside setup and inside
//! lifecycle callbacks, the ambient APIs ([`prop`], [`set_prop`],
//! [`use_effect`], [`use_hook`], [`on_cleanup`], [`inject`]) resolve the
//! current host implicitly.
//!
//! ```
//! use std::sync::Arc;
//!
//! use filament_core::{
//!     connect, no_teardown, prop, schedule, set_property, use_effect,
//!     ConnectOptions, EffectOptions, Phase, StateTable, StaticInjector,
//! };
//!
//! let host = connect(
//!     StateTable::new().with("count", 0_i64),
//!     Arc::new(StaticInjector::new()),
//!     ConnectOptions::default(),
//!     || {
//!         use_effect(
//!             || {
//!                 let count = prop("count")?;
//!                 println!("count is now {count:?}");
//!                 Ok(no_teardown())
//!             },
//!             EffectOptions::default(),
//!         )?;
//!         Ok(())
//!     },
//! )?;
//!
//! schedule(host, Phase::Init)?;
//! // First change-check pass gives the effect its first run.
//! schedule(host, Phase::ChangeCheck)?;
//! // An external write re-runs it.
//! set_property(host, "count", 7_i64)?;
//! schedule(host, Phase::Destroy)?;
//! # Ok::<(), filament_core::ReactorError>(())
//! ```
//!
//! The engine is single-threaded and cooperative: the registry is
//! thread-local, callbacks run synchronously, and writes that land while a
//! dispatch is in flight are deferred to the end of that dispatch rather
//! than recursing.

pub mod error;
pub mod injector;
pub mod lifecycle;
pub mod reactive;
pub mod registry;

pub use error::{BoxError, ReactorError};
pub use injector::{inject, resolve_in, InjectFlags, Injector, Provided, StaticInjector, Token};
pub use lifecycle::{
    no_teardown, on_cleanup, register_artifact, schedule, teardown, use_hook, Phase, Subscription,
    Teardown, Unsubscribe,
};
pub use reactive::{
    current_host, current_phase, get_property, prop, prop_map, set_prop, set_property, use_effect,
    with_context, EffectOptions, Observed, ReactiveMap, StateTable, Value,
};
pub use registry::{
    connect, is_connected, pending_detections, ConnectOptions, DetectionStrategy, HostId,
};
