//! Error types for the reactive core.
//!
//! The taxonomy follows the boundaries of the engine: context errors (a
//! context-dependent API used outside any active host context), resolution
//! errors (the injector bridge cannot satisfy a token), contract violations
//! (unsupported effect return shapes, undeclared properties), and wrapped
//! failures from user-supplied hook/effect bodies.
//!
//! User callbacks return `Result<_, BoxError>`; the scheduler wraps those at
//! the phase-bus boundary so the caller always sees a `ReactorError`.

use thiserror::Error;

use crate::lifecycle::Phase;
use crate::registry::HostId;

/// Opaque error type produced by user-supplied hooks and effects.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced by the reactive core.
///
/// All variants are fatal to the operation that triggered them, but none of
/// them terminate the phase bus on their own (a failure during `Destroy`
/// forces termination as part of error handling, not via the error value).
#[derive(Debug, Error)]
pub enum ReactorError {
    /// A context-dependent API was called while no host context was active.
    ///
    /// Reactive APIs are only usable synchronously during `connect` setup or
    /// inside a lifecycle callback's synchronous body.
    #[error("no active host context; reactive APIs are only usable during setup or inside a lifecycle hook")]
    NoActiveContext,

    /// The injector bridge could not satisfy the requested token/flag
    /// combination.
    #[error("injector cannot satisfy token `{token}`: {reason}")]
    InjectorUnavailable { token: String, reason: String },

    /// An effect returned a value that is neither a teardown closure, a
    /// subscription handle, nor `()`.
    #[error("effect returned an unsupported value; expected a teardown closure, a subscription, or `()`")]
    InvalidEffectReturn,

    /// A read or write named a property that was never declared on the host.
    #[error("host has no declared property `{key}`")]
    UnknownProperty { key: String },

    /// Deep tracking was requested for a property that does not hold a map.
    #[error("property `{key}` is not an object; deep tracking requires a map value")]
    NotAnObject { key: String },

    /// The host handle does not name a connected host (never connected, or
    /// already destroyed).
    #[error("unknown or destroyed host {0:?}")]
    UnknownHost(HostId),

    /// A lifecycle hook failed while its phase was being dispatched.
    #[error("{phase:?} hook failed: {source}")]
    Hook {
        phase: Phase,
        #[source]
        source: BoxError,
    },

    /// An effect body failed while running.
    #[error("effect failed: {source}")]
    Effect {
        #[source]
        source: BoxError,
    },
}
