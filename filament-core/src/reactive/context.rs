//! The ambient context pointer and dependency-tracking sessions.
//!
//! A single thread-local slot holds "the currently executing host and
//! lifecycle phase". Every API that needs implicit context (property access,
//! hook/effect registration, dependency lookup) reads this slot and fails
//! with `NoActiveContext` when it is empty.
//!
//! The slot is deliberately not re-entrant: entering a context overwrites
//! whatever was there and leaving restores it to *none*, never to a previous
//! value. Context is therefore only valid for the synchronous extent of one
//! `with_context` call; callbacks that run later must be re-wrapped.
//!
//! A tracking session (the per-run read-set) lives inside the slot so that
//! property reads can record `(owner, key, observed value)` triples while an
//! effect executes.

use std::cell::RefCell;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::error::ReactorError;
use crate::lifecycle::Phase;
use crate::reactive::value::{MapRef, Observed};
use crate::registry::HostId;

/// The object a tracked read was performed on.
#[derive(Clone)]
pub enum Owner {
    /// A top-level host property.
    Host(HostId),
    /// A nested map reached through a deep-mode reactive view. Compared by
    /// Arc identity, matching the wrapper cache.
    Map(MapRef),
}

impl Owner {
    /// Identity comparison: host ids for hosts, Arc pointers for maps.
    pub fn same(&self, other: &Owner) -> bool {
        match (self, other) {
            (Owner::Host(a), Owner::Host(b)) => a == b,
            (Owner::Map(a), Owner::Map(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl std::fmt::Debug for Owner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Owner::Host(id) => f.debug_tuple("Host").field(id).finish(),
            Owner::Map(map) => f
                .debug_tuple("Map")
                .field(&(Arc::as_ptr(map) as usize))
                .finish(),
        }
    }
}

/// One tracked dependency: where it was read, which key, and what was seen.
#[derive(Debug, Clone)]
pub struct DepEntry {
    pub owner: Owner,
    pub key: String,
    pub observed: Observed,
}

/// The read-set captured during one effect run.
pub type ReadSet = SmallVec<[DepEntry; 4]>;

struct ContextSlot {
    host: HostId,
    phase: Option<Phase>,
    session: Option<ReadSet>,
}

thread_local! {
    static CURRENT: RefCell<Option<ContextSlot>> = const { RefCell::new(None) };
}

/// Guard that clears the ambient slot when dropped.
///
/// The slot is cleared to none even on unwind, so a panicking hook cannot
/// leave a stale context behind.
pub struct ContextGuard {
    _private: (),
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        CURRENT.with(|slot| *slot.borrow_mut() = None);
    }
}

pub(crate) fn enter(host: HostId, phase: Option<Phase>) -> ContextGuard {
    CURRENT.with(|slot| {
        *slot.borrow_mut() = Some(ContextSlot {
            host,
            phase,
            session: None,
        });
    });
    ContextGuard { _private: () }
}

/// Run `f` with the ambient context pointer designating `host` (and `phase`,
/// when inside a lifecycle dispatch). The pointer is restored to none
/// afterward; nesting is not supported.
pub fn with_context<R>(host: HostId, phase: Option<Phase>, f: impl FnOnce() -> R) -> R {
    let _guard = enter(host, phase);
    f()
}

/// The host currently designated by the ambient pointer.
pub fn current_host() -> Result<HostId, ReactorError> {
    CURRENT.with(|slot| {
        slot.borrow()
            .as_ref()
            .map(|ctx| ctx.host)
            .ok_or(ReactorError::NoActiveContext)
    })
}

/// The lifecycle phase currently being dispatched, if any.
pub fn current_phase() -> Option<Phase> {
    CURRENT.with(|slot| slot.borrow().as_ref().and_then(|ctx| ctx.phase))
}

/// Begin a tracking session, discarding any stale read-set.
pub(crate) fn begin_tracking() {
    CURRENT.with(|slot| {
        if let Some(ctx) = slot.borrow_mut().as_mut() {
            ctx.session = Some(ReadSet::new());
        }
    });
}

/// End the tracking session and return what was read.
pub(crate) fn take_read_set() -> ReadSet {
    CURRENT.with(|slot| {
        slot.borrow_mut()
            .as_mut()
            .and_then(|ctx| ctx.session.take())
            .unwrap_or_default()
    })
}

/// Whether a tracking session is active.
#[cfg(test)]
pub(crate) fn tracking_active() -> bool {
    CURRENT.with(|slot| {
        slot.borrow()
            .as_ref()
            .is_some_and(|ctx| ctx.session.is_some())
    })
}

/// Record a tracked read into the active session, if any.
///
/// Duplicate (owner, key) pairs are recorded once; the first observation
/// wins, since it reflects the value the effect actually consumed.
pub(crate) fn record_read(owner: Owner, key: &str, observed: Observed) {
    CURRENT.with(|slot| {
        let mut slot = slot.borrow_mut();
        let Some(session) = slot.as_mut().and_then(|ctx| ctx.session.as_mut()) else {
            return;
        };
        let seen = session
            .iter()
            .any(|entry| entry.owner.same(&owner) && entry.key == key);
        if !seen {
            session.push(DepEntry {
                owner,
                key: key.to_string(),
                observed,
            });
        }
    });
}
