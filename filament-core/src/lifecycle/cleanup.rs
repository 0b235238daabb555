//! Teardown artifacts and the cleanup coordinator.
//!
//! Every hook or effect may produce a teardown artifact: a nullary closure,
//! a subscription-like resource handle, or nothing. Artifacts are collected
//! into per-phase buckets and released exactly once, either because their
//! phase is about to re-run or because the host is being destroyed.
//!
//! Effect return values arrive as `Box<dyn Any>` and are classified into the
//! `Teardown` union by an explicit downcast step. Anything outside the three
//! supported shapes is rejected eagerly with `InvalidEffectReturn`.

use std::any::Any;

use crate::error::ReactorError;

/// A resource handle that can be released.
pub trait Unsubscribe {
    fn unsubscribe(&mut self);
}

/// Owned subscription-like resource.
pub struct Subscription(Box<dyn Unsubscribe>);

impl Subscription {
    pub fn new(inner: impl Unsubscribe + 'static) -> Self {
        Self(Box::new(inner))
    }

    /// Release the underlying resource.
    pub fn unsubscribe(mut self) {
        self.0.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

/// A teardown artifact produced by a hook or effect.
pub enum Teardown {
    /// Nothing to release.
    None,
    /// A nullary cleanup closure, invoked once on release.
    Fn(Box<dyn FnOnce()>),
    /// A resource handle released via its `unsubscribe` method.
    Subscription(Subscription),
}

impl Teardown {
    /// Wrap a cleanup closure.
    pub fn from_fn(f: impl FnOnce() + 'static) -> Self {
        Teardown::Fn(Box::new(f))
    }

    /// Release the artifact. Consumes `self`, so release is once-only by
    /// construction.
    pub fn release(self) {
        match self {
            Teardown::None => {}
            Teardown::Fn(f) => f(),
            Teardown::Subscription(sub) => sub.unsubscribe(),
        }
    }
}

impl std::fmt::Debug for Teardown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Teardown::None => f.write_str("Teardown::None"),
            Teardown::Fn(_) => f.write_str("Teardown::Fn"),
            Teardown::Subscription(_) => f.write_str("Teardown::Subscription"),
        }
    }
}

/// Classify an effect's return value into a `Teardown`.
///
/// Accepted shapes: `()`, `Teardown`, `Subscription`. Any other payload is a
/// contract violation, rejected at the point the effect ran.
pub fn classify(value: Box<dyn Any>) -> Result<Teardown, ReactorError> {
    let value = match value.downcast::<()>() {
        Ok(_) => return Ok(Teardown::None),
        Err(other) => other,
    };
    let value = match value.downcast::<Teardown>() {
        Ok(teardown) => return Ok(*teardown),
        Err(other) => other,
    };
    match value.downcast::<Subscription>() {
        Ok(sub) => Ok(Teardown::Subscription(*sub)),
        Err(_) => Err(ReactorError::InvalidEffectReturn),
    }
}

/// Convenience constructor for effect bodies: `Ok(teardown(|| ...))`.
pub fn teardown(f: impl FnOnce() + 'static) -> Box<dyn Any> {
    Box::new(Teardown::from_fn(f))
}

/// Convenience constructor for effect bodies with nothing to release.
pub fn no_teardown() -> Box<dyn Any> {
    Box::new(())
}

/// Insertion-ordered set of teardown artifacts owned by one phase.
#[derive(Debug, Default)]
pub struct CleanupBucket {
    artifacts: Vec<Teardown>,
}

impl CleanupBucket {
    pub fn push(&mut self, artifact: Teardown) {
        self.artifacts.push(artifact);
    }

    /// Remove all artifacts from the bucket.
    ///
    /// The bucket is emptied before any release runs, so artifacts pushed by
    /// release code never alias the drained set. Taking an empty bucket is a
    /// no-op.
    pub fn take(&mut self) -> Vec<Teardown> {
        std::mem::take(&mut self.artifacts)
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

/// Release a drained set of artifacts in insertion order.
pub fn release_all(artifacts: Vec<Teardown>) {
    for artifact in artifacts {
        artifact.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingSub(Arc<AtomicUsize>);

    impl Unsubscribe for CountingSub {
        fn unsubscribe(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn classify_unit_is_none() {
        let teardown = classify(Box::new(())).unwrap();
        assert!(matches!(teardown, Teardown::None));
    }

    #[test]
    fn classify_teardown_fn() {
        let released = Arc::new(AtomicUsize::new(0));
        let released_clone = released.clone();

        let artifact = classify(teardown(move || {
            released_clone.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();

        assert_eq!(released.load(Ordering::SeqCst), 0);
        artifact.release();
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn classify_subscription() {
        let released = Arc::new(AtomicUsize::new(0));
        let sub = Subscription::new(CountingSub(released.clone()));

        let artifact = classify(Box::new(sub)).unwrap();
        artifact.release();
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn classify_rejects_arbitrary_values() {
        let err = classify(Box::new(42_i32)).unwrap_err();
        assert!(matches!(err, ReactorError::InvalidEffectReturn));
    }

    #[test]
    fn bucket_take_clears_before_release() {
        let released = Arc::new(AtomicUsize::new(0));
        let mut bucket = CleanupBucket::default();

        for _ in 0..3 {
            let released = released.clone();
            bucket.push(Teardown::from_fn(move || {
                released.fetch_add(1, Ordering::SeqCst);
            }));
        }

        let drained = bucket.take();
        assert!(bucket.is_empty());
        release_all(drained);
        assert_eq!(released.load(Ordering::SeqCst), 3);

        // Flushing again is a no-op.
        release_all(bucket.take());
        assert_eq!(released.load(Ordering::SeqCst), 3);
    }
}
