//! The dependency lookup bridge.
//!
//! The core does not resolve dependencies itself; it forwards to the host
//! framework's injector through the `Injector` trait, adjusting the walk for
//! the usual resolution modifiers (optional / self-only / skip-self). The
//! ambient `inject` entry point reads the current host's scope.
//!
//! `StaticInjector` is a map-backed implementation for tests and demos.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use bitflags::bitflags;

use crate::error::ReactorError;
use crate::reactive::context;
use crate::registry::with_registry;

/// A provider token: a stable name for something the injector can resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token {
    name: &'static str,
}

impl Token {
    pub const fn new(name: &'static str) -> Self {
        Self { name }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

bitflags! {
    /// Resolution modifiers, mirroring the host framework's semantics.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct InjectFlags: u8 {
        /// Not-found resolves to `Ok(None)` instead of an error.
        const OPTIONAL = 1 << 0;
        /// Look only in the starting scope; do not walk parents.
        const SELF_ONLY = 1 << 1;
        /// Start the walk at the parent scope.
        const SKIP_SELF = 1 << 2;
    }
}

/// A resolved provider value.
pub type Provided = Arc<dyn Any + Send + Sync>;

/// The framework-owned injection scope.
pub trait Injector {
    /// Resolve a token in this scope only (no parent walk).
    fn resolve(&self, token: &Token) -> Option<Provided>;

    /// The enclosing scope, if one is reachable from here.
    fn parent(&self) -> Option<Arc<dyn Injector>> {
        None
    }
}

/// Resolve `token` against the current host's injection scope.
///
/// Fails with `NoActiveContext` outside a host context, and with
/// `InjectorUnavailable` when the modifier combination cannot be satisfied
/// (no parent scope for `SKIP_SELF`, or no provider without `OPTIONAL`).
pub fn inject(token: &Token, flags: InjectFlags) -> Result<Option<Provided>, ReactorError> {
    let host = context::current_host()?;
    let scope = with_registry(|registry| {
        Ok::<_, ReactorError>(registry.host(host)?.injector.clone())
    })?;
    resolve_in(scope, token, flags)
}

/// Flag-aware resolution walk, usable with any starting scope.
pub fn resolve_in(
    start: Arc<dyn Injector>,
    token: &Token,
    flags: InjectFlags,
) -> Result<Option<Provided>, ReactorError> {
    let start = if flags.contains(InjectFlags::SKIP_SELF) {
        start.parent().ok_or_else(|| ReactorError::InjectorUnavailable {
            token: token.name().to_string(),
            reason: "skip-self requested but the scope has no parent".to_string(),
        })?
    } else {
        start
    };

    let found = if flags.contains(InjectFlags::SELF_ONLY) {
        start.resolve(token)
    } else {
        let mut scope = Some(start);
        let mut found = None;
        while let Some(current) = scope {
            if let Some(value) = current.resolve(token) {
                found = Some(value);
                break;
            }
            scope = current.parent();
        }
        found
    };

    match found {
        Some(value) => Ok(Some(value)),
        None if flags.contains(InjectFlags::OPTIONAL) => Ok(None),
        None => Err(ReactorError::InjectorUnavailable {
            token: token.name().to_string(),
            reason: "no provider in scope".to_string(),
        }),
    }
}

/// Map-backed injector with an optional parent scope.
#[derive(Default)]
pub struct StaticInjector {
    providers: HashMap<Token, Provided>,
    parent: Option<Arc<dyn Injector>>,
}

impl StaticInjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn provide(mut self, token: Token, value: Provided) -> Self {
        self.providers.insert(token, value);
        self
    }

    pub fn with_parent(mut self, parent: Arc<dyn Injector>) -> Self {
        self.parent = Some(parent);
        self
    }
}

impl Injector for StaticInjector {
    fn resolve(&self, token: &Token) -> Option<Provided> {
        self.providers.get(token).cloned()
    }

    fn parent(&self) -> Option<Arc<dyn Injector>> {
        self.parent.clone()
    }
}
