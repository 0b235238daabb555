//! Dynamic property values and their shallow snapshots.
//!
//! Host properties hold `Value`s: primitives by value, strings as shared
//! slices, and containers (`List`, `Map`) behind `Arc<RwLock<…>>` so they
//! have stable identity under in-place mutation. Identity is what shallow
//! dependency comparison observes for containers.
//!
//! `Observed` is what an effect's dependency snapshot stores for one read:
//! primitives and strings by value, containers as `(pointer, len)`. Equality
//! of `Observed` against a current `Value` is the whole of the invalidation
//! comparison.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

/// Shared, identity-stable list container.
pub type ListRef = Arc<RwLock<Vec<Value>>>;

/// Shared, identity-stable map container.
pub type MapRef = Arc<RwLock<IndexMap<String, Value>>>;

/// A dynamically typed host property value.
#[derive(Clone, Debug)]
pub enum Value {
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    List(ListRef),
    Map(MapRef),
}

impl Value {
    /// Create an empty map container.
    pub fn map() -> Self {
        Value::Map(Arc::new(RwLock::new(IndexMap::new())))
    }

    /// Create a map container from entries.
    pub fn map_from(entries: impl IntoIterator<Item = (String, Value)>) -> Self {
        Value::Map(Arc::new(RwLock::new(entries.into_iter().collect())))
    }

    /// Create a list container from values.
    pub fn list_from(items: impl IntoIterator<Item = Value>) -> Self {
        Value::List(Arc::new(RwLock::new(items.into_iter().collect())))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(x) => Some(*x),
            Value::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&MapRef> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&ListRef> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn is_unit(&self) -> bool {
        matches!(self, Value::Unit)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Arc::from(s.as_str()))
    }
}

/// The snapshot of one read value, as stored in a dependency snapshot.
///
/// Containers are observed by identity plus element count; the element
/// count catches in-place growth/shrink that identity alone would miss.
/// Floats compare by bit pattern so NaN reads are stable.
#[derive(Clone, Debug)]
pub enum Observed {
    Unit,
    Bool(bool),
    Int(i64),
    Float(u64),
    Str(Arc<str>),
    List { ptr: usize, len: usize },
    Map { ptr: usize, len: usize },
}

impl Observed {
    /// Snapshot a value as read.
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Unit => Observed::Unit,
            Value::Bool(b) => Observed::Bool(*b),
            Value::Int(n) => Observed::Int(*n),
            Value::Float(x) => Observed::Float(x.to_bits()),
            Value::Str(s) => Observed::Str(s.clone()),
            Value::List(l) => Observed::List {
                ptr: Arc::as_ptr(l) as usize,
                len: l.read().len(),
            },
            Value::Map(m) => Observed::Map {
                ptr: Arc::as_ptr(m) as usize,
                len: m.read().len(),
            },
        }
    }

    /// Compare the snapshot against a current value.
    pub fn matches(&self, current: &Value) -> bool {
        match (self, current) {
            (Observed::Unit, Value::Unit) => true,
            (Observed::Bool(a), Value::Bool(b)) => a == b,
            (Observed::Int(a), Value::Int(b)) => a == b,
            (Observed::Float(a), Value::Float(b)) => *a == b.to_bits(),
            (Observed::Str(a), Value::Str(b)) => a == b,
            (Observed::List { ptr, len }, Value::List(l)) => {
                *ptr == Arc::as_ptr(l) as usize && *len == l.read().len()
            }
            (Observed::Map { ptr, len }, Value::Map(m)) => {
                *ptr == Arc::as_ptr(m) as usize && *len == m.read().len()
            }
            _ => false,
        }
    }
}
