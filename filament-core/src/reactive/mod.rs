//! Reactive state: the ambient context pointer, the property proxy, values
//! with shallow observation, and the effect/invalidation engine.

pub(crate) mod context;
pub(crate) mod effect;
pub(crate) mod state;
pub(crate) mod value;

pub use context::{current_host, current_phase, with_context, DepEntry, Owner, ReadSet};
pub use effect::{use_effect, EffectFn, EffectOptions};
pub use state::{get_property, prop, prop_map, set_prop, set_property, ReactiveMap, StateTable};
pub use value::{ListRef, MapRef, Observed, Value};
