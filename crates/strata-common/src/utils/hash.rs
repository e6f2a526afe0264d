//! Hash map aliases used across Strata.
//!
//! All maps use `ahash` over `hashbrown`; keys here are never attacker
//! controlled in a way that matters for a single-process buffer engine.

/// Hash map with the crate-wide fast hasher.
pub type FxHashMap<K, V> = hashbrown::HashMap<K, V, ahash::RandomState>;

/// Hash set with the crate-wide fast hasher.
pub type FxHashSet<K> = hashbrown::HashSet<K, ahash::RandomState>;
