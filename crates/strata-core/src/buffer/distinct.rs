//! Best-effort distinct value tracking.

use std::hash::Hash;

use indexmap::IndexSet;

/// Tracking state. Once abandoned, tracking never resumes.
#[derive(Debug, Clone)]
pub enum DistinctState<K: Eq + Hash> {
    /// Distinct keys in first-seen order.
    Tracking(IndexSet<K, ahash::RandomState>),
    /// More than `cap` distinct keys were offered.
    Abandoned,
}

/// Tracks up to `cap` distinct keys, then gives up.
///
/// Ordinals are first-seen positions, which is also the order a dictionary
/// encoder assigns table slots in.
#[derive(Debug, Clone)]
pub struct DistinctTracker<K: Eq + Hash> {
    cap: usize,
    state: DistinctState<K>,
}

impl<K: Eq + Hash> DistinctTracker<K> {
    /// Creates a tracker that abandons after `cap` distinct keys.
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            state: DistinctState::Tracking(IndexSet::with_hasher(ahash::RandomState::new())),
        }
    }

    /// Offers one key. Returns its ordinal while tracking.
    pub fn offer(&mut self, key: K) -> Option<usize> {
        let DistinctState::Tracking(seen) = &mut self.state else {
            return None;
        };

        if let Some(ordinal) = seen.get_index_of(&key) {
            return Some(ordinal);
        }
        if seen.len() >= self.cap {
            tracing::warn!(cap = self.cap, "distinct tracking abandoned");
            self.state = DistinctState::Abandoned;
            return None;
        }
        Some(seen.insert_full(key).0)
    }

    /// Returns the exact distinct count, or `None` once abandoned.
    #[must_use]
    pub fn count(&self) -> Option<usize> {
        match &self.state {
            DistinctState::Tracking(seen) => Some(seen.len()),
            DistinctState::Abandoned => None,
        }
    }

    /// Returns the first-seen ordinal of `key`.
    pub fn ordinal_of(&self, key: &K) -> Option<usize> {
        match &self.state {
            DistinctState::Tracking(seen) => seen.get_index_of(key),
            DistinctState::Abandoned => None,
        }
    }

    /// Returns true once tracking has been abandoned.
    #[must_use]
    pub fn is_abandoned(&self) -> bool {
        matches!(self.state, DistinctState::Abandoned)
    }

    /// Returns the configured cap.
    #[must_use]
    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Returns the current state.
    pub fn state(&self) -> &DistinctState<K> {
        &self.state
    }
}
