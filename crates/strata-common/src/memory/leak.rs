//! Debug-build registry of outstanding allocations.
//!
//! Release builds compile the registry out; [`outstanding_allocations`]
//! then always returns an empty list.

use crate::types::ColumnType;

#[cfg(debug_assertions)]
mod registry {
    use std::sync::LazyLock;

    use parking_lot::Mutex;

    use crate::types::ColumnType;
    use crate::utils::hash::FxHashMap;

    pub(super) static OUTSTANDING: LazyLock<Mutex<FxHashMap<u64, (ColumnType, usize)>>> =
        LazyLock::new(|| Mutex::new(FxHashMap::default()));
}

#[cfg(debug_assertions)]
pub(crate) fn register(id: u64, ty: ColumnType, len: usize) {
    registry::OUTSTANDING.lock().insert(id, (ty, len));
}

#[cfg(not(debug_assertions))]
pub(crate) fn register(_id: u64, _ty: ColumnType, _len: usize) {}

#[cfg(debug_assertions)]
pub(crate) fn unregister(id: u64) {
    registry::OUTSTANDING.lock().remove(&id);
}

#[cfg(not(debug_assertions))]
pub(crate) fn unregister(_id: u64) {}

/// Returns the ids of blocks that were allocated and not yet released,
/// in ascending order.
#[must_use]
pub fn outstanding_allocations() -> Vec<u64> {
    #[cfg(debug_assertions)]
    {
        let mut ids: Vec<u64> = registry::OUTSTANDING.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }
    #[cfg(not(debug_assertions))]
    {
        Vec::new()
    }
}

/// Logs every outstanding allocation and returns how many there were.
///
/// Meant to be called once at shutdown.
pub fn report_leaks() -> usize {
    #[cfg(debug_assertions)]
    {
        let outstanding = registry::OUTSTANDING.lock();
        for (id, (ty, len)) in outstanding.iter() {
            tracing::warn!(block = id, element = ty.name(), len, "tensor block leaked");
        }
        outstanding.len()
    }
    #[cfg(not(debug_assertions))]
    {
        0
    }
}
