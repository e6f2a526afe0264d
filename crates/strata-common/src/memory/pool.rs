//! Block pool keyed by element type and length.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use super::block::{RefCountedBlock, TensorElement};
use crate::types::ColumnType;
use crate::utils::hash::FxHashMap;

/// Default number of spare buffers kept per (type, length) key.
const DEFAULT_MAX_PER_KEY: usize = 16;

static GLOBAL_POOL: OnceLock<Arc<BlockPool>> = OnceLock::new();

/// Pool statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Blocks served with freshly allocated storage.
    pub allocations: u64,
    /// Blocks served with recycled storage.
    pub reuses: u64,
    /// Buffers currently parked in the pool.
    pub pooled: usize,
}

/// Allocator for [`RefCountedBlock`]s.
///
/// Released storage is parked under its `(element type, length)` key and
/// handed out again, zeroed, to the next request of the same shape.
pub struct BlockPool {
    free: Mutex<FxHashMap<(ColumnType, usize), Vec<Box<dyn Any + Send>>>>,
    max_per_key: usize,
    allocations: AtomicU64,
    reuses: AtomicU64,
}

impl BlockPool {
    /// Creates a new pool.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::with_max_per_key(DEFAULT_MAX_PER_KEY)
    }

    /// Creates a pool that parks at most `max_per_key` buffers per shape.
    #[must_use]
    pub fn with_max_per_key(max_per_key: usize) -> Arc<Self> {
        Arc::new(Self {
            free: Mutex::new(FxHashMap::default()),
            max_per_key,
            allocations: AtomicU64::new(0),
            reuses: AtomicU64::new(0),
        })
    }

    /// Returns the process-wide pool.
    pub fn global() -> Arc<Self> {
        Arc::clone(GLOBAL_POOL.get_or_init(Self::new))
    }

    /// Allocates a zeroed block of `len` elements with a reference count of 0.
    pub fn allocate<T: TensorElement>(self: &Arc<Self>, len: usize) -> Arc<RefCountedBlock<T>> {
        let recycled = {
            let mut free = self.free.lock();
            free.get_mut(&(T::COLUMN_TYPE, len))
                .and_then(|list| list.pop())
                .and_then(|boxed| boxed.downcast::<Vec<T>>().ok())
        };

        let data = match recycled {
            Some(mut data) => {
                self.reuses.fetch_add(1, Ordering::Relaxed);
                data.fill(T::default());
                *data
            }
            None => {
                self.allocations.fetch_add(1, Ordering::Relaxed);
                vec![T::default(); len]
            }
        };

        Arc::new(RefCountedBlock::new(data, Arc::downgrade(self)))
    }

    pub(crate) fn recycle<T: TensorElement>(&self, data: Vec<T>) {
        let key = (T::COLUMN_TYPE, data.len());
        let mut free = self.free.lock();
        let list = free.entry(key).or_default();
        if list.len() < self.max_per_key {
            list.push(Box::new(data));
        }
    }

    /// Returns current statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            allocations: self.allocations.load(Ordering::Relaxed),
            reuses: self.reuses.load(Ordering::Relaxed),
            pooled: self.free.lock().values().map(Vec::len).sum(),
        }
    }

    /// Drops every parked buffer.
    pub fn clear(&self) {
        self.free.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reuse_same_shape() {
        let pool = BlockPool::new();

        let block = pool.allocate::<f32>(64);
        block.acquire().unwrap();
        block.with_slice_mut(|s| s.fill(3.0)).unwrap();
        block.release().unwrap();
        assert_eq!(pool.stats().pooled, 1);

        let again = pool.allocate::<f32>(64);
        let stats = pool.stats();
        assert_eq!(stats.allocations, 1);
        assert_eq!(stats.reuses, 1);
        assert_eq!(stats.pooled, 0);

        // Recycled storage comes back zeroed.
        again.acquire().unwrap();
        assert!(again.with_slice(|s| s.iter().all(|&v| v == 0.0)).unwrap());
        again.release().unwrap();
    }

    #[test]
    fn test_different_type_or_len_not_reused() {
        let pool = BlockPool::new();
        let block = pool.allocate::<f32>(8);
        block.acquire().unwrap();
        block.release().unwrap();

        let _other_len = pool.allocate::<f32>(9);
        let _other_type = pool.allocate::<f64>(8);
        assert_eq!(pool.stats().reuses, 0);
        assert_eq!(pool.stats().allocations, 3);
        assert_eq!(pool.stats().pooled, 1);
    }

    #[test]
    fn test_max_per_key() {
        let pool = BlockPool::with_max_per_key(1);
        for _ in 0..3 {
            let block = pool.allocate::<u8>(4);
            let again = pool.allocate::<u8>(4);
            block.acquire().unwrap();
            again.acquire().unwrap();
            block.release().unwrap();
            again.release().unwrap();
        }
        assert_eq!(pool.stats().pooled, 1);

        pool.clear();
        assert_eq!(pool.stats().pooled, 0);
    }

    #[test]
    fn test_global_pool_is_shared() {
        assert!(Arc::ptr_eq(&BlockPool::global(), &BlockPool::global()));
    }
}
