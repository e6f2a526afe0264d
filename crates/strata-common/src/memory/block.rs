//! Reference-counted memory blocks.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use super::leak;
use super::pool::BlockPool;
use crate::types::{ColumnElement, ColumnType};
use crate::utils::error::{LifetimeError, Result};

/// Sentinel count marking a released block.
const RELEASED: u32 = u32::MAX;

/// Process-wide allocation id counter.
static NEXT_ALLOCATION_ID: AtomicU64 = AtomicU64::new(1);

/// Numeric element types that tensor blocks can hold.
pub trait TensorElement: ColumnElement + Copy + Default {}

impl TensorElement for f32 {}
impl TensorElement for f64 {}
impl TensorElement for i32 {}
impl TensorElement for i64 {}
impl TensorElement for u8 {}

/// A pooled memory region with an atomic reference count.
///
/// The count and the released state share one atomic word, so an acquire
/// can never slip in between "count reached zero" and "storage freed".
pub struct RefCountedBlock<T: TensorElement> {
    /// Process-unique, monotonic allocation id.
    id: u64,
    /// Element count.
    len: usize,
    /// Live reference count, or `RELEASED`.
    state: AtomicU32,
    /// Backing storage. Emptied on release.
    data: RwLock<Vec<T>>,
    /// Pool that receives the storage back.
    pool: Weak<BlockPool>,
}

impl<T: TensorElement> RefCountedBlock<T> {
    pub(crate) fn new(data: Vec<T>, pool: Weak<BlockPool>) -> Self {
        let id = NEXT_ALLOCATION_ID.fetch_add(1, Ordering::Relaxed);
        let len = data.len();
        leak::register(id, T::COLUMN_TYPE, len);
        Self {
            id,
            len,
            state: AtomicU32::new(0),
            data: RwLock::new(data),
            pool,
        }
    }

    /// Returns the allocation id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the element count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the block holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the element type.
    #[must_use]
    pub fn element_type(&self) -> ColumnType {
        T::COLUMN_TYPE
    }

    /// Returns false once the block has been released.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.state.load(Ordering::Acquire) != RELEASED
    }

    /// Returns the live reference count (0 once released).
    #[must_use]
    pub fn ref_count(&self) -> u32 {
        match self.state.load(Ordering::Acquire) {
            RELEASED => 0,
            n => n,
        }
    }

    /// Increments the reference count and returns the new count.
    ///
    /// # Errors
    ///
    /// Returns [`LifetimeError::Released`] if the block was already
    /// released. Using a released block is a contract violation.
    pub fn acquire(&self) -> Result<u32> {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current == RELEASED {
                tracing::error!(block = self.id, "acquire on released block");
                return Err(LifetimeError::Released { id: self.id }.into());
            }
            match self.state.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(current + 1),
                Err(actual) => current = actual,
            }
        }
    }

    /// Decrements the reference count and returns the new count.
    ///
    /// When the count reaches zero the storage goes back to the pool and
    /// the block becomes permanently invalid.
    pub fn release(&self) -> Result<u32> {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current == RELEASED {
                return Err(LifetimeError::Released { id: self.id }.into());
            }
            if current == 0 {
                return Err(LifetimeError::Underflow { id: self.id }.into());
            }
            let next = if current == 1 { RELEASED } else { current - 1 };
            match self
                .state
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        if current == 1 {
            self.free();
            return Ok(0);
        }
        Ok(current - 1)
    }

    fn free(&self) {
        let storage = std::mem::take(&mut *self.data.write());
        leak::unregister(self.id);
        if let Some(pool) = self.pool.upgrade() {
            pool.recycle(storage);
        }
    }

    /// Runs `f` over the elements.
    pub fn with_slice<R>(&self, f: impl FnOnce(&[T]) -> R) -> Result<R> {
        let guard = self.data.read();
        if !self.is_valid() {
            return Err(LifetimeError::Released { id: self.id }.into());
        }
        Ok(f(&guard))
    }

    /// Runs `f` over the elements mutably.
    pub fn with_slice_mut<R>(&self, f: impl FnOnce(&mut [T]) -> R) -> Result<R> {
        let mut guard = self.data.write();
        if !self.is_valid() {
            return Err(LifetimeError::Released { id: self.id }.into());
        }
        Ok(f(&mut guard))
    }
}

impl<T: TensorElement> std::fmt::Debug for RefCountedBlock<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefCountedBlock")
            .field("id", &self.id)
            .field("type", &T::COLUMN_TYPE)
            .field("len", &self.len)
            .field("ref_count", &self.ref_count())
            .field("valid", &self.is_valid())
            .finish()
    }
}

/// Shared owner of a block: cloning acquires, dropping releases.
pub struct BlockHandle<T: TensorElement> {
    block: Arc<RefCountedBlock<T>>,
}

impl<T: TensorElement> BlockHandle<T> {
    /// Acquires `block` and wraps it.
    pub fn new(block: Arc<RefCountedBlock<T>>) -> Result<Self> {
        block.acquire()?;
        Ok(Self { block })
    }

    /// Returns the underlying block.
    #[must_use]
    pub fn block(&self) -> &Arc<RefCountedBlock<T>> {
        &self.block
    }

    /// Copies the elements out.
    pub fn to_vec(&self) -> Result<Vec<T>> {
        self.block.with_slice(<[T]>::to_vec)
    }
}

impl<T: TensorElement> Clone for BlockHandle<T> {
    fn clone(&self) -> Self {
        // A live handle holds a reference, so the block cannot be released here.
        if let Err(e) = self.block.acquire() {
            tracing::error!(block = self.block.id(), "clone of dead handle: {}", e);
        }
        Self {
            block: Arc::clone(&self.block),
        }
    }
}

impl<T: TensorElement> Drop for BlockHandle<T> {
    fn drop(&mut self) {
        if let Err(e) = self.block.release() {
            tracing::error!(block = self.block.id(), "handle release failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::Error;
    use proptest::prelude::*;

    #[test]
    fn test_acquire_release_cycle() {
        let pool = BlockPool::new();
        let block = pool.allocate::<f32>(8);

        assert_eq!(block.ref_count(), 0);
        assert!(block.is_valid());

        assert_eq!(block.acquire().unwrap(), 1);
        assert_eq!(block.acquire().unwrap(), 2);
        assert_eq!(block.release().unwrap(), 1);
        assert!(block.is_valid());

        assert_eq!(block.release().unwrap(), 0);
        assert!(!block.is_valid());
    }

    #[test]
    fn test_acquire_after_release_rejected() {
        let pool = BlockPool::new();
        let block = pool.allocate::<f64>(4);
        block.acquire().unwrap();
        block.release().unwrap();

        let err = block.acquire().unwrap_err();
        assert!(matches!(
            err,
            Error::Lifetime(LifetimeError::Released { id }) if id == block.id()
        ));
        assert!(block.with_slice(|s| s.len()).is_err());
    }

    #[test]
    fn test_release_without_acquire_underflows() {
        let pool = BlockPool::new();
        let block = pool.allocate::<i32>(2);
        assert!(matches!(
            block.release().unwrap_err(),
            Error::Lifetime(LifetimeError::Underflow { .. })
        ));
        assert!(block.is_valid());
    }

    #[test]
    fn test_ids_are_monotonic() {
        let pool = BlockPool::new();
        let a = pool.allocate::<u8>(1);
        let b = pool.allocate::<u8>(1);
        assert!(b.id() > a.id());
    }

    #[test]
    fn test_handle_clone_and_drop() {
        let pool = BlockPool::new();
        let block = pool.allocate::<f32>(3);

        let handle = BlockHandle::new(Arc::clone(&block)).unwrap();
        let second = handle.clone();
        assert_eq!(block.ref_count(), 2);

        drop(handle);
        assert!(block.is_valid());
        assert_eq!(second.to_vec().unwrap(), vec![0.0; 3]);

        drop(second);
        assert!(!block.is_valid());
    }

    #[test]
    fn test_concurrent_acquire_release() {
        let pool = BlockPool::new();
        let block = pool.allocate::<f32>(16);
        block.acquire().unwrap();

        std::thread::scope(|s| {
            for _ in 0..8 {
                let block = &block;
                s.spawn(move || {
                    for _ in 0..1000 {
                        block.acquire().unwrap();
                        block.release().unwrap();
                    }
                });
            }
        });

        assert_eq!(block.ref_count(), 1);
        assert_eq!(block.release().unwrap(), 0);
        assert!(!block.is_valid());
    }

    proptest! {
        #[test]
        fn prop_block_freed_only_on_last_release(holders in 1u32..64) {
            let pool = BlockPool::new();
            let block = pool.allocate::<i32>(4);
            for _ in 0..holders {
                block.acquire().unwrap();
            }
            for remaining in (0..holders).rev() {
                prop_assert!(block.is_valid());
                prop_assert_eq!(block.release().unwrap(), remaining);
            }
            prop_assert!(!block.is_valid());
            prop_assert!(block.acquire().is_err());
        }
    }
}
