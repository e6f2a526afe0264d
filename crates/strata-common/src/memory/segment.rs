//! Typed views over reference-counted blocks.

use std::io::{Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::block::{BlockHandle, RefCountedBlock, TensorElement};
use super::pool::BlockPool;
use crate::io::{BinaryReadExt, BinaryWriteExt};
use crate::utils::error::{CapacityError, Error, Result};

/// Indexed access to one [`RefCountedBlock`].
///
/// A segment holds exactly one reference. [`dispose`](Self::dispose)
/// releases it at most once, even when called concurrently; dropping the
/// segment disposes it.
pub struct TensorSegment<T: TensorElement> {
    block: Arc<RefCountedBlock<T>>,
    disposed: AtomicBool,
}

impl<T: TensorElement> TensorSegment<T> {
    /// Allocates a zeroed segment of `len` elements from `pool`.
    pub fn allocate(pool: &Arc<BlockPool>, len: usize) -> Result<Self> {
        Self::from_block(pool.allocate(len))
    }

    /// Wraps `block`, acquiring one reference.
    pub fn from_block(block: Arc<RefCountedBlock<T>>) -> Result<Self> {
        block.acquire()?;
        Ok(Self {
            block,
            disposed: AtomicBool::new(false),
        })
    }

    /// Returns the element count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.block.len()
    }

    /// Returns true if the segment holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.block.is_empty()
    }

    /// Returns the underlying block.
    #[must_use]
    pub fn block(&self) -> &Arc<RefCountedBlock<T>> {
        &self.block
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.len() {
            return Err(CapacityError::SlotOutOfRange {
                slot: index,
                width: self.len(),
            }
            .into());
        }
        Ok(())
    }

    /// Reads one element.
    pub fn get(&self, index: usize) -> Result<T> {
        self.check_index(index)?;
        self.block.with_slice(|s| s[index])
    }

    /// Writes one element.
    pub fn set(&self, index: usize, value: T) -> Result<()> {
        self.check_index(index)?;
        self.block.with_slice_mut(|s| s[index] = value)
    }

    /// Sets every element to `value`.
    pub fn initialize(&self, value: T) -> Result<()> {
        self.block.with_slice_mut(|s| s.fill(value))
    }

    /// Copies `values` into the segment starting at `offset`.
    pub fn copy_from(&self, offset: usize, values: &[T]) -> Result<()> {
        let end = offset + values.len();
        if end > self.len() {
            return Err(CapacityError::SlotOutOfRange {
                slot: end.saturating_sub(1),
                width: self.len(),
            }
            .into());
        }
        self.block
            .with_slice_mut(|s| s[offset..end].copy_from_slice(values))
    }

    /// Runs `f` over the elements.
    pub fn with_slice<R>(&self, f: impl FnOnce(&[T]) -> R) -> Result<R> {
        self.block.with_slice(f)
    }

    /// Runs `f` over the elements mutably.
    pub fn with_slice_mut<R>(&self, f: impl FnOnce(&mut [T]) -> R) -> Result<R> {
        self.block.with_slice_mut(f)
    }

    /// Copies the elements out.
    pub fn to_vec(&self) -> Result<Vec<T>> {
        self.block.with_slice(<[T]>::to_vec)
    }

    /// Returns an extra shared owner that outlives this segment.
    pub fn handle(&self) -> Result<BlockHandle<T>> {
        BlockHandle::new(Arc::clone(&self.block))
    }

    /// Writes the segment as `[type tag][u64 len][values]`.
    pub fn save<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_u8_val(T::COLUMN_TYPE.tag())?;
        w.write_u64_le(self.len() as u64)?;
        let values = self.to_vec()?;
        for v in &values {
            v.write_item(w)?;
        }
        Ok(())
    }

    /// Reads a segment written by [`save`](Self::save) into pooled memory.
    pub fn load<R: Read>(pool: &Arc<BlockPool>, r: &mut R) -> Result<Self> {
        let tag = r.read_u8_val()?;
        if tag != T::COLUMN_TYPE.tag() {
            return Err(Error::corruption(format!(
                "segment type tag {tag} does not match {}",
                T::COLUMN_TYPE.name()
            )));
        }
        let len = usize::try_from(r.read_u64_le()?)
            .map_err(|_| Error::corruption("segment length overflows usize"))?;

        let segment = Self::allocate(pool, len)?;
        let mut values = Vec::with_capacity(len);
        for _ in 0..len {
            values.push(T::read_item(r)?);
        }
        segment.copy_from(0, &values)?;
        Ok(segment)
    }

    /// Releases this segment's reference. Later calls are no-ops.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(e) = self.block.release() {
            tracing::error!(block = self.block.id(), "segment release failed: {}", e);
        }
    }

    /// Returns true once [`dispose`](Self::dispose) ran.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl<T: TensorElement> Drop for TensorSegment<T> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<T: TensorElement> std::fmt::Debug for TensorSegment<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TensorSegment")
            .field("block", &self.block)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
