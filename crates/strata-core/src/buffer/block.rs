//! Read-only block buffers.

use std::sync::Arc;

use strata_common::types::{ColumnElement, ColumnType};
use strata_common::utils::error::{CapacityError, Error, Result};

use crate::execution::operators::scan::for_each_block;
use crate::execution::progress::{OperationOptions, OperationOutcome};
use crate::storage::encoded::EncodedColumn;

/// A finished column split into fixed-size blocks.
///
/// Every block has `block_size` items except possibly the last. Block
/// indices are stable for the buffer's lifetime, and reads never mutate the
/// buffer, so one buffer may be shared by many readers.
pub trait BlockBuffer<T: ColumnElement>: Send + Sync {
    /// Returns the total number of items.
    fn len(&self) -> usize;

    /// Returns the size of every block but the last.
    fn block_size(&self) -> usize;

    /// Returns the items of block `index`.
    ///
    /// Fails with [`CapacityError::BlockOutOfRange`] past the last block.
    fn get_block(&self, index: usize) -> Result<Vec<T>>;

    /// Returns the declared element type.
    fn column_type(&self) -> ColumnType {
        T::COLUMN_TYPE
    }

    /// Returns true if the buffer has no items.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of blocks.
    fn block_count(&self) -> usize {
        self.len().div_ceil(self.block_size().max(1))
    }

    /// Returns the size of every block in order.
    fn block_sizes(&self) -> Vec<usize> {
        let size = self.block_size().max(1);
        let len = self.len();
        (0..self.block_count())
            .map(|i| size.min(len - i * size))
            .collect()
    }

    /// Visits every block in index order.
    ///
    /// Cancellation in `options` is checked between blocks.
    fn for_each_block(
        &self,
        options: &OperationOptions,
        callback: &mut dyn FnMut(usize, &[T]) -> Result<()>,
    ) -> Result<OperationOutcome> {
        for_each_block(self, options, callback)
    }
}

/// Iteration helpers available on every [`BlockBuffer`].
pub trait BlockBufferExt<T: ColumnElement>: BlockBuffer<T> {
    /// Lazily iterates every item of every block in order.
    ///
    /// The iterator is single-pass; call again for another pass.
    fn enumerate_all(&self) -> BlockValues<'_, T, Self> {
        BlockValues {
            buffer: self,
            next_block: 0,
            current: Vec::new().into_iter(),
            failed: false,
        }
    }
}

impl<T: ColumnElement, B: BlockBuffer<T> + ?Sized> BlockBufferExt<T> for B {}

/// Iterator returned by [`BlockBufferExt::enumerate_all`].
pub struct BlockValues<'a, T: ColumnElement, B: BlockBuffer<T> + ?Sized> {
    buffer: &'a B,
    next_block: usize,
    current: std::vec::IntoIter<T>,
    failed: bool,
}

impl<T: ColumnElement, B: BlockBuffer<T> + ?Sized> Iterator for BlockValues<'_, T, B> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            if let Some(value) = self.current.next() {
                return Some(Ok(value));
            }
            if self.next_block >= self.buffer.block_count() {
                return None;
            }
            match self.buffer.get_block(self.next_block) {
                Ok(block) => {
                    self.next_block += 1;
                    self.current = block.into_iter();
                }
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

/// Fetches one block on the blocking pool so async callers do not stall
/// on temp-storage reads.
pub async fn fetch_block<T: ColumnElement>(
    buffer: Arc<dyn BlockBuffer<T>>,
    index: usize,
) -> Result<Vec<T>> {
    tokio::task::spawn_blocking(move || buffer.get_block(index))
        .await
        .map_err(|e| Error::Internal(format!("block fetch task failed: {e}")))?
}

/// [`BlockBuffer`] over an [`EncodedColumn`].
#[derive(Clone, Debug)]
pub struct EncodedBlockBuffer<T: ColumnElement> {
    column: EncodedColumn<T>,
    block_size: usize,
}

impl<T: ColumnElement> EncodedBlockBuffer<T> {
    /// Splits `column` into blocks of `block_size` items.
    pub fn new(column: EncodedColumn<T>, block_size: usize) -> Result<Self> {
        if block_size == 0 {
            return Err(Error::Config("block_size must be at least 1".to_string()));
        }
        Ok(Self { column, block_size })
    }

    /// Wraps in-memory values.
    pub fn from_values(values: Vec<T>, block_size: usize) -> Result<Self> {
        Self::new(EncodedColumn::from_values(values), block_size)
    }

    /// Returns the underlying column.
    #[must_use]
    pub fn column(&self) -> &EncodedColumn<T> {
        &self.column
    }

    /// Wraps the buffer for sharing with operations.
    #[must_use]
    pub fn into_shared(self) -> Arc<dyn BlockBuffer<T>> {
        Arc::new(self)
    }
}

impl<T: ColumnElement> BlockBuffer<T> for EncodedBlockBuffer<T> {
    fn len(&self) -> usize {
        self.column.len()
    }

    fn block_size(&self) -> usize {
        self.block_size
    }

    fn get_block(&self, index: usize) -> Result<Vec<T>> {
        let count = self.block_count();
        if index >= count {
            return Err(CapacityError::BlockOutOfRange { index, count }.into());
        }
        tracing::debug!(block = index, strategy = self.column.strategy().name(), "fetch block");
        self.column
            .read_range(index * self.block_size, self.block_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_block_layout() {
        let buffer = EncodedBlockBuffer::from_values((0..10).collect::<Vec<i32>>(), 4).unwrap();
        assert_eq!(buffer.block_count(), 3);
        assert_eq!(buffer.block_sizes(), vec![4, 4, 2]);
        assert_eq!(buffer.get_block(0).unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(buffer.get_block(2).unwrap(), vec![8, 9]);
        assert_eq!(buffer.column_type(), ColumnType::Int32);
    }

    #[test]
    fn test_block_out_of_range() {
        let buffer = EncodedBlockBuffer::from_values(vec![1u8, 2, 3], 2).unwrap();
        let err = buffer.get_block(2).unwrap_err();
        assert!(matches!(
            err,
            Error::Capacity(CapacityError::BlockOutOfRange { index: 2, count: 2 })
        ));
    }

    #[test]
    fn test_zero_block_size_rejected() {
        assert!(EncodedBlockBuffer::from_values(vec![1u8], 0).is_err());
    }

    #[test]
    fn test_enumerate_all_through_dyn() {
        let shared = EncodedBlockBuffer::from_values(vec!["a".to_string(), "b".to_string()], 1)
            .unwrap()
            .into_shared();
        let values: Vec<String> = shared.enumerate_all().map(Result::unwrap).collect();
        assert_eq!(values, vec!["a", "b"]);
    }

    #[test]
    fn test_empty_buffer() {
        let buffer = EncodedBlockBuffer::<f64>::from_values(Vec::new(), 8).unwrap();
        assert_eq!(buffer.block_count(), 0);
        assert!(buffer.block_sizes().is_empty());
        assert_eq!(buffer.enumerate_all().count(), 0);
    }

    #[tokio::test]
    async fn test_fetch_block_async() {
        let shared = EncodedBlockBuffer::from_values((0..5).collect::<Vec<i64>>(), 2)
            .unwrap()
            .into_shared();
        assert_eq!(fetch_block(shared.clone(), 1).await.unwrap(), vec![2, 3]);
        assert!(fetch_block(shared, 3).await.is_err());
    }

    proptest! {
        #[test]
        fn prop_block_sizes_sum_to_len(len in 0usize..500, block_size in 1usize..64) {
            let buffer = EncodedBlockBuffer::from_values(vec![0u16; len], block_size).unwrap();
            let sizes = buffer.block_sizes();
            prop_assert_eq!(sizes.iter().sum::<usize>(), len);
            if let Some((_, head)) = sizes.split_last() {
                prop_assert!(head.iter().all(|&s| s == block_size));
            }
        }
    }
}
