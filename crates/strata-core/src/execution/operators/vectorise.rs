//! Vectorisation into pooled tensor memory.

use std::sync::Arc;

use strata_common::memory::{BlockPool, TensorSegment};
use strata_common::types::ColumnElement;
use strata_common::utils::error::{Error, Result};

use super::scan::drive_blocks;
use crate::buffer::BlockBuffer;
use crate::execution::progress::{OperationOptions, OperationOutcome};
use crate::vectorise::Vectoriser;

/// Row-major `f32` output of a vectorisation, one segment per input block.
///
/// Dropping the column releases every segment back to its pool.
#[derive(Debug)]
pub struct VectorisedColumn {
    width: usize,
    rows: usize,
    /// First row of each segment, ascending.
    offsets: Vec<usize>,
    segments: Vec<TensorSegment<f32>>,
}

impl VectorisedColumn {
    /// Returns the row width.
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows
    }

    /// Returns true if there are no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Returns the backing segments.
    #[must_use]
    pub fn segments(&self) -> &[TensorSegment<f32>] {
        &self.segments
    }

    /// Copies out row `index`.
    pub fn row(&self, index: usize) -> Result<Vec<f32>> {
        if index >= self.rows {
            return Err(strata_common::CapacityError::SlotOutOfRange {
                slot: index,
                width: self.rows,
            }
            .into());
        }
        let slot = self.offsets.partition_point(|&first| first <= index) - 1;
        let start = (index - self.offsets[slot]) * self.width;
        self.segments[slot].with_slice(|s| s[start..start + self.width].to_vec())
    }

    /// Copies out every row, concatenated.
    pub fn to_vec(&self) -> Result<Vec<f32>> {
        let mut out = Vec::with_capacity(self.rows * self.width);
        for segment in &self.segments {
            segment.with_slice(|s| out.extend_from_slice(s))?;
        }
        Ok(out)
    }
}

/// Runs a [`Vectoriser`] over every value of one buffer.
pub struct VectoriseOperation<T: ColumnElement> {
    input: Arc<dyn BlockBuffer<T>>,
    options: OperationOptions,
    pool: Arc<BlockPool>,
}

impl<T: ColumnElement> VectoriseOperation<T> {
    /// Creates an operation that allocates from the global pool.
    pub fn new(input: Arc<dyn BlockBuffer<T>>) -> Self {
        Self {
            input,
            options: OperationOptions::default(),
            pool: BlockPool::global(),
        }
    }

    /// Allocates output segments from `pool`.
    #[must_use]
    pub fn with_pool(mut self, pool: Arc<BlockPool>) -> Self {
        self.pool = pool;
        self
    }

    /// Sets notifier and cancellation options.
    #[must_use]
    pub fn with_options(mut self, options: OperationOptions) -> Self {
        self.options = options;
        self
    }

    /// Vectorises every value.
    ///
    /// A failing value aborts the run; segments written so far are
    /// released.
    pub async fn run<V>(&self, vectoriser: &mut V) -> Result<(VectorisedColumn, OperationOutcome)>
    where
        V: Vectoriser<T> + ?Sized,
    {
        let width = vectoriser.output_width();
        if width == 0 {
            return Err(Error::Config("vectoriser output width must be at least 1".to_string()));
        }

        let mut segments = Vec::with_capacity(self.input.block_count());
        let mut offsets = Vec::with_capacity(self.input.block_count());
        let mut rows = 0;
        let outcome = drive_blocks(&self.input, &self.options, "vectorise", |_, block| {
            let segment = TensorSegment::<f32>::allocate(&self.pool, block.len() * width)?;
            segment.with_slice_mut(|out| -> Result<()> {
                for (value, row) in block.iter().zip(out.chunks_exact_mut(width)) {
                    vectoriser.vectorise(value, row)?;
                }
                Ok(())
            })??;
            offsets.push(rows);
            rows += block.len();
            segments.push(segment);
            Ok(())
        })
        .await?;

        let column = VectorisedColumn {
            width,
            rows,
            offsets,
            segments,
        };
        Ok((column, outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::EncodedBlockBuffer;
    use crate::vectorise::{NumericVectoriser, OneHotVectoriser};
    use strata_common::CapacityError;

    #[tokio::test]
    async fn test_numeric_rows() {
        let input = EncodedBlockBuffer::from_values(vec![1.5f64, 2.5, 3.5], 2)
            .unwrap()
            .into_shared();
        let pool = BlockPool::new();
        let (column, outcome) = VectoriseOperation::new(input)
            .with_pool(pool)
            .run(&mut NumericVectoriser::new())
            .await
            .unwrap();

        assert_eq!(outcome.rows, 3);
        assert_eq!(column.segments().len(), 2);
        assert_eq!(column.to_vec().unwrap(), vec![1.5, 2.5, 3.5]);
        assert_eq!(column.row(2).unwrap(), vec![3.5]);
        assert!(column.row(3).is_err());
    }

    /// Serves blocks of uneven length.
    struct RaggedBuffer {
        blocks: Vec<Vec<f64>>,
    }

    impl BlockBuffer<f64> for RaggedBuffer {
        fn len(&self) -> usize {
            self.blocks.iter().map(Vec::len).sum()
        }

        fn block_size(&self) -> usize {
            self.blocks.iter().map(Vec::len).max().unwrap_or(1)
        }

        fn block_count(&self) -> usize {
            self.blocks.len()
        }

        fn get_block(&self, index: usize) -> Result<Vec<f64>> {
            Ok(self.blocks[index].clone())
        }
    }

    #[tokio::test]
    async fn test_rows_with_uneven_blocks() {
        let input: Arc<dyn BlockBuffer<f64>> = Arc::new(RaggedBuffer {
            blocks: vec![vec![1.0], vec![2.0, 3.0, 4.0], vec![5.0, 6.0]],
        });
        let (column, _) = VectoriseOperation::new(input)
            .with_pool(BlockPool::new())
            .run(&mut NumericVectoriser::new())
            .await
            .unwrap();

        let rows: Vec<f32> = (0..column.len()).map(|i| column.row(i).unwrap()[0]).collect();
        assert_eq!(rows, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[tokio::test]
    async fn test_one_hot_rows_and_pool_reuse() {
        let labels: Vec<String> = ["a", "b", "a", "c"].iter().map(|s| s.to_string()).collect();
        let input = EncodedBlockBuffer::from_values(labels, 2).unwrap().into_shared();
        let pool = BlockPool::new();
        let op = VectoriseOperation::new(input).with_pool(Arc::clone(&pool));

        let mut vectoriser = OneHotVectoriser::new(3);
        let (column, _) = op.run(&mut vectoriser).await.unwrap();
        assert_eq!(column.width(), 3);
        assert_eq!(column.row(1).unwrap(), vec![0.0, 1.0, 0.0]);
        assert_eq!(column.row(3).unwrap(), vec![0.0, 0.0, 1.0]);

        drop(column);
        assert_eq!(pool.stats().pooled, 2);

        let (again, _) = op.run(&mut vectoriser).await.unwrap();
        assert_eq!(again.row(0).unwrap(), vec![1.0, 0.0, 0.0]);
        assert_eq!(pool.stats().reuses, 2);
    }

    #[tokio::test]
    async fn test_overflow_aborts_and_releases() {
        let labels: Vec<String> = ["x", "y", "z"].iter().map(|s| s.to_string()).collect();
        let input = EncodedBlockBuffer::from_values(labels, 2).unwrap().into_shared();
        let pool = BlockPool::new();

        let err = VectoriseOperation::new(input)
            .with_pool(Arc::clone(&pool))
            .run(&mut OneHotVectoriser::new(2))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Capacity(CapacityError::LabelOverflow { width: 2, .. })
        ));
        // Both allocated segments went back to the pool.
        assert_eq!(pool.stats().pooled, 2);
    }
}
