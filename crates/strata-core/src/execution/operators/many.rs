//! Lock-step operations over several equally sized buffers.
//!
//! Inputs are advanced by element index. Whenever an input runs out of
//! buffered items, every exhausted input fetches its next block
//! concurrently and the step waits for all of them before the next aligned
//! rows are formed. If any input ends before the declared length, the
//! operation ends for all inputs.

use std::sync::Arc;

use smallvec::SmallVec;
use strata_common::types::ColumnElement;
use strata_common::utils::error::{CapacityError, Error, Result};
use tokio::task::JoinSet;

use super::BlockSink;
use crate::buffer::{BlockBuffer, fetch_block};
use crate::execution::progress::{
    OperationOptions, OperationOutcome, ProgressTracker, average_block_size,
};

/// One aligned row: the value at the same index from every input.
pub type Row<T> = SmallVec<[T; 4]>;

struct BlockCursor<T: ColumnElement> {
    buffer: Arc<dyn BlockBuffer<T>>,
    next_block: usize,
    current: std::vec::IntoIter<T>,
}

impl<T: ColumnElement> BlockCursor<T> {
    fn new(buffer: Arc<dyn BlockBuffer<T>>) -> Self {
        Self {
            buffer,
            next_block: 0,
            current: Vec::new().into_iter(),
        }
    }

    fn remaining(&self) -> usize {
        self.current.len()
    }

    fn needs_block(&self) -> bool {
        self.remaining() == 0 && self.next_block < self.buffer.block_count()
    }
}

/// Fetches the next block of every drained cursor concurrently.
async fn refill<T: ColumnElement>(cursors: &mut [BlockCursor<T>]) -> Result<()> {
    let mut fetches = JoinSet::new();
    for (input, cursor) in cursors.iter_mut().enumerate() {
        if !cursor.needs_block() {
            continue;
        }
        let buffer = Arc::clone(&cursor.buffer);
        let index = cursor.next_block;
        cursor.next_block += 1;
        fetches.spawn(async move { (input, fetch_block(buffer, index).await) });
    }

    while let Some(joined) = fetches.join_next().await {
        let (input, block) =
            joined.map_err(|e| Error::Internal(format!("block fetch task failed: {e}")))?;
        cursors[input].current = block?.into_iter();
    }
    Ok(())
}

/// Mutation, filter or reduction across several inputs of equal length.
///
/// # Examples
///
/// ```no_run
/// # async fn demo() -> strata_common::Result<()> {
/// use strata_core::buffer::EncodedBlockBuffer;
/// use strata_core::execution::ManyToManyOperation;
///
/// let a = EncodedBlockBuffer::from_values(vec![1i64, 2, 3], 2)?.into_shared();
/// let b = EncodedBlockBuffer::from_values(vec![10i64, 20, 30], 3)?.into_shared();
///
/// let mut sums: Vec<i64> = Vec::new();
/// ManyToManyOperation::new(vec![a, b])?
///     .run_many_to_one(|row| Ok(row.iter().sum()), &mut sums)
///     .await?;
/// assert_eq!(sums, vec![11, 22, 33]);
/// # Ok(())
/// # }
/// ```
pub struct ManyToManyOperation<T: ColumnElement> {
    inputs: Vec<Arc<dyn BlockBuffer<T>>>,
    len: usize,
    options: OperationOptions,
}

impl<T: ColumnElement> ManyToManyOperation<T> {
    /// Creates an operation over `inputs`.
    ///
    /// Fails with [`CapacityError::SizeMismatch`] if the inputs disagree on
    /// their length. No block is read here.
    pub fn new(inputs: Vec<Arc<dyn BlockBuffer<T>>>) -> Result<Self> {
        let Some(first) = inputs.first() else {
            return Err(Error::Config(
                "many-input operation needs at least one input".to_string(),
            ));
        };
        let expected = first.len();
        for (input, buffer) in inputs.iter().enumerate().skip(1) {
            if buffer.len() != expected {
                return Err(CapacityError::SizeMismatch {
                    input,
                    expected,
                    found: buffer.len(),
                }
                .into());
            }
        }

        Ok(Self {
            inputs,
            len: expected,
            options: OperationOptions::default(),
        })
    }

    /// Sets notifier and cancellation options.
    #[must_use]
    pub fn with_options(mut self, options: OperationOptions) -> Self {
        self.options = options;
        self
    }

    /// Returns the shared input length.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the inputs are empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the number of inputs.
    #[must_use]
    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// Feeds aligned row batches to `on_batch`.
    ///
    /// The start notification fires once every input has its first block.
    async fn drive<F>(&self, name: &'static str, mut on_batch: F) -> Result<OperationOutcome>
    where
        F: FnMut(Vec<Row<T>>) -> Result<()>,
    {
        let cadence = average_block_size(
            self.inputs
                .iter()
                .map(|input| (input.len(), input.block_count())),
        );
        let mut tracker = ProgressTracker::new(&self.options, self.len, cadence);
        let mut cursors: Vec<BlockCursor<T>> = self
            .inputs
            .iter()
            .map(|input| BlockCursor::new(Arc::clone(input)))
            .collect();

        refill(&mut cursors).await?;
        tracker.start(name);

        while tracker.processed() < self.len {
            if tracker.should_stop() {
                break;
            }
            refill(&mut cursors).await?;

            let available = cursors.iter().map(BlockCursor::remaining).min().unwrap_or(0);
            if available == 0 {
                tracing::debug!(
                    op = %tracker.id(),
                    rows = tracker.processed(),
                    "input ended early"
                );
                break;
            }

            let take = available.min(self.len - tracker.processed());
            let mut rows = Vec::with_capacity(take);
            for _ in 0..take {
                let mut row = Row::with_capacity(cursors.len());
                for cursor in &mut cursors {
                    let value = cursor
                        .current
                        .next()
                        .ok_or_else(|| Error::Internal("cursor drained mid-row".to_string()))?;
                    row.push(value);
                }
                rows.push(row);
            }
            on_batch(rows)?;
            tracker.advance(take);
        }

        Ok(tracker.complete(name))
    }

    /// Maps every aligned row to one value per output.
    ///
    /// `f` must return exactly `outputs.len()` values per row.
    pub async fn run_mutation<U, S, F>(
        &self,
        mut f: F,
        outputs: &mut [S],
    ) -> Result<OperationOutcome>
    where
        S: BlockSink<U>,
        F: FnMut(&[T]) -> Result<Vec<U>>,
    {
        let width = outputs.len();
        self.drive("many_to_many", |rows| {
            let mut columns: Vec<Vec<U>> = (0..width).map(|_| Vec::with_capacity(rows.len())).collect();
            for row in &rows {
                let values = f(row)?;
                if values.len() != width {
                    return Err(CapacityError::WidthMismatch {
                        expected: width,
                        found: values.len(),
                    }
                    .into());
                }
                for (column, value) in columns.iter_mut().zip(values) {
                    column.push(value);
                }
            }
            for (output, column) in outputs.iter_mut().zip(columns) {
                output.push_block(column)?;
            }
            Ok(())
        })
        .await
    }

    /// Keeps aligned rows for which `predicate` holds.
    ///
    /// `outputs` holds one sink per input; a kept row pushes each of its
    /// values into the matching sink.
    pub async fn run_filter<S, P>(&self, mut predicate: P, outputs: &mut [S]) -> Result<OperationOutcome>
    where
        S: BlockSink<T>,
        P: FnMut(&[T]) -> bool,
    {
        if outputs.len() != self.inputs.len() {
            return Err(CapacityError::WidthMismatch {
                expected: self.inputs.len(),
                found: outputs.len(),
            }
            .into());
        }

        let width = outputs.len();
        self.drive("many_filter", |rows| {
            let mut columns: Vec<Vec<T>> = (0..width).map(|_| Vec::new()).collect();
            for row in rows {
                if !predicate(&row) {
                    continue;
                }
                for (column, value) in columns.iter_mut().zip(row) {
                    column.push(value);
                }
            }
            for (output, column) in outputs.iter_mut().zip(columns) {
                output.push_block(column)?;
            }
            Ok(())
        })
        .await
    }

    /// Reduces every aligned row to one output value.
    pub async fn run_many_to_one<U, S, F>(&self, mut f: F, output: &mut S) -> Result<OperationOutcome>
    where
        S: BlockSink<U>,
        F: FnMut(&[T]) -> Result<U>,
    {
        self.drive("many_to_one", |rows| {
            let values = rows.iter().map(|row| f(row)).collect::<Result<Vec<U>>>()?;
            output.push_block(values)
        })
        .await
    }
}
