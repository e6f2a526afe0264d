//! Scans over one block buffer.

use std::sync::Arc;

use strata_common::types::ColumnElement;
use strata_common::utils::error::{Error, Result};
use tokio::task::JoinHandle;

use crate::buffer::{BlockBuffer, fetch_block};
use crate::execution::progress::{OperationOptions, OperationOutcome, ProgressTracker};

/// Visits every block of `buffer` synchronously, in index order.
///
/// Cancellation is checked before each block is fetched; blocks already
/// handed to `callback` are not rolled back.
pub fn for_each_block<T, B>(
    buffer: &B,
    options: &OperationOptions,
    callback: &mut dyn FnMut(usize, &[T]) -> Result<()>,
) -> Result<OperationOutcome>
where
    T: ColumnElement,
    B: BlockBuffer<T> + ?Sized,
{
    let mut tracker = ProgressTracker::new(options, buffer.len(), buffer.block_size());
    tracker.start("for_each_block");
    for index in 0..buffer.block_count() {
        if tracker.should_stop() {
            break;
        }
        let block = buffer.get_block(index)?;
        callback(index, &block)?;
        tracker.advance(block.len());
    }
    Ok(tracker.complete("for_each_block"))
}

/// Starts fetching block `index` so it loads while the caller works.
fn spawn_fetch<T: ColumnElement>(
    buffer: &Arc<dyn BlockBuffer<T>>,
    index: usize,
) -> JoinHandle<Result<Vec<T>>> {
    tokio::spawn(fetch_block(Arc::clone(buffer), index))
}

async fn join_fetch<T>(handle: JoinHandle<Result<Vec<T>>>) -> Result<Vec<T>> {
    handle
        .await
        .map_err(|e| Error::Internal(format!("block fetch task failed: {e}")))?
}

/// Drives `on_block` over every block of `input`.
///
/// The next block is fetched on the blocking pool while the current one is
/// processed.
pub(crate) async fn drive_blocks<T, F>(
    input: &Arc<dyn BlockBuffer<T>>,
    options: &OperationOptions,
    name: &'static str,
    mut on_block: F,
) -> Result<OperationOutcome>
where
    T: ColumnElement,
    F: FnMut(usize, Vec<T>) -> Result<()>,
{
    let count = input.block_count();
    let mut tracker = ProgressTracker::new(options, input.len(), input.block_size());
    let mut pending = (count > 0).then(|| spawn_fetch(input, 0));
    tracker.start(name);

    for index in 0..count {
        if tracker.should_stop() {
            break;
        }
        let Some(handle) = pending.take() else {
            break;
        };
        let block = join_fetch(handle).await?;
        if index + 1 < count {
            pending = Some(spawn_fetch(input, index + 1));
        }
        let rows = block.len();
        on_block(index, block)?;
        tracker.advance(rows);
    }
    Ok(tracker.complete(name))
}

/// Read-only pass over one buffer.
pub struct ScanOperation<T: ColumnElement> {
    input: Arc<dyn BlockBuffer<T>>,
    options: OperationOptions,
}

impl<T: ColumnElement> ScanOperation<T> {
    /// Creates a scan over `input`.
    pub fn new(input: Arc<dyn BlockBuffer<T>>) -> Self {
        Self {
            input,
            options: OperationOptions::default(),
        }
    }

    /// Sets notifier and cancellation options.
    #[must_use]
    pub fn with_options(mut self, options: OperationOptions) -> Self {
        self.options = options;
        self
    }

    /// Calls `f` with every block.
    pub async fn for_each_block<F>(&self, mut f: F) -> Result<OperationOutcome>
    where
        F: FnMut(usize, &[T]) -> Result<()>,
    {
        drive_blocks(&self.input, &self.options, "scan", |index, block| {
            f(index, &block)
        })
        .await
    }

    /// Calls `f` with every value.
    pub async fn for_each<F>(&self, mut f: F) -> Result<OperationOutcome>
    where
        F: FnMut(&T) -> Result<()>,
    {
        drive_blocks(&self.input, &self.options, "scan", |_, block| {
            block.iter().try_for_each(&mut f)
        })
        .await
    }

    /// Folds every value into `acc`.
    pub async fn fold<A, F>(&self, mut acc: A, mut f: F) -> Result<(A, OperationOutcome)>
    where
        F: FnMut(&mut A, &T),
    {
        let outcome = drive_blocks(&self.input, &self.options, "scan", |_, block| {
            for value in &block {
                f(&mut acc, value);
            }
            Ok(())
        })
        .await?;
        Ok((acc, outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::EncodedBlockBuffer;
    use crate::execution::progress::tests::RecordingNotifier;
    use crate::execution::progress::{CancellationToken, OperationState};

    fn ints(len: i64, block_size: usize) -> Arc<dyn BlockBuffer<i64>> {
        EncodedBlockBuffer::from_values((0..len).collect(), block_size)
            .unwrap()
            .into_shared()
    }

    #[tokio::test]
    async fn test_blocks_in_order() {
        let scan = ScanOperation::new(ints(10, 3));
        let mut seen = Vec::new();
        let outcome = scan
            .for_each_block(|index, block| {
                seen.push((index, block.to_vec()));
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(outcome.state, OperationState::Completed);
        assert_eq!(outcome.blocks, 4);
        assert_eq!(seen[3], (3, vec![9]));
        assert_eq!(seen.len(), 4);
    }

    #[tokio::test]
    async fn test_fold_sum() {
        let (sum, outcome) = ScanOperation::new(ints(100, 7))
            .fold(0i64, |acc, v| *acc += v)
            .await
            .unwrap();
        assert_eq!(sum, 4950);
        assert_eq!(outcome.rows, 100);
    }

    #[tokio::test]
    async fn test_cancel_stops_after_current_block() {
        let token = CancellationToken::new();
        let notifier = Arc::new(RecordingNotifier::default());
        let options = OperationOptions::new()
            .with_cancellation(token.clone())
            .with_notifier(notifier.clone());

        let mut visited = 0;
        let outcome = ScanOperation::new(ints(20, 5))
            .with_options(options)
            .for_each_block(|index, _| {
                visited += 1;
                if index == 1 {
                    token.cancel();
                }
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(visited, 2);
        assert!(outcome.was_cancelled());
        assert_eq!(outcome.rows, 10);
        assert_eq!(notifier.events().last().unwrap(), "complete:true");
    }

    #[tokio::test]
    async fn test_cancel_on_last_block_still_reported() {
        let token = CancellationToken::new();
        let outcome = ScanOperation::new(ints(10, 5))
            .with_options(OperationOptions::new().with_cancellation(token.clone()))
            .for_each_block(|index, _| {
                if index == 1 {
                    token.cancel();
                }
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(outcome.rows, 10);
        assert!(outcome.was_cancelled());
    }

    #[tokio::test]
    async fn test_callback_error_aborts() {
        let result = ScanOperation::new(ints(10, 2))
            .for_each(|v| {
                if *v == 5 {
                    Err(Error::Internal("stop".to_string()))
                } else {
                    Ok(())
                }
            })
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_sync_for_each_block() {
        let buffer = EncodedBlockBuffer::from_values(vec![1u8, 2, 3, 4, 5], 2).unwrap();
        let mut sizes = Vec::new();
        let outcome = buffer
            .for_each_block(&OperationOptions::new(), &mut |_, block| {
                sizes.push(block.len());
                Ok(())
            })
            .unwrap();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(outcome.rows, 5);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let outcome = ScanOperation::new(ints(0, 4))
            .for_each(|_| Ok(()))
            .await
            .unwrap();
        assert_eq!(outcome.rows, 0);
        assert_eq!(outcome.state, OperationState::Completed);
    }
}
