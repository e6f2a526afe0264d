//! One-to-one mutation and filter.

use std::sync::Arc;

use strata_common::types::ColumnElement;
use strata_common::utils::error::Result;

use super::BlockSink;
use super::scan::drive_blocks;
use crate::buffer::BlockBuffer;
use crate::execution::progress::{OperationOptions, OperationOutcome};

/// Maps every value of one buffer into an output sink.
///
/// Each block is converted completely before it is pushed, so a failing
/// conversion never leaves part of a block in the sink.
pub struct MapOperation<T: ColumnElement> {
    input: Arc<dyn BlockBuffer<T>>,
    options: OperationOptions,
}

impl<T: ColumnElement> MapOperation<T> {
    /// Creates a map over `input`.
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

    /// Runs `f` over every value and pushes the results into `sink`.
    pub async fn run<U, S, F>(&self, mut f: F, sink: &mut S) -> Result<OperationOutcome>
    where
        S: BlockSink<U>,
        F: FnMut(T) -> Result<U>,
    {
        drive_blocks(&self.input, &self.options, "map", |_, block| {
            let converted = block.into_iter().map(&mut f).collect::<Result<Vec<U>>>()?;
            sink.push_block(converted)
        })
        .await
    }
}

/// Keeps the values of one buffer that satisfy a predicate.
pub struct FilterOperation<T: ColumnElement> {
    input: Arc<dyn BlockBuffer<T>>,
    options: OperationOptions,
}

impl<T: ColumnElement> FilterOperation<T> {
    /// Creates a filter over `input`.
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

    /// Pushes every value for which `predicate` holds into `sink`.
    pub async fn run<S, P>(&self, mut predicate: P, sink: &mut S) -> Result<OperationOutcome>
    where
        S: BlockSink<T>,
        P: FnMut(&T) -> bool,
    {
        drive_blocks(&self.input, &self.options, "filter", |_, block| {
            let kept: Vec<T> = block.into_iter().filter(|v| predicate(v)).collect();
            sink.push_block(kept)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BufferConfig;
    use crate::buffer::{EncodedBlockBuffer, HybridBuffer};
    use strata_common::utils::error::Error;

    fn strings(values: &[&str]) -> Arc<dyn BlockBuffer<String>> {
        EncodedBlockBuffer::from_values(values.iter().map(|s| s.to_string()).collect(), 2)
            .unwrap()
            .into_shared()
    }

    #[tokio::test]
    async fn test_map_into_vec() {
        let mut out: Vec<usize> = Vec::new();
        let outcome = MapOperation::new(strings(&["a", "bb", "ccc"]))
            .run(|s| Ok(s.len()), &mut out)
            .await
            .unwrap();
        assert_eq!(out, vec![1, 2, 3]);
        assert_eq!(outcome.rows, 3);
    }

    #[tokio::test]
    async fn test_map_error_keeps_completed_blocks_only() {
        let mut out: Vec<String> = Vec::new();
        let result = MapOperation::new(strings(&["a", "b", "c", "bad", "e"]))
            .run(
                |s| {
                    if s == "bad" {
                        Err(Error::Internal("bad value".to_string()))
                    } else {
                        Ok(s.to_uppercase())
                    }
                },
                &mut out,
            )
            .await;

        assert!(result.is_err());
        assert_eq!(out, vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_filter_into_hybrid_buffer() {
        let input = EncodedBlockBuffer::from_values((0..50).collect::<Vec<i32>>(), 8)
            .unwrap()
            .into_shared();
        let config = BufferConfig::default().with_in_memory_cap(4);
        let mut sink = HybridBuffer::in_memory(config).unwrap();

        FilterOperation::new(input)
            .run(|v| v % 5 == 0, &mut sink)
            .await
            .unwrap();

        let kept: Vec<i32> = sink.values().collect::<Result<_>>().unwrap();
        assert_eq!(kept, vec![0, 5, 10, 15, 20, 25, 30, 35, 40, 45]);
        assert!(sink.spilled_chunks() > 0);
    }
}
