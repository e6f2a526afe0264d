//! Column statistics computed with a scan.

use std::sync::Arc;

use strata_common::types::{ColumnElement, NumericElement};
use strata_common::utils::error::Result;

use crate::buffer::{BlockBuffer, DistinctTracker};
use crate::execution::{OperationOptions, ScanOperation};

/// Summary of a numeric column. NaN values are counted but ignored by
/// `min`, `max` and `mean`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NumericSummary {
    /// Rows scanned.
    pub count: usize,
    /// Smallest value, if any non-NaN value was seen.
    pub min: Option<f64>,
    /// Largest value, if any non-NaN value was seen.
    pub max: Option<f64>,
    /// Mean of the non-NaN values.
    pub mean: Option<f64>,
}

#[derive(Default)]
struct NumericAcc {
    count: usize,
    finite: usize,
    sum: f64,
    min: Option<f64>,
    max: Option<f64>,
}

/// Outcome of distinct counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistinctCount {
    /// Exact number of distinct values.
    Exact(usize),
    /// More distinct values than the cap.
    Unknown,
}

/// Computes count, min, max and mean of `input`.
pub async fn analyze_numeric<T: NumericElement>(
    input: Arc<dyn BlockBuffer<T>>,
    options: OperationOptions,
) -> Result<NumericSummary> {
    let (acc, _) = ScanOperation::new(input)
        .with_options(options)
        .fold(NumericAcc::default(), |acc, value| {
            acc.count += 1;
            let v = value.to_f64();
            if v.is_nan() {
                return;
            }
            acc.finite += 1;
            acc.sum += v;
            acc.min = Some(acc.min.map_or(v, |m| m.min(v)));
            acc.max = Some(acc.max.map_or(v, |m| m.max(v)));
        })
        .await?;

    Ok(NumericSummary {
        count: acc.count,
        min: acc.min,
        max: acc.max,
        mean: (acc.finite > 0).then(|| acc.sum / acc.finite as f64),
    })
}

/// Counts distinct values of `input`, giving up past `cap`.
pub async fn analyze_distinct<T: ColumnElement>(
    input: Arc<dyn BlockBuffer<T>>,
    cap: usize,
    options: OperationOptions,
) -> Result<DistinctCount> {
    let (tracker, _) = ScanOperation::new(input)
        .with_options(options)
        .fold(DistinctTracker::new(cap), |tracker, value| {
            tracker.offer(value.distinct_key());
        })
        .await?;

    Ok(match tracker.count() {
        Some(n) => DistinctCount::Exact(n),
        None => DistinctCount::Unknown,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::EncodedBlockBuffer;

    #[tokio::test]
    async fn test_numeric_summary() {
        let input = EncodedBlockBuffer::from_values(vec![3.0f64, -1.0, f64::NAN, 4.0], 3)
            .unwrap()
            .into_shared();
        let summary = analyze_numeric(input, OperationOptions::new()).await.unwrap();
        assert_eq!(summary.count, 4);
        assert_eq!(summary.min, Some(-1.0));
        assert_eq!(summary.max, Some(4.0));
        assert_eq!(summary.mean, Some(2.0));
    }

    #[tokio::test]
    async fn test_numeric_summary_empty() {
        let input = EncodedBlockBuffer::<i32>::from_values(Vec::new(), 3)
            .unwrap()
            .into_shared();
        let summary = analyze_numeric(input, OperationOptions::new()).await.unwrap();
        assert_eq!(summary, NumericSummary::default());
    }

    #[tokio::test]
    async fn test_distinct_exact_and_unknown() {
        let values: Vec<String> = ["a", "b", "a", "c"].iter().map(|s| s.to_string()).collect();
        let input = EncodedBlockBuffer::from_values(values, 2).unwrap().into_shared();

        let exact = analyze_distinct(Arc::clone(&input), 3, OperationOptions::new())
            .await
            .unwrap();
        assert_eq!(exact, DistinctCount::Exact(3));

        let unknown = analyze_distinct(input, 2, OperationOptions::new()).await.unwrap();
        assert_eq!(unknown, DistinctCount::Unknown);
    }
}
