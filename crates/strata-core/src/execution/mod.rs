//! Buffer operations and their progress contract.
//!
//! - [`progress`] - operation ids, notifications, cancellation, fan-in
//! - [`operators`] - scan, map, filter, many-input and vectorise

pub mod operators;
pub mod progress;

pub use operators::{
    BlockSink, FilterOperation, ManyToManyOperation, MapOperation, Row, ScanOperation,
    VectoriseOperation, VectorisedColumn,
};
pub use progress::{
    CancellationToken, OperationId, OperationOptions, OperationOutcome, OperationState,
    ProgressAggregator, ProgressNotifier, ProgressTracker, average_block_size,
};
