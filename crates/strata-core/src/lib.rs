//! # strata-core
//!
//! Column storage and buffer operations for Strata.
//!
//! ## Modules
//!
//! - [`config`] - Buffer sizes and thresholds
//! - [`storage`] - Temporary storage and the encoded block codecs
//! - [`buffer`] - Hybrid (spilling) buffers and read-only block buffers
//! - [`execution`] - Scan, filter, mutation and vectorise operations
//! - [`vectorise`] - Vectorisation strategies and their metadata
//! - [`analysis`] - Numeric and distinct-value statistics

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod analysis;
pub mod buffer;
pub mod config;
pub mod execution;
pub mod storage;
pub mod vectorise;

pub use analysis::{DistinctCount, NumericSummary, analyze_distinct, analyze_numeric};
pub use buffer::{BlockBuffer, BlockBufferExt, EncodedBlockBuffer, HybridBuffer};
pub use config::BufferConfig;
pub use execution::{
    CancellationToken, OperationId, OperationOptions, OperationOutcome, ProgressAggregator,
    ProgressNotifier,
};
pub use storage::{CodecStrategy, EncodedColumn, FileTempStorage, MemoryTempStorage, TempStorage};
