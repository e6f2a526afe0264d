//! # Strata
//!
//! Spillable column buffers, encoded block storage and pooled tensor
//! memory.
//!
//! Producers append into a [`HybridBuffer`], which keeps a bounded number
//! of items in memory and spills the rest to temporary storage. Finishing
//! it yields a read-only [`BlockBuffer`] that scans, filters, mutations and
//! vectorisation consume block by block.
//!
//! ## Quick Start
//!
//! ```rust
//! use strata::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> strata::Result<()> {
//! let config = BufferConfig::default().with_in_memory_cap(2).with_block_size(2);
//! let mut buffer = HybridBuffer::in_memory(config)?;
//! for label in ["a", "b", "c", "a"] {
//!     buffer.append(label.to_string())?;
//! }
//! assert_eq!(buffer.distinct_count(), Some(3));
//!
//! let blocks = buffer.into_block_buffer()?.into_shared();
//! let mut vectoriser = OneHotVectoriser::new(3);
//! let (rows, _) = VectoriseOperation::new(blocks).run(&mut vectoriser).await?;
//! assert_eq!(rows.row(3)?, vec![1.0, 0.0, 0.0]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Crates
//!
//! | Crate | Contents |
//! | ----- | -------- |
//! | `strata-common` | Element types, errors, binary I/O, tensor memory |
//! | `strata-core` | Codecs, buffers, operations, vectorisation |

pub use strata_common::memory::{BlockHandle, BlockPool, RefCountedBlock, TensorSegment};
pub use strata_common::types::{
    ColumnElement, ColumnType, DenseTensor, IndexList, Value, ValueShape, WeightedIndexList,
};
pub use strata_common::utils::error::{
    CapacityError, Error, LifetimeError, Result, StorageError,
};

pub use strata_core::buffer::{
    BlockBuffer, BlockBufferExt, EncodedBlockBuffer, HybridBuffer,
};
pub use strata_core::config::BufferConfig;
pub use strata_core::execution::{
    CancellationToken, FilterOperation, ManyToManyOperation, MapOperation, OperationOptions,
    OperationOutcome, ProgressAggregator, ProgressNotifier, ScanOperation, VectoriseOperation,
};
pub use strata_core::storage::{FileTempStorage, MemoryTempStorage, TempStorage};

pub use strata_common;
pub use strata_core;

/// Common imports.
pub mod prelude {
    pub use crate::{
        BlockBuffer, BlockBufferExt, BufferConfig, CancellationToken, ColumnElement,
        EncodedBlockBuffer, Error, FileTempStorage, HybridBuffer, MemoryTempStorage,
        OperationOptions, Result, ScanOperation, VectoriseOperation,
    };
    pub use strata_core::vectorise::{
        CategoricalVectoriser, NumericVectoriser, OneHotVectoriser, Vectoriser,
    };
}
