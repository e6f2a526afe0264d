//! Column buffers.
//!
//! Producers append into a [`HybridBuffer`], which keeps a bounded number
//! of items resident and spills the rest to temporary storage. Finishing a
//! hybrid buffer yields an [`EncodedBlockBuffer`], the read-only,
//! block-oriented form every operation consumes through [`BlockBuffer`].

mod block;
mod distinct;
mod hybrid;

pub use block::{BlockBuffer, BlockBufferExt, BlockValues, EncodedBlockBuffer, fetch_block};
pub use distinct::{DistinctState, DistinctTracker};
pub use hybrid::{HybridBuffer, HybridValues};
