//! Block-wise buffer operations.
//!
//! - Scan: visit or fold every block of one buffer
//! - Map: one-to-one mutation into an output sink
//! - Filter: one-to-one filter into an output sink
//! - ManyToMany: lock-step mutation, filter or reduction over several
//!   equally sized buffers
//! - Vectorise: map values to fixed-width `f32` rows in pooled tensor
//!   memory
//!
//! Every operation issues an operation id, reports progress at a cadence
//! near the average block size and checks cancellation between blocks.

mod many;
mod one_to_one;
pub(crate) mod scan;
mod vectorise;

pub use many::{ManyToManyOperation, Row};
pub use one_to_one::{FilterOperation, MapOperation};
pub use scan::ScanOperation;
pub use vectorise::{VectoriseOperation, VectorisedColumn};

use strata_common::types::ColumnElement;
use strata_common::utils::error::Result;

use crate::buffer::HybridBuffer;

/// Destination for operation output.
pub trait BlockSink<T> {
    /// Appends one value.
    fn push(&mut self, value: T) -> Result<()>;

    /// Appends a whole block.
    fn push_block(&mut self, values: Vec<T>) -> Result<()> {
        for value in values {
            self.push(value)?;
        }
        Ok(())
    }
}

impl<T> BlockSink<T> for Vec<T> {
    fn push(&mut self, value: T) -> Result<()> {
        Vec::push(self, value);
        Ok(())
    }

    fn push_block(&mut self, values: Vec<T>) -> Result<()> {
        self.extend(values);
        Ok(())
    }
}

impl<T: ColumnElement> BlockSink<T> for HybridBuffer<T> {
    fn push(&mut self, value: T) -> Result<()> {
        self.append(value)
    }
}
