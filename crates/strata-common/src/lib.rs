//! # strata-common
//!
//! Foundation layer for Strata: types, binary I/O and tensor memory.
//!
//! This crate has no internal dependencies and should be kept minimal.
//!
//! ## Modules
//!
//! - [`types`] - Column types, value shapes and element encodings
//! - [`io`] - Little-endian binary reader/writer extensions
//! - [`memory`] - Reference-counted, pooled tensor blocks
//! - [`utils`] - Errors and hashing

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod io;
pub mod memory;
pub mod types;
pub mod utils;

// Re-export commonly used types at crate root
pub use memory::{BlockHandle, BlockPool, RefCountedBlock, TensorElement, TensorSegment};
pub use types::{ColumnElement, ColumnType, NumericElement, Value, ValueShape};
pub use utils::error::{CapacityError, Error, LifetimeError, Result, StorageError};
