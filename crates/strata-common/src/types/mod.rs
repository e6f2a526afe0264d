//! Core type definitions for Strata.
//!
//! - [`ColumnType`] - declared element type of a column
//! - [`ValueShape`] - the data shape that selects a codec
//! - [`ColumnElement`] - how a Rust type is stored in a column
//! - [`Value`] - closed tagged union for heterogeneous columns

mod column_type;
mod element;
mod value;

pub use column_type::{ColumnType, ValueShape};
pub use element::{ColumnElement, NumericElement};
pub use value::{DenseTensor, IndexList, Value, ValueKey, WeightedIndexList};
