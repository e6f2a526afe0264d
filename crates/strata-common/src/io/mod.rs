//! Binary reader/writer primitives.
//!
//! Every codec in Strata writes through these extension traits, so the
//! on-disk byte order and string framing are defined in exactly one place.

mod binary;

pub use binary::{BinaryReadExt, BinaryWriteExt, MAX_STRING_LEN};
