//! Encoded column storage.
//!
//! | Shape   | Strategy (len > threshold) | Layout                                   |
//! |---------|----------------------------|------------------------------------------|
//! | Fixed   | RepeatableScan             | raw little-endian items in a temp stream |
//! | String  | StringDictionary           | table of distinct strings + u32 indices  |
//! | Struct  | StructTable                | table of distinct structs + u32 indices  |
//! | Object  | ObjectStream               | length-prefixed payloads + checkpoints   |
//!
//! Columns at or below the in-memory threshold are kept as plain arrays.
//! Every run written by [`encode_run`] or [`EncodedColumn::write_to`]
//! starts with a one-byte [`RunTag`] and a `u64` item count.

pub mod codec;
pub mod dictionary;
pub mod encoded;
pub mod temp;

pub use codec::{CodecStrategy, RunTag, decode_run, encode_run};
pub use dictionary::{DictionaryBuilder, DictionaryColumn};
pub use encoded::{ColumnValues, ColumnWriter, EncodedColumn, ObjectColumn, ScanColumn};
pub use temp::{FileTempStorage, MemoryTempStorage, SharedStream, TempStorage, TempStream};
