//! Block codec strategies and the encoded-run wire format.
//!
//! # Strategies
//!
//! | Strategy | Used for | Random access |
//! |----------|----------|---------------|
//! | InMemory | total length <= threshold | yes |
//! | RepeatableScan | large fixed-size values | by offset |
//! | StringDictionary | string columns | table + indices |
//! | StructTable | bounded-cardinality structs | table + indices |
//! | ObjectStream | arbitrary objects | sequential |
//!
//! The strategy is a function of the element type's [`ValueShape`] and the
//! column length; callers never choose it.
//!
//! # Run format
//!
//! Spilled chunks and re-serialised columns share one format:
//!
//! ```text
//! [u8 tag][u64 count][payload]
//!   0x01 raw array      : count items
//!   0x02 string dict    : [u32 table_len][table items][count x u32 index]
//!   0x03 struct table   : same as string dict
//!   0x04 object stream  : count x ([u32 len][item bytes])
//! ```

use std::io::{Cursor, Read, Write};

use strata_common::io::{BinaryReadExt, BinaryWriteExt};
use strata_common::types::{ColumnElement, ValueShape};
use strata_common::utils::error::{Error, Result, StorageError};

use super::dictionary::{DictionaryBuilder, read_body};

/// Largest run we accept when decoding a count prefix.
const MAX_RUN_LEN: u64 = 1 << 40;

/// Upper bound on up-front allocation from an unverified count.
pub(crate) const MAX_PREALLOC: usize = 1 << 20;

/// Representation of a finished column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecStrategy {
    /// Array held in memory.
    InMemory,
    /// Raw fixed-size values in a re-seekable stream.
    RepeatableScan,
    /// Distinct-string table plus row indices.
    StringDictionary,
    /// Distinct-struct table plus row indices.
    StructTable,
    /// Length-prefixed object payloads in a stream.
    ObjectStream,
}

impl CodecStrategy {
    /// Returns a human-readable name for the strategy.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::InMemory => "InMemory",
            Self::RepeatableScan => "RepeatableScan",
            Self::StringDictionary => "StringDictionary",
            Self::StructTable => "StructTable",
            Self::ObjectStream => "ObjectStream",
        }
    }

    /// Selects the strategy for a column of `len` values of `shape`.
    #[must_use]
    pub fn select(shape: ValueShape, len: usize, in_memory_threshold: usize) -> Self {
        if len <= in_memory_threshold {
            return Self::InMemory;
        }
        match shape {
            ValueShape::Fixed => Self::RepeatableScan,
            ValueShape::String => Self::StringDictionary,
            ValueShape::Struct => Self::StructTable,
            ValueShape::Object => Self::ObjectStream,
        }
    }
}

/// Tag byte at the start of every encoded run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RunTag {
    /// Raw fixed-size items.
    RawArray = 0x01,
    /// String dictionary.
    StringDictionary = 0x02,
    /// Struct table.
    StructTable = 0x03,
    /// Object stream.
    ObjectStream = 0x04,
}

impl RunTag {
    /// Returns the tag written for values of `shape`.
    #[must_use]
    pub fn for_shape(shape: ValueShape) -> Self {
        match shape {
            ValueShape::Fixed => Self::RawArray,
            ValueShape::String => Self::StringDictionary,
            ValueShape::Struct => Self::StructTable,
            ValueShape::Object => Self::ObjectStream,
        }
    }

    /// Parses a tag byte.
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0x01 => Ok(Self::RawArray),
            0x02 => Ok(Self::StringDictionary),
            0x03 => Ok(Self::StructTable),
            0x04 => Ok(Self::ObjectStream),
            other => Err(StorageError::UnknownCodecTag(other).into()),
        }
    }

    /// Returns the tag byte.
    #[must_use]
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// Returns a human-readable name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::RawArray => "RawArray",
            Self::StringDictionary => "StringDictionary",
            Self::StructTable => "StructTable",
            Self::ObjectStream => "ObjectStream",
        }
    }
}

/// Writes one object payload with its length prefix.
pub(crate) fn write_object<T: ColumnElement, W: Write>(
    value: &T,
    scratch: &mut Vec<u8>,
    w: &mut W,
) -> Result<()> {
    scratch.clear();
    value.write_item(scratch)?;
    w.write_bytes_prefixed(scratch)
}

/// Reads one length-prefixed object payload.
///
/// The payload must decode to exactly one item.
pub(crate) fn read_object<T: ColumnElement, R: Read>(r: &mut R) -> Result<T> {
    let payload = r.read_bytes_prefixed()?;
    let mut cursor = Cursor::new(payload.as_slice());
    let value = T::read_item(&mut cursor)?;
    if cursor.position() as usize != payload.len() {
        return Err(Error::corruption(format!(
            "object payload has {} trailing bytes",
            payload.len() - cursor.position() as usize
        )));
    }
    Ok(value)
}

/// Skips one length-prefixed object payload without decoding it.
pub(crate) fn skip_object<R: Read>(r: &mut R) -> Result<()> {
    let len = u64::from(r.read_u32_le()?);
    let skipped = std::io::copy(&mut r.take(len), &mut std::io::sink())?;
    if skipped != len {
        return Err(Error::corruption("object payload truncated"));
    }
    Ok(())
}

/// Encodes `values` as one run using the codec for `T`'s shape.
pub fn encode_run<T: ColumnElement, W: Write>(values: &[T], w: &mut W) -> Result<()> {
    let tag = RunTag::for_shape(T::SHAPE);
    w.write_u8_val(tag.to_byte())?;
    w.write_u64_le(values.len() as u64)?;

    match tag {
        RunTag::RawArray => {
            for value in values {
                value.write_item(w)?;
            }
        }
        RunTag::StringDictionary | RunTag::StructTable => {
            let mut builder = DictionaryBuilder::with_capacity(0, values.len());
            for value in values {
                builder.push(value.clone())?;
            }
            let column = builder.finish();
            super::dictionary::write_body(column.table(), column.indices().iter().copied(), w)?;
        }
        RunTag::ObjectStream => {
            let mut scratch = Vec::new();
            for value in values {
                write_object(value, &mut scratch, w)?;
            }
        }
    }
    Ok(())
}

/// Reads a run header and checks it against `T`'s shape.
///
/// Returns the item count.
pub(crate) fn read_run_header<T: ColumnElement, R: Read>(r: &mut R) -> Result<usize> {
    let tag = RunTag::from_byte(r.read_u8_val()?)?;
    let expected = RunTag::for_shape(T::SHAPE);
    if tag != expected {
        return Err(StorageError::UnexpectedShape {
            expected: expected.name(),
            found: tag.name(),
        }
        .into());
    }

    let count = r.read_u64_le()?;
    if count > MAX_RUN_LEN {
        return Err(Error::corruption(format!("run length {count} too large")));
    }
    usize::try_from(count).map_err(|_| Error::corruption("run length overflows usize"))
}

/// Decodes one run written by [`encode_run`] or a column `write_to`.
pub fn decode_run<T: ColumnElement, R: Read>(r: &mut R) -> Result<Vec<T>> {
    let count = read_run_header::<T, R>(r)?;

    match RunTag::for_shape(T::SHAPE) {
        RunTag::RawArray => {
            let mut values = Vec::with_capacity(count.min(MAX_PREALLOC));
            for _ in 0..count {
                values.push(T::read_item(r)?);
            }
            Ok(values)
        }
        RunTag::StringDictionary | RunTag::StructTable => {
            let column = read_body::<T, R>(count, r)?;
            Ok(column.iter().collect())
        }
        RunTag::ObjectStream => {
            let mut values = Vec::with_capacity(count.min(MAX_PREALLOC));
            for _ in 0..count {
                values.push(read_object(r)?);
            }
            Ok(values)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use strata_common::types::{DenseTensor, IndexList, Value, WeightedIndexList};

    fn roundtrip<T: ColumnElement>(values: &[T]) -> Vec<T> {
        let mut buf = Vec::new();
        encode_run(values, &mut buf).unwrap();
        decode_run(&mut buf.as_slice()).unwrap()
    }

    #[test]
    fn test_strategy_selection() {
        assert_eq!(
            CodecStrategy::select(ValueShape::Fixed, 10, 10),
            CodecStrategy::InMemory
        );
        assert_eq!(
            CodecStrategy::select(ValueShape::Fixed, 11, 10),
            CodecStrategy::RepeatableScan
        );
        assert_eq!(
            CodecStrategy::select(ValueShape::String, 11, 10),
            CodecStrategy::StringDictionary
        );
        assert_eq!(
            CodecStrategy::select(ValueShape::Struct, 11, 10),
            CodecStrategy::StructTable
        );
        assert_eq!(
            CodecStrategy::select(ValueShape::Object, 11, 10),
            CodecStrategy::ObjectStream
        );
    }

    #[test]
    fn test_empty_and_single_runs() {
        assert!(roundtrip::<i64>(&[]).is_empty());
        assert!(roundtrip::<String>(&[]).is_empty());
        assert!(roundtrip::<Value>(&[]).is_empty());
        assert_eq!(roundtrip(&[7u16]), vec![7]);
        assert_eq!(roundtrip(&["only".to_string()]), vec!["only"]);
    }

    #[test]
    fn test_composite_runs() {
        let lists = vec![
            IndexList::new(vec![1]),
            IndexList::new(vec![]),
            IndexList::new(vec![1]),
        ];
        assert_eq!(roundtrip(&lists), lists);

        let weighted = vec![WeightedIndexList::new(vec![(2, 0.5)])];
        assert_eq!(roundtrip(&weighted), weighted);

        let tensors = vec![DenseTensor::new(vec![1.0, 2.0]), DenseTensor::new(vec![])];
        assert_eq!(roundtrip(&tensors), tensors);

        let values = vec![Value::from("x"), Value::Null, Value::from(3i64)];
        assert_eq!(roundtrip(&values), values);
    }

    #[test]
    fn test_unknown_tag() {
        let buf = vec![0x7f, 0, 0, 0, 0, 0, 0, 0, 0];
        let err = decode_run::<i32, _>(&mut buf.as_slice()).unwrap_err();
        assert!(matches!(
            err,
            Error::Storage(StorageError::UnknownCodecTag(0x7f))
        ));
    }

    #[test]
    fn test_shape_mismatch() {
        let mut buf = Vec::new();
        encode_run(&[1i32, 2], &mut buf).unwrap();
        let err = decode_run::<String, _>(&mut buf.as_slice()).unwrap_err();
        assert!(matches!(
            err,
            Error::Storage(StorageError::UnexpectedShape { .. })
        ));
    }

    #[test]
    fn test_truncated_run_is_error() {
        let mut buf = Vec::new();
        encode_run(&[1.0f64, 2.0, 3.0], &mut buf).unwrap();
        buf.truncate(buf.len() - 3);
        assert!(decode_run::<f64, _>(&mut buf.as_slice()).is_err());
    }

    #[test]
    fn test_object_trailing_bytes() {
        let mut buf = Vec::new();
        buf.write_u8_val(RunTag::ObjectStream.to_byte()).unwrap();
        buf.write_u64_le(1).unwrap();
        let mut payload = Vec::new();
        DenseTensor::new(vec![1.0]).write_item(&mut payload).unwrap();
        payload.push(0xAA);
        buf.write_bytes_prefixed(&payload).unwrap();

        let err = decode_run::<DenseTensor, _>(&mut buf.as_slice()).unwrap_err();
        assert!(err.is_corruption());
    }

    proptest! {
        #[test]
        fn prop_raw_roundtrip(values in proptest::collection::vec(any::<i64>(), 0..200)) {
            prop_assert_eq!(roundtrip(&values), values);
        }

        #[test]
        fn prop_float_roundtrip_bits(values in proptest::collection::vec(any::<f64>(), 0..200)) {
            let decoded = roundtrip(&values);
            let bits: Vec<u64> = decoded.iter().map(|v| v.to_bits()).collect();
            let expected: Vec<u64> = values.iter().map(|v| v.to_bits()).collect();
            prop_assert_eq!(bits, expected);
        }

        #[test]
        fn prop_string_roundtrip(values in proptest::collection::vec(".{0,12}", 0..100)) {
            prop_assert_eq!(roundtrip(&values), values);
        }

        #[test]
        fn prop_struct_roundtrip(
            values in proptest::collection::vec(proptest::collection::vec(0u32..8, 0..4), 0..100)
        ) {
            let lists: Vec<IndexList> = values.into_iter().map(IndexList::new).collect();
            prop_assert_eq!(roundtrip(&lists), lists);
        }

        #[test]
        fn prop_object_roundtrip(values in proptest::collection::vec(any::<Option<i64>>(), 0..100)) {
            let values: Vec<Value> = values
                .into_iter()
                .map(|v| v.map_or(Value::Null, Value::Int64))
                .collect();
            prop_assert_eq!(roundtrip(&values), values);
        }
    }
}
