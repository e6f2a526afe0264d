//! Finished columns in one of the five codec strategies.
//!
//! [`EncodedColumn`] is the reader side: the same `len` / `read_range` /
//! `values` / `write_to` surface regardless of which strategy produced
//! the bytes. [`ColumnWriter`] is the writer side used at finalisation.

use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::sync::Arc;

use strata_common::io::BinaryWriteExt;
use strata_common::types::ColumnElement;
use strata_common::utils::error::{Error, Result};

use super::codec::{CodecStrategy, RunTag, read_object, skip_object, write_object};
use super::dictionary::{DictionaryBuilder, DictionaryColumn};
use super::temp::{SharedStream, TempStorage};

/// Bytes buffered by a writer before they are appended to its stream.
const WRITE_BUFFER_BYTES: usize = 64 * 1024;

/// Items decoded per step by [`EncodedColumn::values`].
const SCAN_BATCH: usize = 1024;

/// Raw fixed-size values at a known offset of a stream.
#[derive(Clone)]
pub struct ScanColumn {
    stream: SharedStream,
    start: u64,
    len: usize,
    width: usize,
}

/// Length-prefixed objects with periodic seek checkpoints.
#[derive(Clone)]
pub struct ObjectColumn {
    stream: SharedStream,
    len: usize,
    /// Items between checkpoints.
    interval: usize,
    /// Stream offset of item `i * interval`.
    checkpoints: Vec<u64>,
}

/// A finished, read-only column.
pub enum EncodedColumn<T: ColumnElement> {
    /// Values held in memory.
    InMemory(Arc<Vec<T>>),
    /// Raw fixed-size values, decoded per pass.
    RepeatableScan(ScanColumn, PhantomData<T>),
    /// String table plus row indices.
    StringDictionary(DictionaryColumn<T>),
    /// Struct table plus row indices.
    StructTable(DictionaryColumn<T>),
    /// Object payload stream.
    ObjectStream(ObjectColumn, PhantomData<T>),
}

impl<T: ColumnElement> Clone for EncodedColumn<T> {
    fn clone(&self) -> Self {
        match self {
            Self::InMemory(values) => Self::InMemory(Arc::clone(values)),
            Self::RepeatableScan(scan, _) => Self::RepeatableScan(scan.clone(), PhantomData),
            Self::StringDictionary(dict) => Self::StringDictionary(dict.clone()),
            Self::StructTable(dict) => Self::StructTable(dict.clone()),
            Self::ObjectStream(objects, _) => Self::ObjectStream(objects.clone(), PhantomData),
        }
    }
}

impl<T: ColumnElement> EncodedColumn<T> {
    /// Wraps values that are already in memory.
    pub fn from_values(values: Vec<T>) -> Self {
        Self::InMemory(Arc::new(values))
    }

    /// Returns the strategy that produced this column.
    #[must_use]
    pub fn strategy(&self) -> CodecStrategy {
        match self {
            Self::InMemory(_) => CodecStrategy::InMemory,
            Self::RepeatableScan(..) => CodecStrategy::RepeatableScan,
            Self::StringDictionary(_) => CodecStrategy::StringDictionary,
            Self::StructTable(_) => CodecStrategy::StructTable,
            Self::ObjectStream(..) => CodecStrategy::ObjectStream,
        }
    }

    /// Returns the number of values.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::InMemory(values) => values.len(),
            Self::RepeatableScan(scan, _) => scan.len,
            Self::StringDictionary(dict) | Self::StructTable(dict) => dict.len(),
            Self::ObjectStream(objects, _) => objects.len,
        }
    }

    /// Returns true if the column has no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the dictionary of a string or struct column.
    #[must_use]
    pub fn dictionary(&self) -> Option<&DictionaryColumn<T>> {
        match self {
            Self::StringDictionary(dict) | Self::StructTable(dict) => Some(dict),
            _ => None,
        }
    }

    /// Decodes up to `count` values starting at `start`.
    pub fn read_range(&self, start: usize, count: usize) -> Result<Vec<T>> {
        let end = start.saturating_add(count).min(self.len());
        if start >= end {
            return Ok(Vec::new());
        }
        let count = end - start;

        match self {
            Self::InMemory(values) => Ok(values[start..end].to_vec()),
            Self::StringDictionary(dict) | Self::StructTable(dict) => dict.range(start, count),
            Self::RepeatableScan(scan, _) => {
                let mut stream = scan.stream.lock();
                let offset = scan.start + (start * scan.width) as u64;
                stream.seek(SeekFrom::Start(offset))?;
                let mut reader = BufReader::new(&mut *stream).take((count * scan.width) as u64);
                let mut values = Vec::with_capacity(count);
                for _ in 0..count {
                    values.push(T::read_item(&mut reader)?);
                }
                Ok(values)
            }
            Self::ObjectStream(objects, _) => {
                let checkpoint = start / objects.interval;
                let offset = *objects.checkpoints.get(checkpoint).ok_or_else(|| {
                    Error::corruption(format!("missing object checkpoint {checkpoint}"))
                })?;

                let mut stream = objects.stream.lock();
                stream.seek(SeekFrom::Start(offset))?;
                let mut reader = BufReader::new(&mut *stream);
                for _ in checkpoint * objects.interval..start {
                    skip_object(&mut reader)?;
                }
                let mut values = Vec::with_capacity(count);
                for _ in 0..count {
                    values.push(read_object(&mut reader)?);
                }
                Ok(values)
            }
        }
    }

    /// Decodes every value.
    pub fn to_vec(&self) -> Result<Vec<T>> {
        self.read_range(0, self.len())
    }

    /// Lazily iterates over every value. Each call starts a new pass.
    pub fn values(&self) -> ColumnValues<'_, T> {
        ColumnValues {
            column: self,
            position: 0,
            batch: Vec::new().into_iter(),
            failed: false,
        }
    }

    /// Re-serialises the column as one encoded run.
    ///
    /// Dictionary columns stream their table once and then the indices;
    /// other strategies stream values batch by batch.
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        if let Some(dict) = self.dictionary() {
            return dict.write_to(w);
        }

        let tag = RunTag::for_shape(T::SHAPE);
        w.write_u8_val(tag.to_byte())?;
        w.write_u64_le(self.len() as u64)?;

        let mut scratch = Vec::new();
        let mut position = 0;
        while position < self.len() {
            let batch = self.read_range(position, SCAN_BATCH)?;
            position += batch.len();
            for value in &batch {
                if tag == RunTag::ObjectStream {
                    write_object(value, &mut scratch, w)?;
                } else {
                    value.write_item(w)?;
                }
            }
        }
        Ok(())
    }
}

/// Lazy pass over an [`EncodedColumn`].
pub struct ColumnValues<'a, T: ColumnElement> {
    column: &'a EncodedColumn<T>,
    position: usize,
    batch: std::vec::IntoIter<T>,
    failed: bool,
}

impl<T: ColumnElement> Iterator for ColumnValues<'_, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        if let Some(value) = self.batch.next() {
            return Some(Ok(value));
        }
        if self.position >= self.column.len() {
            return None;
        }

        match self.column.read_range(self.position, SCAN_BATCH) {
            Ok(batch) if batch.is_empty() => {
                self.failed = true;
                Some(Err(Error::corruption("column ended before its declared length")))
            }
            Ok(batch) => {
                self.position += batch.len();
                self.batch = batch.into_iter();
                self.batch.next().map(Ok)
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

enum WriterState<T: ColumnElement> {
    Memory(Vec<T>),
    Dictionary(DictionaryBuilder<T>),
    Stream {
        stream: SharedStream,
        start: u64,
        written: u64,
        pending: Vec<u8>,
        checkpoints: Vec<u64>,
        scratch: Vec<u8>,
    },
}

/// Builds an [`EncodedColumn`] one value at a time.
pub struct ColumnWriter<T: ColumnElement> {
    strategy: CodecStrategy,
    state: WriterState<T>,
    len: usize,
    checkpoint_interval: usize,
}

impl<T: ColumnElement> ColumnWriter<T> {
    /// Creates a writer for a column expected to hold `expected_len` values.
    ///
    /// Stream-backed strategies ask `storage` for `stream_id` exactly once.
    /// `checkpoint_interval` is the spacing of seek checkpoints in object
    /// streams, normally the block size.
    pub fn new(
        expected_len: usize,
        in_memory_threshold: usize,
        storage: &dyn TempStorage,
        stream_id: &str,
        checkpoint_interval: usize,
    ) -> Result<Self> {
        Self::with_stream_source(expected_len, in_memory_threshold, checkpoint_interval, || {
            storage.get_or_create(stream_id)
        })
    }

    /// Like [`new`](Self::new), but `open` supplies the stream. It is only
    /// called for stream-backed strategies, and the writer appends after
    /// whatever the stream already holds.
    pub fn with_stream_source(
        expected_len: usize,
        in_memory_threshold: usize,
        checkpoint_interval: usize,
        open: impl FnOnce() -> Result<SharedStream>,
    ) -> Result<Self> {
        let strategy = CodecStrategy::select(T::SHAPE, expected_len, in_memory_threshold);
        let state = match strategy {
            CodecStrategy::InMemory => WriterState::Memory(Vec::with_capacity(expected_len)),
            CodecStrategy::StringDictionary | CodecStrategy::StructTable => {
                WriterState::Dictionary(DictionaryBuilder::with_capacity(0, expected_len))
            }
            CodecStrategy::RepeatableScan | CodecStrategy::ObjectStream => {
                let stream = open()?;
                let start = stream.lock().seek(SeekFrom::End(0))?;
                WriterState::Stream {
                    stream,
                    start,
                    written: 0,
                    pending: Vec::with_capacity(WRITE_BUFFER_BYTES),
                    checkpoints: Vec::new(),
                    scratch: Vec::new(),
                }
            }
        };

        Ok(Self {
            strategy,
            state,
            len: 0,
            checkpoint_interval: checkpoint_interval.max(1),
        })
    }

    /// Returns the strategy this writer encodes with.
    #[must_use]
    pub fn strategy(&self) -> CodecStrategy {
        self.strategy
    }

    /// Appends one value.
    pub fn push(&mut self, value: T) -> Result<()> {
        let index = self.len;
        self.len += 1;

        match &mut self.state {
            WriterState::Memory(values) => values.push(value),
            WriterState::Dictionary(builder) => {
                builder.push(value)?;
            }
            WriterState::Stream {
                stream,
                start,
                written,
                pending,
                checkpoints,
                scratch,
            } => {
                let before = pending.len();
                if self.strategy == CodecStrategy::ObjectStream {
                    if index % self.checkpoint_interval == 0 {
                        checkpoints.push(*start + *written + before as u64);
                    }
                    write_object(&value, scratch, pending)?;
                } else {
                    value.write_item(pending)?;
                }

                if pending.len() >= WRITE_BUFFER_BYTES {
                    *written += flush_pending(stream, *start + *written, pending)?;
                }
            }
        }
        Ok(())
    }

    /// Finishes the column.
    pub fn finish(self) -> Result<EncodedColumn<T>> {
        let len = self.len;
        let column = match self.state {
            WriterState::Memory(values) => EncodedColumn::InMemory(Arc::new(values)),
            WriterState::Dictionary(builder) => {
                if self.strategy == CodecStrategy::StringDictionary {
                    EncodedColumn::StringDictionary(builder.finish())
                } else {
                    EncodedColumn::StructTable(builder.finish())
                }
            }
            WriterState::Stream {
                stream,
                start,
                written,
                mut pending,
                checkpoints,
                ..
            } => {
                flush_pending(&stream, start + written, &mut pending)?;
                stream.lock().flush()?;
                if self.strategy == CodecStrategy::ObjectStream {
                    EncodedColumn::ObjectStream(
                        ObjectColumn {
                            stream,
                            len,
                            interval: self.checkpoint_interval,
                            checkpoints,
                        },
                        PhantomData,
                    )
                } else {
                    let width = T::FIXED_WIDTH.ok_or_else(|| {
                        Error::Internal("repeatable scan needs a fixed-width type".to_string())
                    })?;
                    EncodedColumn::RepeatableScan(
                        ScanColumn {
                            stream,
                            start,
                            len,
                            width,
                        },
                        PhantomData,
                    )
                }
            }
        };

        tracing::debug!(
            strategy = column.strategy().name(),
            rows = len,
            "column encoded"
        );
        Ok(column)
    }
}

/// Writes `pending` at `offset` and clears it. Returns the bytes written.
fn flush_pending(stream: &SharedStream, offset: u64, pending: &mut Vec<u8>) -> Result<u64> {
    if pending.is_empty() {
        return Ok(0);
    }
    let mut guard = stream.lock();
    guard.seek(SeekFrom::Start(offset))?;
    guard.write_all(pending)?;
    let n = pending.len() as u64;
    pending.clear();
    Ok(n)
}

impl<T: ColumnElement> std::fmt::Debug for EncodedColumn<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodedColumn")
            .field("strategy", &self.strategy())
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::codec::decode_run;
    use crate::storage::temp::{FileTempStorage, MemoryTempStorage};
    use strata_common::types::{IndexList, Value};

    fn write_column<T: ColumnElement>(
        values: &[T],
        threshold: usize,
        storage: &dyn TempStorage,
    ) -> EncodedColumn<T> {
        let mut writer = ColumnWriter::new(values.len(), threshold, storage, "col", 4).unwrap();
        for v in values {
            writer.push(v.clone()).unwrap();
        }
        writer.finish().unwrap()
    }

    #[test]
    fn test_in_memory_below_threshold() {
        let storage = MemoryTempStorage::new();
        let column = write_column(&[1i32, 2, 3], 3, &storage);
        assert_eq!(column.strategy(), CodecStrategy::InMemory);
        assert_eq!(column.to_vec().unwrap(), vec![1, 2, 3]);
        assert_eq!(storage.stream_count(), 0);
    }

    #[test]
    fn test_repeatable_scan_random_ranges() {
        let storage = FileTempStorage::new().unwrap();
        let values: Vec<f64> = (0..100).map(|i| i as f64 * 0.5).collect();
        let column = write_column(&values, 10, &storage);

        assert_eq!(column.strategy(), CodecStrategy::RepeatableScan);
        assert_eq!(column.read_range(40, 5).unwrap(), values[40..45].to_vec());
        assert_eq!(column.read_range(98, 10).unwrap(), values[98..].to_vec());
        assert!(column.read_range(100, 1).unwrap().is_empty());

        // Two full passes see the same data.
        let first: Vec<f64> = column.values().map(Result::unwrap).collect();
        let second: Vec<f64> = column.values().map(Result::unwrap).collect();
        assert_eq!(first, values);
        assert_eq!(second, values);
    }

    #[test]
    fn test_string_dictionary() {
        let storage = MemoryTempStorage::new();
        let values: Vec<String> = (0..50).map(|i| format!("v{}", i % 3)).collect();
        let column = write_column(&values, 10, &storage);

        assert_eq!(column.strategy(), CodecStrategy::StringDictionary);
        assert_eq!(column.dictionary().unwrap().table().len(), 3);
        assert_eq!(column.to_vec().unwrap(), values);
    }

    #[test]
    fn test_struct_table() {
        let storage = MemoryTempStorage::new();
        let values: Vec<IndexList> = (0..20).map(|i| IndexList::new(vec![i % 2])).collect();
        let column = write_column(&values, 5, &storage);
        assert_eq!(column.strategy(), CodecStrategy::StructTable);
        assert_eq!(column.read_range(3, 4).unwrap(), values[3..7].to_vec());
    }

    #[test]
    fn test_object_stream_checkpoints() {
        let storage = MemoryTempStorage::new();
        let values: Vec<Value> = (0..23).map(|i| Value::from(format!("obj-{i}"))).collect();
        let column = write_column(&values, 5, &storage);

        assert_eq!(column.strategy(), CodecStrategy::ObjectStream);
        // Spans checkpoint 2 (items 8..12) into checkpoint 3.
        assert_eq!(column.read_range(9, 5).unwrap(), values[9..14].to_vec());
        assert_eq!(column.to_vec().unwrap(), values);
    }

    #[test]
    fn test_write_to_roundtrips_every_strategy() {
        let storage = MemoryTempStorage::new();

        let ints: Vec<u32> = (0..30).collect();
        let strings: Vec<String> = (0..30).map(|i| (i % 4).to_string()).collect();
        let objects: Vec<Value> = (0..30).map(|i| Value::Int64(i)).collect();

        for threshold in [0, 100] {
            let column = write_column(&ints, threshold, &storage);
            let mut buf = Vec::new();
            column.write_to(&mut buf).unwrap();
            assert_eq!(decode_run::<u32, _>(&mut buf.as_slice()).unwrap(), ints);

            let column = write_column(&strings, threshold, &storage);
            let mut buf = Vec::new();
            column.write_to(&mut buf).unwrap();
            assert_eq!(decode_run::<String, _>(&mut buf.as_slice()).unwrap(), strings);

            let column = write_column(&objects, threshold, &storage);
            let mut buf = Vec::new();
            column.write_to(&mut buf).unwrap();
            assert_eq!(decode_run::<Value, _>(&mut buf.as_slice()).unwrap(), objects);
        }
    }

    #[test]
    fn test_empty_column() {
        let storage = MemoryTempStorage::new();
        let column = write_column::<String>(&[], 0, &storage);
        assert!(column.is_empty());
        assert_eq!(column.values().count(), 0);
    }
}
