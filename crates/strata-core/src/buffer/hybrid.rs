//! Append-only column buffer that spills to temporary storage.
//!
//! ```text
//!   append ──► resident (≤ cap) ──flush──► temp stream
//!                                          [len][crc32][run] [len][crc32][run] ...
//!
//!   values(): chunk 0, chunk 1, ..., chunk n-1, resident tail
//! ```
//!
//! Each spilled chunk is one encoded run framed with its byte length and
//! CRC32. Chunks are replayed in write order before the resident items, so
//! callers always see insertion order.

use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::{BufMut, BytesMut};
use strata_common::io::{BinaryReadExt, BinaryWriteExt};
use strata_common::types::ColumnElement;
use strata_common::utils::error::{Error, Result, StorageError};

use super::block::EncodedBlockBuffer;
use super::distinct::DistinctTracker;
use crate::config::BufferConfig;
use crate::storage::codec::{decode_run, encode_run};
use crate::storage::encoded::{ColumnWriter, EncodedColumn};
use crate::storage::temp::{MemoryTempStorage, SharedStream, TempStorage};

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// Location of one spilled chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ChunkRef {
    /// Stream offset of the frame header.
    offset: u64,
    /// Payload bytes.
    len: u32,
    /// Items in the chunk.
    count: usize,
}

/// Append-only typed column with transparent spilling.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use strata_core::BufferConfig;
/// use strata_core::buffer::HybridBuffer;
/// use strata_core::storage::MemoryTempStorage;
///
/// let config = BufferConfig::default().with_in_memory_cap(2);
/// let mut buffer = HybridBuffer::new(config, Arc::new(MemoryTempStorage::new())).unwrap();
/// for v in [1i64, 2, 3, 4, 5] {
///     buffer.append(v).unwrap();
/// }
/// assert_eq!(buffer.spilled_chunks(), 2);
/// let values: Vec<i64> = buffer.values().collect::<Result<_, _>>().unwrap();
/// assert_eq!(values, vec![1, 2, 3, 4, 5]);
/// ```
pub struct HybridBuffer<T: ColumnElement> {
    id: String,
    config: BufferConfig,
    storage: Arc<dyn TempStorage>,
    /// Requested from `storage` on first use, then kept.
    stream: Option<SharedStream>,
    resident: Vec<T>,
    chunks: Vec<ChunkRef>,
    spilled: usize,
    distinct: DistinctTracker<T::Key>,
}

impl<T: ColumnElement> HybridBuffer<T> {
    /// Creates an empty buffer with a generated id.
    pub fn new(config: BufferConfig, storage: Arc<dyn TempStorage>) -> Result<Self> {
        let id = format!("hybrid-{}", NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed));
        Self::with_id(id, config, storage)
    }

    /// Creates an empty buffer whose temp stream is named `id`.
    pub fn with_id(
        id: impl Into<String>,
        config: BufferConfig,
        storage: Arc<dyn TempStorage>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            id: id.into(),
            resident: Vec::with_capacity(config.in_memory_cap.min(4096)),
            distinct: DistinctTracker::new(config.distinct_cap),
            config,
            storage,
            stream: None,
            chunks: Vec::new(),
            spilled: 0,
        })
    }

    /// Creates a buffer backed by in-process temporary storage.
    pub fn in_memory(config: BufferConfig) -> Result<Self> {
        Self::new(config, Arc::new(MemoryTempStorage::new()))
    }

    /// Returns the buffer id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &BufferConfig {
        &self.config
    }

    /// Returns the total number of items ever appended.
    #[must_use]
    pub fn len(&self) -> usize {
        self.spilled + self.resident.len()
    }

    /// Returns true if nothing was appended.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of items currently in memory.
    #[must_use]
    pub fn resident_len(&self) -> usize {
        self.resident.len()
    }

    /// Returns the number of chunks written to temporary storage.
    #[must_use]
    pub fn spilled_chunks(&self) -> usize {
        self.chunks.len()
    }

    /// Returns the exact distinct count, or `None` once tracking was
    /// abandoned.
    #[must_use]
    pub fn distinct_count(&self) -> Option<usize> {
        self.distinct.count()
    }

    /// Returns the distinct tracker.
    pub fn distinct(&self) -> &DistinctTracker<T::Key> {
        &self.distinct
    }

    /// Appends one value, spilling the resident chunk first if it is full.
    pub fn append(&mut self, value: T) -> Result<()> {
        if self.resident.len() >= self.config.in_memory_cap {
            self.flush()?;
        }
        self.distinct.offer(value.distinct_key());
        self.resident.push(value);
        Ok(())
    }

    /// Appends every value of `values`.
    pub fn extend<I: IntoIterator<Item = T>>(&mut self, values: I) -> Result<()> {
        for value in values {
            self.append(value)?;
        }
        Ok(())
    }

    fn stream(&mut self) -> Result<SharedStream> {
        if let Some(stream) = &self.stream {
            return Ok(Arc::clone(stream));
        }
        let stream = self.storage.get_or_create(&self.id)?;
        self.stream = Some(Arc::clone(&stream));
        Ok(stream)
    }

    /// Encodes the resident items as one chunk and appends it to the
    /// temp stream.
    fn flush(&mut self) -> Result<()> {
        if self.resident.is_empty() {
            return Ok(());
        }

        let mut writer = BytesMut::with_capacity(self.resident.len() * 8).writer();
        encode_run(&self.resident, &mut writer)?;
        let payload = writer.into_inner().freeze();
        let len = u32::try_from(payload.len())
            .map_err(|_| Error::Internal("spill chunk exceeds 4 GiB".to_string()))?;
        let crc = crc32fast::hash(&payload);

        let stream = self.stream()?;
        let offset = {
            let mut guard = stream.lock();
            let out = &mut **guard;
            let offset = out.seek(SeekFrom::End(0))?;
            out.write_u32_le(len)?;
            out.write_u32_le(crc)?;
            out.write_all(&payload)?;
            out.flush()?;
            offset
        };

        let count = self.resident.len();
        self.chunks.push(ChunkRef { offset, len, count });
        self.spilled += count;
        self.resident.clear();

        tracing::debug!(
            buffer = %self.id,
            chunk = self.chunks.len() - 1,
            rows = count,
            bytes = len,
            "spilled chunk"
        );
        Ok(())
    }

    fn read_chunk(&self, index: usize) -> Result<Vec<T>> {
        let chunk = self.chunks[index];
        let stream = self
            .stream
            .as_ref()
            .ok_or_else(|| Error::Internal("spilled chunk without a stream".to_string()))?;

        let payload = {
            let mut guard = stream.lock();
            let input = &mut **guard;
            input.seek(SeekFrom::Start(chunk.offset))?;
            let len = input.read_u32_le()?;
            let crc = input.read_u32_le()?;
            if len != chunk.len {
                return Err(Error::corruption(format!(
                    "chunk {index} frame length {len}, expected {}",
                    chunk.len
                )));
            }
            let mut payload = vec![0u8; len as usize];
            input.read_exact(&mut payload)?;
            if self.config.verify_checksums && crc32fast::hash(&payload) != crc {
                return Err(StorageError::ChecksumMismatch { chunk: index }.into());
            }
            payload
        };

        let values = decode_run::<T, _>(&mut payload.as_slice())?;
        if values.len() != chunk.count {
            return Err(Error::corruption(format!(
                "chunk {index} decoded {} items, expected {}",
                values.len(),
                chunk.count
            )));
        }
        Ok(values)
    }

    /// Lazily iterates every appended value in insertion order.
    ///
    /// Spilled chunks are decoded one at a time. Each call starts a new
    /// pass.
    pub fn values(&self) -> HybridValues<'_, T> {
        HybridValues {
            buffer: self,
            next_chunk: 0,
            current: Vec::new().into_iter(),
            resident: self.resident.iter(),
            failed: false,
        }
    }

    /// Copies the buffer into its finished encoded form.
    ///
    /// The encoding strategy is chosen from the element shape and the total
    /// length. Stream-backed strategies append to this buffer's own temp
    /// stream.
    pub fn finish(mut self) -> Result<EncodedColumn<T>> {
        let len = self.len();
        let mut writer = ColumnWriter::with_stream_source(
            len,
            self.config.in_memory_threshold,
            self.config.block_size,
            || self.stream(),
        )?;
        for value in self.values() {
            writer.push(value?)?;
        }
        let column = writer.finish()?;

        tracing::info!(
            buffer = %self.id,
            rows = len,
            chunks = self.chunks.len(),
            strategy = column.strategy().name(),
            distinct = ?self.distinct.count(),
            "buffer finalised"
        );
        Ok(column)
    }

    /// Finishes the buffer into a block buffer using the configured block
    /// size.
    pub fn into_block_buffer(self) -> Result<EncodedBlockBuffer<T>> {
        let block_size = self.config.block_size;
        EncodedBlockBuffer::new(self.finish()?, block_size)
    }
}

impl<T: ColumnElement> std::fmt::Debug for HybridBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridBuffer")
            .field("id", &self.id)
            .field("len", &self.len())
            .field("resident", &self.resident.len())
            .field("chunks", &self.chunks.len())
            .field("distinct", &self.distinct.count())
            .finish()
    }
}

/// One pass over a [`HybridBuffer`].
pub struct HybridValues<'a, T: ColumnElement> {
    buffer: &'a HybridBuffer<T>,
    next_chunk: usize,
    current: std::vec::IntoIter<T>,
    resident: std::slice::Iter<'a, T>,
    failed: bool,
}

impl<T: ColumnElement> Iterator for HybridValues<'_, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            if let Some(value) = self.current.next() {
                return Some(Ok(value));
            }
            if self.next_chunk >= self.buffer.chunks.len() {
                return self.resident.next().cloned().map(Ok);
            }

            match self.buffer.read_chunk(self.next_chunk) {
                Ok(values) => {
                    self.next_chunk += 1;
                    self.current = values.into_iter();
                }
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
