//! Dictionary encoding for string and struct columns.
//!
//! A dictionary column is a table of distinct values plus one `u32` row
//! index per row. The table is append-only while encoding and frozen once
//! [`DictionaryBuilder::finish`] returns.

use std::io::{Read, Write};
use std::sync::Arc;

use strata_common::io::{BinaryReadExt, BinaryWriteExt};
use strata_common::types::ColumnElement;
use strata_common::utils::error::{CapacityError, Error, Result, StorageError};
use strata_common::utils::hash::FxHashMap;

use super::codec::{MAX_PREALLOC, RunTag};

/// Incremental dictionary encoder.
pub struct DictionaryBuilder<T: ColumnElement> {
    lookup: FxHashMap<T::Key, u32>,
    table: Vec<T>,
    indices: Vec<u32>,
}

impl<T: ColumnElement> DictionaryBuilder<T> {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(0, 0)
    }

    /// Creates a builder sized for `distinct` table entries and `rows` rows.
    #[must_use]
    pub fn with_capacity(distinct: usize, rows: usize) -> Self {
        Self {
            lookup: FxHashMap::with_capacity_and_hasher(distinct, ahash::RandomState::default()),
            table: Vec::with_capacity(distinct),
            indices: Vec::with_capacity(rows),
        }
    }

    /// Encodes one value and returns its table index.
    pub fn push(&mut self, value: T) -> Result<u32> {
        let key = value.distinct_key();
        if let Some(&index) = self.lookup.get(&key) {
            self.indices.push(index);
            return Ok(index);
        }

        let index = u32::try_from(self.table.len())
            .map_err(|_| Error::Internal("dictionary table exceeds u32 indices".to_string()))?;
        self.lookup.insert(key, index);
        self.table.push(value);
        self.indices.push(index);
        Ok(index)
    }

    /// Returns the number of distinct values so far.
    #[must_use]
    pub fn table_len(&self) -> usize {
        self.table.len()
    }

    /// Returns the number of encoded rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Returns true if no rows were encoded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Freezes the table.
    #[must_use]
    pub fn finish(self) -> DictionaryColumn<T> {
        DictionaryColumn {
            table: Arc::new(self.table),
            indices: Arc::new(self.indices),
        }
    }
}

impl<T: ColumnElement> Default for DictionaryBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A frozen dictionary-encoded column.
#[derive(Debug)]
pub struct DictionaryColumn<T: ColumnElement> {
    table: Arc<Vec<T>>,
    indices: Arc<Vec<u32>>,
}

impl<T: ColumnElement> Clone for DictionaryColumn<T> {
    fn clone(&self) -> Self {
        Self {
            table: Arc::clone(&self.table),
            indices: Arc::clone(&self.indices),
        }
    }
}

impl<T: ColumnElement> DictionaryColumn<T> {
    /// Returns the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Returns true if there are no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Returns the distinct-value table.
    #[must_use]
    pub fn table(&self) -> &[T] {
        &self.table
    }

    /// Returns the per-row table indices.
    #[must_use]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Returns the value of one row.
    pub fn get(&self, row: usize) -> Result<T> {
        let index = *self.indices.get(row).ok_or(CapacityError::SlotOutOfRange {
            slot: row,
            width: self.len(),
        })?;
        self.lookup(index)
    }

    fn lookup(&self, index: u32) -> Result<T> {
        self.table
            .get(index as usize)
            .cloned()
            .ok_or_else(|| {
                StorageError::IndexOutOfTable {
                    index,
                    len: self.table.len(),
                }
                .into()
            })
    }

    /// Returns `count` rows starting at `start`.
    pub fn range(&self, start: usize, count: usize) -> Result<Vec<T>> {
        let end = (start + count).min(self.len());
        let start = start.min(end);
        self.indices[start..end]
            .iter()
            .map(|&i| self.lookup(i))
            .collect()
    }

    /// Iterates over every row value.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        self.indices.iter().map(|&i| self.table[i as usize].clone())
    }

    /// Re-serialises the column as an encoded run.
    ///
    /// The table is written once, then the row indices are streamed; rows
    /// are never materialised.
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_u8_val(RunTag::for_shape(T::SHAPE).to_byte())?;
        w.write_u64_le(self.len() as u64)?;
        write_body(&self.table, self.indices.iter().copied(), w)
    }
}

/// Writes `[u32 table_len][table items][row indices]`.
pub(crate) fn write_body<T, W>(
    table: &[T],
    indices: impl Iterator<Item = u32>,
    w: &mut W,
) -> Result<()>
where
    T: ColumnElement,
    W: Write,
{
    let table_len = u32::try_from(table.len())
        .map_err(|_| Error::Internal("dictionary table exceeds u32 indices".to_string()))?;
    w.write_u32_le(table_len)?;
    for value in table {
        value.write_item(w)?;
    }
    for index in indices {
        w.write_u32_le(index)?;
    }
    Ok(())
}

/// Reads a body written by [`write_body`] for `count` rows.
///
/// Every row index is checked against the table length.
pub(crate) fn read_body<T, R>(count: usize, r: &mut R) -> Result<DictionaryColumn<T>>
where
    T: ColumnElement,
    R: Read,
{
    let table_len = r.read_u32_le()? as usize;
    if table_len > count || (table_len == 0 && count > 0) {
        return Err(Error::corruption(format!(
            "dictionary table of {table_len} entries for {count} rows"
        )));
    }

    let mut table = Vec::with_capacity(table_len.min(MAX_PREALLOC));
    for _ in 0..table_len {
        table.push(T::read_item(r)?);
    }

    let mut indices = Vec::with_capacity(count.min(MAX_PREALLOC));
    for _ in 0..count {
        let index = r.read_u32_le()?;
        if index as usize >= table_len {
            return Err(StorageError::IndexOutOfTable {
                index,
                len: table_len,
            }
            .into());
        }
        indices.push(index);
    }

    Ok(DictionaryColumn {
        table: Arc::new(table),
        indices: Arc::new(indices),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::codec::decode_run;
    use strata_common::types::IndexList;

    #[test]
    fn test_builder_dedups_in_first_seen_order() {
        let mut builder = DictionaryBuilder::new();
        for s in ["b", "a", "b", "c", "a"] {
            builder.push(s.to_string()).unwrap();
        }
        assert_eq!(builder.table_len(), 3);

        let column = builder.finish();
        assert_eq!(column.table(), ["b", "a", "c"]);
        assert_eq!(column.indices(), [0, 1, 0, 2, 1]);
        assert_eq!(column.get(3).unwrap(), "c");
        assert_eq!(column.range(1, 3).unwrap(), vec!["a", "b", "c"]);
        assert!(column.get(5).is_err());
    }

    #[test]
    fn test_write_to_decodes_as_run() {
        let mut builder = DictionaryBuilder::new();
        let rows = vec![
            IndexList::new(vec![1, 2]),
            IndexList::new(vec![3]),
            IndexList::new(vec![1, 2]),
        ];
        for row in rows.clone() {
            builder.push(row).unwrap();
        }
        let column = builder.finish();

        let mut buf = Vec::new();
        column.write_to(&mut buf).unwrap();
        let decoded: Vec<IndexList> = decode_run(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded, rows);
    }

    #[test]
    fn test_index_beyond_table_is_corruption() {
        let mut buf = Vec::new();
        write_body(&["x".to_string()], [0u32, 1].into_iter(), &mut buf).unwrap();

        let err = read_body::<String, _>(2, &mut buf.as_slice()).unwrap_err();
        assert!(matches!(
            err,
            Error::Storage(StorageError::IndexOutOfTable { index: 1, len: 1 })
        ));
    }

    #[test]
    fn test_huge_row_count_with_empty_table_is_corruption() {
        let mut buf = vec![RunTag::StringDictionary as u8];
        buf.extend_from_slice(&(1u64 << 39).to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());

        let err = decode_run::<String, _>(&mut buf.as_slice()).unwrap_err();
        assert!(matches!(err, Error::Storage(StorageError::Corruption(_))));
    }

    #[test]
    fn test_huge_row_count_with_short_body_fails() {
        let mut buf = vec![RunTag::StringDictionary as u8];
        buf.extend_from_slice(&(1u64 << 39).to_le_bytes());
        buf.extend_from_slice(&1u32.to_le_bytes());
        "x".to_string().write_item(&mut buf).unwrap();
        buf.extend_from_slice(&0u32.to_le_bytes());

        assert!(decode_run::<String, _>(&mut buf.as_slice()).is_err());
    }
}
