//! Composite column values.

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use super::{ColumnElement, ColumnType, ValueShape};
use crate::io::{BinaryReadExt, BinaryWriteExt};
use crate::utils::error::{Error, Result};

/// Largest list we decode before calling the length prefix corrupt.
const MAX_LIST_LEN: usize = 1 << 26;

fn read_len<R: Read>(r: &mut R) -> Result<usize> {
    let len = r.read_u32_le()? as usize;
    if len > MAX_LIST_LEN {
        return Err(Error::corruption(format!("list length {len} too large")));
    }
    Ok(len)
}

fn write_len<W: Write>(w: &mut W, len: usize) -> Result<()> {
    let len = u32::try_from(len).map_err(|_| Error::Internal(format!("list too long: {len}")))?;
    w.write_u32_le(len)
}

/// Sparse set of active slots, e.g. the tokens of a bag-of-words row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct IndexList {
    /// Active slot indices.
    pub indices: Vec<u32>,
}

impl IndexList {
    /// Creates a list from slot indices.
    pub fn new(indices: impl Into<Vec<u32>>) -> Self {
        Self {
            indices: indices.into(),
        }
    }
}

impl ColumnElement for IndexList {
    type Key = Self;

    const SHAPE: ValueShape = ValueShape::Struct;
    const COLUMN_TYPE: ColumnType = ColumnType::IndexList;

    fn distinct_key(&self) -> Self {
        self.clone()
    }

    fn write_item<W: Write>(&self, w: &mut W) -> Result<()> {
        write_len(w, self.indices.len())?;
        for &i in &self.indices {
            w.write_u32_le(i)?;
        }
        Ok(())
    }

    fn read_item<R: Read>(r: &mut R) -> Result<Self> {
        let len = read_len(r)?;
        let mut indices = Vec::with_capacity(len);
        for _ in 0..len {
            indices.push(r.read_u32_le()?);
        }
        Ok(Self { indices })
    }
}

/// Sparse slots with weights.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WeightedIndexList {
    /// `(slot, weight)` pairs.
    pub entries: Vec<(u32, f32)>,
}

impl WeightedIndexList {
    /// Creates a list from `(slot, weight)` pairs.
    pub fn new(entries: impl Into<Vec<(u32, f32)>>) -> Self {
        Self {
            entries: entries.into(),
        }
    }
}

impl ColumnElement for WeightedIndexList {
    type Key = Vec<(u32, u32)>;

    const SHAPE: ValueShape = ValueShape::Struct;
    const COLUMN_TYPE: ColumnType = ColumnType::WeightedIndexList;

    fn distinct_key(&self) -> Self::Key {
        self.entries.iter().map(|&(i, w)| (i, w.to_bits())).collect()
    }

    fn write_item<W: Write>(&self, w: &mut W) -> Result<()> {
        write_len(w, self.entries.len())?;
        for &(i, weight) in &self.entries {
            w.write_u32_le(i)?;
            w.write_f32_le(weight)?;
        }
        Ok(())
    }

    fn read_item<R: Read>(r: &mut R) -> Result<Self> {
        let len = read_len(r)?;
        let mut entries = Vec::with_capacity(len);
        for _ in 0..len {
            let i = r.read_u32_le()?;
            let weight = r.read_f32_le()?;
            entries.push((i, weight));
        }
        Ok(Self { entries })
    }
}

/// Already-dense numeric row.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DenseTensor {
    /// Row values in slot order.
    pub values: Vec<f32>,
}

impl DenseTensor {
    /// Wraps dense values.
    pub fn new(values: impl Into<Vec<f32>>) -> Self {
        Self {
            values: values.into(),
        }
    }
}

impl ColumnElement for DenseTensor {
    type Key = Vec<u32>;

    const SHAPE: ValueShape = ValueShape::Object;
    const COLUMN_TYPE: ColumnType = ColumnType::Tensor;

    fn distinct_key(&self) -> Vec<u32> {
        self.values.iter().map(|v| v.to_bits()).collect()
    }

    fn write_item<W: Write>(&self, w: &mut W) -> Result<()> {
        write_len(w, self.values.len())?;
        for &v in &self.values {
            w.write_f32_le(v)?;
        }
        Ok(())
    }

    fn read_item<R: Read>(r: &mut R) -> Result<Self> {
        let len = read_len(r)?;
        let mut values = Vec::with_capacity(len);
        for _ in 0..len {
            values.push(r.read_f32_le()?);
        }
        Ok(Self { values })
    }
}

/// A tagged value for columns whose element type is only known at runtime.
///
/// Every supported column type maps to one variant, so dispatch is a
/// `match` rather than a runtime type check.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Value {
    /// Missing value.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Any integer, widened.
    Int64(i64),
    /// Any float, widened.
    Float64(f64),
    /// Text.
    String(String),
    /// Slot indices.
    IndexList(IndexList),
    /// Weighted slot indices.
    WeightedIndexList(WeightedIndexList),
    /// Dense tensor.
    Tensor(DenseTensor),
}

/// Hashable identity of a [`Value`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueKey {
    /// Null.
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int64(i64),
    /// Float bit pattern.
    Float64(u64),
    /// Text.
    String(String),
    /// Slot indices.
    IndexList(Vec<u32>),
    /// Slot and weight bit pattern pairs.
    WeightedIndexList(Vec<(u32, u32)>),
    /// Tensor bit patterns.
    Tensor(Vec<u32>),
}

impl Value {
    /// Returns the variant name.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "Null",
            Self::Bool(_) => "Bool",
            Self::Int64(_) => "Int64",
            Self::Float64(_) => "Float64",
            Self::String(_) => "String",
            Self::IndexList(_) => "IndexList",
            Self::WeightedIndexList(_) => "WeightedIndexList",
            Self::Tensor(_) => "Tensor",
        }
    }

    /// Returns the numeric reading of scalar values.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Int64(i) => Some(*i as f64),
            Self::Float64(f) => Some(*f),
            _ => None,
        }
    }

    /// Returns the string payload, if any.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl ColumnElement for Value {
    type Key = ValueKey;

    const SHAPE: ValueShape = ValueShape::Object;
    const COLUMN_TYPE: ColumnType = ColumnType::Value;

    fn distinct_key(&self) -> ValueKey {
        match self {
            Self::Null => ValueKey::Null,
            Self::Bool(b) => ValueKey::Bool(*b),
            Self::Int64(i) => ValueKey::Int64(*i),
            Self::Float64(f) => ValueKey::Float64(f.to_bits()),
            Self::String(s) => ValueKey::String(s.clone()),
            Self::IndexList(l) => ValueKey::IndexList(l.indices.clone()),
            Self::WeightedIndexList(l) => ValueKey::WeightedIndexList(l.distinct_key()),
            Self::Tensor(t) => ValueKey::Tensor(t.distinct_key()),
        }
    }

    fn write_item<W: Write>(&self, w: &mut W) -> Result<()> {
        bincode::serde::encode_into_std_write(self, w, bincode::config::standard())
            .map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(())
    }

    fn read_item<R: Read>(r: &mut R) -> Result<Self> {
        bincode::serde::decode_from_std_read(r, bincode::config::standard())
            .map_err(|e| Error::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn roundtrip<T: ColumnElement>(value: &T) -> T {
        let mut buf = Vec::new();
        value.write_item(&mut buf).unwrap();
        T::read_item(&mut Cursor::new(buf)).unwrap()
    }

    #[test]
    fn test_index_lists() {
        let list = IndexList::new(vec![3, 1, 4]);
        assert_eq!(roundtrip(&list), list);

        let weighted = WeightedIndexList::new(vec![(0, 0.5), (9, -2.0)]);
        assert_eq!(roundtrip(&weighted), weighted);
        assert_eq!(IndexList::SHAPE, ValueShape::Struct);
    }

    #[test]
    fn test_value_variants() {
        let values = vec![
            Value::Null,
            Value::from(true),
            Value::from(-42i64),
            Value::from(2.5f64),
            Value::from("text"),
            Value::IndexList(IndexList::new(vec![1, 2])),
            Value::Tensor(DenseTensor::new(vec![0.0, 1.0])),
        ];
        for value in &values {
            assert_eq!(&roundtrip(value), value);
        }
    }

    #[test]
    fn test_value_keys_distinguish_variants() {
        assert_ne!(
            Value::Int64(1).distinct_key(),
            Value::Float64(1.0).distinct_key()
        );
        assert_eq!(Value::from("a").distinct_key(), Value::from("a").distinct_key());
    }

    #[test]
    fn test_huge_list_prefix_is_corruption() {
        let mut buf = Vec::new();
        buf.write_u32_le(u32::MAX).unwrap();
        let err = IndexList::read_item(&mut Cursor::new(buf)).unwrap_err();
        assert!(err.is_corruption());
    }
}
