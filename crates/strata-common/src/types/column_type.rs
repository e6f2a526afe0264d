//! Column type tags and value shapes.

use serde::{Deserialize, Serialize};

/// Declared element type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ColumnType {
    /// Boolean.
    Bool = 0,
    /// Signed 8-bit integer.
    Int8 = 1,
    /// Signed 16-bit integer.
    Int16 = 2,
    /// Signed 32-bit integer.
    Int32 = 3,
    /// Signed 64-bit integer.
    Int64 = 4,
    /// Unsigned 8-bit integer.
    UInt8 = 5,
    /// Unsigned 16-bit integer.
    UInt16 = 6,
    /// Unsigned 32-bit integer.
    UInt32 = 7,
    /// Unsigned 64-bit integer.
    UInt64 = 8,
    /// 32-bit float.
    Float32 = 9,
    /// 64-bit float.
    Float64 = 10,
    /// UTF-8 string.
    String = 11,
    /// List of slot indices.
    IndexList = 12,
    /// List of (slot, weight) pairs.
    WeightedIndexList = 13,
    /// Dense f32 tensor.
    Tensor = 14,
    /// Tagged heterogeneous value.
    Value = 15,
}

impl ColumnType {
    /// Returns the wire tag for this type.
    #[must_use]
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Parses a wire tag.
    #[must_use]
    pub fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => Self::Bool,
            1 => Self::Int8,
            2 => Self::Int16,
            3 => Self::Int32,
            4 => Self::Int64,
            5 => Self::UInt8,
            6 => Self::UInt16,
            7 => Self::UInt32,
            8 => Self::UInt64,
            9 => Self::Float32,
            10 => Self::Float64,
            11 => Self::String,
            12 => Self::IndexList,
            13 => Self::WeightedIndexList,
            14 => Self::Tensor,
            15 => Self::Value,
            _ => return None,
        })
    }

    /// Returns a human-readable name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Bool => "Bool",
            Self::Int8 => "Int8",
            Self::Int16 => "Int16",
            Self::Int32 => "Int32",
            Self::Int64 => "Int64",
            Self::UInt8 => "UInt8",
            Self::UInt16 => "UInt16",
            Self::UInt32 => "UInt32",
            Self::UInt64 => "UInt64",
            Self::Float32 => "Float32",
            Self::Float64 => "Float64",
            Self::String => "String",
            Self::IndexList => "IndexList",
            Self::WeightedIndexList => "WeightedIndexList",
            Self::Tensor => "Tensor",
            Self::Value => "Value",
        }
    }

    /// Returns true for integer and float types.
    #[must_use]
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            Self::Int8
                | Self::Int16
                | Self::Int32
                | Self::Int64
                | Self::UInt8
                | Self::UInt16
                | Self::UInt32
                | Self::UInt64
                | Self::Float32
                | Self::Float64
        )
    }
}

/// Data shape of an element type. Selects the block codec.
///
/// | Shape | Codec |
/// |-------|-------|
/// | Fixed | raw fixed-size values |
/// | String | string dictionary |
/// | Struct | distinct-struct table + row indices |
/// | Object | length-prefixed object stream |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueShape {
    /// Fixed-size primitive.
    Fixed,
    /// Variable-length text.
    String,
    /// Bounded-cardinality composite.
    Struct,
    /// Arbitrary serialisable object.
    Object,
}

impl ValueShape {
    /// Returns a human-readable name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Fixed => "Fixed",
            Self::String => "String",
            Self::Struct => "Struct",
            Self::Object => "Object",
        }
    }
}
