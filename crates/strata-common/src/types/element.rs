//! How Rust types are stored in columns.

use std::fmt::Debug;
use std::hash::Hash;
use std::io::{Read, Write};

use super::{ColumnType, ValueShape};
use crate::io::{BinaryReadExt, BinaryWriteExt};
use crate::utils::error::Result;

/// A type that can live in a column.
///
/// The shape is fixed per type, so codec selection never depends on the
/// caller. `Key` is the hashable identity used for distinct tracking and
/// dictionary tables; floats use their bit pattern.
pub trait ColumnElement: Clone + PartialEq + Debug + Send + Sync + 'static {
    /// Hashable identity of a value.
    type Key: Eq + Hash + Clone + Send + Sync + 'static;

    /// Storage shape of this type.
    const SHAPE: ValueShape;

    /// Declared column type.
    const COLUMN_TYPE: ColumnType;

    /// Encoded size in bytes for fixed-shape types.
    const FIXED_WIDTH: Option<usize> = None;

    /// Returns the distinct-value key.
    fn distinct_key(&self) -> Self::Key;

    /// Writes one item.
    fn write_item<W: Write>(&self, w: &mut W) -> Result<()>;

    /// Reads one item.
    fn read_item<R: Read>(r: &mut R) -> Result<Self>;
}

/// Column elements with a numeric reading.
pub trait NumericElement: ColumnElement {
    /// Returns the value as `f64`.
    fn to_f64(&self) -> f64;
}

macro_rules! fixed_element {
    ($ty:ty, $column_type:ident, $key:ty, |$v:ident| $key_expr:expr) => {
        impl ColumnElement for $ty {
            type Key = $key;

            const SHAPE: ValueShape = ValueShape::Fixed;
            const COLUMN_TYPE: ColumnType = ColumnType::$column_type;
            const FIXED_WIDTH: Option<usize> = Some(std::mem::size_of::<$ty>());

            fn distinct_key(&self) -> Self::Key {
                let $v = *self;
                $key_expr
            }

            fn write_item<W: Write>(&self, w: &mut W) -> Result<()> {
                w.write_all(&self.to_le_bytes())?;
                Ok(())
            }

            fn read_item<R: Read>(r: &mut R) -> Result<Self> {
                let mut bytes = [0u8; std::mem::size_of::<$ty>()];
                r.read_exact(&mut bytes)?;
                Ok(<$ty>::from_le_bytes(bytes))
            }
        }

        impl NumericElement for $ty {
            fn to_f64(&self) -> f64 {
                *self as f64
            }
        }
    };
}

fixed_element!(i8, Int8, i8, |v| v);
fixed_element!(i16, Int16, i16, |v| v);
fixed_element!(i32, Int32, i32, |v| v);
fixed_element!(i64, Int64, i64, |v| v);
fixed_element!(u8, UInt8, u8, |v| v);
fixed_element!(u16, UInt16, u16, |v| v);
fixed_element!(u32, UInt32, u32, |v| v);
fixed_element!(u64, UInt64, u64, |v| v);
fixed_element!(f32, Float32, u32, |v| v.to_bits());
fixed_element!(f64, Float64, u64, |v| v.to_bits());

impl ColumnElement for bool {
    type Key = bool;

    const SHAPE: ValueShape = ValueShape::Fixed;
    const COLUMN_TYPE: ColumnType = ColumnType::Bool;
    const FIXED_WIDTH: Option<usize> = Some(1);

    fn distinct_key(&self) -> bool {
        *self
    }

    fn write_item<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_u8_val(u8::from(*self))
    }

    fn read_item<R: Read>(r: &mut R) -> Result<Self> {
        match r.read_u8_val()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(crate::utils::error::Error::corruption(format!(
                "invalid bool byte {other:#04x}"
            ))),
        }
    }
}

impl NumericElement for bool {
    fn to_f64(&self) -> f64 {
        if *self { 1.0 } else { 0.0 }
    }
}

impl ColumnElement for String {
    type Key = String;

    const SHAPE: ValueShape = ValueShape::String;
    const COLUMN_TYPE: ColumnType = ColumnType::String;

    fn distinct_key(&self) -> String {
        self.clone()
    }

    fn write_item<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_str_prefixed(self)
    }

    fn read_item<R: Read>(r: &mut R) -> Result<Self> {
        r.read_string_prefixed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn roundtrip<T: ColumnElement>(value: &T) -> T {
        let mut buf = Vec::new();
        value.write_item(&mut buf).unwrap();
        if let Some(width) = T::FIXED_WIDTH {
            assert_eq!(buf.len(), width);
        }
        T::read_item(&mut Cursor::new(buf)).unwrap()
    }

    #[test]
    fn test_fixed_items() {
        assert_eq!(roundtrip(&-5i8), -5);
        assert_eq!(roundtrip(&u64::MAX), u64::MAX);
        assert_eq!(roundtrip(&-0.25f32), -0.25);
        assert_eq!(roundtrip(&f64::MIN_POSITIVE), f64::MIN_POSITIVE);
        assert!(roundtrip(&true));
    }

    #[test]
    fn test_float_keys_use_bits() {
        assert_ne!(0.0f64.distinct_key(), (-0.0f64).distinct_key());
        assert_eq!(f64::NAN.distinct_key(), f64::NAN.distinct_key());
    }

    #[test]
    fn test_bad_bool_byte() {
        let err = bool::read_item(&mut Cursor::new(vec![7u8])).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_string_item() {
        assert_eq!(roundtrip(&"Grüße".to_string()), "Grüße");
        assert_eq!(String::SHAPE, ValueShape::String);
    }
}
