//! Little-endian primitive encoding over `std::io` streams.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::utils::error::{Error, Result};

/// Largest string payload we accept when decoding (256 MiB).
///
/// A length prefix above this is treated as corruption rather than an
/// allocation request.
pub const MAX_STRING_LEN: usize = 256 * 1024 * 1024;

/// Write-side helpers. Blanket-implemented for every [`Write`].
pub trait BinaryWriteExt: Write {
    /// Writes a single byte.
    fn write_u8_val(&mut self, v: u8) -> Result<()> {
        self.write_u8(v)?;
        Ok(())
    }

    /// Writes a little-endian `u32`.
    fn write_u32_le(&mut self, v: u32) -> Result<()> {
        self.write_u32::<LittleEndian>(v)?;
        Ok(())
    }

    /// Writes a little-endian `u64`.
    fn write_u64_le(&mut self, v: u64) -> Result<()> {
        self.write_u64::<LittleEndian>(v)?;
        Ok(())
    }

    /// Writes a little-endian `i64`.
    fn write_i64_le(&mut self, v: i64) -> Result<()> {
        self.write_i64::<LittleEndian>(v)?;
        Ok(())
    }

    /// Writes a little-endian `f32`.
    fn write_f32_le(&mut self, v: f32) -> Result<()> {
        self.write_f32::<LittleEndian>(v)?;
        Ok(())
    }

    /// Writes a little-endian `f64`.
    fn write_f64_le(&mut self, v: f64) -> Result<()> {
        self.write_f64::<LittleEndian>(v)?;
        Ok(())
    }

    /// Writes a `u32` length prefix followed by the raw bytes.
    fn write_bytes_prefixed(&mut self, bytes: &[u8]) -> Result<()> {
        let len = u32::try_from(bytes.len())
            .map_err(|_| Error::Internal(format!("byte span too long: {}", bytes.len())))?;
        self.write_u32_le(len)?;
        self.write_all(bytes)?;
        Ok(())
    }

    /// Writes a length-prefixed UTF-8 string.
    fn write_str_prefixed(&mut self, s: &str) -> Result<()> {
        self.write_bytes_prefixed(s.as_bytes())
    }
}

impl<W: Write + ?Sized> BinaryWriteExt for W {}

/// Read-side helpers. Blanket-implemented for every [`Read`].
pub trait BinaryReadExt: Read {
    /// Reads a single byte.
    fn read_u8_val(&mut self) -> Result<u8> {
        Ok(self.read_u8()?)
    }

    /// Reads a little-endian `u32`.
    fn read_u32_le(&mut self) -> Result<u32> {
        Ok(self.read_u32::<LittleEndian>()?)
    }

    /// Reads a little-endian `u64`.
    fn read_u64_le(&mut self) -> Result<u64> {
        Ok(self.read_u64::<LittleEndian>()?)
    }

    /// Reads a little-endian `i64`.
    fn read_i64_le(&mut self) -> Result<i64> {
        Ok(self.read_i64::<LittleEndian>()?)
    }

    /// Reads a little-endian `f32`.
    fn read_f32_le(&mut self) -> Result<f32> {
        Ok(self.read_f32::<LittleEndian>()?)
    }

    /// Reads a little-endian `f64`.
    fn read_f64_le(&mut self) -> Result<f64> {
        Ok(self.read_f64::<LittleEndian>()?)
    }

    /// Reads a `u32` length prefix and that many bytes.
    fn read_bytes_prefixed(&mut self) -> Result<Vec<u8>> {
        let len = self.read_u32_le()? as usize;
        if len > MAX_STRING_LEN {
            return Err(Error::corruption(format!("byte span length {len} too large")));
        }
        let mut buf = vec![0u8; len];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Reads a length-prefixed UTF-8 string.
    ///
    /// Invalid UTF-8 is reported as corruption, never replaced.
    fn read_string_prefixed(&mut self) -> Result<String> {
        let bytes = self.read_bytes_prefixed()?;
        String::from_utf8(bytes).map_err(|e| Error::corruption(format!("invalid UTF-8: {e}")))
    }
}

impl<R: Read + ?Sized> BinaryReadExt for R {}
