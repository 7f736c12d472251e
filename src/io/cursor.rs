use std::fmt::Display;

use encoding_rs::{UTF_16BE, UTF_16LE, WINDOWS_1252};
use num_traits::FromBytes;
use thiserror::Error;

/// The byte order of a multi-byte scalar stored in a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ByteOrder {
    #[default]
    Big,
    Little,
}

impl ByteOrder {
    pub const fn native() -> Self {
        if u16::from_ne_bytes([1, 0]) == 1 {
            Self::Little
        } else {
            Self::Big
        }
    }
}

impl Display for ByteOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The width and encoding of a single character in a length-prefixed string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CodeUnit {
    /// One byte per character, decoded as Windows-1252
    Byte,
    /// Two bytes per character, decoded as UTF-16 in the given byte order
    Wide(ByteOrder),
}

impl CodeUnit {
    pub const fn width(&self) -> usize {
        match self {
            Self::Byte => 1,
            Self::Wide(_) => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CursorError {
    #[error("Attempted to read {requested} bytes at offset {offset} but only {available} remain")]
    Truncated {
        offset: u64,
        requested: u64,
        available: u64,
    },
    #[error("Unsupported scalar width {0}")]
    InvalidWidth(usize),
}

impl CursorError {
    /// The byte offset at which the failed read was attempted
    pub fn offset(&self) -> Option<u64> {
        match self {
            Self::Truncated { offset, .. } => Some(*offset),
            Self::InvalidWidth(_) => None,
        }
    }
}

/**
A seekable, bounds-checked reader over an in-memory byte source.

Every read that would cross the end of the source fails with
[`CursorError::Truncated`] and leaves the position unchanged, so callers
can treat a failed read as a missing value instead of a fatal condition.
*/
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn position(&self) -> u64 {
        self.position as u64
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    pub fn as_slice(&self) -> &'a [u8] {
        self.data
    }

    fn truncated(&self, offset: u64, requested: u64) -> CursorError {
        CursorError::Truncated {
            offset,
            requested,
            available: (self.data.len() as u64).saturating_sub(offset),
        }
    }

    /// Move to an absolute offset. Seeking to exactly the end of the source is
    /// allowed, seeking past it is not.
    pub fn seek(&mut self, offset: u64) -> Result<(), CursorError> {
        if offset > self.data.len() as u64 {
            return Err(self.truncated(offset, 0));
        }
        self.position = offset as usize;
        Ok(())
    }

    pub fn skip(&mut self, n: usize) -> Result<(), CursorError> {
        if n > self.remaining() {
            return Err(self.truncated(self.position(), n as u64));
        }
        self.position += n;
        Ok(())
    }

    /// Check that `n` more bytes can be read without moving
    pub fn ensure(&self, n: usize) -> Result<(), CursorError> {
        if n > self.remaining() {
            return Err(self.truncated(self.position(), n as u64));
        }
        Ok(())
    }

    /// Borrow the next `n` bytes and advance past them
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], CursorError> {
        if n > self.remaining() {
            return Err(self.truncated(self.position(), n as u64));
        }
        let chunk = &self.data[self.position..self.position + n];
        self.position += n;
        Ok(chunk)
    }

    /// Borrow everything from the current position to the end of the source
    pub fn rest(&mut self) -> &'a [u8] {
        let chunk = &self.data[self.position..];
        self.position = self.data.len();
        chunk
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], CursorError> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.read_bytes(N)?);
        Ok(buf)
    }

    /// Read any fixed-width scalar that can be built from `N` bytes
    pub fn read_scalar<T, const N: usize>(&mut self, order: ByteOrder) -> Result<T, CursorError>
    where
        T: FromBytes<Bytes = [u8; N]>,
    {
        let bytes = self.read_array::<N>()?;
        Ok(match order {
            ByteOrder::Big => T::from_be_bytes(&bytes),
            ByteOrder::Little => T::from_le_bytes(&bytes),
        })
    }

    #[inline]
    pub fn read_u8(&mut self) -> Result<u8, CursorError> {
        Ok(self.read_array::<1>()?[0])
    }

    #[inline]
    pub fn read_i8(&mut self) -> Result<i8, CursorError> {
        Ok(self.read_u8()? as i8)
    }

    #[inline]
    pub fn read_u16(&mut self, order: ByteOrder) -> Result<u16, CursorError> {
        self.read_scalar::<u16, 2>(order)
    }

    #[inline]
    pub fn read_i16(&mut self, order: ByteOrder) -> Result<i16, CursorError> {
        self.read_scalar::<i16, 2>(order)
    }

    #[inline]
    pub fn read_u32(&mut self, order: ByteOrder) -> Result<u32, CursorError> {
        self.read_scalar::<u32, 4>(order)
    }

    #[inline]
    pub fn read_i32(&mut self, order: ByteOrder) -> Result<i32, CursorError> {
        self.read_scalar::<i32, 4>(order)
    }

    #[inline]
    pub fn read_u64(&mut self, order: ByteOrder) -> Result<u64, CursorError> {
        self.read_scalar::<u64, 8>(order)
    }

    #[inline]
    pub fn read_i64(&mut self, order: ByteOrder) -> Result<i64, CursorError> {
        self.read_scalar::<i64, 8>(order)
    }

    #[inline]
    pub fn read_f32(&mut self, order: ByteOrder) -> Result<f32, CursorError> {
        self.read_scalar::<f32, 4>(order)
    }

    #[inline]
    pub fn read_f64(&mut self, order: ByteOrder) -> Result<f64, CursorError> {
        self.read_scalar::<f64, 8>(order)
    }

    /// Read an unsigned integer of `width` bytes (1, 2, 4 or 8)
    pub fn read_uint(&mut self, width: usize, order: ByteOrder) -> Result<u64, CursorError> {
        match width {
            1 => self.read_u8().map(u64::from),
            2 => self.read_u16(order).map(u64::from),
            4 => self.read_u32(order).map(u64::from),
            8 => self.read_u64(order),
            _ => Err(CursorError::InvalidWidth(width)),
        }
    }

    /// Read a signed integer of `width` bytes (1, 2, 4 or 8)
    pub fn read_int(&mut self, width: usize, order: ByteOrder) -> Result<i64, CursorError> {
        match width {
            1 => self.read_i8().map(i64::from),
            2 => self.read_i16(order).map(i64::from),
            4 => self.read_i32(order).map(i64::from),
            8 => self.read_i64(order),
            _ => Err(CursorError::InvalidWidth(width)),
        }
    }

    /// Read an IEEE-754 float of `width` bytes (4 or 8)
    pub fn read_float(&mut self, width: usize, order: ByteOrder) -> Result<f64, CursorError> {
        match width {
            4 => self.read_f32(order).map(f64::from),
            8 => self.read_f64(order),
            _ => Err(CursorError::InvalidWidth(width)),
        }
    }

    /// Read a length-prefixed string. The single prefix byte counts characters,
    /// not bytes, so a wide string occupies `1 + 2 * n` bytes.
    pub fn read_pascal_string(&mut self, code_unit: CodeUnit) -> Result<String, CursorError> {
        let start = self.position;
        let n_chars = self.read_u8()? as usize;
        let body = match self.read_bytes(n_chars * code_unit.width()) {
            Ok(body) => body,
            Err(e) => {
                self.position = start;
                return Err(e);
            }
        };
        let encoding = match code_unit {
            CodeUnit::Byte => WINDOWS_1252,
            CodeUnit::Wide(ByteOrder::Big) => UTF_16BE,
            CodeUnit::Wide(ByteOrder::Little) => UTF_16LE,
        };
        let (text, _had_errors) = encoding.decode_without_bom_handling(body);
        Ok(text
            .trim_end_matches(|c: char| c == '\0' || c.is_whitespace())
            .to_string())
    }
}
