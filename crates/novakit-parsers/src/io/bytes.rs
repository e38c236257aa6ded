//! Byte-oriented cursor and writer helpers
//!
//! `ByteReader` adds the composite field types the formats use on top of
//! little-endian integers: NUL-truncated fixed strings, the two-field
//! fixed-point scalar, and vectors/matrices built from it.
//!
//! Record decoders bracket each fixed-size record with `mark()` and
//! `assert_consumed(n)`. When `ParseOptions::check_record_lengths` is on a
//! mismatch is an error; otherwise the marks are tracked and ignored.

use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use novakit_core::{Fixed32, FixedMat4, FixedPoint, FixedVec3, Vec2, Vec3};

use crate::traits::{ParseError, ParseResult};

/// Decode a fixed string span: truncate at the first NUL, map non-ASCII
/// bytes to '?'
pub fn decode_fixed_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    bytes[..end]
        .iter()
        .map(|&b| if b.is_ascii() { b as char } else { '?' })
        .collect()
}

/// Byte cursor over an immutable buffer
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    marks: Vec<usize>,
    check_lengths: bool,
}

macro_rules! read_le {
    ($($name:ident => $ty:ty),* $(,)?) => {
        $(
            #[doc = concat!("Read a little-endian `", stringify!($ty), "`")]
            pub fn $name(&mut self, field: &str) -> ParseResult<$ty> {
                Ok(<$ty>::from_le_bytes(self.read_array(field)?))
            }
        )*
    };
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            marks: Vec::new(),
            check_lengths: true,
        }
    }

    /// Enable or disable record length assertions
    pub fn with_length_checks(mut self, enabled: bool) -> Self {
        self.check_lengths = enabled;
        self
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Current position as an error offset
    pub fn offset(&self) -> u64 {
        self.pos as u64
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn ensure(&self, field: &str, count: usize) -> ParseResult<()> {
        if count > self.remaining() {
            return Err(ParseError::truncated(
                self.offset(),
                field,
                count as u64,
                self.remaining() as u64,
            ));
        }
        Ok(())
    }

    /// Borrow the next `count` bytes
    pub fn read_bytes(&mut self, field: &str, count: usize) -> ParseResult<&'a [u8]> {
        self.ensure(field, count)?;
        let out = &self.data[self.pos..self.pos + count];
        self.pos += count;
        Ok(out)
    }

    /// Look at the next `count` bytes without consuming them
    pub fn peek_bytes(&self, field: &str, count: usize) -> ParseResult<&'a [u8]> {
        self.ensure(field, count)?;
        Ok(&self.data[self.pos..self.pos + count])
    }

    pub fn read_array<const N: usize>(&mut self, field: &str) -> ParseResult<[u8; N]> {
        let bytes = self.read_bytes(field, N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    pub fn skip(&mut self, field: &str, count: usize) -> ParseResult<()> {
        self.ensure(field, count)?;
        self.pos += count;
        Ok(())
    }

    read_le! {
        read_i8 => i8,
        read_u8 => u8,
        read_i16 => i16,
        read_u16 => u16,
        read_i32 => i32,
        read_u32 => u32,
        read_f32 => f32,
    }

    /// Read `length` bytes as ASCII, truncated at the first NUL
    pub fn read_fixed_string(&mut self, field: &str, length: usize) -> ParseResult<String> {
        Ok(decode_fixed_string(self.read_bytes(field, length)?))
    }

    /// Read a fixed string keeping its raw bytes
    pub fn read_fixed<const N: usize>(&mut self, field: &str) -> ParseResult<FixedString<N>> {
        Ok(FixedString::from_raw(self.read_array(field)?))
    }

    /// Read the fraction-then-whole fixed-point scalar
    pub fn read_fixed_point(&mut self, field: &str) -> ParseResult<FixedPoint> {
        let frac = self.read_i16(field)?;
        let whole = self.read_i16(field)?;
        Ok(FixedPoint::new(frac, whole))
    }

    pub fn read_fixed_vec3(&mut self, field: &str) -> ParseResult<FixedVec3> {
        Ok(FixedVec3 {
            x: self.read_fixed_point(field)?,
            y: self.read_fixed_point(field)?,
            z: self.read_fixed_point(field)?,
        })
    }

    /// Sixteen fixed-point values, row-major
    pub fn read_fixed_mat4(&mut self, field: &str) -> ParseResult<FixedMat4> {
        let mut rows = [[FixedPoint::ZERO; 4]; 4];
        for row in rows.iter_mut() {
            for cell in row.iter_mut() {
                *cell = self.read_fixed_point(field)?;
            }
        }
        Ok(FixedMat4 { rows })
    }

    /// Single 32-bit 16.16 fixed-point value
    pub fn read_fixed32(&mut self, field: &str) -> ParseResult<Fixed32> {
        Ok(Fixed32(self.read_i32(field)?))
    }

    pub fn read_vec2(&mut self, field: &str) -> ParseResult<Vec2> {
        Ok(Vec2::new(self.read_f32(field)?, self.read_f32(field)?))
    }

    pub fn read_vec3(&mut self, field: &str) -> ParseResult<Vec3> {
        Ok(Vec3::new(
            self.read_f32(field)?,
            self.read_f32(field)?,
            self.read_f32(field)?,
        ))
    }

    /// Remember the current position for a later `assert_consumed`
    pub fn mark(&mut self) {
        self.marks.push(self.pos);
    }

    /// Pop the last mark and check exactly `expected` bytes were read since
    pub fn assert_consumed(&mut self, record: &str, expected: usize) -> ParseResult<()> {
        let Some(start) = self.marks.pop() else {
            return Err(ParseError::InvalidStructure(format!(
                "{record}: assert_consumed without a matching mark"
            )));
        };

        let consumed = self.pos - start;
        if self.check_lengths && consumed != expected {
            return Err(ParseError::invariant(
                start as u64,
                record,
                format!("record consumed {consumed} bytes, expected {expected}"),
            ));
        }
        Ok(())
    }

    /// Drop the last mark without checking it
    pub fn clear_mark(&mut self) {
        self.marks.pop();
    }
}

/// Writer helpers for the composite field types
pub trait WriteFieldsExt: Write {
    /// Write `text` into exactly `length` bytes, truncating or NUL padding
    fn write_fixed_string(&mut self, text: &str, length: usize) -> std::io::Result<()> {
        let bytes = text.as_bytes();
        let used = bytes.len().min(length);
        self.write_all(&bytes[..used])?;
        self.write_zeros(length - used)
    }

    fn write_zeros(&mut self, count: usize) -> std::io::Result<()> {
        const ZEROS: [u8; 64] = [0; 64];
        let mut left = count;
        while left > 0 {
            let step = left.min(ZEROS.len());
            self.write_all(&ZEROS[..step])?;
            left -= step;
        }
        Ok(())
    }

    fn write_fixed_point(&mut self, value: FixedPoint) -> std::io::Result<()> {
        self.write_i16::<LittleEndian>(value.frac)?;
        self.write_i16::<LittleEndian>(value.whole)
    }

    fn write_fixed_vec3(&mut self, value: &FixedVec3) -> std::io::Result<()> {
        self.write_fixed_point(value.x)?;
        self.write_fixed_point(value.y)?;
        self.write_fixed_point(value.z)
    }

    fn write_fixed_mat4(&mut self, value: &FixedMat4) -> std::io::Result<()> {
        for row in &value.rows {
            for &cell in row {
                self.write_fixed_point(cell)?;
            }
        }
        Ok(())
    }

    fn write_fixed32(&mut self, value: Fixed32) -> std::io::Result<()> {
        self.write_i32::<LittleEndian>(value.0)
    }

    fn write_vec2(&mut self, value: Vec2) -> std::io::Result<()> {
        self.write_f32::<LittleEndian>(value.x)?;
        self.write_f32::<LittleEndian>(value.y)
    }

    fn write_vec3(&mut self, value: Vec3) -> std::io::Result<()> {
        self.write_f32::<LittleEndian>(value.x)?;
        self.write_f32::<LittleEndian>(value.y)?;
        self.write_f32::<LittleEndian>(value.z)
    }
}

impl<W: Write + ?Sized> WriteFieldsExt for W {}

/// Fixed-length NUL-padded text field that keeps its raw bytes
///
/// Bytes after the first NUL are not always zero in shipped files, so the
/// raw array is what gets written back.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixedString<const N: usize> {
    raw: [u8; N],
}

impl<const N: usize> FixedString<N> {
    pub fn from_raw(raw: [u8; N]) -> Self {
        Self { raw }
    }

    /// Build from text, truncating to `N` bytes and NUL padding
    pub fn new(text: &str) -> Self {
        let mut raw = [0u8; N];
        let bytes = text.as_bytes();
        let used = bytes.len().min(N);
        raw[..used].copy_from_slice(&bytes[..used]);
        Self { raw }
    }

    pub fn raw(&self) -> &[u8; N] {
        &self.raw
    }

    /// Decoded text (up to the first NUL)
    pub fn text(&self) -> String {
        decode_fixed_string(&self.raw)
    }

    pub fn is_blank(&self) -> bool {
        self.raw.first().map_or(true, |&b| b == 0)
    }
}

impl<const N: usize> Default for FixedString<N> {
    fn default() -> Self {
        Self { raw: [0; N] }
    }
}

impl<const N: usize> std::fmt::Debug for FixedString<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.text())
    }
}

impl<const N: usize> std::fmt::Display for FixedString<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text())
    }
}

impl<const N: usize> Serialize for FixedString<N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text())
    }
}

impl<'de, const N: usize> Deserialize<'de> for FixedString<N> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Ok(Self::new(&text))
    }
}
