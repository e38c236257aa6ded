//! Bit-granular cursor over an immutable byte buffer
//!
//! Fields are packed least-significant bit first within each byte and cross
//! byte boundaries transparently:
//!
//! ```text
//!  byte 0            byte 1
//!  7 6 5 4 3 2 1 0   7 6 5 4 3 2 1 0
//!  . . . a a a a a   . . . . . . b b b b   <- a: 5 bits, then b: 4 bits
//!        ^ first bit read                     (b spans 3 bits of byte 0
//!                                              and 1 bit of byte 1)
//! ```
//!
//! Reading past the end of the buffer is an error, never a silent
//! truncation.

use crate::traits::{ParseError, ParseResult};

const MAX_BITS: u32 = 32;

#[inline]
fn low_mask(bits: u32) -> u32 {
    if bits >= 32 {
        u32::MAX
    } else {
        (1u32 << bits) - 1
    }
}

/// Reads arbitrary-width fields from a byte buffer
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    byte_pos: usize,
    bit_pos: u32,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte_pos: 0,
            bit_pos: 0,
        }
    }

    /// Current byte offset (the partially consumed byte counts as current)
    pub fn byte_position(&self) -> usize {
        self.byte_pos
    }

    /// Bits already consumed in the current byte, 0..8
    pub fn bit_offset(&self) -> u32 {
        self.bit_pos
    }

    /// Absolute position in bits
    pub fn bit_position(&self) -> u64 {
        self.byte_pos as u64 * 8 + u64::from(self.bit_pos)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bits left before the end of the buffer
    pub fn remaining_bits(&self) -> u64 {
        (self.data.len() as u64 * 8).saturating_sub(self.bit_position())
    }

    pub fn is_at_end(&self) -> bool {
        self.remaining_bits() == 0
    }

    pub fn is_byte_aligned(&self) -> bool {
        self.bit_pos == 0
    }

    /// Read `count` bits (1..=32)
    pub fn read_bits(&mut self, count: u32) -> ParseResult<u32> {
        self.read_field("bits", count)
    }

    /// Read `count` bits, naming the field in any error
    pub fn read_field(&mut self, field: &str, count: u32) -> ParseResult<u32> {
        if count == 0 || count > MAX_BITS {
            return Err(ParseError::InvalidBitCount { requested: count });
        }

        let remaining = self.remaining_bits();
        if u64::from(count) > remaining {
            return Err(ParseError::truncated(
                self.byte_pos as u64,
                field,
                u64::from(count),
                remaining,
            ));
        }

        let mut result = 0u32;
        let mut filled = 0u32;
        while filled < count {
            let available = 8 - self.bit_pos;
            let take = available.min(count - filled);
            let byte = u32::from(self.data[self.byte_pos]);
            let bits = (byte >> self.bit_pos) & low_mask(take);

            result |= bits << filled;
            filled += take;
            self.bit_pos += take;

            if self.bit_pos == 8 {
                self.bit_pos = 0;
                self.byte_pos += 1;
            }
        }

        Ok(result)
    }

    /// Read a field whose width comes from the data itself.
    ///
    /// A width of zero encodes "every value is zero" and consumes nothing.
    pub fn read_width(&mut self, field: &str, width: u32) -> ParseResult<u32> {
        if width == 0 {
            Ok(0)
        } else {
            self.read_field(field, width)
        }
    }

    /// Read a single flag bit
    pub fn read_flag(&mut self, field: &str) -> ParseResult<bool> {
        Ok(self.read_field(field, 1)? != 0)
    }

    /// Discard any partially consumed byte
    pub fn align_to_byte(&mut self) {
        if self.bit_pos != 0 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }
    }

    /// Align to a byte, then round up to a multiple of four bytes, never
    /// moving past the end of the buffer
    pub fn align_to_4_bytes(&mut self) {
        self.align_to_byte();
        let aligned = (self.byte_pos + 3) & !3;
        self.byte_pos = aligned.min(self.data.len());
    }

    /// Copy `count` raw bytes (aligns to a byte first)
    pub fn read_bytes(&mut self, count: usize) -> ParseResult<Vec<u8>> {
        self.read_bytes_field("bytes", count)
    }

    /// Copy `count` raw bytes, naming the field in any error
    pub fn read_bytes_field(&mut self, field: &str, count: usize) -> ParseResult<Vec<u8>> {
        self.align_to_byte();
        let available = self.data.len().saturating_sub(self.byte_pos);
        if count > available {
            return Err(ParseError::truncated(
                self.byte_pos as u64,
                field,
                count as u64,
                available as u64,
            ));
        }

        let out = self.data[self.byte_pos..self.byte_pos + count].to_vec();
        self.byte_pos += count;
        Ok(out)
    }

    /// Read a fixed-size byte array (aligns to a byte first)
    pub fn read_array<const N: usize>(&mut self, field: &str) -> ParseResult<[u8; N]> {
        let bytes = self.read_bytes_field(field, N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&bytes);
        Ok(out)
    }

    /// Little-endian signed 16-bit integer read through `read_bytes`
    pub fn read_i16(&mut self, field: &str) -> ParseResult<i16> {
        Ok(i16::from_le_bytes(self.read_array::<2>(field)?))
    }
}

/// Writes arbitrary-width fields in the same bit order `BitReader` reads
#[derive(Debug, Clone, Default)]
pub struct BitWriter {
    data: Vec<u8>,
    bit_pos: u32,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            data: Vec::with_capacity(bytes),
            bit_pos: 0,
        }
    }

    /// Bytes written so far, including a partially filled last byte
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    pub fn bit_position(&self) -> u64 {
        if self.bit_pos == 0 {
            self.data.len() as u64 * 8
        } else {
            (self.data.len() as u64 - 1) * 8 + u64::from(self.bit_pos)
        }
    }

    /// Write the low `count` bits of `value` (1..=32)
    pub fn write_bits(&mut self, value: u32, count: u32) -> ParseResult<()> {
        self.write_field("bits", value, count)
    }

    /// Write the low `count` bits of `value`, naming the field in any error
    pub fn write_field(&mut self, field: &str, value: u32, count: u32) -> ParseResult<()> {
        if count == 0 || count > MAX_BITS {
            return Err(ParseError::InvalidBitCount { requested: count });
        }
        if value & !low_mask(count) != 0 {
            return Err(ParseError::overflow(field, u64::from(value), u64::from(low_mask(count))));
        }

        let mut value = value;
        let mut remaining = count;
        while remaining > 0 {
            if self.bit_pos == 0 {
                self.data.push(0);
            }
            let take = (8 - self.bit_pos).min(remaining);
            let bits = (value & low_mask(take)) as u8;
            if let Some(last) = self.data.last_mut() {
                *last |= bits << self.bit_pos;
            }

            value = if take >= 32 { 0 } else { value >> take };
            remaining -= take;
            self.bit_pos = (self.bit_pos + take) % 8;
        }

        Ok(())
    }

    /// Counterpart of `BitReader::read_width`: width zero writes nothing
    /// and only accepts zero
    pub fn write_width(&mut self, field: &str, value: u32, width: u32) -> ParseResult<()> {
        if width == 0 {
            if value != 0 {
                return Err(ParseError::overflow(field, u64::from(value), 0));
            }
            Ok(())
        } else {
            self.write_field(field, value, width)
        }
    }

    pub fn write_flag(&mut self, field: &str, flag: bool) -> ParseResult<()> {
        self.write_field(field, u32::from(flag), 1)
    }

    /// Close the current byte; remaining bits stay zero
    pub fn align_to_byte(&mut self) {
        self.bit_pos = 0;
    }

    /// Close the current byte and zero-pad to a multiple of four bytes
    pub fn align_to_4_bytes(&mut self) {
        self.align_to_byte();
        while self.data.len() % 4 != 0 {
            self.data.push(0);
        }
    }

    /// Append raw bytes (aligns to a byte first)
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.align_to_byte();
        self.data.extend_from_slice(bytes);
    }

    pub fn write_i16(&mut self, value: i16) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

/// Number of bits needed to represent `value` (0 for 0)
pub fn bits_needed(value: u32) -> u32 {
    32 - value.leading_zeros()
}
