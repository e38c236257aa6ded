//! Primitive readers and writers shared by every codec
//!
//! - [`bits`]: arbitrary-width, LSB-first bit fields (terrain streams)
//! - [`bytes`]: little-endian byte fields, fixed strings and fixed-point
//!   values (mission, model and pack records)

pub mod bits;
pub mod bytes;

pub use bits::{bits_needed, BitReader, BitWriter};
pub use bytes::{decode_fixed_string, ByteReader, FixedString, WriteFieldsExt};
