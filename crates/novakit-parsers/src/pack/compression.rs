//! BFC1 payload compression
//!
//! Compressed pack payloads carry a four byte `BFC1` tag, a 32-bit decoded
//! length and a zlib stream. Some archives omit the length word and start
//! the zlib stream right after the tag; both shapes are accepted on read,
//! and the long shape is always written.

use std::io::{Read, Write};

use byteorder::{LittleEndian, WriteBytesExt};
use flate2::Compression;

use crate::traits::{ParseError, ParseResult};

/// Tag at the start of every compressed payload
pub const BFC1_MAGIC: &[u8; 4] = b"BFC1";

/// zlib header for the default compression level
pub const ZLIB_HEADER: [u8; 2] = [0x78, 0x9C];

/// Offset of the zlib header in the long framing
const LONG_STREAM_OFFSET: usize = 8;
/// Offset of the zlib header in the short framing
const SHORT_STREAM_OFFSET: usize = 4;

/// Upper bound for trusting the stored length as a buffer size hint
const MAX_SIZE_HINT: usize = 64 * 1024 * 1024;

/// Handles BFC1 framing for pack entries
pub struct PackCompression;

impl PackCompression {
    /// Whether a raw payload carries the BFC1 tag
    pub fn is_compressed(raw: &[u8]) -> bool {
        raw.starts_with(BFC1_MAGIC)
    }

    /// Decoded length stored in the long framing, if present
    pub fn stored_length(raw: &[u8]) -> Option<u32> {
        if !Self::is_compressed(raw) || raw.get(LONG_STREAM_OFFSET..LONG_STREAM_OFFSET + 2) != Some(&ZLIB_HEADER[..]) {
            return None;
        }
        let word: [u8; 4] = raw.get(4..8)?.try_into().ok()?;
        Some(u32::from_le_bytes(word))
    }

    /// Strip the BFC1 framing and inflate the payload
    pub fn decompress(raw: &[u8]) -> ParseResult<Vec<u8>> {
        if !Self::is_compressed(raw) {
            return Err(ParseError::malformed(0, "bfc1_magic", "payload does not start with BFC1"));
        }

        let stream_offset = if raw.get(LONG_STREAM_OFFSET..LONG_STREAM_OFFSET + 2) == Some(&ZLIB_HEADER[..]) {
            LONG_STREAM_OFFSET
        } else if raw.get(SHORT_STREAM_OFFSET..SHORT_STREAM_OFFSET + 2) == Some(&ZLIB_HEADER[..]) {
            SHORT_STREAM_OFFSET
        } else {
            let found = raw.get(LONG_STREAM_OFFSET..).unwrap_or(&[]);
            return Err(ParseError::malformed(
                LONG_STREAM_OFFSET as u64,
                "zlib_header",
                format!("expected 78 9C, found {:02X?}", &found[..found.len().min(2)]),
            ));
        };

        let capacity = Self::stored_length(raw)
            .map(|len| (len as usize).min(MAX_SIZE_HINT))
            .unwrap_or(raw.len() * 4);

        // The adler trailer is not checked; the deflate body follows the
        // two header bytes.
        let body = &raw[stream_offset + ZLIB_HEADER.len()..];
        let mut decoder = flate2::read::DeflateDecoder::new(body);
        let mut output = Vec::with_capacity(capacity);
        decoder
            .read_to_end(&mut output)
            .map_err(|e| ParseError::DecompressionFailed(format!("BFC1 inflate failed: {}", e)))?;

        if let Some(expected) = Self::stored_length(raw) {
            if expected as usize != output.len() {
                tracing::debug!(expected, actual = output.len(), "BFC1 stored length differs from inflated size");
            }
        }

        Ok(output)
    }

    /// Wrap `plain` in BFC1 framing
    pub fn compress(plain: &[u8]) -> ParseResult<Vec<u8>> {
        let length = u32::try_from(plain.len())
            .map_err(|_| ParseError::overflow("bfc1_length", plain.len() as u64, u64::from(u32::MAX)))?;

        let mut out = Vec::with_capacity(plain.len() / 2 + 16);
        out.extend_from_slice(BFC1_MAGIC);
        out.write_u32::<LittleEndian>(length)?;

        let mut encoder = flate2::write::ZlibEncoder::new(out, Compression::default());
        encoder
            .write_all(plain)
            .map_err(|e| ParseError::DecompressionFailed(format!("BFC1 compression failed: {}", e)))?;
        encoder
            .finish()
            .map_err(|e| ParseError::DecompressionFailed(format!("BFC1 compression finalization failed: {}", e)))
    }

    /// Calculate CRC32 checksum
    pub fn crc32(data: &[u8]) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(data);
        hasher.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::ErrorKind;

    #[test]
    fn test_compress_layout() {
        let plain = b"FLAG 1\nFLAG 2\nFLAG 3\n".repeat(8);
        let packed = PackCompression::compress(&plain).unwrap();

        assert_eq!(&packed[..4], BFC1_MAGIC);
        assert_eq!(u32::from_le_bytes(packed[4..8].try_into().unwrap()) as usize, plain.len());
        assert_eq!(&packed[8..10], &ZLIB_HEADER);
        assert_eq!(PackCompression::stored_length(&packed), Some(plain.len() as u32));
    }

    #[test]
    fn test_compress_then_decompress() {
        let plain = b"Hello, World! This is a test of BFC1 compression.";
        let packed = PackCompression::compress(plain).unwrap();
        assert_eq!(PackCompression::decompress(&packed).unwrap(), plain);
    }

    #[test]
    fn test_short_framing_accepted() {
        let plain = b"no length word here";
        let long = PackCompression::compress(plain).unwrap();

        let mut short = BFC1_MAGIC.to_vec();
        short.extend_from_slice(&long[8..]);
        assert_eq!(PackCompression::stored_length(&short), None);
        assert_eq!(PackCompression::decompress(&short).unwrap(), plain);
    }

    #[test]
    fn test_corrupt_zlib_header() {
        let mut packed = PackCompression::compress(b"payload payload payload").unwrap();
        packed[8] = 0x00;
        packed[9] = 0x00;

        let err = PackCompression::decompress(&packed).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedHeader);
    }

    #[test]
    fn test_untagged_payload_rejected() {
        let err = PackCompression::decompress(b"PLAINTEXT").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedHeader);
        assert!(!PackCompression::is_compressed(b"BFC"));
    }

    #[test]
    fn test_crc32() {
        assert_eq!(PackCompression::crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(PackCompression::crc32(b""), 0);
        assert_ne!(PackCompression::crc32(b"Hello, World!"), PackCompression::crc32(b"Hello, World?"));
    }
}
