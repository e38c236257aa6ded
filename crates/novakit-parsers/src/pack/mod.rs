//! Pack archives (`.pff`)
//!
//! # Format Structure
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Header (20 bytes)                                            │
//! │   header_size:i32  signature:[4]  record_count:i32           │
//! │   record_size:i32  record_offset:i32                         │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Payloads, back to back from header_size                      │
//! │   plain bytes | "BFC1" len:u32 zlib | "SCR\x01" cipher text  │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Record table at record_offset, record_count x record_size    │
//! │   deleted:i32 offset:i32 size:i32 modified:i32 name:[16] pad │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! `PFF3` and `PFF4` share this layout. Other signatures are read the same
//! way with a warning. Deleted records are dropped on load, and a save
//! lays the surviving payloads out again from `header_size`.

pub mod archive;
pub mod compression;
pub mod entry;

pub use archive::{PackArchive, PackHeader, HEADER_SIZE, KNOWN_SIGNATURES};
pub use compression::{PackCompression, BFC1_MAGIC};
pub use entry::{record_name, PackEntry, PackEntryInfo, PackRecord, MAX_NAME_LEN, RECORD_DATA_SIZE};

use bytes::Bytes;

use crate::traits::{Decoded, ParseOptions, ParseResult, Parser};
use crate::validation::Validator;

/// Pack archive codec
pub struct PackParser;

impl PackParser {
    pub fn new() -> Self {
        Self
    }

    /// Decode from an owned buffer without copying payloads
    pub fn decode_bytes(&self, data: Bytes, options: &ParseOptions) -> ParseResult<Decoded<PackArchive>> {
        let mut validator = Validator::new(options);
        let archive = PackArchive::read(data, &mut validator)?;
        Ok(Decoded::new(archive, validator.finish()))
    }
}

impl Default for PackParser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser for PackParser {
    type Output = PackArchive;

    fn extensions(&self) -> &[&str] {
        &["pff"]
    }

    fn name(&self) -> &str {
        "PFF Pack Archive Parser"
    }

    fn decode(&self, data: &[u8], options: &ParseOptions) -> ParseResult<Decoded<PackArchive>> {
        self.decode_bytes(Bytes::copy_from_slice(data), options)
    }

    fn serialize(&self, value: &PackArchive) -> ParseResult<Vec<u8>> {
        value.write()
    }
}
