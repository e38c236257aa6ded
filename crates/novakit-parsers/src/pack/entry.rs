//! Pack archive entries and their on-disk table records

use byteorder::{LittleEndian, WriteBytesExt};
use bytes::Bytes;
use serde::{Serialize, Serializer};

use crate::io::{ByteReader, FixedString, WriteFieldsExt};
use crate::traits::ParseResult;
use crate::validation::{InvariantCheck, Validator};

use super::compression::PackCompression;

/// Bytes of a table record that carry data; the rest is padding
pub const RECORD_DATA_SIZE: usize = 32;
/// Longest name that survives a save (the sixteenth byte is the terminator)
pub const MAX_NAME_LEN: usize = 15;
/// Modified stamp given to entries added in memory
pub const NEW_ENTRY_MODIFIED: i32 = 1;

/// Prefix of encrypted script payloads
const SCRIPT_PREFIX: &[u8; 3] = b"SCR";

/// One table record as stored on disk
///
/// ```text
/// ┌──────────┬──────────┬──────────┬──────────┬────────────┬─────────┐
/// │ deleted  │ offset   │ size     │ modified │ name: [16] │ padding │
/// │ i32      │ i32      │ i32      │ i32      │ NUL padded │ to size │
/// └──────────┴──────────┴──────────┴──────────┴────────────┴─────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackRecord {
    pub deleted: bool,
    pub offset: i32,
    pub size: i32,
    pub modified: i32,
    pub name: FixedString<16>,
}

impl PackRecord {
    /// Read one record and skip to the declared stride
    pub(crate) fn read(reader: &mut ByteReader, record_size: usize, validator: &mut Validator) -> ParseResult<Self> {
        let start = reader.offset();

        let deleted = reader.read_i32("record_deleted")?;
        validator.check(start, InvariantCheck::in_range("record_deleted", deleted, 0, 1))?;
        let offset = reader.read_i32("record_offset")?;
        let size = reader.read_i32("record_size")?;
        let modified = reader.read_i32("record_modified")?;
        let name = reader.read_fixed("record_name")?;
        reader.skip("record_padding", record_size - RECORD_DATA_SIZE)?;

        Ok(Self {
            deleted: deleted == 1,
            offset,
            size,
            modified,
            name,
        })
    }

    pub(crate) fn write(&self, record_size: usize, out: &mut Vec<u8>) -> ParseResult<()> {
        out.write_i32::<LittleEndian>(i32::from(self.deleted))?;
        out.write_i32::<LittleEndian>(self.offset)?;
        out.write_i32::<LittleEndian>(self.size)?;
        out.write_i32::<LittleEndian>(self.modified)?;
        out.extend_from_slice(self.name.raw());
        out.write_zeros(record_size - RECORD_DATA_SIZE)?;
        Ok(())
    }
}

/// Name field for a table record: at most fifteen bytes and a terminator
pub fn record_name(name: &str) -> FixedString<16> {
    let bytes = name.as_bytes();
    let mut raw = [0u8; 16];
    let used = bytes.len().min(MAX_NAME_LEN);
    raw[..used].copy_from_slice(&bytes[..used]);
    FixedString::from_raw(raw)
}

/// A live file inside a pack archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackEntry {
    /// Stored name field
    pub name: FixedString<16>,
    /// Modified stamp from the table, kept for saving
    pub modified: i32,
    /// Payload exactly as stored (possibly BFC1 framed or encrypted)
    #[serde(rename = "size", serialize_with = "payload_len")]
    pub data: Bytes,
}

fn payload_len<S: Serializer>(data: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(data.len() as u64)
}

impl PackEntry {
    /// Entry created in memory
    pub fn new(name: &str, data: impl Into<Bytes>) -> Self {
        Self {
            name: record_name(name),
            modified: NEW_ENTRY_MODIFIED,
            data: data.into(),
        }
    }

    pub fn filename(&self) -> String {
        self.name.text()
    }

    /// Get the file extension
    pub fn extension(&self) -> Option<String> {
        let name = self.filename();
        name.rfind('.').map(|idx| name[idx + 1..].to_string())
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_compressed(&self) -> bool {
        PackCompression::is_compressed(&self.data)
    }

    pub fn is_script(&self) -> bool {
        self.data.starts_with(SCRIPT_PREFIX)
    }

    /// Payload with BFC1 framing removed
    pub fn decoded(&self) -> ParseResult<Vec<u8>> {
        if self.is_compressed() {
            PackCompression::decompress(&self.data)
        } else {
            Ok(self.data.to_vec())
        }
    }

    /// Replace the payload, keeping name and stamp
    pub fn set_data(&mut self, data: impl Into<Bytes>) {
        self.data = data.into();
    }

    /// Checksum of the stored payload
    pub fn crc32(&self) -> u32 {
        PackCompression::crc32(&self.data)
    }

    pub fn info(&self) -> PackEntryInfo {
        PackEntryInfo {
            name: self.filename(),
            size: self.size() as u64,
            modified: self.modified,
            compressed: self.is_compressed(),
            script: self.is_script(),
            crc32: self.crc32(),
        }
    }
}

/// Lightweight entry info for listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackEntryInfo {
    pub name: String,
    pub size: u64,
    pub modified: i32,
    pub compressed: bool,
    pub script: bool,
    pub crc32: u32,
}

impl PackEntryInfo {
    /// Format size as human-readable string
    pub fn formatted_size(&self) -> String {
        format_bytes(self.size)
    }

    /// Short classification column for listings
    pub fn kind(&self) -> &'static str {
        match (self.compressed, self.script) {
            (true, _) => "bfc1",
            (false, true) => "script",
            (false, false) => "plain",
        }
    }
}

/// Format byte count as human-readable string
fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::ParseOptions;

    #[test]
    fn test_record_name_truncates_to_fifteen() {
        let name = record_name("a_very_long_file_name.bms");
        assert_eq!(name.text(), "a_very_long_fil");
        assert_eq!(name.raw()[15], 0);
    }

    #[test]
    fn test_record_layout_with_padding() {
        let record = PackRecord {
            deleted: false,
            offset: 20,
            size: 7,
            modified: 1,
            name: record_name("intro.scr"),
        };
        let mut out = Vec::new();
        record.write(40, &mut out).unwrap();

        assert_eq!(out.len(), 40);
        assert_eq!(&out[4..8], &20i32.to_le_bytes());
        assert_eq!(&out[16..25], b"intro.scr");
        assert!(out[32..].iter().all(|&b| b == 0));

        let options = ParseOptions::default();
        let mut validator = Validator::new(&options);
        let mut reader = ByteReader::new(&out);
        let back = PackRecord::read(&mut reader, 40, &mut validator).unwrap();
        assert_eq!(back, record);
        assert!(reader.is_at_end());
    }

    #[test]
    fn test_odd_deleted_flag_is_soft() {
        let mut raw = vec![0u8; RECORD_DATA_SIZE];
        raw[0] = 2;
        let options = ParseOptions::default();
        let mut validator = Validator::new(&options);
        let record = PackRecord::read(&mut ByteReader::new(&raw), RECORD_DATA_SIZE, &mut validator).unwrap();

        assert!(!record.deleted);
        assert_eq!(validator.finish().for_field("record_deleted").count(), 1);
    }

    #[test]
    fn test_classification() {
        assert!(PackEntry::new("a.scr", &b"SCR\x01body"[..]).is_script());
        assert!(PackEntry::new("a.bin", &b"BFC1...."[..]).is_compressed());

        let plain = PackEntry::new("readme.txt", &b"text"[..]);
        assert!(!plain.is_script());
        assert!(!plain.is_compressed());
        assert_eq!(plain.extension().as_deref(), Some("txt"));
        assert_eq!(plain.modified, NEW_ENTRY_MODIFIED);
        assert_eq!(plain.info().kind(), "plain");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1048576), "1.00 MB");
    }
}
