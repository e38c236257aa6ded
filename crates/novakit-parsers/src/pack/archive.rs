//! Pack archive container structure

use std::collections::HashMap;
use std::fmt::Write as _;

use byteorder::{LittleEndian, WriteBytesExt};
use bytes::Bytes;
use serde::Serialize;

use crate::io::{ByteReader, WriteFieldsExt};
use crate::traits::{HumanReadable, ParseError, ParseResult};
use crate::validation::Validator;

use super::compression::PackCompression;
use super::entry::{record_name, PackEntry, PackEntryInfo, PackRecord, RECORD_DATA_SIZE};

/// Bytes of the fixed archive header
pub const HEADER_SIZE: usize = 20;

/// Signatures with a known table layout
pub const KNOWN_SIGNATURES: [&[u8; 4]; 2] = [b"PFF3", b"PFF4"];

/// Archive header fields that survive a load/save cycle
///
/// The record count and table offset are derived from the entries when
/// saving, so they are not kept here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackHeader {
    /// Offset of the first payload byte
    pub header_size: i32,
    #[serde(serialize_with = "signature_text")]
    pub signature: [u8; 4],
    /// Stride of the record table
    pub record_size: i32,
}

fn signature_text<S: serde::Serializer>(signature: &[u8; 4], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&String::from_utf8_lossy(signature))
}

impl Default for PackHeader {
    fn default() -> Self {
        Self {
            header_size: HEADER_SIZE as i32,
            signature: *b"PFF4",
            record_size: RECORD_DATA_SIZE as i32,
        }
    }
}

impl PackHeader {
    pub fn signature_text(&self) -> String {
        String::from_utf8_lossy(&self.signature).into_owned()
    }

    pub fn is_known_signature(&self) -> bool {
        KNOWN_SIGNATURES.iter().any(|s| **s == self.signature)
    }
}

/// Raw header as read, before the table is walked
#[derive(Debug, Clone, Copy)]
pub(crate) struct HeaderWords {
    pub header_size: i32,
    pub signature: [u8; 4],
    pub record_count: i32,
    pub record_size: i32,
    pub record_offset: i32,
}

impl HeaderWords {
    pub(crate) fn read(reader: &mut ByteReader) -> ParseResult<Self> {
        Ok(Self {
            header_size: reader.read_i32("header_size")?,
            signature: reader.read_array("signature")?,
            record_count: reader.read_i32("record_count")?,
            record_size: reader.read_i32("record_size")?,
            record_offset: reader.read_i32("record_offset")?,
        })
    }
}

/// Parsed pack archive
///
/// Entries keep their table order. Lookups ignore ASCII case, and names
/// are cut to fifteen bytes on insertion so that what is stored is what a
/// save will write.
#[derive(Debug, Clone, Serialize)]
pub struct PackArchive {
    pub header: PackHeader,
    entries: Vec<PackEntry>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl PartialEq for PackArchive {
    fn eq(&self, other: &Self) -> bool {
        self.header == other.header && self.entries == other.entries
    }
}

impl Eq for PackArchive {}

/// Lookup key for an entry name
fn name_key(name: &str) -> String {
    record_name(name).text().to_ascii_lowercase()
}

impl PackArchive {
    /// Create a new empty archive
    pub fn create() -> Self {
        Self::with_header(PackHeader::default())
    }

    pub fn with_header(header: PackHeader) -> Self {
        Self {
            header,
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Decode a whole archive; payloads are slices of one shared buffer
    pub(crate) fn read(data: Bytes, validator: &mut Validator) -> ParseResult<Self> {
        let mut reader = ByteReader::new(&data);
        let words = HeaderWords::read(&mut reader).map_err(|e| e.with_context("pack header"))?;

        if words.header_size < HEADER_SIZE as i32 {
            return Err(ParseError::malformed(
                0,
                "header_size",
                format!("{} is smaller than the {} byte header", words.header_size, HEADER_SIZE),
            ));
        }

        let header = PackHeader {
            header_size: words.header_size,
            signature: words.signature,
            record_size: words.record_size,
        };
        if !header.is_known_signature() {
            tracing::warn!(signature = %header.signature_text(), "Unknown pack signature, reading as PFF3/PFF4");
            validator.report(4, "signature", format!("unknown signature {:?}", header.signature_text()))?;
        }

        let record_count = usize::try_from(words.record_count)
            .map_err(|_| ParseError::malformed(8, "record_count", format!("negative count {}", words.record_count)))?;
        let record_size = usize::try_from(words.record_size)
            .ok()
            .filter(|&size| size >= RECORD_DATA_SIZE)
            .ok_or_else(|| {
                ParseError::malformed(
                    12,
                    "record_size",
                    format!("{} cannot hold a {} byte record", words.record_size, RECORD_DATA_SIZE),
                )
            })?;
        let record_offset = usize::try_from(words.record_offset)
            .ok()
            .filter(|&offset| offset <= data.len())
            .ok_or_else(|| {
                ParseError::malformed(
                    16,
                    "record_offset",
                    format!("{} is outside the {} byte archive", words.record_offset, data.len()),
                )
            })?;

        let table_len = record_count.saturating_mul(record_size);
        if table_len > data.len() - record_offset {
            return Err(ParseError::truncated(
                record_offset as u64,
                "record_table",
                table_len as u64,
                (data.len() - record_offset) as u64,
            ));
        }

        let mut archive = Self::with_header(header);
        let mut reader = ByteReader::new(&data);
        reader.skip("record_table", record_offset)?;

        let mut deleted = 0usize;
        for index in 0..record_count {
            let record_start = reader.offset();
            let record = PackRecord::read(&mut reader, record_size, validator)
                .map_err(|e| e.with_context(format!("pack record {}", index)))?;
            if record.deleted {
                deleted += 1;
                continue;
            }

            let start = usize::try_from(record.offset).ok();
            let size = usize::try_from(record.size).ok();
            let payload = match (start, size) {
                (Some(start), Some(size)) if start.checked_add(size).is_some_and(|end| end <= data.len()) => {
                    data.slice(start..start + size)
                }
                _ => {
                    return Err(ParseError::truncated(
                        record_start,
                        format!("payload of {}", record.name),
                        record.size.max(0) as u64,
                        data.len().saturating_sub(record.offset.max(0) as usize) as u64,
                    ))
                }
            };

            tracing::trace!(name = %record.name, offset = record.offset, size = record.size, "Pack record");
            archive.insert(PackEntry {
                name: record.name,
                modified: record.modified,
                data: payload,
            });
        }

        tracing::debug!(
            "Parsed pack archive: {} entries, {} deleted records",
            archive.len(),
            deleted
        );
        Ok(archive)
    }

    /// Write header, payloads and table with offsets recomputed in order
    pub(crate) fn write(&self) -> ParseResult<Vec<u8>> {
        let header_size = usize::try_from(self.header.header_size)
            .ok()
            .filter(|&size| size >= HEADER_SIZE)
            .ok_or_else(|| ParseError::InvalidStructure(format!("header size {}", self.header.header_size)))?;
        let record_size = usize::try_from(self.header.record_size)
            .ok()
            .filter(|&size| size >= RECORD_DATA_SIZE)
            .ok_or_else(|| ParseError::InvalidStructure(format!("record size {}", self.header.record_size)))?;

        let payload_total: usize = self.entries.iter().map(PackEntry::size).sum();
        let table_offset = header_size + payload_total;
        let record_offset = i32::try_from(table_offset)
            .map_err(|_| ParseError::overflow("record_offset", table_offset as u64, i32::MAX as u64))?;
        let record_count = i32::try_from(self.entries.len())
            .map_err(|_| ParseError::overflow("record_count", self.entries.len() as u64, i32::MAX as u64))?;

        let mut out = Vec::with_capacity(table_offset + self.entries.len() * record_size);
        out.write_i32::<LittleEndian>(self.header.header_size)?;
        out.extend_from_slice(&self.header.signature);
        out.write_i32::<LittleEndian>(record_count)?;
        out.write_i32::<LittleEndian>(self.header.record_size)?;
        out.write_i32::<LittleEndian>(record_offset)?;
        out.write_zeros(header_size - HEADER_SIZE)?;

        for entry in &self.entries {
            out.extend_from_slice(&entry.data);
        }

        let mut offset = header_size;
        for entry in &self.entries {
            let record = PackRecord {
                deleted: false,
                // bounded by record_offset above
                offset: offset as i32,
                size: entry.size() as i32,
                modified: entry.modified,
                name: entry.name,
            };
            record.write(record_size, &mut out)?;
            offset += entry.size();
        }

        Ok(out)
    }

    /// Get total number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[PackEntry] {
        &self.entries
    }

    /// Get an entry by name, ignoring ASCII case
    pub fn get(&self, name: &str) -> Option<&PackEntry> {
        self.index.get(&name_key(name)).map(|&idx| &self.entries[idx])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut PackEntry> {
        let idx = *self.index.get(&name_key(name))?;
        self.entries.get_mut(idx)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(&name_key(name))
    }

    /// Add or replace an entry with a raw payload
    pub fn add_entry(&mut self, name: &str, data: impl Into<Bytes>) {
        self.insert(PackEntry::new(name, data));
    }

    /// Add or replace an entry, BFC1 compressing `plain`
    pub fn add_compressed(&mut self, name: &str, plain: &[u8]) -> ParseResult<()> {
        let packed = PackCompression::compress(plain)?;
        self.add_entry(name, packed);
        Ok(())
    }

    /// Remove an entry, returning it
    pub fn remove(&mut self, name: &str) -> Option<PackEntry> {
        let idx = self.index.remove(&name_key(name))?;
        let entry = self.entries.remove(idx);
        self.rebuild_index();
        Some(entry)
    }

    /// Payload of an entry with BFC1 framing removed
    pub fn decoded(&self, name: &str) -> ParseResult<Vec<u8>> {
        self.get(name)
            .ok_or_else(|| ParseError::EntryNotFound(name.to_string()))?
            .decoded()
    }

    /// Find entries by extension
    pub fn find_by_extension(&self, ext: &str) -> Vec<&PackEntry> {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        self.entries
            .iter()
            .filter(|e| e.extension().is_some_and(|x| x.to_ascii_lowercase() == ext))
            .collect()
    }

    /// Entries whose payload is an encrypted script
    pub fn scripts(&self) -> impl Iterator<Item = &PackEntry> {
        self.entries.iter().filter(|e| e.is_script())
    }

    pub fn total_size(&self) -> u64 {
        self.entries.iter().map(|e| e.size() as u64).sum()
    }

    pub fn listing(&self) -> Vec<PackEntryInfo> {
        self.entries.iter().map(PackEntry::info).collect()
    }

    /// Insert keeping the position of an entry with the same name
    fn insert(&mut self, entry: PackEntry) {
        let key = entry.filename().to_ascii_lowercase();
        match self.index.get(&key) {
            Some(&idx) => self.entries[idx] = entry,
            None => {
                self.index.insert(key, self.entries.len());
                self.entries.push(entry);
            }
        }
    }

    fn rebuild_index(&mut self) {
        self.index = self
            .entries
            .iter()
            .enumerate()
            .map(|(idx, e)| (e.filename().to_ascii_lowercase(), idx))
            .collect();
    }
}

impl Default for PackArchive {
    fn default() -> Self {
        Self::create()
    }
}

impl HumanReadable for PackArchive {
    fn to_readable_string(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{} archive: {} entries, {} bytes of payload",
            self.header.signature_text(),
            self.len(),
            self.total_size()
        );
        for info in self.listing() {
            let _ = writeln!(
                out,
                "  {:<16} {:>10}  {:<6} {:08X}",
                info.name,
                info.formatted_size(),
                info.kind(),
                info.crc32
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_ignores_case() {
        let mut archive = PackArchive::create();
        archive.add_entry("Mission.BMS", &b"bms"[..]);

        assert!(archive.contains("mission.bms"));
        assert_eq!(archive.get("MISSION.bms").unwrap().size(), 3);
        assert!(archive.get("other.bms").is_none());
    }

    #[test]
    fn test_add_replaces_in_place() {
        let mut archive = PackArchive::create();
        archive.add_entry("a.txt", &b"one"[..]);
        archive.add_entry("b.txt", &b"two"[..]);
        archive.add_entry("A.TXT", &b"three"[..]);

        assert_eq!(archive.len(), 2);
        assert_eq!(archive.entries()[0].data.as_ref(), b"three");
        assert_eq!(archive.entries()[1].filename(), "b.txt");
    }

    #[test]
    fn test_long_names_are_truncated_and_still_found() {
        let mut archive = PackArchive::create();
        archive.add_entry("campaign_briefing.txt", &b"x"[..]);

        assert_eq!(archive.entries()[0].filename(), "campaign_briefi");
        assert!(archive.contains("campaign_briefing.txt"));
        assert!(archive.contains("campaign_briefi"));
    }

    #[test]
    fn test_remove_reindexes() {
        let mut archive = PackArchive::create();
        archive.add_entry("a", &b"1"[..]);
        archive.add_entry("b", &b"2"[..]);
        archive.add_entry("c", &b"3"[..]);

        assert!(archive.remove("B").is_some());
        assert!(archive.remove("b").is_none());
        assert_eq!(archive.get("c").unwrap().data.as_ref(), b"3");
        assert_eq!(archive.len(), 2);
    }

    #[test]
    fn test_decoded_missing_entry() {
        let archive = PackArchive::create();
        let err = archive.decoded("nope.txt").unwrap_err();
        assert!(matches!(err, ParseError::EntryNotFound(_)));
    }

    #[test]
    fn test_write_layout() {
        let mut archive = PackArchive::create();
        archive.add_entry("one", &b"AAAA"[..]);
        archive.add_entry("two", &b"BB"[..]);

        let bytes = archive.write().unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE + 6 + 2 * RECORD_DATA_SIZE);
        assert_eq!(&bytes[4..8], b"PFF4");
        assert_eq!(&bytes[8..12], &2i32.to_le_bytes());
        assert_eq!(&bytes[16..20], &26i32.to_le_bytes());
        assert_eq!(&bytes[20..26], b"AAAABB");

        // second record points just past the first payload
        let second = &bytes[26 + RECORD_DATA_SIZE..];
        assert_eq!(&second[4..8], &24i32.to_le_bytes());
        assert_eq!(&second[8..12], &2i32.to_le_bytes());
        assert_eq!(&second[12..16], &1i32.to_le_bytes());
    }

    #[test]
    fn test_find_by_extension() {
        let mut archive = PackArchive::create();
        archive.add_entry("a.scr", &b"SCR\x01"[..]);
        archive.add_entry("b.SCR", &b"x"[..]);
        archive.add_entry("c.bms", &b"y"[..]);

        assert_eq!(archive.find_by_extension(".scr").len(), 2);
        assert_eq!(archive.scripts().count(), 1);
    }
}
