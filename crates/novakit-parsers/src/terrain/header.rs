//! Fixed 160-byte terrain header

use serde::{Deserialize, Serialize};

use novakit_core::FourCC;

use crate::io::{BitReader, BitWriter};
use crate::traits::{ParseError, ParseResult};

pub const HEADER_SIZE: usize = 0xA0;
pub const RESERVED_SIZE: usize = HEADER_SIZE - 8;

/// Deepest quadtree the header may describe
pub const MAX_LOD_LEVELS: i16 = 11;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerrainHeader {
    pub magic: FourCC,
    /// Edge length of the depth map and of the root quadtree node
    pub initial_size: i16,
    pub lod_levels: i16,
    /// Opaque tail of the header, kept verbatim
    pub reserved: Vec<u8>,
}

impl TerrainHeader {
    pub fn new(magic: FourCC, initial_size: i16, lod_levels: i16) -> Self {
        Self {
            magic,
            initial_size,
            lod_levels,
            reserved: vec![0; RESERVED_SIZE],
        }
    }

    pub fn read(reader: &mut BitReader<'_>) -> ParseResult<Self> {
        let magic = FourCC(reader.read_array("terrain_magic")?);
        let initial_size = reader.read_i16("initial_size")?;
        let lod_levels = reader.read_i16("lod_levels")?;
        let reserved = reader.read_bytes_field("header_reserved", RESERVED_SIZE)?;

        let header = Self {
            magic,
            initial_size,
            lod_levels,
            reserved,
        };
        header.check()?;
        Ok(header)
    }

    pub fn write(&self, writer: &mut BitWriter) -> ParseResult<()> {
        self.check()?;
        if self.reserved.len() != RESERVED_SIZE {
            return Err(ParseError::InvalidStructure(format!(
                "terrain header reserved span is {} bytes, expected {RESERVED_SIZE}",
                self.reserved.len()
            )));
        }
        writer.write_bytes(&self.magic.0);
        writer.write_i16(self.initial_size);
        writer.write_i16(self.lod_levels);
        writer.write_bytes(&self.reserved);
        Ok(())
    }

    fn check(&self) -> ParseResult<()> {
        if self.initial_size <= 0 {
            return Err(ParseError::malformed(
                4,
                "initial_size",
                format!("size must be positive, found {}", self.initial_size),
            ));
        }
        if !(1..=MAX_LOD_LEVELS).contains(&self.lod_levels) {
            return Err(ParseError::malformed(
                6,
                "lod_levels",
                format!("expected 1..={MAX_LOD_LEVELS}, found {}", self.lod_levels),
            ));
        }
        if self.min_node_size() == 0 {
            return Err(ParseError::malformed(
                6,
                "lod_levels",
                format!("{} levels subdivide size {} below one cell", self.lod_levels, self.initial_size),
            ));
        }
        Ok(())
    }

    /// Edge length of the leaf nodes: `initial_size / 2^(levels - 1)`
    pub fn min_node_size(&self) -> u32 {
        let levels = self.lod_levels.max(1) as u32;
        (self.initial_size.max(0) as u32) >> (levels - 1)
    }

    /// Node count of a full quadtree: `(4^levels - 1) / 3`
    pub fn total_node_count(&self) -> usize {
        let levels = self.lod_levels.max(0) as u32;
        (4usize.pow(levels) - 1) / 3
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::ErrorKind;

    #[test]
    fn test_derived_sizes() {
        let header = TerrainHeader::new(FourCC(*b"CPT1"), 1024, 6);
        assert_eq!(header.min_node_size(), 32);
        assert_eq!(header.total_node_count(), 1365);

        let single = TerrainHeader::new(FourCC(*b"CPT1"), 64, 1);
        assert_eq!(single.min_node_size(), 64);
        assert_eq!(single.total_node_count(), 1);
    }

    #[test]
    fn test_header_is_160_bytes() {
        let mut header = TerrainHeader::new(FourCC(*b"CPT1"), 256, 3);
        header.reserved[10] = 0xEE;

        let mut writer = BitWriter::new();
        header.write(&mut writer).unwrap();
        let bytes = writer.into_bytes();
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(&bytes[4..8], &[0x00, 0x01, 0x03, 0x00]);

        let mut reader = BitReader::new(&bytes);
        assert_eq!(TerrainHeader::read(&mut reader).unwrap(), header);
    }

    #[test]
    fn test_rejects_impossible_subdivision() {
        let mut writer = BitWriter::new();
        let header = TerrainHeader::new(FourCC(*b"CPT1"), 4, 5);
        assert_eq!(header.write(&mut writer).unwrap_err().kind(), ErrorKind::MalformedHeader);
    }
}
