//! Compressed quadtree terrain (`.cpt`)
//!
//! The whole file is one bit stream read least-significant bit first.
//!
//! # Format Structure
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │ Header (160 bytes)                                          │
//! │   magic[4]  initial_size:i16  lod_levels:i16  reserved[152] │
//! ├─────────────────────────────────────────────────────────────┤
//! │ Chunk stream, each chunk byte aligned                       │
//! │   "CDEP"  variable-width depth rows      (depth_map)        │
//! │   "POLY"  breadth-first quadtree nodes   (quadtree)         │
//! │   0000    optional terminator                               │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Vertex heights are sampled from the depth map while `POLY` decodes, so
//! `CDEP` must come first.

pub mod depth_map;
pub mod header;
pub mod quadtree;

pub use depth_map::{DepthMap, RowEncoding};
pub use header::TerrainHeader;
pub use quadtree::{IndexRun, QuadTree, QuadTreeNode, TerrainVertex, TriangleStrip};

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use novakit_core::FourCC;

use crate::io::{BitReader, BitWriter};
use crate::traits::{Decoded, HumanReadable, ParseError, ParseOptions, ParseResult, Parser};
use crate::validation::Validator;

pub const CDEP: FourCC = FourCC(*b"CDEP");
pub const POLY: FourCC = FourCC(*b"POLY");

/// A decoded terrain file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerrainFile {
    pub header: TerrainHeader,
    pub depth_map: Option<DepthMap>,
    pub quadtree: Option<QuadTree>,
    /// Chunk tags in file order, unknown tags included
    pub chunk_order: Vec<FourCC>,
    /// Whether the chunk stream ended with a zero tag
    pub terminated: bool,
    /// Bytes after the terminator
    pub trailing: Vec<u8>,
}

impl TerrainFile {
    /// Assemble a file from parts, choosing minimal encodings throughout
    pub fn build(header: TerrainHeader, depth_map: DepthMap, mut quadtree: QuadTree) -> ParseResult<Self> {
        quadtree.refresh_heights(&depth_map)?;
        quadtree.reencode()?;
        Ok(Self {
            header,
            depth_map: Some(depth_map),
            quadtree: Some(quadtree),
            chunk_order: vec![CDEP, POLY],
            terminated: true,
            trailing: Vec::new(),
        })
    }

    /// Raw height at grid column `x`, row `y`
    pub fn height_at(&self, x: u32, y: u32) -> Option<i16> {
        self.depth_map.as_ref()?.height_at(x, y)
    }

    pub fn node_count(&self) -> usize {
        self.quadtree.as_ref().map_or(0, QuadTree::len)
    }
}

impl HumanReadable for TerrainFile {
    fn to_readable_string(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Terrain {}", self.header.magic);
        let _ = writeln!(
            out,
            "  Size: {}  LOD levels: {}  Leaf size: {}",
            self.header.initial_size,
            self.header.lod_levels,
            self.header.min_node_size()
        );
        if let Some(depth) = &self.depth_map {
            let _ = write!(out, "  Depth map: {}x{}", depth.rows, depth.cols);
            if let Some((min, max)) = depth.min_max() {
                let _ = write!(out, "  heights {min}..{max}");
            }
            let _ = writeln!(out);
        }
        if let Some(tree) = &self.quadtree {
            let _ = writeln!(
                out,
                "  Quadtree: {} nodes, {} vertices, {} strips",
                tree.len(),
                tree.vertex_count(),
                tree.strip_count()
            );
        }
        out
    }
}

/// Terrain file codec
pub struct TerrainParser;

impl TerrainParser {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TerrainParser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser for TerrainParser {
    type Output = TerrainFile;

    fn extensions(&self) -> &[&str] {
        &["cpt"]
    }

    fn name(&self) -> &str {
        "CPT Terrain Parser"
    }

    fn decode(&self, data: &[u8], options: &ParseOptions) -> ParseResult<Decoded<TerrainFile>> {
        let mut reader = BitReader::new(data);
        let mut validator = Validator::new(options);

        let header = TerrainHeader::read(&mut reader)?;
        let mut depth_map = None;
        let mut quadtree = None;
        let mut chunk_order = Vec::new();
        let mut terminated = false;

        while !reader.is_at_end() {
            let offset = reader.byte_position() as u64;
            let tag = FourCC(reader.read_array("chunk_tag")?);
            if tag.is_zero() {
                terminated = true;
                break;
            }
            chunk_order.push(tag);

            match tag {
                CDEP => {
                    let map = DepthMap::read(&mut reader).map_err(|e| e.with_context("CDEP chunk"))?;
                    let size = u16::try_from(header.initial_size).unwrap_or(0);
                    if map.rows != size || map.cols != size {
                        validator.report(
                            offset + 4,
                            "depth_map_size",
                            format!("{}x{} depth map for initial size {}", map.rows, map.cols, header.initial_size),
                        )?;
                    }
                    depth_map = Some(map);
                }
                POLY => {
                    let Some(depth) = depth_map.as_ref() else {
                        return Err(ParseError::InvalidStructure(format!(
                            "POLY chunk at offset {offset} precedes the CDEP depth map"
                        )));
                    };
                    let tree = QuadTree::read(&mut reader, &header, depth).map_err(|e| e.with_context("POLY chunk"))?;
                    if tree.len() != header.total_node_count() {
                        validator.report(
                            offset,
                            "node_count",
                            format!("{} nodes, expected {}", tree.len(), header.total_node_count()),
                        )?;
                    }
                    quadtree = Some(tree);
                }
                other => {
                    if !options.skip_unknown_chunks {
                        return Err(ParseError::InvalidStructure(format!(
                            "unknown terrain chunk {other} at offset {offset}"
                        )));
                    }
                    validator.report(offset, "chunk_tag", format!("unknown terrain chunk {other}"))?;
                }
            }
            reader.align_to_byte();
        }

        let trailing = if terminated {
            let rest = reader.len() - reader.byte_position();
            reader.read_bytes_field("trailing", rest)?
        } else {
            Vec::new()
        };

        tracing::debug!(chunks = chunk_order.len(), terminated, "Decoded terrain");
        Ok(Decoded::new(
            TerrainFile {
                header,
                depth_map,
                quadtree,
                chunk_order,
                terminated,
                trailing,
            },
            validator.finish(),
        ))
    }

    fn serialize(&self, terrain: &TerrainFile) -> ParseResult<Vec<u8>> {
        let mut writer = BitWriter::with_capacity(header::HEADER_SIZE);
        terrain.header.write(&mut writer)?;

        for &tag in &terrain.chunk_order {
            writer.write_bytes(&tag.0);
            match tag {
                CDEP => {
                    let map = terrain
                        .depth_map
                        .as_ref()
                        .ok_or_else(|| ParseError::InvalidStructure("CDEP listed without a depth map".into()))?;
                    map.write(&mut writer)?;
                }
                POLY => {
                    let tree = terrain
                        .quadtree
                        .as_ref()
                        .ok_or_else(|| ParseError::InvalidStructure("POLY listed without a quadtree".into()))?;
                    tree.write(&mut writer)?;
                }
                _ => {}
            }
            writer.align_to_byte();
        }

        if terrain.terminated {
            writer.write_bytes(&[0; 4]);
            writer.write_bytes(&terrain.trailing);
        }
        Ok(writer.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_terrain() -> TerrainFile {
        let header = TerrainHeader::new(FourCC(*b"CPT1"), 8, 2);
        let heights: Vec<i16> = (0..64).map(|i| (i * 37 % 500) as i16 - 100).collect();
        let depth = DepthMap::from_heights(8, 8, heights).unwrap();

        let mut tree = QuadTree::full(&header);
        let root = tree.node_mut(0).unwrap();
        root.vertices = vec![
            TerrainVertex { x: 0, y: 0, height: 0.0 },
            TerrainVertex { x: 7, y: 0, height: 0.0 },
            TerrainVertex { x: 0, y: 7, height: 0.0 },
            TerrainVertex { x: 7, y: 7, height: 0.0 },
        ];
        root.strips = vec![TriangleStrip {
            vertex_count: 4,
            flag: false,
            indices: vec![0, 1, 2, 3],
            runs: Vec::new(),
        }];

        TerrainFile::build(header, depth, tree).unwrap()
    }

    #[test]
    fn test_build_samples_heights() {
        let terrain = small_terrain();
        let root = terrain.quadtree.as_ref().unwrap().root().unwrap();
        let expected = f32::from(terrain.height_at(7, 7).unwrap()) / 256.0;
        assert_eq!(root.vertices[3].height, expected);
        assert_eq!(root.vertex_width, 3);
        assert_eq!(root.strip_chunk_size, quadtree::DEFAULT_STRIP_CHUNK_SIZE);
    }

    #[test]
    fn test_round_trip() {
        let terrain = small_terrain();
        let parser = TerrainParser::new();
        let bytes = parser.serialize(&terrain).unwrap();
        assert_eq!(&bytes[160..164], b"CDEP");

        let decoded = parser.decode(&bytes, &ParseOptions::default()).unwrap();
        assert!(decoded.report.is_clean(), "{:?}", decoded.report);
        assert_eq!(decoded.value, terrain);
        assert_eq!(parser.serialize(&decoded.value).unwrap(), bytes);
    }

    #[test]
    fn test_poly_before_cdep() {
        let mut terrain = small_terrain();
        terrain.chunk_order = vec![POLY, CDEP];
        let parser = TerrainParser::new();
        let bytes = parser.serialize(&terrain).unwrap();
        assert!(parser.parse(&bytes).is_err());
    }

    #[test]
    fn test_stream_may_end_without_terminator() {
        let mut terrain = small_terrain();
        terrain.terminated = false;
        let parser = TerrainParser::new();
        let bytes = parser.serialize(&terrain).unwrap();
        let decoded = parser.parse(&bytes).unwrap();
        assert!(!decoded.terminated);
        assert_eq!(decoded.node_count(), 5);
    }
}
