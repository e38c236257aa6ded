//! `POLY` geometry chunk: a full quadtree of triangle-strip meshes
//!
//! Nodes are stored breadth first starting from a root covering the whole
//! map. A node is split into four quadrants while it is larger than the
//! leaf size; quadrant `i` sits at `(i % 2, i / 2)` half-size offsets.
//!
//! # Node Record
//! ```text
//! align 4
//! sector_x:10 sector_y:10 vertex_count:16 vertex_width:4
//! strip_count:7 flag:1 strip_chunk_size:8
//! vertex_count × (x:vertex_width y:vertex_width)
//! align 4
//! strip_count × {
//!     align 1
//!     index_count:16 vertex_count:15 flag:1
//!     per run of up to strip_chunk_size indices:
//!         width:4 bias:12 delta[run]:width      index = delta + bias
//! }
//! ```

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::depth_map::{DepthMap, HEIGHT_SCALE};
use super::header::TerrainHeader;
use crate::io::{bits_needed, BitReader, BitWriter};
use crate::traits::{ParseError, ParseResult};

const MAX_INDEX_WIDTH: u32 = 15;
const MAX_INDEX_BIAS: u32 = 0x0FFF;
const MAX_VERTEX_WIDTH: u32 = 15;
/// Run length used when fresh strips are packed into a node without one
pub const DEFAULT_STRIP_CHUNK_SIZE: u8 = 32;

/// A vertex in node-local grid coordinates with its sampled height
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TerrainVertex {
    pub x: u16,
    pub y: u16,
    /// World height, raw depth / 256
    pub height: f32,
}

/// Packing parameters of one index run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRun {
    pub width: u8,
    pub bias: u16,
}

impl IndexRun {
    /// Smallest run encoding that holds every index in `run`
    pub fn minimal(run: &[u32]) -> ParseResult<Self> {
        let (Some(&min), Some(&max)) = (run.iter().min(), run.iter().max()) else {
            return Ok(Self { width: 0, bias: 0 });
        };
        let bias = min.min(MAX_INDEX_BIAS);
        let width = bits_needed(max - bias);
        if width > MAX_INDEX_WIDTH {
            return Err(ParseError::overflow("strip_run_width", u64::from(width), u64::from(MAX_INDEX_WIDTH)));
        }
        Ok(Self {
            width: width as u8,
            bias: bias as u16,
        })
    }
}

/// Triangle strip indexing into its node's vertices
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriangleStrip {
    pub vertex_count: u16,
    pub flag: bool,
    pub indices: Vec<u32>,
    pub runs: Vec<IndexRun>,
}

impl TriangleStrip {
    /// Build a strip, packing its indices in runs of `chunk_size`
    pub fn new(vertex_count: u16, indices: Vec<u32>, chunk_size: u8) -> ParseResult<Self> {
        let runs = pack_runs(&indices, chunk_size)?;
        Ok(Self {
            vertex_count,
            flag: false,
            indices,
            runs,
        })
    }

    fn read(reader: &mut BitReader<'_>, chunk_size: u8) -> ParseResult<Self> {
        reader.align_to_byte();
        let offset = reader.byte_position() as u64;
        let index_count = reader.read_field("strip_index_count", 16)?;
        let vertex_count = reader.read_field("strip_vertex_count", 15)? as u16;
        let flag = reader.read_flag("strip_flag")?;

        if index_count > 0 && chunk_size == 0 {
            return Err(ParseError::invariant(
                offset,
                "strip_chunk_size",
                format!("strip holds {index_count} indices but the run length is zero"),
            ));
        }

        let mut indices = Vec::with_capacity(index_count as usize);
        let mut runs = Vec::new();
        let mut left = index_count;
        while left > 0 {
            let take = left.min(u32::from(chunk_size));
            let width = reader.read_field("strip_run_width", 4)?;
            let bias = reader.read_field("strip_run_bias", 12)?;
            for _ in 0..take {
                indices.push(reader.read_width("strip_index", width)? + bias);
            }
            runs.push(IndexRun {
                width: width as u8,
                bias: bias as u16,
            });
            left -= take;
        }

        Ok(Self {
            vertex_count,
            flag,
            indices,
            runs,
        })
    }

    fn write(&self, writer: &mut BitWriter, chunk_size: u8) -> ParseResult<()> {
        let expected_runs = run_count(self.indices.len(), chunk_size)?;
        if self.runs.len() != expected_runs {
            return Err(ParseError::InvalidStructure(format!(
                "strip with {} indices in runs of {chunk_size} needs {expected_runs} run encodings, has {}",
                self.indices.len(),
                self.runs.len()
            )));
        }

        writer.align_to_byte();
        writer.write_field("strip_index_count", self.indices.len() as u32, 16)?;
        writer.write_field("strip_vertex_count", u32::from(self.vertex_count), 15)?;
        writer.write_flag("strip_flag", self.flag)?;

        if chunk_size == 0 {
            return Ok(());
        }
        for (run, indices) in self.runs.iter().zip(self.indices.chunks(usize::from(chunk_size))) {
            let width = u32::from(run.width);
            let bias = u32::from(run.bias);
            writer.write_field("strip_run_width", width, 4)?;
            writer.write_field("strip_run_bias", bias, 12)?;
            for &index in indices {
                let delta = index.checked_sub(bias).ok_or_else(|| {
                    ParseError::InvalidStructure(format!("index {index} below its run bias {bias}"))
                })?;
                writer.write_width("strip_index", delta, width)?;
            }
        }
        Ok(())
    }
}

fn run_count(indices: usize, chunk_size: u8) -> ParseResult<usize> {
    match (indices, chunk_size) {
        (0, _) => Ok(0),
        (_, 0) => Err(ParseError::InvalidStructure(format!(
            "{indices} strip indices with a zero run length"
        ))),
        (n, size) => Ok(n.div_ceil(usize::from(size))),
    }
}

fn pack_runs(indices: &[u32], chunk_size: u8) -> ParseResult<Vec<IndexRun>> {
    run_count(indices.len(), chunk_size)?;
    if indices.is_empty() {
        return Ok(Vec::new());
    }
    indices.chunks(usize::from(chunk_size)).map(IndexRun::minimal).collect()
}

/// One quadtree node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuadTreeNode {
    pub sector_x: u16,
    pub sector_y: u16,
    pub size: u32,
    pub level: u32,
    pub vertex_width: u8,
    pub flag: bool,
    pub strip_chunk_size: u8,
    pub vertices: Vec<TerrainVertex>,
    pub strips: Vec<TriangleStrip>,
    pub parent: Option<usize>,
    pub children: [Option<usize>; 4],
}

impl QuadTreeNode {
    fn empty(sector_x: u32, sector_y: u32, size: u32, level: u32, parent: Option<usize>) -> Self {
        Self {
            sector_x: sector_x as u16,
            sector_y: sector_y as u16,
            size,
            level,
            vertex_width: 0,
            flag: false,
            strip_chunk_size: 0,
            vertices: Vec::new(),
            strips: Vec::new(),
            parent,
            children: [None; 4],
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.iter().all(Option::is_none)
    }

    fn read_record(&mut self, reader: &mut BitReader<'_>, depth: &DepthMap) -> ParseResult<()> {
        reader.align_to_4_bytes();
        let offset = reader.byte_position() as u64;
        let sector_x = reader.read_field("sector_x", 10)?;
        let sector_y = reader.read_field("sector_y", 10)?;
        let vertex_count = reader.read_field("vertex_count", 16)?;
        let vertex_width = reader.read_field("vertex_width", 4)?;
        let strip_count = reader.read_field("strip_count", 7)?;
        let flag = reader.read_flag("node_flag")?;
        let strip_chunk_size = reader.read_field("strip_chunk_size", 8)? as u8;

        let mut vertices = Vec::with_capacity(vertex_count as usize);
        for _ in 0..vertex_count {
            let x = reader.read_width("vertex_x", vertex_width)?;
            let y = reader.read_width("vertex_y", vertex_width)?;
            let raw = sample_height(depth, sector_y + y, sector_x + x, offset)?;
            vertices.push(TerrainVertex {
                x: x as u16,
                y: y as u16,
                height: f32::from(raw) / HEIGHT_SCALE,
            });
        }
        reader.align_to_4_bytes();

        let mut strips = Vec::with_capacity(strip_count as usize);
        for _ in 0..strip_count {
            strips.push(TriangleStrip::read(reader, strip_chunk_size)?);
        }

        self.sector_x = sector_x as u16;
        self.sector_y = sector_y as u16;
        self.vertex_width = vertex_width as u8;
        self.flag = flag;
        self.strip_chunk_size = strip_chunk_size;
        self.vertices = vertices;
        self.strips = strips;
        Ok(())
    }

    fn write_record(&self, writer: &mut BitWriter) -> ParseResult<()> {
        let width = u32::from(self.vertex_width);

        writer.align_to_4_bytes();
        writer.write_field("sector_x", u32::from(self.sector_x), 10)?;
        writer.write_field("sector_y", u32::from(self.sector_y), 10)?;
        writer.write_field("vertex_count", self.vertices.len() as u32, 16)?;
        writer.write_field("vertex_width", width, 4)?;
        writer.write_field("strip_count", self.strips.len() as u32, 7)?;
        writer.write_flag("node_flag", self.flag)?;
        writer.write_field("strip_chunk_size", u32::from(self.strip_chunk_size), 8)?;

        for vertex in &self.vertices {
            writer.write_width("vertex_x", u32::from(vertex.x), width)?;
            writer.write_width("vertex_y", u32::from(vertex.y), width)?;
        }
        writer.align_to_4_bytes();

        for strip in &self.strips {
            strip.write(writer, self.strip_chunk_size)?;
        }
        Ok(())
    }

    /// Choose minimal vertex and index widths for the current contents
    pub fn reencode(&mut self) -> ParseResult<()> {
        let widest = self
            .vertices
            .iter()
            .map(|v| bits_needed(u32::from(v.x.max(v.y))))
            .max()
            .unwrap_or(0);
        if widest > MAX_VERTEX_WIDTH {
            return Err(ParseError::overflow("vertex_width", u64::from(widest), u64::from(MAX_VERTEX_WIDTH)));
        }
        self.vertex_width = widest as u8;

        if self.strip_chunk_size == 0 && self.strips.iter().any(|s| !s.indices.is_empty()) {
            self.strip_chunk_size = DEFAULT_STRIP_CHUNK_SIZE;
        }
        for strip in &mut self.strips {
            strip.runs = pack_runs(&strip.indices, self.strip_chunk_size)?;
        }
        Ok(())
    }
}

fn sample_height(depth: &DepthMap, row: u32, col: u32, offset: u64) -> ParseResult<i16> {
    let index = depth.wrapped_index(row, col);
    depth.heights.get(index).copied().ok_or_else(|| {
        ParseError::invariant(
            offset,
            "vertex_height",
            format!(
                "depth index {index} (row {}, col {}) outside a {}x{} map",
                row & super::depth_map::WRAP_MASK,
                col & super::depth_map::WRAP_MASK,
                depth.rows,
                depth.cols
            ),
        )
    })
}

/// Append the four quadrants of `nodes[index]` when it is above leaf size
fn split(nodes: &mut Vec<QuadTreeNode>, queue: &mut VecDeque<usize>, index: usize, min_size: u32) {
    let (x, y, size, level) = {
        let node = &nodes[index];
        (u32::from(node.sector_x), u32::from(node.sector_y), node.size, node.level)
    };
    if size <= min_size {
        return;
    }
    let half = size / 2;
    for i in 0..4 {
        let child = nodes.len();
        let dx = if i % 2 == 1 { half } else { 0 };
        let dy = if i / 2 == 1 { half } else { 0 };
        nodes.push(QuadTreeNode::empty(x + dx, y + dy, half, level + 1, Some(index)));
        nodes[index].children[i] = Some(child);
        queue.push_back(child);
    }
}

/// Arena-backed quadtree; index 0 is the root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuadTree {
    pub nodes: Vec<QuadTreeNode>,
}

impl QuadTree {
    /// Allocate a full tree of empty nodes for `header`, in breadth-first
    /// order
    pub fn full(header: &TerrainHeader) -> Self {
        let min_size = header.min_node_size().max(1);
        let mut nodes = vec![QuadTreeNode::empty(0, 0, header.initial_size.max(0) as u32, 0, None)];
        let mut queue = VecDeque::from([0usize]);

        while let Some(index) = queue.pop_front() {
            split(&mut nodes, &mut queue, index, min_size);
        }

        Self { nodes }
    }

    /// Decode the `POLY` chunk body. Child placement follows the sector
    /// coordinates each parent record carries.
    pub fn read(reader: &mut BitReader<'_>, header: &TerrainHeader, depth: &DepthMap) -> ParseResult<Self> {
        let min_size = header.min_node_size().max(1);
        let mut nodes = vec![QuadTreeNode::empty(0, 0, header.initial_size.max(0) as u32, 0, None)];
        let mut queue = VecDeque::from([0usize]);

        while let Some(index) = queue.pop_front() {
            nodes[index]
                .read_record(reader, depth)
                .map_err(|e| e.with_context(format!("quadtree node {index}")))?;

            split(&mut nodes, &mut queue, index, min_size);
        }

        tracing::debug!(nodes = nodes.len(), "Decoded terrain quadtree");
        Ok(Self { nodes })
    }

    pub fn write(&self, writer: &mut BitWriter) -> ParseResult<()> {
        for index in self.breadth_first() {
            self.nodes[index]
                .write_record(writer)
                .map_err(|e| e.with_context(format!("quadtree node {index}")))?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn root(&self) -> Option<&QuadTreeNode> {
        self.nodes.first()
    }

    pub fn node(&self, index: usize) -> Option<&QuadTreeNode> {
        self.nodes.get(index)
    }

    pub fn node_mut(&mut self, index: usize) -> Option<&mut QuadTreeNode> {
        self.nodes.get_mut(index)
    }

    pub fn children_of(&self, index: usize) -> impl Iterator<Item = usize> + '_ {
        self.nodes
            .get(index)
            .into_iter()
            .flat_map(|node| node.children.iter().flatten().copied())
    }

    pub fn parent_of(&self, index: usize) -> Option<usize> {
        self.nodes.get(index)?.parent
    }

    /// Node indices in breadth-first order from the root
    pub fn breadth_first(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.nodes.len());
        if self.nodes.is_empty() {
            return order;
        }
        let mut queue = VecDeque::from([0usize]);
        while let Some(index) = queue.pop_front() {
            order.push(index);
            queue.extend(self.children_of(index));
        }
        order
    }

    /// Node indices in depth-first pre-order from the root
    pub fn depth_first(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = if self.nodes.is_empty() { Vec::new() } else { vec![0usize] };
        while let Some(index) = stack.pop() {
            order.push(index);
            let children: Vec<usize> = self.children_of(index).collect();
            stack.extend(children.into_iter().rev());
        }
        order
    }

    pub fn leaves(&self) -> impl Iterator<Item = &QuadTreeNode> {
        self.nodes.iter().filter(|node| node.is_leaf())
    }

    pub fn nodes_at_level(&self, level: u32) -> impl Iterator<Item = &QuadTreeNode> {
        self.nodes.iter().filter(move |node| node.level == level)
    }

    pub fn vertex_count(&self) -> usize {
        self.nodes.iter().map(|node| node.vertices.len()).sum()
    }

    pub fn strip_count(&self) -> usize {
        self.nodes.iter().map(|node| node.strips.len()).sum()
    }

    /// Resample every vertex height from `depth`
    pub fn refresh_heights(&mut self, depth: &DepthMap) -> ParseResult<()> {
        for node in &mut self.nodes {
            let (sx, sy) = (u32::from(node.sector_x), u32::from(node.sector_y));
            for vertex in &mut node.vertices {
                let raw = sample_height(depth, sy + u32::from(vertex.y), sx + u32::from(vertex.x), 0)?;
                vertex.height = f32::from(raw) / HEIGHT_SCALE;
            }
        }
        Ok(())
    }

    /// Recompute minimal encodings for every node
    pub fn reencode(&mut self) -> ParseResult<()> {
        self.nodes.iter_mut().try_for_each(QuadTreeNode::reencode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use novakit_core::FourCC;

    fn header(size: i16, levels: i16) -> TerrainHeader {
        TerrainHeader::new(FourCC(*b"CPT1"), size, levels)
    }

    #[test]
    fn test_full_tree_shape() {
        let tree = QuadTree::full(&header(64, 3));
        assert_eq!(tree.len(), 21);
        assert_eq!(tree.leaves().count(), 16);
        assert!(tree.leaves().all(|leaf| leaf.size == 16));

        let level1: Vec<(u16, u16)> = tree.nodes_at_level(1).map(|n| (n.sector_x, n.sector_y)).collect();
        assert_eq!(level1, vec![(0, 0), (32, 0), (0, 32), (32, 32)]);
        assert_eq!(tree.parent_of(5), Some(1));
        assert_eq!(tree.breadth_first(), (0..21).collect::<Vec<_>>());
    }

    #[test]
    fn test_depth_first_order() {
        let tree = QuadTree::full(&header(8, 2));
        assert_eq!(tree.depth_first(), vec![0, 1, 2, 3, 4]);

        let tree = QuadTree::full(&header(8, 3));
        assert_eq!(&tree.depth_first()[..6], &[0, 1, 5, 6, 7, 8]);
    }

    #[test]
    fn test_index_run_packing() {
        let strip = TriangleStrip::new(4, vec![10, 12, 11, 13, 40], 4).unwrap();
        assert_eq!(
            strip.runs,
            vec![IndexRun { width: 2, bias: 10 }, IndexRun { width: 0, bias: 40 }]
        );
    }

    #[test]
    fn test_strip_round_trip_with_runs() {
        let strip = TriangleStrip::new(6, vec![0, 1, 2, 3, 4, 5, 4000, 4100], 3).unwrap();
        let mut writer = BitWriter::new();
        writer.write_field("pad", 1, 3).unwrap();
        strip.write(&mut writer, 3).unwrap();

        let bytes = writer.into_bytes();
        let mut reader = BitReader::new(&bytes);
        reader.read_field("pad", 3).unwrap();
        assert_eq!(TriangleStrip::read(&mut reader, 3).unwrap(), strip);
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let mut writer = BitWriter::new();
        writer.write_field("count", 2, 16).unwrap();
        writer.write_field("verts", 2, 15).unwrap();
        writer.write_flag("flag", false).unwrap();
        let bytes = writer.into_bytes();

        let err = TriangleStrip::read(&mut BitReader::new(&bytes), 0).unwrap_err();
        assert_eq!(err.kind(), crate::traits::ErrorKind::InvariantViolated);
    }

    #[test]
    fn test_bias_caps_at_twelve_bits() {
        let run = IndexRun::minimal(&[5000, 5001]).unwrap();
        assert_eq!(run.bias, 4095);
        assert_eq!(run.width, bits_needed(5001 - 4095) as u8);
    }
}
