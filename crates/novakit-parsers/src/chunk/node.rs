//! Chunk tree nodes
//!
//! ```text
//! +--------+------------------------------+----------------------------+
//! | id[4]  | flag|length (u32 LE)          | content                    |
//! +--------+------------------------------+----------------------------+
//!            bit 31    : container flag
//!            bits 24-30: unused, kept for re-encoding
//!            bits 0-23 : content length in bytes
//! ```
//!
//! A container's content is its children back to back; a leaf's content
//! is an opaque payload.

use serde::{Deserialize, Serialize};

use novakit_core::FourCC;

use crate::io::ByteReader;
use crate::traits::{ParseError, ParseOptions, ParseResult};
use crate::validation::{InvariantCheck, Validator};

/// Container flag in the length word
pub const CONTAINER_FLAG: u32 = 1 << 31;
/// Content length mask
pub const LENGTH_MASK: u32 = 0x00FF_FFFF;
/// Largest content a single node can declare
pub const MAX_CONTENT_LENGTH: usize = LENGTH_MASK as usize;
/// Identifier plus length word
pub const NODE_HEADER_SIZE: usize = 8;

const SPARE_SHIFT: u32 = 24;
const SPARE_MASK: u32 = 0x7F;

/// Payload of a chunk node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkContent {
    Leaf(Vec<u8>),
    Container(Vec<ChunkNode>),
}

/// One node of a chunk tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkNode {
    pub id: FourCC,
    pub content: ChunkContent,
    /// Bits 24-30 of the length word as read
    #[serde(default, skip_serializing_if = "is_zero")]
    pub spare_bits: u8,
}

fn is_zero(bits: &u8) -> bool {
    *bits == 0
}

impl ChunkNode {
    pub fn leaf(id: FourCC, data: Vec<u8>) -> Self {
        Self {
            id,
            content: ChunkContent::Leaf(data),
            spare_bits: 0,
        }
    }

    pub fn container(id: FourCC, children: Vec<ChunkNode>) -> Self {
        Self {
            id,
            content: ChunkContent::Container(children),
            spare_bits: 0,
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(self.content, ChunkContent::Container(_))
    }

    /// Leaf payload, `None` for containers
    pub fn data(&self) -> Option<&[u8]> {
        match &self.content {
            ChunkContent::Leaf(data) => Some(data),
            ChunkContent::Container(_) => None,
        }
    }

    /// Child nodes, empty for leaves
    pub fn children(&self) -> &[ChunkNode] {
        match &self.content {
            ChunkContent::Container(children) => children,
            ChunkContent::Leaf(_) => &[],
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Vec<ChunkNode>> {
        match &mut self.content {
            ChunkContent::Container(children) => Some(children),
            ChunkContent::Leaf(_) => None,
        }
    }

    /// First child with the given identifier
    pub fn child(&self, id: FourCC) -> Option<&ChunkNode> {
        self.children().iter().find(|c| c.id == id)
    }

    /// All children with the given identifier, in file order
    pub fn children_with(&self, id: FourCC) -> impl Iterator<Item = &ChunkNode> {
        self.children().iter().filter(move |c| c.id == id)
    }

    /// Resolve a slash separated path whose first segment names this node,
    /// e.g. `"ROOT/RDTA/RLOD"`
    pub fn find_path(&self, path: &str) -> Option<&ChunkNode> {
        let mut segments = path.split('/').filter(|s| !s.is_empty());
        let first = FourCC::from_name(segments.next()?)?;
        if first != self.id {
            return None;
        }

        let mut current = self;
        for segment in segments {
            current = current.child(FourCC::from_name(segment)?)?;
        }
        Some(current)
    }

    /// Depth-first pre-order traversal with node depth
    pub fn walk<'a, F: FnMut(&'a ChunkNode, usize)>(&'a self, mut visit: F) {
        fn inner<'a, F: FnMut(&'a ChunkNode, usize)>(node: &'a ChunkNode, depth: usize, visit: &mut F) {
            visit(node, depth);
            for child in node.children() {
                inner(child, depth + 1, visit);
            }
        }
        inner(self, 0, &mut visit);
    }

    /// Number of nodes in this subtree, including this one
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        self.walk(|_, _| count += 1);
        count
    }

    /// Serialized size of this node, header included
    pub fn encoded_len(&self) -> usize {
        NODE_HEADER_SIZE
            + match &self.content {
                ChunkContent::Leaf(data) => data.len(),
                ChunkContent::Container(children) => children.iter().map(ChunkNode::encoded_len).sum(),
            }
    }

    /// Decode one node (and its subtree) at the reader's position
    pub fn read(
        reader: &mut ByteReader<'_>,
        options: &ParseOptions,
        validator: &mut Validator,
    ) -> ParseResult<Self> {
        Self::read_at_depth(reader, 0, options, validator)
    }

    fn read_at_depth(
        reader: &mut ByteReader<'_>,
        depth: u32,
        options: &ParseOptions,
        validator: &mut Validator,
    ) -> ParseResult<Self> {
        let start = reader.offset();
        if depth > options.max_nesting_depth {
            return Err(ParseError::invariant(
                start,
                "chunk_depth",
                format!("nesting deeper than {}", options.max_nesting_depth),
            ));
        }

        let id = FourCC(reader.read_array("chunk_id")?);
        let word = reader.read_u32("chunk_length")?;
        let length = (word & LENGTH_MASK) as usize;

        let spare_bits = ((word >> SPARE_SHIFT) & SPARE_MASK) as u8;
        validator.check(start + 4, InvariantCheck::zero("chunk_flags_unused", i64::from(spare_bits)))?;

        if word & CONTAINER_FLAG == 0 {
            let data = reader.read_bytes("chunk_data", length)?.to_vec();
            tracing::trace!(id = %id, length, "Leaf chunk");
            return Ok(Self {
                spare_bits,
                ..Self::leaf(id, data)
            });
        }

        if length > reader.remaining() {
            return Err(ParseError::truncated(
                reader.offset(),
                format!("{id} content"),
                length as u64,
                reader.remaining() as u64,
            ));
        }

        let end = reader.position() + length;
        let mut children = Vec::new();
        while reader.position() < end {
            let child = Self::read_at_depth(reader, depth + 1, options, validator)?;
            children.push(child);
        }

        if reader.position() != end {
            return Err(ParseError::invariant(
                start,
                format!("{id} content"),
                format!(
                    "children consumed {} bytes, container declares {length}",
                    reader.position() - (end - length)
                ),
            ));
        }

        tracing::trace!(id = %id, length, children = children.len(), "Container chunk");
        Ok(Self {
            spare_bits,
            ..Self::container(id, children)
        })
    }

    /// Encode this node. Container lengths are measured by serializing the
    /// children into a scratch buffer first.
    pub fn write(&self, out: &mut Vec<u8>) -> ParseResult<()> {
        out.extend_from_slice(&self.id.0);
        let spare = (u32::from(self.spare_bits) & SPARE_MASK) << SPARE_SHIFT;

        match &self.content {
            ChunkContent::Leaf(data) => {
                let word = length_word(self.id, data.len())? | spare;
                out.extend_from_slice(&word.to_le_bytes());
                out.extend_from_slice(data);
            }
            ChunkContent::Container(children) => {
                let mut scratch = Vec::new();
                for child in children {
                    child.write(&mut scratch)?;
                }
                let word = length_word(self.id, scratch.len())? | spare | CONTAINER_FLAG;
                out.extend_from_slice(&word.to_le_bytes());
                out.extend_from_slice(&scratch);
            }
        }

        Ok(())
    }

    pub fn to_bytes(&self) -> ParseResult<Vec<u8>> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.write(&mut out)?;
        Ok(out)
    }
}

fn length_word(id: FourCC, length: usize) -> ParseResult<u32> {
    if length > MAX_CONTENT_LENGTH {
        return Err(ParseError::overflow(
            format!("{id} content length"),
            length as u64,
            MAX_CONTENT_LENGTH as u64,
        ));
    }
    Ok(length as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::ErrorKind;

    fn tag(s: &str) -> FourCC {
        FourCC::from_name(s).unwrap()
    }

    fn sample_tree() -> ChunkNode {
        ChunkNode::container(
            tag("ROOT"),
            vec![
                ChunkNode::leaf(tag("GHDR"), vec![1, 2, 3]),
                ChunkNode::container(
                    tag("RDTA"),
                    vec![ChunkNode::container(
                        tag("RLOD"),
                        vec![ChunkNode::leaf(tag("INDX"), vec![9; 6])],
                    )],
                ),
            ],
        )
    }

    fn decode(bytes: &[u8]) -> ParseResult<ChunkNode> {
        let options = ParseOptions::default();
        let mut validator = Validator::new(&options);
        let mut reader = ByteReader::new(bytes);
        ChunkNode::read(&mut reader, &options, &mut validator)
    }

    #[test]
    fn test_leaf_layout() {
        let bytes = ChunkNode::leaf(tag("GHDR"), vec![0xAA, 0xBB]).to_bytes().unwrap();
        assert_eq!(bytes, [b'G', b'H', b'D', b'R', 2, 0, 0, 0, 0xAA, 0xBB]);
    }

    #[test]
    fn test_container_length_covers_children() {
        let bytes = sample_tree().to_bytes().unwrap();
        let word = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        assert_ne!(word & CONTAINER_FLAG, 0);
        assert_eq!((word & LENGTH_MASK) as usize, bytes.len() - NODE_HEADER_SIZE);
        assert_eq!(bytes.len(), sample_tree().encoded_len());
    }

    #[test]
    fn test_round_trip() {
        let tree = sample_tree();
        let bytes = tree.to_bytes().unwrap();
        assert_eq!(decode(&bytes).unwrap(), tree);
    }

    #[test]
    fn test_spare_length_bits_survive_round_trip() {
        let mut bytes = sample_tree().to_bytes().unwrap();
        // GHDR leaf word, then the RDTA container word
        bytes[15] = 0x05;
        bytes[26] |= 0x40;

        let options = ParseOptions::default();
        let mut validator = Validator::new(&options);
        let node = ChunkNode::read(&mut ByteReader::new(&bytes), &options, &mut validator).unwrap();
        assert_eq!(validator.finish().for_field("chunk_flags_unused").count(), 2);
        assert_eq!(node.children()[0].spare_bits, 0x05);
        assert_eq!(node.children()[1].spare_bits, 0x40);
        assert!(node.children()[1].is_container());

        assert_eq!(node.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn test_find_path() {
        let tree = sample_tree();
        assert_eq!(tree.find_path("ROOT/GHDR").and_then(ChunkNode::data), Some(&[1u8, 2, 3][..]));
        assert!(tree.find_path("ROOT/RDTA/RLOD/INDX").is_some());
        assert!(tree.find_path("ROOT/MTRL").is_none());
        assert!(tree.find_path("RDTA").is_none());
    }

    #[test]
    fn test_walk_depths() {
        let mut seen = Vec::new();
        sample_tree().walk(|node, depth| seen.push((node.id.to_string(), depth)));
        assert_eq!(
            seen,
            vec![
                ("ROOT".to_string(), 0),
                ("GHDR".to_string(), 1),
                ("RDTA".to_string(), 1),
                ("RLOD".to_string(), 2),
                ("INDX".to_string(), 3),
            ]
        );
    }

    #[test]
    fn test_truncated_leaf() {
        let mut bytes = ChunkNode::leaf(tag("VERT"), vec![0; 10]).to_bytes().unwrap();
        bytes.truncate(12);
        assert_eq!(decode(&bytes).unwrap_err().kind(), ErrorKind::TruncatedData);
    }

    #[test]
    fn test_child_overrunning_container() {
        // Container declares 10 bytes but its only child needs 12
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"ROOT");
        bytes.extend_from_slice(&(CONTAINER_FLAG | 10).to_le_bytes());
        bytes.extend_from_slice(b"GHDR");
        bytes.extend_from_slice(&4u32.to_le_bytes());
        bytes.extend_from_slice(&[0; 4]);
        assert_eq!(decode(&bytes).unwrap_err().kind(), ErrorKind::InvariantViolated);
    }

    #[test]
    fn test_oversized_leaf_fails_loudly() {
        let node = ChunkNode::leaf(tag("VERT"), vec![0; MAX_CONTENT_LENGTH + 1]);
        assert_eq!(node.to_bytes().unwrap_err().kind(), ErrorKind::LengthOverflow);
    }

    #[test]
    fn test_nesting_limit() {
        let mut node = ChunkNode::leaf(tag("LEAF"), vec![]);
        for _ in 0..5 {
            node = ChunkNode::container(tag("NEST"), vec![node]);
        }
        let bytes = node.to_bytes().unwrap();

        let options = ParseOptions {
            max_nesting_depth: 3,
            ..ParseOptions::default()
        };
        let mut validator = Validator::new(&options);
        let mut reader = ByteReader::new(&bytes);
        let err = ChunkNode::read(&mut reader, &options, &mut validator).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvariantViolated);
    }
}
