//! Recursive chunk trees and the model files built on them
//!
//! A chunk tree is a sequence of nodes, each a four-character identifier
//! followed by a length word. The high bit of the length word marks a
//! container whose content is a run of child nodes; otherwise the content
//! is an opaque leaf payload.
//!
//! # Node Layout
//! ```text
//! ┌──────────┬──────────────────────────────┬──────────────────────┐
//! │ id: [4]  │ word: u32                    │ content              │
//! │ "ROOT"   │ bit 31     container flag    │ children | payload   │
//! │          │ bits 24-30 unused (zero)     │                      │
//! │          │ bits 0-23  content length    │                      │
//! └──────────┴──────────────────────────────┴──────────────────────┘
//! ```
//!
//! Model files (`.3di`) wrap one such tree behind an eight byte header;
//! see [`model`].

pub mod model;
pub mod node;
pub mod records;

pub use model::{ModelFile, ModelParser};
pub use node::{ChunkContent, ChunkNode, CONTAINER_FLAG, LENGTH_MASK, MAX_CONTENT_LENGTH, NODE_HEADER_SIZE};
pub use records::{
    BoundingVolume, BoundingVolumeFlags, BoundingVolumes, ChunkRecord, CollidableType, IndexBuffer, MeshType,
    ModelHeader, SkinWeights, TangentFrame, Vertex, VertexBuffer,
};

use serde::{Deserialize, Serialize};

use crate::io::ByteReader;
use crate::traits::{Decoded, ParseOptions, ParseResult};
use crate::validation::Validator;

/// Chunk identifiers seen in model files
pub mod ids {
    use novakit_core::FourCC;

    pub const ROOT: FourCC = FourCC(*b"ROOT");
    pub const GHDR: FourCC = FourCC(*b"GHDR");
    pub const RDTA: FourCC = FourCC(*b"RDTA");
    pub const RLOD: FourCC = FourCC(*b"RLOD");
    pub const RMDL: FourCC = FourCC(*b"RMDL");
    pub const VERT: FourCC = FourCC(*b"VERT");
    pub const INDX: FourCC = FourCC(*b"INDX");
    pub const STRP: FourCC = FourCC(*b"STRP");
    pub const ROBJ: FourCC = FourCC(*b"ROBJ");
    pub const LGHT: FourCC = FourCC(*b"LGHT");
    pub const USRP: FourCC = FourCC(*b"USRP");
    pub const MTRL: FourCC = FourCC(*b"MTRL");
    pub const CDTA: FourCC = FourCC(*b"CDTA");
    pub const CVRT: FourCC = FourCC(*b"CVRT");
    pub const CFAC: FourCC = FourCC(*b"CFAC");
    pub const COBJ: FourCC = FourCC(*b"COBJ");
    pub const BVOL: FourCC = FourCC(*b"BVOL");
    pub const BPLN: FourCC = FourCC(*b"BPLN");

    pub const KNOWN: [FourCC; 18] = [
        ROOT, GHDR, RDTA, RLOD, RMDL, VERT, INDX, STRP, ROBJ, LGHT, USRP, MTRL, CDTA, CVRT, CFAC, COBJ, BVOL, BPLN,
    ];

    pub fn is_known(id: FourCC) -> bool {
        KNOWN.contains(&id)
    }
}

/// A bare run of top-level chunk nodes with no file header
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChunkTree {
    pub roots: Vec<ChunkNode>,
}

impl ChunkTree {
    /// Decode nodes until the buffer is exhausted
    pub fn decode(data: &[u8], options: &ParseOptions) -> ParseResult<Decoded<Self>> {
        let mut reader = ByteReader::new(data);
        let mut validator = Validator::new(options);
        let mut roots = Vec::new();
        while !reader.is_at_end() {
            roots.push(ChunkNode::read(&mut reader, options, &mut validator)?);
        }
        tracing::debug!(roots = roots.len(), "Decoded chunk tree");
        Ok(Decoded::new(Self { roots }, validator.finish()))
    }

    pub fn to_bytes(&self) -> ParseResult<Vec<u8>> {
        let mut out = Vec::with_capacity(self.roots.iter().map(ChunkNode::encoded_len).sum());
        for root in &self.roots {
            root.write(&mut out)?;
        }
        Ok(out)
    }

    pub fn node_count(&self) -> usize {
        self.roots.iter().map(ChunkNode::node_count).sum()
    }
}
