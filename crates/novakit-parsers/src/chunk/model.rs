//! `.3di` model files
//!
//! ```text
//! ┌────────────┬───────────────┬─────────────────────────────┐
//! │ "3DI3"     │ version: i32  │ root chunk (normally ROOT)  │
//! │            │ always 259    │                             │
//! └────────────┴───────────────┴─────────────────────────────┘
//! ```

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use novakit_core::FourCC;

use super::ids;
use super::node::{ChunkContent, ChunkNode, NODE_HEADER_SIZE};
use super::records::{ChunkRecord, ModelHeader};
use crate::io::ByteReader;
use crate::traits::{Decoded, HumanReadable, ParseError, ParseOptions, ParseResult, Parser};
use crate::validation::Validator;

pub const MODEL_MAGIC: &[u8; 4] = b"3DI3";
pub const MODEL_VERSION: i32 = 259;
const FILE_HEADER_SIZE: u64 = 8;

/// A decoded model file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelFile {
    pub version: i32,
    pub root: ChunkNode,
}

impl ModelFile {
    pub fn new(root: ChunkNode) -> Self {
        Self {
            version: MODEL_VERSION,
            root,
        }
    }

    /// Look up a node by slash separated path starting at the root id
    pub fn find(&self, path: &str) -> Option<&ChunkNode> {
        self.root.find_path(path)
    }

    /// Decoded `GHDR` record, if the model carries one
    pub fn header(&self) -> Option<ParseResult<ModelHeader>> {
        let node = self.find("ROOT/GHDR")?;
        Some(ModelHeader::from_node(node, &ParseOptions::default()).map(Decoded::into_value))
    }

    /// Model name from the `GHDR` record
    pub fn name(&self) -> Option<String> {
        match self.header()? {
            Ok(header) => Some(header.name.text()),
            Err(_) => None,
        }
    }

    /// Decode every leaf in the tree that carries a `T` record
    pub fn records<T: ChunkRecord>(&self, options: &ParseOptions) -> ParseResult<Vec<T>> {
        let mut nodes = Vec::new();
        self.root.walk(|node, _| {
            if node.id == T::ID && !node.is_container() {
                nodes.push(node);
            }
        });
        nodes
            .into_iter()
            .map(|node| T::from_node(node, options).map(Decoded::into_value))
            .collect()
    }

    /// Identifiers in the tree that are not part of the known set
    pub fn unknown_ids(&self) -> Vec<FourCC> {
        let mut unknown = Vec::new();
        self.root.walk(|node, _| {
            if !ids::is_known(node.id) && !unknown.contains(&node.id) {
                unknown.push(node.id);
            }
        });
        unknown
    }
}

impl HumanReadable for ModelFile {
    fn to_readable_string(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "3DI3 model, version {}", self.version);
        if let Some(name) = self.name() {
            let _ = writeln!(out, "Name: {name}");
        }
        self.root.walk(|node, depth| {
            let indent = "  ".repeat(depth);
            let _ = match &node.content {
                ChunkContent::Leaf(data) => writeln!(out, "{indent}{} ({} bytes)", node.id, data.len()),
                ChunkContent::Container(children) => {
                    writeln!(out, "{indent}{} [{} children]", node.id, children.len())
                }
            };
        });
        out
    }
}

/// Walk the tree with absolute file offsets, reporting identifiers outside
/// the known set
fn check_identifiers(
    node: &ChunkNode,
    offset: u64,
    options: &ParseOptions,
    validator: &mut Validator,
) -> ParseResult<()> {
    if !ids::is_known(node.id) {
        if !options.skip_unknown_chunks {
            return Err(ParseError::InvalidStructure(format!(
                "unknown chunk {} at offset {offset}",
                node.id
            )));
        }
        validator.report(offset, "chunk_id", format!("unknown chunk {}", node.id))?;
    }

    let mut child_offset = offset + NODE_HEADER_SIZE as u64;
    for child in node.children() {
        check_identifiers(child, child_offset, options, validator)?;
        child_offset += child.encoded_len() as u64;
    }
    Ok(())
}

/// Model file codec
pub struct ModelParser;

impl ModelParser {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ModelParser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser for ModelParser {
    type Output = ModelFile;

    fn extensions(&self) -> &[&str] {
        &["3di"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(MODEL_MAGIC)
    }

    fn name(&self) -> &str {
        "3DI Model Parser"
    }

    fn decode(&self, data: &[u8], options: &ParseOptions) -> ParseResult<Decoded<ModelFile>> {
        let mut reader = ByteReader::new(data).with_length_checks(options.check_record_lengths);
        let mut validator = Validator::new(options);

        let magic: [u8; 4] = reader.read_array("magic")?;
        if &magic != MODEL_MAGIC {
            return Err(ParseError::malformed(
                0,
                "magic",
                format!("expected 3DI3, found {}", FourCC(magic)),
            ));
        }
        let version = reader.read_i32("version")?;
        if version != MODEL_VERSION {
            return Err(ParseError::malformed(
                4,
                "version",
                format!("expected {MODEL_VERSION}, found {version}"),
            ));
        }

        let root = ChunkNode::read(&mut reader, options, &mut validator)?;
        if root.id != ids::ROOT {
            validator.report(FILE_HEADER_SIZE, "root_id", format!("root chunk is {}, expected ROOT", root.id))?;
        }
        check_identifiers(&root, FILE_HEADER_SIZE, options, &mut validator)?;

        if !reader.is_at_end() {
            validator.report(
                reader.offset(),
                "trailing_bytes",
                format!("{} bytes after the root chunk", reader.remaining()),
            )?;
        }

        tracing::debug!(nodes = root.node_count(), "Decoded model tree");
        Ok(Decoded::new(ModelFile { version, root }, validator.finish()))
    }

    fn serialize(&self, model: &ModelFile) -> ParseResult<Vec<u8>> {
        let mut out = Vec::with_capacity(FILE_HEADER_SIZE as usize + model.root.encoded_len());
        out.extend_from_slice(MODEL_MAGIC);
        out.extend_from_slice(&model.version.to_le_bytes());
        model.root.write(&mut out)?;
        Ok(out)
    }
}
