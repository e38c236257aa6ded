//! Typed views over model leaf chunks
//!
//! Each record type decodes from one leaf `ChunkNode` and encodes back into
//! one. Payload offsets in errors are relative to the start of the leaf
//! payload.

use bitflags::bitflags;
use byteorder::{LittleEndian, WriteBytesExt};
use serde::{Deserialize, Serialize};

use novakit_core::{FixedVec3, FourCC, Vec2, Vec3};

use super::ids;
use super::node::ChunkNode;
use crate::io::{ByteReader, FixedString, WriteFieldsExt};
use crate::traits::{Decoded, ParseError, ParseOptions, ParseResult};
use crate::validation::{InvariantCheck, Validator};

/// A leaf chunk with a known payload layout
pub trait ChunkRecord: Sized {
    /// Identifier of the leaf carrying this record
    const ID: FourCC;

    fn decode(reader: &mut ByteReader<'_>, validator: &mut Validator) -> ParseResult<Self>;

    fn encode(&self, out: &mut Vec<u8>) -> ParseResult<()>;

    /// Decode from a leaf node, reporting soft diagnostics
    fn from_node(node: &ChunkNode, options: &ParseOptions) -> ParseResult<Decoded<Self>> {
        if node.id != Self::ID {
            return Err(ParseError::malformed(
                0,
                "chunk_id",
                format!("expected {}, found {}", Self::ID, node.id),
            ));
        }
        let Some(data) = node.data() else {
            return Err(ParseError::InvalidStructure(format!("{} is a container, expected a leaf", node.id)));
        };

        let mut validator = Validator::new(options);
        let mut reader = ByteReader::new(data).with_length_checks(options.check_record_lengths);
        let value = Self::decode(&mut reader, &mut validator)
            .map_err(|e| e.with_context(format!("decoding {}", Self::ID)))?;

        if !reader.is_at_end() {
            validator.report(
                reader.offset(),
                "trailing_bytes",
                format!("{} unread bytes after {}", reader.remaining(), Self::ID),
            )?;
        }

        Ok(Decoded::new(value, validator.finish()))
    }

    /// Encode into a fresh leaf node
    fn to_node(&self) -> ParseResult<ChunkNode> {
        let mut out = Vec::new();
        self.encode(&mut out)?;
        Ok(ChunkNode::leaf(Self::ID, out))
    }
}

fn read_count(reader: &mut ByteReader<'_>, field: &str) -> ParseResult<usize> {
    let offset = reader.offset();
    let count = reader.read_i32(field)?;
    usize::try_from(count).map_err(|_| ParseError::malformed(offset, field, format!("negative count {count}")))
}

fn count_to_i32(field: &str, count: usize) -> ParseResult<i32> {
    i32::try_from(count).map_err(|_| ParseError::overflow(field, count as u64, i32::MAX as u64))
}

/// Mesh flavour declared by the model header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeshType {
    Invalid,
    Basic,
    Skinned,
    Other(i32),
}

impl MeshType {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            0 => Self::Invalid,
            1 => Self::Basic,
            2 => Self::Skinned,
            other => Self::Other(other),
        }
    }

    pub fn raw(self) -> i32 {
        match self {
            Self::Invalid => 0,
            Self::Basic => 1,
            Self::Skinned => 2,
            Self::Other(raw) => raw,
        }
    }
}

/// `GHDR`: model name and level-of-detail setup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelHeader {
    pub name: FixedString<16>,
    pub mesh_type: MeshType,
    pub lod_count: i32,
    pub lod_distance: i32,
}

impl ChunkRecord for ModelHeader {
    const ID: FourCC = ids::GHDR;

    fn decode(reader: &mut ByteReader<'_>, validator: &mut Validator) -> ParseResult<Self> {
        let name = reader.read_fixed("name")?;
        let mesh_offset = reader.offset();
        let mesh_type = MeshType::from_raw(reader.read_i32("mesh_type")?);
        if let MeshType::Other(raw) = mesh_type {
            validator.check(mesh_offset, InvariantCheck::in_range("mesh_type", raw, 0, 2))?;
        }
        Ok(Self {
            name,
            mesh_type,
            lod_count: reader.read_i32("lod_count")?,
            lod_distance: reader.read_i32("lod_distance")?,
        })
    }

    fn encode(&self, out: &mut Vec<u8>) -> ParseResult<()> {
        out.extend_from_slice(self.name.raw());
        out.write_i32::<LittleEndian>(self.mesh_type.raw())?;
        out.write_i32::<LittleEndian>(self.lod_count)?;
        out.write_i32::<LittleEndian>(self.lod_distance)?;
        Ok(())
    }
}

/// `INDX`: 16-bit triangle indices
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IndexBuffer {
    pub indices: Vec<u16>,
}

impl IndexBuffer {
    pub const RECORD_SIZE: i32 = 2;
}

impl ChunkRecord for IndexBuffer {
    const ID: FourCC = ids::INDX;

    fn decode(reader: &mut ByteReader<'_>, _validator: &mut Validator) -> ParseResult<Self> {
        let count = read_count(reader, "index_count")?;
        let size_offset = reader.offset();
        let record_size = reader.read_i32("index_record_size")?;
        if record_size != Self::RECORD_SIZE {
            return Err(ParseError::malformed(
                size_offset,
                "index_record_size",
                format!("expected {}, found {record_size}", Self::RECORD_SIZE),
            ));
        }

        let mut indices = Vec::with_capacity(count.min(reader.remaining() / 2));
        for _ in 0..count {
            indices.push(reader.read_u16("index")?);
        }
        Ok(Self { indices })
    }

    fn encode(&self, out: &mut Vec<u8>) -> ParseResult<()> {
        out.write_i32::<LittleEndian>(count_to_i32("index_count", self.indices.len())?)?;
        out.write_i32::<LittleEndian>(Self::RECORD_SIZE)?;
        for &index in &self.indices {
            out.write_u16::<LittleEndian>(index)?;
        }
        Ok(())
    }
}

/// Vertex format flag bits that enable tangent frames
pub const VERTEX_TANGENT_BITS: u32 = 0x14;
/// Vertex format flag bit that enables skinning data
pub const VERTEX_SKINNED_BIT: u32 = 0x40;

/// Bone influence of a skinned vertex
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkinWeights {
    pub weights: Vec3,
    pub bones: [u8; 4],
}

/// Tangent and bitangent of a normal-mapped vertex
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TangentFrame {
    pub tangent: Vec3,
    pub bitangent: Vec3,
}

/// One mesh vertex
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub position: Vec3,
    pub skin: Option<SkinWeights>,
    pub normal: Vec3,
    pub uv0: Vec2,
    pub uv1: Vec2,
    pub tangent_frame: Option<TangentFrame>,
}

/// `VERT`: vertex array whose record layout depends on a format flag
///
/// ```text
/// position  f32x3          always
/// weights   f32x3 + u8x4   flag & 0x40
/// normal    f32x3          always
/// uv0, uv1  f32x2 each     always
/// tangent   f32x3          flag & 0x14
/// bitangent f32x3          flag & 0x14
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VertexBuffer {
    pub format: u32,
    pub vertices: Vec<Vertex>,
}

impl VertexBuffer {
    pub fn has_tangents(&self) -> bool {
        Self::format_has_tangents(self.format)
    }

    pub fn is_skinned(&self) -> bool {
        Self::format_is_skinned(self.format)
    }

    fn format_has_tangents(format: u32) -> bool {
        format & VERTEX_TANGENT_BITS != 0
    }

    fn format_is_skinned(format: u32) -> bool {
        format & VERTEX_SKINNED_BIT != 0
    }

    /// Bytes per vertex implied by a format flag (40, 56, 64 or 80)
    pub fn record_size_for(format: u32) -> usize {
        let mut size = 40;
        if Self::format_is_skinned(format) {
            size += 16;
        }
        if Self::format_has_tangents(format) {
            size += 24;
        }
        size
    }
}

impl ChunkRecord for VertexBuffer {
    const ID: FourCC = ids::VERT;

    fn decode(reader: &mut ByteReader<'_>, _validator: &mut Validator) -> ParseResult<Self> {
        let count = read_count(reader, "vertex_count")?;
        let size_offset = reader.offset();
        let record_size = read_count(reader, "vertex_record_size")?;
        let format = reader.read_u32("vertex_format")?;

        let expected = Self::record_size_for(format);
        if record_size != expected {
            return Err(ParseError::malformed(
                size_offset,
                "vertex_record_size",
                format!("format 0x{format:X} implies {expected} bytes, header declares {record_size}"),
            ));
        }

        let skinned = Self::format_is_skinned(format);
        let tangents = Self::format_has_tangents(format);
        let mut vertices = Vec::with_capacity(count.min(reader.remaining() / expected));
        for _ in 0..count {
            reader.mark();
            let position = reader.read_vec3("position")?;
            let skin = if skinned {
                Some(SkinWeights {
                    weights: reader.read_vec3("bone_weights")?,
                    bones: reader.read_array("bone_indices")?,
                })
            } else {
                None
            };
            let normal = reader.read_vec3("normal")?;
            let uv0 = reader.read_vec2("uv0")?;
            let uv1 = reader.read_vec2("uv1")?;
            let tangent_frame = if tangents {
                Some(TangentFrame {
                    tangent: reader.read_vec3("tangent")?,
                    bitangent: reader.read_vec3("bitangent")?,
                })
            } else {
                None
            };
            reader.assert_consumed("vertex", record_size)?;

            vertices.push(Vertex {
                position,
                skin,
                normal,
                uv0,
                uv1,
                tangent_frame,
            });
        }

        Ok(Self { format, vertices })
    }

    fn encode(&self, out: &mut Vec<u8>) -> ParseResult<()> {
        let skinned = self.is_skinned();
        let tangents = self.has_tangents();

        out.write_i32::<LittleEndian>(count_to_i32("vertex_count", self.vertices.len())?)?;
        out.write_i32::<LittleEndian>(Self::record_size_for(self.format) as i32)?;
        out.write_u32::<LittleEndian>(self.format)?;

        for (i, vertex) in self.vertices.iter().enumerate() {
            out.write_vec3(vertex.position)?;
            match (skinned, &vertex.skin) {
                (true, Some(skin)) => {
                    out.write_vec3(skin.weights)?;
                    out.extend_from_slice(&skin.bones);
                }
                (false, None) => {}
                _ => {
                    return Err(ParseError::InvalidStructure(format!(
                        "vertex {i}: skin data does not match format 0x{:X}",
                        self.format
                    )))
                }
            }
            out.write_vec3(vertex.normal)?;
            out.write_vec2(vertex.uv0)?;
            out.write_vec2(vertex.uv1)?;
            match (tangents, &vertex.tangent_frame) {
                (true, Some(frame)) => {
                    out.write_vec3(frame.tangent)?;
                    out.write_vec3(frame.bitangent)?;
                }
                (false, None) => {}
                _ => {
                    return Err(ParseError::InvalidStructure(format!(
                        "vertex {i}: tangent data does not match format 0x{:X}",
                        self.format
                    )))
                }
            }
        }
        Ok(())
    }
}

bitflags! {
    /// Behaviour flags of a bounding volume
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct BoundingVolumeFlags: u8 {
        const U1 = 1 << 0;
        const V = 1 << 1;
        const S = 1 << 2;
        const W = 1 << 3;
        const L = 1 << 4;
        const O = 1 << 5;
        // Never observed set
        const U6 = 1 << 6;
        const U7 = 1 << 7;
    }
}

/// Collision class of a bounding volume, named after the two-letter prefix
/// of the node it came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollidableType {
    Unrecognized,
    GenericBox,
    CS,
    CC,
    Ladder,
    CV,
    Armory,
    Vehicle,
    BlinkBox,
    Door,
    ChangeTeam,
    CM,
    VK,
    SpecialFunction,
    LP,
    DH,
    DM,
    DL,
    PlayerOnly,
    OB,
    OS,
    OP,
    OH,
    Other(u32),
}

impl CollidableType {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Self::Unrecognized,
            1 => Self::GenericBox,
            2 => Self::CS,
            3 => Self::CC,
            4 => Self::Ladder,
            5 => Self::CV,
            6 => Self::Armory,
            7 => Self::Vehicle,
            8 => Self::BlinkBox,
            9 => Self::Door,
            10 => Self::ChangeTeam,
            11 => Self::CM,
            12 => Self::VK,
            13 => Self::SpecialFunction,
            14 => Self::LP,
            16 => Self::DH,
            17 => Self::DM,
            18 => Self::DL,
            19 => Self::PlayerOnly,
            20 => Self::OB,
            21 => Self::OS,
            22 => Self::OP,
            23 => Self::OH,
            other => Self::Other(other),
        }
    }
}

/// One 36-byte bounding volume record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingVolume {
    pub collidable: u32,
    pub flags: BoundingVolumeFlags,
    pub min: FixedVec3,
    pub max: FixedVec3,
    pub plane_count: u32,
}

impl BoundingVolume {
    pub const RECORD_SIZE: usize = 36;

    pub fn collidable_type(&self) -> CollidableType {
        CollidableType::from_raw(self.collidable)
    }
}

/// `BVOL`: bounding volumes of the collision data
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BoundingVolumes {
    pub volumes: Vec<BoundingVolume>,
}

impl ChunkRecord for BoundingVolumes {
    const ID: FourCC = ids::BVOL;

    fn decode(reader: &mut ByteReader<'_>, validator: &mut Validator) -> ParseResult<Self> {
        let count = read_count(reader, "volume_count")?;
        let size_offset = reader.offset();
        let record_size = reader.read_i32("volume_record_size")?;
        validator.check(
            size_offset,
            InvariantCheck::equals("volume_record_size", BoundingVolume::RECORD_SIZE as i64, record_size),
        )?;

        let mut volumes = Vec::with_capacity(count.min(reader.remaining() / BoundingVolume::RECORD_SIZE));
        for _ in 0..count {
            let start = reader.offset();
            reader.mark();
            let collidable = reader.read_u32("collidable_type")?;
            let raw_flags = reader.read_u8("volume_flags")?;
            let pad: [u8; 3] = reader.read_array("volume_padding")?;
            validator.check(start + 5, InvariantCheck::zero_bytes("volume_padding", &pad))?;
            validator.check(
                start + 4,
                InvariantCheck::known_bits("volume_flags", u64::from(raw_flags), 0x3F),
            )?;

            let min = reader.read_fixed_vec3("min")?;
            let max = reader.read_fixed_vec3("max")?;
            let plane_count = reader.read_u32("plane_count")?;
            reader.assert_consumed("bounding_volume", BoundingVolume::RECORD_SIZE)?;

            volumes.push(BoundingVolume {
                collidable,
                flags: BoundingVolumeFlags::from_bits_retain(raw_flags),
                min,
                max,
                plane_count,
            });
        }
        Ok(Self { volumes })
    }

    fn encode(&self, out: &mut Vec<u8>) -> ParseResult<()> {
        out.write_i32::<LittleEndian>(count_to_i32("volume_count", self.volumes.len())?)?;
        out.write_i32::<LittleEndian>(BoundingVolume::RECORD_SIZE as i32)?;
        for volume in &self.volumes {
            out.write_u32::<LittleEndian>(volume.collidable)?;
            out.write_u8(volume.flags.bits())?;
            out.write_zeros(3)?;
            out.write_fixed_vec3(&volume.min)?;
            out.write_fixed_vec3(&volume.max)?;
            out.write_u32::<LittleEndian>(volume.plane_count)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::ErrorKind;
    use novakit_core::FixedPoint;

    fn vertex(skinned: bool, tangents: bool) -> Vertex {
        Vertex {
            position: Vec3::new(1.0, 2.0, 3.0),
            skin: skinned.then(|| SkinWeights {
                weights: Vec3::new(0.5, 0.25, 0.25),
                bones: [1, 2, 3, 0],
            }),
            normal: Vec3::new(0.0, 1.0, 0.0),
            uv0: Vec2::new(0.5, 0.5),
            uv1: Vec2::ZERO,
            tangent_frame: tangents.then(|| TangentFrame {
                tangent: Vec3::new(1.0, 0.0, 0.0),
                bitangent: Vec3::new(0.0, 0.0, 1.0),
            }),
        }
    }

    #[test]
    fn test_record_sizes() {
        assert_eq!(VertexBuffer::record_size_for(0), 40);
        assert_eq!(VertexBuffer::record_size_for(0x40), 56);
        assert_eq!(VertexBuffer::record_size_for(0x04), 64);
        assert_eq!(VertexBuffer::record_size_for(0x10), 64);
        assert_eq!(VertexBuffer::record_size_for(0x54), 80);
    }

    #[test]
    fn test_vertex_buffer_round_trip_all_layouts() {
        for (format, skinned, tangents) in [(0, false, false), (0x40, true, false), (0x14, false, true), (0x54, true, true)] {
            let buffer = VertexBuffer {
                format,
                vertices: vec![vertex(skinned, tangents); 3],
            };
            let node = buffer.to_node().unwrap();
            assert_eq!(node.data().unwrap().len(), 12 + 3 * VertexBuffer::record_size_for(format));

            let decoded = VertexBuffer::from_node(&node, &ParseOptions::default()).unwrap();
            assert_eq!(decoded.value, buffer);
            assert!(decoded.report.is_clean());
        }
    }

    #[test]
    fn test_vertex_record_size_mismatch() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&1i32.to_le_bytes());
        payload.extend_from_slice(&44i32.to_le_bytes());
        payload.extend_from_slice(&0u32.to_le_bytes());
        payload.extend_from_slice(&[0; 44]);
        let node = ChunkNode::leaf(ids::VERT, payload);

        let err = VertexBuffer::from_node(&node, &ParseOptions::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedHeader);
    }

    #[test]
    fn test_encode_rejects_inconsistent_vertex() {
        let buffer = VertexBuffer {
            format: 0x40,
            vertices: vec![vertex(false, false)],
        };
        assert_eq!(buffer.to_node().unwrap_err().kind(), ErrorKind::InvalidStructure);
    }

    #[test]
    fn test_index_buffer() {
        let buffer = IndexBuffer { indices: vec![0, 1, 2, 2, 1, 3] };
        let node = buffer.to_node().unwrap();
        assert_eq!(&node.data().unwrap()[..8], &[6, 0, 0, 0, 2, 0, 0, 0]);
        assert_eq!(IndexBuffer::from_node(&node, &ParseOptions::default()).unwrap().value, buffer);
    }

    #[test]
    fn test_index_record_size_must_be_two() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&1i32.to_le_bytes());
        payload.extend_from_slice(&4i32.to_le_bytes());
        payload.extend_from_slice(&[0; 4]);
        let node = ChunkNode::leaf(ids::INDX, payload);
        assert!(IndexBuffer::from_node(&node, &ParseOptions::default()).is_err());
    }

    #[test]
    fn test_model_header() {
        let header = ModelHeader {
            name: FixedString::new("tower01"),
            mesh_type: MeshType::Basic,
            lod_count: 3,
            lod_distance: 250,
        };
        let node = header.to_node().unwrap();
        assert_eq!(node.data().unwrap().len(), 28);
        let decoded = ModelHeader::from_node(&node, &ParseOptions::default()).unwrap().value;
        assert_eq!(decoded.name.text(), "tower01");
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_wrong_record_id() {
        let node = ChunkNode::leaf(ids::INDX, vec![]);
        assert_eq!(
            ModelHeader::from_node(&node, &ParseOptions::default()).unwrap_err().kind(),
            ErrorKind::MalformedHeader
        );
    }

    #[test]
    fn test_bounding_volumes_round_trip() {
        let volumes = BoundingVolumes {
            volumes: vec![BoundingVolume {
                collidable: 9,
                flags: BoundingVolumeFlags::V | BoundingVolumeFlags::S,
                min: FixedVec3 {
                    x: FixedPoint::new(0, -2),
                    y: FixedPoint::new(0, 0),
                    z: FixedPoint::new(-0x4000, -1),
                },
                max: FixedVec3 {
                    x: FixedPoint::new(0, 2),
                    y: FixedPoint::new(0x4000, 3),
                    z: FixedPoint::new(0, 1),
                },
                plane_count: 6,
            }],
        };
        let node = volumes.to_node().unwrap();
        assert_eq!(node.data().unwrap().len(), 8 + 36);

        let decoded = BoundingVolumes::from_node(&node, &ParseOptions::default()).unwrap();
        assert_eq!(decoded.value, volumes);
        assert_eq!(decoded.value.volumes[0].collidable_type(), CollidableType::Door);
        assert!(decoded.report.is_clean());
    }

    #[test]
    fn test_bounding_volume_padding_is_soft() {
        let mut payload = BoundingVolumes {
            volumes: vec![BoundingVolume {
                collidable: 1,
                flags: BoundingVolumeFlags::empty(),
                min: FixedVec3::default(),
                max: FixedVec3::default(),
                plane_count: 0,
            }],
        }
        .to_node()
        .unwrap()
        .data()
        .unwrap()
        .to_vec();
        payload[8 + 5] = 0x7F;
        let node = ChunkNode::leaf(ids::BVOL, payload);

        let decoded = BoundingVolumes::from_node(&node, &ParseOptions::default()).unwrap();
        assert_eq!(decoded.report.len(), 1);
        assert_eq!(decoded.report.diagnostics[0].field, "volume_padding");

        assert!(BoundingVolumes::from_node(&node, &ParseOptions::strict()).is_err());
    }
}
