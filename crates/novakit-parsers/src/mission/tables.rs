//! Fixed tables and geometry records between the entities and the script
//!
//! ```text
//! waypoints      128 x 136 bytes   flags:u32 count:u32 marker[count]:u32 pad to 136
//! groups          64 x  32 bytes   opaque, every byte 0x00 or 0x0A
//! layers          32 x  20 bytes   opaque, all zero
//! area triggers    n x  28 bytes   wp:i32 bounds[6]:fixed32 reserved:i32
//! bounding boxes   n x  36 bytes   bounds[6]:fixed32 unknown[12]
//! ```

use byteorder::{LittleEndian, WriteBytesExt};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use novakit_core::{Aabb, Fixed32, Vec3};

use super::flags::WaypointFlags;
use crate::io::{ByteReader, WriteFieldsExt};
use crate::traits::{ParseError, ParseResult};
use crate::validation::{InvariantCheck, Validator};

pub const WAYPOINT_COUNT: usize = 128;
pub const GROUP_COUNT: usize = 64;
pub const LAYER_COUNT: usize = 32;

pub const WAYPOINT_SIZE: usize = 136;
pub const MAX_WAYPOINT_MARKERS: usize = 32;
pub const GROUP_SIZE: usize = 32;
pub const LAYER_SIZE: usize = 20;
pub const AREA_TRIGGER_SIZE: usize = 28;
pub const BOUNDING_BOX_SIZE: usize = 36;

const GROUP_BYTES: [u8; 2] = [0x00, 0x0A];

fn read_bounds(reader: &mut ByteReader<'_>) -> ParseResult<[Fixed32; 6]> {
    let mut bounds = [Fixed32::default(); 6];
    for value in bounds.iter_mut() {
        *value = reader.read_fixed32("bounds")?;
    }
    Ok(bounds)
}

fn write_bounds(bounds: &[Fixed32; 6], out: &mut Vec<u8>) -> ParseResult<()> {
    for &value in bounds {
        out.write_fixed32(value)?;
    }
    Ok(())
}

fn to_f32(value: Fixed32) -> f32 {
    value.value() as f32
}

/// One patrol route slot
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Waypoint {
    pub flags: WaypointFlags,
    pub markers: SmallVec<[u32; 8]>,
    /// Bytes after the markers, kept only when some are non-zero
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub padding: Vec<u8>,
}

impl Waypoint {
    pub fn is_active(&self) -> bool {
        !self.flags.is_empty() || !self.markers.is_empty()
    }

    pub fn read(reader: &mut ByteReader<'_>, validator: &mut Validator) -> ParseResult<Self> {
        reader.mark();
        let flags = WaypointFlags::from_bits_retain(reader.read_u32("waypoint_flags")?);
        let count_offset = reader.offset();
        let count = reader.read_u32("marker_count")? as usize;
        if count > MAX_WAYPOINT_MARKERS {
            return Err(ParseError::invariant(
                count_offset,
                "marker_count",
                format!("{count} markers, a waypoint holds at most {MAX_WAYPOINT_MARKERS}"),
            ));
        }

        let mut markers = SmallVec::with_capacity(count);
        for _ in 0..count {
            markers.push(reader.read_u32("marker")?);
        }

        let pad_offset = reader.offset();
        let padding = reader.read_bytes("waypoint_padding", (MAX_WAYPOINT_MARKERS - count) * 4)?;
        validator.check(pad_offset, InvariantCheck::zero_bytes("waypoint_padding", padding))?;
        let padding = if padding.iter().all(|&b| b == 0) {
            Vec::new()
        } else {
            padding.to_vec()
        };

        reader.assert_consumed("waypoint", WAYPOINT_SIZE)?;
        Ok(Self {
            flags,
            markers,
            padding,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) -> ParseResult<()> {
        let count = self.markers.len();
        if count > MAX_WAYPOINT_MARKERS {
            return Err(ParseError::overflow("marker_count", count as u64, MAX_WAYPOINT_MARKERS as u64));
        }
        out.write_u32::<LittleEndian>(self.flags.bits())?;
        out.write_u32::<LittleEndian>(count as u32)?;
        for &marker in &self.markers {
            out.write_u32::<LittleEndian>(marker)?;
        }
        // Kept padding is cut or zero-filled to fit the current marker count
        let pad_len = (MAX_WAYPOINT_MARKERS - count) * 4;
        let kept = &self.padding[..self.padding.len().min(pad_len)];
        out.extend_from_slice(kept);
        out.write_zeros(pad_len - kept.len())?;
        Ok(())
    }
}

/// Opaque 32-byte group record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionGroup {
    pub raw: [u8; GROUP_SIZE],
}

impl Default for MissionGroup {
    fn default() -> Self {
        Self { raw: [0; GROUP_SIZE] }
    }
}

impl MissionGroup {
    pub fn read(reader: &mut ByteReader<'_>, validator: &mut Validator) -> ParseResult<Self> {
        let offset = reader.offset();
        let raw = reader.read_array("group")?;
        validator.check(offset, InvariantCheck::bytes_in("group", &raw, &GROUP_BYTES))?;
        Ok(Self { raw })
    }
}

/// Opaque 20-byte layer record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MissionLayer {
    pub raw: [u8; LAYER_SIZE],
}

impl MissionLayer {
    pub fn read(reader: &mut ByteReader<'_>, validator: &mut Validator) -> ParseResult<Self> {
        let offset = reader.offset();
        let raw = reader.read_array("layer")?;
        validator.check(offset, InvariantCheck::zero_bytes("layer", &raw))?;
        Ok(Self { raw })
    }
}

/// Axis-aligned trigger volume tied to a waypoint number
///
/// Bounds are kept in file order: min x, min z, min y, max x, max z, max y.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AreaTrigger {
    pub wp_number: i32,
    pub bounds: [Fixed32; 6],
    pub reserved: i32,
}

impl AreaTrigger {
    pub fn from_box(wp_number: i32, min: Vec3, max: Vec3) -> Self {
        let fixed = |v: f32| Fixed32::from_value(f64::from(v));
        Self {
            wp_number,
            bounds: [fixed(min.x), fixed(min.z), fixed(min.y), fixed(max.x), fixed(max.z), fixed(max.y)],
            reserved: 0,
        }
    }

    pub fn min(&self) -> Vec3 {
        Vec3::new(to_f32(self.bounds[0]), to_f32(self.bounds[2]), to_f32(self.bounds[1]))
    }

    pub fn max(&self) -> Vec3 {
        Vec3::new(to_f32(self.bounds[3]), to_f32(self.bounds[5]), to_f32(self.bounds[4]))
    }

    pub fn aabb(&self) -> Aabb {
        Aabb::new(self.min(), self.max())
    }

    pub fn read(reader: &mut ByteReader<'_>) -> ParseResult<Self> {
        reader.mark();
        let wp_number = reader.read_i32("wp_number")?;
        let bounds = read_bounds(reader)?;
        let reserved = reader.read_i32("area_trigger_reserved")?;
        reader.assert_consumed("area trigger", AREA_TRIGGER_SIZE)?;
        Ok(Self {
            wp_number,
            bounds,
            reserved,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) -> ParseResult<()> {
        out.write_i32::<LittleEndian>(self.wp_number)?;
        write_bounds(&self.bounds, out)?;
        out.write_i32::<LittleEndian>(self.reserved)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    /// min x, y, z then max x, y, z
    pub bounds: [Fixed32; 6],
    pub unknown: [u8; 12],
}

impl BoundingBox {
    pub fn min(&self) -> Vec3 {
        Vec3::new(to_f32(self.bounds[0]), to_f32(self.bounds[1]), to_f32(self.bounds[2]))
    }

    pub fn max(&self) -> Vec3 {
        Vec3::new(to_f32(self.bounds[3]), to_f32(self.bounds[4]), to_f32(self.bounds[5]))
    }

    pub fn read(reader: &mut ByteReader<'_>) -> ParseResult<Self> {
        reader.mark();
        let bounds = read_bounds(reader)?;
        let unknown = reader.read_array("bbox_unknown")?;
        reader.assert_consumed("bounding box", BOUNDING_BOX_SIZE)?;
        Ok(Self { bounds, unknown })
    }

    pub fn write(&self, out: &mut Vec<u8>) -> ParseResult<()> {
        write_bounds(&self.bounds, out)?;
        out.extend_from_slice(&self.unknown);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{ErrorKind, ParseOptions};

    fn validator() -> Validator {
        Validator::new(&ParseOptions::default())
    }

    #[test]
    fn test_waypoint_layout() {
        let waypoint = Waypoint {
            flags: WaypointFlags::DOES_NOT_LOOP,
            markers: SmallVec::from_slice(&[4, 9, 2]),
            ..Waypoint::default()
        };
        let mut out = Vec::new();
        waypoint.write(&mut out).unwrap();
        assert_eq!(out.len(), WAYPOINT_SIZE);
        assert_eq!(&out[4..8], &[3, 0, 0, 0]);
        assert_eq!(&out[8..12], &[4, 0, 0, 0]);
        assert!(out[20..].iter().all(|&b| b == 0));

        let mut validator = validator();
        let decoded = Waypoint::read(&mut ByteReader::new(&out), &mut validator).unwrap();
        assert_eq!(decoded, waypoint);
        assert!(decoded.is_active());
        assert!(validator.finish().is_clean());
    }

    #[test]
    fn test_waypoint_padding_survives_round_trip() {
        let mut input = vec![0u8; WAYPOINT_SIZE];
        input[4] = 1;
        input[8] = 17;
        input[WAYPOINT_SIZE - 1] = 0xAB;

        let mut validator = validator();
        let decoded = Waypoint::read(&mut ByteReader::new(&input), &mut validator).unwrap();
        assert_eq!(validator.finish().for_field("waypoint_padding").count(), 1);
        assert_eq!(decoded.markers.as_slice(), &[17]);

        let mut out = Vec::new();
        decoded.write(&mut out).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn test_waypoint_marker_count_cap() {
        let mut out = vec![0u8; WAYPOINT_SIZE];
        out[4] = 33;
        let err = Waypoint::read(&mut ByteReader::new(&out), &mut validator()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvariantViolated);
    }

    #[test]
    fn test_group_bytes() {
        let mut raw = [0u8; GROUP_SIZE];
        raw[5] = 0x0A;
        let mut validator = validator();
        MissionGroup::read(&mut ByteReader::new(&raw), &mut validator).unwrap();
        assert!(validator.finish().is_clean());

        raw[6] = 0x01;
        let mut validator = self::validator();
        let group = MissionGroup::read(&mut ByteReader::new(&raw), &mut validator).unwrap();
        assert_eq!(group.raw[6], 0x01);
        assert_eq!(validator.finish().len(), 1);
    }

    #[test]
    fn test_layer_must_be_zero_in_strict_mode() {
        let mut raw = [0u8; LAYER_SIZE];
        raw[19] = 1;
        let mut strict = Validator::new(&ParseOptions::strict());
        assert!(MissionLayer::read(&mut ByteReader::new(&raw), &mut strict).is_err());
    }

    #[test]
    fn test_area_trigger_axis_order() {
        let trigger = AreaTrigger::from_box(3, Vec3::new(1.0, 2.0, 3.0), Vec3::new(4.0, 5.0, 6.0));
        let mut out = Vec::new();
        trigger.write(&mut out).unwrap();
        assert_eq!(out.len(), AREA_TRIGGER_SIZE);
        // second stored bound is min z
        assert_eq!(i32::from_le_bytes(out[8..12].try_into().unwrap()), 3 << 16);

        let decoded = AreaTrigger::read(&mut ByteReader::new(&out)).unwrap();
        assert_eq!(decoded.min(), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(decoded.max(), Vec3::new(4.0, 5.0, 6.0));
    }

    #[test]
    fn test_bounding_box() {
        let bbox = BoundingBox {
            bounds: [Fixed32(-65536), Fixed32(0), Fixed32(32768), Fixed32(65536), Fixed32(131072), Fixed32(98304)],
            unknown: [0xEE; 12],
        };
        let mut out = Vec::new();
        bbox.write(&mut out).unwrap();
        assert_eq!(out.len(), BOUNDING_BOX_SIZE);
        let decoded = BoundingBox::read(&mut ByteReader::new(&out)).unwrap();
        assert_eq!(decoded, bbox);
        assert_eq!(decoded.min(), Vec3::new(-1.0, 0.0, 0.5));
    }
}
