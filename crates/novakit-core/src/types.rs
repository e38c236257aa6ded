//! Common types used across novakit
//!
//! Value types shared by the codecs: chunk tags, the two fixed-point
//! encodings found in the formats, and small vector/box types the decoded
//! models expose.

use serde::{Deserialize, Serialize};

/// Four-character chunk tag
///
/// Always exactly four bytes. The bytes are usually printable ASCII but
/// nothing in the formats guarantees it, so the raw bytes are kept.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    /// Create a tag from its raw bytes
    pub const fn new(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Raw tag bytes
    pub const fn bytes(&self) -> [u8; 4] {
        self.0
    }

    /// Whether every byte is zero (used as a stream terminator)
    pub fn is_zero(&self) -> bool {
        self.0 == [0; 4]
    }

    /// Parse a tag from text, space padding short names the way the
    /// model tools do
    pub fn from_name(name: &str) -> Option<Self> {
        let bytes = name.as_bytes();
        if bytes.is_empty() || bytes.len() > 4 || !name.is_ascii() {
            return None;
        }
        let mut tag = [b' '; 4];
        tag[..bytes.len()].copy_from_slice(bytes);
        Some(Self(tag))
    }
}

impl std::fmt::Display for FourCC {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for &b in &self.0 {
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{b:02X}")?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for FourCC {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FourCC(\"{self}\")")
    }
}

impl From<[u8; 4]> for FourCC {
    fn from(value: [u8; 4]) -> Self {
        Self(value)
    }
}

impl From<FourCC> for String {
    fn from(value: FourCC) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for FourCC {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        FourCC::from_name(&value).ok_or_else(|| format!("Invalid four-character tag: {value:?}"))
    }
}

/// Two-field fixed-point scalar
///
/// Stored as a signed 16-bit fraction followed by a signed 16-bit whole
/// part. The fraction is read first.
///
/// ```text
/// +----------+----------+
/// | frac i16 | whole i16|   value = whole + round(frac / 65536, 3)
/// +----------+----------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FixedPoint {
    pub frac: i16,
    pub whole: i16,
}

impl FixedPoint {
    pub const ZERO: Self = Self { frac: 0, whole: 0 };

    pub const fn new(frac: i16, whole: i16) -> Self {
        Self { frac, whole }
    }

    /// Decoded value, fraction rounded to three decimals
    pub fn value(&self) -> f64 {
        let frac = (f64::from(self.frac) / 65536.0 * 1000.0).round_ties_even() / 1000.0;
        f64::from(self.whole) + frac
    }

    /// Encode a value, splitting it into whole and fraction parts
    pub fn from_value(value: f64) -> Self {
        let whole = value.trunc();
        let frac = ((value - whole) * 65536.0).round();
        Self {
            frac: frac.clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16,
            whole: whole.clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16,
        }
    }
}

/// Three fixed-point components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FixedVec3 {
    pub x: FixedPoint,
    pub y: FixedPoint,
    pub z: FixedPoint,
}

impl FixedVec3 {
    pub fn to_vec3(&self) -> Vec3 {
        Vec3::new(self.x.value() as f32, self.y.value() as f32, self.z.value() as f32)
    }
}

/// Row-major 4x4 fixed-point matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FixedMat4 {
    pub rows: [[FixedPoint; 4]; 4],
}

impl FixedMat4 {
    pub fn to_mat4(&self) -> Mat4x4 {
        let mut m = [[0.0f32; 4]; 4];
        for (row, out) in self.rows.iter().zip(m.iter_mut()) {
            for (cell, value) in row.iter().zip(out.iter_mut()) {
                *value = cell.value() as f32;
            }
        }
        Mat4x4 { m }
    }
}

/// Signed 16.16 fixed-point value stored as one 32-bit integer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fixed32(pub i32);

impl Fixed32 {
    pub const SCALE: f64 = 65536.0;

    pub fn value(&self) -> f64 {
        f64::from(self.0) / Self::SCALE
    }

    pub fn from_value(value: f64) -> Self {
        let raw = (value * Self::SCALE).round();
        Self(raw.clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32)
    }
}

impl std::fmt::Display for Fixed32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.3}", self.value())
    }
}

/// 3D vector (position, normal, etc.)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0, z: 0.0 };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

impl Default for Vec3 {
    fn default() -> Self {
        Self::ZERO
    }
}

/// 2D vector (UV coordinates)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl Default for Vec2 {
    fn default() -> Self {
        Self::ZERO
    }
}

/// 4x4 transformation matrix, row-major
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Mat4x4 {
    pub m: [[f32; 4]; 4],
}

impl Mat4x4 {
    pub const IDENTITY: Self = Self {
        m: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    };
}

impl Default for Mat4x4 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn size(&self) -> Vec3 {
        Vec3::new(
            self.max.x - self.min.x,
            self.max.y - self.min.y,
            self.max.z - self.min.z,
        )
    }
}

/// 24-bit RGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub fn from_bytes(bytes: [u8; 3]) -> Self {
        Self { r: bytes[0], g: bytes[1], b: bytes[2] }
    }

    pub fn to_bytes(&self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }
}
