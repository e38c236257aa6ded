//! `CDEP` elevation chunk
//!
//! Rows are packed independently. Each row stores a 4-bit sample width
//! and a 16-bit bias, then one `width`-bit sample per column:
//!
//! ```text
//! rows: 16 bits   cols: 16 bits
//! row 0: width:4 bias:16 sample[0]:width ... sample[cols-1]:width
//! row 1: ...
//! height = (sample + bias) as i16, wrapping
//! ```

use serde::{Deserialize, Serialize};

use crate::io::{bits_needed, BitReader, BitWriter};
use crate::traits::{ParseError, ParseResult};

/// Indices into the depth map wrap at this edge length
pub const WRAP_MASK: u32 = 1023;
/// Raw heights are stored in 1/256 units
pub const HEIGHT_SCALE: f32 = 256.0;

const MAX_SAMPLE_WIDTH: u32 = 15;

/// Packing parameters of one depth map row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowEncoding {
    pub width: u8,
    pub bias: u16,
}

impl RowEncoding {
    /// Smallest encoding that can hold every height in `row`
    pub fn minimal(row: &[i16]) -> ParseResult<Self> {
        let (Some(&min), Some(&max)) = (row.iter().min(), row.iter().max()) else {
            return Ok(Self { width: 0, bias: 0 });
        };
        let span = (i32::from(max) - i32::from(min)) as u32;
        let width = bits_needed(span);
        if width > MAX_SAMPLE_WIDTH {
            return Err(ParseError::overflow("depth_row_width", u64::from(width), u64::from(MAX_SAMPLE_WIDTH)));
        }
        Ok(Self {
            width: width as u8,
            bias: min as u16,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthMap {
    pub rows: u16,
    pub cols: u16,
    /// Raw heights, row-major
    pub heights: Vec<i16>,
    pub row_encoding: Vec<RowEncoding>,
}

impl DepthMap {
    /// Build a map from raw heights, choosing minimal row encodings
    pub fn from_heights(rows: u16, cols: u16, heights: Vec<i16>) -> ParseResult<Self> {
        if heights.len() != usize::from(rows) * usize::from(cols) {
            return Err(ParseError::InvalidStructure(format!(
                "{} heights for a {rows}x{cols} depth map",
                heights.len()
            )));
        }
        let mut map = Self {
            rows,
            cols,
            heights,
            row_encoding: Vec::new(),
        };
        map.reencode()?;
        Ok(map)
    }

    /// Recompute the minimal encoding of every row
    pub fn reencode(&mut self) -> ParseResult<()> {
        let cols = usize::from(self.cols);
        self.row_encoding = if cols == 0 {
            vec![RowEncoding { width: 0, bias: 0 }; usize::from(self.rows)]
        } else {
            self.heights
                .chunks(cols)
                .map(RowEncoding::minimal)
                .collect::<ParseResult<_>>()?
        };
        Ok(())
    }

    pub fn read(reader: &mut BitReader<'_>) -> ParseResult<Self> {
        let rows = reader.read_field("depth_rows", 16)? as u16;
        let cols = reader.read_field("depth_cols", 16)? as u16;

        let mut heights = Vec::with_capacity(usize::from(rows) * usize::from(cols));
        let mut row_encoding = Vec::with_capacity(usize::from(rows));
        for _ in 0..rows {
            let width = reader.read_field("depth_row_width", 4)?;
            let bias = reader.read_field("depth_row_bias", 16)? as u16;
            for _ in 0..cols {
                let sample = reader.read_width("depth_sample", width)? as u16;
                heights.push(sample.wrapping_add(bias) as i16);
            }
            row_encoding.push(RowEncoding {
                width: width as u8,
                bias,
            });
        }

        tracing::debug!(rows, cols, "Decoded depth map");
        Ok(Self {
            rows,
            cols,
            heights,
            row_encoding,
        })
    }

    pub fn write(&self, writer: &mut BitWriter) -> ParseResult<()> {
        let cols = usize::from(self.cols);
        if self.heights.len() != usize::from(self.rows) * cols || self.row_encoding.len() != usize::from(self.rows) {
            return Err(ParseError::InvalidStructure(format!(
                "depth map {}x{} holds {} heights and {} row encodings",
                self.rows,
                self.cols,
                self.heights.len(),
                self.row_encoding.len()
            )));
        }

        writer.write_field("depth_rows", u32::from(self.rows), 16)?;
        writer.write_field("depth_cols", u32::from(self.cols), 16)?;
        for (row, encoding) in self.row_encoding.iter().enumerate() {
            let width = u32::from(encoding.width);
            writer.write_field("depth_row_width", width, 4)?;
            writer.write_field("depth_row_bias", u32::from(encoding.bias), 16)?;
            for &height in &self.heights[row * cols..(row + 1) * cols] {
                let sample = (height as u16).wrapping_sub(encoding.bias);
                writer.write_width("depth_sample", u32::from(sample), width)?;
            }
        }
        Ok(())
    }

    /// Flat index of a wrapped `(row, col)` lookup
    ///
    /// Rows are strided by the map width rather than a fixed 1024, so the
    /// two only agree for 1024-wide maps. Narrower maps index their own rows
    /// instead of reading into a neighbouring row.
    pub fn wrapped_index(&self, row: u32, col: u32) -> usize {
        let row = (row & WRAP_MASK) as usize;
        let col = (col & WRAP_MASK) as usize;
        row * usize::from(self.cols) + col
    }

    /// Raw height at column `x`, row `y`, wrapping both at 1024
    pub fn height_at(&self, x: u32, y: u32) -> Option<i16> {
        self.heights.get(self.wrapped_index(y, x)).copied()
    }

    /// Height at column `x`, row `y` in world units
    pub fn height_world(&self, x: u32, y: u32) -> Option<f32> {
        self.height_at(x, y).map(|h| f32::from(h) / HEIGHT_SCALE)
    }

    pub fn min_max(&self) -> Option<(i16, i16)> {
        Some((*self.heights.iter().min()?, *self.heights.iter().max()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(bytes: &[u8]) -> DepthMap {
        DepthMap::read(&mut BitReader::new(bytes)).unwrap()
    }

    #[test]
    fn test_hand_packed_row() {
        // rows=1 cols=2, width=3 bias=100, samples 5 and 2
        let mut writer = BitWriter::new();
        writer.write_field("r", 1, 16).unwrap();
        writer.write_field("c", 2, 16).unwrap();
        writer.write_field("w", 3, 4).unwrap();
        writer.write_field("b", 100, 16).unwrap();
        writer.write_field("s", 5, 3).unwrap();
        writer.write_field("s", 2, 3).unwrap();

        let map = decode(writer.as_bytes());
        assert_eq!(map.heights, vec![105, 102]);
        assert_eq!(map.row_encoding, vec![RowEncoding { width: 3, bias: 100 }]);
    }

    #[test]
    fn test_bias_wraps_to_negative_heights() {
        let map = DepthMap::from_heights(1, 3, vec![-300, -1, 200]).unwrap();
        let mut writer = BitWriter::new();
        map.write(&mut writer).unwrap();

        let decoded = decode(writer.as_bytes());
        assert_eq!(decoded.heights, vec![-300, -1, 200]);
        assert_eq!(decoded, map);
    }

    #[test]
    fn test_zero_width_row() {
        let map = DepthMap::from_heights(2, 2, vec![7, 7, 0, 1]).unwrap();
        assert_eq!(map.row_encoding[0], RowEncoding { width: 0, bias: 7 });
        assert_eq!(map.row_encoding[1], RowEncoding { width: 1, bias: 0 });

        let mut writer = BitWriter::new();
        map.write(&mut writer).unwrap();
        assert_eq!(decode(writer.as_bytes()), map);
    }

    #[test]
    fn test_span_too_wide() {
        assert!(RowEncoding::minimal(&[i16::MIN, i16::MAX]).is_err());
    }

    #[test]
    fn test_wrapped_lookup() {
        let map = DepthMap::from_heights(2, 2, vec![1, 2, 3, 4]).unwrap();
        assert_eq!(map.height_at(1, 0), Some(2));
        assert_eq!(map.height_at(1024, 1025), Some(3));
        assert_eq!(map.height_world(1, 1), Some(4.0 / 256.0));
        assert_eq!(map.height_at(5, 0), None);
    }

    #[test]
    fn test_row_stride_is_map_width() {
        let map = DepthMap::from_heights(4, 4, (0..16).collect()).unwrap();
        assert_eq!(map.wrapped_index(1, 0), 4);
        assert_eq!(map.wrapped_index(1025, 3), 7);
        assert_eq!(map.height_at(3, 1), Some(7));
    }
}
