//! Bit and byte cursor tests
//!
//! The bit reader is checked against a one-bit-at-a-time oracle for every
//! width at every starting bit offset.

use novakit_parsers::io::{BitReader, BitWriter, ByteReader};
use novakit_parsers::ErrorKind;
use proptest::prelude::*;

/// Reference: bit `i` of the stream is bit `i % 8` of byte `i / 8`
fn oracle(data: &[u8], start: u64, width: u32) -> u32 {
    (0..u64::from(width)).fold(0u32, |acc, k| {
        let bit = start + k;
        let value = (data[(bit / 8) as usize] >> (bit % 8)) & 1;
        acc | (u32::from(value) << k)
    })
}

proptest! {
    #[test]
    fn read_bits_matches_oracle(data in proptest::collection::vec(any::<u8>(), 8..16), offset in 0u32..8) {
        for width in 1..=32u32 {
            let mut reader = BitReader::new(&data);
            if offset > 0 {
                reader.read_bits(offset).unwrap();
            }
            let expected = oracle(&data, u64::from(offset), width);
            prop_assert_eq!(reader.read_bits(width).unwrap(), expected);
            prop_assert_eq!(reader.bit_position(), u64::from(offset + width));
        }
    }

    #[test]
    fn writer_is_inverse_of_reader(fields in proptest::collection::vec((any::<u32>(), 1u32..=32), 1..40)) {
        let mut writer = BitWriter::new();
        let masked: Vec<(u32, u32)> = fields
            .iter()
            .map(|&(v, w)| (if w == 32 { v } else { v & ((1 << w) - 1) }, w))
            .collect();
        for &(value, width) in &masked {
            writer.write_bits(value, width).unwrap();
        }
        let bytes = writer.into_bytes();

        let mut reader = BitReader::new(&bytes);
        for &(value, width) in &masked {
            prop_assert_eq!(reader.read_bits(width).unwrap(), value);
        }
    }
}

mod bit_reader_tests {
    use super::*;

    #[test]
    fn test_invalid_widths() {
        let data = [0xFFu8; 8];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_bits(0).unwrap_err().kind(), ErrorKind::InvalidBitCount);
        assert_eq!(reader.read_bits(33).unwrap_err().kind(), ErrorKind::InvalidBitCount);
        assert_eq!(reader.bit_position(), 0);
    }

    #[test]
    fn test_read_past_end() {
        let data = [0xAAu8; 2];
        let mut reader = BitReader::new(&data);
        reader.read_bits(10).unwrap();
        let err = reader.read_field("vertex_count", 7).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TruncatedData);
        assert!(err.to_string().contains("vertex_count"));
    }

    #[test]
    fn test_alignment() {
        let data = [0u8; 12];
        let mut reader = BitReader::new(&data);
        reader.read_bits(3).unwrap();
        reader.align_to_byte();
        assert_eq!(reader.byte_position(), 1);
        reader.align_to_4_bytes();
        assert_eq!(reader.byte_position(), 4);
        reader.align_to_4_bytes();
        assert_eq!(reader.byte_position(), 4);
    }

    #[test]
    fn test_lsb_first_order() {
        // 0b1011_0110: low three bits are 110, next five are 10110
        let data = [0b1011_0110u8];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_bits(3).unwrap(), 0b110);
        assert_eq!(reader.read_bits(5).unwrap(), 0b10110);
        assert!(reader.is_at_end());
    }
}

mod byte_reader_tests {
    use super::*;

    #[test]
    fn test_little_endian_fields() {
        let data = [0x34, 0x12, 0x78, 0x56, 0x34, 0x12, 0xFF];
        let mut reader = ByteReader::new(&data);
        assert_eq!(reader.read_u16("a").unwrap(), 0x1234);
        assert_eq!(reader.read_u32("b").unwrap(), 0x1234_5678);
        assert_eq!(reader.read_i8("c").unwrap(), -1);
        assert!(reader.is_at_end());
    }

    #[test]
    fn test_truncation_names_field() {
        let data = [0u8; 3];
        let mut reader = ByteReader::new(&data);
        let err = reader.read_u32("num_items").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TruncatedData);
        assert!(err.to_string().contains("num_items"));
    }

    #[test]
    fn test_record_length_assertion() {
        let data = [0u8; 16];

        let mut reader = ByteReader::new(&data);
        reader.mark();
        reader.read_u32("a").unwrap();
        let err = reader.assert_consumed("record", 8).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvariantViolated);

        let mut lenient = ByteReader::new(&data).with_length_checks(false);
        lenient.mark();
        lenient.read_u32("a").unwrap();
        assert!(lenient.assert_consumed("record", 8).is_ok());
    }

    #[test]
    fn test_fixed_point_vector() {
        // (frac, whole) pairs: 1.25, -2.0, 0.125
        let mut data = Vec::new();
        for (frac, whole) in [(0x4000i16, 1i16), (0, -2), (0x2000, 0)] {
            data.extend_from_slice(&frac.to_le_bytes());
            data.extend_from_slice(&whole.to_le_bytes());
        }
        let mut reader = ByteReader::new(&data);
        let v = reader.read_fixed_vec3("position").unwrap().to_vec3();
        assert_eq!((v.x, v.y, v.z), (1.25, -2.0, 0.125));
    }
}
