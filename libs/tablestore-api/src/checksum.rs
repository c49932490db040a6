//! CRC-8 checksums over cells and rows.
//!
//! The byte layout must match the plain-buffer wire encoder exactly: a
//! one-byte type tag, then the payload. Fixed-width numbers are fed as
//! little-endian bytes; variable-width values are prefixed with their length
//! as a 4-byte little-endian integer. Markers feed their tag only.

use crc::{CRC_8_SMBUS, Crc};

use crate::error::ChecksumError;
use crate::record::{Cell, PrimaryKeyColumn, Row};
use crate::value::{ColumnValue, PrimaryKeyValue};

/// Polynomial 0x07, no reflection, no final xor. The running value is the
/// initial register, so feeding `a` then `b` equals feeding `a ++ b`.
const CRC8: Crc<u8> = Crc::<u8>::new(&CRC_8_SMBUS);

/// Type tags shared with the wire encoder.
pub mod tags {
    pub const INTEGER: u8 = 0x00;
    pub const DOUBLE: u8 = 0x01;
    pub const BOOLEAN: u8 = 0x02;
    pub const STRING: u8 = 0x03;
    pub const BINARY: u8 = 0x07;
    pub const INF_MIN: u8 = 0x09;
    pub const INF_MAX: u8 = 0x0a;
    pub const AUTO_INCREMENT: u8 = 0x0b;
    pub const DATE_TIME: u8 = 0x0c;
}

/// Trailing byte of a row checksum for rows without a delete marker.
const NO_ROW_DELETE: u8 = 0x00;

pub fn crc8_bytes(crc: u8, bytes: &[u8]) -> u8 {
    let mut digest = CRC8.digest_with_initial(crc);
    digest.update(bytes);
    digest.finalize()
}

pub fn crc8_u8(crc: u8, byte: u8) -> u8 {
    crc8_bytes(crc, &[byte])
}

pub fn crc8_u32(crc: u8, value: u32) -> u8 {
    crc8_bytes(crc, &value.to_le_bytes())
}

pub fn crc8_i64(crc: u8, value: i64) -> u8 {
    crc8_bytes(crc, &value.to_le_bytes())
}

fn crc8_sized(crc: u8, tag: u8, bytes: &[u8]) -> u8 {
    let crc = crc8_u8(crc, tag);
    // 4-byte length prefix
    let crc = crc8_u32(crc, bytes.len() as u32);
    crc8_bytes(crc, bytes)
}

/// Fold a data-column value into a running checksum.
pub fn column_value(crc: u8, value: &ColumnValue) -> u8 {
    match value {
        ColumnValue::Integer(v) => crc8_i64(crc8_u8(crc, tags::INTEGER), *v),
        ColumnValue::Double(v) => {
            crc8_i64(crc8_u8(crc, tags::DOUBLE), v.to_bits() as i64)
        }
        ColumnValue::Boolean(v) => crc8_u8(crc8_u8(crc, tags::BOOLEAN), u8::from(*v)),
        ColumnValue::String(s) => crc8_sized(crc, tags::STRING, s.as_bytes()),
        ColumnValue::Binary(b) => crc8_sized(crc, tags::BINARY, b),
        ColumnValue::DateTime(v) => crc8_i64(crc8_u8(crc, tags::DATE_TIME), *v),
    }
}

/// Fold a primary-key value into a running checksum.
pub fn primary_key_value(crc: u8, value: &PrimaryKeyValue) -> u8 {
    match value {
        PrimaryKeyValue::InfMin => crc8_u8(crc, tags::INF_MIN),
        PrimaryKeyValue::InfMax => crc8_u8(crc, tags::INF_MAX),
        PrimaryKeyValue::AutoIncrement => crc8_u8(crc, tags::AUTO_INCREMENT),
        PrimaryKeyValue::Integer(v) => crc8_i64(crc8_u8(crc, tags::INTEGER), *v),
        PrimaryKeyValue::String(s) => crc8_sized(crc, tags::STRING, s.as_bytes()),
        PrimaryKeyValue::Binary(b) => crc8_sized(crc, tags::BINARY, b),
        PrimaryKeyValue::DateTime(v) => crc8_i64(crc8_u8(crc, tags::DATE_TIME), *v),
    }
}

/// Checksum of one primary-key column: name bytes, then the value.
pub fn primary_key_column(column: &PrimaryKeyColumn) -> u8 {
    primary_key_value(crc8_bytes(0, column.name.as_bytes()), &column.value)
}

/// Checksum of one cell: name bytes, value, then the timestamp if present.
pub fn cell(cell: &Cell) -> u8 {
    let crc = column_value(crc8_bytes(0, cell.name.as_bytes()), &cell.value);
    match cell.timestamp {
        Some(ts) => crc8_i64(crc, ts),
        None => crc,
    }
}

/// Row checksum: every key column and cell checksum in row order, then the
/// delete-marker byte.
pub fn row(row: &Row) -> u8 {
    let crc = row
        .primary_key()
        .columns()
        .iter()
        .fold(0, |crc, col| crc8_u8(crc, primary_key_column(col)));
    let crc = row
        .cells()
        .iter()
        .fold(crc, |crc, c| crc8_u8(crc, cell(c)));
    crc8_u8(crc, NO_ROW_DELETE)
}

/// Compare a row against the checksum the decoder read off the wire.
pub fn verify_row(decoded: &Row, expected: u8) -> Result<(), ChecksumError> {
    let actual = row(decoded);
    if actual != expected {
        return Err(ChecksumError::Mismatch { expected, actual });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::PrimaryKey;

    /// Bitwise CRC-8, poly 0x07, MSB first.
    fn reference_crc8(mut crc: u8, bytes: &[u8]) -> u8 {
        for &b in bytes {
            crc ^= b;
            for _ in 0..8 {
                crc = if crc & 0x80 != 0 { (crc << 1) ^ 0x07 } else { crc << 1 };
            }
        }
        crc
    }

    #[test]
    fn matches_bitwise_reference_with_seed() {
        let data = b"wide-column";
        for seed in [0u8, 1, 0x5a, 0xff] {
            assert_eq!(crc8_bytes(seed, data), reference_crc8(seed, data));
        }
        // "123456789" check value for CRC-8/SMBUS
        assert_eq!(crc8_bytes(0, b"123456789"), 0xf4);
    }

    #[test]
    fn incremental_equals_concatenated() {
        let split = crc8_bytes(crc8_bytes(7, b"abc"), b"def");
        assert_eq!(split, crc8_bytes(7, b"abcdef"));
    }

    #[test]
    fn integer_payload_is_little_endian() {
        let expected = reference_crc8(reference_crc8(0, &[tags::INTEGER]), &97i64.to_le_bytes());
        assert_eq!(column_value(0, &ColumnValue::Integer(97)), expected);
    }

    #[test]
    fn string_payload_is_length_prefixed() {
        let mut bytes = vec![tags::STRING];
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.push(b'a');
        assert_eq!(column_value(0, &ColumnValue::from("a")), reference_crc8(0, &bytes));
    }

    #[test]
    fn string_and_integer_with_similar_bytes_differ() {
        let s = column_value(0, &ColumnValue::from("a"));
        let i = column_value(0, &ColumnValue::Integer(97));
        assert_ne!(s, i);
        assert_eq!(s, column_value(0, &ColumnValue::from("a")));
    }

    #[test]
    fn markers_feed_only_their_tag() {
        assert_eq!(primary_key_value(3, &PrimaryKeyValue::InfMin), crc8_u8(3, tags::INF_MIN));
        assert_eq!(primary_key_value(3, &PrimaryKeyValue::InfMax), crc8_u8(3, tags::INF_MAX));
        assert_eq!(
            primary_key_value(3, &PrimaryKeyValue::AutoIncrement),
            crc8_u8(3, tags::AUTO_INCREMENT)
        );
    }

    #[test]
    fn key_and_column_agree_for_shared_types() {
        assert_eq!(
            primary_key_value(9, &PrimaryKeyValue::from("k")),
            column_value(9, &ColumnValue::from("k"))
        );
        assert_eq!(
            primary_key_value(9, &PrimaryKeyValue::DateTime(12)),
            column_value(9, &ColumnValue::DateTime(12))
        );
    }

    #[test]
    fn cell_checksum_covers_timestamp() {
        let plain = Cell::new("c", true);
        let versioned = plain.clone().with_timestamp(1_700_000_000_000);
        assert_eq!(cell(&plain), cell(&plain.clone()));
        assert_ne!(cell(&plain), cell(&versioned));
    }

    #[test]
    fn verify_row_detects_changes() {
        let pk = PrimaryKey::builder().add("id", 1).build().unwrap();
        let original = Row::new(pk.clone(), vec![Cell::new("v", 1.5).with_timestamp(10)]);
        let expected = row(&original);
        assert_eq!(verify_row(&original, expected), Ok(()));

        let tampered = Row::new(pk, vec![Cell::new("v", 2.5).with_timestamp(10)]);
        assert!(matches!(
            verify_row(&tampered, expected),
            Err(ChecksumError::Mismatch { .. })
        ));
    }
}
