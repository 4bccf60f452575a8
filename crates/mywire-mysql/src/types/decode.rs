//! Row cell decoding for both wire formats.
//!
//! Every failure is a protocol violation that names the column and records
//! the byte offset of the offending cell.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]

use std::str::FromStr;

use mywire_core::{Date, DateTime, Error, Result, Time, Value};

use super::{ColumnDef, FieldType, Format};
use crate::protocol::PacketReader;

/// Decode one cell.
///
/// In the text format the cell is a length-encoded string and 0xFB means
/// NULL. In the binary format the caller has already consulted the row's
/// null bitmap; only non-NULL cells reach this function.
pub fn decode_cell(
    reader: &mut PacketReader<'_>,
    column: &ColumnDef,
    format: Format,
) -> Result<Value> {
    let offset = reader.position();
    match format {
        Format::Text => {
            let Some(len) = reader.read_lenenc_int_or_null()? else {
                return Ok(Value::Null);
            };
            let len = usize::try_from(len)
                .map_err(|_| cell_error(column, "cell length overflows", offset))?;
            let data = reader.read_bytes(len)?;
            decode_text_value(data, column, offset)
        }
        Format::Binary => decode_binary_value(reader, column, offset),
    }
}

fn cell_error(column: &ColumnDef, message: impl std::fmt::Display, offset: usize) -> Error {
    Error::protocol(
        format!("column '{}' ({}): {}", column.name, column.column_type.name(), message),
        Some(offset),
    )
}

fn utf8<'a>(data: &'a [u8], column: &ColumnDef, offset: usize) -> Result<&'a str> {
    std::str::from_utf8(data).map_err(|e| cell_error(column, e, offset))
}

fn parse_text<T: FromStr>(data: &[u8], column: &ColumnDef, offset: usize) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    let text = utf8(data, column, offset)?;
    text.parse()
        .map_err(|e| cell_error(column, format!("cannot parse {:?}: {}", text, e), offset))
}

fn decode_text_value(data: &[u8], column: &ColumnDef, offset: usize) -> Result<Value> {
    let unsigned = column.is_unsigned();
    Ok(match column.column_type {
        FieldType::Null => Value::Null,
        FieldType::Tiny if column.is_bool() => {
            Value::Bool(parse_text::<i64>(data, column, offset)? != 0)
        }
        FieldType::Tiny if unsigned => Value::UnsignedTinyInt(parse_text(data, column, offset)?),
        FieldType::Tiny => Value::TinyInt(parse_text(data, column, offset)?),
        FieldType::Year => Value::UnsignedSmallInt(parse_text(data, column, offset)?),
        FieldType::Short if unsigned => {
            Value::UnsignedSmallInt(parse_text(data, column, offset)?)
        }
        FieldType::Short => Value::SmallInt(parse_text(data, column, offset)?),
        FieldType::Int24 | FieldType::Long if unsigned => {
            Value::UnsignedInt(parse_text(data, column, offset)?)
        }
        FieldType::Int24 | FieldType::Long => Value::Int(parse_text(data, column, offset)?),
        FieldType::LongLong if unsigned => {
            Value::UnsignedBigInt(parse_text(data, column, offset)?)
        }
        FieldType::LongLong => Value::BigInt(parse_text(data, column, offset)?),
        FieldType::Float => Value::Float(parse_text(data, column, offset)?),
        FieldType::Double => Value::Double(parse_text(data, column, offset)?),
        FieldType::Decimal | FieldType::NewDecimal => {
            Value::Decimal(utf8(data, column, offset)?.to_string())
        }
        FieldType::Date | FieldType::NewDate => {
            let text = utf8(data, column, offset)?;
            Value::Date(
                Date::parse(text)
                    .ok_or_else(|| cell_error(column, format!("invalid date {:?}", text), offset))?,
            )
        }
        FieldType::Time | FieldType::Time2 => {
            let text = utf8(data, column, offset)?;
            Value::Time(
                Time::parse(text)
                    .ok_or_else(|| cell_error(column, format!("invalid time {:?}", text), offset))?,
            )
        }
        FieldType::DateTime
        | FieldType::Timestamp
        | FieldType::DateTime2
        | FieldType::Timestamp2 => {
            let text = utf8(data, column, offset)?;
            Value::DateTime(DateTime::parse(text).ok_or_else(|| {
                cell_error(column, format!("invalid datetime {:?}", text), offset)
            })?)
        }
        FieldType::Bit if column.read_as_string => Value::Bit(parse_text(data, column, offset)?),
        FieldType::Bit => Value::Bit(bits_from_be(data, column, offset)?),
        FieldType::Json => Value::Json(
            serde_json::from_slice(data).map_err(|e| cell_error(column, e, offset))?,
        ),
        FieldType::Geometry => Value::Bytes(data.to_vec()),
        FieldType::VarChar
        | FieldType::VarString
        | FieldType::String
        | FieldType::Enum
        | FieldType::Set
        | FieldType::TinyBlob
        | FieldType::MediumBlob
        | FieldType::LongBlob
        | FieldType::Blob => {
            if column.is_binary_charset() {
                Value::Bytes(data.to_vec())
            } else {
                Value::Text(utf8(data, column, offset)?.to_string())
            }
        }
    })
}

/// Decode a right-aligned big-endian bit field at the column's declared width.
fn bits_from_be(data: &[u8], column: &ColumnDef, offset: usize) -> Result<u64> {
    let width = column.bit_width().map_err(|err| match err {
        Error::Protocol(mut p) => {
            p.offset = Some(offset);
            Error::Protocol(p)
        }
        other => other,
    })?;
    if data.len() > width {
        return Err(cell_error(
            column,
            format!("{} bytes exceed the declared width of {}", data.len(), width),
            offset,
        ));
    }
    Ok(data.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b)))
}

fn decode_binary_value(
    reader: &mut PacketReader<'_>,
    column: &ColumnDef,
    offset: usize,
) -> Result<Value> {
    let unsigned = column.is_unsigned();
    Ok(match column.column_type {
        FieldType::Null => Value::Null,
        FieldType::Tiny => {
            let b = reader.read_u8()?;
            if column.is_bool() {
                Value::Bool(b != 0)
            } else if unsigned {
                Value::UnsignedTinyInt(b)
            } else {
                Value::TinyInt(b as i8)
            }
        }
        FieldType::Year => Value::UnsignedSmallInt(reader.read_u16_le()?),
        FieldType::Short => {
            let v = reader.read_u16_le()?;
            if unsigned {
                Value::UnsignedSmallInt(v)
            } else {
                Value::SmallInt(v as i16)
            }
        }
        FieldType::Int24 | FieldType::Long => {
            let v = reader.read_u32_le()?;
            if unsigned {
                Value::UnsignedInt(v)
            } else {
                Value::Int(v as i32)
            }
        }
        FieldType::LongLong => {
            let v = reader.read_u64_le()?;
            if unsigned {
                Value::UnsignedBigInt(v)
            } else {
                Value::BigInt(v as i64)
            }
        }
        FieldType::Float => Value::Float(f32::from_bits(reader.read_u32_le()?)),
        FieldType::Double => Value::Double(f64::from_bits(reader.read_u64_le()?)),
        FieldType::Date | FieldType::NewDate => {
            Value::Date(read_binary_datetime(reader, column, offset)?.date())
        }
        FieldType::DateTime
        | FieldType::Timestamp
        | FieldType::DateTime2
        | FieldType::Timestamp2 => Value::DateTime(read_binary_datetime(reader, column, offset)?),
        FieldType::Time | FieldType::Time2 => Value::Time(read_binary_time(reader, column, offset)?),
        FieldType::Bit => {
            let data = reader.read_lenenc_bytes()?;
            if column.read_as_string {
                Value::Bit(parse_text(data, column, offset)?)
            } else {
                Value::Bit(bits_from_be(data, column, offset)?)
            }
        }
        FieldType::Decimal
        | FieldType::NewDecimal
        | FieldType::VarChar
        | FieldType::VarString
        | FieldType::String
        | FieldType::Enum
        | FieldType::Set
        | FieldType::TinyBlob
        | FieldType::MediumBlob
        | FieldType::LongBlob
        | FieldType::Blob
        | FieldType::Geometry
        | FieldType::Json => {
            let data = reader.read_lenenc_bytes()?;
            decode_text_value(data, column, offset)?
        }
    })
}

fn read_binary_datetime(
    reader: &mut PacketReader<'_>,
    column: &ColumnDef,
    offset: usize,
) -> Result<DateTime> {
    let len = reader.read_u8()?;
    if !matches!(len, 0 | 4 | 7 | 11) {
        return Err(cell_error(column, format!("invalid length {}", len), offset));
    }
    let mut dt = DateTime::ZERO;
    if len >= 4 {
        dt.year = reader.read_u16_le()?;
        dt.month = reader.read_u8()?;
        dt.day = reader.read_u8()?;
    }
    if len >= 7 {
        dt.hour = reader.read_u8()?;
        dt.minute = reader.read_u8()?;
        dt.second = reader.read_u8()?;
    }
    if len == 11 {
        dt.microsecond = reader.read_u32_le()?;
    }
    Ok(dt)
}

fn read_binary_time(
    reader: &mut PacketReader<'_>,
    column: &ColumnDef,
    offset: usize,
) -> Result<Time> {
    let len = reader.read_u8()?;
    match len {
        0 => Ok(Time::ZERO),
        8 | 12 => {
            let negative = reader.read_u8()? != 0;
            let days = reader.read_u32_le()?;
            let hours = reader.read_u8()?;
            let minutes = reader.read_u8()?;
            let seconds = reader.read_u8()?;
            let microseconds = if len == 12 { reader.read_u32_le()? } else { 0 };
            Ok(Time {
                negative,
                days,
                hours,
                minutes,
                seconds,
                microseconds,
            })
        }
        _ => Err(cell_error(column, format!("invalid length {}", len), offset)),
    }
}

fn check_consumed(reader: &PacketReader<'_>, columns: &[ColumnDef]) -> Result<()> {
    if reader.is_empty() {
        Ok(())
    } else {
        Err(Error::protocol(
            format!(
                "row has {} trailing bytes after {} columns",
                reader.remaining(),
                columns.len()
            ),
            Some(reader.position()),
        ))
    }
}

/// Decode a text-protocol row.
pub fn decode_text_row(payload: &[u8], columns: &[ColumnDef]) -> Result<Vec<Value>> {
    let mut reader = PacketReader::new(payload);
    let values = columns
        .iter()
        .map(|column| decode_cell(&mut reader, column, Format::Text))
        .collect::<Result<Vec<_>>>()?;
    check_consumed(&reader, columns)?;
    Ok(values)
}

/// Decode a binary-protocol row: 0x00 header, null bitmap at bit offset 2,
/// then every non-NULL cell.
pub fn decode_binary_row(payload: &[u8], columns: &[ColumnDef]) -> Result<Vec<Value>> {
    let mut reader = PacketReader::new(payload);
    let header = reader.read_u8()?;
    if header != 0x00 {
        return Err(Error::protocol(
            format!("binary row header 0x{:02X}, expected 0x00", header),
            Some(0),
        ));
    }
    let bitmap = reader.read_bytes((columns.len() + 7 + 2) / 8)?;

    let mut values = Vec::with_capacity(columns.len());
    for (i, column) in columns.iter().enumerate() {
        let bit = i + 2;
        if bitmap[bit / 8] & (1 << (bit % 8)) != 0 {
            values.push(Value::Null);
        } else {
            values.push(decode_cell(&mut reader, column, Format::Binary)?);
        }
    }
    check_consumed(&reader, columns)?;
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PacketWriter;
    use crate::types::{column_flags, column_for_value, encode_binary_row, encode_cell, encode_text_row};

    fn sample_values() -> Vec<Value> {
        vec![
            Value::Null,
            Value::Bool(true),
            Value::Bool(false),
            Value::TinyInt(-128),
            Value::UnsignedTinyInt(255),
            Value::SmallInt(-300),
            Value::UnsignedSmallInt(65535),
            Value::Int(i32::MIN),
            Value::UnsignedInt(u32::MAX),
            Value::BigInt(-9_000_000_000),
            Value::UnsignedBigInt(u64::MAX),
            Value::Float(1.5),
            Value::Double(0.1),
            Value::Decimal("12345.6789".to_string()),
            Value::Text("wooden train".to_string()),
            Value::Text(String::new()),
            Value::Bytes(vec![0, 0xFB, 0xFF]),
            Value::Date(Date::new(2024, 2, 29)),
            Value::Date(Date::ZERO),
            Value::Time(Time::parse("-838:59:59").unwrap()),
            Value::Time(Time::parse("12:00:00.250000").unwrap()),
            Value::DateTime(DateTime::new(1999, 12, 31, 23, 59, 59).with_microsecond(1)),
            Value::DateTime(DateTime::new(2000, 1, 1, 0, 0, 0)),
            Value::Bit(0),
            Value::Bit(u64::MAX),
            Value::Json(serde_json::json!({"toys": [1, 2, 3], "ok": true})),
        ]
    }

    fn roundtrip(value: &Value, column: &ColumnDef, format: Format) -> Value {
        let mut writer = PacketWriter::new();
        encode_cell(value, column, format, &mut writer).unwrap();
        let bytes = writer.into_bytes();
        let mut reader = PacketReader::new(&bytes);
        let decoded = decode_cell(&mut reader, column, format).unwrap();
        assert!(reader.is_empty(), "{value:?} left bytes behind");
        decoded
    }

    #[test]
    fn test_text_roundtrip_every_variant() {
        for value in sample_values() {
            let column = column_for_value("c", &value);
            assert_eq!(roundtrip(&value, &column, Format::Text), value);
        }
    }

    #[test]
    fn test_binary_roundtrip_every_variant() {
        for value in sample_values().into_iter().filter(|v| !v.is_null()) {
            let column = column_for_value("c", &value);
            assert_eq!(roundtrip(&value, &column, Format::Binary), value);
        }
    }

    #[test]
    fn test_bit_roundtrip_at_each_width() {
        for bits in 1..=64u32 {
            let width = bits.div_ceil(8);
            let max = if width == 8 { u64::MAX } else { (1u64 << (width * 8)) - 1 };
            let mut column = ColumnDef::new("b", FieldType::Bit).with_length(bits);
            for value in [0, 1, max] {
                for format in [Format::Text, Format::Binary] {
                    column.read_as_string = false;
                    assert_eq!(roundtrip(&Value::Bit(value), &column, format), Value::Bit(value));
                    column.read_as_string = true;
                    assert_eq!(roundtrip(&Value::Bit(value), &column, format), Value::Bit(value));
                }
            }
        }
    }

    #[test]
    fn test_bit_text_is_decimal_when_read_as_string() {
        let mut column = ColumnDef::new("b", FieldType::Bit).with_length(16);
        column.read_as_string = true;
        let mut reader = PacketReader::new(b"\x0565535");
        assert_eq!(
            decode_cell(&mut reader, &column, Format::Text).unwrap(),
            Value::Bit(65535)
        );
    }

    #[test]
    fn test_negative_zero_time_agrees_across_formats() {
        let column = ColumnDef::new("t", FieldType::Time);
        let value = Value::Time(Time::parse("-00:00:00").unwrap());
        assert_eq!(roundtrip(&value, &column, Format::Text), value);
        assert_eq!(roundtrip(&value, &column, Format::Binary), value);
        assert_eq!(roundtrip(&value, &column, Format::Binary), Value::Time(Time::ZERO));
    }

    #[test]
    fn test_binary_bit_is_decimal_when_read_as_string() {
        let mut column = ColumnDef::new("b", FieldType::Bit).with_length(16);
        column.read_as_string = true;
        let mut reader = PacketReader::new(b"\x0565535");
        assert_eq!(
            decode_cell(&mut reader, &column, Format::Binary).unwrap(),
            Value::Bit(65535)
        );

        let mut writer = PacketWriter::new();
        encode_cell(&Value::Bit(65535), &column, Format::Binary, &mut writer).unwrap();
        assert_eq!(writer.as_bytes(), b"\x0565535");
    }

    #[test]
    fn test_bit_raw_big_endian() {
        let column = ColumnDef::new("b", FieldType::Bit).with_length(10);
        let mut reader = PacketReader::new(&[2, 0x02, 0x01]);
        assert_eq!(
            decode_cell(&mut reader, &column, Format::Binary).unwrap(),
            Value::Bit(0x0201)
        );
    }

    #[test]
    fn test_bit_width_violations() {
        // Payload longer than the declared width
        let column = ColumnDef::new("b", FieldType::Bit).with_length(8);
        let mut reader = PacketReader::new(&[2, 0x01, 0x00]);
        let err = decode_cell(&mut reader, &column, Format::Text).unwrap_err();
        assert!(matches!(err, Error::Protocol(ref p) if p.offset == Some(0)));

        // Declared width outside 1..=8 bytes
        let column = ColumnDef::new("b", FieldType::Bit).with_length(0);
        let mut reader = PacketReader::new(&[0]);
        let err = decode_cell(&mut reader, &column, Format::Binary).unwrap_err();
        assert!(matches!(err, Error::Protocol(ref p) if p.offset == Some(0)));

        let column = ColumnDef::new("b", FieldType::Bit).with_length(72);
        let mut reader = PacketReader::new(&[1, 0]);
        assert!(decode_cell(&mut reader, &column, Format::Text).is_err());
    }

    #[test]
    fn test_null_consumes_only_marker() {
        let columns = vec![
            ColumnDef::new("a", FieldType::VarString),
            ColumnDef::new("b", FieldType::Long),
            ColumnDef::new("c", FieldType::VarString),
        ];
        let values = decode_text_row(b"\x00\xFB\x01x", &columns).unwrap();
        assert_eq!(
            values,
            vec![Value::Text(String::new()), Value::Null, Value::Text("x".into())]
        );

        let row = vec![Value::Text(String::new()), Value::Null, Value::Text("x".into())];
        let bytes = encode_binary_row(&row, &columns).unwrap();
        // header + 1 bitmap byte + empty string + "x"
        assert_eq!(bytes.len(), 1 + 1 + 1 + 2);
        assert_eq!(decode_binary_row(&bytes, &columns).unwrap(), row);
    }

    #[test]
    fn test_null_distinct_from_zero_and_empty() {
        let columns = vec![
            ColumnDef::new("n", FieldType::Long),
            ColumnDef::new("z", FieldType::Long),
        ];
        let values = decode_text_row(b"\xFB\x010", &columns).unwrap();
        assert_eq!(values, vec![Value::Null, Value::Int(0)]);
    }

    #[test]
    fn test_binary_row_bitmap_spans_bytes() {
        let columns: Vec<ColumnDef> = (0..10)
            .map(|i| ColumnDef::new(format!("c{i}"), FieldType::Tiny))
            .collect();
        let values: Vec<Value> = (0..10)
            .map(|i| if i % 3 == 0 { Value::Null } else { Value::TinyInt(i) })
            .collect();
        let bytes = encode_binary_row(&values, &columns).unwrap();
        assert_eq!(&bytes[..1], &[0x00]);
        // (10 + 9) / 8 = 2 bitmap bytes
        assert_eq!(bytes.len(), 1 + 2 + 6);
        assert_eq!(decode_binary_row(&bytes, &columns).unwrap(), values);
    }

    #[test]
    fn test_row_column_count_mismatch() {
        let columns = vec![ColumnDef::new("a", FieldType::Long)];
        let err = decode_text_row(b"\x011\x012", &columns).unwrap_err();
        assert!(matches!(err, Error::Protocol(ref p) if p.offset == Some(2)));

        let two = vec![
            ColumnDef::new("a", FieldType::Long),
            ColumnDef::new("b", FieldType::Long),
        ];
        assert!(matches!(
            decode_text_row(b"\x011", &two).unwrap_err(),
            Error::Protocol(_)
        ));
    }

    #[test]
    fn test_binary_row_bad_header() {
        let columns = vec![ColumnDef::new("a", FieldType::Tiny)];
        assert!(decode_binary_row(&[0x01, 0x00, 0x05], &columns).is_err());
    }

    #[test]
    fn test_text_decode_types() {
        let unsigned = ColumnDef::new("u", FieldType::LongLong).with_flags(column_flags::UNSIGNED);
        let mut reader = PacketReader::new(b"\x1418446744073709551615");
        assert_eq!(
            decode_cell(&mut reader, &unsigned, Format::Text).unwrap(),
            Value::UnsignedBigInt(u64::MAX)
        );

        let year = ColumnDef::new("y", FieldType::Year);
        let mut reader = PacketReader::new(b"\x042024");
        assert_eq!(
            decode_cell(&mut reader, &year, Format::Text).unwrap(),
            Value::UnsignedSmallInt(2024)
        );

        let binary = ColumnDef::new("b", FieldType::String).with_charset(63);
        let mut reader = PacketReader::new(b"\x02\xFF\x00");
        assert_eq!(
            decode_cell(&mut reader, &binary, Format::Text).unwrap(),
            Value::Bytes(vec![0xFF, 0x00])
        );
    }

    #[test]
    fn test_text_decode_reports_column_and_offset() {
        let columns = vec![
            ColumnDef::new("id", FieldType::Long),
            ColumnDef::new("qty", FieldType::Long),
        ];
        let err = decode_text_row(b"\x011\x03abc", &columns).unwrap_err();
        match err {
            Error::Protocol(p) => {
                assert_eq!(p.offset, Some(2));
                assert!(p.message.contains("qty"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_binary_temporal_lengths() {
        let column = ColumnDef::new("d", FieldType::DateTime);
        let mut reader = PacketReader::new(&[4, 0xE8, 0x07, 5, 17]);
        assert_eq!(
            decode_cell(&mut reader, &column, Format::Binary).unwrap(),
            Value::DateTime(DateTime::new(2024, 5, 17, 0, 0, 0))
        );

        let mut reader = PacketReader::new(&[5, 0, 0, 0, 0, 0]);
        assert!(decode_cell(&mut reader, &column, Format::Binary).is_err());

        let time = ColumnDef::new("t", FieldType::Time);
        let mut reader = PacketReader::new(&[9, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert!(decode_cell(&mut reader, &time, Format::Binary).is_err());
    }

    #[test]
    fn test_text_rows_roundtrip() {
        let values = vec![
            Value::Int(42),
            Value::Text("Robot".into()),
            Value::Null,
            Value::Bit(3),
        ];
        let columns: Vec<ColumnDef> = values
            .iter()
            .enumerate()
            .map(|(i, v)| column_for_value(format!("c{i}"), v))
            .collect();
        let bytes = encode_text_row(&values, &columns).unwrap();
        assert_eq!(decode_text_row(&bytes, &columns).unwrap(), values);
    }
}
