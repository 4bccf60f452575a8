//! Value encoding: prepared-statement parameters, row cells and SQL literals.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

use mywire_core::error::TypeError;
use mywire_core::{Date, DateTime, Error, Result, Time, Value};

use super::{ColumnDef, FieldType, Format, column_flags};
use crate::protocol::{PacketWriter, charset};

/// Wire type and unsigned flag announced for a parameter in COM_STMT_EXECUTE.
pub fn param_type(value: &Value) -> (FieldType, bool) {
    match value {
        Value::Null => (FieldType::Null, false),
        Value::Bool(_) | Value::TinyInt(_) => (FieldType::Tiny, false),
        Value::UnsignedTinyInt(_) => (FieldType::Tiny, true),
        Value::SmallInt(_) => (FieldType::Short, false),
        Value::UnsignedSmallInt(_) => (FieldType::Short, true),
        Value::Int(_) => (FieldType::Long, false),
        Value::UnsignedInt(_) => (FieldType::Long, true),
        Value::BigInt(_) => (FieldType::LongLong, false),
        // Bit fields travel as an unsigned 8-byte integer
        Value::UnsignedBigInt(_) | Value::Bit(_) => (FieldType::LongLong, true),
        Value::Float(_) => (FieldType::Float, false),
        Value::Double(_) => (FieldType::Double, false),
        Value::Decimal(_) => (FieldType::NewDecimal, false),
        Value::Text(_) => (FieldType::VarString, false),
        Value::Bytes(_) => (FieldType::Blob, false),
        Value::Date(_) => (FieldType::Date, false),
        Value::Time(_) => (FieldType::Time, false),
        Value::DateTime(_) => (FieldType::DateTime, false),
        Value::Json(_) => (FieldType::Json, false),
    }
}

/// Encode a parameter value for COM_STMT_EXECUTE.
///
/// NULL writes nothing; it is carried by the parameter null bitmap.
pub fn encode_param(value: &Value, writer: &mut PacketWriter) {
    match value {
        Value::Null => {}
        Value::Bool(b) => writer.write_u8(u8::from(*b)),
        Value::TinyInt(i) => writer.write_u8(*i as u8),
        Value::UnsignedTinyInt(u) => writer.write_u8(*u),
        Value::SmallInt(i) => writer.write_u16_le(*i as u16),
        Value::UnsignedSmallInt(u) => writer.write_u16_le(*u),
        Value::Int(i) => writer.write_u32_le(*i as u32),
        Value::UnsignedInt(u) => writer.write_u32_le(*u),
        Value::BigInt(i) => writer.write_u64_le(*i as u64),
        Value::UnsignedBigInt(u) | Value::Bit(u) => writer.write_u64_le(*u),
        Value::Float(f) => writer.write_bytes(&f.to_le_bytes()),
        Value::Double(f) => writer.write_bytes(&f.to_le_bytes()),
        Value::Decimal(s) | Value::Text(s) => writer.write_lenenc_string(s),
        Value::Bytes(b) => writer.write_lenenc_bytes(b),
        Value::Json(j) => writer.write_lenenc_string(&j.to_string()),
        Value::Date(d) => write_binary_date(writer, d),
        Value::Time(t) => write_binary_time(writer, t),
        Value::DateTime(dt) => write_binary_datetime(writer, dt),
    }
}

/// Binary DATE: length 0 for the zero date, otherwise 4.
fn write_binary_date(writer: &mut PacketWriter, date: &Date) {
    if date.is_zero() {
        writer.write_u8(0);
    } else {
        writer.write_u8(4);
        writer.write_u16_le(date.year);
        writer.write_u8(date.month);
        writer.write_u8(date.day);
    }
}

/// Binary DATETIME: length 0, 4, 7 or 11 depending on which parts are set.
fn write_binary_datetime(writer: &mut PacketWriter, dt: &DateTime) {
    if dt.date().is_zero() && !dt.has_time() {
        writer.write_u8(0);
        return;
    }
    let len = if dt.microsecond != 0 {
        11
    } else if dt.has_time() {
        7
    } else {
        4
    };
    writer.write_u8(len);
    writer.write_u16_le(dt.year);
    writer.write_u8(dt.month);
    writer.write_u8(dt.day);
    if len >= 7 {
        writer.write_u8(dt.hour);
        writer.write_u8(dt.minute);
        writer.write_u8(dt.second);
    }
    if len == 11 {
        writer.write_u32_le(dt.microsecond);
    }
}

/// Binary TIME: length 0, 8 or 12.
fn write_binary_time(writer: &mut PacketWriter, time: &Time) {
    if time.is_zero() {
        writer.write_u8(0);
        return;
    }
    let len = if time.microseconds != 0 { 12 } else { 8 };
    writer.write_u8(len);
    writer.write_u8(u8::from(time.negative));
    writer.write_u32_le(time.days);
    writer.write_u8(time.hours);
    writer.write_u8(time.minutes);
    writer.write_u8(time.seconds);
    if len == 12 {
        writer.write_u32_le(time.microseconds);
    }
}

/// Encode one row cell the way a server sends it.
///
/// This is the inverse of [`decode_cell`](super::decode_cell): text cells are
/// length-encoded strings with NULL as 0xFB; binary cells are typed by the
/// column and NULL writes nothing (the row bitmap carries it).
pub fn encode_cell(
    value: &Value,
    column: &ColumnDef,
    format: Format,
    writer: &mut PacketWriter,
) -> Result<()> {
    match format {
        Format::Text => {
            if value.is_null() {
                writer.write_lenenc_null();
            } else {
                let text = text_cell(value, column)?;
                writer.write_lenenc_bytes(&text);
            }
            Ok(())
        }
        Format::Binary => binary_cell(value, column, writer),
    }
}

fn text_cell(value: &Value, column: &ColumnDef) -> Result<Vec<u8>> {
    Ok(match value {
        Value::Null => Vec::new(),
        Value::Bool(b) => if *b { b"1".to_vec() } else { b"0".to_vec() },
        Value::Bit(bits) if column.read_as_string => bits.to_string().into_bytes(),
        Value::Bit(bits) => bit_bytes(*bits, column)?,
        Value::Bytes(b) => b.clone(),
        Value::Decimal(s) | Value::Text(s) => s.clone().into_bytes(),
        Value::Json(j) => j.to_string().into_bytes(),
        Value::Date(d) => d.to_string().into_bytes(),
        Value::Time(t) => t.to_string().into_bytes(),
        Value::DateTime(dt) => dt.to_string().into_bytes(),
        Value::TinyInt(v) => v.to_string().into_bytes(),
        Value::UnsignedTinyInt(v) => v.to_string().into_bytes(),
        Value::SmallInt(v) => v.to_string().into_bytes(),
        Value::UnsignedSmallInt(v) => v.to_string().into_bytes(),
        Value::Int(v) => v.to_string().into_bytes(),
        Value::UnsignedInt(v) => v.to_string().into_bytes(),
        Value::BigInt(v) => v.to_string().into_bytes(),
        Value::UnsignedBigInt(v) => v.to_string().into_bytes(),
        Value::Float(v) => v.to_string().into_bytes(),
        Value::Double(v) => v.to_string().into_bytes(),
    })
}

fn binary_cell(value: &Value, column: &ColumnDef, writer: &mut PacketWriter) -> Result<()> {
    if value.is_null() {
        return Ok(());
    }
    match column.column_type {
        FieldType::Null => {}
        FieldType::Tiny => writer.write_u8(integer_bits(value, column)? as u8),
        FieldType::Short | FieldType::Year => {
            writer.write_u16_le(integer_bits(value, column)? as u16);
        }
        FieldType::Int24 | FieldType::Long => {
            writer.write_u32_le(integer_bits(value, column)? as u32);
        }
        FieldType::LongLong => writer.write_u64_le(integer_bits(value, column)?),
        FieldType::Float => {
            let v = value.as_f64().ok_or_else(|| mismatch("FLOAT", value, column))?;
            writer.write_bytes(&(v as f32).to_le_bytes());
        }
        FieldType::Double => {
            let v = value.as_f64().ok_or_else(|| mismatch("DOUBLE", value, column))?;
            writer.write_bytes(&v.to_le_bytes());
        }
        FieldType::Date | FieldType::NewDate => {
            let dt = value.as_datetime().ok_or_else(|| mismatch("DATE", value, column))?;
            write_binary_date(writer, &dt.date());
        }
        FieldType::DateTime
        | FieldType::Timestamp
        | FieldType::DateTime2
        | FieldType::Timestamp2 => {
            let dt = value
                .as_datetime()
                .ok_or_else(|| mismatch("DATETIME", value, column))?;
            write_binary_datetime(writer, &dt);
        }
        FieldType::Time | FieldType::Time2 => match value {
            Value::Time(t) => write_binary_time(writer, t),
            other => return Err(mismatch("TIME", other, column)),
        },
        FieldType::Bit => {
            let bits = value.as_u64().ok_or_else(|| mismatch("BIT", value, column))?;
            if column.read_as_string {
                writer.write_lenenc_string(&bits.to_string());
            } else {
                writer.write_lenenc_bytes(&bit_bytes(bits, column)?);
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
        | FieldType::Json => writer.write_lenenc_bytes(&text_cell(value, column)?),
    }
    Ok(())
}

/// Two's-complement bits of an integer value, for fixed-width binary cells.
fn integer_bits(value: &Value, column: &ColumnDef) -> Result<u64> {
    match value {
        Value::UnsignedBigInt(u) | Value::Bit(u) => Ok(*u),
        other => other
            .as_i64()
            .map(|v| v as u64)
            .ok_or_else(|| mismatch(column.column_type.name(), other, column)),
    }
}

/// Right-aligned big-endian bytes of a bit field at the column's width.
fn bit_bytes(bits: u64, column: &ColumnDef) -> Result<Vec<u8>> {
    let width = column.bit_width()?;
    if width < 8 && bits >> (width * 8) != 0 {
        return Err(Error::Type(TypeError {
            expected: "BIT value within the declared width",
            actual: format!("{} does not fit in {} bytes", bits, width),
            column: Some(column.name.clone()),
        }));
    }
    Ok(bits.to_be_bytes()[8 - width..].to_vec())
}

fn mismatch(expected: &'static str, value: &Value, column: &ColumnDef) -> Error {
    Error::Type(TypeError {
        expected,
        actual: value.type_name().to_string(),
        column: Some(column.name.clone()),
    })
}

/// Encode a text-protocol row.
pub fn encode_text_row(values: &[Value], columns: &[ColumnDef]) -> Result<Vec<u8>> {
    check_arity(values, columns)?;
    let mut writer = PacketWriter::new();
    for (value, column) in values.iter().zip(columns) {
        encode_cell(value, column, Format::Text, &mut writer)?;
    }
    Ok(writer.into_bytes())
}

/// Encode a binary-protocol row: 0x00 header, null bitmap at bit offset 2,
/// then every non-NULL cell.
pub fn encode_binary_row(values: &[Value], columns: &[ColumnDef]) -> Result<Vec<u8>> {
    check_arity(values, columns)?;
    let mut writer = PacketWriter::new();
    writer.write_u8(0x00);
    let mut bitmap = vec![0u8; (columns.len() + 7 + 2) / 8];
    for (i, value) in values.iter().enumerate() {
        if value.is_null() {
            let bit = i + 2;
            bitmap[bit / 8] |= 1 << (bit % 8);
        }
    }
    writer.write_bytes(&bitmap);
    for (value, column) in values.iter().zip(columns) {
        encode_cell(value, column, Format::Binary, &mut writer)?;
    }
    Ok(writer.into_bytes())
}

fn check_arity(values: &[Value], columns: &[ColumnDef]) -> Result<()> {
    if values.len() == columns.len() {
        Ok(())
    } else {
        Err(Error::usage(format!(
            "row has {} values for {} columns",
            values.len(),
            columns.len()
        )))
    }
}

/// A column definition that decodes back to the same `Value` variant.
pub fn column_for_value(name: impl Into<String>, value: &Value) -> ColumnDef {
    let unsigned = column_flags::UNSIGNED;
    let (column_type, length, flags) = match value {
        Value::Null => (FieldType::Null, 0, 0),
        Value::Bool(_) => (FieldType::Tiny, 1, 0),
        Value::TinyInt(_) => (FieldType::Tiny, 4, 0),
        Value::UnsignedTinyInt(_) => (FieldType::Tiny, 3, unsigned),
        Value::SmallInt(_) => (FieldType::Short, 6, 0),
        Value::UnsignedSmallInt(_) => (FieldType::Short, 5, unsigned),
        Value::Int(_) => (FieldType::Long, 11, 0),
        Value::UnsignedInt(_) => (FieldType::Long, 10, unsigned),
        Value::BigInt(_) => (FieldType::LongLong, 20, 0),
        Value::UnsignedBigInt(_) => (FieldType::LongLong, 20, unsigned),
        Value::Float(_) => (FieldType::Float, 12, 0),
        Value::Double(_) => (FieldType::Double, 22, 0),
        Value::Decimal(_) => (FieldType::NewDecimal, 66, 0),
        Value::Text(_) => (FieldType::VarString, 1020, 0),
        Value::Bytes(_) => (
            FieldType::Blob,
            65535,
            column_flags::BLOB | column_flags::BINARY,
        ),
        Value::Date(_) => (FieldType::Date, 10, 0),
        Value::Time(_) => (FieldType::Time, 10, 0),
        Value::DateTime(_) => (FieldType::DateTime, 26, 0),
        Value::Bit(_) => (FieldType::Bit, 64, unsigned),
        Value::Json(_) => (FieldType::Json, 0xFFFF_FFFF, column_flags::BLOB),
    };
    let mut column = ColumnDef::new(name, column_type)
        .with_length(length)
        .with_flags(flags);
    if matches!(value, Value::Json(_)) {
        column.charset = u16::from(charset::DEFAULT_CHARSET);
    }
    column.tiny_as_bool = matches!(value, Value::Bool(_));
    column
}

/// Quote and escape a string literal.
///
/// With NO_BACKSLASH_ESCAPES active the server treats backslash literally,
/// so only quotes are doubled.
fn escape_string(s: &str, no_backslash_escapes: bool) -> String {
    let mut result = String::with_capacity(s.len() + 2);
    result.push('\'');
    for ch in s.chars() {
        match ch {
            '\'' => result.push_str("''"),
            _ if no_backslash_escapes => result.push(ch),
            '\\' => result.push_str("\\\\"),
            '\0' => result.push_str("\\0"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\x1a' => result.push_str("\\Z"), // Ctrl+Z
            _ => result.push(ch),
        }
    }
    result.push('\'');
    result
}

fn escape_bytes(data: &[u8]) -> String {
    let mut result = String::with_capacity(data.len() * 2 + 3);
    result.push_str("X'");
    for byte in data {
        result.push_str(&format!("{byte:02X}"));
    }
    result.push('\'');
    result
}

/// `[+-]digits[.digits][(e|E)[+-]digits]`, with digits required on at least
/// one side of the point. Anything else is quoted.
fn is_numeric_literal(s: &str) -> bool {
    fn digits(s: &[u8]) -> usize {
        s.iter().take_while(|b| b.is_ascii_digit()).count()
    }

    let bytes = s.as_bytes();
    let mut pos = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));
    let int_digits = digits(&bytes[pos..]);
    pos += int_digits;
    let mut frac_digits = 0;
    if bytes.get(pos) == Some(&b'.') {
        pos += 1;
        frac_digits = digits(&bytes[pos..]);
        pos += frac_digits;
    }
    if int_digits + frac_digits == 0 {
        return false;
    }
    if matches!(bytes.get(pos), Some(b'e' | b'E')) {
        pos += 1;
        pos += usize::from(matches!(bytes.get(pos), Some(b'+' | b'-')));
        let exp_digits = digits(&bytes[pos..]);
        if exp_digits == 0 {
            return false;
        }
        pos += exp_digits;
    }
    pos == bytes.len()
}

fn format_float(f: f64) -> String {
    if f.is_nan() {
        "NULL".to_string()
    } else if f.is_infinite() {
        if f.is_sign_positive() {
            "1e308".to_string()
        } else {
            "-1e308".to_string()
        }
    } else {
        f.to_string()
    }
}

/// Render a value as a SQL literal for the text protocol.
pub fn format_value_for_sql(value: &Value, no_backslash_escapes: bool) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Value::TinyInt(i) => i.to_string(),
        Value::UnsignedTinyInt(u) => u.to_string(),
        Value::SmallInt(i) => i.to_string(),
        Value::UnsignedSmallInt(u) => u.to_string(),
        Value::Int(i) => i.to_string(),
        Value::UnsignedInt(u) => u.to_string(),
        Value::BigInt(i) => i.to_string(),
        Value::UnsignedBigInt(u) => u.to_string(),
        // Bit fields are written as their decimal value
        Value::Bit(u) => u.to_string(),
        Value::Float(f) => format_float(f64::from(*f)),
        Value::Double(f) => format_float(*f),
        Value::Decimal(s) if is_numeric_literal(s) => s.clone(),
        Value::Decimal(s) => escape_string(s, no_backslash_escapes),
        Value::Text(s) => escape_string(s, no_backslash_escapes),
        Value::Bytes(b) => escape_bytes(b),
        Value::Json(j) => escape_string(&j.to_string(), no_backslash_escapes),
        Value::Date(d) => format!("'{}'", d),
        Value::Time(t) => format!("'{}'", t),
        Value::DateTime(dt) => format!("'{}'", dt),
    }
}

/// Substitute `?` and `$N` placeholders with SQL literals.
///
/// Placeholders inside quoted strings, quoted identifiers and comments are
/// left alone. Every parameter must be referenced: a `?` without a matching
/// parameter, a `$N` out of range, or an unused parameter is a usage error.
pub fn interpolate_params(
    sql: &str,
    params: &[Value],
    no_backslash_escapes: bool,
) -> Result<String> {
    if params.is_empty() {
        return Ok(sql.to_string());
    }

    let mut result = String::with_capacity(sql.len() + params.len() * 20);
    let mut chars = sql.chars().peekable();
    let mut param_index = 0;
    let mut highest_numbered = 0;

    while let Some(ch) = chars.next() {
        match ch {
            // MySQL-style ? placeholder
            '?' => {
                let value = params.get(param_index).ok_or_else(|| {
                    Error::usage(format!(
                        "statement has more placeholders than the {} parameters supplied",
                        params.len()
                    ))
                })?;
                result.push_str(&format_value_for_sql(value, no_backslash_escapes));
                param_index += 1;
            }
            // PostgreSQL-style $N placeholder
            '$' if chars.peek().is_some_and(char::is_ascii_digit) => {
                let mut num_str = String::new();
                while let Some(&digit) = chars.peek() {
                    if !digit.is_ascii_digit() {
                        break;
                    }
                    num_str.push(digit);
                    chars.next();
                }
                let n: usize = num_str.parse().unwrap_or(0);
                if n == 0 || n > params.len() {
                    return Err(Error::usage(format!(
                        "placeholder ${} is out of range for {} parameters",
                        num_str,
                        params.len()
                    )));
                }
                result.push_str(&format_value_for_sql(&params[n - 1], no_backslash_escapes));
                highest_numbered = highest_numbered.max(n);
            }
            // Quoted strings and identifiers are copied verbatim
            '\'' | '"' | '`' => {
                result.push(ch);
                while let Some(next_ch) = chars.next() {
                    result.push(next_ch);
                    if next_ch == '\\' && ch != '`' && !no_backslash_escapes {
                        if let Some(escaped) = chars.next() {
                            result.push(escaped);
                        }
                    } else if next_ch == ch {
                        // A doubled quote stays inside the literal
                        if chars.peek() == Some(&ch) {
                            chars.next();
                            result.push(ch);
                        } else {
                            break;
                        }
                    }
                }
            }
            '#' => copy_line_comment(&mut chars, &mut result, ch),
            '-' if chars.peek() == Some(&'-') => copy_line_comment(&mut chars, &mut result, ch),
            '/' if chars.peek() == Some(&'*') => {
                result.push(ch);
                let mut prev = '\0';
                for next_ch in chars.by_ref() {
                    result.push(next_ch);
                    if prev == '*' && next_ch == '/' {
                        break;
                    }
                    prev = next_ch;
                }
            }
            _ => result.push(ch),
        }
    }

    let used = param_index.max(highest_numbered);
    if used != params.len() {
        return Err(Error::usage(format!(
            "{} parameters supplied but the statement references {}",
            params.len(),
            used
        )));
    }
    Ok(result)
}

fn copy_line_comment(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    result: &mut String,
    first: char,
) {
    result.push(first);
    for next_ch in chars.by_ref() {
        result.push(next_ch);
        if next_ch == '\n' {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_types() {
        assert_eq!(param_type(&Value::Int(42)), (FieldType::Long, false));
        assert_eq!(param_type(&Value::UnsignedInt(42)), (FieldType::Long, true));
        assert_eq!(param_type(&Value::Bit(5)), (FieldType::LongLong, true));
        assert_eq!(param_type(&Value::Null), (FieldType::Null, false));
        assert_eq!(
            param_type(&Value::Text("x".into())),
            (FieldType::VarString, false)
        );
    }

    #[test]
    fn test_bit_param_is_eight_bytes_le() {
        let mut writer = PacketWriter::new();
        encode_param(&Value::Bit(0x0102), &mut writer);
        assert_eq!(writer.as_bytes(), &[0x02, 0x01, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_encode_param_integers() {
        let mut writer = PacketWriter::new();
        encode_param(&Value::Int(42), &mut writer);
        encode_param(&Value::SmallInt(-1), &mut writer);
        encode_param(&Value::Bool(true), &mut writer);
        encode_param(&Value::Null, &mut writer);
        assert_eq!(writer.as_bytes(), &[42, 0, 0, 0, 0xFF, 0xFF, 1]);
    }

    #[test]
    fn test_encode_param_temporal() {
        let mut writer = PacketWriter::new();
        encode_param(&Value::Date(Date::new(2024, 2, 29)), &mut writer);
        assert_eq!(writer.as_bytes(), &[4, 0xE8, 0x07, 2, 29]);

        let mut writer = PacketWriter::new();
        encode_param(&Value::DateTime(DateTime::ZERO), &mut writer);
        assert_eq!(writer.as_bytes(), &[0]);

        let mut writer = PacketWriter::new();
        let dt = DateTime::new(2024, 1, 2, 3, 4, 5).with_microsecond(6);
        encode_param(&Value::DateTime(dt), &mut writer);
        assert_eq!(writer.as_bytes()[0], 11);
        assert_eq!(writer.len(), 12);

        let mut writer = PacketWriter::new();
        let t = Time::parse("-26:00:01").unwrap();
        encode_param(&Value::Time(t), &mut writer);
        assert_eq!(writer.as_bytes(), &[8, 1, 1, 0, 0, 0, 2, 0, 1]);
    }

    #[test]
    fn test_bit_text_cell_decimal_and_raw() {
        let mut col = ColumnDef::new("flags", FieldType::Bit).with_length(12);
        let mut writer = PacketWriter::new();
        encode_cell(&Value::Bit(0x0A0B), &col, Format::Text, &mut writer).unwrap();
        assert_eq!(writer.as_bytes(), &[2, 0x0A, 0x0B]);

        col.read_as_string = true;
        let mut writer = PacketWriter::new();
        encode_cell(&Value::Bit(2571), &col, Format::Text, &mut writer).unwrap();
        assert_eq!(writer.as_bytes(), b"\x042571");
    }

    #[test]
    fn test_bit_value_wider_than_column() {
        let col = ColumnDef::new("b", FieldType::Bit).with_length(8);
        let mut writer = PacketWriter::new();
        let err = encode_cell(&Value::Bit(0x100), &col, Format::Binary, &mut writer).unwrap_err();
        assert!(matches!(err, Error::Type(_)));
    }

    #[test]
    fn test_binary_row_null_bitmap() {
        let columns = vec![
            ColumnDef::new("a", FieldType::Long),
            ColumnDef::new("b", FieldType::VarString),
        ];
        let row = encode_binary_row(&[Value::Int(7), Value::Null], &columns).unwrap();
        // header, bitmap with bit 3 set, 4-byte int
        assert_eq!(row, vec![0x00, 0b0000_1000, 7, 0, 0, 0]);
    }

    #[test]
    fn test_text_row() {
        let columns = vec![
            ColumnDef::new("n", FieldType::LongLong),
            ColumnDef::new("s", FieldType::VarString),
        ];
        let row = encode_text_row(&[Value::BigInt(3), Value::Null], &columns).unwrap();
        assert_eq!(row, b"\x013\xFB".to_vec());
        assert!(encode_text_row(&[Value::Null], &columns).is_err());
    }

    #[test]
    fn test_format_value_for_sql() {
        assert_eq!(format_value_for_sql(&Value::Null, false), "NULL");
        assert_eq!(format_value_for_sql(&Value::Bit(5), false), "5");
        assert_eq!(format_value_for_sql(&Value::Bool(true), false), "TRUE");
        assert_eq!(
            format_value_for_sql(&Value::Bytes(vec![0xDE, 0xAD]), false),
            "X'DEAD'"
        );
        assert_eq!(
            format_value_for_sql(&Value::Date(Date::new(2024, 3, 1)), false),
            "'2024-03-01'"
        );
        assert_eq!(format_value_for_sql(&Value::Double(f64::NAN), false), "NULL");
        assert_eq!(
            format_value_for_sql(&Value::Decimal("1; DROP".into()), false),
            "'1; DROP'"
        );
    }

    #[test]
    fn test_decimal_literals_follow_numeric_grammar() {
        for literal in ["0", "-12.50", "+3", ".5", "7.", "1e10", "-2.5E-3"] {
            assert_eq!(
                format_value_for_sql(&Value::Decimal(literal.into()), false),
                literal
            );
        }
        for quoted in ["--1", "1e", "e5", "-", ".", "1.2.3", "1-2", "+-1", "1e+"] {
            assert_eq!(
                format_value_for_sql(&Value::Decimal(quoted.into()), false),
                format!("'{}'", quoted)
            );
        }
        let sql = interpolate_params("SELECT ? FROM toys", &[Value::Decimal("--1".into())], false)
            .unwrap();
        assert_eq!(sql, "SELECT '--1' FROM toys");
    }

    #[test]
    fn test_escape_modes() {
        let v = Value::Text("it's a\\b\n".to_string());
        assert_eq!(format_value_for_sql(&v, false), "'it''s a\\\\b\\n'");
        assert_eq!(format_value_for_sql(&v, true), "'it''s a\\b\n'");
    }

    #[test]
    fn test_interpolate_params() {
        let sql = "SELECT * FROM toys WHERE id = ? AND name = ?";
        let params = vec![Value::Int(1), Value::Text("Robot".to_string())];
        assert_eq!(
            interpolate_params(sql, &params, false).unwrap(),
            "SELECT * FROM toys WHERE id = 1 AND name = 'Robot'"
        );
    }

    #[test]
    fn test_interpolate_params_dollar() {
        let sql = "SELECT * FROM toys WHERE id = $1 OR parent = $1 AND name = $2";
        let params = vec![Value::Int(1), Value::Text("Robot".to_string())];
        assert_eq!(
            interpolate_params(sql, &params, false).unwrap(),
            "SELECT * FROM toys WHERE id = 1 OR parent = 1 AND name = 'Robot'"
        );
    }

    #[test]
    fn test_interpolate_skips_quotes_and_comments() {
        let sql = "SELECT '?', \"$1\", `a?`, 'it\\'s ?' -- why?\n, ? /* ? */";
        let params = vec![Value::Int(42)];
        assert_eq!(
            interpolate_params(sql, &params, false).unwrap(),
            "SELECT '?', \"$1\", `a?`, 'it\\'s ?' -- why?\n, 42 /* ? */"
        );
    }

    #[test]
    fn test_interpolate_count_mismatch() {
        let err = interpolate_params("SELECT ?, ?", &[Value::Int(1)], false).unwrap_err();
        assert!(matches!(err, Error::Usage(_)));
        let err = interpolate_params("SELECT ?", &[Value::Int(1), Value::Int(2)], false)
            .unwrap_err();
        assert!(matches!(err, Error::Usage(_)));
        let err = interpolate_params("SELECT $3", &[Value::Int(1)], false).unwrap_err();
        assert!(matches!(err, Error::Usage(_)));
    }

    #[test]
    fn test_interpolate_without_params_is_verbatim() {
        assert_eq!(
            interpolate_params("SELECT '?' , $1", &[], false).unwrap(),
            "SELECT '?' , $1"
        );
    }
}
