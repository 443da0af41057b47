use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{CodecError, Result};
use crate::format::{FieldKind, FieldSpec, Format};
use crate::value::Value;

/// Encode `values` against `format` into a little-endian payload.
///
/// Fails when the value list does not match the format's arity, when a
/// value's variant does not match its field specifier, or when text does
/// not fit its fixed-width field. Short text is NUL-padded on the wire.
pub fn encode(values: &[Value], format: &Format) -> Result<Bytes> {
    if values.len() != format.len() {
        return Err(CodecError::ArityMismatch {
            expected: format.len(),
            actual: values.len(),
        });
    }

    let mut dst = BytesMut::with_capacity(format.wire_size());
    for (value, spec) in values.iter().zip(format.fields()) {
        encode_field(value, spec, &mut dst)?;
    }
    Ok(dst.freeze())
}

/// Decode a payload against `format` into typed values.
///
/// The buffer must be exactly `format.wire_size()` bytes; anything else is
/// a length-mismatch error, which callers treat as a protocol violation
/// rather than a recoverable condition.
pub fn decode(payload: &[u8], format: &Format) -> Result<Vec<Value>> {
    if payload.len() != format.wire_size() {
        return Err(CodecError::LengthMismatch {
            expected: format.wire_size(),
            actual: payload.len(),
        });
    }

    let mut src = payload;
    format
        .fields()
        .iter()
        .map(|spec| decode_field(spec, &mut src))
        .collect()
}

fn encode_field(value: &Value, spec: &FieldSpec, dst: &mut BytesMut) -> Result<()> {
    match *spec {
        FieldSpec::Scalar(kind) => encode_scalar(value, kind, dst),
        FieldSpec::Array(kind, count) => {
            let Value::Array(items) = value else {
                return Err(CodecError::TypeMismatch {
                    expected: "array",
                    actual: value.type_name(),
                });
            };
            if items.len() != count {
                return Err(CodecError::ArrayLength {
                    expected: count,
                    actual: items.len(),
                });
            }
            for item in items {
                encode_scalar(item, kind, dst)?;
            }
            Ok(())
        }
        FieldSpec::Text(width) => {
            let Value::Text(text) = value else {
                return Err(CodecError::TypeMismatch {
                    expected: "text",
                    actual: value.type_name(),
                });
            };
            if !text.is_ascii() {
                return Err(CodecError::NotAscii);
            }
            if text.len() > width {
                return Err(CodecError::TextTooLong {
                    width,
                    len: text.len(),
                });
            }
            dst.put_slice(text.as_bytes());
            dst.put_bytes(0, width - text.len());
            Ok(())
        }
    }
}

fn encode_scalar(value: &Value, kind: FieldKind, dst: &mut BytesMut) -> Result<()> {
    match (kind, value) {
        (FieldKind::U8, Value::U8(v)) => dst.put_u8(*v),
        (FieldKind::I8, Value::I8(v)) => dst.put_i8(*v),
        (FieldKind::U16, Value::U16(v)) => dst.put_u16_le(*v),
        (FieldKind::I16, Value::I16(v)) => dst.put_i16_le(*v),
        (FieldKind::U32, Value::U32(v)) => dst.put_u32_le(*v),
        (FieldKind::I32, Value::I32(v)) => dst.put_i32_le(*v),
        (FieldKind::U64, Value::U64(v)) => dst.put_u64_le(*v),
        (FieldKind::I64, Value::I64(v)) => dst.put_i64_le(*v),
        (FieldKind::Bool, Value::Bool(v)) => dst.put_u8(u8::from(*v)),
        (FieldKind::Char, Value::Char(v)) => {
            if !v.is_ascii() {
                return Err(CodecError::NotAscii);
            }
            dst.put_u8(*v as u8);
        }
        (kind, value) => {
            return Err(CodecError::TypeMismatch {
                expected: kind.type_name(),
                actual: value.type_name(),
            })
        }
    }
    Ok(())
}

fn decode_field(spec: &FieldSpec, src: &mut &[u8]) -> Result<Value> {
    match *spec {
        FieldSpec::Scalar(kind) => decode_scalar(kind, src),
        FieldSpec::Array(kind, count) => {
            let items = (0..count)
                .map(|_| decode_scalar(kind, src))
                .collect::<Result<Vec<_>>>()?;
            Ok(Value::Array(items))
        }
        FieldSpec::Text(width) => {
            let raw = src[..width].to_vec();
            src.advance(width);
            let end = raw
                .iter()
                .position(|&b| b == 0)
                .unwrap_or(raw.len());
            let text =
                std::str::from_utf8(&raw[..end]).map_err(|_| CodecError::InvalidText)?;
            Ok(Value::Text(text.to_string()))
        }
    }
}

fn decode_scalar(kind: FieldKind, src: &mut &[u8]) -> Result<Value> {
    let value = match kind {
        FieldKind::U8 => Value::U8(src.get_u8()),
        FieldKind::I8 => Value::I8(src.get_i8()),
        FieldKind::U16 => Value::U16(src.get_u16_le()),
        FieldKind::I16 => Value::I16(src.get_i16_le()),
        FieldKind::U32 => Value::U32(src.get_u32_le()),
        FieldKind::I32 => Value::I32(src.get_i32_le()),
        FieldKind::U64 => Value::U64(src.get_u64_le()),
        FieldKind::I64 => Value::I64(src.get_i64_le()),
        FieldKind::Bool => Value::Bool(src.get_u8() != 0),
        FieldKind::Char => {
            let byte = src.get_u8();
            if !byte.is_ascii() {
                return Err(CodecError::NotAscii);
            }
            Value::Char(byte as char)
        }
    };
    Ok(value)
}
