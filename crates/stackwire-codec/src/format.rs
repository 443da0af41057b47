use std::str::FromStr;

use crate::error::{CodecError, Result};

/// Scalar kinds the wire grammar can express.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    Bool,
    Char,
}

impl FieldKind {
    /// Bytes this kind occupies on the wire.
    pub const fn width(self) -> usize {
        match self {
            FieldKind::U8 | FieldKind::I8 | FieldKind::Bool | FieldKind::Char => 1,
            FieldKind::U16 | FieldKind::I16 => 2,
            FieldKind::U32 | FieldKind::I32 => 4,
            FieldKind::U64 | FieldKind::I64 => 8,
        }
    }

    pub(crate) fn from_specifier(specifier: char) -> Option<Self> {
        match specifier {
            'B' => Some(FieldKind::U8),
            'b' => Some(FieldKind::I8),
            'H' => Some(FieldKind::U16),
            'h' => Some(FieldKind::I16),
            'I' => Some(FieldKind::U32),
            'i' => Some(FieldKind::I32),
            'Q' => Some(FieldKind::U64),
            'q' => Some(FieldKind::I64),
            '!' => Some(FieldKind::Bool),
            'c' => Some(FieldKind::Char),
            _ => None,
        }
    }

    pub(crate) const fn type_name(self) -> &'static str {
        match self {
            FieldKind::U8 => "u8",
            FieldKind::I8 => "i8",
            FieldKind::U16 => "u16",
            FieldKind::I16 => "i16",
            FieldKind::U32 => "u32",
            FieldKind::I32 => "i32",
            FieldKind::U64 => "u64",
            FieldKind::I64 => "i64",
            FieldKind::Bool => "bool",
            FieldKind::Char => "char",
        }
    }
}

/// One field of a payload layout: a scalar, a fixed-length array, or
/// fixed-width text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSpec {
    Scalar(FieldKind),
    Array(FieldKind, usize),
    Text(usize),
}

impl FieldSpec {
    /// Bytes this field occupies on the wire.
    pub fn wire_size(&self) -> usize {
        match *self {
            FieldSpec::Scalar(kind) => kind.width(),
            FieldSpec::Array(kind, count) => kind.width() * count,
            FieldSpec::Text(width) => width,
        }
    }

    fn parse_token(token: &str) -> Result<Self> {
        let split = token
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| CodecError::MalformedToken(token.to_string()))?;
        let (count, specifier) = token.split_at(split);

        let mut chars = specifier.chars();
        let specifier = match (chars.next(), chars.next()) {
            (Some(c), None) => c,
            _ => return Err(CodecError::MalformedToken(token.to_string())),
        };

        let count = if count.is_empty() {
            None
        } else {
            let count = count
                .parse::<usize>()
                .map_err(|_| CodecError::InvalidCount(token.to_string()))?;
            if count == 0 {
                return Err(CodecError::InvalidCount(token.to_string()));
            }
            Some(count)
        };

        if specifier == 's' {
            let width = count.ok_or_else(|| CodecError::InvalidCount(token.to_string()))?;
            return Ok(FieldSpec::Text(width));
        }

        let kind =
            FieldKind::from_specifier(specifier).ok_or(CodecError::UnknownSpecifier(specifier))?;
        match count {
            None | Some(1) => Ok(FieldSpec::Scalar(kind)),
            Some(count) => Ok(FieldSpec::Array(kind, count)),
        }
    }
}

/// A compiled payload layout.
///
/// Wire format:
/// ```text
/// "I ! c 3B 16s"  →  u32, bool, char, [u8; 3], 16 bytes of text
/// ```
/// All fields little-endian, no padding. An empty format describes an empty
/// payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Format {
    fields: Vec<FieldSpec>,
    wire_size: usize,
}

impl Format {
    /// Build a format from already-validated field specifiers.
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        let wire_size = fields.iter().map(FieldSpec::wire_size).sum();
        Self { fields, wire_size }
    }

    /// Compile a field-spec string.
    ///
    /// Fields are whitespace-separated `[count]specifier` tokens: `b`/`B`
    /// (i8/u8), `h`/`H`, `i`/`I`, `q`/`Q`, `!` (bool), `c` (ASCII char) and
    /// `s` (fixed text, count mandatory). A count prefix on any other
    /// specifier denotes a fixed-length array.
    pub fn parse(spec: &str) -> Result<Self> {
        let fields = spec
            .split_whitespace()
            .map(FieldSpec::parse_token)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(fields))
    }

    /// The ordered field specifiers.
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Exact byte length a payload of this format occupies.
    pub fn wire_size(&self) -> usize {
        self.wire_size
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromStr for Format {
    type Err = CodecError;

    fn from_str(spec: &str) -> Result<Self> {
        Format::parse(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_scalars() {
        let format = Format::parse("B b H h I i Q q ! c").unwrap();
        assert_eq!(format.len(), 10);
        assert_eq!(format.wire_size(), 1 + 1 + 2 + 2 + 4 + 4 + 8 + 8 + 1 + 1);
    }

    #[test]
    fn parse_arrays_and_text() {
        let format = Format::parse("3B 2i 4! 8s").unwrap();
        assert_eq!(
            format.fields(),
            &[
                FieldSpec::Array(FieldKind::U8, 3),
                FieldSpec::Array(FieldKind::I32, 2),
                FieldSpec::Array(FieldKind::Bool, 4),
                FieldSpec::Text(8),
            ]
        );
        assert_eq!(format.wire_size(), 3 + 8 + 4 + 8);
    }

    #[test]
    fn count_of_one_is_a_scalar() {
        let format = Format::parse("1B").unwrap();
        assert_eq!(format.fields(), &[FieldSpec::Scalar(FieldKind::U8)]);
    }

    #[test]
    fn empty_format_is_valid() {
        let format = Format::parse("").unwrap();
        assert!(format.is_empty());
        assert_eq!(format.wire_size(), 0);
    }

    #[test]
    fn unknown_specifier_rejected() {
        assert!(matches!(
            Format::parse("B x"),
            Err(CodecError::UnknownSpecifier('x'))
        ));
    }

    #[test]
    fn zero_count_rejected() {
        assert!(matches!(
            Format::parse("0B"),
            Err(CodecError::InvalidCount(_))
        ));
    }

    #[test]
    fn text_requires_width() {
        assert!(matches!(
            Format::parse("s"),
            Err(CodecError::InvalidCount(_))
        ));
    }

    #[test]
    fn bare_count_rejected() {
        assert!(matches!(
            Format::parse("3"),
            Err(CodecError::MalformedToken(_))
        ));
    }

    #[test]
    fn multi_char_token_rejected() {
        assert!(matches!(
            Format::parse("Bx"),
            Err(CodecError::MalformedToken(_))
        ));
    }

    #[test]
    fn from_str_roundtrip() {
        let format: Format = "8s 8s c 3B 3B H B".parse().unwrap();
        assert_eq!(format.wire_size(), 8 + 8 + 1 + 3 + 3 + 2 + 1);
    }
}
