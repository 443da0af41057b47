/// Errors that can occur while compiling formats or moving payloads.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The format string contains a specifier the grammar does not know.
    #[error("unknown field specifier {0:?}")]
    UnknownSpecifier(char),

    /// A field token carries a zero or unparseable count prefix.
    #[error("invalid field count in {0:?}")]
    InvalidCount(String),

    /// A field token is not `[count]specifier`.
    #[error("malformed field token {0:?}")]
    MalformedToken(String),

    /// The buffer size does not match the format's computed wire size.
    #[error("payload length mismatch: format is {expected} bytes, buffer is {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// The number of values does not match the number of fields.
    #[error("field count mismatch: format has {expected} fields, got {actual}")]
    ArityMismatch { expected: usize, actual: usize },

    /// A value's variant does not match its field specifier.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    /// An array value has the wrong number of elements.
    #[error("array length mismatch: expected {expected} elements, got {actual}")]
    ArrayLength { expected: usize, actual: usize },

    /// A text value does not fit its fixed-width field.
    #[error("text of {len} bytes overflows a {width}-byte field")]
    TextTooLong { width: usize, len: usize },

    /// A character or text value is outside the ASCII range.
    #[error("value is not ascii")]
    NotAscii,

    /// A decoded text field is not valid UTF-8.
    #[error("text field is not valid UTF-8")]
    InvalidText,

    /// A base58 string contains a character outside the alphabet.
    #[error("invalid base58 digit {0:?}")]
    InvalidBase58(char),

    /// A base58 value does not fit the target integer width.
    #[error("base58 value does not fit the target width")]
    Base58Overflow,
}

pub type Result<T> = std::result::Result<T, CodecError>;
