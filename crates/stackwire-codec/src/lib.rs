//! Typed little-endian payload codec for the stackwire device protocol.
//!
//! Device payloads carry no type tags on the wire; both ends must know the
//! field layout for a given function ID. A [`Format`] compiles that layout
//! once from a compact field-spec string (`"B 3B c 16s"`), rejecting
//! malformed specifiers at that point. [`encode`] and [`decode`] then move
//! typed [`Value`]s to and from little-endian bytes with no padding.

pub mod base58;
pub mod codec;
pub mod error;
pub mod format;
pub mod value;

pub use codec::{decode, encode};
pub use error::{CodecError, Result};
pub use format::{FieldKind, FieldSpec, Format};
pub use value::Value;
