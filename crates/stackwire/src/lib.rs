//! Client engine for length-prefixed device protocols over a shared stream.
//!
//! stackwire talks to a chain of addressable peripheral controllers through
//! one TCP connection: framed binary packets, typed payload encoding,
//! sequence-number request/response correlation, callback fan-out and
//! device enumeration.
//!
//! # Crate Structure
//!
//! - [`codec`] — Typed little-endian payload codec and field-spec grammar
//! - [`frame`] — Packet framing and reserved function IDs
//! - [`client`] — Connection engine: lifecycle, request dispatch, callbacks

/// Re-export payload codec types.
pub mod codec {
    pub use stackwire_codec::*;
}

/// Re-export packet framing types.
pub mod frame {
    pub use stackwire_frame::*;
}

/// Re-export connection engine types.
pub mod client {
    pub use stackwire_client::*;
}
