//! Packet framing for the stackwire device protocol.
//!
//! Every message shares an 8-byte little-endian header:
//! - A 4-byte device UID (`0` addresses the root of the stack / broadcast)
//! - A 1-byte total length (header + payload)
//! - A 1-byte function ID
//! - An options byte packing the 4-bit sequence number and the
//!   response-expected flag
//! - A 1-byte result code
//!
//! No partial reads, no buffer management in user code.

pub mod codec;
pub mod error;
pub mod function;
pub mod packet;

pub use codec::{decode_packet, encode_packet, PacketCodec};
pub use error::{FrameError, Result};
pub use packet::{Packet, StatusCode, BROADCAST_UID, HEADER_SIZE, MAX_PACKET_LEN, MAX_SEQUENCE};
