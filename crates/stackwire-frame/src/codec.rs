use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{FrameError, Result};
use crate::packet::{Packet, StatusCode, HEADER_SIZE, MAX_PACKET_LEN, MAX_SEQUENCE};

/// Encode a packet into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────┬─────────┬──────────┬──────────────────┬─────────┬──────────┐
/// │ UID      │ Length  │ Function │ Options          │ Status  │ Payload  │
/// │ (4B LE)  │ (1B)    │ (1B)     │ seq<<4 | re<<3   │ (1B)    │          │
/// └──────────┴─────────┴──────────┴──────────────────┴─────────┴──────────┘
/// ```
pub fn encode_packet(packet: &Packet, dst: &mut BytesMut) -> Result<()> {
    let total = HEADER_SIZE + packet.payload.len();
    if total > MAX_PACKET_LEN {
        return Err(FrameError::PayloadTooLarge {
            size: packet.payload.len(),
            max: MAX_PACKET_LEN - HEADER_SIZE,
        });
    }
    if packet.sequence_number > MAX_SEQUENCE {
        return Err(FrameError::InvalidSequence(packet.sequence_number));
    }

    dst.reserve(total);
    dst.put_u32_le(packet.uid);
    dst.put_u8(total as u8);
    dst.put_u8(packet.function_id);
    dst.put_u8(packet.sequence_number << 4 | u8::from(packet.response_expected) << 3);
    dst.put_u8(packet.status.to_wire());
    dst.put_slice(&packet.payload);
    Ok(())
}

/// Decode a packet from a buffer of accumulated reads.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete packet yet.
/// On success, consumes the packet bytes from the buffer; callers should
/// keep calling until `None` since one read may carry several packets.
pub fn decode_packet(src: &mut BytesMut) -> Result<Option<Packet>> {
    if src.len() < HEADER_SIZE {
        return Ok(None); // Need more data
    }

    let length = src[4] as usize;
    if !(HEADER_SIZE..=MAX_PACKET_LEN).contains(&length) {
        return Err(FrameError::InvalidLength(length));
    }
    if src.len() < length {
        return Ok(None); // Need more data
    }

    let uid = u32::from_le_bytes(src[0..4].try_into().unwrap());
    let function_id = src[5];
    let options = src[6];
    let status = StatusCode::from_wire(src[7]);

    src.advance(HEADER_SIZE);
    let payload = src.split_to(length - HEADER_SIZE).freeze();

    Ok(Some(Packet {
        uid,
        function_id,
        sequence_number: options >> 4,
        response_expected: options >> 3 & 1 == 1,
        status,
        payload,
    }))
}

/// `tokio_util` codec over the packet wire format.
#[derive(Debug, Clone, Copy, Default)]
pub struct PacketCodec;

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>> {
        decode_packet(src)
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = FrameError;

    fn encode(&mut self, packet: Packet, dst: &mut BytesMut) -> Result<()> {
        encode_packet(&packet, dst)
    }
}
