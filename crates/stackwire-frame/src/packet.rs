use bytes::Bytes;

/// Wire header size: uid (4) + length (1) + function ID (1) + options (1) +
/// result code (1).
pub const HEADER_SIZE: usize = 8;

/// Maximum total packet length on the wire.
pub const MAX_PACKET_LEN: usize = 80;

/// UID addressing the root of the device chain; also the broadcast address.
pub const BROADCAST_UID: u32 = 0;

/// Highest sequence number the 4-bit wire field can carry.
/// `0` is reserved to mark unsolicited callbacks.
pub const MAX_SEQUENCE: u8 = 15;

/// Result code a device reports in a response packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok,
    InvalidParameter,
    FunctionNotSupported,
    /// A code this client does not recognize, preserved verbatim.
    Unknown(u8),
}

impl StatusCode {
    pub fn from_wire(raw: u8) -> Self {
        match raw {
            0 => StatusCode::Ok,
            1 => StatusCode::InvalidParameter,
            2 => StatusCode::FunctionNotSupported,
            other => StatusCode::Unknown(other),
        }
    }

    pub fn to_wire(self) -> u8 {
        match self {
            StatusCode::Ok => 0,
            StatusCode::InvalidParameter => 1,
            StatusCode::FunctionNotSupported => 2,
            StatusCode::Unknown(other) => other,
        }
    }

    pub fn is_ok(self) -> bool {
        self == StatusCode::Ok
    }
}

/// One wire message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Address of the logical device this packet concerns.
    pub uid: u32,
    /// Opcode, scoped per device type except for the reserved range.
    pub function_id: u8,
    /// Request/response correlation counter; `0` marks a callback.
    pub sequence_number: u8,
    /// Whether the sender asks the peer to transmit a reply.
    pub response_expected: bool,
    /// Result code; meaningful on responses only.
    pub status: StatusCode,
    /// Opaque body, layout defined by `(device type, function_id)`.
    pub payload: Bytes,
}

impl Packet {
    /// Create an outgoing request packet.
    pub fn request(
        uid: u32,
        function_id: u8,
        sequence_number: u8,
        response_expected: bool,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            uid,
            function_id,
            sequence_number,
            response_expected,
            status: StatusCode::Ok,
            payload: payload.into(),
        }
    }

    /// Create an unsolicited callback packet (sequence number `0`).
    pub fn callback(uid: u32, function_id: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            uid,
            function_id,
            sequence_number: 0,
            response_expected: false,
            status: StatusCode::Ok,
            payload: payload.into(),
        }
    }

    /// Whether this packet is an unsolicited callback rather than a reply.
    pub fn is_callback(&self) -> bool {
        self.sequence_number == 0
    }

    /// The total wire size of this packet (header + payload).
    pub fn wire_len(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_code_roundtrip() {
        for raw in [0u8, 1, 2, 3, 0xFF] {
            assert_eq!(StatusCode::from_wire(raw).to_wire(), raw);
        }
        assert!(StatusCode::Ok.is_ok());
        assert!(!StatusCode::InvalidParameter.is_ok());
        assert_eq!(StatusCode::from_wire(9), StatusCode::Unknown(9));
    }

    #[test]
    fn callback_classification() {
        let callback = Packet::callback(42, 7, Bytes::new());
        assert!(callback.is_callback());

        let request = Packet::request(42, 7, 3, true, Bytes::new());
        assert!(!request.is_callback());
    }

    #[test]
    fn wire_len_includes_header() {
        let packet = Packet::request(1, 2, 3, false, Bytes::from_static(b"wxyz"));
        assert_eq!(packet.wire_len(), HEADER_SIZE + 4);
    }
}
