/// Errors that can occur during packet encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The header declares a length below the header size or above the
    /// protocol maximum. The stream is desynchronized and must be closed.
    #[error("invalid packet length {0} (header is 8 bytes, max 80)")]
    InvalidLength(usize),

    /// The payload exceeds what the 1-byte length field can carry.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The sequence number does not fit the 4-bit wire field.
    #[error("sequence number {0} does not fit in four bits")]
    InvalidSequence(u8),

    /// An I/O error occurred while reading or writing packets.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete packet was received.
    #[error("connection closed (incomplete packet)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
