use std::time::Duration;

use stackwire_frame::StatusCode;

/// Errors from establishing a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    /// The transport refused the connection. Reported immediately; the
    /// engine does not retry an initial connect on its own.
    #[error("connection to {host}:{port} failed: {source}")]
    Refused {
        host: String,
        port: u16,
        source: std::io::Error,
    },

    /// `connect` was called while a connection is already up.
    #[error("already connected")]
    AlreadyConnected,
}

/// Errors surfaced to a single `send_request` caller.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// No connection is established.
    #[error("not connected")]
    NotConnected,

    /// No reply arrived within the configured bound. The connection stays
    /// up and the sequence number becomes reusable.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The connection went down while the request was in flight.
    #[error("connection closed")]
    ConnectionClosed,

    /// The sequence counter wrapped into a number still awaiting its reply:
    /// too many requests are in flight for the 4-bit counter.
    #[error("sequence number {0} still awaiting its response")]
    SequenceInUse(u8),

    /// The device answered with a non-ok result code.
    #[error("device {uid} reported {status:?} for function {function_id}")]
    Device {
        uid: u32,
        function_id: u8,
        status: StatusCode,
    },

    /// Packet-level error (oversized payload, transport I/O failure).
    #[error("frame error: {0}")]
    Frame(#[from] stackwire_frame::FrameError),
}

pub type Result<T, E = RequestError> = std::result::Result<T, E>;
