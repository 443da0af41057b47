//! Connection engine for chains of addressable devices sharing one stream.
//!
//! One TCP connection carries traffic for many logical devices. Each device
//! can issue requests that receive correlated replies, and independently
//! receive unsolicited callbacks at any time. The engine owns the stream:
//! a single reader task decodes inbound packets and routes them — replies
//! to the caller waiting on their sequence number, callbacks to the
//! subscriber queues registered for `(uid, function_id)`, announcements to
//! the enumeration queue. Any number of tasks may send concurrently; each
//! packet is written whole and each caller waits only on its own reply.

pub mod connection;
pub mod enumeration;
pub mod error;
pub mod queue;
pub mod router;
mod tracker;

pub use connection::{Connection, ConnectionConfig, ConnectionState, Response};
pub use enumeration::{EnumerateEvent, EnumerationKind};
pub use error::{ConnectError, RequestError};
pub use queue::{EventQueue, OverflowPolicy};
pub use router::CallbackEvent;
