//! Connection lifecycle, request dispatch and the read loop.

use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::codec::Decoder;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use stackwire_codec::{CodecError, Format};
use stackwire_frame::{
    encode_packet, function, FrameError, Packet, PacketCodec, StatusCode, BROADCAST_UID,
    MAX_PACKET_LEN,
};

use crate::enumeration::EnumerateEvent;
use crate::error::{ConnectError, RequestError};
use crate::queue::{EventQueue, OverflowPolicy};
use crate::router::{CallbackEvent, CallbackRouter};
use crate::tracker::RequestTracker;

/// Lifecycle of the underlying stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
    /// The stream failed unexpectedly and the engine is re-establishing it.
    AutoReconnecting,
}

/// Tunables for a connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// How long a caller waits for its reply.
    pub request_timeout: Duration,
    /// Re-establish the stream after an unexpected error. Failed in-flight
    /// requests are reported to their callers, never resent; subscriptions
    /// survive the reconnect.
    pub auto_reconnect: bool,
    /// Pause between reconnect attempts.
    pub reconnect_delay: Duration,
    /// Capacity of the enumeration event queue.
    pub enumeration_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_millis(2500),
            auto_reconnect: false,
            reconnect_delay: Duration::from_secs(1),
            enumeration_capacity: 20,
        }
    }
}

/// A successful reply to a request.
#[derive(Debug, Clone)]
pub struct Response {
    pub uid: u32,
    pub function_id: u8,
    pub status: StatusCode,
    pub payload: Bytes,
}

impl From<Packet> for Response {
    fn from(packet: Packet) -> Self {
        Self {
            uid: packet.uid,
            function_id: packet.function_id,
            status: packet.status,
            payload: packet.payload,
        }
    }
}

/// Client endpoint of one stream shared by every logical device on a chain.
///
/// Cloning is cheap; clones share the connection. Any number of tasks may
/// issue requests concurrently — each packet is written whole, and each
/// caller suspends only on its own reply.
#[derive(Debug, Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    config: ConnectionConfig,
    state: Mutex<ConnectionState>,
    writer: Mutex<Option<OwnedWriteHalf>>,
    tracker: RequestTracker,
    router: CallbackRouter,
    enumeration: EventQueue<EnumerateEvent>,
    enumerate_format: Format,
    lifecycle: Mutex<Lifecycle>,
}

#[derive(Debug)]
struct Lifecycle {
    token: CancellationToken,
    read_task: Option<JoinHandle<()>>,
    endpoint: Option<(String, u16)>,
}

impl Connection {
    pub fn new(config: ConnectionConfig) -> Self {
        let enumeration = EventQueue::new(config.enumeration_capacity, OverflowPolicy::DropOldest);
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(ConnectionState::Disconnected),
                writer: Mutex::new(None),
                tracker: RequestTracker::new(),
                router: CallbackRouter::new(),
                enumeration,
                enumerate_format: EnumerateEvent::wire_format(),
                lifecycle: Mutex::new(Lifecycle {
                    token: CancellationToken::new(),
                    read_task: None,
                    endpoint: None,
                }),
            }),
        }
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> ConnectionState {
        *self.inner.state.lock().await
    }

    pub async fn is_connected(&self) -> bool {
        self.state().await == ConnectionState::Connected
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    /// Establish the stream and start the read loop.
    pub async fn connect(&self, host: &str, port: u16) -> Result<(), ConnectError> {
        {
            let mut state = self.inner.state.lock().await;
            if *state != ConnectionState::Disconnected {
                return Err(ConnectError::AlreadyConnected);
            }
            *state = ConnectionState::Connecting;
        }

        let stream = match TcpStream::connect((host, port)).await {
            Ok(stream) => stream,
            Err(source) => {
                *self.inner.state.lock().await = ConnectionState::Disconnected;
                return Err(ConnectError::Refused {
                    host: host.to_string(),
                    port,
                    source,
                });
            }
        };
        let _ = stream.set_nodelay(true);
        let (read_half, write_half) = stream.into_split();

        *self.inner.writer.lock().await = Some(write_half);

        let token = CancellationToken::new();
        {
            let mut lifecycle = self.inner.lifecycle.lock().await;
            lifecycle.token = token.clone();
            lifecycle.endpoint = Some((host.to_string(), port));
        }
        *self.inner.state.lock().await = ConnectionState::Connected;

        let task = tokio::spawn(read_loop(Arc::clone(&self.inner), read_half, token));
        self.inner.lifecycle.lock().await.read_task = Some(task);

        info!(host, port, "connected");
        Ok(())
    }

    /// Tear the connection down.
    ///
    /// Idempotent. The read loop is cancelled and awaited before this
    /// returns, so no callback or response delivery races the caller's
    /// cleanup. Every pending request fails with a connection-closed error
    /// and all subscriptions are dropped.
    pub async fn disconnect(&self) {
        {
            let mut state = self.inner.state.lock().await;
            if *state == ConnectionState::Disconnected {
                return;
            }
            *state = ConnectionState::Disconnecting;
        }

        let (token, task) = {
            let mut lifecycle = self.inner.lifecycle.lock().await;
            lifecycle.endpoint = None;
            (lifecycle.token.clone(), lifecycle.read_task.take())
        };
        token.cancel();
        if let Some(task) = task {
            let _ = task.await;
        }

        self.inner.tracker.fail_all().await;
        self.inner.router.clear().await;
        self.inner.writer.lock().await.take();
        *self.inner.state.lock().await = ConnectionState::Disconnected;
        info!("disconnected");
    }

    /// Issue one request on behalf of a logical device.
    ///
    /// The payload is the already-encoded body for `function_id`. With
    /// `response_expected` the caller suspends until its reply arrives or
    /// the configured timeout elapses; otherwise `Ok(None)` returns as soon
    /// as the packet is on the wire. A reply with a non-ok result code
    /// surfaces as [`RequestError::Device`].
    pub async fn send_request(
        &self,
        uid: u32,
        function_id: u8,
        payload: &[u8],
        response_expected: bool,
    ) -> Result<Option<Response>, RequestError> {
        let (sequence, waiter) = if response_expected {
            let (sequence, waiter) = self.inner.tracker.issue().await?;
            (sequence, Some(waiter))
        } else {
            (self.inner.tracker.next_sequence().await, None)
        };

        let packet = Packet::request(
            uid,
            function_id,
            sequence,
            response_expected,
            Bytes::copy_from_slice(payload),
        );
        let mut wire = BytesMut::with_capacity(packet.wire_len());
        if let Err(err) = encode_packet(&packet, &mut wire) {
            if waiter.is_some() {
                self.inner.tracker.release(sequence).await;
            }
            return Err(err.into());
        }

        {
            let mut writer = self.inner.writer.lock().await;
            let Some(writer) = writer.as_mut() else {
                if waiter.is_some() {
                    self.inner.tracker.release(sequence).await;
                }
                return Err(RequestError::NotConnected);
            };
            debug!(uid, function_id, sequence, response_expected, "sending request");
            if let Err(err) = writer.write_all(&wire).await {
                if waiter.is_some() {
                    self.inner.tracker.release(sequence).await;
                }
                return Err(RequestError::Frame(FrameError::Io(err)));
            }
        }

        let Some(waiter) = waiter else {
            return Ok(None);
        };

        let timeout = self.inner.config.request_timeout;
        match tokio::time::timeout(timeout, waiter).await {
            Err(_) => {
                // Free the slot so the number becomes usable again; a late
                // reply will land in the tracker as a logged no-op.
                self.inner.tracker.release(sequence).await;
                Err(RequestError::Timeout(timeout))
            }
            Ok(Err(_)) => Err(RequestError::ConnectionClosed),
            Ok(Ok(Err(err))) => Err(err),
            Ok(Ok(Ok(packet))) => {
                if packet.status.is_ok() {
                    Ok(Some(Response::from(packet)))
                } else {
                    Err(RequestError::Device {
                        uid,
                        function_id,
                        status: packet.status,
                    })
                }
            }
        }
    }

    /// Broadcast an enumerate request. Devices answer with announcements on
    /// the enumeration queue; the request itself has no reply.
    pub async fn enumerate(&self) -> Result<(), RequestError> {
        debug!("broadcasting enumerate");
        self.send_request(BROADCAST_UID, function::ENUMERATE, &[], false)
            .await?;
        Ok(())
    }

    /// Handle on the queue of device attach/detach announcements.
    pub fn enumeration(&self) -> EventQueue<EnumerateEvent> {
        self.inner.enumeration.clone()
    }

    /// Subscribe `queue` to callbacks on `(uid, function_id)`, decoded with
    /// `format` from the device's callback table.
    pub async fn register_event_queue(
        &self,
        uid: u32,
        function_id: u8,
        format: Format,
        queue: EventQueue<CallbackEvent>,
    ) {
        self.inner
            .router
            .subscribe(uid, function_id, format, queue)
            .await;
    }

    /// Remove a previously registered subscription.
    pub async fn unregister_event_queue(
        &self,
        uid: u32,
        function_id: u8,
        queue: &EventQueue<CallbackEvent>,
    ) -> bool {
        self.inner.router.unsubscribe(uid, function_id, queue).await
    }
}

impl Default for Connection {
    fn default() -> Self {
        Self::new(ConnectionConfig::default())
    }
}

impl Inner {
    /// Classify one inbound packet: sequence number `0` marks a callback,
    /// anything else resolves a pending request.
    async fn handle_packet(&self, packet: Packet) -> Result<(), CodecError> {
        if !packet.is_callback() {
            self.tracker
                .resolve(packet.sequence_number, Ok(packet))
                .await;
            return Ok(());
        }

        if packet.function_id == function::CALLBACK_ENUMERATE {
            match EnumerateEvent::from_payload(&packet.payload, &self.enumerate_format)? {
                Some(event) => {
                    debug!(uid = event.uid, kind = ?event.kind, "enumeration event");
                    if !self.enumeration.push(event).await {
                        debug!("enumeration queue closed; announcement dropped");
                    }
                }
                None => warn!(uid = packet.uid, "dropping announcement of unknown kind"),
            }
            return Ok(());
        }

        self.router
            .dispatch(packet.uid, packet.function_id, &packet.payload)
            .await
    }
}

enum Pump {
    Cancelled,
    Failed,
}

async fn read_loop(inner: Arc<Inner>, reader: OwnedReadHalf, token: CancellationToken) {
    let mut reader = reader;
    loop {
        match pump(&inner, &mut reader, &token).await {
            Pump::Cancelled => {
                debug!("read loop cancelled");
                return;
            }
            Pump::Failed => {
                inner.tracker.fail_all().await;
                inner.writer.lock().await.take();

                if !inner.config.auto_reconnect || token.is_cancelled() {
                    *inner.state.lock().await = ConnectionState::Disconnected;
                    info!("connection closed");
                    return;
                }

                *inner.state.lock().await = ConnectionState::AutoReconnecting;
                match reestablish(&inner, &token).await {
                    Some(new_reader) => {
                        reader = new_reader;
                        *inner.state.lock().await = ConnectionState::Connected;
                        info!("reconnected");
                    }
                    // Cancelled mid-reconnect; disconnect() owns the state.
                    None => return,
                }
            }
        }
    }
}

/// Read and dispatch packets until the stream fails or the token fires.
async fn pump(inner: &Inner, reader: &mut OwnedReadHalf, token: &CancellationToken) -> Pump {
    let mut codec = PacketCodec;
    let mut buf = BytesMut::with_capacity(4 * MAX_PACKET_LEN);
    loop {
        // Drain every complete packet before asking the socket for more.
        loop {
            match codec.decode(&mut buf) {
                Ok(Some(packet)) => {
                    tokio::select! {
                        _ = token.cancelled() => return Pump::Cancelled,
                        handled = inner.handle_packet(packet) => {
                            if let Err(err) = handled {
                                warn!(error = %err, "payload desync; dropping connection");
                                return Pump::Failed;
                            }
                        }
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(error = %err, "framing error; dropping connection");
                    return Pump::Failed;
                }
            }
        }

        tokio::select! {
            _ = token.cancelled() => return Pump::Cancelled,
            read = reader.read_buf(&mut buf) => match read {
                Ok(0) => {
                    info!("peer closed the connection");
                    return Pump::Failed;
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(error = %err, "transport read failed");
                    return Pump::Failed;
                }
            },
        }
    }
}

/// Reconnect to the stored endpoint, pausing between attempts, until the
/// stream is back or the token fires.
async fn reestablish(inner: &Inner, token: &CancellationToken) -> Option<OwnedReadHalf> {
    let (host, port) = inner.lifecycle.lock().await.endpoint.clone()?;
    loop {
        tokio::select! {
            _ = token.cancelled() => return None,
            _ = tokio::time::sleep(inner.config.reconnect_delay) => {}
        }

        let connect = TcpStream::connect((host.as_str(), port));
        let stream = tokio::select! {
            _ = token.cancelled() => return None,
            result = connect => match result {
                Ok(stream) => stream,
                Err(err) => {
                    debug!(error = %err, host = %host, port, "reconnect attempt failed");
                    continue;
                }
            },
        };

        let _ = stream.set_nodelay(true);
        let (read_half, write_half) = stream.into_split();
        *inner.writer.lock().await = Some(write_half);
        return Some(read_half);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = ConnectionConfig::default();
        assert_eq!(config.request_timeout, Duration::from_millis(2500));
        assert!(!config.auto_reconnect);
        assert_eq!(config.enumeration_capacity, 20);
    }

    #[tokio::test]
    async fn fresh_connection_is_disconnected() {
        let connection = Connection::default();
        assert_eq!(connection.state().await, ConnectionState::Disconnected);
        assert!(!connection.is_connected().await);
    }

    #[tokio::test]
    async fn request_without_stream_fails() {
        let connection = Connection::default();
        let err = connection.send_request(1, 2, &[], true).await.unwrap_err();
        assert!(matches!(err, RequestError::NotConnected));
    }

    #[tokio::test]
    async fn disconnect_when_down_is_a_no_op() {
        let connection = Connection::default();
        connection.disconnect().await;
        assert_eq!(connection.state().await, ConnectionState::Disconnected);
    }
}
