//! Request/response correlation.

use tokio::sync::{oneshot, Mutex};
use tracing::debug;

use stackwire_frame::{Packet, MAX_SEQUENCE};

use crate::error::RequestError;

/// Outcome delivered to a waiting caller: the response packet, or a
/// terminal error ending the wait.
pub(crate) type Resolution = Result<Packet, RequestError>;

/// Correlates in-flight sequence numbers with their waiting callers.
///
/// The wire gives each request four bits of sequence number (1..=15, with 0
/// marking callbacks), so at most fifteen requests can be awaiting replies
/// at once. Replies may arrive in any order; each wakes exactly the caller
/// that issued its number.
#[derive(Debug)]
pub(crate) struct RequestTracker {
    slots: Mutex<Slots>,
}

#[derive(Debug)]
struct Slots {
    last: u8,
    waiters: [Option<oneshot::Sender<Resolution>>; MAX_SEQUENCE as usize],
}

impl Slots {
    fn advance(&mut self) -> u8 {
        self.last = self.last % MAX_SEQUENCE + 1;
        self.last
    }
}

impl RequestTracker {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(Slots {
                last: 0,
                waiters: std::array::from_fn(|_| None),
            }),
        }
    }

    /// Advance the wrapping counter without registering a waiter, for
    /// requests that expect no response.
    pub async fn next_sequence(&self) -> u8 {
        self.slots.lock().await.advance()
    }

    /// Allocate the next sequence number and register a waiter on it.
    ///
    /// Fails if the counter wrapped into a number still awaiting its reply;
    /// the older waiter is never overwritten.
    pub async fn issue(&self) -> Result<(u8, oneshot::Receiver<Resolution>), RequestError> {
        let mut slots = self.slots.lock().await;
        let sequence = slots.advance();
        let index = usize::from(sequence - 1);
        if slots.waiters[index].is_some() {
            return Err(RequestError::SequenceInUse(sequence));
        }
        let (tx, rx) = oneshot::channel();
        slots.waiters[index] = Some(tx);
        Ok((sequence, rx))
    }

    /// Deliver a resolution to the caller waiting on `sequence`.
    ///
    /// Without a waiter this is a logged no-op: the reply belongs to a
    /// request sent with `response_expected=false`, or arrived after its
    /// caller timed out.
    pub async fn resolve(&self, sequence: u8, resolution: Resolution) {
        if sequence == 0 || sequence > MAX_SEQUENCE {
            debug!(sequence, "response with out-of-range sequence number");
            return;
        }
        let mut slots = self.slots.lock().await;
        match slots.waiters[usize::from(sequence - 1)].take() {
            Some(waiter) => {
                if waiter.send(resolution).is_err() {
                    debug!(sequence, "waiter went away before resolution");
                }
            }
            None => debug!(sequence, "no waiter for response"),
        }
    }

    /// Free a slot whose caller gave up waiting, making the number
    /// reusable.
    pub async fn release(&self, sequence: u8) {
        if sequence == 0 || sequence > MAX_SEQUENCE {
            return;
        }
        self.slots.lock().await.waiters[usize::from(sequence - 1)] = None;
    }

    /// Fail every outstanding waiter with a connection-closed error.
    pub async fn fail_all(&self) {
        let mut slots = self.slots.lock().await;
        for waiter in slots.waiters.iter_mut() {
            if let Some(waiter) = waiter.take() {
                let _ = waiter.send(Err(RequestError::ConnectionClosed));
            }
        }
    }

    /// Number of waiters currently in flight.
    #[cfg(test)]
    pub async fn outstanding(&self) -> usize {
        self.slots
            .lock()
            .await
            .waiters
            .iter()
            .filter(|w| w.is_some())
            .count()
    }
}
