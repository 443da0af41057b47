//! Callback fan-out to per-device subscribers.

use std::collections::HashMap;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use stackwire_codec::{decode, CodecError, Format, Value};

use crate::queue::EventQueue;

/// A decoded unsolicited callback, as delivered to subscriber queues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackEvent {
    pub uid: u32,
    pub function_id: u8,
    pub values: Vec<Value>,
}

/// Routes `(uid, function_id)` callbacks to zero or more subscriber queues.
///
/// The payload layout for each pair comes from the device layer's
/// per-device-type table and is compiled once at registration. Dispatch
/// decodes a packet once and hands the same decoded event to every
/// matching queue.
#[derive(Debug)]
pub(crate) struct CallbackRouter {
    routes: Mutex<HashMap<(u32, u8), Route>>,
}

#[derive(Debug)]
struct Route {
    format: Format,
    queues: Vec<EventQueue<CallbackEvent>>,
}

impl CallbackRouter {
    pub fn new() -> Self {
        Self {
            routes: Mutex::new(HashMap::new()),
        }
    }

    /// Register `queue` for callbacks on `(uid, function_id)`.
    ///
    /// The first registration for a pair fixes its payload format; later
    /// registrations with a different format keep the original and warn.
    /// Registering the same queue twice for one pair is a no-op.
    pub async fn subscribe(
        &self,
        uid: u32,
        function_id: u8,
        format: Format,
        queue: EventQueue<CallbackEvent>,
    ) {
        let mut routes = self.routes.lock().await;
        let route = routes.entry((uid, function_id)).or_insert_with(|| Route {
            format: format.clone(),
            queues: Vec::new(),
        });
        if route.format != format {
            warn!(uid, function_id, "subscription format differs from the registered one; keeping the first");
        }
        if route.queues.iter().any(|q| q.same_queue(&queue)) {
            return;
        }
        route.queues.push(queue);
    }

    /// Remove `queue` from `(uid, function_id)`. Returns whether a
    /// subscription was removed. The route (and its format) disappears with
    /// its last queue.
    pub async fn unsubscribe(
        &self,
        uid: u32,
        function_id: u8,
        queue: &EventQueue<CallbackEvent>,
    ) -> bool {
        let mut routes = self.routes.lock().await;
        let Some(route) = routes.get_mut(&(uid, function_id)) else {
            return false;
        };
        let before = route.queues.len();
        route.queues.retain(|q| !q.same_queue(queue));
        let removed = route.queues.len() < before;
        if route.queues.is_empty() {
            routes.remove(&(uid, function_id));
        }
        removed
    }

    /// Decode one callback payload and deliver it to every subscriber.
    ///
    /// An unregistered `(uid, function_id)` is dropped with a warning:
    /// firmware newer than this client may push callback kinds it does not
    /// know. A payload that does not match the registered format is a
    /// decoding error and the stream can no longer be trusted.
    pub async fn dispatch(
        &self,
        uid: u32,
        function_id: u8,
        payload: &[u8],
    ) -> Result<(), CodecError> {
        let (format, queues) = {
            let routes = self.routes.lock().await;
            let Some(route) = routes.get(&(uid, function_id)) else {
                warn!(uid, function_id, "dropping unknown callback");
                return Ok(());
            };
            (route.format.clone(), route.queues.clone())
        };

        let values = decode(payload, &format)?;
        let event = CallbackEvent {
            uid,
            function_id,
            values,
        };
        for queue in &queues {
            if !queue.push(event.clone()).await {
                debug!(uid, function_id, "subscriber queue refused callback");
            }
        }
        Ok(())
    }

    /// Drop every subscription.
    pub async fn clear(&self) {
        self.routes.lock().await.clear();
    }

    #[cfg(test)]
    pub async fn route_count(&self) -> usize {
        self.routes.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use stackwire_codec::encode;

    use crate::queue::OverflowPolicy;

    use super::*;

    fn u16_format() -> Format {
        Format::parse("H").unwrap()
    }

    fn u16_payload(value: u16) -> Vec<u8> {
        encode(&[Value::U16(value)], &u16_format()).unwrap().to_vec()
    }

    #[tokio::test]
    async fn fan_out_to_two_subscribers() {
        let router = CallbackRouter::new();
        let first = EventQueue::new(4, OverflowPolicy::Reject);
        let second = EventQueue::new(4, OverflowPolicy::Reject);
        router.subscribe(5, 9, u16_format(), first.clone()).await;
        router.subscribe(5, 9, u16_format(), second.clone()).await;

        router.dispatch(5, 9, &u16_payload(700)).await.unwrap();

        for queue in [&first, &second] {
            let event = queue.recv().await.unwrap();
            assert_eq!(event.uid, 5);
            assert_eq!(event.function_id, 9);
            assert_eq!(event.values, vec![Value::U16(700)]);
        }
    }

    #[tokio::test]
    async fn one_queue_may_serve_many_kinds() {
        let router = CallbackRouter::new();
        let queue = EventQueue::new(4, OverflowPolicy::Reject);
        router.subscribe(5, 9, u16_format(), queue.clone()).await;
        router.subscribe(5, 10, u16_format(), queue.clone()).await;

        router.dispatch(5, 9, &u16_payload(1)).await.unwrap();
        router.dispatch(5, 10, &u16_payload(2)).await.unwrap();

        assert_eq!(queue.recv().await.unwrap().function_id, 9);
        assert_eq!(queue.recv().await.unwrap().function_id, 10);
    }

    #[tokio::test]
    async fn unknown_callback_is_dropped() {
        let router = CallbackRouter::new();
        let queue = EventQueue::new(4, OverflowPolicy::Reject);
        router.subscribe(5, 9, u16_format(), queue.clone()).await;

        // Different uid and different function id: nobody listens.
        router.dispatch(6, 9, &u16_payload(1)).await.unwrap();
        router.dispatch(5, 8, &[0xFF; 13]).await.unwrap();

        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn payload_mismatch_is_a_decoding_error() {
        let router = CallbackRouter::new();
        let queue = EventQueue::new(4, OverflowPolicy::Reject);
        router.subscribe(5, 9, u16_format(), queue.clone()).await;

        let err = router.dispatch(5, 9, &[1, 2, 3]).await.unwrap_err();
        assert!(matches!(err, CodecError::LengthMismatch { .. }));
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let router = CallbackRouter::new();
        let queue = EventQueue::new(4, OverflowPolicy::Reject);
        router.subscribe(5, 9, u16_format(), queue.clone()).await;

        assert!(router.unsubscribe(5, 9, &queue).await);
        assert!(!router.unsubscribe(5, 9, &queue).await);
        assert_eq!(router.route_count().await, 0);

        router.dispatch(5, 9, &u16_payload(3)).await.unwrap();
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn duplicate_subscription_delivers_once() {
        let router = CallbackRouter::new();
        let queue = EventQueue::new(4, OverflowPolicy::Reject);
        router.subscribe(5, 9, u16_format(), queue.clone()).await;
        router.subscribe(5, 9, u16_format(), queue.clone()).await;

        router.dispatch(5, 9, &u16_payload(4)).await.unwrap();
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn full_reject_queue_does_not_starve_others() {
        let router = CallbackRouter::new();
        let tiny = EventQueue::new(1, OverflowPolicy::Reject);
        let roomy = EventQueue::new(8, OverflowPolicy::Reject);
        router.subscribe(5, 9, u16_format(), tiny.clone()).await;
        router.subscribe(5, 9, u16_format(), roomy.clone()).await;

        router.dispatch(5, 9, &u16_payload(1)).await.unwrap();
        router.dispatch(5, 9, &u16_payload(2)).await.unwrap();

        assert_eq!(tiny.len().await, 1);
        assert_eq!(roomy.len().await, 2);
    }
}
