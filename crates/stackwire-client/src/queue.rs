//! Bounded delivery queues for decoded events.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};

/// What to do when a queue is full at delivery time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Wait for the consumer to drain an item. Dispatch feels the
    /// backpressure, so only choose this for consumers that keep up.
    Block,
    /// Evict the oldest queued event to make room for the new one.
    #[default]
    DropOldest,
    /// Drop the incoming event.
    Reject,
}

/// A bounded in-process queue carrying decoded events to a consumer.
///
/// Cloning shares the queue: any clone may push or receive. One queue may
/// be registered for several callback kinds, and several queues may share
/// one callback kind.
#[derive(Debug, Clone)]
pub struct EventQueue<T> {
    shared: Arc<Shared<T>>,
}

#[derive(Debug)]
struct Shared<T> {
    state: Mutex<State<T>>,
    capacity: usize,
    policy: OverflowPolicy,
    data_ready: Notify,
    space_free: Notify,
}

#[derive(Debug)]
struct State<T> {
    items: VecDeque<T>,
    closed: bool,
}

impl<T> EventQueue<T> {
    /// Create a queue holding at most `capacity` events.
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    items: VecDeque::with_capacity(capacity),
                    closed: false,
                }),
                capacity: capacity.max(1),
                policy,
                data_ready: Notify::new(),
                space_free: Notify::new(),
            }),
        }
    }

    /// Deliver an event according to the queue's overflow policy.
    ///
    /// Returns `false` if the event was dropped (`Reject` on a full queue,
    /// or the queue is closed).
    pub async fn push(&self, event: T) -> bool {
        loop {
            let space = self.shared.space_free.notified();
            {
                let mut state = self.shared.state.lock().await;
                if state.closed {
                    return false;
                }
                if state.items.len() < self.shared.capacity {
                    state.items.push_back(event);
                    self.shared.data_ready.notify_one();
                    return true;
                }
                match self.shared.policy {
                    OverflowPolicy::DropOldest => {
                        state.items.pop_front();
                        state.items.push_back(event);
                        self.shared.data_ready.notify_one();
                        return true;
                    }
                    OverflowPolicy::Reject => return false,
                    OverflowPolicy::Block => {}
                }
            }
            space.await;
        }
    }

    /// Receive the next event, waiting if the queue is empty.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub async fn recv(&self) -> Option<T> {
        loop {
            let ready = self.shared.data_ready.notified();
            {
                let mut state = self.shared.state.lock().await;
                if let Some(item) = state.items.pop_front() {
                    self.shared.space_free.notify_one();
                    return Some(item);
                }
                if state.closed {
                    return None;
                }
            }
            ready.await;
        }
    }

    /// Close the queue. Queued events stay receivable; pushes are refused
    /// and blocked consumers wake with `None` after draining.
    pub async fn close(&self) {
        let mut state = self.shared.state.lock().await;
        state.closed = true;
        self.shared.data_ready.notify_waiters();
        self.shared.space_free.notify_waiters();
    }

    /// Number of events currently queued.
    pub async fn len(&self) -> usize {
        self.shared.state.lock().await.items.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Maximum number of queued events.
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Whether two handles refer to the same underlying queue.
    pub fn same_queue(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn fifo_order() {
        let queue = EventQueue::new(4, OverflowPolicy::Reject);
        for i in 0..3 {
            assert!(queue.push(i).await);
        }
        assert_eq!(queue.recv().await, Some(0));
        assert_eq!(queue.recv().await, Some(1));
        assert_eq!(queue.recv().await, Some(2));
    }

    #[tokio::test]
    async fn drop_oldest_evicts_head() {
        let queue = EventQueue::new(2, OverflowPolicy::DropOldest);
        assert!(queue.push(1).await);
        assert!(queue.push(2).await);
        assert!(queue.push(3).await);

        assert_eq!(queue.len().await, 2);
        assert_eq!(queue.recv().await, Some(2));
        assert_eq!(queue.recv().await, Some(3));
    }

    #[tokio::test]
    async fn reject_keeps_existing_events() {
        let queue = EventQueue::new(2, OverflowPolicy::Reject);
        assert!(queue.push(1).await);
        assert!(queue.push(2).await);
        assert!(!queue.push(3).await);

        assert_eq!(queue.recv().await, Some(1));
        assert_eq!(queue.recv().await, Some(2));
    }

    #[tokio::test]
    async fn block_waits_for_space() {
        let queue = EventQueue::new(1, OverflowPolicy::Block);
        assert!(queue.push(1).await);

        let consumer = queue.clone();
        let drain = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            consumer.recv().await
        });

        // Full queue: this push parks until the consumer drains.
        assert!(queue.push(2).await);
        assert_eq!(drain.await.unwrap(), Some(1));
        assert_eq!(queue.recv().await, Some(2));
    }

    #[tokio::test]
    async fn close_wakes_blocked_receiver() {
        let queue: EventQueue<u8> = EventQueue::new(2, OverflowPolicy::Reject);
        let waiter = queue.clone();
        let handle = tokio::spawn(async move { waiter.recv().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close().await;
        assert_eq!(handle.await.unwrap(), None);
    }

    #[tokio::test]
    async fn close_refuses_pushes_but_drains() {
        let queue = EventQueue::new(4, OverflowPolicy::Reject);
        assert!(queue.push(7).await);
        queue.close().await;
        assert!(!queue.push(8).await);

        assert_eq!(queue.recv().await, Some(7));
        assert_eq!(queue.recv().await, None);
    }

    #[tokio::test]
    async fn clones_share_state() {
        let queue = EventQueue::new(2, OverflowPolicy::Reject);
        let other = queue.clone();
        assert!(queue.same_queue(&other));
        assert!(!queue.same_queue(&EventQueue::new(2, OverflowPolicy::Reject)));

        assert!(other.push(5).await);
        assert_eq!(queue.recv().await, Some(5));
    }
}
