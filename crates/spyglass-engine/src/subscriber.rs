//! Live event-stream subscriber handles.
//!
//! A [`Subscriber`] is the engine's view of one attached viewer: a bounded
//! channel of pre-serialized events. Delivery is `try_send` — a full or
//! closed channel drops the message and bumps a counter, never blocking the
//! session's pipeline or other subscribers.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use spyglass_core::SubscriberId;
use tokio::sync::mpsc;

/// One attached viewer of a session's event stream.
pub struct Subscriber {
    id: SubscriberId,
    tx: mpsc::Sender<Arc<String>>,
    dropped: AtomicU64,
}

impl Subscriber {
    /// Create a subscriber with a channel holding up to `buffer` messages.
    /// Returns the handle the engine keeps and the receiver the transport
    /// drains.
    #[must_use]
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (
            Self {
                id: SubscriberId::new(),
                tx,
                dropped: AtomicU64::new(0),
            },
            rx,
        )
    }

    /// This subscriber's ID.
    #[must_use]
    pub fn id(&self) -> &SubscriberId {
        &self.id
    }

    /// Enqueue a serialized event.
    ///
    /// Returns `false` if the channel is full or closed; the message is
    /// dropped and the drop counter incremented.
    pub fn send(&self, message: Arc<String>) -> bool {
        if self.tx.try_send(message).is_ok() {
            true
        } else {
            let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Whether the receiving side has gone away.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Messages dropped so far for this subscriber.
    #[must_use]
    pub fn drop_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_delivers_to_receiver() {
        let (sub, mut rx) = Subscriber::channel(8);
        assert!(sub.send(Arc::new("hello".into())));
        let msg = rx.recv().await.unwrap();
        assert_eq!(&*msg, "hello");
    }

    #[tokio::test]
    async fn send_to_full_channel_drops_and_counts() {
        let (sub, _rx) = Subscriber::channel(1);
        assert!(sub.send(Arc::new("first".into())));
        assert!(!sub.send(Arc::new("second".into())));
        assert_eq!(sub.drop_count(), 1);
    }

    #[tokio::test]
    async fn send_to_closed_channel_drops() {
        let (sub, rx) = Subscriber::channel(8);
        drop(rx);
        assert!(!sub.send(Arc::new("late".into())));
        assert!(sub.is_closed());
        assert_eq!(sub.drop_count(), 1);
    }

    #[tokio::test]
    async fn messages_arrive_in_send_order() {
        let (sub, mut rx) = Subscriber::channel(16);
        for i in 0..5 {
            assert!(sub.send(Arc::new(format!("m{i}"))));
        }
        for i in 0..5 {
            assert_eq!(&*rx.recv().await.unwrap(), &format!("m{i}"));
        }
    }

    #[test]
    fn ids_are_unique() {
        let (a, _rx_a) = Subscriber::channel(1);
        let (b, _rx_b) = Subscriber::channel(1);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn zero_buffer_is_clamped() {
        let (sub, _rx) = Subscriber::channel(0);
        assert!(sub.send(Arc::new("x".into())));
    }
}
