// ── Latest-value publisher ──
//
// Holds an entity's current snapshot and fans every new one out to
// subscribers. A new subscriber first sees the current snapshot, then
// every later one in publish order. Delivery is lossless: each subscriber
// owns an unbounded queue, so a slow reader never misses a snapshot.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

use crate::stream::StateSubscription;

pub struct StatePublisher<T> {
    inner: Mutex<Inner<T>>,
}

struct Inner<T> {
    latest: Option<T>,
    subscribers: Vec<mpsc::UnboundedSender<T>>,
}

impl<T: Clone> Inner<T> {
    /// Store `value` and hand it to every live subscriber.
    fn replace(&mut self, value: T) {
        // Closed receivers are pruned here.
        self.subscribers.retain(|tx| tx.send(value.clone()).is_ok());
        self.latest = Some(value);
    }
}

impl<T: Clone + Send + 'static> StatePublisher<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                latest: None,
                subscribers: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The most recently published snapshot.
    pub fn current(&self) -> Option<T> {
        self.lock().latest.clone()
    }

    /// Replace the snapshot and notify every subscriber.
    pub fn publish(&self, value: T) {
        self.lock().replace(value);
    }

    /// Compute the next snapshot from the current one and publish it.
    pub fn update<F>(&self, f: F) -> T
    where
        F: FnOnce(Option<&T>) -> T,
    {
        let mut inner = self.lock();
        let next = f(inner.latest.as_ref());
        inner.replace(next.clone());
        next
    }

    /// Subscribe, replaying the current snapshot first.
    pub fn subscribe(&self) -> StateSubscription<T> {
        // Registered under the lock so no publish slips between replay and queue.
        let mut inner = self.lock();
        let (tx, rx) = mpsc::unbounded_channel();
        inner.subscribers.push(tx);
        StateSubscription::new(inner.latest.clone(), rx)
    }

    pub fn subscriber_count(&self) -> usize {
        let mut inner = self.lock();
        inner.subscribers.retain(|tx| !tx.is_closed());
        inner.subscribers.len()
    }
}

impl<T: Clone + Send + 'static> Default for StatePublisher<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for StatePublisher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("StatePublisher")
            .field("latest", &inner.latest)
            .field("subscribers", &inner.subscribers.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn late_subscriber_gets_current_value_first() {
        let publisher = StatePublisher::new();
        publisher.publish(1);
        publisher.publish(2);

        let mut sub = publisher.subscribe();
        publisher.publish(3);

        assert_eq!(sub.recv().await, Some(2));
        assert_eq!(sub.recv().await, Some(3));
    }

    #[tokio::test]
    async fn subscriber_before_first_publish_sees_every_value() {
        let publisher = StatePublisher::new();
        let mut sub = publisher.subscribe();

        for v in 1..=5 {
            publisher.publish(v);
        }
        for v in 1..=5 {
            assert_eq!(sub.recv().await, Some(v));
        }
    }

    #[tokio::test]
    async fn all_subscribers_see_the_same_order() {
        let publisher = StatePublisher::new();
        let mut a = publisher.subscribe();
        let mut b = publisher.subscribe();
        assert_eq!(publisher.subscriber_count(), 2);

        publisher.update(|prev| prev.copied().unwrap_or(0) + 10);
        publisher.update(|prev| prev.copied().unwrap_or(0) + 1);

        assert_eq!(a.recv().await, Some(10));
        assert_eq!(a.recv().await, Some(11));
        assert_eq!(b.recv().await, Some(10));
        assert_eq!(b.recv().await, Some(11));
        assert_eq!(publisher.current(), Some(11));
    }

    #[tokio::test]
    async fn slow_subscriber_misses_nothing() {
        let publisher = StatePublisher::new();
        let mut sub = publisher.subscribe();

        for v in 1..=1000 {
            publisher.publish(v);
        }
        drop(publisher);

        let mut seen = Vec::new();
        while let Some(v) = sub.recv().await {
            seen.push(v);
        }
        assert_eq!(seen, (1..=1000).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn dropped_subscribers_are_pruned() {
        let publisher = StatePublisher::new();
        let keep = publisher.subscribe();
        let gone = publisher.subscribe();
        drop(gone);
        publisher.publish(1);

        assert_eq!(publisher.subscriber_count(), 1);
        drop(keep);
        assert_eq!(publisher.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn dropping_publisher_ends_subscription() {
        let publisher = StatePublisher::new();
        publisher.publish("only");
        let mut sub = publisher.subscribe();
        drop(publisher);

        assert_eq!(sub.recv().await, Some("only"));
        assert_eq!(sub.recv().await, None);
    }
}
