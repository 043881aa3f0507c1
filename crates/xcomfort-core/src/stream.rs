// ── Entity state streams ──
//
// Subscription types for consuming snapshots from a `StatePublisher`.

use futures_core::Stream;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// A subscription to one entity's snapshots.
///
/// Yields the snapshot current at subscribe time (if any), then every
/// later snapshot in publish order.
pub struct StateSubscription<T> {
    replay: Option<T>,
    receiver: mpsc::UnboundedReceiver<T>,
}

impl<T: Clone + Send + 'static> StateSubscription<T> {
    pub(crate) fn new(replay: Option<T>, receiver: mpsc::UnboundedReceiver<T>) -> Self {
        Self { replay, receiver }
    }

    /// Next snapshot. `None` once the entity is gone and every queued
    /// snapshot has been read.
    pub async fn recv(&mut self) -> Option<T> {
        if let Some(value) = self.replay.take() {
            return Some(value);
        }
        self.receiver.recv().await
    }

    /// Convert into a `Stream` for use with `StreamExt` combinators.
    pub fn into_stream(self) -> impl Stream<Item = T> + Send + Unpin {
        let live = UnboundedReceiverStream::new(self.receiver);
        futures_util::stream::iter(self.replay).chain(live)
    }
}

impl<T> std::fmt::Debug for StateSubscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateSubscription")
            .field("pending_replay", &self.replay.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use futures_util::StreamExt;

    use crate::store::StatePublisher;

    #[tokio::test]
    async fn stream_replays_then_follows() {
        let publisher = StatePublisher::new();
        publisher.publish(7);

        let stream = publisher.subscribe().into_stream();
        publisher.publish(8);
        drop(publisher);

        let seen: Vec<i32> = stream.collect().await;
        assert_eq!(seen, vec![7, 8]);
    }
}
