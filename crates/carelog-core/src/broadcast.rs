//! Snapshot broadcasting for coordinator state.
//!
//! Built on `tokio::sync::broadcast`. The coordinator publishes a full
//! copy-on-notify snapshot of every live stream after each mutation; any
//! number of UI surfaces (chat view, the floating multi-session indicator)
//! subscribe independently. Publishing with no active subscribers is a no-op.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::broadcast;

use carelog_types::chat::{SessionKey, StreamState};

/// One immutable copy of every live stream, keyed by session.
///
/// Built copy-on-notify: the coordinator clones its map into a fresh
/// snapshot for every publication, so subscribers can never observe -- or
/// mutate -- internal state mid-change. The `Arc` keeps fan-out cheap.
pub type StreamSnapshot = Arc<HashMap<SessionKey, StreamState>>;

/// Multi-consumer broadcaster for stream snapshots.
///
/// Wraps a `tokio::sync::broadcast` channel. Cloning the broadcaster clones
/// the sender, allowing multiple producers and consumers.
pub struct StreamBroadcaster {
    sender: broadcast::Sender<StreamSnapshot>,
}

impl StreamBroadcaster {
    /// Create a new broadcaster with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Create a new receiver that will observe all future snapshots.
    pub fn subscribe(&self) -> broadcast::Receiver<StreamSnapshot> {
        self.sender.subscribe()
    }

    /// Publish a snapshot to all current subscribers.
    ///
    /// If there are no subscribers, the snapshot is silently dropped.
    pub fn publish(&self, snapshot: StreamSnapshot) {
        let _ = self.sender.send(snapshot);
    }
}

impl Clone for StreamBroadcaster {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl std::fmt::Debug for StreamBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamBroadcaster")
            .field("receiver_count", &self.sender.receiver_count())
            .finish()
    }
}

/// A live view of coordinator state: the snapshot taken at subscription time
/// plus every subsequent publication. Dropping it unsubscribes.
pub struct StreamSubscription {
    /// State of all streams at the moment of subscription. Delivered
    /// eagerly so a late subscriber cannot miss streams that already exist.
    pub initial: StreamSnapshot,
    /// Every snapshot published after `initial`, in publication order.
    pub updates: broadcast::Receiver<StreamSnapshot>,
}

impl StreamSubscription {
    /// Wait for the next published snapshot.
    ///
    /// Channel lag is skipped over silently: every snapshot carries the full
    /// current state, so a lagged subscriber only misses intermediates.
    /// Returns `None` once the coordinator has been dropped.
    pub async fn next(&mut self) -> Option<StreamSnapshot> {
        loop {
            match self.updates.recv().await {
                Ok(snapshot) => return Some(snapshot),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot_with(key: SessionKey, state: StreamState) -> StreamSnapshot {
        let mut map = HashMap::new();
        map.insert(key, state);
        Arc::new(map)
    }

    #[tokio::test]
    async fn publish_and_subscribe_delivers_snapshot() {
        let broadcaster = StreamBroadcaster::new(16);
        let mut rx = broadcaster.subscribe();

        broadcaster.publish(snapshot_with(
            SessionKey::assigned("s1"),
            StreamState {
                is_typing: true,
                ..StreamState::default()
            },
        ));

        let snapshot = rx.recv().await.unwrap();
        assert!(snapshot[&SessionKey::assigned("s1")].is_typing);
    }

    #[tokio::test]
    async fn multiple_subscribers_each_receive_identical_snapshots() {
        let broadcaster = StreamBroadcaster::new(16);
        let mut rx1 = broadcaster.subscribe();
        let mut rx2 = broadcaster.subscribe();

        broadcaster.publish(snapshot_with(
            SessionKey::assigned("s1"),
            StreamState::default(),
        ));

        let s1 = rx1.recv().await.unwrap();
        let s2 = rx2.recv().await.unwrap();
        assert!(Arc::ptr_eq(&s1, &s2));
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_panic() {
        let broadcaster = StreamBroadcaster::new(16);
        broadcaster.publish(Arc::new(HashMap::new()));
        broadcaster.publish(Arc::new(HashMap::new()));
    }

    #[tokio::test]
    async fn subscription_next_skips_lag() {
        let broadcaster = StreamBroadcaster::new(2);
        let mut sub = StreamSubscription {
            initial: Arc::new(HashMap::new()),
            updates: broadcaster.subscribe(),
        };

        // Overflow the channel; next() should still yield the most recent
        // snapshots rather than erroring out.
        for i in 0..8 {
            broadcaster.publish(snapshot_with(
                SessionKey::assigned(format!("s{i}")),
                StreamState::default(),
            ));
        }

        let snapshot = sub.next().await.unwrap();
        assert_eq!(snapshot.len(), 1);
    }

    #[tokio::test]
    async fn subscription_next_returns_none_after_sender_dropped() {
        let broadcaster = StreamBroadcaster::new(4);
        let mut sub = StreamSubscription {
            initial: Arc::new(HashMap::new()),
            updates: broadcaster.subscribe(),
        };
        drop(broadcaster);
        assert!(sub.next().await.is_none());
    }

    #[test]
    fn clone_shares_channel() {
        let broadcaster = StreamBroadcaster::new(16);
        let clone = broadcaster.clone();
        let mut rx = broadcaster.subscribe();

        clone.publish(Arc::new(HashMap::new()));
        assert!(rx.try_recv().is_ok());
    }
}
