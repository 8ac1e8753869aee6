use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast, mpsc};
use tracing::debug;
use uuid::Uuid;

use helpmate_types::events::GatewayEvent;

/// Presence map plus broadcast channel. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Broadcast channel for events every connected client receives
    broadcast_tx: broadcast::Sender<GatewayEvent>,

    /// Track online users: user_id -> username
    online_users: RwLock<HashMap<Uuid, String>>,

    /// Per-user targeted send channels: user_id -> (conn_id, sender).
    /// One handle per user; the latest connection wins.
    user_channels: RwLock<HashMap<Uuid, (Uuid, mpsc::UnboundedSender<GatewayEvent>)>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                online_users: RwLock::new(HashMap::new()),
                user_channels: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to gateway events. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Broadcast an event to all connected clients.
    pub fn broadcast(&self, event: GatewayEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Register a per-user targeted channel. Returns (conn_id, receiver).
    /// Replaces any handle an older connection of the same user left behind.
    pub async fn register_user_channel(
        &self,
        user_id: Uuid,
    ) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.user_channels.write().await.insert(user_id, (conn_id, tx));
        (conn_id, rx)
    }

    /// Send a targeted event to a specific user. Best effort: returns `false`
    /// when the user has no live handle, nothing is queued for later.
    pub async fn send_to_user(&self, user_id: Uuid, event: GatewayEvent) -> bool {
        let channels = self.inner.user_channels.read().await;
        match channels.get(&user_id) {
            Some((_, tx)) => tx.send(event).is_ok(),
            None => {
                debug!("No gateway handle for {}, skipping {}", user_id, event.name());
                false
            }
        }
    }

    /// Whether the user currently has a targeted handle.
    pub async fn is_connected(&self, user_id: Uuid) -> bool {
        self.inner.user_channels.read().await.contains_key(&user_id)
    }

    /// Register a user as online.
    pub async fn user_online(&self, user_id: Uuid, username: String) {
        self.inner
            .online_users
            .write()
            .await
            .insert(user_id, username.clone());

        self.broadcast(GatewayEvent::PresenceUpdate {
            user_id,
            username,
            online: true,
        });
    }

    /// Register a user as offline. Only cleans up if conn_id matches.
    pub async fn user_offline(&self, user_id: Uuid, conn_id: Uuid) {
        // Held across both removals: a reconnect registers its channel before
        // going online, so it cannot slip in between.
        let mut channels = self.inner.user_channels.write().await;
        if !channels.get(&user_id).is_some_and(|(cid, _)| *cid == conn_id) {
            // A newer connection has taken over, leave everything alone
            return;
        }
        channels.remove(&user_id);

        let username = self
            .inner
            .online_users
            .write()
            .await
            .remove(&user_id)
            .unwrap_or_default();
        drop(channels);

        self.broadcast(GatewayEvent::PresenceUpdate {
            user_id,
            username,
            online: false,
        });
    }

    /// Get list of online users.
    pub async fn online_users(&self) -> Vec<(Uuid, String)> {
        self.inner
            .online_users
            .read()
            .await
            .iter()
            .map(|(id, name)| (*id, name.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use helpmate_types::models::Message;

    fn new_message(receiver_id: Uuid) -> GatewayEvent {
        GatewayEvent::NewMessage(Message {
            id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            receiver_id,
            message: "hello".into(),
            created_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn targeted_send_reaches_registered_user() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();
        let (_conn, mut rx) = dispatcher.register_user_channel(user).await;

        assert!(dispatcher.send_to_user(user, new_message(user)).await);
        match rx.recv().await {
            Some(GatewayEvent::NewMessage(m)) => assert_eq!(m.receiver_id, user),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn targeted_send_to_absent_user_is_skipped() {
        let dispatcher = Dispatcher::new();
        assert!(!dispatcher.send_to_user(Uuid::new_v4(), new_message(Uuid::nil())).await);
    }

    #[tokio::test]
    async fn newest_connection_wins() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();
        let (old_conn, mut old_rx) = dispatcher.register_user_channel(user).await;
        let (_new_conn, mut new_rx) = dispatcher.register_user_channel(user).await;

        // The old sender was dropped on replace
        assert!(old_rx.recv().await.is_none());

        // A stale disconnect must not evict the newer handle
        dispatcher.user_offline(user, old_conn).await;
        assert!(dispatcher.is_connected(user).await);

        assert!(dispatcher.send_to_user(user, new_message(user)).await);
        assert!(new_rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn stale_disconnect_keeps_reconnected_user_online() {
        let dispatcher = Dispatcher::new();
        let mut events = dispatcher.subscribe();
        let user = Uuid::new_v4();

        let (old_conn, _old_rx) = dispatcher.register_user_channel(user).await;
        dispatcher.user_online(user, "anna".into()).await;
        let (_new_conn, _new_rx) = dispatcher.register_user_channel(user).await;
        dispatcher.user_online(user, "anna".into()).await;

        dispatcher.user_offline(user, old_conn).await;

        assert_eq!(dispatcher.online_users().await, vec![(user, "anna".to_string())]);
        assert!(dispatcher.is_connected(user).await);
        while let Ok(event) = events.try_recv() {
            assert!(
                !matches!(event, GatewayEvent::PresenceUpdate { online: false, .. }),
                "stale disconnect announced the user offline"
            );
        }
    }

    #[tokio::test]
    async fn presence_is_broadcast() {
        let dispatcher = Dispatcher::new();
        let mut events = dispatcher.subscribe();
        let user = Uuid::new_v4();

        let (conn, _rx) = dispatcher.register_user_channel(user).await;
        dispatcher.user_online(user, "anna".into()).await;
        assert_eq!(dispatcher.online_users().await, vec![(user, "anna".to_string())]);

        dispatcher.user_offline(user, conn).await;
        assert!(dispatcher.online_users().await.is_empty());
        assert!(!dispatcher.is_connected(user).await);

        let mut seen = Vec::new();
        while let Ok(GatewayEvent::PresenceUpdate { user_id, username, online }) = events.try_recv() {
            assert_eq!(user_id, user);
            assert_eq!(username, "anna");
            seen.push(online);
        }
        assert_eq!(seen, [true, false]);
    }
}
