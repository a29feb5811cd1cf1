use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use super::broadcast::{BroadcastRelay, Outbox};
use super::registry::ConnectionRegistry;
use super::typing::{TypingAggregator, TypingTransition};
use super::types::{ChatMessage, ConnectionId, UserProfile};

/// Lifecycle of an admitted connection. Closed connections have no entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Registered,
}

#[derive(Debug, Default)]
struct Presence {
    registry: ConnectionRegistry,
    states: HashMap<ConnectionId, ConnectionState>,
}

/// Shared relay state handed to every connection handler.
///
/// Registry mutations and the online-set broadcast that follows them happen
/// under the same lock, so a snapshot is never torn or sent out of order.
/// Locks are always taken presence -> typing -> fan-out.
#[derive(Debug)]
pub struct RelayHub {
    presence: Mutex<Presence>,
    broadcaster: Arc<BroadcastRelay>,
    typing: TypingAggregator,
}

impl Default for RelayHub {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayHub {
    pub fn new() -> Self {
        let broadcaster = Arc::new(BroadcastRelay::new());
        Self {
            presence: Mutex::new(Presence::default()),
            typing: TypingAggregator::new(broadcaster.clone()),
            broadcaster,
        }
    }

    /// Admits a fresh connection. It receives broadcasts from now on but has
    /// no profile until it registers.
    pub async fn admit(&self, outbox: Outbox) -> ConnectionId {
        let id = ConnectionId::new();
        self.admit_with_id(id, outbox).await;
        id
    }

    pub async fn admit_with_id(&self, id: ConnectionId, outbox: Outbox) {
        let mut presence = self.presence.lock().await;
        presence.states.insert(id, ConnectionState::Connected);
        self.broadcaster.attach(id, outbox).await;
        info!("Connection {} admitted", id);
    }

    /// Stores the profile and announces the new online set. Returns the
    /// snapshot that was broadcast, or `None` if the connection is closed.
    pub async fn register(&self, id: ConnectionId, profile: UserProfile) -> Option<Vec<UserProfile>> {
        let mut presence = self.presence.lock().await;
        if !presence.states.contains_key(&id) {
            debug!("Ignoring registration on closed connection {}", id);
            return None;
        }

        info!("Connection {} registered as {}", id, profile.email);
        presence.registry.register(id, profile);
        presence.states.insert(id, ConnectionState::Registered);

        let snapshot = presence.registry.snapshot();
        self.broadcaster.broadcast_online_set(snapshot.clone()).await;
        Some(snapshot)
    }

    /// Relays a chat message. Unregistered senders go out with no profile.
    pub async fn post_message(&self, id: ConnectionId, text: &str) -> Option<ChatMessage> {
        let sender = {
            let presence = self.presence.lock().await;
            if !presence.states.contains_key(&id) {
                debug!("Ignoring message from closed connection {}", id);
                return None;
            }
            presence.registry.profile(&id).cloned()
        };
        self.broadcaster.broadcast_message(sender, text).await
    }

    /// Drives the typing aggregator. The presence guard is held throughout so
    /// a concurrent disconnect cannot leave a run behind for a closed
    /// connection.
    pub async fn signal_typing(&self, id: ConnectionId, is_typing: bool) -> Option<TypingTransition> {
        let presence = self.presence.lock().await;
        if !presence.states.contains_key(&id) {
            return None;
        }
        let sender = presence.registry.profile(&id).cloned();
        Some(self.typing.signal(id, sender, is_typing).await)
    }

    /// Tears the connection down. Safe to call any number of times; only the
    /// first call for a connection does anything and returns `true`.
    pub async fn disconnect(&self, id: ConnectionId) -> bool {
        {
            let mut presence = self.presence.lock().await;
            if presence.states.remove(&id).is_none() {
                return false;
            }
            self.broadcaster.detach(&id).await;
            presence.registry.remove(&id);
            let snapshot = presence.registry.snapshot();
            self.broadcaster.broadcast_online_set(snapshot).await;
        }

        let released = self.typing.release_connection(id).await;
        info!("Connection {} closed ({} typing runs released)", id, released);
        true
    }

    pub async fn state(&self, id: &ConnectionId) -> Option<ConnectionState> {
        self.presence.lock().await.states.get(id).copied()
    }

    pub async fn online_users(&self) -> Vec<UserProfile> {
        self.presence.lock().await.registry.snapshot()
    }

    pub async fn connection_count(&self) -> usize {
        self.broadcaster.session_count().await
    }

    pub fn typing(&self) -> &TypingAggregator {
        &self.typing
    }
}
