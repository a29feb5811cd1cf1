use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error};

use super::types::{ChatMessage, ConnectionId, TypingNotice, UserProfile};
use crate::protocol::ServerMessage;

/// Outbound half of a session: serialized frames, delivered in order.
pub type Outbox = mpsc::UnboundedSender<String>;

#[derive(Debug, Default)]
struct Fanout {
    sessions: HashMap<ConnectionId, Outbox>,
    last_stamp: Option<DateTime<Utc>>,
}

impl Fanout {
    /// Wall-clock now, never earlier than the previous stamp.
    fn stamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let stamp = match self.last_stamp {
            Some(last) if last > now => last,
            _ => now,
        };
        self.last_stamp = Some(stamp);
        stamp
    }

    fn deliver(&self, msg: &ServerMessage, exclude: Option<ConnectionId>) -> usize {
        let text = match serde_json::to_string(msg) {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to serialize broadcast: {}", e);
                return 0;
            }
        };

        let mut delivered = 0;
        for (id, outbox) in self.sessions.iter() {
            if Some(*id) == exclude {
                continue;
            }
            // A closed receiver means the session is tearing down.
            match outbox.send(text.clone()) {
                Ok(()) => delivered += 1,
                Err(_) => debug!("Skipping closed session {}", id),
            }
        }
        delivered
    }
}

/// Fans relay events out to every attached session.
///
/// All broadcasts go through one lock, so every session sees events in
/// the same relative order.
#[derive(Debug, Default)]
pub struct BroadcastRelay {
    fanout: Mutex<Fanout>,
}

impl BroadcastRelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn attach(&self, id: ConnectionId, outbox: Outbox) {
        self.fanout.lock().await.sessions.insert(id, outbox);
        debug!("Attached session {}", id);
    }

    pub async fn detach(&self, id: &ConnectionId) -> bool {
        let removed = self.fanout.lock().await.sessions.remove(id).is_some();
        if removed {
            debug!("Detached session {}", id);
        }
        removed
    }

    pub async fn session_count(&self) -> usize {
        self.fanout.lock().await.sessions.len()
    }

    /// Stamps and delivers a chat message to everyone, sender included.
    /// Blank text is dropped and `None` returned.
    pub async fn broadcast_message(
        &self,
        sender: Option<UserProfile>,
        text: &str,
    ) -> Option<ChatMessage> {
        if text.trim().is_empty() {
            debug!("Dropping blank message");
            return None;
        }

        let mut fanout = self.fanout.lock().await;
        let message = ChatMessage {
            sender,
            text: text.to_string(),
            timestamp: fanout.stamp(),
        };
        let delivered = fanout.deliver(&ServerMessage::Message(message.clone()), None);
        debug!("Message delivered to {} sessions", delivered);
        Some(message)
    }

    /// Delivers a typing notice to everyone except `origin`.
    pub async fn broadcast_typing(
        &self,
        sender: Option<UserProfile>,
        is_typing: bool,
        origin: ConnectionId,
    ) -> usize {
        let notice = TypingNotice { sender, is_typing };
        self.fanout
            .lock()
            .await
            .deliver(&ServerMessage::Typing(notice), Some(origin))
    }

    pub async fn broadcast_online_set(&self, snapshot: Vec<UserProfile>) -> usize {
        self.fanout
            .lock()
            .await
            .deliver(&ServerMessage::OnlineUsers(snapshot), None)
    }
}
