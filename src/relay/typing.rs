use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

use super::broadcast::BroadcastRelay;
use super::types::{ConnectionId, UserProfile};

/// How long a typing signal stays live without a refresh.
pub const TYPING_EXPIRY: Duration = Duration::from_secs(3);

/// What a typing signal did to the sender's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingTransition {
    /// idle -> typing
    Started,
    /// typing -> typing, countdown restarted
    Refreshed,
    /// typing -> idle
    Stopped,
    /// false signal while already idle
    Absorbed,
    /// sender not registered or has no email, relayed without tracking
    Untracked,
}

#[derive(Debug)]
struct TypingRun {
    generation: u64,
    sender: UserProfile,
    origin: ConnectionId,
    timer: JoinHandle<()>,
}

#[derive(Debug)]
struct Inner {
    runs: Mutex<HashMap<String, TypingRun>>,
    relay: Arc<BroadcastRelay>,
    expiry: Duration,
    next_generation: AtomicU64,
}

/// Per-user typing state keyed by contact email.
///
/// Each run owns exactly one expiry timer. Whoever removes the run from the
/// map (explicit stop, expiry, or connection release) emits the single idle
/// notice; a timer that lost the race finds a newer generation or no run.
#[derive(Debug, Clone)]
pub struct TypingAggregator {
    inner: Arc<Inner>,
}

impl TypingAggregator {
    pub fn new(relay: Arc<BroadcastRelay>) -> Self {
        Self {
            inner: Arc::new(Inner {
                runs: Mutex::new(HashMap::new()),
                relay,
                expiry: TYPING_EXPIRY,
                next_generation: AtomicU64::new(0),
            }),
        }
    }

    pub async fn signal(
        &self,
        origin: ConnectionId,
        sender: Option<UserProfile>,
        is_typing: bool,
    ) -> TypingTransition {
        // Without an email there is nothing to key a run on.
        let sender = match sender {
            Some(sender) if !sender.email.trim().is_empty() => sender,
            sender => {
                self.inner.relay.broadcast_typing(sender, is_typing, origin).await;
                return TypingTransition::Untracked;
            }
        };

        let mut runs = self.inner.runs.lock().await;
        let key = sender.email.clone();

        if is_typing {
            let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
            let run = TypingRun {
                generation,
                sender: sender.clone(),
                origin,
                timer: self.arm(key.clone(), generation),
            };
            let transition = match runs.insert(key, run) {
                Some(previous) => {
                    previous.timer.abort();
                    TypingTransition::Refreshed
                }
                None => TypingTransition::Started,
            };
            self.inner.relay.broadcast_typing(Some(sender), true, origin).await;
            transition
        } else {
            match runs.remove(&key) {
                Some(run) => {
                    run.timer.abort();
                    self.inner.relay.broadcast_typing(Some(sender), false, origin).await;
                    TypingTransition::Stopped
                }
                None => TypingTransition::Absorbed,
            }
        }
    }

    /// Ends every run whose latest signal came from `origin`.
    pub async fn release_connection(&self, origin: ConnectionId) -> usize {
        let mut runs = self.inner.runs.lock().await;
        let keys: Vec<String> = runs
            .iter()
            .filter(|(_, run)| run.origin == origin)
            .map(|(key, _)| key.clone())
            .collect();

        for key in keys.iter() {
            if let Some(run) = runs.remove(key) {
                run.timer.abort();
                self.inner
                    .relay
                    .broadcast_typing(Some(run.sender), false, origin)
                    .await;
            }
        }
        keys.len()
    }

    pub async fn is_typing(&self, email: &str) -> bool {
        self.inner.runs.lock().await.contains_key(email)
    }

    pub async fn active_count(&self) -> usize {
        self.inner.runs.lock().await.len()
    }

    fn arm(&self, key: String, generation: u64) -> JoinHandle<()> {
        let inner = Arc::downgrade(&self.inner);
        let expiry = self.inner.expiry;
        tokio::spawn(async move {
            tokio::time::sleep(expiry).await;
            expire(inner, key, generation).await;
        })
    }
}

async fn expire(inner: Weak<Inner>, key: String, generation: u64) {
    let Some(inner) = inner.upgrade() else {
        return;
    };

    let mut runs = inner.runs.lock().await;
    if runs.get(&key).map(|run| run.generation) != Some(generation) {
        return;
    }
    if let Some(run) = runs.remove(&key) {
        debug!("Typing expired for {}", key);
        inner
            .relay
            .broadcast_typing(Some(run.sender), false, run.origin)
            .await;
    }
}
