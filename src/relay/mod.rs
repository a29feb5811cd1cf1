//! Presence and relay core.
//!
//! Transport-agnostic: sessions hand the hub an [`Outbox`] and feed it
//! client events; everything else happens in memory.

mod broadcast;
mod hub;
mod registry;
mod typing;
mod types;

pub use broadcast::{BroadcastRelay, Outbox};
pub use hub::{ConnectionState, RelayHub};
pub use registry::ConnectionRegistry;
pub use typing::{TypingAggregator, TypingTransition, TYPING_EXPIRY};
pub use types::{ChatMessage, ConnectionId, TypingNotice, UserProfile};
