//! JSON frames exchanged over the websocket.
//!
//! Every frame is `{ "type": ..., "payload": ... }`.

use serde::{Deserialize, Serialize};

use crate::relay::{ChatMessage, TypingNotice, UserProfile};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ClientMessage {
    #[serde(rename = "register")]
    Register(UserProfile),
    #[serde(rename = "message")]
    Message(String),
    #[serde(rename = "typing")]
    Typing(bool),
    #[serde(rename = "ping")]
    Ping,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerMessage {
    #[serde(rename = "message")]
    Message(ChatMessage),
    #[serde(rename = "typing")]
    Typing(TypingNotice),
    #[serde(rename = "onlineUsers")]
    OnlineUsers(Vec<UserProfile>),
    #[serde(rename = "error")]
    Error { message: String },
    #[serde(rename = "pong")]
    Pong,
}
