use std::sync::Arc;
use std::time::{Duration, Instant};

use actix::prelude::*;
use actix_web_actors::ws;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::WebSocketConfig;
use crate::error::WebSocketError;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::relay::{ConnectionId, RelayHub};

/// One websocket client, bridged onto the shared [`RelayHub`].
///
/// Client frames are applied to the hub one at a time, in arrival order.
/// Broadcasts reach the socket through the outbox stream added on start.
pub struct RelaySession {
    id: ConnectionId,
    hub: Arc<RelayHub>,
    peer_addr: String,
    last_heartbeat: Instant,
    heartbeat_interval: Duration,
    client_timeout: Duration,
}

impl RelaySession {
    pub fn new(hub: Arc<RelayHub>, peer_addr: String, config: &WebSocketConfig) -> Self {
        Self {
            id: ConnectionId::new(),
            hub,
            peer_addr,
            last_heartbeat: Instant::now(),
            heartbeat_interval: Duration::from_secs(config.heartbeat_interval_secs),
            client_timeout: Duration::from_secs(config.client_timeout_secs),
        }
    }

    fn handle_client_text(&mut self, text: &str, ctx: &mut <Self as Actor>::Context) {
        let client_msg = match serde_json::from_str::<ClientMessage>(text) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("Failed to parse message from {}: {}", self.peer_addr, e);
                self.send_error(ctx, WebSocketError::InvalidFormat(e.to_string()));
                return;
            }
        };

        let hub = self.hub.clone();
        let id = self.id;
        match client_msg {
            ClientMessage::Register(profile) => {
                ctx.wait(
                    async move {
                        hub.register(id, profile).await;
                    }
                    .into_actor(self),
                );
            }
            ClientMessage::Message(text) => {
                ctx.wait(
                    async move {
                        hub.post_message(id, &text).await;
                    }
                    .into_actor(self),
                );
            }
            ClientMessage::Typing(is_typing) => {
                ctx.wait(
                    async move {
                        hub.signal_typing(id, is_typing).await;
                    }
                    .into_actor(self),
                );
            }
            ClientMessage::Ping => {
                self.send_server_message(ctx, &ServerMessage::Pong);
            }
        }
    }

    fn send_server_message(&self, ctx: &mut <Self as Actor>::Context, msg: &ServerMessage) {
        match serde_json::to_string(msg) {
            Ok(json_str) => ctx.text(json_str),
            Err(e) => error!("Failed to serialize server message: {}", e),
        }
    }

    fn send_error(&self, ctx: &mut <Self as Actor>::Context, err: WebSocketError) {
        self.send_server_message(
            ctx,
            &ServerMessage::Error {
                message: err.to_string(),
            },
        );
    }

    fn start_heartbeat(&self, ctx: &mut <Self as Actor>::Context) {
        ctx.run_interval(self.heartbeat_interval, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > act.client_timeout {
                warn!("Heartbeat timeout for {} (id: {})", act.peer_addr, act.id);
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }
}

impl Actor for RelaySession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!("WebSocket connection established with {} (id: {})", self.peer_addr, self.id);

        let (tx, rx) = mpsc::unbounded_channel::<String>();
        let hub = self.hub.clone();
        let id = self.id;
        ctx.wait(
            async move {
                hub.admit_with_id(id, tx).await;
            }
            .into_actor(self),
        );

        ctx.add_stream(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|frame| (frame, rx))
        }));

        self.start_heartbeat(ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        info!("WebSocket connection closed with {} (id: {})", self.peer_addr, self.id);

        let hub = self.hub.clone();
        let id = self.id;
        actix_rt::spawn(async move {
            hub.disconnect(id).await;
        });
    }
}

/// Broadcast frames coming from the hub.
impl StreamHandler<String> for RelaySession {
    fn handle(&mut self, frame: String, ctx: &mut Self::Context) {
        ctx.text(frame);
    }

    fn finished(&mut self, ctx: &mut Self::Context) {
        debug!("Outbox closed for {}", self.id);
        ctx.stop();
    }
}

impl StreamHandler<std::result::Result<ws::Message, ws::ProtocolError>> for RelaySession {
    fn handle(&mut self, msg: std::result::Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.last_heartbeat = Instant::now();
                self.handle_client_text(&text, ctx);
            }
            Ok(ws::Message::Binary(bin)) => {
                debug!("Received binary message from {} of {} bytes", self.peer_addr, bin.len());
                self.send_error(ctx, WebSocketError::BinaryUnsupported);
            }
            Ok(ws::Message::Close(reason)) => {
                info!("WebSocket closed from {}: {:?}", self.peer_addr, reason);
                ctx.close(reason);
                ctx.stop();
            }
            Ok(_) => {}
            Err(e) => {
                error!("Error handling WebSocket message from {}: {}", self.peer_addr, e);
                ctx.stop();
            }
        }
    }
}
