//! WebSocket transport for the relay.
//!
//! Each connection gets a [`RelaySession`] actor that speaks the JSON
//! protocol and forwards events to the shared hub.

mod session;

use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use tracing::info;

use crate::AppState;

pub use session::RelaySession;

/// Upgrades `GET /ws` to a websocket and starts a session actor for it.
pub async fn websocket_route(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> std::result::Result<HttpResponse, Error> {
    let peer_addr = req
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    info!("New WebSocket connection request from: {}", peer_addr);

    ws::start(
        RelaySession::new(state.hub.clone(), peer_addr, &state.config.websocket),
        &req,
        stream,
    )
}
