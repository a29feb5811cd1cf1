pub mod config;
pub mod error;
pub mod protocol;
pub mod relay;
pub mod websocket;

use std::sync::Arc;
use actix_web::{web, HttpResponse};

pub use error::AppError;
pub type Result<T> = std::result::Result<T, AppError>;
pub use config::Settings;

pub use relay::{ConnectionId, RelayHub, UserProfile};

/// Health check endpoint handler
/// Returns server status, timestamp and live connection counts
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let connections = state.hub.connection_count().await;
    let online = state.hub.online_users().await.len();

    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "connections": connections,
        "online": online,
    }))
}

/// Registers the relay's HTTP and websocket routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/ws", web::get().to(websocket::websocket_route));
}

/// Application state shared across all workers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub hub: Arc<RelayHub>,
}

impl AppState {
    pub fn new(config: Settings) -> Self {
        Self {
            config: Arc::new(config),
            hub: Arc::new(RelayHub::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_state_clone() {
        let config = Settings::new_for_test().expect("Failed to load test config");
        let state = AppState::new(config);

        let cloned = state.clone();

        // Verify Arc references are shared
        assert!(Arc::ptr_eq(&state.config, &cloned.config));
        assert!(Arc::ptr_eq(&state.hub, &cloned.hub));
    }
}
