use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

use crate::error::AppError;

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorsConfig {
    pub enabled: bool,
    pub allow_any_origin: bool,
    pub allowed_origins: Vec<String>,
    pub max_age: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebSocketConfig {
    pub heartbeat_interval_secs: u64,
    pub client_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub environment: String,
    pub server: ServerConfig,
    pub cors: CorsConfig,
    pub websocket: WebSocketConfig,
    pub logging: LoggingConfig,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Start with default values
            .set_default("environment", "development")?
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 4000)?
            .set_default("server.workers", num_cpus::get() as i64)?
            .set_default("cors.enabled", true)?
            .set_default("cors.allow_any_origin", true)?
            .set_default("cors.allowed_origins", Vec::<String>::new())?
            .set_default("cors.max_age", 3600)?
            .set_default("websocket.heartbeat_interval_secs", 30)?
            .set_default("websocket.client_timeout_secs", 40)?
            .set_default("logging.level", "info")?

            // Add in settings from the config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))

            // Add in settings from environment variables (with prefix "APP_")
            // E.g., `APP_SERVER__PORT=5001` would set `Settings.server.port`
            .add_source(
                Environment::with_prefix("app")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        s.try_deserialize()
    }

    /// Rejects combinations that would drop healthy clients.
    pub fn validate(&self) -> crate::Result<()> {
        if self.websocket.heartbeat_interval_secs == 0 {
            return Err(AppError::ValidationError(
                "websocket.heartbeat_interval_secs must be positive".to_string(),
            ));
        }
        if self.websocket.client_timeout_secs <= self.websocket.heartbeat_interval_secs {
            return Err(AppError::ValidationError(
                "websocket.client_timeout_secs must exceed the heartbeat interval".to_string(),
            ));
        }
        if self.cors.enabled && !self.cors.allow_any_origin && self.cors.allowed_origins.is_empty() {
            return Err(AppError::ValidationError(
                "cors.allowed_origins is empty while allow_any_origin is off".to_string(),
            ));
        }
        Ok(())
    }

    pub fn new_for_test() -> Result<Self, ConfigError> {
        Config::builder()
            .set_default("environment", "test")?
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 0)?
            .set_default("server.workers", 1)?
            .set_default("cors.enabled", true)?
            .set_default("cors.allow_any_origin", true)?
            .set_default("cors.allowed_origins", Vec::<String>::new())?
            .set_default("cors.max_age", 60)?
            .set_default("websocket.heartbeat_interval_secs", 5)?
            .set_default("websocket.client_timeout_secs", 10)?
            .set_default("logging.level", "debug")?
            .build()?
            .try_deserialize()
    }
}
