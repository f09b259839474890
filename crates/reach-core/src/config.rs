//! Application configuration
//!
//! Centralized configuration management using the `config` crate.
//! Values can come from config files and environment variables.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub gateway: GatewayConfig,
    pub dispatch: DispatchConfig,
}

/// HTTP server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Number of worker threads
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_workers() -> usize {
    num_cpus::get()
}

/// Database configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

/// Outbound message gateway configuration
#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    /// Provider API base URL
    pub base_url: String,

    /// Provider API key
    pub api_key: String,

    /// Provider API secret
    pub api_secret: String,

    /// Registered sender id (the "from" number for every send)
    pub sender_id: String,

    /// Business channel id required for brand (rich) messages
    pub business_channel_id: Option<String>,

    /// Per-request timeout in milliseconds
    #[serde(default = "default_gateway_timeout")]
    pub timeout_ms: u64,
}

fn default_gateway_timeout() -> u64 {
    10_000
}

/// Dispatch engine configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DispatchConfig {
    /// Maximum concurrent in-flight sends per campaign fan-out
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// Delay before the delivery status poll, in seconds
    #[serde(default = "default_poll_delay")]
    pub poll_delay_secs: u64,

    /// Free message credits granted per account per calendar month
    #[serde(default = "default_monthly_credits")]
    pub monthly_free_credits: i32,

    /// Daily test send cap per account
    #[serde(default = "default_test_send_limit")]
    pub test_send_daily_limit: i32,

    /// IANA timezone for the brand send window (store-local time)
    #[serde(default = "default_window_tz")]
    pub send_window_tz: String,
}

fn default_max_in_flight() -> usize {
    20
}

fn default_poll_delay() -> u64 {
    3
}

fn default_monthly_credits() -> i32 {
    30
}

fn default_test_send_limit() -> i32 {
    5
}

fn default_window_tz() -> String {
    "Asia/Seoul".to_string()
}

impl AppConfig {
    /// Load configuration from environment and optional config files
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("server.workers", num_cpus::get() as i64)?
            .set_default("database.max_connections", 10)?
            .set_default("gateway.timeout_ms", 10_000)?
            .set_default("dispatch.max_in_flight", 20)?
            .set_default("dispatch.poll_delay_secs", 3)?
            .set_default("dispatch.monthly_free_credits", 30)?
            .set_default("dispatch.test_send_daily_limit", 5)?
            .set_default("dispatch.send_window_tz", "Asia/Seoul")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(
                Environment::with_prefix("REACH")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get the server bind address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 20,
            poll_delay_secs: 3,
            monthly_free_credits: 30,
            test_send_daily_limit: 5,
            send_window_tz: "Asia/Seoul".to_string(),
        }
    }
}
