//! Configuration Module - TOML-based Crawler Configuration
//!
//! Loads and validates configuration from `config.toml`, with the
//! database URL and the Sportradar key overridable from the environment.
//! Catalog guids, endpoints and timings are all externalized here and
//! handed to the adapters as plain values at construction time.

pub mod loader;

use serde::Deserialize;

/// Top-level crawler configuration.
///
/// Loaded from `config.toml` at startup. All fields are validated
/// before any adapter is built.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  /// Service identity and logging.
  pub service: ServiceConfig,
  /// Event store backend.
  pub database: DatabaseConfig,
  /// Catalog guids the events are filed under.
  pub catalog: CatalogConfig,
  /// Binance stream and REST fallback.
  pub binance: BinanceConfig,
  /// Bybit stream.
  pub bybit: StreamConfig,
  /// OKX stream.
  pub okx: StreamConfig,
  /// Sportradar NBA poller.
  pub nba: NbaConfig,
  /// Metrics and monitoring.
  pub metrics: MetricsConfig,
}

/// Service identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
  /// Human-readable service name.
  pub name: String,
  /// Log level (trace, debug, info, warn, error).
  #[serde(default = "default_log_level")]
  pub log_level: String,
}

/// Event store backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
  /// In-process store, lost on exit.
  Memory,
  /// PostgreSQL via sqlx.
  Postgres,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
  #[serde(default = "default_backend")]
  pub backend: StoreBackend,
  /// Connection URL. Overridden by `DATABASE_URL`.
  #[serde(default)]
  pub url: String,
  /// Pool size.
  #[serde(default = "default_max_connections")]
  pub max_connections: u32,
  /// Deadline for one upsert transaction (seconds).
  #[serde(default = "default_upsert_timeout")]
  pub upsert_timeout_secs: u64,
}

/// Catalog guids shared by all adapters.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
  /// Language of event titles and team names.
  pub language_guid: String,
  /// Category of exchange price events.
  pub crypto_category_guid: String,
  /// Category of sports events.
  pub sport_category_guid: String,
}

/// One exchange WebSocket stream.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Trading pairs, e.g. "BTCUSDT".
  #[serde(default)]
  pub symbols: Vec<String>,
  /// WebSocket endpoint (ws:// or wss://).
  #[serde(default)]
  pub ws_url: String,
  /// Ecosystem guid of this exchange's events.
  #[serde(default)]
  pub ecosystem_guid: String,
  /// Heartbeat period (seconds).
  #[serde(default = "default_heartbeat")]
  pub heartbeat_secs: u64,
  /// Reconnect when no frame arrives for this long (seconds).
  #[serde(default = "default_idle_timeout")]
  pub idle_timeout_secs: u64,
  /// WebSocket handshake deadline (seconds).
  #[serde(default = "default_handshake_timeout")]
  pub handshake_timeout_secs: u64,
  /// Wait for subscription confirmations (seconds).
  #[serde(default = "default_subscribe_timeout")]
  pub subscribe_timeout_secs: u64,
  /// First reconnect delay (milliseconds).
  #[serde(default = "default_reconnect_initial")]
  pub reconnect_initial_ms: u64,
  /// Reconnect delay ceiling (milliseconds).
  #[serde(default = "default_reconnect_max")]
  pub reconnect_max_ms: u64,
}

/// How Binance prices are collected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinanceMode {
  /// WebSocket, with REST polling if the stream cannot start.
  #[default]
  Stream,
  /// REST polling only.
  Rest,
}

/// Binance configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BinanceConfig {
  #[serde(flatten)]
  pub stream: StreamConfig,
  #[serde(default)]
  pub mode: BinanceMode,
  /// REST API base, e.g. "https://api.binance.com/api/v3".
  #[serde(default = "default_binance_api_url")]
  pub api_url: String,
  /// Poll REST when the stream fails to start.
  #[serde(default = "default_true")]
  pub rest_fallback: bool,
  /// REST poll period (seconds).
  #[serde(default = "default_rest_poll_interval")]
  pub rest_poll_interval_secs: u64,
  /// REST request timeout (seconds).
  #[serde(default = "default_rest_timeout")]
  pub rest_timeout_secs: u64,
}

/// Sportradar NBA configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct NbaConfig {
  #[serde(default)]
  pub enabled: bool,
  /// Overridden by `SPORTRADAR_API_KEY`.
  #[serde(default)]
  pub api_key: String,
  /// "trial" or "production".
  #[serde(default = "default_access_level")]
  pub access_level: String,
  #[serde(default = "default_language_code")]
  pub language_code: String,
  #[serde(default = "default_sportradar_url")]
  pub base_url: String,
  /// Ecosystem guid of NBA events and teams.
  #[serde(default)]
  pub ecosystem_guid: String,
  /// Poll period (seconds).
  #[serde(default = "default_nba_poll_interval")]
  pub poll_interval_secs: u64,
  /// Days after today included in each sync.
  #[serde(default)]
  pub lookahead_days: u32,
  /// HTTP request timeout (seconds).
  #[serde(default = "default_timeout")]
  pub timeout_secs: u64,
}

/// Metrics and monitoring configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
  /// Enable Prometheus metrics export.
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Metrics server bind address.
  #[serde(default = "default_metrics_addr")]
  pub bind_address: String,
  /// Health check endpoint port.
  #[serde(default = "default_health_port")]
  pub health_port: u16,
}

// Default value functions for serde

fn default_log_level() -> String {
  "info".to_string()
}

fn default_true() -> bool {
  true
}

fn default_backend() -> StoreBackend {
  StoreBackend::Postgres
}

fn default_max_connections() -> u32 {
  10
}

fn default_upsert_timeout() -> u64 {
  15
}

fn default_heartbeat() -> u64 {
  20
}

fn default_idle_timeout() -> u64 {
  60
}

fn default_handshake_timeout() -> u64 {
  30
}

fn default_subscribe_timeout() -> u64 {
  10
}

fn default_reconnect_initial() -> u64 {
  5_000
}

fn default_reconnect_max() -> u64 {
  60_000
}

fn default_binance_api_url() -> String {
  "https://api.binance.com/api/v3".to_string()
}

fn default_rest_poll_interval() -> u64 {
  30
}

fn default_rest_timeout() -> u64 {
  90
}

fn default_access_level() -> String {
  "trial".to_string()
}

fn default_language_code() -> String {
  "en".to_string()
}

fn default_sportradar_url() -> String {
  "https://api.sportradar.com".to_string()
}

fn default_nba_poll_interval() -> u64 {
  300
}

fn default_timeout() -> u64 {
  30
}

fn default_metrics_addr() -> String {
  "0.0.0.0:9090".to_string()
}

fn default_health_port() -> u16 {
  8080
}
