//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, applying environment overrides,
//! validating all parameters, and providing clear error messages for
//! misconfiguration.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use super::{AppConfig, BinanceMode, StoreBackend, StreamConfig};

/// Longest look-ahead the NBA poller accepts.
pub const MAX_LOOKAHEAD_DAYS: u32 = 14;

/// Load and validate configuration from a TOML file.
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - Validation rules are violated
pub fn load_config(path: &str) -> Result<AppConfig> {
  let path = Path::new(path);

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let mut config: AppConfig = toml::from_str(&content)
    .with_context(|| format!("Failed to parse {}", path.display()))?;

  apply_env_overrides(&mut config, |key| std::env::var(key).ok());
  validate_config(&config)?;

  info!(
    backend = ?config.database.backend,
    binance = config.binance.stream.enabled,
    bybit = config.bybit.enabled,
    okx = config.okx.enabled,
    nba = config.nba.enabled,
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Parse and validate configuration text, without environment overrides.
pub fn parse_config(content: &str) -> Result<AppConfig> {
  let config: AppConfig =
    toml::from_str(content).context("Failed to parse configuration")?;
  validate_config(&config)?;
  Ok(config)
}

/// Replace secrets with values from the environment when set.
///
/// - `DATABASE_URL` → `database.url`
/// - `SPORTRADAR_API_KEY` → `nba.api_key`
pub fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F)
where
  F: Fn(&str) -> Option<String>,
{
  if let Some(url) = lookup("DATABASE_URL").filter(|v| !v.is_empty()) {
    config.database.url = url;
  }
  if let Some(key) = lookup("SPORTRADAR_API_KEY").filter(|v| !v.is_empty()) {
    config.nba.api_key = key;
  }
}

/// Validate all configuration parameters.
pub fn validate_config(config: &AppConfig) -> Result<()> {
  anyhow::ensure!(
    !config.service.name.is_empty(),
    "service.name must not be empty"
  );

  // Database validation
  if config.database.backend == StoreBackend::Postgres {
    anyhow::ensure!(
      !config.database.url.is_empty(),
      "database.url (or DATABASE_URL) is required for the postgres backend"
    );
  }
  anyhow::ensure!(
    config.database.max_connections > 0,
    "database.max_connections must be positive"
  );
  anyhow::ensure!(
    config.database.upsert_timeout_secs > 0,
    "database.upsert_timeout_secs must be positive"
  );

  anyhow::ensure!(
    !config.catalog.language_guid.is_empty(),
    "catalog.language_guid must not be empty"
  );

  // Exchange validation
  let binance = &config.binance;
  let streams = [
    ("binance", &binance.stream),
    ("bybit", &config.bybit),
    ("okx", &config.okx),
  ];
  for (name, stream) in streams {
    if stream.enabled {
      validate_stream(name, stream)?;
      anyhow::ensure!(
        !config.catalog.crypto_category_guid.is_empty(),
        "catalog.crypto_category_guid is required when {name} is enabled"
      );
    }
  }

  if binance.stream.enabled
    && (binance.mode == BinanceMode::Rest || binance.rest_fallback)
  {
    anyhow::ensure!(
      binance.api_url.starts_with("http://")
        || binance.api_url.starts_with("https://"),
      "binance.api_url must be an http(s) URL, got {:?}",
      binance.api_url
    );
    anyhow::ensure!(
      binance.rest_poll_interval_secs > 0 && binance.rest_timeout_secs > 0,
      "binance REST interval and timeout must be positive"
    );
  }

  // NBA validation
  let nba = &config.nba;
  if nba.enabled {
    anyhow::ensure!(
      !nba.api_key.is_empty(),
      "nba.api_key (or SPORTRADAR_API_KEY) is required when nba is enabled"
    );
    anyhow::ensure!(
      !nba.ecosystem_guid.is_empty(),
      "nba.ecosystem_guid must not be empty"
    );
    anyhow::ensure!(
      !config.catalog.sport_category_guid.is_empty(),
      "catalog.sport_category_guid is required when nba is enabled"
    );
    anyhow::ensure!(
      nba.poll_interval_secs > 0 && nba.timeout_secs > 0,
      "nba poll interval and timeout must be positive"
    );
    anyhow::ensure!(
      nba.lookahead_days <= MAX_LOOKAHEAD_DAYS,
      "nba.lookahead_days must be at most {MAX_LOOKAHEAD_DAYS}, got {}",
      nba.lookahead_days
    );
  }

  Ok(())
}

fn validate_stream(name: &str, stream: &StreamConfig) -> Result<()> {
  anyhow::ensure!(
    !stream.symbols.is_empty(),
    "{name}.symbols must not be empty"
  );
  anyhow::ensure!(
    stream.ws_url.starts_with("ws://") || stream.ws_url.starts_with("wss://"),
    "{name}.ws_url must be a ws(s) URL, got {:?}",
    stream.ws_url
  );
  anyhow::ensure!(
    !stream.ecosystem_guid.is_empty(),
    "{name}.ecosystem_guid must not be empty"
  );
  anyhow::ensure!(
    stream.heartbeat_secs > 0 && stream.idle_timeout_secs > stream.heartbeat_secs,
    "{name}: idle_timeout_secs ({}) must exceed heartbeat_secs ({})",
    stream.idle_timeout_secs,
    stream.heartbeat_secs
  );
  anyhow::ensure!(
    stream.handshake_timeout_secs > 0 && stream.subscribe_timeout_secs > 0,
    "{name}: handshake and subscribe timeouts must be positive"
  );
  anyhow::ensure!(
    stream.reconnect_initial_ms > 0
      && stream.reconnect_max_ms >= stream.reconnect_initial_ms,
    "{name}: reconnect delays must satisfy 0 < initial <= max"
  );
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  const SAMPLE: &str = r#"
    [service]
    name = "event-pod-crawler"

    [database]
    backend = "memory"

    [catalog]
    language_guid = "lang-en"
    crypto_category_guid = "cat-crypto"
    sport_category_guid = "cat-sports"

    [binance]
    symbols = ["BTCUSDT", "ETHUSDT"]
    ws_url = "wss://stream.binance.com:9443/stream"
    ecosystem_guid = "eco-binance"

    [bybit]
    symbols = ["BTCUSDT"]
    ws_url = "wss://stream.bybit.com/v5/public/spot"
    ecosystem_guid = "eco-bybit"

    [okx]
    enabled = false

    [nba]
    enabled = true
    api_key = "from-file"
    ecosystem_guid = "eco-nba"
    lookahead_days = 2

    [metrics]
    enabled = false
  "#;

  #[test]
  fn test_load_nonexistent_file() {
    let result = load_config("nonexistent.toml");
    assert!(result.is_err());
  }

  #[test]
  fn test_parse_applies_defaults() {
    let config = parse_config(SAMPLE).unwrap();

    assert_eq!(config.service.log_level, "info");
    assert_eq!(config.database.backend, StoreBackend::Memory);
    assert_eq!(config.database.upsert_timeout_secs, 15);
    assert_eq!(config.binance.mode, BinanceMode::Stream);
    assert!(config.binance.rest_fallback);
    assert_eq!(config.binance.rest_poll_interval_secs, 30);
    assert_eq!(config.binance.stream.heartbeat_secs, 20);
    assert_eq!(config.bybit.reconnect_initial_ms, 5_000);
    assert_eq!(config.bybit.reconnect_max_ms, 60_000);
    assert!(!config.okx.enabled);
    assert_eq!(config.nba.access_level, "trial");
    assert_eq!(config.nba.poll_interval_secs, 300);
    assert_eq!(config.metrics.health_port, 8080);
  }

  #[test]
  fn test_env_overrides_secrets() {
    let mut config = parse_config(SAMPLE).unwrap();
    apply_env_overrides(&mut config, |key| match key {
      "DATABASE_URL" => Some("postgres://crawler@localhost/events".into()),
      "SPORTRADAR_API_KEY" => Some("from-env".into()),
      _ => None,
    });

    assert_eq!(config.database.url, "postgres://crawler@localhost/events");
    assert_eq!(config.nba.api_key, "from-env");

    apply_env_overrides(&mut config, |_| Some(String::new()));
    assert_eq!(config.nba.api_key, "from-env");
  }

  #[test]
  fn test_rejects_invalid_settings() {
    let postgres_without_url =
      SAMPLE.replace(r#"backend = "memory""#, r#"backend = "postgres""#);
    assert!(parse_config(&postgres_without_url).is_err());

    let http_stream = SAMPLE.replace("wss://stream.bybit.com", "https://stream.bybit.com");
    assert!(parse_config(&http_stream).is_err());

    let far_lookahead = SAMPLE.replace("lookahead_days = 2", "lookahead_days = 30");
    assert!(parse_config(&far_lookahead).is_err());

    let no_key = SAMPLE.replace(r#"api_key = "from-file""#, "");
    assert!(parse_config(&no_key).is_err());
  }
}
