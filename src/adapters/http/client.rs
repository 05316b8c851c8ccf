//! JSON HTTP Client - Provider REST Calls
//!
//! Thin wrapper over reqwest for the GET-and-decode calls the pollers
//! make. Failures are sorted into a `FetchError` so the retry helper
//! can tell transient faults from ones that will never succeed.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use super::retry::Retryable;
use crate::domain::tick::TickError;

/// Longest response body kept in a status error.
const MAX_ERROR_BODY: usize = 512;

/// Failure of one HTTP fetch.
#[derive(Debug, Error)]
pub enum FetchError {
  /// Connection, TLS or timeout failure.
  #[error("request failed: {0}")]
  Transport(#[from] reqwest::Error),

  /// Non-success status.
  #[error("HTTP {status}: {body}")]
  Status { status: StatusCode, body: String },

  /// Body was not the expected JSON.
  #[error("invalid response body: {0}")]
  Decode(#[from] serde_json::Error),

  /// Body decoded but a required value was empty.
  #[error("response has empty {0}")]
  MissingField(&'static str),

  /// Value present but unusable (e.g. a non-numeric price).
  #[error(transparent)]
  InvalidValue(#[from] TickError),
}

impl Retryable for FetchError {
  /// 4xx (except 429) is a client error and never retried.
  fn is_retryable(&self) -> bool {
    match self {
      Self::Status { status, .. } => {
        !status.is_client_error() || *status == StatusCode::TOO_MANY_REQUESTS
      }
      Self::Transport(_) | Self::Decode(_) | Self::MissingField(_) => true,
      Self::InvalidValue(_) => false,
    }
  }
}

/// HTTP client for provider JSON APIs.
#[derive(Debug, Clone)]
pub struct JsonClient {
  /// Underlying HTTP client.
  http: Client,
}

impl JsonClient {
  /// Create a client with a whole-request timeout.
  pub fn new(timeout: Duration) -> Result<Self> {
    let http = Client::builder()
      .timeout(timeout)
      .pool_max_idle_per_host(5)
      .build()
      .context("Failed to build HTTP client")?;

    Ok(Self { http })
  }

  /// GET `url` with extra `headers` and decode the JSON body.
  pub async fn get_json<T: DeserializeOwned>(
    &self,
    url: &str,
    headers: &[(&str, &str)],
  ) -> Result<T, FetchError> {
    let mut request = self.http.get(url).header(ACCEPT, "application/json");
    for (name, value) in headers {
      request = request.header(*name, *value);
    }

    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
      let mut body = response.text().await.unwrap_or_default();
      if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
          cut -= 1;
        }
        body.truncate(cut);
      }
      return Err(FetchError::Status { status, body });
    }

    let bytes = response.bytes().await?;
    debug!(status = %status, bytes = bytes.len(), "HTTP response received");
    Ok(serde_json::from_slice(&bytes)?)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn status(code: u16) -> FetchError {
    FetchError::Status {
      status: StatusCode::from_u16(code).unwrap(),
      body: String::new(),
    }
  }

  #[test]
  fn test_status_classification() {
    assert!(status(500).is_retryable());
    assert!(status(503).is_retryable());
    assert!(status(429).is_retryable());
    assert!(!status(400).is_retryable());
    assert!(!status(401).is_retryable());
    assert!(!status(404).is_retryable());
  }

  #[test]
  fn test_decode_errors_are_retryable() {
    let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
    assert!(FetchError::Decode(err).is_retryable());
  }
}
