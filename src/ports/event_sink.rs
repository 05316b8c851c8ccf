//! Event Sink Port - What Adapters Write To
//!
//! Feed and schedule adapters only ever see this trait. They hand over a
//! normalized `EventUpsert` and learn whether it created or refreshed an
//! event; the transaction, the timeout and the get-or-create handling
//! are the sink's concern.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::event_store::StoreError;
use crate::domain::upsert::EventUpsert;

/// Result of a successful upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
  Created { guid: String },
  Updated { guid: String },
}

impl UpsertOutcome {
  pub fn guid(&self) -> &str {
    match self {
      Self::Created { guid } | Self::Updated { guid } => guid,
    }
  }

  /// Metric label.
  pub const fn label(&self) -> &'static str {
    match self {
      Self::Created { .. } => "created",
      Self::Updated { .. } => "updated",
    }
  }
}

/// Why an upsert did not land. The transaction was rolled back in every case.
#[derive(Debug, Error)]
pub enum UpsertError {
  #[error(transparent)]
  Store(#[from] StoreError),

  /// The store did not finish within the configured budget.
  #[error("upsert of {external_id} timed out after {after:?}")]
  TimedOut { external_id: String, after: Duration },

  /// A row just inserted could not be read back.
  #[error("{entity} {key:?} missing after insert")]
  MissingAfterInsert { entity: &'static str, key: String },
}

/// Narrow write interface consumed by every adapter.
#[async_trait]
pub trait EventSink: Send + Sync + 'static {
  /// Create or refresh the event described by `upsert`.
  async fn upsert_event(
    &self,
    upsert: &EventUpsert,
  ) -> Result<UpsertOutcome, UpsertError>;
}
