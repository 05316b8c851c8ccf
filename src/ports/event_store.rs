//! Event Store Port - Transactional Persistence Interface
//!
//! The upsert protocol touches up to five tables and must do so
//! atomically, so the store hands out explicit transactions. Lookups
//! return `Ok(None)` when the natural key is absent; inserts report a
//! unique-key collision as `StoreError::Duplicate` so callers can
//! recover from a concurrent writer. A transaction dropped without
//! `commit` is rolled back.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::event::{
  Event, EventLanguage, EventPatch, EventPeriod, NewEvent, NewEventLanguage,
  NewEventPeriod, NewTeamGroup, NewTeamGroupLanguage, TeamGroup,
};

/// Errors surfaced by store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
  /// A row with the same natural key already exists.
  #[error("{entity} with key {key:?} already exists")]
  Duplicate { entity: &'static str, key: String },

  /// An update targeted a row that does not exist.
  #[error("{entity} with key {key:?} not found")]
  NotFound { entity: &'static str, key: String },

  /// Connection, protocol or driver failure.
  #[error("store backend failure: {0}")]
  Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
  pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Backend(Box::new(err))
  }

  pub const fn is_duplicate(&self) -> bool {
    matches!(self, Self::Duplicate { .. })
  }
}

/// Factory for transactions.
#[async_trait]
pub trait EventStore: Send + Sync + 'static {
  /// Open a new transaction.
  async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError>;

  /// Check if the backend is reachable.
  async fn is_healthy(&self) -> bool;
}

/// Operations available inside one transaction.
#[async_trait]
pub trait StoreTx: Send {
  async fn event_period_by_code(
    &mut self,
    code: &str,
  ) -> Result<Option<EventPeriod>, StoreError>;

  async fn create_event_period(
    &mut self,
    period: &NewEventPeriod,
  ) -> Result<(), StoreError>;

  async fn event_by_external_id(
    &mut self,
    external_id: &str,
  ) -> Result<Option<Event>, StoreError>;

  async fn create_event(&mut self, event: &NewEvent) -> Result<(), StoreError>;

  /// Rewrite the patched columns of event `guid`.
  async fn update_event_fields(
    &mut self,
    guid: &str,
    patch: &EventPatch,
  ) -> Result<(), StoreError>;

  async fn event_language(
    &mut self,
    event_guid: &str,
    language_guid: &str,
  ) -> Result<Option<EventLanguage>, StoreError>;

  async fn create_event_language(
    &mut self,
    language: &NewEventLanguage,
  ) -> Result<(), StoreError>;

  async fn update_event_language_title(
    &mut self,
    guid: &str,
    title: &str,
  ) -> Result<(), StoreError>;

  async fn team_group_by_external_id(
    &mut self,
    external_id: &str,
    ecosystem_guid: &str,
  ) -> Result<Option<TeamGroup>, StoreError>;

  async fn create_team_group(
    &mut self,
    team: &NewTeamGroup,
  ) -> Result<(), StoreError>;

  async fn create_team_group_language(
    &mut self,
    language: &NewTeamGroupLanguage,
  ) -> Result<(), StoreError>;

  /// Make every write of this transaction visible.
  async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
