//! Event Upsert Use Case - One Transaction per Observation
//!
//! Applies a normalized `EventUpsert` to the store:
//! 1. Get-or-create the event period by code
//! 2. Get-or-create home/away team groups (sports only)
//! 3. Update the event if its external id exists, else create and re-read it
//! 4. Update the localized title, or create the language row
//! 5. Commit
//!
//! Any error rolls the whole transaction back. A unique-key collision on
//! a period or team insert means a concurrent upsert created the row
//! first; it is re-read and the upsert continues. Each call runs under a
//! deadline so a wedged store cannot stall a feed's read loop forever.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, instrument, warn};

use crate::domain::event::{
  EventPatch, EventPeriod, NO_TEAM, NewEvent, NewEventLanguage, NewEventPeriod,
  NewTeamGroup, NewTeamGroupLanguage, TeamGroup,
};
use crate::domain::game::TeamRef;
use crate::domain::upsert::{EventUpsert, PeriodSpec, TeamPair};
use crate::ports::event_sink::{EventSink, UpsertError, UpsertOutcome};
use crate::ports::event_store::{EventStore, StoreTx};

/// Shared upsert protocol used by every adapter.
pub struct EventUpsertService {
  store: Arc<dyn EventStore>,
  /// Budget for one whole transaction.
  timeout: Duration,
}

impl EventUpsertService {
  pub fn new(store: Arc<dyn EventStore>, timeout: Duration) -> Self {
    Self { store, timeout }
  }

  async fn apply(
    &self,
    upsert: &EventUpsert,
  ) -> Result<UpsertOutcome, UpsertError> {
    let mut tx = self.store.begin().await?;

    let period = resolve_period(tx.as_mut(), &upsert.period).await?;

    let teams = match &upsert.teams {
      Some(pair) => Some(
        resolve_teams(tx.as_mut(), pair, &upsert.identity.language_guid)
          .await?,
      ),
      None => None,
    };

    let outcome = match tx.event_by_external_id(&upsert.external_id).await? {
      Some(existing) => {
        let patch = EventPatch {
          event_period_guid: period.guid.clone(),
          main_score: upsert.main_score.clone(),
          cluster_score: upsert.cluster_score.clone(),
          is_live: upsert.live,
          stage: upsert.stage.clone(),
          info: upsert.info.clone(),
          main_team_group_guid: teams.as_ref().map(|(home, _)| home.guid.clone()),
          cluster_team_group_guid: teams
            .as_ref()
            .map(|(_, away)| away.guid.clone()),
          is_online: upsert.online,
          updated_at: upsert.observed_at,
        };
        tx.update_event_fields(&existing.guid, &patch).await?;
        UpsertOutcome::Updated {
          guid: existing.guid,
        }
      }
      None => {
        let (home, away) = teams.as_ref().map_or_else(
          || (NO_TEAM.to_string(), NO_TEAM.to_string()),
          |(home, away)| (home.guid.clone(), away.guid.clone()),
        );
        let event = NewEvent {
          external_id: upsert.external_id.clone(),
          category_guid: upsert.identity.category_guid.clone(),
          ecosystem_guid: upsert.identity.ecosystem_guid.clone(),
          event_period_guid: period.guid.clone(),
          main_team_group_guid: home,
          cluster_team_group_guid: away,
          main_score: upsert.main_score.clone(),
          cluster_score: upsert.cluster_score.clone(),
          info: upsert.info.clone(),
          is_online: upsert.online.unwrap_or(false),
          is_live: upsert.live,
          is_sports: upsert.is_sports,
          stage: upsert.stage.clone(),
          created_at: upsert.observed_at,
        };
        tx.create_event(&event).await?;

        let created = tx
          .event_by_external_id(&upsert.external_id)
          .await?
          .ok_or_else(|| UpsertError::MissingAfterInsert {
            entity: "event",
            key: upsert.external_id.clone(),
          })?;
        UpsertOutcome::Created { guid: created.guid }
      }
    };

    let language_guid = &upsert.identity.language_guid;
    match tx.event_language(outcome.guid(), language_guid).await? {
      Some(language) => {
        if language.title != upsert.title {
          tx.update_event_language_title(&language.guid, &upsert.title)
            .await?;
        }
      }
      None => {
        tx.create_event_language(&NewEventLanguage {
          event_guid: outcome.guid().to_string(),
          language_guid: language_guid.clone(),
          title: upsert.title.clone(),
          rules: upsert.rules.clone(),
        })
        .await?;
      }
    }

    tx.commit().await?;
    Ok(outcome)
  }
}

#[async_trait]
impl EventSink for EventUpsertService {
  #[instrument(skip(self, upsert), fields(external_id = %upsert.external_id))]
  async fn upsert_event(
    &self,
    upsert: &EventUpsert,
  ) -> Result<UpsertOutcome, UpsertError> {
    match tokio::time::timeout(self.timeout, self.apply(upsert)).await {
      Ok(result) => result,
      Err(_) => {
        warn!(
          timeout_ms = self.timeout.as_millis(),
          "Adapter stuck on store, upsert abandoned"
        );
        Err(UpsertError::TimedOut {
          external_id: upsert.external_id.clone(),
          after: self.timeout,
        })
      }
    }
  }
}

/// Get-or-create the period, tolerating a concurrent creator.
pub(crate) async fn resolve_period(
  tx: &mut dyn StoreTx,
  spec: &PeriodSpec,
) -> Result<EventPeriod, UpsertError> {
  if let Some(period) = tx.event_period_by_code(&spec.code).await? {
    return Ok(period);
  }

  let period = NewEventPeriod {
    code: spec.code.clone(),
    is_active: true,
    scheduled: spec.scheduled.clone(),
    remark: spec.remark.clone(),
    extra: json!({}),
  };
  match tx.create_event_period(&period).await {
    Ok(()) => {}
    Err(e) if e.is_duplicate() => {
      debug!(code = %spec.code, "Event period created concurrently, re-reading");
    }
    Err(e) => return Err(e.into()),
  }

  tx.event_period_by_code(&spec.code)
    .await?
    .ok_or_else(|| UpsertError::MissingAfterInsert {
      entity: "event period",
      key: spec.code.clone(),
    })
}

async fn resolve_teams(
  tx: &mut dyn StoreTx,
  pair: &TeamPair,
  language_guid: &str,
) -> Result<(TeamGroup, TeamGroup), UpsertError> {
  let home = resolve_team(tx, &pair.home, &pair.ecosystem_guid, language_guid)
    .await?;
  let away = resolve_team(tx, &pair.away, &pair.ecosystem_guid, language_guid)
    .await?;
  Ok((home, away))
}

/// Get-or-create one team and, when created here, its localized name.
async fn resolve_team(
  tx: &mut dyn StoreTx,
  team: &TeamRef,
  ecosystem_guid: &str,
  language_guid: &str,
) -> Result<TeamGroup, UpsertError> {
  if let Some(existing) = tx
    .team_group_by_external_id(&team.external_id, ecosystem_guid)
    .await?
  {
    return Ok(existing);
  }

  let created_here = match tx
    .create_team_group(&NewTeamGroup {
      ecosystem_guid: ecosystem_guid.to_string(),
      external_id: team.external_id.clone(),
      logo: team.logo_url(),
    })
    .await
  {
    Ok(()) => true,
    Err(e) if e.is_duplicate() => {
      debug!(team = %team.external_id, "Team group created concurrently, re-reading");
      false
    }
    Err(e) => return Err(e.into()),
  };

  let group = tx
    .team_group_by_external_id(&team.external_id, ecosystem_guid)
    .await?
    .ok_or_else(|| UpsertError::MissingAfterInsert {
      entity: "team group",
      key: team.external_id.clone(),
    })?;

  if created_here {
    tx.create_team_group_language(&NewTeamGroupLanguage {
      team_group_guid: group.guid.clone(),
      language_guid: language_guid.to_string(),
      name: team.name.clone(),
      alias: team.alias.clone(),
    })
    .await?;
  }

  Ok(group)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::adapters::persistence::MemoryStore;
  use crate::domain::event::{
    Event, EventLanguage, LiveState, NewEvent as NewEventRow,
  };
  use crate::domain::game::{GameStatus, GameUpdate, Season};
  use crate::domain::tick::{Exchange, PriceTick};
  use crate::domain::upsert::FeedIdentity;
  use crate::ports::event_store::StoreError;
  use chrono::{TimeZone, Utc};

  fn crypto_identity() -> FeedIdentity {
    FeedIdentity {
      category_guid: "crypto".into(),
      ecosystem_guid: "binance".into(),
      language_guid: "en".into(),
    }
  }

  fn service(store: &MemoryStore) -> EventUpsertService {
    EventUpsertService::new(Arc::new(store.clone()), Duration::from_secs(5))
  }

  fn tick_upsert(symbol: &str, price: &str) -> EventUpsert {
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    let tick = PriceTick::new(symbol, price).unwrap();
    EventUpsert::for_price_tick(Exchange::Binance, crypto_identity(), &tick, now)
  }

  fn game(status: GameStatus, home: Option<i64>, away: Option<i64>) -> EventUpsert {
    let game = GameUpdate {
      game_id: "0f3a".into(),
      status,
      raw_status: format!("{status:?}").to_lowercase(),
      scheduled: "2024-01-15T00:30:00+00:00".into(),
      home: TeamRef {
        external_id: "bos".into(),
        name: "Boston Celtics".into(),
        alias: "BOS".into(),
      },
      away: TeamRef {
        external_id: "mia".into(),
        name: "Miami Heat".into(),
        alias: "MIA".into(),
      },
      home_points: home,
      away_points: away,
      season: Season {
        id: "s".into(),
        year: 2023,
        kind: "REG".into(),
      },
      details: json!({}),
    };
    let identity = FeedIdentity {
      category_guid: "sport".into(),
      ecosystem_guid: "nba".into(),
      language_guid: "en".into(),
    };
    EventUpsert::for_game(identity, "nba", &game, Utc::now())
  }

  #[tokio::test]
  async fn test_new_crypto_event_is_created_with_all_rows() {
    let store = MemoryStore::new();
    let service = service(&store);

    let outcome = service
      .upsert_event(&tick_upsert("BTCUSDT", "65000.50"))
      .await
      .unwrap();
    assert!(matches!(outcome, UpsertOutcome::Created { .. }));

    let events = store.events().await;
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.external_id, "BINANCE_BTCUSDT");
    assert_eq!(event.main_score, "65000.50");
    assert_eq!(event.is_live, LiveState::Live);
    assert_eq!(event.stage, "LIVE");
    assert!(!event.is_online);
    assert!(!event.is_sports);
    assert_eq!(event.main_team_group_guid, NO_TEAM);

    let periods = store.event_periods().await;
    assert_eq!(periods.len(), 1);
    assert_eq!(periods[0].code, "CRYPTO_BINANCE__2024-06-01");
    assert_eq!(event.event_period_guid, periods[0].guid);

    let languages = store.event_languages().await;
    assert_eq!(languages.len(), 1);
    assert_eq!(languages[0].title, "BTCUSDT Price");
    assert_eq!(languages[0].event_guid, event.guid);
  }

  #[tokio::test]
  async fn test_repeated_upsert_is_idempotent() {
    let store = MemoryStore::new();
    let service = service(&store);
    let upsert = tick_upsert("BTCUSDT", "65000.50");

    let first = service.upsert_event(&upsert).await.unwrap();
    let second = service.upsert_event(&upsert).await.unwrap();

    assert!(matches!(second, UpsertOutcome::Updated { .. }));
    assert_eq!(first.guid(), second.guid());
    assert_eq!(store.events().await.len(), 1);
    assert_eq!(store.event_languages().await.len(), 1);
    assert_eq!(store.event_periods().await.len(), 1);
  }

  #[tokio::test]
  async fn test_symbols_share_the_daily_period() {
    let store = MemoryStore::new();
    let service = service(&store);

    service.upsert_event(&tick_upsert("BTCUSDT", "1")).await.unwrap();
    service.upsert_event(&tick_upsert("ETHUSDT", "2")).await.unwrap();
    service.upsert_event(&tick_upsert("BTCUSDT", "3")).await.unwrap();

    let events = store.events().await;
    assert_eq!(events.len(), 2);
    assert_eq!(store.event_periods().await.len(), 1);
    assert!(events.iter().all(|e| e.event_period_guid == events[0].event_period_guid));
    let btc = events.iter().find(|e| e.external_id == "BINANCE_BTCUSDT").unwrap();
    assert_eq!(btc.main_score, "3");
  }

  #[tokio::test]
  async fn test_sports_lifecycle_transitions() {
    let store = MemoryStore::new();
    let service = service(&store);

    service
      .upsert_event(&game(GameStatus::Scheduled, None, None))
      .await
      .unwrap();
    let event = store.events().await.remove(0);
    assert_eq!(event.is_live, LiveState::Upcoming);
    assert_eq!(event.stage, "Q1");
    assert!(!event.is_online);
    assert!(event.is_sports);
    assert_eq!(event.main_score, "0");

    service
      .upsert_event(&game(GameStatus::InProgress, Some(54), Some(50)))
      .await
      .unwrap();
    let event = store.events().await.remove(0);
    assert_eq!(event.is_live, LiveState::Live);
    assert!(!event.is_online);
    assert_eq!(event.main_score, "54");

    service
      .upsert_event(&game(GameStatus::Closed, Some(110), Some(102)))
      .await
      .unwrap();
    let event = store.events().await.remove(0);
    assert_eq!(event.is_live, LiveState::Finished);
    assert_eq!(event.stage, "FT");
    assert!(event.is_online);
    assert_eq!(event.cluster_score, "102");

    let teams = store.team_groups().await;
    assert_eq!(teams.len(), 2);
    assert_eq!(store.team_group_languages().await.len(), 2);
    assert_eq!(store.events().await.len(), 1);
    let home = teams.iter().find(|t| t.external_id == "bos").unwrap();
    assert_eq!(event.main_team_group_guid, home.guid);
    assert_eq!(home.logo, "https://cdn.sportradar.com/images/nba/teams/bos.png");
  }

  /// Store whose first period lookup misses while another writer commits it.
  struct RacingStore {
    inner: MemoryStore,
  }

  struct RacingTx {
    inner: Box<dyn StoreTx>,
    rival: MemoryStore,
    raced: bool,
  }

  #[async_trait]
  impl EventStore for RacingStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
      Ok(Box::new(RacingTx {
        inner: self.inner.begin().await?,
        rival: self.inner.clone(),
        raced: false,
      }))
    }

    async fn is_healthy(&self) -> bool {
      true
    }
  }

  #[async_trait]
  impl StoreTx for RacingTx {
    async fn event_period_by_code(
      &mut self,
      code: &str,
    ) -> Result<Option<EventPeriod>, StoreError> {
      if !self.raced {
        self.raced = true;
        let mut rival = self.rival.begin().await?;
        rival
          .create_event_period(&NewEventPeriod {
            code: code.to_string(),
            is_active: true,
            scheduled: "rival".into(),
            remark: "rival".into(),
            extra: json!({}),
          })
          .await?;
        rival.commit().await?;
        return Ok(None);
      }
      self.inner.event_period_by_code(code).await
    }

    async fn create_event_period(
      &mut self,
      period: &NewEventPeriod,
    ) -> Result<(), StoreError> {
      self.inner.create_event_period(period).await
    }

    async fn event_by_external_id(
      &mut self,
      external_id: &str,
    ) -> Result<Option<Event>, StoreError> {
      self.inner.event_by_external_id(external_id).await
    }

    async fn create_event(&mut self, event: &NewEventRow) -> Result<(), StoreError> {
      self.inner.create_event(event).await
    }

    async fn update_event_fields(
      &mut self,
      guid: &str,
      patch: &EventPatch,
    ) -> Result<(), StoreError> {
      self.inner.update_event_fields(guid, patch).await
    }

    async fn event_language(
      &mut self,
      event_guid: &str,
      language_guid: &str,
    ) -> Result<Option<EventLanguage>, StoreError> {
      self.inner.event_language(event_guid, language_guid).await
    }

    async fn create_event_language(
      &mut self,
      language: &NewEventLanguage,
    ) -> Result<(), StoreError> {
      self.inner.create_event_language(language).await
    }

    async fn update_event_language_title(
      &mut self,
      guid: &str,
      title: &str,
    ) -> Result<(), StoreError> {
      self.inner.update_event_language_title(guid, title).await
    }

    async fn team_group_by_external_id(
      &mut self,
      external_id: &str,
      ecosystem_guid: &str,
    ) -> Result<Option<TeamGroup>, StoreError> {
      self
        .inner
        .team_group_by_external_id(external_id, ecosystem_guid)
        .await
    }

    async fn create_team_group(
      &mut self,
      team: &NewTeamGroup,
    ) -> Result<(), StoreError> {
      self.inner.create_team_group(team).await
    }

    async fn create_team_group_language(
      &mut self,
      language: &NewTeamGroupLanguage,
    ) -> Result<(), StoreError> {
      self.inner.create_team_group_language(language).await
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
      self.inner.commit().await
    }
  }

  #[tokio::test]
  async fn test_concurrent_period_creation_is_recovered() {
    let store = MemoryStore::new();
    let racing = RacingStore {
      inner: store.clone(),
    };
    let service =
      EventUpsertService::new(Arc::new(racing), Duration::from_secs(5));

    let outcome = service
      .upsert_event(&tick_upsert("BTCUSDT", "10"))
      .await
      .unwrap();

    let periods = store.event_periods().await;
    assert_eq!(periods.len(), 1);
    assert_eq!(periods[0].remark, "rival");
    let events = store.events().await;
    assert_eq!(events[0].guid, outcome.guid());
    assert_eq!(events[0].event_period_guid, periods[0].guid);
  }

  struct StuckStore;

  #[async_trait]
  impl EventStore for StuckStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
      std::future::pending().await
    }

    async fn is_healthy(&self) -> bool {
      false
    }
  }

  #[tokio::test(start_paused = true)]
  async fn test_stuck_store_times_out() {
    let service =
      EventUpsertService::new(Arc::new(StuckStore), Duration::from_secs(15));

    let err = service
      .upsert_event(&tick_upsert("BTCUSDT", "10"))
      .await
      .unwrap_err();

    assert!(matches!(err, UpsertError::TimedOut { .. }));
  }
}
