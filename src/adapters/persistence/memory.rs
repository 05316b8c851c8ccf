//! In-Memory Event Store - Transactional Store Without a Database
//!
//! Each transaction stages its writes privately and publishes them on
//! commit; reads see committed rows overlaid with the transaction's own
//! staged rows. Natural keys are unique: an insert colliding with a
//! committed or staged row fails with `Duplicate`, and commit re-checks
//! against rows other transactions committed in the meantime. Dropping
//! a transaction discards its staged writes.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::event::{
    Event, EventLanguage, EventPatch, EventPeriod, NewEvent, NewEventLanguage,
    NewEventPeriod, NewTeamGroup, NewTeamGroupLanguage, TeamGroup, TeamGroupLanguage,
};
use crate::ports::event_store::{EventStore, StoreError, StoreTx};

/// A row with a store guid and a unique natural key.
trait Row: Clone {
    const ENTITY: &'static str;
    fn guid(&self) -> &str;
    fn natural_key(&self) -> String;
}

impl Row for Event {
    const ENTITY: &'static str = "event";
    fn guid(&self) -> &str {
        &self.guid
    }
    fn natural_key(&self) -> String {
        self.external_id.clone()
    }
}

impl Row for EventLanguage {
    const ENTITY: &'static str = "event language";
    fn guid(&self) -> &str {
        &self.guid
    }
    fn natural_key(&self) -> String {
        language_key(&self.event_guid, &self.language_guid)
    }
}

impl Row for EventPeriod {
    const ENTITY: &'static str = "event period";
    fn guid(&self) -> &str {
        &self.guid
    }
    fn natural_key(&self) -> String {
        self.code.clone()
    }
}

impl Row for TeamGroup {
    const ENTITY: &'static str = "team group";
    fn guid(&self) -> &str {
        &self.guid
    }
    fn natural_key(&self) -> String {
        team_key(&self.external_id, &self.ecosystem_guid)
    }
}

impl Row for TeamGroupLanguage {
    const ENTITY: &'static str = "team group language";
    fn guid(&self) -> &str {
        &self.guid
    }
    fn natural_key(&self) -> String {
        language_key(&self.team_group_guid, &self.language_guid)
    }
}

fn language_key(owner_guid: &str, language_guid: &str) -> String {
    format!("{owner_guid}/{language_guid}")
}

fn team_key(external_id: &str, ecosystem_guid: &str) -> String {
    format!("{external_id}/{ecosystem_guid}")
}

fn new_guid() -> String {
    Uuid::new_v4().simple().to_string()
}

type Table<T> = HashMap<String, T>;

fn find<T: Row>(staged: &Table<T>, committed: &Table<T>, key: &str) -> Option<T> {
    staged
        .values()
        .find(|row| row.natural_key() == key)
        .or_else(|| {
            committed
                .values()
                .find(|row| row.natural_key() == key && !staged.contains_key(row.guid()))
        })
        .cloned()
}

fn find_by_guid<T: Row>(staged: &Table<T>, committed: &Table<T>, guid: &str) -> Option<T> {
    staged.get(guid).or_else(|| committed.get(guid)).cloned()
}

fn insert<T: Row>(staged: &mut Table<T>, committed: &Table<T>, row: T) -> Result<(), StoreError> {
    let key = row.natural_key();
    if find(staged, committed, &key).is_some() {
        return Err(StoreError::Duplicate {
            entity: T::ENTITY,
            key,
        });
    }
    staged.insert(row.guid().to_string(), row);
    Ok(())
}

/// First natural-key collision between new staged rows and committed rows.
fn conflict<T: Row>(staged: &Table<T>, committed: &Table<T>) -> Option<StoreError> {
    staged
        .values()
        .filter(|row| !committed.contains_key(row.guid()))
        .find_map(|row| {
            let key = row.natural_key();
            committed
                .values()
                .any(|c| c.natural_key() == key)
                .then(|| StoreError::Duplicate {
                    entity: T::ENTITY,
                    key,
                })
        })
}

fn sorted<T: Row>(table: &Table<T>) -> Vec<T> {
    let mut rows: Vec<T> = table.values().cloned().collect();
    rows.sort_by_key(|row| row.natural_key());
    rows
}

#[derive(Debug, Default)]
struct Tables {
    events: Table<Event>,
    event_languages: Table<EventLanguage>,
    event_periods: Table<EventPeriod>,
    team_groups: Table<TeamGroup>,
    team_group_languages: Table<TeamGroupLanguage>,
}

/// Process-local event store. Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    committed: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed events, ordered by external id.
    pub async fn events(&self) -> Vec<Event> {
        sorted(&self.committed.read().await.events)
    }

    pub async fn event_languages(&self) -> Vec<EventLanguage> {
        sorted(&self.committed.read().await.event_languages)
    }

    pub async fn event_periods(&self) -> Vec<EventPeriod> {
        sorted(&self.committed.read().await.event_periods)
    }

    pub async fn team_groups(&self) -> Vec<TeamGroup> {
        sorted(&self.committed.read().await.team_groups)
    }

    pub async fn team_group_languages(&self) -> Vec<TeamGroupLanguage> {
        sorted(&self.committed.read().await.team_group_languages)
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        Ok(Box::new(MemoryTx {
            committed: Arc::clone(&self.committed),
            staged: Tables::default(),
        }))
    }

    async fn is_healthy(&self) -> bool {
        true
    }
}

/// Open transaction over a [`MemoryStore`].
pub struct MemoryTx {
    committed: Arc<RwLock<Tables>>,
    staged: Tables,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn event_period_by_code(
        &mut self,
        code: &str,
    ) -> Result<Option<EventPeriod>, StoreError> {
        let committed = self.committed.read().await;
        Ok(find(&self.staged.event_periods, &committed.event_periods, code))
    }

    async fn create_event_period(&mut self, period: &NewEventPeriod) -> Result<(), StoreError> {
        let committed = self.committed.read().await;
        let row = EventPeriod {
            guid: new_guid(),
            code: period.code.clone(),
            is_active: period.is_active,
            scheduled: period.scheduled.clone(),
            remark: period.remark.clone(),
            extra: period.extra.clone(),
        };
        insert(&mut self.staged.event_periods, &committed.event_periods, row)
    }

    async fn event_by_external_id(
        &mut self,
        external_id: &str,
    ) -> Result<Option<Event>, StoreError> {
        let committed = self.committed.read().await;
        Ok(find(&self.staged.events, &committed.events, external_id))
    }

    async fn create_event(&mut self, event: &NewEvent) -> Result<(), StoreError> {
        let committed = self.committed.read().await;
        let row = Event {
            guid: new_guid(),
            external_id: event.external_id.clone(),
            category_guid: event.category_guid.clone(),
            ecosystem_guid: event.ecosystem_guid.clone(),
            event_period_guid: event.event_period_guid.clone(),
            main_team_group_guid: event.main_team_group_guid.clone(),
            cluster_team_group_guid: event.cluster_team_group_guid.clone(),
            main_score: event.main_score.clone(),
            cluster_score: event.cluster_score.clone(),
            info: event.info.clone(),
            is_online: event.is_online,
            is_live: event.is_live,
            is_sports: event.is_sports,
            stage: event.stage.clone(),
            created_at: event.created_at,
            updated_at: event.created_at,
        };
        insert(&mut self.staged.events, &committed.events, row)
    }

    async fn update_event_fields(&mut self, guid: &str, patch: &EventPatch) -> Result<(), StoreError> {
        let committed = self.committed.read().await;
        let mut event = find_by_guid(&self.staged.events, &committed.events, guid).ok_or_else(|| {
            StoreError::NotFound {
                entity: "event",
                key: guid.to_string(),
            }
        })?;
        patch.apply(&mut event);
        self.staged.events.insert(guid.to_string(), event);
        Ok(())
    }

    async fn event_language(
        &mut self,
        event_guid: &str,
        language_guid: &str,
    ) -> Result<Option<EventLanguage>, StoreError> {
        let committed = self.committed.read().await;
        Ok(find(
            &self.staged.event_languages,
            &committed.event_languages,
            &language_key(event_guid, language_guid),
        ))
    }

    async fn create_event_language(&mut self, language: &NewEventLanguage) -> Result<(), StoreError> {
        let committed = self.committed.read().await;
        let row = EventLanguage {
            guid: new_guid(),
            event_guid: language.event_guid.clone(),
            language_guid: language.language_guid.clone(),
            title: language.title.clone(),
            rules: language.rules.clone(),
        };
        insert(&mut self.staged.event_languages, &committed.event_languages, row)
    }

    async fn update_event_language_title(&mut self, guid: &str, title: &str) -> Result<(), StoreError> {
        let committed = self.committed.read().await;
        let mut language = find_by_guid(&self.staged.event_languages, &committed.event_languages, guid)
            .ok_or_else(|| StoreError::NotFound {
                entity: "event language",
                key: guid.to_string(),
            })?;
        language.title = title.to_string();
        self.staged.event_languages.insert(guid.to_string(), language);
        Ok(())
    }

    async fn team_group_by_external_id(
        &mut self,
        external_id: &str,
        ecosystem_guid: &str,
    ) -> Result<Option<TeamGroup>, StoreError> {
        let committed = self.committed.read().await;
        Ok(find(
            &self.staged.team_groups,
            &committed.team_groups,
            &team_key(external_id, ecosystem_guid),
        ))
    }

    async fn create_team_group(&mut self, team: &NewTeamGroup) -> Result<(), StoreError> {
        let committed = self.committed.read().await;
        let row = TeamGroup {
            guid: new_guid(),
            ecosystem_guid: team.ecosystem_guid.clone(),
            external_id: team.external_id.clone(),
            logo: team.logo.clone(),
        };
        insert(&mut self.staged.team_groups, &committed.team_groups, row)
    }

    async fn create_team_group_language(
        &mut self,
        language: &NewTeamGroupLanguage,
    ) -> Result<(), StoreError> {
        let committed = self.committed.read().await;
        let row = TeamGroupLanguage {
            guid: new_guid(),
            team_group_guid: language.team_group_guid.clone(),
            language_guid: language.language_guid.clone(),
            name: language.name.clone(),
            alias: language.alias.clone(),
        };
        insert(
            &mut self.staged.team_group_languages,
            &committed.team_group_languages,
            row,
        )
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let Self { committed, staged } = *self;
        let mut committed = committed.write().await;

        let collision = conflict(&staged.events, &committed.events)
            .or_else(|| conflict(&staged.event_languages, &committed.event_languages))
            .or_else(|| conflict(&staged.event_periods, &committed.event_periods))
            .or_else(|| conflict(&staged.team_groups, &committed.team_groups))
            .or_else(|| conflict(&staged.team_group_languages, &committed.team_group_languages));
        if let Some(err) = collision {
            return Err(err);
        }

        committed.events.extend(staged.events);
        committed.event_languages.extend(staged.event_languages);
        committed.event_periods.extend(staged.event_periods);
        committed.team_groups.extend(staged.team_groups);
        committed.team_group_languages.extend(staged.team_group_languages);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn period(code: &str) -> NewEventPeriod {
        NewEventPeriod {
            code: code.to_string(),
            is_active: true,
            scheduled: "2024-06-01 00:00:00".into(),
            remark: String::new(),
            extra: json!({}),
        }
    }

    #[tokio::test]
    async fn test_writes_are_private_until_commit() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.create_event_period(&period("P")).await.unwrap();

        assert!(tx.event_period_by_code("P").await.unwrap().is_some());
        assert!(store.event_periods().await.is_empty());

        tx.commit().await.unwrap();
        assert_eq!(store.event_periods().await.len(), 1);
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let store = MemoryStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            tx.create_event_period(&period("P")).await.unwrap();
        }
        assert!(store.event_periods().await.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_natural_key_is_rejected() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.create_event_period(&period("P")).await.unwrap();
        let err = tx.create_event_period(&period("P")).await.unwrap_err();
        assert!(err.is_duplicate());
    }

    #[tokio::test]
    async fn test_commit_detects_concurrent_insert() {
        let store = MemoryStore::new();
        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();

        first.create_event_period(&period("P")).await.unwrap();
        second.create_event_period(&period("P")).await.unwrap();

        first.commit().await.unwrap();
        let err = second.commit().await.unwrap_err();
        assert!(err.is_duplicate());
        assert_eq!(store.event_periods().await.len(), 1);
    }

    #[tokio::test]
    async fn test_update_of_unknown_event_fails() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let err = tx
            .update_event_language_title("missing", "title")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }
}
