//! PostgreSQL Event Store - sqlx-backed Implementation of `EventStore`
//!
//! Every `StoreTx` wraps one `sqlx::Transaction`; dropping it without
//! commit rolls back. Inserts use `ON CONFLICT DO NOTHING` so that a
//! natural-key collision leaves the transaction usable and surfaces as
//! `StoreError::Duplicate` (zero rows affected) instead of aborting it.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{Postgres, Transaction};
use tracing::info;

use super::schema;
use crate::domain::event::{
    Event, EventLanguage, EventPatch, EventPeriod, LiveState, NewEvent, NewEventLanguage,
    NewEventPeriod, NewTeamGroup, NewTeamGroupLanguage, TeamGroup,
};
use crate::ports::event_store::{EventStore, StoreError, StoreTx};

const UNIQUE_VIOLATION: &str = "23505";

/// Map a driver error, turning unique violations into `Duplicate`.
fn classify(err: sqlx::Error, entity: &'static str, key: &str) -> StoreError {
    let unique = err
        .as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == UNIQUE_VIOLATION);
    if unique {
        StoreError::Duplicate {
            entity,
            key: key.to_string(),
        }
    } else {
        StoreError::backend(err)
    }
}

fn inserted(rows: u64, entity: &'static str, key: &str) -> Result<(), StoreError> {
    if rows == 0 {
        return Err(StoreError::Duplicate {
            entity,
            key: key.to_string(),
        });
    }
    Ok(())
}

fn updated(rows: u64, entity: &'static str, key: &str) -> Result<(), StoreError> {
    if rows == 0 {
        return Err(StoreError::NotFound {
            entity,
            key: key.to_string(),
        });
    }
    Ok(())
}

#[derive(sqlx::FromRow)]
struct EventRow {
    guid: String,
    external_id: String,
    category_guid: String,
    ecosystem_guid: String,
    event_period_guid: String,
    main_team_group_guid: String,
    cluster_team_group_guid: String,
    main_score: String,
    cluster_score: String,
    info: Json<serde_json::Value>,
    is_online: bool,
    is_live: i16,
    is_sports: bool,
    stage: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<EventRow> for Event {
    fn from(row: EventRow) -> Self {
        Self {
            guid: row.guid,
            external_id: row.external_id,
            category_guid: row.category_guid,
            ecosystem_guid: row.ecosystem_guid,
            event_period_guid: row.event_period_guid,
            main_team_group_guid: row.main_team_group_guid,
            cluster_team_group_guid: row.cluster_team_group_guid,
            main_score: row.main_score,
            cluster_score: row.cluster_score,
            info: row.info.0,
            is_online: row.is_online,
            is_live: LiveState::from_i16(row.is_live),
            is_sports: row.is_sports,
            stage: row.stage,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct EventPeriodRow {
    guid: String,
    code: String,
    is_active: bool,
    scheduled: String,
    remark: String,
    extra: Json<serde_json::Value>,
}

impl From<EventPeriodRow> for EventPeriod {
    fn from(row: EventPeriodRow) -> Self {
        Self {
            guid: row.guid,
            code: row.code,
            is_active: row.is_active,
            scheduled: row.scheduled,
            remark: row.remark,
            extra: row.extra.0,
        }
    }
}

#[derive(sqlx::FromRow)]
struct EventLanguageRow {
    guid: String,
    event_guid: String,
    language_guid: String,
    title: String,
    rules: String,
}

impl From<EventLanguageRow> for EventLanguage {
    fn from(row: EventLanguageRow) -> Self {
        Self {
            guid: row.guid,
            event_guid: row.event_guid,
            language_guid: row.language_guid,
            title: row.title,
            rules: row.rules,
        }
    }
}

#[derive(sqlx::FromRow)]
struct TeamGroupRow {
    guid: String,
    ecosystem_guid: String,
    external_id: String,
    logo: String,
}

impl From<TeamGroupRow> for TeamGroup {
    fn from(row: TeamGroupRow) -> Self {
        Self {
            guid: row.guid,
            ecosystem_guid: row.ecosystem_guid,
            external_id: row.external_id,
            logo: row.logo,
        }
    }
}

/// Event store backed by a PostgreSQL connection pool.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect, then create any missing tables and indexes.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(url)
            .await
            .map_err(StoreError::backend)?;

        schema::ensure_schema(&pool)
            .await
            .map_err(StoreError::backend)?;

        info!(max_connections, "PostgreSQL event store connected");
        Ok(Self { pool })
    }

    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventStore for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let tx = self.pool.begin().await.map_err(StoreError::backend)?;
        Ok(Box::new(PostgresTx { tx }))
    }

    async fn is_healthy(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

/// One open database transaction.
pub struct PostgresTx {
    tx: Transaction<'static, Postgres>,
}

const EVENT_COLUMNS: &str = "guid, external_id, category_guid, ecosystem_guid, event_period_guid, \
     main_team_group_guid, cluster_team_group_guid, main_score::text AS main_score, \
     cluster_score::text AS cluster_score, info, is_online, is_live, is_sports, stage, \
     created_at, updated_at";

#[async_trait]
impl StoreTx for PostgresTx {
    async fn event_period_by_code(
        &mut self,
        code: &str,
    ) -> Result<Option<EventPeriod>, StoreError> {
        let row = sqlx::query_as::<_, EventPeriodRow>(
            "SELECT guid, code, is_active, scheduled, remark, extra FROM event_period WHERE code = $1",
        )
        .bind(code)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(StoreError::backend)?;
        Ok(row.map(Into::into))
    }

    async fn create_event_period(&mut self, period: &NewEventPeriod) -> Result<(), StoreError> {
        let result = sqlx::query(
            r"
            INSERT INTO event_period (code, is_active, scheduled, remark, extra)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (code) DO NOTHING
            ",
        )
        .bind(&period.code)
        .bind(period.is_active)
        .bind(&period.scheduled)
        .bind(&period.remark)
        .bind(Json(&period.extra))
        .execute(&mut *self.tx)
        .await
        .map_err(|e| classify(e, "event period", &period.code))?;
        inserted(result.rows_affected(), "event period", &period.code)
    }

    async fn event_by_external_id(
        &mut self,
        external_id: &str,
    ) -> Result<Option<Event>, StoreError> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM event WHERE external_id = $1");
        let row = sqlx::query_as::<_, EventRow>(&sql)
            .bind(external_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(StoreError::backend)?;
        Ok(row.map(Into::into))
    }

    async fn create_event(&mut self, event: &NewEvent) -> Result<(), StoreError> {
        let result = sqlx::query(
            r"
            INSERT INTO event (
                external_id, category_guid, ecosystem_guid, event_period_guid,
                main_team_group_guid, cluster_team_group_guid, main_score, cluster_score,
                info, is_online, is_live, is_sports, stage, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7::numeric, $8::numeric, $9, $10, $11, $12, $13, $14, $14)
            ON CONFLICT (external_id) DO NOTHING
            ",
        )
        .bind(&event.external_id)
        .bind(&event.category_guid)
        .bind(&event.ecosystem_guid)
        .bind(&event.event_period_guid)
        .bind(&event.main_team_group_guid)
        .bind(&event.cluster_team_group_guid)
        .bind(&event.main_score)
        .bind(&event.cluster_score)
        .bind(Json(&event.info))
        .bind(event.is_online)
        .bind(event.is_live.as_i16())
        .bind(event.is_sports)
        .bind(&event.stage)
        .bind(event.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| classify(e, "event", &event.external_id))?;
        inserted(result.rows_affected(), "event", &event.external_id)
    }

    async fn update_event_fields(&mut self, guid: &str, patch: &EventPatch) -> Result<(), StoreError> {
        let result = sqlx::query(
            r"
            UPDATE event SET
                event_period_guid = $2,
                main_score = $3::numeric,
                cluster_score = $4::numeric,
                is_live = $5,
                stage = $6,
                info = $7,
                main_team_group_guid = COALESCE($8, main_team_group_guid),
                cluster_team_group_guid = COALESCE($9, cluster_team_group_guid),
                is_online = COALESCE($10, is_online),
                updated_at = $11
            WHERE guid = $1
            ",
        )
        .bind(guid)
        .bind(&patch.event_period_guid)
        .bind(&patch.main_score)
        .bind(&patch.cluster_score)
        .bind(patch.is_live.as_i16())
        .bind(&patch.stage)
        .bind(Json(&patch.info))
        .bind(patch.main_team_group_guid.as_deref())
        .bind(patch.cluster_team_group_guid.as_deref())
        .bind(patch.is_online)
        .bind(patch.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(StoreError::backend)?;
        updated(result.rows_affected(), "event", guid)
    }

    async fn event_language(
        &mut self,
        event_guid: &str,
        language_guid: &str,
    ) -> Result<Option<EventLanguage>, StoreError> {
        let row = sqlx::query_as::<_, EventLanguageRow>(
            r"
            SELECT guid, event_guid, language_guid, title, rules
            FROM event_language
            WHERE event_guid = $1 AND language_guid = $2
            ",
        )
        .bind(event_guid)
        .bind(language_guid)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(StoreError::backend)?;
        Ok(row.map(Into::into))
    }

    async fn create_event_language(&mut self, language: &NewEventLanguage) -> Result<(), StoreError> {
        let key = format!("{}/{}", language.event_guid, language.language_guid);
        let result = sqlx::query(
            r"
            INSERT INTO event_language (event_guid, language_guid, title, rules)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (event_guid, language_guid) DO NOTHING
            ",
        )
        .bind(&language.event_guid)
        .bind(&language.language_guid)
        .bind(&language.title)
        .bind(&language.rules)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| classify(e, "event language", &key))?;
        inserted(result.rows_affected(), "event language", &key)
    }

    async fn update_event_language_title(&mut self, guid: &str, title: &str) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE event_language SET title = $2 WHERE guid = $1")
            .bind(guid)
            .bind(title)
            .execute(&mut *self.tx)
            .await
            .map_err(StoreError::backend)?;
        updated(result.rows_affected(), "event language", guid)
    }

    async fn team_group_by_external_id(
        &mut self,
        external_id: &str,
        ecosystem_guid: &str,
    ) -> Result<Option<TeamGroup>, StoreError> {
        let row = sqlx::query_as::<_, TeamGroupRow>(
            r"
            SELECT guid, ecosystem_guid, external_id, logo
            FROM team_group
            WHERE external_id = $1 AND ecosystem_guid = $2
            ",
        )
        .bind(external_id)
        .bind(ecosystem_guid)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(StoreError::backend)?;
        Ok(row.map(Into::into))
    }

    async fn create_team_group(&mut self, team: &NewTeamGroup) -> Result<(), StoreError> {
        let result = sqlx::query(
            r"
            INSERT INTO team_group (ecosystem_guid, external_id, logo)
            VALUES ($1, $2, $3)
            ON CONFLICT (external_id, ecosystem_guid) DO NOTHING
            ",
        )
        .bind(&team.ecosystem_guid)
        .bind(&team.external_id)
        .bind(&team.logo)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| classify(e, "team group", &team.external_id))?;
        inserted(result.rows_affected(), "team group", &team.external_id)
    }

    async fn create_team_group_language(
        &mut self,
        language: &NewTeamGroupLanguage,
    ) -> Result<(), StoreError> {
        let key = format!("{}/{}", language.team_group_guid, language.language_guid);
        let result = sqlx::query(
            r"
            INSERT INTO team_group_language (team_group_guid, language_guid, name, alias)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (team_group_guid, language_guid) DO NOTHING
            ",
        )
        .bind(&language.team_group_guid)
        .bind(&language.language_guid)
        .bind(&language.name)
        .bind(&language.alias)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| classify(e, "team group language", &key))?;
        inserted(result.rows_affected(), "team group language", &key)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(StoreError::backend)
    }
}
