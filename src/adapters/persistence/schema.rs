//! PostgreSQL schema bootstrap.
//!
//! Idempotent DDL run at startup. Guids are generated by the database
//! (dashless uuid text), which is why the upsert protocol re-reads rows
//! after inserting them. The unique indexes are the natural keys the
//! store relies on to report `Duplicate`.

use sqlx::PgPool;
use tracing::info;

const STATEMENTS: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS event_period (
        guid TEXT PRIMARY KEY DEFAULT replace(gen_random_uuid()::text, '-', ''),
        code TEXT NOT NULL,
        is_active BOOLEAN NOT NULL DEFAULT TRUE,
        scheduled TEXT NOT NULL DEFAULT '',
        remark TEXT NOT NULL DEFAULT '',
        extra JSONB NOT NULL DEFAULT '{}'::jsonb
    )
    ",
    "CREATE UNIQUE INDEX IF NOT EXISTS event_period_code_key ON event_period (code)",
    r"
    CREATE TABLE IF NOT EXISTS team_group (
        guid TEXT PRIMARY KEY DEFAULT replace(gen_random_uuid()::text, '-', ''),
        ecosystem_guid TEXT NOT NULL,
        external_id TEXT NOT NULL,
        logo TEXT NOT NULL DEFAULT ''
    )
    ",
    "CREATE UNIQUE INDEX IF NOT EXISTS team_group_external_key ON team_group (external_id, ecosystem_guid)",
    r"
    CREATE TABLE IF NOT EXISTS team_group_language (
        guid TEXT PRIMARY KEY DEFAULT replace(gen_random_uuid()::text, '-', ''),
        team_group_guid TEXT NOT NULL,
        language_guid TEXT NOT NULL,
        name TEXT NOT NULL,
        alias TEXT NOT NULL DEFAULT ''
    )
    ",
    "CREATE UNIQUE INDEX IF NOT EXISTS team_group_language_key ON team_group_language (team_group_guid, language_guid)",
    r"
    CREATE TABLE IF NOT EXISTS event (
        guid TEXT PRIMARY KEY DEFAULT replace(gen_random_uuid()::text, '-', ''),
        external_id TEXT NOT NULL,
        category_guid TEXT NOT NULL,
        ecosystem_guid TEXT NOT NULL,
        event_period_guid TEXT NOT NULL,
        main_team_group_guid TEXT NOT NULL DEFAULT '0',
        cluster_team_group_guid TEXT NOT NULL DEFAULT '0',
        main_score NUMERIC NOT NULL DEFAULT 0,
        cluster_score NUMERIC NOT NULL DEFAULT 0,
        info JSONB NOT NULL DEFAULT '{}'::jsonb,
        is_online BOOLEAN NOT NULL DEFAULT FALSE,
        is_live SMALLINT NOT NULL DEFAULT 1,
        is_sports BOOLEAN NOT NULL DEFAULT FALSE,
        stage VARCHAR(20) NOT NULL DEFAULT '',
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    ",
    "CREATE UNIQUE INDEX IF NOT EXISTS event_external_id_key ON event (external_id)",
    r"
    CREATE TABLE IF NOT EXISTS event_language (
        guid TEXT PRIMARY KEY DEFAULT replace(gen_random_uuid()::text, '-', ''),
        event_guid TEXT NOT NULL,
        language_guid TEXT NOT NULL,
        title TEXT NOT NULL,
        rules TEXT NOT NULL DEFAULT ''
    )
    ",
    "CREATE UNIQUE INDEX IF NOT EXISTS event_language_key ON event_language (event_guid, language_guid)",
];

/// Create the crawler's tables and unique indexes if they are missing.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    for statement in STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    info!(statements = STATEMENTS.len(), "Event store schema ensured");
    Ok(())
}
