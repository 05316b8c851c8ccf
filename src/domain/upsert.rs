//! Normalized upsert input.
//!
//! Every adapter reduces what it observed to an `EventUpsert`; the upsert
//! service then applies it to the store without knowing which feed it
//! came from. The two constructors below are the only places where
//! crypto and sports differ in what gets written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::event::LiveState;
use super::game::{GameUpdate, TeamRef};
use super::tick::{Exchange, PriceTick};

/// Catalog identifiers an adapter writes under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedIdentity {
    pub category_guid: String,
    pub ecosystem_guid: String,
    pub language_guid: String,
}

/// Period the event belongs to, created on first use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodSpec {
    pub code: String,
    pub scheduled: String,
    pub remark: String,
}

/// Home and away teams, resolved inside the upsert transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamPair {
    pub ecosystem_guid: String,
    pub home: TeamRef,
    pub away: TeamRef,
}

/// One observation to apply to the event store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventUpsert {
    pub external_id: String,
    pub identity: FeedIdentity,
    pub period: PeriodSpec,
    pub teams: Option<TeamPair>,
    pub main_score: String,
    pub cluster_score: String,
    pub live: LiveState,
    pub stage: String,
    pub info: serde_json::Value,
    pub title: String,
    pub rules: String,
    pub is_sports: bool,
    /// Visibility to force on create and update; `None` creates hidden and never touches it after.
    pub online: Option<bool>,
    pub observed_at: DateTime<Utc>,
}

impl EventUpsert {
    /// Live price of `tick.symbol` on `exchange`.
    pub fn for_price_tick(
        exchange: Exchange,
        identity: FeedIdentity,
        tick: &PriceTick,
        now: DateTime<Utc>,
    ) -> Self {
        let external_id = exchange.external_id(&tick.symbol);
        let date = now.format("%Y-%m-%d").to_string();

        Self {
            info: json!({
                "external_id": external_id,
                "exchange": exchange.label(),
                "symbol": tick.symbol,
                "price": tick.price,
                "timestamp": now.timestamp(),
            }),
            external_id,
            identity,
            period: PeriodSpec {
                code: exchange.period_code(now),
                scheduled: now.format("%Y-%m-%d %H:%M:%S").to_string(),
                remark: format!("Crypto price date: {date}"),
            },
            teams: None,
            main_score: tick.price.clone(),
            cluster_score: "0".to_string(),
            live: LiveState::Live,
            stage: "LIVE".to_string(),
            title: format!("{} Price", tick.symbol),
            rules: format!(
                "Real-time price tracking for {} on {}",
                tick.symbol,
                exchange.display_name()
            ),
            is_sports: false,
            online: None,
            observed_at: now,
        }
    }

    /// Current state of a scheduled or played game.
    pub fn for_game(
        identity: FeedIdentity,
        team_ecosystem_guid: &str,
        game: &GameUpdate,
        now: DateTime<Utc>,
    ) -> Self {
        let scheduled = game.scheduled_display();

        let mut info = json!({
            "external_id": game.game_id,
            "game_id": game.game_id,
            "status": game.raw_status,
            "scheduled": game.scheduled,
            "open_time": scheduled,
            "season_id": game.season.id,
            "season_year": game.season.year,
            "season_type": game.season.kind,
        });
        if let (Some(target), Some(details)) = (info.as_object_mut(), game.details.as_object()) {
            for (key, value) in details {
                target.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }

        Self {
            external_id: game.game_id.clone(),
            identity,
            period: PeriodSpec {
                code: game.game_id.clone(),
                remark: format!("NBA game date: {scheduled}"),
                scheduled,
            },
            teams: Some(TeamPair {
                ecosystem_guid: team_ecosystem_guid.to_string(),
                home: game.home.clone(),
                away: game.away.clone(),
            }),
            main_score: game.home_score(),
            cluster_score: game.away_score(),
            live: game.status.live_state(),
            stage: game.status.stage().to_string(),
            info,
            title: format!("{} vs {}", game.home.name, game.away.name),
            rules: format!(
                "NBA {} season game. Home: {}, Away: {}.",
                game.season.kind, game.home.name, game.away.name
            ),
            is_sports: true,
            online: game.status.online_override(),
            observed_at: now,
        }
    }
}
