//! Persistent event records.
//!
//! These mirror the five tables the crawler writes: events, their
//! per-language titles, the periods grouping them, and the team groups
//! (with names) referenced by sports events. Rows are keyed by an opaque
//! store-generated `guid`; lookups use each table's natural key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Team reference stored on events without teams.
pub const NO_TEAM: &str = "0";

/// Live flag persisted as a small integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LiveState {
    /// Live now. Crypto events are always live.
    Live,
    /// Not started yet.
    Upcoming,
    /// Finished.
    Finished,
}

impl LiveState {
    pub const fn as_i16(self) -> i16 {
        match self {
            Self::Live => 0,
            Self::Upcoming => 1,
            Self::Finished => 2,
        }
    }

    /// Decode a stored flag. Unknown values read as `Upcoming`.
    pub const fn from_i16(value: i16) -> Self {
        match value {
            0 => Self::Live,
            2 => Self::Finished,
            _ => Self::Upcoming,
        }
    }
}

/// One tracked real-world thing: a symbol on an exchange or a game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub guid: String,
    pub external_id: String,
    pub category_guid: String,
    pub ecosystem_guid: String,
    pub event_period_guid: String,
    /// Home team group, or `NO_TEAM`.
    pub main_team_group_guid: String,
    /// Away team group, or `NO_TEAM`.
    pub cluster_team_group_guid: String,
    /// Price for crypto, home score for sports.
    pub main_score: String,
    /// Away score for sports, "0" for crypto.
    pub cluster_score: String,
    pub info: serde_json::Value,
    pub is_online: bool,
    pub is_live: LiveState,
    pub is_sports: bool,
    pub stage: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert form of [`Event`]; the store assigns the guid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    pub external_id: String,
    pub category_guid: String,
    pub ecosystem_guid: String,
    pub event_period_guid: String,
    pub main_team_group_guid: String,
    pub cluster_team_group_guid: String,
    pub main_score: String,
    pub cluster_score: String,
    pub info: serde_json::Value,
    pub is_online: bool,
    pub is_live: LiveState,
    pub is_sports: bool,
    pub stage: String,
    pub created_at: DateTime<Utc>,
}

/// Fields rewritten when an existing event is refreshed.
///
/// `None` leaves the stored column untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPatch {
    pub event_period_guid: String,
    pub main_score: String,
    pub cluster_score: String,
    pub is_live: LiveState,
    pub stage: String,
    pub info: serde_json::Value,
    pub main_team_group_guid: Option<String>,
    pub cluster_team_group_guid: Option<String>,
    pub is_online: Option<bool>,
    pub updated_at: DateTime<Utc>,
}

impl EventPatch {
    /// Apply the patch to a loaded row.
    pub fn apply(&self, event: &mut Event) {
        event.event_period_guid.clone_from(&self.event_period_guid);
        event.main_score.clone_from(&self.main_score);
        event.cluster_score.clone_from(&self.cluster_score);
        event.is_live = self.is_live;
        event.stage.clone_from(&self.stage);
        event.info = self.info.clone();
        if let Some(guid) = &self.main_team_group_guid {
            event.main_team_group_guid.clone_from(guid);
        }
        if let Some(guid) = &self.cluster_team_group_guid {
            event.cluster_team_group_guid.clone_from(guid);
        }
        if let Some(online) = self.is_online {
            event.is_online = online;
        }
        event.updated_at = self.updated_at;
    }
}

/// Localized title and rules of an event. Unique per (event, language).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLanguage {
    pub guid: String,
    pub event_guid: String,
    pub language_guid: String,
    pub title: String,
    pub rules: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEventLanguage {
    pub event_guid: String,
    pub language_guid: String,
    pub title: String,
    pub rules: String,
}

/// Time bucket grouping events; unique by `code`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPeriod {
    pub guid: String,
    pub code: String,
    pub is_active: bool,
    /// Formatted "YYYY-MM-DD HH:MM:SS".
    pub scheduled: String,
    pub remark: String,
    pub extra: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEventPeriod {
    pub code: String,
    pub is_active: bool,
    pub scheduled: String,
    pub remark: String,
    pub extra: serde_json::Value,
}

/// A team, unique per (external id, ecosystem).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamGroup {
    pub guid: String,
    pub ecosystem_guid: String,
    pub external_id: String,
    pub logo: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTeamGroup {
    pub ecosystem_guid: String,
    pub external_id: String,
    pub logo: String,
}

/// Localized team name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamGroupLanguage {
    pub guid: String,
    pub team_group_guid: String,
    pub language_guid: String,
    pub name: String,
    pub alias: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTeamGroupLanguage {
    pub team_group_guid: String,
    pub language_guid: String,
    pub name: String,
    pub alias: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_state_round_trips_through_i16() {
        for state in [LiveState::Live, LiveState::Upcoming, LiveState::Finished] {
            assert_eq!(LiveState::from_i16(state.as_i16()), state);
        }
        assert_eq!(LiveState::from_i16(7), LiveState::Upcoming);
    }

    #[test]
    fn test_patch_leaves_unset_columns_alone() {
        let now = Utc::now();
        let mut event = Event {
            guid: "g".into(),
            external_id: "BINANCE_BTCUSDT".into(),
            category_guid: "c".into(),
            ecosystem_guid: "e".into(),
            event_period_guid: "p1".into(),
            main_team_group_guid: NO_TEAM.into(),
            cluster_team_group_guid: NO_TEAM.into(),
            main_score: "1".into(),
            cluster_score: "0".into(),
            info: serde_json::json!({}),
            is_online: true,
            is_live: LiveState::Live,
            is_sports: false,
            stage: "LIVE".into(),
            created_at: now,
            updated_at: now,
        };
        let patch = EventPatch {
            event_period_guid: "p2".into(),
            main_score: "2".into(),
            cluster_score: "0".into(),
            is_live: LiveState::Live,
            stage: "LIVE".into(),
            info: serde_json::json!({"price": "2"}),
            main_team_group_guid: None,
            cluster_team_group_guid: None,
            is_online: None,
            updated_at: now,
        };

        patch.apply(&mut event);

        assert_eq!(event.event_period_guid, "p2");
        assert_eq!(event.main_score, "2");
        assert_eq!(event.main_team_group_guid, NO_TEAM);
        assert!(event.is_online);
    }
}
