//! Sports game snapshots.
//!
//! A `GameUpdate` is what the schedule poller extracts from one provider
//! record. Status mapping lives here so it is deterministic and testable
//! without any HTTP in the way.

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::event::LiveState;

/// Lifecycle of a game as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameStatus {
    Scheduled,
    InProgress,
    Closed,
}

impl GameStatus {
    /// Parse a provider status. Anything unrecognised is treated as scheduled.
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "inprogress" => Self::InProgress,
            "closed" => Self::Closed,
            _ => Self::Scheduled,
        }
    }

    pub const fn live_state(self) -> LiveState {
        match self {
            Self::Scheduled => LiveState::Upcoming,
            Self::InProgress => LiveState::Live,
            Self::Closed => LiveState::Finished,
        }
    }

    pub const fn stage(self) -> &'static str {
        match self {
            Self::Scheduled | Self::InProgress => "Q1",
            Self::Closed => "FT",
        }
    }

    /// Closed games are published; other states leave visibility alone.
    pub const fn online_override(self) -> Option<bool> {
        match self {
            Self::Closed => Some(true),
            Self::Scheduled | Self::InProgress => None,
        }
    }
}

/// Team as named by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamRef {
    pub external_id: String,
    pub name: String,
    pub alias: String,
}

impl TeamRef {
    /// Provider CDN logo for the team.
    pub fn logo_url(&self) -> String {
        format!(
            "https://cdn.sportradar.com/images/nba/teams/{}.png",
            self.alias.to_lowercase()
        )
    }
}

/// Season descriptor carried into rules text and info.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Season {
    pub id: String,
    pub year: i32,
    /// Provider season type, e.g. "REG" or "PST".
    pub kind: String,
}

/// Normalized state of one game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameUpdate {
    pub game_id: String,
    pub status: GameStatus,
    /// Provider status string, kept for audit.
    pub raw_status: String,
    /// Provider tip-off time string.
    pub scheduled: String,
    pub home: TeamRef,
    pub away: TeamRef,
    pub home_points: Option<i64>,
    pub away_points: Option<i64>,
    pub season: Season,
    /// Audit fields copied verbatim into the event info.
    pub details: serde_json::Value,
}

impl GameUpdate {
    pub fn home_score(&self) -> String {
        self.home_points.map_or_else(|| "0".to_string(), |p| p.to_string())
    }

    pub fn away_score(&self) -> String {
        self.away_points.map_or_else(|| "0".to_string(), |p| p.to_string())
    }

    /// Tip-off as "YYYY-MM-DD HH:MM:SS", or the raw string if unparseable.
    pub fn scheduled_display(&self) -> String {
        format_scheduled(&self.scheduled)
    }
}

/// Render an RFC 3339 timestamp as "YYYY-MM-DD HH:MM:SS" in its own offset.
pub fn format_scheduled(raw: &str) -> String {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return parsed.format("%Y-%m-%d %H:%M:%S").to_string();
    }
    if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return parsed.format("%Y-%m-%d %H:%M:%S").to_string();
    }
    raw.to_string()
}
