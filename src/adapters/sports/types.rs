//! Sportradar NBA v8 daily schedule payload.

use serde::Deserialize;
use serde_json::json;

use crate::domain::game::{GameStatus, GameUpdate, Season, TeamRef};

/// `GET .../games/{Y}/{M}/{D}/schedule.json`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduleResponse {
  #[serde(default)]
  pub date: String,
  #[serde(default)]
  pub games: Vec<NbaGame>,
  #[serde(default)]
  pub league: League,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NbaGame {
  pub id: String,
  /// scheduled, inprogress, closed, ...
  #[serde(default)]
  pub status: String,
  #[serde(default)]
  pub scheduled: String,
  pub home_points: Option<i64>,
  pub away_points: Option<i64>,
  #[serde(default)]
  pub coverage: String,
  #[serde(default)]
  pub track_on_court: bool,
  #[serde(default)]
  pub sr_id: String,
  #[serde(default)]
  pub reference: String,
  #[serde(default)]
  pub time_zones: TimeZones,
  #[serde(default)]
  pub season: NbaSeason,
  #[serde(default)]
  pub home: NbaTeam,
  #[serde(default)]
  pub away: NbaTeam,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimeZones {
  #[serde(default)]
  pub venue: String,
  #[serde(default)]
  pub home: String,
  #[serde(default)]
  pub away: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NbaTeam {
  #[serde(default)]
  pub id: String,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub alias: String,
  #[serde(default)]
  pub sr_id: String,
  #[serde(default)]
  pub reference: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct League {
  #[serde(default)]
  pub id: String,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub alias: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NbaSeason {
  #[serde(default)]
  pub id: String,
  #[serde(default)]
  pub year: i32,
  #[serde(default, rename = "type")]
  pub kind: String,
}

impl From<NbaTeam> for TeamRef {
  fn from(team: NbaTeam) -> Self {
    Self {
      external_id: team.id,
      name: team.name,
      alias: team.alias,
    }
  }
}

impl NbaGame {
  /// Normalize against the league the schedule was returned for.
  pub fn into_update(self, league: &League) -> GameUpdate {
    let details = json!({
      "sr_id": self.sr_id,
      "reference": self.reference,
      "coverage": self.coverage,
      "track_on_court": self.track_on_court,
      "league_id": league.id,
      "league_name": league.name,
      "time_zones": {
        "venue": self.time_zones.venue,
        "home": self.time_zones.home,
        "away": self.time_zones.away,
      },
    });

    GameUpdate {
      status: GameStatus::parse(&self.status),
      raw_status: self.status,
      game_id: self.id,
      scheduled: self.scheduled,
      home: self.home.into(),
      away: self.away.into(),
      home_points: self.home_points,
      away_points: self.away_points,
      season: Season {
        id: self.season.id,
        year: self.season.year,
        kind: self.season.kind,
      },
      details,
    }
  }
}

impl ScheduleResponse {
  pub fn into_updates(self) -> Vec<GameUpdate> {
    let league = self.league;
    self
      .games
      .into_iter()
      .map(|game| game.into_update(&league))
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const SCHEDULE: &str = r#"{
    "date": "2024-06-06",
    "league": {"id": "4353138d-4c22-4396-95d8-5f587d2df25c", "name": "NBA", "alias": "NBA"},
    "games": [
      {
        "id": "game123",
        "status": "closed",
        "coverage": "full",
        "scheduled": "2024-06-07T00:30:00Z",
        "home_points": 107,
        "away_points": 89,
        "track_on_court": true,
        "sr_id": "sr:match:41941681",
        "reference": "0042300401",
        "time_zones": {"venue": "US/Eastern", "home": "US/Eastern", "away": "US/Central"},
        "season": {"id": "season-1", "year": 2023, "type": "PST"},
        "home": {"id": "team-bos", "name": "Boston Celtics", "alias": "BOS", "sr_id": "sr:team:1"},
        "away": {"id": "team-dal", "name": "Dallas Mavericks", "alias": "DAL"}
      },
      {
        "id": "game124",
        "status": "scheduled",
        "scheduled": "2024-06-09T00:00:00Z",
        "home": {"id": "team-bos", "name": "Boston Celtics", "alias": "BOS"},
        "away": {"id": "team-dal", "name": "Dallas Mavericks", "alias": "DAL"}
      }
    ]
  }"#;

  #[test]
  fn test_schedule_normalization() {
    let response: ScheduleResponse = serde_json::from_str(SCHEDULE).unwrap();
    assert_eq!(response.date, "2024-06-06");

    let updates = response.into_updates();
    assert_eq!(updates.len(), 2);

    let closed = &updates[0];
    assert_eq!(closed.game_id, "game123");
    assert_eq!(closed.status, GameStatus::Closed);
    assert_eq!(closed.home_score(), "107");
    assert_eq!(closed.away_score(), "89");
    assert_eq!(closed.home.external_id, "team-bos");
    assert_eq!(closed.season.kind, "PST");
    assert_eq!(closed.details["league_name"], "NBA");
    assert_eq!(closed.details["time_zones"]["away"], "US/Central");

    let scheduled = &updates[1];
    assert_eq!(scheduled.status, GameStatus::Scheduled);
    assert_eq!(scheduled.home_points, None);
    assert_eq!(scheduled.away_score(), "0");
  }
}
