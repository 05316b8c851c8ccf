//! Sports Adapters - Scheduled Game Polling
//!
//! - `nba`: Sportradar NBA daily schedule poller
//! - `types`: Sportradar wire types and their normalization

pub mod nba;
pub mod types;

pub use nba::{NbaCrawler, NbaSettings, SyncReport};
pub use types::ScheduleResponse;
