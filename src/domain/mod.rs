//! Domain layer - Core models of the crawler.
//!
//! Pure types shared by every adapter: price ticks, game snapshots,
//! persisted event records, backoff policies and the normalized upsert
//! input. Nothing here performs I/O.

pub mod backoff;
pub mod event;
pub mod game;
pub mod tick;
pub mod upsert;

// Re-export core types for convenience
pub use backoff::{ExponentialBackoff, ReconnectBackoff};
pub use event::{
    Event, EventLanguage, EventPatch, EventPeriod, LiveState, NO_TEAM, NewEvent,
    NewEventLanguage, NewEventPeriod, NewTeamGroup, NewTeamGroupLanguage, TeamGroup,
    TeamGroupLanguage,
};
pub use game::{GameStatus, GameUpdate, Season, TeamRef};
pub use tick::{Exchange, PriceTick, TickError};
pub use upsert::{EventUpsert, FeedIdentity, PeriodSpec, TeamPair};
