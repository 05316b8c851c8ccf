//! Use Cases Layer - Application Business Logic
//!
//! Use cases:
//! - `EventUpsertService`: The shared, transactional event upsert protocol

pub mod event_upsert;

pub use event_upsert::EventUpsertService;
