//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces (traits) that the usecases layer requires from
//! the outside world and that adapters consume or implement.
//!
//! Port categories:
//! - `EventStore`: Transactional persistence of events and their catalog rows
//! - `EventSink`: The single write path adapters feed observations into

pub mod event_sink;
pub mod event_store;

pub use event_sink::{EventSink, UpsertError, UpsertOutcome};
pub use event_store::{EventStore, StoreError, StoreTx};
