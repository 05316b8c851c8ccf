//! Persistence Adapters - Event Store Implementations
//!
//! Two implementations of the `EventStore` port:
//! - `MemoryStore`: in-process transactional store for local runs and tests
//! - `PostgresStore`: sqlx connection pool over the production schema

pub mod memory;
pub mod postgres;
pub mod schema;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;
