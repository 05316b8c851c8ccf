//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! external dependencies (WebSockets, HTTP clients, PostgreSQL).
//! Each sub-module groups adapters by infrastructure concern.
//!
//! Adapter categories:
//! - `feeds`: Exchange ticker streams (Binance, Bybit, OKX) and the supervisor
//! - `http`: JSON-over-HTTPS client and bounded retry
//! - `metrics`: Prometheus metrics export and health checks
//! - `persistence`: In-memory and PostgreSQL event stores
//! - `sports`: Sportradar NBA schedule polling

pub mod feeds;
pub mod http;
pub mod metrics;
pub mod persistence;
pub mod sports;
