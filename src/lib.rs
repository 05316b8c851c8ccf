//! Event Pod Crawler — Library Root
//!
//! Real-time ingestion of exchange prices and sports schedules into the
//! event store. Re-exports all modules for integration tests and benchmarks.

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
pub mod usecases;
