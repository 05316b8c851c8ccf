//! HTTP Adapters - REST Plumbing Shared by the Pollers
//!
//! - `JsonClient`: GET + JSON decode with a classified `FetchError`
//! - `retry`: bounded exponential-backoff retry of any classified error

pub mod client;
pub mod retry;

pub use client::{FetchError, JsonClient};
pub use retry::{RetryError, Retryable, retry};
