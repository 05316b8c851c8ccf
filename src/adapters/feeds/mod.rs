//! Market Data Feed Adapters - Real-time Price Ingestion
//!
//! Provides WebSocket-based ticker feeds from:
//! - Binance: 24h ticker stream, with a REST polling fallback
//! - Bybit: v5 spot tickers
//! - OKX: public tickers channel
//! - Task Supervisor: starts every adapter and escalates task panics
//!
//! All three exchanges share one stream lifecycle (`stream`); each only
//! supplies its wire schema.

pub mod binance;
pub mod bybit;
pub mod okx;
pub mod signal;
pub mod stream;
pub mod task_supervisor;

pub use binance::{BinanceFeed, BinanceProtocol, BinanceRestPoller, RestSettings};
pub use bybit::{BybitFeed, BybitProtocol};
pub use okx::{OkxFeed, OkxProtocol};
pub use signal::StopSignal;
pub use stream::{
    DecodeError, ExchangeFeed, ExchangeProtocol, FeedError, Frame, StreamSettings, TickWriter,
};
pub use task_supervisor::{CrawlerSupervisor, TaskStatus};
