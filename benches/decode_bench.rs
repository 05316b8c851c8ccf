//! Frame Decode Benchmarks — Hot-Path Performance Validation
//!
//! Benchmarks the per-message work every exchange stream does before a
//! tick reaches the upsert protocol.
//!
//! Run with: cargo bench --bench decode_bench

use chrono::{TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use event_pod_crawler::adapters::feeds::{BinanceProtocol, BybitProtocol, ExchangeProtocol, OkxProtocol};
use event_pod_crawler::domain::tick::{Exchange, PriceTick};
use event_pod_crawler::domain::upsert::{EventUpsert, FeedIdentity};

const BINANCE_TICKER: &str = r#"{"stream":"btcusdt@ticker","data":{"e":"24hrTicker","E":1717243200000,"s":"BTCUSDT","p":"120.50","P":"0.18","c":"65000.50","Q":"0.012","o":"64880.00","h":"65320.00","l":"64610.10","v":"18234.551","q":"1184312123.18"}}"#;
const BYBIT_TICKER: &str = r#"{"topic":"tickers.BTCUSDT","ts":1717243200000,"type":"snapshot","cs":44718311,"data":{"symbol":"BTCUSDT","lastPrice":"65000.50","highPrice24h":"65320.00","lowPrice24h":"64610.10","prevPrice24h":"64880.00","volume24h":"18234.551","turnover24h":"1184312123.18","price24hPcnt":"0.0018"}}"#;
const OKX_TICKER: &str = r#"{"arg":{"channel":"tickers","instId":"BTC-USDT"},"data":[{"instType":"SPOT","instId":"BTC-USDT","last":"65000.5","lastSz":"0.012","askPx":"65000.6","bidPx":"65000.4","open24h":"64880","high24h":"65320","low24h":"64610.1","ts":"1717243200000"}]}"#;

/// Benchmark Binance combined-stream ticker decode.
fn bench_binance_decode(c: &mut Criterion) {
    c.bench_function("binance_decode_ticker", |b| {
        b.iter(|| {
            let _frame = BinanceProtocol.decode(black_box(BINANCE_TICKER));
        });
    });
}

/// Benchmark Bybit v5 ticker decode.
fn bench_bybit_decode(c: &mut Criterion) {
    c.bench_function("bybit_decode_ticker", |b| {
        b.iter(|| {
            let _frame = BybitProtocol.decode(black_box(BYBIT_TICKER));
        });
    });
}

/// Benchmark OKX v5 ticker decode (instId normalization included).
fn bench_okx_decode(c: &mut Criterion) {
    c.bench_function("okx_decode_ticker", |b| {
        b.iter(|| {
            let _frame = OkxProtocol.decode(black_box(OKX_TICKER));
        });
    });
}

/// Benchmark tick validation plus building the upsert input.
fn bench_tick_to_upsert(c: &mut Criterion) {
    let identity = FeedIdentity {
        category_guid: "cat".to_string(),
        ecosystem_guid: "eco".to_string(),
        language_guid: "lang".to_string(),
    };
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();

    c.bench_function("tick_to_upsert", |b| {
        b.iter(|| {
            let tick = PriceTick::new(black_box("BTCUSDT"), black_box("65000.50")).unwrap();
            let _upsert = EventUpsert::for_price_tick(Exchange::Binance, identity.clone(), &tick, now);
        });
    });
}

criterion_group!(
    benches,
    bench_binance_decode,
    bench_bybit_decode,
    bench_okx_decode,
    bench_tick_to_upsert,
);
criterion_main!(benches);
