//! Property-Based Tests — Domain Layer Invariants
//!
//! Uses `proptest` to verify that backoff policies, symbol handling and
//! period resolution hold their invariants across random inputs.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use proptest::prelude::*;

use event_pod_crawler::adapters::feeds::okx::to_okx_inst_id;
use event_pod_crawler::adapters::persistence::MemoryStore;
use event_pod_crawler::domain::backoff::{ExponentialBackoff, ReconnectBackoff};
use event_pod_crawler::domain::game::GameStatus;
use event_pod_crawler::domain::tick::{Exchange, PriceTick};
use event_pod_crawler::domain::upsert::{EventUpsert, FeedIdentity};
use event_pod_crawler::ports::event_sink::EventSink;
use event_pod_crawler::usecases::EventUpsertService;

// ── Reconnect Backoff Properties ────────────────────────────

proptest! {
    /// Consecutive failures never shorten the delay and never pass the cap.
    #[test]
    fn reconnect_delays_non_decreasing_and_capped(failures in 1usize..200) {
        let mut backoff = ReconnectBackoff::default();
        let mut previous = Duration::ZERO;

        for _ in 0..failures {
            let delay = backoff.next_delay();
            prop_assert!(delay >= previous, "{delay:?} < {previous:?}");
            prop_assert!(delay <= Duration::from_secs(60));
            previous = delay;
        }

        backoff.reset();
        prop_assert_eq!(backoff.next_delay(), Duration::from_secs(5));
    }

    /// Any parameters: first delay is `initial` (capped), later ones stay within `max`.
    #[test]
    fn reconnect_delays_respect_parameters(
        initial_ms in 1u64..10_000,
        max_ms in 1u64..120_000,
        factor in 1.0f64..4.0,
        failures in 1usize..64,
    ) {
        let max = Duration::from_millis(max_ms);
        let mut backoff = ReconnectBackoff::new(Duration::from_millis(initial_ms), max, factor);

        prop_assert_eq!(backoff.peek(), Duration::from_millis(initial_ms).min(max));
        for _ in 0..failures {
            prop_assert!(backoff.next_delay() <= max);
        }
    }
}

// ── Retry Backoff Properties ────────────────────────────────

proptest! {
    /// Retry delays never exceed `max`, whatever the jitter drawn.
    #[test]
    fn retry_delay_capped(
        attempt in 0u32..64,
        jitter_ms in 0u64..5_000,
    ) {
        let policy = ExponentialBackoff::new(
            Duration::from_secs(3),
            Duration::from_secs(30),
            Duration::from_secs(2),
        );
        let delay = policy.delay_with_jitter(attempt, Duration::from_millis(jitter_ms));
        prop_assert!(delay <= Duration::from_secs(30));
        prop_assert!(policy.delay(attempt) <= Duration::from_secs(30));
    }

    /// Without jitter, later attempts never wait less.
    #[test]
    fn retry_delay_monotonic_without_jitter(attempt in 0u32..40) {
        let policy = ExponentialBackoff::new(
            Duration::from_secs(1),
            Duration::from_secs(10),
            Duration::from_millis(500),
        );
        let now = policy.delay_with_jitter(attempt, Duration::ZERO);
        let next = policy.delay_with_jitter(attempt + 1, Duration::ZERO);
        prop_assert!(next >= now);
    }
}

// ── Symbol and Status Properties ────────────────────────────

proptest! {
    /// The OKX instrument id is the symbol with one dash inserted.
    #[test]
    fn okx_inst_id_only_adds_a_dash(symbol in "[a-zA-Z]{2,12}") {
        let inst_id = to_okx_inst_id(&symbol);
        prop_assert_eq!(inst_id.replace('-', ""), symbol.to_uppercase());
        prop_assert!(inst_id.matches('-').count() <= 1);
    }

    /// Any decimal price survives normalization verbatim.
    #[test]
    fn price_tick_keeps_price_text(
        symbol in "[A-Z]{3,10}",
        units in 0u64..10_000_000,
        cents in 0u32..100,
    ) {
        let price = format!("{units}.{cents:02}");
        let tick = PriceTick::new(symbol.clone(), price.clone()).unwrap();
        prop_assert_eq!(tick.symbol, symbol);
        prop_assert_eq!(tick.price, price);
    }

    /// Unknown provider statuses behave like scheduled games.
    #[test]
    fn unknown_status_is_scheduled(raw in "[a-z]{1,12}") {
        prop_assume!(raw != "inprogress" && raw != "closed");
        prop_assert_eq!(GameStatus::parse(&raw), GameStatus::Scheduled);
    }

    /// Period codes are `CRYPTO_<EXCHANGE>__<YYYY-MM-DD>` for every day.
    #[test]
    fn period_code_format(day in 0i64..20_000) {
        let at = Utc.timestamp_opt(day * 86_400 + 43_200, 0).unwrap();
        let code = Exchange::Bybit.period_code(at);
        let date = at.format("%Y-%m-%d").to_string();
        prop_assert_eq!(code, format!("CRYPTO_BYBIT__{date}"));
    }
}

// ── Period Resolution Convergence ───────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// However many symbols tick on one day, they share one period row.
    #[test]
    fn period_resolution_converges(symbols in prop::collection::vec("[A-Z]{3,6}USDT", 1..8)) {
        let store = MemoryStore::new();
        let sink = EventUpsertService::new(Arc::new(store.clone()), Duration::from_secs(5));
        let identity = FeedIdentity {
            category_guid: "cat".into(),
            ecosystem_guid: "eco".into(),
            language_guid: "lang".into(),
        };
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();

        tokio_test::block_on(async {
            for symbol in &symbols {
                let tick = PriceTick::new(symbol.clone(), "1.5").unwrap();
                let upsert = EventUpsert::for_price_tick(Exchange::Okx, identity.clone(), &tick, now);
                sink.upsert_event(&upsert).await.unwrap();
            }
        });

        let (periods, events) = tokio_test::block_on(async {
            (store.event_periods().await, store.events().await)
        });
        prop_assert_eq!(periods.len(), 1);
        prop_assert!(events.iter().all(|e| e.event_period_guid == periods[0].guid));
    }
}
