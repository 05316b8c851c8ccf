//! NBA Schedule Poller - Sportradar v8 Daily Schedules
//!
//! Fetches the schedule of each day in the sync window and upserts one
//! event per game, with both teams resolved in the same transaction.
//! Runs once at startup and then on a fixed interval. A day that cannot
//! be fetched, or a game that cannot be written, is logged and skipped.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{Days, NaiveDate, Utc};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use super::types::ScheduleResponse;
use crate::adapters::feeds::signal::StopSignal;
use crate::adapters::http::{FetchError, JsonClient, RetryError, retry};
use crate::adapters::metrics::MetricsRegistry;
use crate::config::NbaConfig;
use crate::domain::backoff::ExponentialBackoff;
use crate::domain::game::GameUpdate;
use crate::domain::upsert::{EventUpsert, FeedIdentity};
use crate::ports::event_sink::EventSink;

/// Metric label of this poller.
const SOURCE: &str = "nba";

/// Parameters of the schedule poller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NbaSettings {
    pub base_url: String,
    pub api_key: String,
    pub access_level: String,
    pub language_code: String,
    pub poll_interval: Duration,
    /// Extra days after today to sync each cycle.
    pub lookahead_days: u32,
    pub request_timeout: Duration,
    pub max_attempts: u32,
    pub backoff: ExponentialBackoff,
}

impl From<&NbaConfig> for NbaSettings {
    fn from(config: &NbaConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            access_level: config.access_level.clone(),
            language_code: config.language_code.clone(),
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            lookahead_days: config.lookahead_days,
            request_timeout: Duration::from_secs(config.timeout_secs),
            max_attempts: 3,
            backoff: ExponentialBackoff::new(
                Duration::from_secs(1),
                Duration::from_secs(10),
                Duration::from_millis(500),
            ),
        }
    }
}

/// Outcome of writing one day's games.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub games: usize,
    pub upserted: usize,
    pub failed: usize,
    /// Days whose schedule could not be fetched.
    pub days_failed: usize,
}

impl SyncReport {
    fn merge(&mut self, other: Self) {
        self.games += other.games;
        self.upserted += other.upserted;
        self.failed += other.failed;
        self.days_failed += other.days_failed;
    }
}

/// Sportradar NBA crawler.
pub struct NbaCrawler {
    client: JsonClient,
    settings: NbaSettings,
    identity: FeedIdentity,
    sink: Arc<dyn EventSink>,
    metrics: Arc<MetricsRegistry>,
}

impl NbaCrawler {
    pub fn new(
        settings: NbaSettings,
        identity: FeedIdentity,
        sink: Arc<dyn EventSink>,
        metrics: Arc<MetricsRegistry>,
    ) -> Result<Self> {
        Ok(Self {
            client: JsonClient::new(settings.request_timeout)?,
            settings,
            identity,
            sink,
            metrics,
        })
    }

    pub fn schedule_url(&self, date: NaiveDate) -> String {
        format!(
            "{}/nba/{}/v8/{}/games/{}/schedule.json",
            self.settings.base_url,
            self.settings.access_level,
            self.settings.language_code,
            date.format("%Y/%m/%d"),
        )
    }

    /// Fetch one day's schedule, retrying transient failures.
    pub async fn fetch_schedule(
        &self,
        date: NaiveDate,
    ) -> Result<ScheduleResponse, RetryError<FetchError>> {
        let url = self.schedule_url(date);
        let headers = [("x-api-key", self.settings.api_key.as_str())];

        retry(self.settings.max_attempts, &self.settings.backoff, |attempt| {
            let url = url.as_str();
            let headers = &headers;
            async move {
                debug!(%date, attempt, "Fetching NBA schedule");
                self.client.get_json(url, headers).await
            }
        })
        .await
    }

    /// Upsert every game of a fetched schedule.
    pub async fn process_schedule(&self, schedule: ScheduleResponse) -> SyncReport {
        let games = schedule.into_updates();
        let mut report = SyncReport {
            games: games.len(),
            ..SyncReport::default()
        };

        for game in &games {
            if self.process_game(game).await {
                report.upserted += 1;
            } else {
                report.failed += 1;
            }
        }
        report
    }

    async fn process_game(&self, game: &GameUpdate) -> bool {
        self.metrics
            .ticks_processed
            .with_label_values(&[SOURCE])
            .inc();

        let upsert = EventUpsert::for_game(
            self.identity.clone(),
            &self.identity.ecosystem_guid,
            game,
            Utc::now(),
        );
        let started = Instant::now();
        let result = self.sink.upsert_event(&upsert).await;
        self.metrics
            .observe_upsert(SOURCE, &result, started.elapsed());

        match result {
            Ok(outcome) => {
                debug!(
                    game_id = %game.game_id,
                    status = %game.raw_status,
                    outcome = outcome.label(),
                    "NBA game upserted"
                );
                true
            }
            Err(e) => {
                error!(game_id = %game.game_id, error = %e, "Failed to process game");
                false
            }
        }
    }

    /// Fetch and write one day.
    pub async fn sync_date(&self, date: NaiveDate) -> Result<SyncReport, RetryError<FetchError>> {
        info!(%date, "Starting NBA schedule sync");
        let schedule = self.fetch_schedule(date).await?;
        let report = self.process_schedule(schedule).await;
        info!(
            %date,
            games = report.games,
            upserted = report.upserted,
            failed = report.failed,
            "NBA schedule sync completed"
        );
        Ok(report)
    }

    pub async fn sync_today(&self) -> Result<SyncReport, RetryError<FetchError>> {
        self.sync_date(Utc::now().date_naive()).await
    }

    /// Sync `start..=end`. A failed day is logged and the next one tried.
    pub async fn sync_range(&self, start: NaiveDate, end: NaiveDate) -> SyncReport {
        let mut total = SyncReport::default();
        for date in start.iter_days().take_while(|d| *d <= end) {
            match self.sync_date(date).await {
                Ok(report) => total.merge(report),
                Err(e) => {
                    total.days_failed += 1;
                    warn!(
                        %date,
                        attempts = e.attempts,
                        terminal = e.is_terminal(),
                        error = %e.source,
                        "Failed to sync NBA schedule"
                    );
                }
            }
        }
        total
    }

    /// Today plus the configured look-ahead.
    pub fn sync_window(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let end = today
            .checked_add_days(Days::new(u64::from(self.settings.lookahead_days)))
            .unwrap_or(today);
        (today, end)
    }

    /// Sync now, then on every interval until stopped.
    #[instrument(skip(self, signal), fields(source = SOURCE))]
    pub async fn run(&self, mut signal: StopSignal) {
        info!(
            interval_secs = self.settings.poll_interval.as_secs(),
            lookahead_days = self.settings.lookahead_days,
            "NBA crawler started"
        );

        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = signal.wait() => break,
                _ = ticker.tick() => {
                    let (start, end) = self.sync_window(Utc::now().date_naive());
                    let report = tokio::select! {
                        biased;
                        () = signal.wait() => break,
                        report = self.sync_range(start, end) => report,
                    };
                    let result = if report.failed + report.days_failed == 0 {
                        "ok"
                    } else {
                        "partial"
                    };
                    self.metrics
                        .poll_cycles
                        .with_label_values(&[SOURCE, result])
                        .inc();
                }
            }
        }

        info!("NBA crawler stopped");
    }
}
