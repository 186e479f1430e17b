//! Mock odds provider for integration testing.
//!
//! Provides a deterministic `OddsProvider` implementation that returns
//! scripted batches, all in-memory with no external dependencies.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};

use valuebets::provider::{OddsBatch, OddsProvider, RawBookmaker, RawEvent, RawMarket, RawOutcome};

/// A mock odds feed. Events and failures are controllable from test code.
pub struct MockProvider {
    events: Arc<Mutex<Vec<RawEvent>>>,
    fetched_at: DateTime<Utc>,
    calls: Arc<Mutex<usize>>,
    /// If set, every fetch returns this error.
    force_error: Arc<Mutex<Option<String>>>,
}

impl MockProvider {
    pub fn new(events: Vec<RawEvent>, fetched_at: DateTime<Utc>) -> Self {
        Self {
            events: Arc::new(Mutex::new(events)),
            fetched_at,
            calls: Arc::new(Mutex::new(0)),
            force_error: Arc::new(Mutex::new(None)),
        }
    }

    /// Force all subsequent fetches to fail.
    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }

    pub fn set_events(&self, events: Vec<RawEvent>) {
        *self.events.lock().unwrap() = events;
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl OddsProvider for MockProvider {
    async fn fetch_batch(&self) -> Result<OddsBatch> {
        *self.calls.lock().unwrap() += 1;
        if let Some(msg) = self.force_error.lock().unwrap().clone() {
            return Err(anyhow!(msg));
        }
        Ok(OddsBatch::new(self.events.lock().unwrap().clone(), self.fetched_at))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ---------------------------------------------------------------------------
// Fixture builders
// ---------------------------------------------------------------------------

/// Head-to-head prices from one bookmaker, stamped at `observed_at`.
pub fn h2h_book(key: &str, title: &str, prices: &[(&str, f64)], observed_at: DateTime<Utc>) -> RawBookmaker {
    RawBookmaker {
        key: Some(key.to_string()),
        title: Some(title.to_string()),
        last_update: Some(observed_at.to_rfc3339()),
        markets: vec![RawMarket {
            key: Some("h2h".to_string()),
            last_update: None,
            outcomes: prices
                .iter()
                .map(|(name, price)| RawOutcome {
                    name: Some(name.to_string()),
                    price: Some(*price),
                    point: None,
                })
                .collect(),
        }],
    }
}

/// A fixture starting `hours_ahead` after `now`.
pub fn event(
    id: &str,
    home: &str,
    away: &str,
    now: DateTime<Utc>,
    hours_ahead: i64,
    bookmakers: Vec<RawBookmaker>,
) -> RawEvent {
    RawEvent {
        id: Some(id.to_string()),
        sport_key: Some("aussierules_afl".to_string()),
        sport_title: Some("AFL".to_string()),
        commence_time: Some((now + Duration::hours(hours_ahead)).to_rfc3339()),
        home_team: Some(home.to_string()),
        away_team: Some(away.to_string()),
        bookmakers,
    }
}

/// Two books: `sportsbet` generous on the home side, `tab` balanced.
/// Home fair ≈ 0.4875 (SPECULATIVE at 2.10), away fair ≈ 0.5125.
pub fn two_book_event(id: &str, now: DateTime<Utc>) -> RawEvent {
    event(
        id,
        "Carlton",
        "Collingwood",
        now,
        6,
        vec![
            h2h_book("sportsbet", "SportsBet", &[("Carlton", 2.10), ("Collingwood", 1.90)], now),
            h2h_book("tab", "TAB", &[("Carlton", 2.00), ("Collingwood", 2.00)], now),
        ],
    )
}
