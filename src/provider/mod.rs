//! Odds provider integrations.
//!
//! Defines the `OddsProvider` trait (the input collaborator of the engine)
//! and the raw payload shape providers hand over. Raw fields are optional on
//! purpose: a record missing a field is rejected by the normalizer, it never
//! fails deserialization of the whole batch.

pub mod the_odds_api;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Abstraction over sports odds feeds.
#[async_trait]
pub trait OddsProvider: Send + Sync {
    /// Fetch one complete batch of odds for every configured sport.
    async fn fetch_batch(&self) -> Result<OddsBatch>;

    /// Provider name for logging and identification.
    fn name(&self) -> &str;
}

/// One completed fetch, consumed by a single evaluation cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OddsBatch {
    pub events: Vec<RawEvent>,
    /// Fallback observation time for quotes without their own timestamp.
    pub fetched_at: DateTime<Utc>,
}

impl OddsBatch {
    pub fn new(events: Vec<RawEvent>, fetched_at: DateTime<Utc>) -> Self {
        Self { events, fetched_at }
    }

    /// Total number of raw outcome prices in the batch.
    pub fn quote_count(&self) -> usize {
        self.events
            .iter()
            .flat_map(|e| &e.bookmakers)
            .flat_map(|b| &b.markets)
            .map(|m| m.outcomes.len())
            .sum()
    }
}

// ---------------------------------------------------------------------------
// Raw payload (events → bookmakers → markets → outcomes)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawEvent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub sport_key: Option<String>,
    #[serde(default)]
    pub sport_title: Option<String>,
    /// RFC 3339 kick-off time.
    #[serde(default)]
    pub commence_time: Option<String>,
    #[serde(default)]
    pub home_team: Option<String>,
    #[serde(default)]
    pub away_team: Option<String>,
    #[serde(default)]
    pub bookmakers: Vec<RawBookmaker>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawBookmaker {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub last_update: Option<String>,
    #[serde(default)]
    pub markets: Vec<RawMarket>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawMarket {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub last_update: Option<String>,
    #[serde(default)]
    pub outcomes: Vec<RawOutcome>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawOutcome {
    #[serde(default)]
    pub name: Option<String>,
    /// Decimal or American price, depending on the requested odds format.
    #[serde(default)]
    pub price: Option<f64>,
    /// Handicap or total line, when the market has one.
    #[serde(default)]
    pub point: Option<f64>,
}
