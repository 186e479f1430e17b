//! SQLite ledger of emitted recommendations.
//!
//! One row per recommendation with its stake plan, so expected ROI can be
//! reported overall or per tier.

use anyhow::{Context, Result};
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, info};

use crate::strategy::stake::StakePlan;
use crate::types::{Recommendation, Tier};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS recommendations (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    recorded_at      TEXT NOT NULL,
    event_id         TEXT NOT NULL,
    sport            TEXT NOT NULL,
    league           TEXT NOT NULL,
    match_name       TEXT NOT NULL,
    start_time       TEXT NOT NULL,
    outcome_id       TEXT NOT NULL,
    bookmaker        TEXT NOT NULL,
    tier             TEXT NOT NULL,
    odds             REAL NOT NULL,
    fair_probability REAL NOT NULL,
    edge             REAL NOT NULL,
    confidence       REAL NOT NULL,
    cons_stake       REAL NOT NULL,
    smart_stake      REAL NOT NULL,
    agg_stake        REAL NOT NULL,
    cons_exp_profit  REAL NOT NULL,
    smart_exp_profit REAL NOT NULL,
    agg_exp_profit   REAL NOT NULL
)
"#;

/// Expected return across recorded stakes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoiSummary {
    pub tier: Option<Tier>,
    pub bets: i64,
    pub staked: f64,
    pub expected_profit: f64,
    /// `expected_profit / staked × 100`; 0 when nothing is staked.
    pub roi_pct: f64,
}

#[derive(Debug, Clone)]
pub struct HistoryStore {
    pool: SqlitePool,
}

impl HistoryStore {
    /// Open (creating if needed) the database at `url`, e.g.
    /// `sqlite://valuebets.db` or `sqlite::memory:`.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("Invalid SQLite URL: {url}"))?
            .create_if_missing(true);

        // Each in-memory connection is a separate database
        let pool = if url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await
        } else {
            SqlitePoolOptions::new().connect_with(options).await
        }
        .with_context(|| format!("Failed to open history database {url}"))?;

        sqlx::query(SCHEMA)
            .execute(&pool)
            .await
            .context("Failed to create recommendations table")?;

        info!(url, "History store ready");
        Ok(Self { pool })
    }

    /// Append one emitted recommendation and its stake plan.
    pub async fn record(&self, rec: &Recommendation, plan: &StakePlan) -> Result<()> {
        let c = &rec.candidate;
        let e = &rec.event;
        sqlx::query(
            r#"
            INSERT INTO recommendations (
                recorded_at, event_id, sport, league, match_name, start_time,
                outcome_id, bookmaker, tier, odds, fair_probability, edge, confidence,
                cons_stake, smart_stake, agg_stake,
                cons_exp_profit, smart_exp_profit, agg_exp_profit
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(&c.event_id)
        .bind(e.sport_name())
        .bind(e.league())
        .bind(format!("{} vs {}", e.home_team, e.away_team))
        .bind(e.start_time.to_rfc3339())
        .bind(&c.outcome_id)
        .bind(&c.bookmaker_id)
        .bind(tier_key(rec.tier))
        .bind(c.decimal_odds)
        .bind(c.fair_probability)
        .bind(c.edge_value)
        .bind(c.confidence)
        .bind(real(plan.conservative.units))
        .bind(real(plan.smart.units))
        .bind(real(plan.aggressive.units))
        .bind(real(plan.conservative.expected_profit))
        .bind(real(plan.smart.expected_profit))
        .bind(real(plan.aggressive.expected_profit))
        .execute(&self.pool)
        .await
        .context("Failed to insert recommendation")?;

        debug!(fingerprint = %rec.fingerprint(), "Recommendation recorded");
        Ok(())
    }

    /// Expected ROI over all three stake profiles, optionally for one tier.
    pub async fn expected_roi(&self, tier: Option<Tier>) -> Result<RoiSummary> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS bets,
                SUM(cons_stake + smart_stake + agg_stake) AS staked,
                SUM(cons_exp_profit + smart_exp_profit + agg_exp_profit) AS profit
            FROM recommendations
            WHERE ?1 IS NULL OR tier = ?1
            "#,
        )
        .bind(tier.map(tier_key))
        .fetch_one(&self.pool)
        .await
        .context("Failed to query expected ROI")?;

        let bets: i64 = row.try_get("bets")?;
        let staked: Option<f64> = row.try_get("staked")?;
        let profit: Option<f64> = row.try_get("profit")?;
        let staked = staked.unwrap_or(0.0);
        let expected_profit = profit.unwrap_or(0.0);
        let roi_pct = if staked > 0.0 { expected_profit / staked * 100.0 } else { 0.0 };

        Ok(RoiSummary { tier, bets, staked, expected_profit, roi_pct })
    }

    /// Rows recorded so far.
    pub async fn count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM recommendations")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count recommendations")?;
        Ok(row.try_get("n")?)
    }
}

fn tier_key(tier: Tier) -> &'static str {
    match tier {
        Tier::Safe => "safe",
        Tier::Best => "best",
        Tier::Speculative => "speculative",
    }
}

fn real(d: Decimal) -> f64 {
    d.to_f64().unwrap_or(0.0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
