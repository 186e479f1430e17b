//! Value scoring.
//!
//! Compares each bookmaker's offered price to the outcome's fair probability
//! and keeps the prices that pay more than the fair probability warrants.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tracing::debug;

use crate::config::EngineConfig;
use crate::types::{FairProbability, OddsQuote, ScoredCandidate};

/// Expected return per unit staked if `fair_probability` is correct.
pub fn edge_value(decimal_odds: f64, fair_probability: f64) -> f64 {
    decimal_odds * fair_probability - 1.0
}

/// Linear confidence decay: 1.0 for a fresh quote, 0.0 at the staleness
/// threshold. Quotes stamped in the future count as fresh.
pub fn recency_factor(age: Duration, staleness: Duration) -> f64 {
    if age <= Duration::zero() {
        return 1.0;
    }
    let age = age.num_milliseconds() as f64;
    let limit = staleness.num_milliseconds() as f64;
    (1.0 - age / limit).clamp(0.0, 1.0)
}

pub struct ValueScorer<'a> {
    config: &'a EngineConfig,
}

impl<'a> ValueScorer<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Score every bookmaker's latest price against its fair probability.
    ///
    /// Quotes without a fair probability, quotes whose consensus rests on
    /// fewer than `min_consensus_books` books, quotes at or past the staleness
    /// threshold, and non-positive edges are discarded. Results are sorted
    /// by edge, best first.
    pub fn score(
        &self,
        quotes: &[OddsQuote],
        fair: &[FairProbability],
        now: DateTime<Utc>,
    ) -> Vec<ScoredCandidate> {
        let fair_by_outcome: HashMap<(&str, &str), &FairProbability> = fair
            .iter()
            .map(|f| ((f.event_id.as_str(), f.outcome_id.as_str()), f))
            .collect();

        let mut latest: HashMap<(&str, &str, &str), &OddsQuote> = HashMap::new();
        for q in quotes {
            let slot = latest
                .entry((q.event_id.as_str(), q.outcome_id.as_str(), q.bookmaker_id.as_str()))
                .or_insert(q);
            if q.observed_at > slot.observed_at {
                *slot = q;
            }
        }

        let staleness = self.config.staleness_threshold();
        let mut candidates = Vec::new();

        for q in latest.into_values() {
            let Some(fp) = fair_by_outcome.get(&(q.event_id.as_str(), q.outcome_id.as_str())) else {
                continue;
            };
            if fp.contributing_books < self.config.min_consensus_books {
                debug!(
                    event_id = %q.event_id,
                    outcome = %q.outcome_id,
                    bookmaker = %q.bookmaker_id,
                    books = fp.contributing_books,
                    "Consensus too thin, quote not scored"
                );
                continue;
            }

            let age = now - q.observed_at;
            if age >= staleness {
                debug!(
                    event_id = %q.event_id,
                    outcome = %q.outcome_id,
                    bookmaker = %q.bookmaker_id,
                    age_secs = age.num_seconds(),
                    "Stale quote skipped"
                );
                continue;
            }

            let edge = edge_value(q.decimal_odds, fp.probability);
            if edge <= 0.0 {
                continue;
            }

            let confidence = fp.confidence * recency_factor(age, staleness);

            debug!(
                event_id = %q.event_id,
                outcome = %q.outcome_id,
                bookmaker = %q.bookmaker_id,
                odds = q.decimal_odds,
                fair = format!("{:.1}%", fp.probability * 100.0),
                edge = format!("{:+.2}%", edge * 100.0),
                confidence = format!("{:.0}%", confidence * 100.0),
                "Value detected"
            );

            candidates.push(ScoredCandidate {
                event_id: q.event_id.clone(),
                market: q.market.clone(),
                outcome_id: q.outcome_id.clone(),
                selection: q.selection.clone(),
                bookmaker_id: q.bookmaker_id.clone(),
                decimal_odds: q.decimal_odds,
                fair_probability: fp.probability,
                edge_value: edge,
                confidence,
                observed_at: q.observed_at,
            });
        }

        // Best opportunities first; identity breaks ties so output is stable
        candidates.sort_by(|a, b| {
            b.edge_value
                .total_cmp(&a.edge_value)
                .then_with(|| a.event_id.cmp(&b.event_id))
                .then_with(|| a.outcome_id.cmp(&b.outcome_id))
                .then_with(|| a.bookmaker_id.cmp(&b.bookmaker_id))
        });

        candidates
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
