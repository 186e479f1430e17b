//! Consensus ("fair") probability estimation.
//!
//! Each bookmaker's market is devigged proportionally (implied probabilities
//! scaled to sum to 1), then the devigged probabilities of every bookmaker
//! are combined per outcome with a trust-weighted average.

use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::config::EngineConfig;
use crate::types::{FairProbability, OddsQuote};

/// Implied probabilities of one bookmaker's market, rescaled to sum to 1.
///
/// Returns the devigged probabilities in input order together with the
/// overround (`Σ 1/odds − 1`). `None` for an empty market or invalid odds.
pub fn devig_proportional(decimal_odds: &[f64]) -> Option<(Vec<f64>, f64)> {
    if decimal_odds.is_empty() || decimal_odds.iter().any(|&o| !(o > 1.0)) {
        return None;
    }
    let implied: Vec<f64> = decimal_odds.iter().map(|&o| 1.0 / o).collect();
    let booksum: f64 = implied.iter().sum();
    let devigged = implied.iter().map(|p| p / booksum).collect();
    Some((devigged, booksum - 1.0))
}

/// Estimator confidence from the number of contributing bookmakers.
pub fn book_count_confidence(books: usize, config: &EngineConfig) -> f64 {
    match books {
        0 => 0.0,
        1 => config.single_book_confidence,
        n => (n as f64 / config.full_confidence_books as f64)
            .min(1.0)
            .max(config.single_book_confidence),
    }
}

#[derive(Default)]
struct Accumulator {
    weighted_sum: f64,
    weight: f64,
    books: usize,
}

pub struct ProbabilityEstimator<'a> {
    config: &'a EngineConfig,
}

impl<'a> ProbabilityEstimator<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Derive one fair probability per outcome that can be peer-compared.
    ///
    /// Only each bookmaker's latest quote per outcome is used. A bookmaker's
    /// market contributes only when it prices every outcome seen for that
    /// market and its overround is within `max_overround`. Markets with a
    /// single outcome across all books, and outcomes no usable book priced,
    /// produce nothing.
    pub fn estimate(&self, quotes: &[OddsQuote]) -> Vec<FairProbability> {
        // (event, market) → bookmaker → outcome → latest quote
        let mut markets: BTreeMap<(&str, &str), BTreeMap<&str, BTreeMap<&str, &OddsQuote>>> = BTreeMap::new();
        for q in quotes {
            let slot = markets
                .entry((q.event_id.as_str(), q.market.as_str()))
                .or_default()
                .entry(q.bookmaker_id.as_str())
                .or_default()
                .entry(q.outcome_id.as_str())
                .or_insert(q);
            if q.observed_at > slot.observed_at {
                *slot = q;
            }
        }

        let mut fair = Vec::new();
        for ((event_id, market), books) in &markets {
            let universe: BTreeSet<&str> = books.values().flat_map(|b| b.keys().copied()).collect();
            if universe.len() < 2 {
                debug!(event_id, market, "Single-outcome market dropped");
                continue;
            }

            let mut acc: BTreeMap<&str, Accumulator> = BTreeMap::new();
            for (bookmaker, book) in books {
                if book.len() != universe.len() {
                    debug!(
                        event_id,
                        market,
                        bookmaker,
                        priced = book.len(),
                        outcomes = universe.len(),
                        "Partial market excluded from consensus"
                    );
                    continue;
                }

                let weight = self.config.weight_for(bookmaker);
                if weight <= 0.0 {
                    continue;
                }

                let odds: Vec<f64> = book.values().map(|q| q.decimal_odds).collect();
                let Some((devigged, overround)) = devig_proportional(&odds) else {
                    continue;
                };
                if overround > self.config.max_overround {
                    debug!(
                        event_id,
                        market,
                        bookmaker,
                        overround = format!("{:.1}%", overround * 100.0),
                        "Overround too high, excluded from consensus"
                    );
                    continue;
                }

                for (outcome, p) in book.keys().zip(devigged) {
                    let a = acc.entry(*outcome).or_default();
                    a.weighted_sum += weight * p;
                    a.weight += weight;
                    a.books += 1;
                }
            }

            for outcome in &universe {
                let Some(a) = acc.get(outcome) else {
                    debug!(event_id, outcome, "No usable quotes, outcome dropped");
                    continue;
                };
                let probability = a.weighted_sum / a.weight;
                let estimate = FairProbability {
                    event_id: event_id.to_string(),
                    market: market.to_string(),
                    outcome_id: outcome.to_string(),
                    probability,
                    confidence: book_count_confidence(a.books, self.config),
                    contributing_books: a.books,
                };
                if estimate.is_low_confidence() {
                    debug!(event_id, outcome, "Single-book consensus, flagged low confidence");
                }
                fair.push(estimate);
            }
        }

        debug!(outcomes = fair.len(), "Fair probabilities estimated");
        fair
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
