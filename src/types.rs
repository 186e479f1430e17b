//! Shared types for the VALUEBETS engine.
//!
//! These types form the data model used across all modules. Every pipeline
//! stage produces a fresh collection of these records; nothing downstream
//! mutates a record produced upstream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// A sporting fixture as reported by the odds provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    /// Provider sport key, e.g. `soccer_epl`.
    pub sport: String,
    /// Human-readable sport/league title, e.g. `EPL`.
    pub sport_title: String,
    pub home_team: String,
    pub away_team: String,
    pub start_time: DateTime<Utc>,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} vs {} ({}, {})",
            self.home_team,
            self.away_team,
            self.sport_title,
            self.start_time.format("%d/%m/%y %H:%M"),
        )
    }
}

impl Event {
    /// Ordered competitor pair (home, away).
    pub fn competitors(&self) -> (&str, &str) {
        (&self.home_team, &self.away_team)
    }

    /// Time from `now` until kick-off. Negative once the event has started.
    pub fn time_to_start(&self, now: DateTime<Utc>) -> chrono::Duration {
        self.start_time - now
    }

    /// Sport display name derived from the provider key (`soccer_epl` → `Soccer`).
    pub fn sport_name(&self) -> String {
        let key = self.sport.to_lowercase();
        let group = if key.contains("soccer") {
            "soccer"
        } else {
            key.split('_').next().unwrap_or_default()
        };
        let name = match group {
            "soccer" => "Soccer",
            "americanfootball" => "American Football",
            "basketball" => "Basketball",
            "baseball" => "Baseball",
            "icehockey" => "Ice Hockey",
            "tennis" => "Tennis",
            "mma" => "MMA",
            "boxing" => "Boxing",
            "cricket" => "Cricket",
            "aussierules" => "Aussie Rules",
            "rugbyleague" => "Rugby League",
            "rugbyunion" => "Rugby Union",
            "esports" => "Esports",
            "golf" => "Golf",
            "" => return "Unknown Sport".to_string(),
            other => {
                let mut chars = other.chars();
                return match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => "Unknown Sport".to_string(),
                };
            }
        };
        name.to_string()
    }

    /// League name. The provider title is either the league itself (`EPL`)
    /// or `Sport - League`; an empty title gives `Unknown League`.
    pub fn league(&self) -> String {
        let title = self.sport_title.trim();
        if let Some((_, league)) = title.split_once(" - ") {
            if !league.trim().is_empty() {
                return league.trim().to_string();
            }
        }
        if title.is_empty() {
            "Unknown League".to_string()
        } else {
            title.to_string()
        }
    }
}

// ---------------------------------------------------------------------------
// Quotes
// ---------------------------------------------------------------------------

/// One bookmaker's price for one outcome, in canonical form.
///
/// `decimal_odds` is always > 1.0; the normalizer rejects anything else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OddsQuote {
    pub event_id: String,
    /// Canonical market key (`h2h`, `totals:2.5`, `spreads:-1.5`, ...).
    pub market: String,
    /// Canonical outcome id, unique within the event: `<market>/<selection>`.
    pub outcome_id: String,
    /// Normalised selection name (`arsenal`, `draw`, `over`, ...).
    pub selection: String,
    pub bookmaker_id: String,
    pub decimal_odds: f64,
    pub observed_at: DateTime<Utc>,
}

impl OddsQuote {
    /// Probability implied by the price before removing overround.
    pub fn implied_probability(&self) -> f64 {
        1.0 / self.decimal_odds
    }
}

/// Build the canonical outcome id for a selection within a market.
pub fn outcome_id(market: &str, selection: &str) -> String {
    format!("{market}/{selection}")
}

/// Consensus probability for one outcome, derived from all bookmakers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FairProbability {
    pub event_id: String,
    pub market: String,
    pub outcome_id: String,
    /// Devigged, weight-averaged probability in (0, 1).
    pub probability: f64,
    /// Estimator confidence in [0, 1]; low when only one book contributed.
    pub confidence: f64,
    /// Number of bookmakers whose devigged price contributed (weight > 0).
    pub contributing_books: usize,
}

impl FairProbability {
    /// Fewer than two independent books: the probability is not peer-checked.
    pub fn is_low_confidence(&self) -> bool {
        self.contributing_books < 2
    }
}

/// A single (event, outcome, bookmaker) price evaluated against the
/// outcome's fair probability. Only positive-edge candidates exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub event_id: String,
    pub market: String,
    pub outcome_id: String,
    pub selection: String,
    pub bookmaker_id: String,
    pub decimal_odds: f64,
    pub fair_probability: f64,
    /// Expected return per unit staked: `odds × fair_probability − 1`.
    pub edge_value: f64,
    pub confidence: f64,
    pub observed_at: DateTime<Utc>,
}

impl ScoredCandidate {
    pub fn implied_probability(&self) -> f64 {
        1.0 / self.decimal_odds
    }
}

// ---------------------------------------------------------------------------
// Tier
// ---------------------------------------------------------------------------

/// Risk/return bucket a recommendation is routed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// High fair probability, modest edge ("quick return").
    Safe,
    /// Strongest signal regardless of probability band.
    Best,
    /// Low probability, higher payoff ("longer play").
    Speculative,
}

impl Tier {
    /// Default rule evaluation order.
    pub const ALL: &'static [Tier] = &[Tier::Safe, Tier::Best, Tier::Speculative];

    /// Channel label used by output collaborators.
    pub fn channel_label(&self) -> &'static str {
        match self {
            Tier::Safe => "Safe / Quick Return",
            Tier::Best => "Best Bet",
            Tier::Speculative => "Speculative / Longer Play",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Safe => write!(f, "SAFE"),
            Tier::Best => write!(f, "BEST"),
            Tier::Speculative => write!(f, "SPECULATIVE"),
        }
    }
}

impl std::str::FromStr for Tier {
    type Err = ValuebetsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "safe" | "quick" => Ok(Tier::Safe),
            "best" => Ok(Tier::Best),
            "speculative" | "spec" | "long" => Ok(Tier::Speculative),
            other => Err(ValuebetsError::Config(format!("unknown tier: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Recommendation
// ---------------------------------------------------------------------------

/// Identity of a recommendation for cross-cycle suppression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint {
    pub event_id: String,
    pub outcome_id: String,
    pub tier: Tier,
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.event_id, self.outcome_id, self.tier)
    }
}

/// A scored candidate tagged with its tier, ready for delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub tier: Tier,
    pub candidate: ScoredCandidate,
    pub event: Event,
}

impl Recommendation {
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint {
            event_id: self.candidate.event_id.clone(),
            outcome_id: self.candidate.outcome_id.clone(),
            tier: self.tier,
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = &self.candidate;
        write!(
            f,
            "[{}] {} | {} @ {:.2} ({}) | fair {:.1}% | edge {:+.1}% | conf {:.0}%",
            self.tier,
            self.event,
            c.outcome_id,
            c.decimal_odds,
            c.bookmaker_id,
            c.fair_probability * 100.0,
            c.edge_value * 100.0,
            c.confidence * 100.0,
        )
    }
}

/// Output of one cycle: ordered recommendations per tier.
pub type TierMap = BTreeMap<Tier, Vec<Recommendation>>;

// ---------------------------------------------------------------------------
// Cycle report
// ---------------------------------------------------------------------------

/// Stage-by-stage counts for a single evaluation cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle_id: uuid::Uuid,
    pub evaluated_at: DateTime<Utc>,
    pub events: usize,
    pub quotes_in: usize,
    pub quotes_accepted: usize,
    pub rejections: usize,
    pub outcomes_estimated: usize,
    pub candidates_scored: usize,
    pub candidates_classified: usize,
    pub suppressed: usize,
    pub emitted: BTreeMap<Tier, usize>,
}

impl CycleReport {
    pub fn total_emitted(&self) -> usize {
        self.emitted.values().sum()
    }
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cycle {}: events={} quotes={}/{} rejected={} outcomes={} scored={} classified={} suppressed={} emitted={}",
            self.cycle_id,
            self.events,
            self.quotes_accepted,
            self.quotes_in,
            self.rejections,
            self.outcomes_estimated,
            self.candidates_scored,
            self.candidates_classified,
            self.suppressed,
            self.total_emitted(),
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for VALUEBETS.
#[derive(Debug, thiserror::Error)]
pub enum ValuebetsError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Odds provider error ({provider}): {message}")]
    Provider { provider: String, message: String },

    #[error("Sink error ({sink}): {message}")]
    Sink { sink: String, message: String },

    #[error("Storage error: {0}")]
    Storage(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
