//! Tier classification.
//!
//! An ordered rule table of (tier, predicate) pairs. Each scored candidate is
//! tested against the rules in order and takes the first tier whose predicate
//! holds; a candidate matching nothing is dropped.

use crate::config::EngineConfig;
use crate::types::{ScoredCandidate, Tier};

/// Threshold conjunction a candidate must satisfy. `None` bounds are ignored.
#[derive(Debug, Clone, PartialEq)]
pub struct RulePredicate {
    pub min_edge: f64,
    pub min_confidence: Option<f64>,
    /// Inclusive lower bound on fair probability.
    pub min_probability: Option<f64>,
    /// Exclusive upper bound on fair probability.
    pub below_probability: Option<f64>,
}

impl RulePredicate {
    pub fn matches(&self, c: &ScoredCandidate) -> bool {
        c.edge_value >= self.min_edge
            && self.min_confidence.map_or(true, |min| c.confidence >= min)
            && self.min_probability.map_or(true, |min| c.fair_probability >= min)
            && self.below_probability.map_or(true, |max| c.fair_probability < max)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TierRule {
    pub tier: Tier,
    pub predicate: RulePredicate,
}

#[derive(Debug, Clone)]
pub struct TierClassifier {
    rules: Vec<TierRule>,
}

impl TierClassifier {
    pub fn new(rules: Vec<TierRule>) -> Self {
        Self { rules }
    }

    /// Build the rule table in the configured tier order.
    pub fn from_config(config: &EngineConfig) -> Self {
        let rules = config
            .tier_order
            .iter()
            .map(|tier| Self::rule_for(*tier, config))
            .collect();
        Self { rules }
    }

    /// The rule a tier is judged by under `config`.
    pub fn rule_for(tier: Tier, config: &EngineConfig) -> TierRule {
        let predicate = match tier {
            Tier::Safe => RulePredicate {
                min_edge: config.min_safe_edge,
                min_confidence: Some(config.min_confidence),
                min_probability: Some(config.high_prob_threshold),
                below_probability: None,
            },
            // Strongest signal, any probability band
            Tier::Best => RulePredicate {
                min_edge: config.min_best_edge,
                min_confidence: Some(config.high_confidence_threshold),
                min_probability: None,
                below_probability: None,
            },
            Tier::Speculative => RulePredicate {
                min_edge: config.min_spec_edge,
                min_confidence: None,
                min_probability: None,
                below_probability: Some(config.high_prob_threshold),
            },
        };
        TierRule { tier, predicate }
    }

    /// First matching tier, or `None` when no rule applies.
    pub fn classify(&self, candidate: &ScoredCandidate) -> Option<Tier> {
        self.rules
            .iter()
            .find(|rule| rule.predicate.matches(candidate))
            .map(|rule| rule.tier)
    }

    pub fn rules(&self) -> &[TierRule] {
        &self.rules
    }
}
