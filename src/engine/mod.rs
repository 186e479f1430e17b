//! Evaluation engine: normalize → estimate → score → classify → select.
//!
//! [`evaluate`] is one complete cycle over a single odds batch. It is a pure
//! function of (batch, configuration, fingerprint memory); the memory is only
//! touched once the cycle has fully succeeded.

pub mod dedup;
pub mod normalizer;

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::provider::OddsBatch;
use crate::strategy::edge::ValueScorer;
use crate::strategy::probability::ProbabilityEstimator;
use crate::strategy::tiers::TierClassifier;
use crate::types::{CycleReport, Recommendation, Tier, TierMap, ValuebetsError};
use dedup::{Deduplicator, FingerprintMemory};
use normalizer::{Normalizer, Rejection};

/// Everything a cycle produces.
#[derive(Debug, Clone)]
pub struct CycleOutput {
    pub recommendations: TierMap,
    pub rejections: Vec<Rejection>,
    pub report: CycleReport,
}

/// Run one evaluation cycle.
///
/// Fails only on an invalid configuration (including a cool-down that would
/// run past the clock at `now`), before any input or memory is examined. Malformed records are dropped and reported, never fatal.
pub fn evaluate(
    batch: &OddsBatch,
    config: &EngineConfig,
    memory: &mut FingerprintMemory,
    now: DateTime<Utc>,
) -> Result<CycleOutput, ValuebetsError> {
    config.validate()?;
    let dedup = Deduplicator::new(config);
    dedup.expires_at(now)?;

    let expired = memory.purge_expired(now);
    if expired > 0 {
        debug!(expired, remaining = memory.len(), "Expired fingerprints purged");
    }

    // Step 1 – normalize
    let normalized = Normalizer::new(config).normalize(batch, now);

    // Step 2 – fair probabilities
    let fair = ProbabilityEstimator::new(config).estimate(&normalized.quotes);

    // Step 3 – value scoring
    let scored = ValueScorer::new(config).score(&normalized.quotes, &fair, now);

    // Step 4 – tier classification
    let classifier = TierClassifier::from_config(config);
    let classified: Vec<Recommendation> = scored
        .iter()
        .filter_map(|c| {
            let tier = classifier.classify(c)?;
            let event = normalized.events.get(&c.event_id)?;
            Some(Recommendation { tier, candidate: c.clone(), event: event.clone() })
        })
        .collect();
    let candidates_classified = classified.len();

    // Step 5 – dedup, suppress, cap
    let selection = dedup.select(classified, memory, now);
    dedup.commit(memory, &selection.recommendations, now)?;

    let emitted: BTreeMap<_, _> = selection
        .recommendations
        .iter()
        .map(|(tier, recs)| (*tier, recs.len()))
        .collect();

    let report = CycleReport {
        cycle_id: uuid::Uuid::new_v4(),
        evaluated_at: now,
        events: normalized.events.len(),
        quotes_in: normalized.quotes_in,
        quotes_accepted: normalized.quotes.len(),
        rejections: normalized.rejections.len(),
        outcomes_estimated: fair.len(),
        candidates_scored: scored.len(),
        candidates_classified,
        suppressed: selection.suppressed,
        emitted,
    };

    info!(
        cycle_id = %report.cycle_id,
        events = report.events,
        quotes = report.quotes_accepted,
        rejected = report.rejections,
        outcomes = report.outcomes_estimated,
        scored = report.candidates_scored,
        classified = report.candidates_classified,
        suppressed = report.suppressed,
        emitted = report.total_emitted(),
        "Evaluation cycle complete"
    );

    Ok(CycleOutput {
        recommendations: selection.recommendations,
        rejections: normalized.rejections,
        report,
    })
}

// ---------------------------------------------------------------------------
// Stateful wrapper
// ---------------------------------------------------------------------------

/// Owns the configuration and the cross-cycle memory. Cycles run one at a
/// time through `&mut self`.
pub struct ValueEngine {
    config: EngineConfig,
    memory: FingerprintMemory,
    cycles: u64,
}

impl ValueEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_memory(config, FingerprintMemory::new())
    }

    /// Resume with memory restored from a previous run.
    pub fn with_memory(config: EngineConfig, memory: FingerprintMemory) -> Self {
        Self { config, memory, cycles: 0 }
    }

    pub fn run_cycle(&mut self, batch: &OddsBatch, now: DateTime<Utc>) -> Result<CycleOutput, ValuebetsError> {
        let output = evaluate(batch, &self.config, &mut self.memory, now)?;
        self.cycles += 1;
        Ok(output)
    }

    /// Forget the fingerprints of recommendations in `tiers` so a failed
    /// delivery is retried next cycle instead of sitting out the cool-down.
    pub fn release_undelivered(&mut self, recommendations: &TierMap, tiers: &[Tier]) -> usize {
        let released = tiers
            .iter()
            .filter_map(|tier| recommendations.get(tier))
            .flatten()
            .filter(|rec| self.memory.forget(&rec.fingerprint()))
            .count();
        if released > 0 {
            info!(released, "Undelivered recommendations released for retry");
        }
        released
    }

    pub fn memory(&self) -> &FingerprintMemory {
        &self.memory
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cycles_run(&self) -> u64 {
        self.cycles
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
