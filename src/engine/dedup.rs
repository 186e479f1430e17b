//! Deduplication and selection.
//!
//! Within a cycle, keeps the best-priced candidate per (event, outcome, tier)
//! and caps each tier. Across cycles, a bounded fingerprint memory suppresses
//! anything already emitted inside the cool-down window.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use crate::config::EngineConfig;
use crate::types::{Fingerprint, Recommendation, TierMap, ValuebetsError};

// ---------------------------------------------------------------------------
// Fingerprint memory
// ---------------------------------------------------------------------------

/// Persisted form of one remembered fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub fingerprint: Fingerprint,
    pub expires_at: DateTime<Utc>,
}

/// Time-indexed set of emitted fingerprints (fingerprint → expiry).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<MemoryEntry>", into = "Vec<MemoryEntry>")]
pub struct FingerprintMemory {
    entries: HashMap<Fingerprint, DateTime<Utc>>,
}

impl From<Vec<MemoryEntry>> for FingerprintMemory {
    fn from(entries: Vec<MemoryEntry>) -> Self {
        Self::from_entries(entries)
    }
}

impl From<FingerprintMemory> for Vec<MemoryEntry> {
    fn from(memory: FingerprintMemory) -> Self {
        let mut entries: Vec<MemoryEntry> = memory
            .entries
            .into_iter()
            .map(|(fingerprint, expires_at)| MemoryEntry { fingerprint, expires_at })
            .collect();
        entries.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));
        entries
    }
}

impl FingerprintMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted entries; a duplicate keeps its latest expiry.
    pub fn from_entries(entries: impl IntoIterator<Item = MemoryEntry>) -> Self {
        let mut memory = Self::new();
        for e in entries {
            memory.remember(e.fingerprint, e.expires_at);
        }
        memory
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn expiry(&self, fingerprint: &Fingerprint) -> Option<DateTime<Utc>> {
        self.entries.get(fingerprint).copied()
    }

    /// Suppressed while `now` is strictly before the stored expiry.
    pub fn is_suppressed(&self, fingerprint: &Fingerprint, now: DateTime<Utc>) -> bool {
        self.entries.get(fingerprint).is_some_and(|expiry| now < *expiry)
    }

    /// Record a fingerprint; never shortens an existing expiry.
    pub fn remember(&mut self, fingerprint: Fingerprint, expires_at: DateTime<Utc>) {
        self.entries
            .entry(fingerprint)
            .and_modify(|e| *e = (*e).max(expires_at))
            .or_insert(expires_at);
    }

    /// Drop a fingerprint so it can be emitted again. Returns whether it was held.
    pub fn forget(&mut self, fingerprint: &Fingerprint) -> bool {
        self.entries.remove(fingerprint).is_some()
    }

    /// Drop every entry whose cool-down has elapsed. Returns how many went.
    pub fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, expiry| now < *expiry);
        before - self.entries.len()
    }

    /// Evict the soonest-expiring entries until at most `capacity` remain.
    pub fn enforce_capacity(&mut self, capacity: usize) -> usize {
        if self.entries.len() <= capacity {
            return 0;
        }
        let mut by_expiry: Vec<(DateTime<Utc>, Fingerprint)> =
            self.entries.iter().map(|(fp, exp)| (*exp, fp.clone())).collect();
        by_expiry.sort();
        let excess = self.entries.len() - capacity;
        for (_, fp) in by_expiry.into_iter().take(excess) {
            self.entries.remove(&fp);
        }
        excess
    }

    pub fn entries(&self) -> impl Iterator<Item = (&Fingerprint, &DateTime<Utc>)> {
        self.entries.iter()
    }
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// Selector output for one cycle.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub recommendations: TierMap,
    /// Blocked by the cross-cycle cool-down.
    pub suppressed: usize,
    /// Lost to a better-priced duplicate within the cycle.
    pub collapsed: usize,
    /// Dropped by the per-tier cap.
    pub capped: usize,
}

pub struct Deduplicator<'a> {
    config: &'a EngineConfig,
}

impl<'a> Deduplicator<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Pick this cycle's output. Reads `memory` but does not change it;
    /// call [`Deduplicator::commit`] once the cycle has succeeded.
    pub fn select(
        &self,
        recommendations: Vec<Recommendation>,
        memory: &FingerprintMemory,
        now: DateTime<Utc>,
    ) -> Selection {
        let mut selection = Selection::default();

        // Best price per fingerprint
        let mut best: HashMap<Fingerprint, Recommendation> = HashMap::new();
        for rec in recommendations {
            let fp = rec.fingerprint();
            match best.get_mut(&fp) {
                Some(current) => {
                    selection.collapsed += 1;
                    if beats(&rec, current) {
                        *current = rec;
                    }
                }
                None => {
                    best.insert(fp, rec);
                }
            }
        }

        let mut per_tier: TierMap = BTreeMap::new();
        for (fp, rec) in best {
            if memory.is_suppressed(&fp, now) {
                debug!(fingerprint = %fp, "Suppressed by cool-down");
                selection.suppressed += 1;
                continue;
            }
            per_tier.entry(rec.tier).or_default().push(rec);
        }

        for (tier, mut recs) in per_tier {
            recs.sort_by(|a, b| {
                b.candidate
                    .edge_value
                    .total_cmp(&a.candidate.edge_value)
                    .then_with(|| a.candidate.event_id.cmp(&b.candidate.event_id))
                    .then_with(|| a.candidate.outcome_id.cmp(&b.candidate.outcome_id))
            });
            let cap = self.config.cap_for(tier);
            if recs.len() > cap {
                selection.capped += recs.len() - cap;
                recs.truncate(cap);
            }
            selection.recommendations.insert(tier, recs);
        }

        selection
    }

    /// Expiry for fingerprints emitted at `now`. `None` when the cool-down
    /// is disabled.
    pub fn expires_at(&self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, ValuebetsError> {
        let cooldown = self.config.dedup_cooldown();
        if cooldown <= chrono::Duration::zero() {
            return Ok(None);
        }
        now.checked_add_signed(cooldown).map(Some).ok_or_else(|| {
            ValuebetsError::Config(format!(
                "dedup_cooldown_secs {} overflows the clock at {now}",
                self.config.dedup_cooldown_secs
            ))
        })
    }

    /// Remember every emitted fingerprint until `now + dedup_cooldown`.
    /// Memory is left untouched when the expiry cannot be represented.
    pub fn commit(
        &self,
        memory: &mut FingerprintMemory,
        emitted: &TierMap,
        now: DateTime<Utc>,
    ) -> Result<(), ValuebetsError> {
        let Some(expires_at) = self.expires_at(now)? else {
            return Ok(());
        };
        for rec in emitted.values().flatten() {
            memory.remember(rec.fingerprint(), expires_at);
        }
        let evicted = memory.enforce_capacity(self.config.dedup_capacity);
        if evicted > 0 {
            debug!(evicted, capacity = self.config.dedup_capacity, "Fingerprint memory trimmed");
        }
        Ok(())
    }
}

/// Higher edge wins; equal edges go to the lexically first bookmaker.
fn beats(challenger: &Recommendation, current: &Recommendation) -> bool {
    let (a, b) = (&challenger.candidate, &current.candidate);
    match a.edge_value.total_cmp(&b.edge_value) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Equal => a.bookmaker_id < b.bookmaker_id,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Event, ScoredCandidate, Tier};
    use chrono::{Duration, TimeZone};
    use std::collections::HashSet;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 28, 12, 0, 0).unwrap()
    }

    fn rec(event: &str, outcome: &str, book: &str, edge: f64, tier: Tier) -> Recommendation {
        Recommendation {
            tier,
            candidate: ScoredCandidate {
                event_id: event.into(),
                market: "h2h".into(),
                outcome_id: format!("h2h/{outcome}"),
                selection: outcome.into(),
                bookmaker_id: book.into(),
                decimal_odds: 2.0 + edge,
                fair_probability: 0.5,
                edge_value: edge,
                confidence: 0.9,
                observed_at: now(),
            },
            event: Event {
                event_id: event.into(),
                sport: "soccer_epl".into(),
                sport_title: "EPL".into(),
                home_team: "A".into(),
                away_team: "B".into(),
                start_time: now() + Duration::days(1),
            },
        }
    }

    fn fp(event: &str, outcome: &str, tier: Tier) -> Fingerprint {
        Fingerprint { event_id: event.into(), outcome_id: format!("h2h/{outcome}"), tier }
    }

    #[test]
    fn test_best_price_per_fingerprint() {
        let cfg = EngineConfig::default();
        let recs = vec![
            rec("e1", "x", "a", 0.03, Tier::Safe),
            rec("e1", "x", "b", 0.06, Tier::Safe),
            rec("e1", "x", "c", 0.04, Tier::Safe),
        ];
        let sel = Deduplicator::new(&cfg).select(recs, &FingerprintMemory::new(), now());
        let safe = &sel.recommendations[&Tier::Safe];
        assert_eq!(safe.len(), 1);
        assert_eq!(safe[0].candidate.bookmaker_id, "b");
        assert_eq!(sel.collapsed, 2);
    }

    #[test]
    fn test_equal_edge_tie_breaks_on_bookmaker() {
        let cfg = EngineConfig::default();
        let recs = vec![rec("e1", "x", "zeta", 0.05, Tier::Best), rec("e1", "x", "alpha", 0.05, Tier::Best)];
        let sel = Deduplicator::new(&cfg).select(recs, &FingerprintMemory::new(), now());
        assert_eq!(sel.recommendations[&Tier::Best][0].candidate.bookmaker_id, "alpha");
    }

    #[test]
    fn test_same_outcome_different_tiers_both_kept() {
        let cfg = EngineConfig::default();
        let recs = vec![rec("e1", "x", "a", 0.05, Tier::Safe), rec("e1", "x", "b", 0.08, Tier::Best)];
        let sel = Deduplicator::new(&cfg).select(recs, &FingerprintMemory::new(), now());
        assert_eq!(sel.recommendations[&Tier::Safe].len(), 1);
        assert_eq!(sel.recommendations[&Tier::Best].len(), 1);
    }

    #[test]
    fn test_no_duplicate_fingerprints_in_output() {
        let cfg = EngineConfig::default();
        let mut recs = Vec::new();
        for book in ["a", "b", "c", "d"] {
            for outcome in ["x", "y"] {
                recs.push(rec("e1", outcome, book, 0.02 + book.len() as f64 * 0.01, Tier::Speculative));
            }
        }
        let sel = Deduplicator::new(&cfg).select(recs, &FingerprintMemory::new(), now());
        let mut seen = HashSet::new();
        for r in sel.recommendations.values().flatten() {
            assert!(seen.insert(r.fingerprint()));
        }
    }

    #[test]
    fn test_per_tier_cap_keeps_top_edges() {
        let cfg = EngineConfig { per_tier_cap: 2, ..EngineConfig::default() };
        let recs = vec![
            rec("e1", "x", "a", 0.03, Tier::Speculative),
            rec("e2", "x", "a", 0.09, Tier::Speculative),
            rec("e3", "x", "a", 0.06, Tier::Speculative),
        ];
        let sel = Deduplicator::new(&cfg).select(recs, &FingerprintMemory::new(), now());
        let spec: Vec<_> = sel.recommendations[&Tier::Speculative]
            .iter()
            .map(|r| r.candidate.event_id.as_str())
            .collect();
        assert_eq!(spec, vec!["e2", "e3"]);
        assert_eq!(sel.capped, 1);
    }

    #[test]
    fn test_tier_cap_override() {
        let mut cfg = EngineConfig::default();
        cfg.tier_caps.insert(Tier::Best, 1);
        let recs = vec![rec("e1", "x", "a", 0.07, Tier::Best), rec("e2", "x", "a", 0.08, Tier::Best)];
        let sel = Deduplicator::new(&cfg).select(recs, &FingerprintMemory::new(), now());
        assert_eq!(sel.recommendations[&Tier::Best].len(), 1);
        assert_eq!(sel.recommendations[&Tier::Best][0].candidate.event_id, "e2");
    }

    #[test]
    fn test_suppressed_within_cooldown() {
        let cfg = EngineConfig::default();
        let dedup = Deduplicator::new(&cfg);
        let mut memory = FingerprintMemory::new();

        let first = dedup.select(vec![rec("e1", "x", "a", 0.05, Tier::Safe)], &memory, now());
        dedup.commit(&mut memory, &first.recommendations, now()).unwrap();
        assert_eq!(memory.len(), 1);

        // Edge moved, still the same fingerprint
        let later = now() + Duration::hours(1);
        let second = dedup.select(vec![rec("e1", "x", "b", 0.09, Tier::Safe)], &memory, later);
        assert!(second.recommendations.is_empty());
        assert_eq!(second.suppressed, 1);
    }

    #[test]
    fn test_re_emitted_after_cooldown() {
        let cfg = EngineConfig::default(); // 6h
        let dedup = Deduplicator::new(&cfg);
        let mut memory = FingerprintMemory::new();
        let first = dedup.select(vec![rec("e1", "x", "a", 0.05, Tier::Safe)], &memory, now());
        dedup.commit(&mut memory, &first.recommendations, now()).unwrap();

        let after = now() + Duration::hours(6);
        let again = dedup.select(vec![rec("e1", "x", "a", 0.05, Tier::Safe)], &memory, after);
        assert_eq!(again.recommendations[&Tier::Safe].len(), 1);
    }

    #[test]
    fn test_suppressed_do_not_consume_cap() {
        let cfg = EngineConfig { per_tier_cap: 1, ..EngineConfig::default() };
        let mut memory = FingerprintMemory::new();
        memory.remember(fp("e1", "x", Tier::Safe), now() + Duration::hours(1));
        let recs = vec![rec("e1", "x", "a", 0.09, Tier::Safe), rec("e2", "x", "a", 0.03, Tier::Safe)];
        let sel = Deduplicator::new(&cfg).select(recs, &memory, now());
        assert_eq!(sel.recommendations[&Tier::Safe][0].candidate.event_id, "e2");
    }

    #[test]
    fn test_zero_cooldown_never_suppresses() {
        let cfg = EngineConfig { dedup_cooldown_secs: 0, ..EngineConfig::default() };
        let dedup = Deduplicator::new(&cfg);
        let mut memory = FingerprintMemory::new();
        let first = dedup.select(vec![rec("e1", "x", "a", 0.05, Tier::Safe)], &memory, now());
        dedup.commit(&mut memory, &first.recommendations, now()).unwrap();
        assert!(memory.is_empty());
    }

    #[test]
    fn test_purge_expired() {
        let mut memory = FingerprintMemory::new();
        memory.remember(fp("e1", "x", Tier::Safe), now() - Duration::seconds(1));
        memory.remember(fp("e2", "x", Tier::Safe), now());
        memory.remember(fp("e3", "x", Tier::Safe), now() + Duration::seconds(1));
        assert_eq!(memory.purge_expired(now()), 2);
        assert_eq!(memory.len(), 1);
        assert!(memory.is_suppressed(&fp("e3", "x", Tier::Safe), now()));
    }

    #[test]
    fn test_remember_never_shortens_expiry() {
        let mut memory = FingerprintMemory::new();
        let f = fp("e1", "x", Tier::Best);
        memory.remember(f.clone(), now() + Duration::hours(2));
        memory.remember(f.clone(), now() + Duration::hours(1));
        assert_eq!(memory.expiry(&f), Some(now() + Duration::hours(2)));
    }

    #[test]
    fn test_capacity_evicts_soonest_expiring() {
        let mut memory = FingerprintMemory::new();
        for i in 0..5 {
            memory.remember(fp(&format!("e{i}"), "x", Tier::Safe), now() + Duration::minutes(i + 1));
        }
        assert_eq!(memory.enforce_capacity(3), 2);
        assert_eq!(memory.len(), 3);
        assert!(memory.expiry(&fp("e0", "x", Tier::Safe)).is_none());
        assert!(memory.expiry(&fp("e1", "x", Tier::Safe)).is_none());
        assert!(memory.expiry(&fp("e4", "x", Tier::Safe)).is_some());
    }

    #[test]
    fn test_commit_past_clock_limit_is_error() {
        let cfg = EngineConfig::default(); // 6h
        let dedup = Deduplicator::new(&cfg);
        let edge_of_time = DateTime::<Utc>::MAX_UTC - Duration::hours(1);
        let mut memory = FingerprintMemory::new();
        memory.remember(fp("e0", "x", Tier::Safe), DateTime::<Utc>::MAX_UTC);
        let before = memory.clone();

        let sel = dedup.select(vec![rec("e1", "x", "a", 0.05, Tier::Safe)], &memory, edge_of_time);
        let err = dedup.commit(&mut memory, &sel.recommendations, edge_of_time).unwrap_err();
        assert!(matches!(err, ValuebetsError::Config(_)));
        assert_eq!(memory, before);
    }

    #[test]
    fn test_forget_releases_fingerprint() {
        let mut memory = FingerprintMemory::new();
        let f = fp("e1", "x", Tier::Safe);
        memory.remember(f.clone(), now() + Duration::hours(1));
        assert!(memory.forget(&f));
        assert!(!memory.is_suppressed(&f, now()));
        assert!(!memory.forget(&f));
    }

    #[test]
    fn test_commit_respects_capacity() {
        let cfg = EngineConfig { dedup_capacity: 2, ..EngineConfig::default() };
        let dedup = Deduplicator::new(&cfg);
        let mut memory = FingerprintMemory::new();
        let recs = (0..4).map(|i| rec(&format!("e{i}"), "x", "a", 0.05, Tier::Speculative)).collect();
        let sel = dedup.select(recs, &memory, now());
        dedup.commit(&mut memory, &sel.recommendations, now()).unwrap();
        assert_eq!(memory.len(), 2);
    }

    #[test]
    fn test_memory_serde_round_trip() {
        let mut memory = FingerprintMemory::new();
        memory.remember(fp("e1", "x", Tier::Safe), now() + Duration::hours(1));
        let json = serde_json::to_string(&memory).unwrap();
        assert!(json.starts_with('['));
        let back: FingerprintMemory = serde_json::from_str(&json).unwrap();
        assert_eq!(back, memory);
    }
}
