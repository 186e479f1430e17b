//! Output collaborators.
//!
//! The engine returns a tier → recommendations map; a `RecommendationSink`
//! delivers each tier's list to that tier's destination.

pub mod webhook;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::types::{Recommendation, Tier, TierMap};

/// Destination for one tier's recommendations.
#[async_trait]
pub trait RecommendationSink: Send + Sync {
    /// Deliver an ordered list for `tier`. Called once per non-empty tier.
    async fn deliver(&self, tier: Tier, recommendations: &[Recommendation]) -> Result<()>;

    /// Announce a cycle that produced nothing.
    async fn notify_empty(&self) -> Result<()> {
        Ok(())
    }

    /// Sink name for logging and identification.
    fn name(&self) -> &str;
}

/// Logs every recommendation. Used when no webhook is configured.
pub struct TracingSink;

#[async_trait]
impl RecommendationSink for TracingSink {
    async fn deliver(&self, tier: Tier, recommendations: &[Recommendation]) -> Result<()> {
        for (rank, rec) in recommendations.iter().enumerate() {
            info!(
                tier = %tier,
                channel = tier.channel_label(),
                rank = rank + 1,
                event = %rec.event,
                outcome = %rec.candidate.outcome_id,
                bookmaker = %rec.candidate.bookmaker_id,
                odds = rec.candidate.decimal_odds,
                edge = format!("{:+.2}%", rec.candidate.edge_value * 100.0),
                confidence = format!("{:.0}%", rec.candidate.confidence * 100.0),
                "Recommendation"
            );
        }
        Ok(())
    }

    async fn notify_empty(&self) -> Result<()> {
        info!("No bets this cycle");
        Ok(())
    }

    fn name(&self) -> &str {
        "tracing"
    }
}

/// Outcome of delivering one cycle's output.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: Vec<(Tier, String)>,
}

impl DeliveryReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed_tiers(&self) -> Vec<Tier> {
        self.failed.iter().map(|(tier, _)| *tier).collect()
    }
}

/// Deliver every non-empty tier. A failing tier is logged and reported; the
/// remaining tiers are still attempted. An empty cycle gets one notice.
pub async fn deliver_all(sink: &dyn RecommendationSink, output: &TierMap) -> DeliveryReport {
    let mut report = DeliveryReport::default();
    if output.values().all(|recs| recs.is_empty()) {
        if let Err(e) = sink.notify_empty().await {
            warn!(sink = sink.name(), error = %e, "Empty-cycle notice failed");
        }
        return report;
    }
    for (tier, recs) in output {
        if recs.is_empty() {
            continue;
        }
        match sink.deliver(*tier, recs).await {
            Ok(()) => report.delivered += recs.len(),
            Err(e) => {
                warn!(sink = sink.name(), tier = %tier, error = %e, "Delivery failed");
                report.failed.push((*tier, e.to_string()));
            }
        }
    }
    report
}
