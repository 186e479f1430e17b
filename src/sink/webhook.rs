//! Chat webhook delivery (Discord-compatible `{"content": ...}` payloads).
//!
//! Each tier posts to its own webhook URL. URLs are secrets resolved from
//! env vars named in `[sinks]`; a tier without a URL is skipped.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use super::RecommendationSink;
use crate::config::{AppConfig, SinksConfig};
use crate::strategy::stake::StakeAdvisor;
use crate::types::{Recommendation, Tier, ValuebetsError};

/// Chat services reject longer messages.
const MAX_CONTENT_CHARS: usize = 2000;

/// Posted to the best-bets channel when a cycle emits nothing.
pub const EMPTY_CYCLE_NOTICE: &str = "No bets this cycle.";

pub struct WebhookSink {
    http: Client,
    urls: BTreeMap<Tier, SecretString>,
    stakes: StakeAdvisor,
}

impl WebhookSink {
    pub fn new(urls: BTreeMap<Tier, SecretString>, stakes: StakeAdvisor) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .context("Failed to build HTTP client for webhooks")?;
        Ok(Self { http, urls, stakes })
    }

    /// Resolve every configured webhook env var. Returns `None` when no tier
    /// has a resolvable URL.
    pub fn from_config(config: &SinksConfig, stakes: StakeAdvisor) -> Result<Option<Self>> {
        let mut urls = BTreeMap::new();
        for tier in Tier::ALL {
            let Some(env) = config.webhook_env(*tier) else { continue };
            match AppConfig::resolve_env(env) {
                Ok(url) if !url.trim().is_empty() => {
                    urls.insert(*tier, SecretString::new(url));
                }
                _ => warn!(tier = %tier, env, "Webhook env var not set, tier will not be posted"),
            }
        }
        if urls.is_empty() {
            return Ok(None);
        }
        Self::new(urls, stakes).map(Some)
    }

    pub fn configured_tiers(&self) -> Vec<Tier> {
        self.urls.keys().copied().collect()
    }

    /// Message body for one recommendation.
    pub fn format_message(&self, tier: Tier, rec: &Recommendation) -> String {
        let plan = self.stakes.plan(rec);
        let mut msg = format!(
            "**{}**\n{}\nStakes: conservative {}u | smart {}u | aggressive {}u",
            tier.channel_label(),
            rec,
            plan.conservative.units,
            plan.smart.units,
            plan.aggressive.units,
        );
        if msg.chars().count() > MAX_CONTENT_CHARS {
            msg = msg.chars().take(MAX_CONTENT_CHARS).collect();
        }
        msg
    }

    async fn post(&self, url: &SecretString, content: String) -> Result<()> {
        let resp = self
            .http
            .post(url.expose_secret())
            .json(&serde_json::json!({ "content": content }))
            .send()
            .await
            .context("Webhook request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ValuebetsError::Sink {
                sink: "webhook".to_string(),
                message: format!("{status}: {body}"),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl RecommendationSink for WebhookSink {
    async fn deliver(&self, tier: Tier, recommendations: &[Recommendation]) -> Result<()> {
        let Some(url) = self.urls.get(&tier) else {
            debug!(tier = %tier, "No webhook for tier, skipping");
            return Ok(());
        };
        for rec in recommendations {
            self.post(url, self.format_message(tier, rec)).await?;
        }
        info!(tier = %tier, posted = recommendations.len(), "Tier posted");
        Ok(())
    }

    async fn notify_empty(&self) -> Result<()> {
        let Some(url) = self.urls.get(&Tier::Best) else {
            return Ok(());
        };
        self.post(url, EMPTY_CYCLE_NOTICE.to_string()).await
    }

    fn name(&self) -> &str {
        "webhook"
    }
}
