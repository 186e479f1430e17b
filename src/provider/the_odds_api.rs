//! The Odds API (v4) client.
//!
//! API docs: https://the-odds-api.com/liveapi/guides/v4/
//! Endpoint: `GET /v4/sports/{sport}/odds/?apiKey=..&regions=..&markets=..&oddsFormat=..`
//! Auth: API key as a query parameter. The key is held as a secret and is
//! never written to logs.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, warn};

use super::{OddsBatch, OddsProvider, RawEvent};
use crate::config::{AppConfig, ProviderConfig};
use crate::types::ValuebetsError;

const PROVIDER_NAME: &str = "the-odds-api";

pub struct TheOddsApiClient {
    http: Client,
    base_url: String,
    api_key: SecretString,
    sports: Vec<String>,
    regions: String,
    markets: String,
    odds_format: &'static str,
}

impl TheOddsApiClient {
    /// Build a client from config, reading the key from `api_key_env`.
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let key = AppConfig::resolve_env(&config.api_key_env)?;
        Self::new(config, SecretString::new(key))
    }

    pub fn new(config: &ProviderConfig, api_key: SecretString) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .user_agent("VALUEBETS/0.1.0 (odds-evaluator)")
            .build()
            .context("Failed to build HTTP client for The Odds API")?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            sports: config.sports.clone(),
            regions: config.regions.clone(),
            markets: config.markets.clone(),
            odds_format: config.odds_format.as_query(),
        })
    }

    /// Odds endpoint for one sport key (without the query string).
    pub fn odds_url(&self, sport: &str) -> String {
        format!("{}/v4/sports/{}/odds/", self.base_url, urlencoding::encode(sport))
    }

    async fn fetch_sport(&self, sport: &str) -> Result<Vec<RawEvent>> {
        let url = self.odds_url(sport);
        debug!(url = %url, sport, "Fetching odds");

        let resp = self
            .http
            .get(&url)
            .query(&[
                ("apiKey", self.api_key.expose_secret().as_str()),
                ("regions", self.regions.as_str()),
                ("markets", self.markets.as_str()),
                ("oddsFormat", self.odds_format),
            ])
            .send()
            .await
            .with_context(|| format!("Odds API request failed for {sport}"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ValuebetsError::Provider {
                provider: PROVIDER_NAME.to_string(),
                message: format!("{status} for {sport}: {body}"),
            }
            .into());
        }

        if let Some(remaining) = resp
            .headers()
            .get("x-requests-remaining")
            .and_then(|v| v.to_str().ok())
        {
            debug!(sport, remaining, "Odds API quota");
        }

        let events: Vec<RawEvent> = resp
            .json()
            .await
            .with_context(|| format!("Failed to parse odds response for {sport}"))?;

        Ok(events)
    }
}

#[async_trait]
impl OddsProvider for TheOddsApiClient {
    /// Fetch every configured sport concurrently and merge into one batch.
    ///
    /// A failing sport is logged and skipped; the fetch fails only when no
    /// sport succeeds.
    async fn fetch_batch(&self) -> Result<OddsBatch> {
        let results = join_all(self.sports.iter().map(|s| self.fetch_sport(s))).await;

        let mut events = Vec::new();
        let mut failures = 0usize;
        let mut last_error = None;
        for (sport, result) in self.sports.iter().zip(results) {
            match result {
                Ok(mut batch) => {
                    debug!(sport = %sport, events = batch.len(), "Sport fetched");
                    events.append(&mut batch);
                }
                Err(e) => {
                    warn!(sport = %sport, error = %e, "Odds fetch failed, continuing");
                    failures += 1;
                    last_error = Some(e);
                }
            }
        }

        if failures == self.sports.len() {
            if let Some(e) = last_error {
                return Err(e.context("All odds fetches failed"));
            }
        }

        let batch = OddsBatch::new(events, Utc::now());
        info!(
            sports = self.sports.len(),
            failed = failures,
            events = batch.events.len(),
            quotes = batch.quote_count(),
            "Odds batch fetched"
        );
        Ok(batch)
    }

    fn name(&self) -> &str {
        PROVIDER_NAME
    }
}
