//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API keys, webhook URLs) are referenced by env-var name in the
//! config and resolved at runtime via `std::env::var`.
//!
//! Every `[engine]` key is optional; an absent key takes the default from
//! `EngineConfig::default()`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;

use crate::strategy::stake::StakeConfig;
use crate::types::{Tier, ValuebetsError};

/// Upper bound for every time window in `[engine]` (ten years).
pub const MAX_WINDOW_SECS: u64 = 10 * 365 * 24 * 3600;
/// Upper bound for `max_event_horizon_days`.
pub const MAX_EVENT_HORIZON_DAYS: i64 = 10 * 365;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub provider: ProviderConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub stake: StakeConfig,
    #[serde(default)]
    pub sinks: SinksConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub name: String,
    pub cycle_interval_secs: u64,
    /// JSON file holding the cross-cycle fingerprint memory.
    #[serde(default = "default_memory_file")]
    pub memory_file: String,
    /// SQLite URL for the recommendation ledger. Disabled when absent.
    #[serde(default)]
    pub history_db: Option<String>,
}

fn default_memory_file() -> String {
    "valuebets_memory.json".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    pub api_key_env: String,
    #[serde(default = "default_sports")]
    pub sports: Vec<String>,
    #[serde(default = "default_regions")]
    pub regions: String,
    #[serde(default = "default_markets")]
    pub markets: String,
    #[serde(default)]
    pub odds_format: OddsFormat,
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.the-odds-api.com".to_string()
}

fn default_sports() -> Vec<String> {
    vec!["upcoming".to_string()]
}

fn default_regions() -> String {
    "au,us,uk".to_string()
}

fn default_markets() -> String {
    "h2h,spreads,totals".to_string()
}

fn default_timeout() -> u64 {
    20
}

/// Price format the provider reports in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OddsFormat {
    #[default]
    Decimal,
    American,
}

impl OddsFormat {
    pub fn as_query(&self) -> &'static str {
        match self {
            OddsFormat::Decimal => "decimal",
            OddsFormat::American => "american",
        }
    }
}

/// Webhook destinations per tier, by env-var name.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct SinksConfig {
    #[serde(default)]
    pub safe_webhook_env: Option<String>,
    #[serde(default)]
    pub best_webhook_env: Option<String>,
    #[serde(default)]
    pub speculative_webhook_env: Option<String>,
}

impl SinksConfig {
    pub fn webhook_env(&self, tier: Tier) -> Option<&str> {
        match tier {
            Tier::Safe => self.safe_webhook_env.as_deref(),
            Tier::Best => self.best_webhook_env.as_deref(),
            Tier::Speculative => self.speculative_webhook_env.as_deref(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self { enabled: false, port: 8080 }
    }
}

// ---------------------------------------------------------------------------
// Engine configuration
// ---------------------------------------------------------------------------

/// Thresholds and knobs for the evaluation pipeline.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EngineConfig {
    /// Minimum edge for SAFE.
    pub min_safe_edge: f64,
    /// Minimum edge for SPECULATIVE.
    pub min_spec_edge: f64,
    /// Minimum edge for BEST.
    pub min_best_edge: f64,
    /// SAFE requires fair probability at or above this; SPECULATIVE below it.
    pub high_prob_threshold: f64,
    /// Minimum confidence for SAFE.
    pub min_confidence: f64,
    /// Minimum confidence for BEST.
    pub high_confidence_threshold: f64,

    /// Trust/liquidity weight per bookmaker key (lower-cased).
    pub bookmaker_weights: HashMap<String, f64>,
    pub default_bookmaker_weight: f64,

    #[serde(alias = "staleness_threshold")]
    pub staleness_threshold_secs: u64,
    #[serde(alias = "dedup_cooldown")]
    pub dedup_cooldown_secs: u64,
    pub per_tier_cap: usize,
    /// Per-tier override of `per_tier_cap`.
    pub tier_caps: BTreeMap<Tier, usize>,
    /// Rule evaluation order; first match wins.
    pub tier_order: Vec<Tier>,

    /// Repeat quotes from one book closer together than this collapse to one.
    pub repeat_window_secs: u64,
    /// Confidence given to an outcome priced by a single book.
    pub single_book_confidence: f64,
    /// Contributing books at which estimator confidence saturates at 1.0.
    pub full_confidence_books: usize,
    /// Outcomes whose consensus has fewer contributing books are not scored.
    pub min_consensus_books: usize,
    /// Bookmaker markets with a larger overround are not used for consensus.
    pub max_overround: f64,
    /// Case-insensitive substrings; empty means every bookmaker is accepted.
    pub allowed_bookmakers: Vec<String>,
    pub max_event_horizon_days: i64,
    pub odds_format: OddsFormat,
    /// Upper bound on remembered fingerprints.
    pub dedup_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_safe_edge: 0.02,
            min_spec_edge: 0.01,
            min_best_edge: 0.05,
            high_prob_threshold: 0.5,
            min_confidence: 0.5,
            high_confidence_threshold: 0.75,
            bookmaker_weights: HashMap::new(),
            default_bookmaker_weight: 1.0,
            staleness_threshold_secs: 600,
            dedup_cooldown_secs: 6 * 3600,
            per_tier_cap: 5,
            tier_caps: BTreeMap::new(),
            tier_order: Tier::ALL.to_vec(),
            repeat_window_secs: 5,
            single_book_confidence: 0.25,
            full_confidence_books: 4,
            min_consensus_books: 2,
            max_overround: 0.15,
            allowed_bookmakers: Vec::new(),
            max_event_horizon_days: 150,
            odds_format: OddsFormat::Decimal,
            dedup_capacity: 10_000,
        }
    }
}

impl EngineConfig {
    /// Weight of a bookmaker in the consensus average.
    pub fn weight_for(&self, bookmaker_id: &str) -> f64 {
        self.bookmaker_weights
            .get(&bookmaker_id.to_lowercase())
            .copied()
            .unwrap_or(self.default_bookmaker_weight)
    }

    /// Output cap for a tier.
    pub fn cap_for(&self, tier: Tier) -> usize {
        self.tier_caps.get(&tier).copied().unwrap_or(self.per_tier_cap)
    }

    pub fn staleness_threshold(&self) -> chrono::Duration {
        seconds(self.staleness_threshold_secs)
    }

    pub fn dedup_cooldown(&self) -> chrono::Duration {
        seconds(self.dedup_cooldown_secs)
    }

    pub fn repeat_window(&self) -> chrono::Duration {
        seconds(self.repeat_window_secs)
    }

    pub fn max_event_horizon(&self) -> chrono::Duration {
        chrono::Duration::try_days(self.max_event_horizon_days).unwrap_or(chrono::Duration::MAX)
    }

    /// Whether a bookmaker passes the allow-list.
    pub fn bookmaker_allowed(&self, key: &str, title: &str) -> bool {
        if self.allowed_bookmakers.is_empty() {
            return true;
        }
        let key = key.to_lowercase();
        let title = title.to_lowercase();
        self.allowed_bookmakers.iter().any(|a| {
            let a = a.to_lowercase();
            key.contains(&a) || title.contains(&a)
        })
    }

    /// Reject configurations under which classification is unreliable.
    pub fn validate(&self) -> Result<(), ValuebetsError> {
        for (name, value) in [
            ("min_safe_edge", self.min_safe_edge),
            ("min_spec_edge", self.min_spec_edge),
            ("min_best_edge", self.min_best_edge),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(config_err(format!("{name} must be a non-negative number, got {value}")));
            }
        }

        if !(self.high_prob_threshold > 0.0 && self.high_prob_threshold < 1.0) {
            return Err(config_err(format!(
                "high_prob_threshold must be in (0, 1), got {}",
                self.high_prob_threshold
            )));
        }

        for (name, value) in [
            ("min_confidence", self.min_confidence),
            ("high_confidence_threshold", self.high_confidence_threshold),
            ("single_book_confidence", self.single_book_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(config_err(format!("{name} must be in [0, 1], got {value}")));
            }
        }

        if !self.default_bookmaker_weight.is_finite() || self.default_bookmaker_weight < 0.0 {
            return Err(config_err(format!(
                "default_bookmaker_weight must be non-negative, got {}",
                self.default_bookmaker_weight
            )));
        }
        for (book, weight) in &self.bookmaker_weights {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(config_err(format!("weight for {book} must be non-negative, got {weight}")));
            }
        }

        if self.staleness_threshold_secs == 0 {
            return Err(config_err("staleness_threshold_secs must be positive".into()));
        }
        for (name, value) in [
            ("staleness_threshold_secs", self.staleness_threshold_secs),
            ("dedup_cooldown_secs", self.dedup_cooldown_secs),
            ("repeat_window_secs", self.repeat_window_secs),
        ] {
            if value > MAX_WINDOW_SECS {
                return Err(config_err(format!("{name} must be at most {MAX_WINDOW_SECS}, got {value}")));
            }
        }
        if self.per_tier_cap == 0 {
            return Err(config_err("per_tier_cap must be at least 1".into()));
        }
        if let Some((tier, _)) = self.tier_caps.iter().find(|(_, cap)| **cap == 0) {
            return Err(config_err(format!("tier cap for {tier} must be at least 1")));
        }

        if self.tier_order.is_empty() {
            return Err(config_err("tier_order must name at least one tier".into()));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self.tier_order.iter().find(|t| !seen.insert(**t)) {
            return Err(config_err(format!("tier_order lists {dup} more than once")));
        }

        if self.full_confidence_books < 2 {
            return Err(config_err("full_confidence_books must be at least 2".into()));
        }
        if !self.max_overround.is_finite() || self.max_overround < 0.0 {
            return Err(config_err(format!("max_overround must be non-negative, got {}", self.max_overround)));
        }
        if self.max_event_horizon_days <= 0 || self.max_event_horizon_days > MAX_EVENT_HORIZON_DAYS {
            return Err(config_err(format!(
                "max_event_horizon_days must be in 1..={MAX_EVENT_HORIZON_DAYS}, got {}",
                self.max_event_horizon_days
            )));
        }
        if self.min_consensus_books == 0 {
            return Err(config_err("min_consensus_books must be at least 1".into()));
        }
        if self.dedup_capacity == 0 {
            return Err(config_err("dedup_capacity must be at least 1".into()));
        }

        Ok(())
    }
}

fn config_err(message: String) -> ValuebetsError {
    ValuebetsError::Config(message)
}

/// Saturates instead of panicking; `validate` keeps real values far below.
fn seconds(secs: u64) -> chrono::Duration {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX)
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml_str(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse configuration from TOML text and validate the engine section.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.engine.validate()?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}
