//! Stake sizing for emitted recommendations.
//!
//! Three flat-fraction profiles (conservative, smart, aggressive) that scale
//! with the price's edge over fair value, plus a fractional-Kelly stake.
//! Amounts are in bankroll units and rounded to cents.

use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::Recommendation;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StakeConfig {
    pub bankroll_units: Decimal,
    /// Conservative stake as a fraction of bankroll.
    pub conservative_pct: Decimal,
    /// Fractional Kelly multiplier (0.25 = quarter-Kelly).
    pub kelly_multiplier: Decimal,
    /// Maximum Kelly stake as a fraction of bankroll.
    pub max_kelly_pct: Decimal,
}

impl Default for StakeConfig {
    fn default() -> Self {
        Self {
            bankroll_units: dec!(1000),
            conservative_pct: dec!(0.015), // 1.5% of bankroll
            kelly_multiplier: dec!(0.25),
            max_kelly_pct: dec!(0.06),
        }
    }
}

// ---------------------------------------------------------------------------
// Stake plan
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stake {
    pub units: Decimal,
    /// Gross return if the bet wins.
    pub payout: Decimal,
    /// `p × payout − units` under the fair probability.
    pub expected_profit: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StakePlan {
    pub conservative: Stake,
    pub smart: Stake,
    pub aggressive: Stake,
    /// Absent when the Kelly fraction is not positive.
    pub kelly: Option<Stake>,
    /// Raw (unscaled) Kelly fraction.
    pub kelly_fraction: f64,
}

impl StakePlan {
    /// The three flat profiles, in order.
    pub fn profiles(&self) -> [(&'static str, &Stake); 3] {
        [
            ("conservative", &self.conservative),
            ("smart", &self.smart),
            ("aggressive", &self.aggressive),
        ]
    }
}

pub struct StakeAdvisor {
    config: StakeConfig,
}

impl StakeAdvisor {
    pub fn new(config: StakeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StakeConfig {
        &self.config
    }

    pub fn plan(&self, rec: &Recommendation) -> StakePlan {
        let c = &rec.candidate;
        let p = to_decimal(c.fair_probability);
        let odds = to_decimal(c.decimal_odds);

        // Percentage points of fair probability above the implied probability
        let edge_pct = if odds > Decimal::ZERO {
            ((p - Decimal::ONE / odds) * dec!(100)).max(Decimal::ZERO)
        } else {
            Decimal::ZERO
        };

        let cons = (self.config.bankroll_units * self.config.conservative_pct).round_dp(2);
        let smart = (cons * (Decimal::ONE + edge_pct / dec!(50))).min(cons * dec!(5)).round_dp(2);
        let aggressive = (cons * (Decimal::ONE + edge_pct / dec!(20)))
            .min(cons * dec!(15))
            .round_dp(2);

        // Kelly: f* = (b·p − q) / b with b the net odds
        let b = odds - Decimal::ONE;
        let kelly_raw = if b > Decimal::ZERO {
            (b * p - (Decimal::ONE - p)) / b
        } else {
            Decimal::ZERO
        };
        let kelly = if kelly_raw > Decimal::ZERO {
            let fraction = (kelly_raw * self.config.kelly_multiplier).min(self.config.max_kelly_pct);
            Some(stake(self.config.bankroll_units * fraction, p, odds))
        } else {
            None
        };

        let plan = StakePlan {
            conservative: stake(cons, p, odds),
            smart: stake(smart, p, odds),
            aggressive: stake(aggressive, p, odds),
            kelly,
            kelly_fraction: kelly_raw.to_f64().unwrap_or(0.0),
        };

        debug!(
            fingerprint = %rec.fingerprint(),
            edge_pct = %edge_pct.round_dp(2),
            conservative = %plan.conservative.units,
            smart = %plan.smart.units,
            aggressive = %plan.aggressive.units,
            "Stake plan computed"
        );

        plan
    }
}

fn stake(units: Decimal, p: Decimal, odds: Decimal) -> Stake {
    let units = units.round_dp(2);
    let payout = units * odds;
    Stake {
        units,
        payout: payout.round_dp(2),
        expected_profit: (p * payout - units).round_dp(2),
    }
}

/// Float inputs are trimmed to 6 dp so products stay well inside Decimal precision.
fn to_decimal(x: f64) -> Decimal {
    Decimal::from_f64_retain(x)
        .map(|d| d.round_dp(6))
        .unwrap_or(Decimal::ZERO)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
