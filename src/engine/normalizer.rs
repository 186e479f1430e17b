//! Odds snapshot normalizer.
//!
//! Flattens a raw provider batch into canonical `OddsQuote`s: decimal odds,
//! canonical market keys and outcome ids shared by every bookmaker, one
//! `Event` per fixture. Bad records are rejected one by one with a reason;
//! nothing here can fail the batch.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info};

use crate::config::{EngineConfig, OddsFormat};
use crate::provider::{OddsBatch, RawBookmaker, RawEvent, RawMarket, RawOutcome};
use crate::types::{outcome_id, Event, OddsQuote};

// ---------------------------------------------------------------------------
// Rejections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum RejectReason {
    MissingEvent,
    InvalidStartTime,
    OutsideWindow,
    MissingBookmaker,
    BookmakerNotAllowed,
    UnsupportedMarket,
    MissingOutcome,
    MissingLine,
    InvalidOdds,
    DuplicateQuote,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RejectReason::MissingEvent => "missing event id",
            RejectReason::InvalidStartTime => "invalid start time",
            RejectReason::OutsideWindow => "event outside time window",
            RejectReason::MissingBookmaker => "missing bookmaker",
            RejectReason::BookmakerNotAllowed => "bookmaker not allowed",
            RejectReason::UnsupportedMarket => "unsupported market",
            RejectReason::MissingOutcome => "missing outcome name",
            RejectReason::MissingLine => "missing handicap line",
            RejectReason::InvalidOdds => "invalid odds",
            RejectReason::DuplicateQuote => "repeat quote",
        };
        write!(f, "{s}")
    }
}

/// A dropped record and why it was dropped.
#[derive(Debug, Clone, Serialize)]
pub struct Rejection {
    pub reason: RejectReason,
    pub event_id: Option<String>,
    pub bookmaker_id: Option<String>,
    pub detail: String,
}

/// Normalizer output for one batch.
#[derive(Debug, Clone, Default)]
pub struct NormalizedBatch {
    pub events: BTreeMap<String, Event>,
    pub quotes: Vec<OddsQuote>,
    pub rejections: Vec<Rejection>,
    /// Raw outcome prices seen, accepted or not.
    pub quotes_in: usize,
}

impl NormalizedBatch {
    pub fn rejection_counts(&self) -> BTreeMap<RejectReason, usize> {
        let mut counts = BTreeMap::new();
        for r in &self.rejections {
            *counts.entry(r.reason).or_insert(0) += 1;
        }
        counts
    }
}

// ---------------------------------------------------------------------------
// Canonicalisation helpers
// ---------------------------------------------------------------------------

/// Lower-case, trimmed, single-spaced name.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Render a line without trailing zeros and without a negative zero.
fn format_line(line: f64) -> String {
    let line = if line == 0.0 { 0.0 } else { line };
    format!("{line}")
}

/// Convert a provider price to decimal odds. `None` when the price cannot
/// be a valid decimal price (> 1.0).
pub fn to_decimal_odds(price: f64, format: OddsFormat) -> Option<f64> {
    if !price.is_finite() {
        return None;
    }
    let decimal = match format {
        OddsFormat::Decimal => price,
        OddsFormat::American if price >= 100.0 => 1.0 + price / 100.0,
        OddsFormat::American if price <= -100.0 => 1.0 + 100.0 / price.abs(),
        OddsFormat::American => return None,
    };
    (decimal > 1.0).then_some(decimal)
}

fn parse_time(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn non_empty(s: Option<&String>) -> Option<&str> {
    s.map(|s| s.trim()).filter(|s| !s.is_empty())
}

/// Canonical market key and selection for one raw outcome.
///
/// Spread markets are keyed by the home team's handicap so that both sides
/// of the same line share a market; other lined markets append their point.
fn canonical_market(
    market_key: &str,
    outcome: &RawOutcome,
    selection: &str,
    home_team: &str,
) -> Result<String, RejectReason> {
    let key = market_key.to_lowercase();
    if key.contains("spreads") {
        let point = outcome.point.ok_or(RejectReason::MissingLine)?;
        let home_line = if selection == home_team { point } else { -point };
        return Ok(format!("{key}:{}", format_line(home_line)));
    }
    match outcome.point {
        Some(point) => Ok(format!("{key}:{}", format_line(point))),
        None => Ok(key),
    }
}

// ---------------------------------------------------------------------------
// Normalizer
// ---------------------------------------------------------------------------

pub struct Normalizer<'a> {
    config: &'a EngineConfig,
}

impl<'a> Normalizer<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Normalize a raw batch relative to the evaluation time `now`.
    pub fn normalize(&self, batch: &OddsBatch, now: DateTime<Utc>) -> NormalizedBatch {
        let mut out = NormalizedBatch {
            quotes_in: batch.quote_count(),
            ..Default::default()
        };

        for raw in &batch.events {
            self.normalize_event(raw, batch.fetched_at, now, &mut out);
        }

        self.collapse_repeats(&mut out);

        for r in &out.rejections {
            debug!(
                reason = %r.reason,
                event_id = ?r.event_id,
                bookmaker = ?r.bookmaker_id,
                detail = %r.detail,
                "Quote rejected"
            );
        }
        info!(
            events = out.events.len(),
            quotes_in = out.quotes_in,
            accepted = out.quotes.len(),
            rejected = out.rejections.len(),
            "Batch normalized"
        );

        out
    }

    fn normalize_event(
        &self,
        raw: &RawEvent,
        fetched_at: DateTime<Utc>,
        now: DateTime<Utc>,
        out: &mut NormalizedBatch,
    ) {
        let n_quotes: usize = raw.bookmakers.iter().flat_map(|b| &b.markets).map(|m| m.outcomes.len()).sum();

        let Some(event_id) = non_empty(raw.id.as_ref()) else {
            out.rejections.push(Rejection {
                reason: RejectReason::MissingEvent,
                event_id: None,
                bookmaker_id: None,
                detail: format!("{n_quotes} quotes dropped"),
            });
            return;
        };

        let Some(start_time) = parse_time(raw.commence_time.as_deref()) else {
            out.rejections.push(Rejection {
                reason: RejectReason::InvalidStartTime,
                event_id: Some(event_id.to_string()),
                bookmaker_id: None,
                detail: format!("commence_time={:?}", raw.commence_time),
            });
            return;
        };

        let to_start = start_time - now;
        if to_start <= chrono::Duration::zero() || to_start > self.config.max_event_horizon() {
            out.rejections.push(Rejection {
                reason: RejectReason::OutsideWindow,
                event_id: Some(event_id.to_string()),
                bookmaker_id: None,
                detail: format!("starts {start_time}"),
            });
            return;
        }

        let home_team = non_empty(raw.home_team.as_ref()).unwrap_or("Home").to_string();
        let away_team = non_empty(raw.away_team.as_ref()).unwrap_or("Away").to_string();
        let sport = non_empty(raw.sport_key.as_ref()).unwrap_or("unknown").to_string();
        let sport_title = non_empty(raw.sport_title.as_ref()).unwrap_or(&sport).to_string();

        let home_norm = normalize_name(&home_team);
        for book in &raw.bookmakers {
            self.normalize_bookmaker(event_id, &home_norm, book, fetched_at, out);
        }

        out.events.insert(
            event_id.to_string(),
            Event {
                event_id: event_id.to_string(),
                sport,
                sport_title,
                home_team,
                away_team,
                start_time,
            },
        );
    }

    fn normalize_bookmaker(
        &self,
        event_id: &str,
        home_team: &str,
        book: &RawBookmaker,
        fetched_at: DateTime<Utc>,
        out: &mut NormalizedBatch,
    ) {
        let Some(bookmaker_id) = non_empty(book.key.as_ref()).map(str::to_lowercase) else {
            out.rejections.push(Rejection {
                reason: RejectReason::MissingBookmaker,
                event_id: Some(event_id.to_string()),
                bookmaker_id: None,
                detail: format!("title={:?}", book.title),
            });
            return;
        };

        let title = book.title.as_deref().unwrap_or_default();
        if !self.config.bookmaker_allowed(&bookmaker_id, title) {
            out.rejections.push(Rejection {
                reason: RejectReason::BookmakerNotAllowed,
                event_id: Some(event_id.to_string()),
                bookmaker_id: Some(bookmaker_id),
                detail: String::new(),
            });
            return;
        }

        let book_time = parse_time(book.last_update.as_deref());
        for market in &book.markets {
            let observed_at = parse_time(market.last_update.as_deref())
                .or(book_time)
                .unwrap_or(fetched_at);
            self.normalize_market(event_id, home_team, &bookmaker_id, market, observed_at, out);
        }
    }

    fn normalize_market(
        &self,
        event_id: &str,
        home_team: &str,
        bookmaker_id: &str,
        market: &RawMarket,
        observed_at: DateTime<Utc>,
        out: &mut NormalizedBatch,
    ) {
        let market_key = non_empty(market.key.as_ref()).unwrap_or("h2h");
        // Lay prices are not backable.
        if market_key.to_lowercase().ends_with("_lay") {
            out.rejections.push(Rejection {
                reason: RejectReason::UnsupportedMarket,
                event_id: Some(event_id.to_string()),
                bookmaker_id: Some(bookmaker_id.to_string()),
                detail: market_key.to_string(),
            });
            return;
        }

        for outcome in &market.outcomes {
            let reject = |reason: RejectReason, detail: String| Rejection {
                reason,
                event_id: Some(event_id.to_string()),
                bookmaker_id: Some(bookmaker_id.to_string()),
                detail,
            };

            let Some(selection) = non_empty(outcome.name.as_ref()).map(normalize_name) else {
                out.rejections.push(reject(RejectReason::MissingOutcome, market_key.to_string()));
                continue;
            };

            let Some(decimal_odds) = outcome
                .price
                .and_then(|p| to_decimal_odds(p, self.config.odds_format))
            else {
                out.rejections.push(reject(
                    RejectReason::InvalidOdds,
                    format!("{market_key}/{selection} price={:?}", outcome.price),
                ));
                continue;
            };

            let market = match canonical_market(market_key, outcome, &selection, home_team) {
                Ok(m) => m,
                Err(reason) => {
                    out.rejections.push(reject(reason, format!("{market_key}/{selection}")));
                    continue;
                }
            };

            out.quotes.push(OddsQuote {
                event_id: event_id.to_string(),
                outcome_id: outcome_id(&market, &selection),
                market,
                selection,
                bookmaker_id: bookmaker_id.to_string(),
                decimal_odds,
                observed_at,
            });
        }
    }

    /// Collapse repeat quotes from one bookmaker observed within the repeat
    /// window, keeping the latest. Leaves quotes ordered by identity.
    fn collapse_repeats(&self, out: &mut NormalizedBatch) {
        let window = self.config.repeat_window();
        let mut quotes = std::mem::take(&mut out.quotes);
        quotes.sort_by(|a, b| {
            (&a.event_id, &a.outcome_id, &a.bookmaker_id, a.observed_at)
                .cmp(&(&b.event_id, &b.outcome_id, &b.bookmaker_id, b.observed_at))
        });

        let mut kept: Vec<OddsQuote> = Vec::with_capacity(quotes.len());
        for quote in quotes {
            if let Some(last) = kept.last_mut() {
                let same = last.event_id == quote.event_id
                    && last.outcome_id == quote.outcome_id
                    && last.bookmaker_id == quote.bookmaker_id;
                if same && quote.observed_at - last.observed_at <= window {
                    out.rejections.push(Rejection {
                        reason: RejectReason::DuplicateQuote,
                        event_id: Some(last.event_id.clone()),
                        bookmaker_id: Some(last.bookmaker_id.clone()),
                        detail: format!("{} superseded", last.outcome_id),
                    });
                    *last = quote;
                    continue;
                }
            }
            kept.push(quote);
        }
        out.quotes = kept;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
