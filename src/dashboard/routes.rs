//! Dashboard API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<DashboardState>`.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::storage::history::{HistoryStore, RoiSummary};
use crate::types::{CycleReport, Recommendation, Tier, TierMap};

/// Cycle reports kept for `/api/cycles`.
const CYCLE_LOG_LEN: usize = 100;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct DashboardState {
    pub agent_name: String,
    pub started_at: DateTime<Utc>,
    pub cycle_log: RwLock<Vec<CycleReport>>,
    pub last_recommendations: RwLock<TierMap>,
    pub history: Option<HistoryStore>,
}

impl DashboardState {
    pub fn new(agent_name: &str, history: Option<HistoryStore>) -> Self {
        Self {
            agent_name: agent_name.to_string(),
            started_at: Utc::now(),
            cycle_log: RwLock::new(Vec::new()),
            last_recommendations: RwLock::new(TierMap::new()),
            history,
        }
    }

    /// Publish the result of a completed cycle.
    pub async fn record_cycle(&self, report: CycleReport, recommendations: TierMap) {
        {
            let mut log = self.cycle_log.write().await;
            log.push(report);
            let excess = log.len().saturating_sub(CYCLE_LOG_LEN);
            log.drain(..excess);
        }
        *self.last_recommendations.write().await = recommendations;
    }
}

pub type AppState = Arc<DashboardState>;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub agent: String,
    pub uptime_secs: i64,
    pub cycles_run: usize,
    pub last_cycle: Option<CycleReport>,
    pub history_enabled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TierRecommendations {
    pub tier: Tier,
    pub channel: &'static str,
    pub recommendations: Vec<Recommendation>,
}

#[derive(Debug, Deserialize)]
pub struct RoiQuery {
    pub tier: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (status, Json(ErrorResponse { error: error.into() }))
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let log = state.cycle_log.read().await;
    Json(StatusResponse {
        agent: state.agent_name.clone(),
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
        cycles_run: log.len(),
        last_cycle: log.last().cloned(),
        history_enabled: state.history.is_some(),
    })
}

/// GET /api/cycles
pub async fn get_cycles(State(state): State<AppState>) -> Json<Vec<CycleReport>> {
    Json(state.cycle_log.read().await.clone())
}

/// GET /api/recommendations: last cycle's output, in tier order.
pub async fn get_recommendations(State(state): State<AppState>) -> Json<Vec<TierRecommendations>> {
    let recs = state.last_recommendations.read().await;
    Json(
        recs.iter()
            .map(|(tier, list)| TierRecommendations {
                tier: *tier,
                channel: tier.channel_label(),
                recommendations: list.clone(),
            })
            .collect(),
    )
}

/// GET /api/roi?tier=safe
pub async fn get_roi(
    State(state): State<AppState>,
    Query(query): Query<RoiQuery>,
) -> Result<Json<RoiSummary>, ApiError> {
    let tier = match query.tier.as_deref() {
        None | Some("") | Some("all") => None,
        Some(t) => Some(
            t.parse::<Tier>()
                .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?,
        ),
    };

    let Some(history) = &state.history else {
        return Err(api_error(StatusCode::SERVICE_UNAVAILABLE, "history store not configured"));
    };

    history
        .expected_roi(tier)
        .await
        .map(Json)
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
