// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// All endpoints live under `/api/v1/`. The decision path is unauthenticated —
// the request/response contracts carry no auth fields.
//
// CORS is permissive, suited to a development/internal deployment.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::app_state::AppState;
use crate::cache::CacheKey;
use crate::decision_envelope::DecisionEnvelope;
use crate::error::EngineError;
use crate::outcome_intake::{IntakeOutcome, OutcomeRecord};
use crate::types::{Direction, ExitReason};
use crate::{adjuster, confidence, fluid_risk, rec_pullback};

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/evaluate-risk", post(evaluate_risk))
        .route("/api/v1/approve-signal", post(evaluate_risk))
        .route("/api/v1/record-trade-outcome", post(record_trade_outcome))
        .route("/api/v1/digest-trade", post(record_trade_outcome))
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// GET /api/v1/health
// =============================================================================

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    state_version: u64,
    uptime_secs: u64,
    pattern_memory_size: usize,
    cache_size: usize,
    server_time: String,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        state_version: state.state_version.load(std::sync::atomic::Ordering::Relaxed),
        uptime_secs: state.uptime_secs(),
        pattern_memory_size: state.memory.total_len(),
        cache_size: state.cache.len(),
        server_time: Utc::now().to_rfc3339(),
    })
}

// =============================================================================
// POST /api/v1/evaluate-risk
// =============================================================================

#[derive(Debug, Deserialize)]
struct DecisionRequest {
    entry_signal_id: String,
    instrument: String,
    direction: Direction,
    entry_type: String,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default = "default_timeframe")]
    timeframe_minutes: u32,
    #[serde(default = "default_quantity")]
    quantity: f64,
    #[serde(default)]
    features: HashMap<String, f64>,
}

fn default_timeframe() -> u32 {
    1
}

fn default_quantity() -> f64 {
    1.0
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct PullbackDetails {
    soft_floor: f64,
    step_size: f64,
    max_profit_estimate: f64,
    threshold_drop_percent: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct RecentTradesSummary {
    consecutive_losses: u32,
    recent_win_rate: f64,
    total_recent_trades: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct DecisionResponse {
    approved: bool,
    confidence: f64,
    suggested_sl: f64,
    suggested_tp: f64,
    rec_pullback: f64,
    method: String,
    reasons: Vec<String>,
    duration_ms: f64,
    pullback_details: PullbackDetails,
    recent_trades: RecentTradesSummary,
}

async fn evaluate_risk(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DecisionRequest>,
) -> Result<Json<DecisionResponse>, (StatusCode, Json<serde_json::Value>)> {
    let started = std::time::Instant::now();

    let timestamp = match req.timestamp {
        Some(ts) => ts,
        None => return Err(engine_error_response(EngineError::BarTimestampRequired)),
    };
    if req.entry_signal_id.is_empty() {
        return Err(engine_error_response(EngineError::FieldMissing {
            name: "entry_signal_id".to_string(),
        }));
    }

    let key = crate::types::MemoryKey::new(&req.instrument, req.direction);
    let cache_key = CacheKey::new(
        &key.instrument_base,
        req.direction,
        req.timeframe_minutes,
        req.quantity,
        &req.features,
    );

    if let Some(cached) = state.cache.get(&cache_key) {
        if let Ok(response) = serde_json::from_value::<DecisionResponse>(cached) {
            return Ok(Json(response));
        }
    }

    // When the caller doesn't supply its own features, pull them from the
    // upstream feature provider under its internal 3s deadline. Any failure
    // there degrades to the default-approval response rather than blocking
    // the caller or failing closed.
    let features = if req.features.is_empty() {
        match state.feature_provider.fetch(&req.instrument).await {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!(instrument = %req.instrument, error = %e, "feature provider unavailable, default approval");
                return Ok(Json(default_approval_response(started)));
            }
        }
    } else {
        req.features.clone()
    };

    let vectors = state.memory.vectors_for(&key);
    let profitable: Vec<&crate::vector::Vector> =
        vectors.iter().filter(|v| v.is_profitable()).collect();
    let unprofitable: Vec<&crate::vector::Vector> = vectors
        .iter()
        .filter(|v| v.outcome.is_some() && !v.is_profitable())
        .collect();

    let equity_snapshot = state.equity.snapshot();
    let recent_efficiency_mean = state.equity.recent_efficiency_mean();
    let this_side_score = state.equity.side_score(timestamp, &key.instrument_base, req.direction);
    let opposite_side_score =
        state.equity.side_score(timestamp, &key.instrument_base, req.direction.opposite());

    let fluid_inputs = fluid_risk::FluidRiskInputs {
        query_features: &features,
        direction: req.direction,
        instrument: &key.instrument_base,
        now: timestamp,
    };

    let mut fluid_result = fluid_risk::evaluate(
        fluid_inputs,
        &equity_snapshot,
        recent_efficiency_mean,
        &profitable,
        &unprofitable,
        &state.bias_rng,
        opposite_side_score,
        this_side_score,
    );

    // Range confidence engine (C4) runs when a graduated table is ready; it
    // informs the reasons surfaced to the caller but does not itself reject
    // a request — the fluid risk model (C5) is the approval authority.
    let config = state.config.lock().clone();
    if let crate::ranges::BuildOutcome::Built(table) = state.tables.get_or_build(&key, &vectors) {
        let confidence_result = confidence::score_with_thresholds(
            &features,
            &table,
            config.min_overall_confidence,
            config.min_valid_features,
        );
        fluid_result.reasons.push(confidence_result.reason);
    }

    let recent = state.memory.recent_for(&key);
    let adjustment = adjuster::evaluate(&recent, timestamp, config.backtest_mode);
    if let Some(sl) = adjustment.override_sl {
        fluid_result.suggested_sl = sl;
    }
    if let Some(tp) = adjustment.override_tp {
        fluid_result.suggested_tp = tp;
    }
    if adjustment.confidence_penalty > 0.0 {
        fluid_result.confidence = (fluid_result.confidence - adjustment.confidence_penalty).max(0.1);
    }
    if let Some(reason) = &adjustment.reason {
        fluid_result.reasons.push(reason.clone());
    }

    let profitable_pnls: Vec<f64> = profitable.iter().filter_map(|v| v.pnl_per_contract()).collect();
    let positive_max_profits: Vec<f64> = profitable
        .iter()
        .filter_map(|v| v.outcome.as_ref())
        .map(|o| o.max_profit)
        .filter(|v| *v > 0.0)
        .collect();
    let pullback = rec_pullback::compute(&profitable_pnls, &positive_max_profits, fluid_result.suggested_tp);

    let response = DecisionResponse {
        approved: fluid_result.approved,
        confidence: fluid_result.confidence,
        suggested_sl: fluid_result.suggested_sl,
        suggested_tp: fluid_result.suggested_tp,
        rec_pullback: pullback.soft_floor,
        method: fluid_result.method.to_string(),
        reasons: fluid_result.reasons.clone(),
        duration_ms: started.elapsed().as_secs_f64() * 1000.0,
        pullback_details: PullbackDetails {
            soft_floor: pullback.soft_floor,
            step_size: pullback.step_size,
            max_profit_estimate: pullback.max_profit_estimate,
            threshold_drop_percent: pullback.threshold_drop_percent,
        },
        recent_trades: RecentTradesSummary {
            consecutive_losses: adjustment.consecutive_losses,
            recent_win_rate: adjustment.recent_win_rate,
            total_recent_trades: adjustment.total_recent_trades,
        },
    };

    // The bias-rejection response is a probabilistic draw, not a
    // deterministic function of the inputs — caching it would make a rare
    // rejection sticky for the whole TTL instead of re-drawn per request.
    if fluid_result.method != crate::types::DecisionMethod::DirectionalBiasRejection {
        if let Ok(value) = serde_json::to_value(&response) {
            state.cache.put(&cache_key, value);
        }
    }

    let envelope = if response.approved {
        DecisionEnvelope::allow(
            req.entry_signal_id.clone(),
            req.instrument.clone(),
            req.direction.to_string(),
            fluid_result.method,
            response.confidence,
            features.clone(),
            response.reasons.clone(),
        )
    } else {
        DecisionEnvelope::blocked(
            req.entry_signal_id.clone(),
            req.instrument.clone(),
            req.direction.to_string(),
            fluid_result.method,
            response.confidence,
            features.clone(),
            "fluid_risk_model",
            response.reasons.clone(),
        )
    };
    state.push_decision(envelope);
    state.bump_version();
    state.telemetry.emit(crate::telemetry::TelemetryEvent {
        timestamp: Utc::now(),
        kind: "decision".to_string(),
        key: key.to_string(),
        detail: format!("approved={} method={}", response.approved, response.method),
    });

    info!(
        instrument = %req.instrument,
        direction = %req.direction,
        approved = response.approved,
        confidence = response.confidence,
        "evaluate-risk decision"
    );

    Ok(Json(response))
}

/// Constant-valued response for the feature-provider-unavailable path:
/// approve by default rather than block the caller.
fn default_approval_response(started: std::time::Instant) -> DecisionResponse {
    DecisionResponse {
        approved: true,
        confidence: 0.6,
        suggested_sl: 20.0,
        suggested_tp: 40.0,
        rec_pullback: 10.0,
        method: crate::types::DecisionMethod::DefaultApproval.to_string(),
        reasons: vec!["feature provider unavailable".to_string()],
        duration_ms: started.elapsed().as_secs_f64() * 1000.0,
        pullback_details: PullbackDetails {
            soft_floor: 10.0,
            step_size: 5.0,
            max_profit_estimate: 20.0,
            threshold_drop_percent: 15.0,
        },
        recent_trades: RecentTradesSummary {
            consecutive_losses: 0,
            recent_win_rate: 0.0,
            total_recent_trades: 0,
        },
    }
}

fn engine_error_response(err: EngineError) -> (StatusCode, Json<serde_json::Value>) {
    warn!(error = %err, "evaluate-risk rejected");
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": err.to_string() })),
    )
}

// =============================================================================
// POST /api/v1/record-trade-outcome
// =============================================================================

#[derive(Debug, Deserialize)]
struct OutcomeRequest {
    entry_signal_id: String,
    instrument: String,
    direction: Direction,
    #[serde(default)]
    entry_type: String,
    pnl: f64,
    #[serde(default)]
    pnl_per_contract: Option<f64>,
    #[serde(default)]
    quantity: Option<f64>,
    #[serde(default)]
    exit_reason: ExitReason,
    #[serde(default)]
    max_profit: f64,
    #[serde(default)]
    max_loss: f64,
    #[serde(default)]
    holding_bars: u32,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    profit_by_bar: HashMap<u32, f64>,
}

#[derive(Debug, Serialize)]
struct OutcomeResponse {
    status: &'static str,
    importance: Option<f64>,
}

async fn record_trade_outcome(
    State(state): State<Arc<AppState>>,
    Json(req): Json<OutcomeRequest>,
) -> Result<Json<OutcomeResponse>, (StatusCode, Json<serde_json::Value>)> {
    let prior_decision = state.prior_decision(&req.entry_signal_id);

    let record = OutcomeRecord {
        entry_signal_id: req.entry_signal_id,
        instrument: req.instrument.clone(),
        direction: req.direction,
        entry_type: req.entry_type,
        pnl: req.pnl,
        pnl_per_contract: req.pnl_per_contract,
        quantity: req.quantity,
        exit_reason: req.exit_reason,
        max_profit: req.max_profit,
        max_loss: req.max_loss,
        holding_bars: req.holding_bars,
        timestamp: req.timestamp,
        profit_by_bar: req.profit_by_bar,
    };

    let force_store_all = state.config.lock().force_store_all;
    let telemetry_key = crate::types::MemoryKey::new(&req.instrument, req.direction).to_string();

    let result = state
        .outcome_intake
        .ingest(
            record,
            &state.memory,
            &state.tables,
            &state.equity,
            &state.cache,
            prior_decision,
            &state.telemetry,
            force_store_all,
        )
        .map_err(engine_error_response)?;

    let (kind, detail) = match &result {
        IntakeOutcome::Applied { importance } => ("outcome_applied", format!("importance={importance:.2}")),
        IntakeOutcome::Noise => ("outcome_noise", "dropped as noise".to_string()),
        IntakeOutcome::DuplicateIgnored => ("outcome_duplicate", "replayed entry_signal_id".to_string()),
    };
    state.telemetry.emit(crate::telemetry::TelemetryEvent {
        timestamp: Utc::now(),
        kind: kind.to_string(),
        key: telemetry_key,
        detail,
    });

    state.bump_version();

    let importance = match result {
        IntakeOutcome::Applied { importance } => Some(importance),
        IntakeOutcome::Noise | IntakeOutcome::DuplicateIgnored => None,
    };

    Ok(Json(OutcomeResponse {
        status: "ok",
        importance,
    }))
}
