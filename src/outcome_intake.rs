// =============================================================================
// Outcome Intake — ingests a completed trade and updates all learning state
// =============================================================================
//
// Pipeline shape: classify, mutate shared state, emit a side-channel record.
// Idempotence is handled with a small bounded seen-set, the same
// bounded-ring idiom as `app_state.rs`'s `recent_decisions`.
// =============================================================================

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::cache::ResponseCache;
use crate::decision_envelope::DecisionEnvelope;
use crate::equity::EquityState;
use crate::error::EngineError;
use crate::pattern_memory::PatternMemory;
use crate::ranges::RangeTables;
use crate::telemetry::{TelemetryEvent, TelemetrySink};
use crate::types::{Direction, ExitReason};
use crate::vector::{Outcome, Vector};

const SEEN_CAPACITY: usize = 2048;
const NOISE_PNL_ABS: f64 = 20.0;
const NOISE_EXTREMUM_ABS: f64 = 30.0;

/// Buckets a predicted confidence into a coarse label for the calibration
/// telemetry event, matching the thresholds callers already reason about in
/// the range confidence engine's own verdicts.
fn confidence_bucket(confidence: f64) -> &'static str {
    if confidence >= 0.8 {
        "high"
    } else if confidence >= 0.6 {
        "medium"
    } else if confidence >= 0.4 {
        "low"
    } else {
        "very_low"
    }
}

#[derive(Debug, Clone)]
pub struct OutcomeRecord {
    pub entry_signal_id: String,
    pub instrument: String,
    pub direction: Direction,
    pub entry_type: String,
    pub pnl: f64,
    pub pnl_per_contract: Option<f64>,
    pub quantity: Option<f64>,
    pub exit_reason: ExitReason,
    pub max_profit: f64,
    pub max_loss: f64,
    pub holding_bars: u32,
    pub timestamp: Option<DateTime<Utc>>,
    pub profit_by_bar: HashMap<u32, f64>,
}

pub enum IntakeOutcome {
    Applied { importance: f64 },
    Noise,
    DuplicateIgnored,
}

/// Tracks recently-seen entry-signal ids so a replayed outcome record is a
/// no-op rather than double-applying equity/pattern-memory mutation.
struct SeenSet {
    order: VecDeque<String>,
    set: std::collections::HashSet<String>,
}

impl SeenSet {
    fn new() -> Self {
        Self {
            order: VecDeque::new(),
            set: std::collections::HashSet::new(),
        }
    }

    fn seen_or_insert(&mut self, id: &str) -> bool {
        if self.set.contains(id) {
            return true;
        }
        self.set.insert(id.to_string());
        self.order.push_back(id.to_string());
        if self.order.len() > SEEN_CAPACITY {
            if let Some(oldest) = self.order.pop_front() {
                self.set.remove(&oldest);
            }
        }
        false
    }
}

pub struct OutcomeIntake {
    seen: Mutex<SeenSet>,
}

impl Default for OutcomeIntake {
    fn default() -> Self {
        Self::new()
    }
}

impl OutcomeIntake {
    pub fn new() -> Self {
        Self {
            seen: Mutex::new(SeenSet::new()),
        }
    }

    /// Classifies importance; noise records (small pnl, small excursions)
    /// are dropped before they ever touch shared state. Small-loss clusters
    /// are weighted above small-win clusters of the same magnitude because
    /// bleed dominates drawdown risk.
    fn classify_importance(record: &OutcomeRecord) -> Option<f64> {
        let pnl = record.pnl;
        let extremum = record.max_profit.abs().max(record.max_loss.abs());
        if pnl.abs() < NOISE_PNL_ABS && extremum < NOISE_EXTREMUM_ABS {
            return None;
        }
        let magnitude = (pnl.abs() / 100.0).min(1.0);
        let importance = if pnl < 0.0 {
            (0.5 + 0.5 * magnitude).min(1.0)
        } else {
            (0.4 + 0.4 * magnitude).min(1.0)
        };
        Some(importance)
    }

    /// Runs the full intake pipeline: classify, insert into pattern memory,
    /// invalidate the affected range table and cached responses, update
    /// equity state, and emit a calibration event against the matching
    /// prior decision. Returns early on a duplicate `entry_signal_id`
    /// without mutating anything.
    ///
    /// `prior_decision` is the decision record previously stored under this
    /// record's `entry_signal_id`, if evaluate-risk was called for it — its
    /// `features` are joined into the learning vector (an outcome record
    /// carries no features of its own) and its `confidence` feeds the
    /// predicted-vs-actual calibration bucket sent to `telemetry`.
    #[allow(clippy::too_many_arguments)]
    pub fn ingest<V: Clone>(
        &self,
        record: OutcomeRecord,
        memory: &PatternMemory,
        tables: &RangeTables,
        equity: &EquityState,
        cache: &ResponseCache<V>,
        prior_decision: Option<DecisionEnvelope>,
        telemetry: &dyn TelemetrySink,
        force_store_all: bool,
    ) -> Result<IntakeOutcome, EngineError> {
        let timestamp = record.timestamp.ok_or(EngineError::BarTimestampRequired)?;
        if record.entry_signal_id.is_empty() {
            return Err(EngineError::OutcomeMalformed {
                reason: "missing entry_signal_id".to_string(),
            });
        }

        if self.seen.lock().seen_or_insert(&record.entry_signal_id) {
            return Ok(IntakeOutcome::DuplicateIgnored);
        }

        let importance = match Self::classify_importance(&record) {
            Some(v) => v,
            None if force_store_all => 0.1,
            None => return Ok(IntakeOutcome::Noise),
        };

        let quantity = record.quantity.unwrap_or(1.0).max(1.0);
        let pnl_per_contract = record.pnl_per_contract.unwrap_or(record.pnl / quantity);

        let outcome = Outcome {
            pnl: record.pnl,
            quantity,
            pnl_per_contract,
            exit_reason: record.exit_reason,
            max_profit: record.max_profit,
            max_loss: record.max_loss,
            holding_bars: record.holding_bars,
            was_good_exit: pnl_per_contract > 0.0,
            profit_by_bar: record.profit_by_bar,
        };

        let features = prior_decision
            .as_ref()
            .map(|d| d.features.clone())
            .unwrap_or_default();

        let vector = Vector::new(
            record.entry_signal_id,
            record.instrument.clone(),
            record.direction,
            record.entry_type,
            timestamp,
            features,
            Some(outcome),
            importance,
        );

        let key = vector.key();
        memory.insert(vector);
        tables.invalidate(&key);
        cache.invalidate_for(&key.instrument_base, key.direction);

        let efficiency = if record.max_profit.abs() > 0.0 {
            Some((pnl_per_contract / record.max_profit).clamp(-1.0, 1.0))
        } else {
            None
        };

        equity.record_trade(
            timestamp,
            record.instrument,
            record.direction,
            pnl_per_contract,
            record.max_profit,
            record.max_loss,
            efficiency,
        );

        if let Some(decision) = prior_decision {
            let predicted_bucket = confidence_bucket(decision.confidence);
            let actual = if pnl_per_contract > 0.0 { "profitable" } else { "unprofitable" };
            telemetry.emit(TelemetryEvent {
                timestamp,
                kind: "calibration".to_string(),
                key: key.to_string(),
                detail: format!(
                    "predicted={} ({predicted_bucket}) actual={actual} pnl_per_contract={pnl_per_contract:.2}",
                    decision.final_decision
                ),
            });
        }

        Ok(IntakeOutcome::Applied { importance })
    }
}

pub type SharedOutcomeIntake = Arc<OutcomeIntake>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::InMemoryTelemetrySink;
    use std::time::Duration;

    fn record(id: &str, pnl: f64, ts: Option<DateTime<Utc>>) -> OutcomeRecord {
        OutcomeRecord {
            entry_signal_id: id.to_string(),
            instrument: "MGC".to_string(),
            direction: Direction::Long,
            entry_type: "EMA".to_string(),
            pnl,
            pnl_per_contract: Some(pnl),
            quantity: Some(1.0),
            exit_reason: ExitReason::TakeProfit,
            max_profit: pnl.max(0.0),
            max_loss: (-pnl).max(0.0),
            holding_bars: 5,
            timestamp: ts,
            profit_by_bar: HashMap::new(),
        }
    }

    #[test]
    fn missing_timestamp_is_rejected_without_mutation() {
        let intake = OutcomeIntake::new();
        let memory = PatternMemory::new();
        let tables = RangeTables::new();
        let equity = EquityState::new();
        let cache: ResponseCache<u32> = ResponseCache::new(10, Duration::from_secs(60));
        let telemetry = InMemoryTelemetrySink::default();
        let result = intake.ingest(
            record("a", 50.0, None),
            &memory,
            &tables,
            &equity,
            &cache,
            None,
            &telemetry,
            false,
        );
        assert!(matches!(result, Err(EngineError::BarTimestampRequired)));
        assert_eq!(equity.snapshot().records.len(), 0);
    }

    #[test]
    fn duplicate_entry_signal_id_is_a_no_op() {
        let intake = OutcomeIntake::new();
        let memory = PatternMemory::new();
        let tables = RangeTables::new();
        let equity = EquityState::new();
        let cache: ResponseCache<u32> = ResponseCache::new(10, Duration::from_secs(60));
        let telemetry = InMemoryTelemetrySink::default();
        let now = Utc::now();
        intake
            .ingest(
                record("dup", 50.0, Some(now)),
                &memory,
                &tables,
                &equity,
                &cache,
                None,
                &telemetry,
                false,
            )
            .unwrap();
        intake
            .ingest(
                record("dup", 50.0, Some(now)),
                &memory,
                &tables,
                &equity,
                &cache,
                None,
                &telemetry,
                false,
            )
            .unwrap();
        assert_eq!(equity.snapshot().records.len(), 1);
    }

    #[test]
    fn feature_join_pulls_from_the_prior_decision() {
        let intake = OutcomeIntake::new();
        let memory = PatternMemory::new();
        let tables = RangeTables::new();
        let equity = EquityState::new();
        let cache: ResponseCache<u32> = ResponseCache::new(10, Duration::from_secs(60));
        let telemetry = InMemoryTelemetrySink::default();
        let now = Utc::now();

        let mut features = HashMap::new();
        features.insert("rsi_14".to_string(), 61.0);
        let decision = DecisionEnvelope::allow(
            "joined",
            "MGC",
            "long",
            crate::types::DecisionMethod::FluidRiskModel,
            0.75,
            features,
            vec![],
        );

        intake
            .ingest(
                record("joined", 50.0, Some(now)),
                &memory,
                &tables,
                &equity,
                &cache,
                Some(decision),
                &telemetry,
                false,
            )
            .unwrap();

        let key = crate::types::MemoryKey::new("MGC", Direction::Long);
        let stored = memory.vectors_for(&key);
        let joined = stored.iter().find(|v| v.entry_signal_id == "joined").unwrap();
        assert_eq!(joined.features.get("rsi_14"), Some(&61.0));

        let events = telemetry.events();
        assert!(events.iter().any(|e| e.kind == "calibration"));
    }

    #[test]
    fn ingest_purges_cached_responses_for_the_key() {
        let intake = OutcomeIntake::new();
        let memory = PatternMemory::new();
        let tables = RangeTables::new();
        let equity = EquityState::new();
        let cache: ResponseCache<u32> = ResponseCache::new(10, Duration::from_secs(60));
        let telemetry = InMemoryTelemetrySink::default();
        let now = Utc::now();

        let cache_key = crate::cache::CacheKey::new("MGC", Direction::Long, 1, 1.0, &HashMap::new());
        cache.put(&cache_key, 7);
        assert_eq!(cache.get(&cache_key), Some(7));

        intake
            .ingest(
                record("purge", 50.0, Some(now)),
                &memory,
                &tables,
                &equity,
                &cache,
                None,
                &telemetry,
                false,
            )
            .unwrap();

        assert_eq!(cache.get(&cache_key), None);
    }

    #[test]
    fn noise_records_are_dropped() {
        let intake = OutcomeIntake::new();
        let memory = PatternMemory::new();
        let tables = RangeTables::new();
        let equity = EquityState::new();
        let cache: ResponseCache<u32> = ResponseCache::new(10, Duration::from_secs(60));
        let telemetry = InMemoryTelemetrySink::default();
        let now = Utc::now();
        let mut rec = record("noise", 5.0, Some(now));
        rec.max_profit = 5.0;
        rec.max_loss = 0.0;
        intake
            .ingest(rec, &memory, &tables, &equity, &cache, None, &telemetry, false)
            .unwrap();
        assert_eq!(equity.snapshot().records.len(), 0);
    }
}
