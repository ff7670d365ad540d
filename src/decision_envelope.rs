// =============================================================================
// Decision Envelope — Auditable record of every evaluate-risk decision
// =============================================================================
//
// Every decision request flows through a multi-layer pipeline (input
// validation, range confidence, fluid risk model, recent-trade adjuster).
// The Decision Envelope captures the verdict from each layer so that every
// decision can be audited after the fact.
// =============================================================================

use std::collections::HashMap;
use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;

use crate::types::DecisionMethod;

/// Complete auditable record of one decision, including all layer verdicts.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionEnvelope {
    /// Unique identifier for this decision (UUID v4).
    pub id: String,

    /// The caller-supplied signal id this decision was made for. Doubles as
    /// the join key outcome intake uses to find the matching prior decision.
    pub entry_signal_id: String,

    /// Instrument the decision pertains to.
    pub instrument: String,

    /// "long" or "short".
    pub direction: String,

    /// Which code path produced the decision.
    pub method: String,

    /// Predicted confidence at decision time, used for the predicted-vs-
    /// actual calibration bucket emitted once the matching outcome arrives.
    pub confidence: f64,

    /// Input-validation gate verdict ("PASS" / "FAIL").
    pub input_verdict: String,

    /// Range confidence engine verdict ("PASS" / "FAIL" / "SKIPPED").
    pub confidence_verdict: String,

    /// Fluid risk model verdict ("PASS" / "FAIL" / "SKIPPED").
    pub fluid_risk_verdict: String,

    /// Recent-trade adjuster verdict: "PASS" when no penalty/override fired.
    pub adjuster_verdict: String,

    /// Final decision: "ALLOW" or "BLOCK".
    pub final_decision: String,

    /// Which layer blocked the request, if blocked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocking_layer: Option<String>,

    /// Human-readable reasons accumulated across layers.
    pub reasons: Vec<String>,

    /// ISO 8601 timestamp of when this decision was created.
    pub created_at: String,

    /// The feature values the decision was scored against. Not serialized
    /// to callers; kept only so outcome intake can later join it into the
    /// learning vector for the matching `entry_signal_id`.
    #[serde(skip)]
    pub features: HashMap<String, f64>,
}

impl DecisionEnvelope {
    pub fn allow(
        entry_signal_id: impl Into<String>,
        instrument: impl Into<String>,
        direction: impl Into<String>,
        method: DecisionMethod,
        confidence: f64,
        features: HashMap<String, f64>,
        reasons: Vec<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            entry_signal_id: entry_signal_id.into(),
            instrument: instrument.into(),
            direction: direction.into(),
            method: method.to_string(),
            confidence,
            input_verdict: "PASS".to_string(),
            confidence_verdict: "PASS".to_string(),
            fluid_risk_verdict: "PASS".to_string(),
            adjuster_verdict: "PASS".to_string(),
            final_decision: "ALLOW".to_string(),
            blocking_layer: None,
            reasons,
            created_at: chrono::Utc::now().to_rfc3339(),
            features,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn blocked(
        entry_signal_id: impl Into<String>,
        instrument: impl Into<String>,
        direction: impl Into<String>,
        method: DecisionMethod,
        confidence: f64,
        features: HashMap<String, f64>,
        blocking_layer: impl Into<String>,
        reasons: Vec<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            entry_signal_id: entry_signal_id.into(),
            instrument: instrument.into(),
            direction: direction.into(),
            method: method.to_string(),
            confidence,
            input_verdict: "PASS".to_string(),
            confidence_verdict: "FAIL".to_string(),
            fluid_risk_verdict: "FAIL".to_string(),
            adjuster_verdict: "PASS".to_string(),
            final_decision: "BLOCK".to_string(),
            blocking_layer: Some(blocking_layer.into()),
            reasons,
            created_at: chrono::Utc::now().to_rfc3339(),
            features,
        }
    }
}

/// Bounded, `entry_signal_id`-keyed log of recent decisions. Doubles as the
/// "prior decision record" store outcome intake consults to join
/// decision-time features into the learning vector and to emit a
/// predicted-vs-actual calibration event.
pub struct DecisionLog {
    inner: Mutex<LruCache<String, DecisionEnvelope>>,
}

impl DecisionLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn record(&self, envelope: DecisionEnvelope) {
        self.inner.lock().put(envelope.entry_signal_id.clone(), envelope);
    }

    pub fn get(&self, entry_signal_id: &str) -> Option<DecisionEnvelope> {
        self.inner.lock().get(entry_signal_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_log_round_trips_by_entry_signal_id() {
        let log = DecisionLog::new(10);
        let envelope = DecisionEnvelope::allow(
            "sig-1",
            "MGC",
            "long",
            DecisionMethod::FluidRiskModel,
            0.72,
            HashMap::new(),
            vec![],
        );
        log.record(envelope);
        let found = log.get("sig-1").expect("decision should be recorded");
        assert_eq!(found.entry_signal_id, "sig-1");
        assert_eq!(found.confidence, 0.72);
    }

    #[test]
    fn decision_log_is_bounded() {
        let log = DecisionLog::new(2);
        for i in 0..5 {
            log.record(DecisionEnvelope::allow(
                format!("sig-{i}"),
                "MGC",
                "long",
                DecisionMethod::FluidRiskModel,
                0.5,
                HashMap::new(),
                vec![],
            ));
        }
        assert_eq!(log.len(), 2);
        assert!(log.get("sig-0").is_none());
        assert!(log.get("sig-4").is_some());
    }
}
