// =============================================================================
// AppState — single Arc-shared owner of every engine subsystem
// =============================================================================
//
// One struct that ties together every subsystem behind `Arc`, handed to the
// HTTP layer as a single clone-cheap value. `state_version` is a simple
// atomic counter for cheap external observability.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::cache::ResponseCache;
use crate::decision_envelope::{DecisionEnvelope, DecisionLog};
use crate::equity::EquityState;
use crate::feature_provider::FeatureProviderClient;
use crate::fluid_risk::BiasRng;
use crate::outcome_intake::OutcomeIntake;
use crate::pattern_memory::PatternMemory;
use crate::ranges::RangeTables;
use crate::runtime_config::RuntimeConfig;
use crate::telemetry::{ChannelTelemetrySink, TelemetrySink};

const MAX_RECENT_DECISIONS: usize = 100;

/// A cached response, keyed by the same fingerprint as `cache::CacheKey`.
pub type CachedDecision = serde_json::Value;

pub struct AppState {
    pub state_version: AtomicU64,
    pub config: Mutex<RuntimeConfig>,
    pub memory: Arc<PatternMemory>,
    pub tables: Arc<RangeTables>,
    pub equity: Arc<EquityState>,
    pub cache: Arc<ResponseCache<CachedDecision>>,
    pub outcome_intake: Arc<OutcomeIntake>,
    pub bias_rng: Arc<BiasRng>,
    pub feature_provider: Arc<FeatureProviderClient>,
    pub telemetry: Arc<dyn TelemetrySink>,
    pub recent_decisions: DecisionLog,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: RuntimeConfig) -> Self {
        let bias_rng = match config.bias_rng_seed {
            Some(seed) => BiasRng::from_seed(seed),
            None => BiasRng::from_entropy(),
        };
        let cache = ResponseCache::new(
            config.cache_capacity,
            std::time::Duration::from_secs(config.cache_ttl_secs),
        );
        let feature_provider = FeatureProviderClient::new(config.feature_provider_url.clone());

        Self {
            state_version: AtomicU64::new(0),
            config: Mutex::new(config),
            memory: Arc::new(PatternMemory::new()),
            tables: Arc::new(RangeTables::new()),
            equity: Arc::new(EquityState::new()),
            cache: Arc::new(cache),
            outcome_intake: Arc::new(OutcomeIntake::new()),
            bias_rng: Arc::new(bias_rng),
            feature_provider: Arc::new(feature_provider),
            telemetry: Arc::new(ChannelTelemetrySink::spawn()),
            recent_decisions: DecisionLog::new(MAX_RECENT_DECISIONS),
            start_time: Instant::now(),
        }
    }

    pub fn bump_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn push_decision(&self, envelope: DecisionEnvelope) {
        self.recent_decisions.record(envelope);
    }

    /// Looks up the decision made for `entry_signal_id`, if it's still in
    /// the bounded log. Used by outcome intake to join decision-time
    /// features into the learning vector and to emit a calibration event.
    pub fn prior_decision(&self, entry_signal_id: &str) -> Option<DecisionEnvelope> {
        self.recent_decisions.get(entry_signal_id)
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

pub type SharedAppState = Arc<AppState>;
