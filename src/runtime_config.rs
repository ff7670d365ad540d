// =============================================================================
// Runtime Configuration — env/JSON-driven engine settings with atomic save
// =============================================================================
//
// Every tunable lives here so the engine can be reconfigured without a
// restart. Persistence uses an atomic tmp + rename pattern to avoid
// corruption on crash; every field carries `#[serde(default = "...")]` so
// that adding new fields never breaks loading an older config file.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

fn default_bind_addr() -> String {
    "0.0.0.0:3100".to_string()
}

fn default_feature_provider_url() -> String {
    "http://localhost:4000".to_string()
}

fn default_vector_store_url() -> String {
    "http://localhost:4100".to_string()
}

fn default_vector_store_path() -> String {
    "vectors.jsonl".to_string()
}

fn default_cache_capacity() -> usize {
    1000
}

fn default_cache_ttl_secs() -> u64 {
    60
}

fn default_min_confidence() -> f64 {
    0.55
}

fn default_min_valid_features() -> usize {
    3
}

fn default_false() -> bool {
    false
}

/// Top-level runtime configuration for the risk-decision engine.
///
/// Every field has a serde default so older JSON files missing new fields
/// still deserialize correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Address the HTTP surface binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Base URL of the upstream feature-engineering ("ME") service.
    #[serde(default = "default_feature_provider_url")]
    pub feature_provider_url: String,

    /// Base URL of the historical vector store, used when not loading
    /// from a local JSONL snapshot at startup.
    #[serde(default = "default_vector_store_url")]
    pub vector_store_url: String,

    /// Local JSONL snapshot path, used when `use_remote_vector_store` is
    /// false.
    #[serde(default = "default_vector_store_path")]
    pub vector_store_path: String,

    /// Whether to load historical vectors from `vector_store_url` (true)
    /// or `vector_store_path` (false) at startup.
    #[serde(default = "default_false")]
    pub use_remote_vector_store: bool,

    /// Backtest mode switches the recent-trade lookback from a time-window
    /// selection to a sequence-based one.
    #[serde(default = "default_false")]
    pub backtest_mode: bool,

    /// When set, outcome intake stores every record regardless of the
    /// noise-importance classification.
    #[serde(default = "default_false")]
    pub force_store_all: bool,

    /// Response cache (C9) capacity.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Response cache (C9) TTL, seconds.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Optional seed for the directional-bias RNG. When absent the
    /// engine seeds from OS entropy, which is fine in production but makes
    /// the draw rate non-reproducible — tests always pin a seed.
    #[serde(default)]
    pub bias_rng_seed: Option<u64>,

    /// Minimum overall confidence for the range confidence engine (C4) to
    /// approve a query.
    #[serde(default = "default_min_confidence")]
    pub min_overall_confidence: f64,

    /// Minimum number of graduated features required for C4 to approve.
    #[serde(default = "default_min_valid_features")]
    pub min_valid_features: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            feature_provider_url: default_feature_provider_url(),
            vector_store_url: default_vector_store_url(),
            vector_store_path: default_vector_store_path(),
            use_remote_vector_store: false,
            backtest_mode: false,
            force_store_all: false,
            cache_capacity: default_cache_capacity(),
            cache_ttl_secs: default_cache_ttl_secs(),
            bias_rng_seed: None,
            min_overall_confidence: default_min_confidence(),
            min_valid_features: default_min_valid_features(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(path = %path.display(), bind_addr = %config.bind_addr, "runtime config loaded");

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename). Prevents corruption if the process
    /// crashes mid-write.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }

    /// Applies environment-variable overrides on top of a loaded (or
    /// default) config.
    pub fn apply_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("ENGINE_BIND_ADDR") {
            self.bind_addr = v;
        }
        if let Ok(v) = std::env::var("ENGINE_FEATURE_PROVIDER_URL") {
            self.feature_provider_url = v;
        }
        if let Ok(v) = std::env::var("ENGINE_VECTOR_STORE_URL") {
            self.vector_store_url = v;
        }
        if let Ok(v) = std::env::var("ENGINE_BACKTEST_MODE") {
            self.backtest_mode = v == "1" || v.eq_ignore_ascii_case("true");
        }
        if let Ok(v) = std::env::var("ENGINE_FORCE_STORE_ALL") {
            self.force_store_all = v == "1" || v.eq_ignore_ascii_case("true");
        }
        if let Ok(v) = std::env::var("ENGINE_CACHE_CAPACITY") {
            if let Ok(n) = v.parse() {
                self.cache_capacity = n;
            }
        }
        if let Ok(v) = std::env::var("ENGINE_CACHE_TTL_SECS") {
            if let Ok(n) = v.parse() {
                self.cache_ttl_secs = n;
            }
        }
        if let Ok(v) = std::env::var("ENGINE_BIAS_RNG_SEED") {
            if let Ok(n) = v.parse() {
                self.bias_rng_seed = Some(n);
            }
        }
        self
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.bind_addr, "0.0.0.0:3100");
        assert_eq!(cfg.cache_capacity, 1000);
        assert_eq!(cfg.cache_ttl_secs, 60);
        assert!(!cfg.backtest_mode);
        assert!(!cfg.force_store_all);
        assert!((cfg.min_overall_confidence - 0.55).abs() < f64::EPSILON);
        assert_eq!(cfg.min_valid_features, 3);
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: RuntimeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.bind_addr, "0.0.0.0:3100");
        assert_eq!(cfg.cache_capacity, 1000);
        assert!(cfg.bias_rng_seed.is_none());
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "bind_addr": "127.0.0.1:9000", "bias_rng_seed": 7 }"#;
        let cfg: RuntimeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.bind_addr, "127.0.0.1:9000");
        assert_eq!(cfg.bias_rng_seed, Some(7));
        assert_eq!(cfg.cache_capacity, 1000);
    }

    #[test]
    fn roundtrip_serialisation() {
        let cfg = RuntimeConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let cfg2: RuntimeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg.bind_addr, cfg2.bind_addr);
        assert_eq!(cfg.cache_capacity, cfg2.cache_capacity);
    }

    #[test]
    fn env_override_applies_bind_addr() {
        std::env::set_var("ENGINE_BIND_ADDR", "0.0.0.0:1234");
        let cfg = RuntimeConfig::default().apply_env_overrides();
        assert_eq!(cfg.bind_addr, "0.0.0.0:1234");
        std::env::remove_var("ENGINE_BIND_ADDR");
    }
}
