// =============================================================================
// Graduated Range Table — profitable-only quantile ranges per feature
// =============================================================================
//
// Lazy single-builder-per-key cache, the same shape as
// `regime/detector.rs`'s cached `Arc<RwLock<Option<RegimeState>>>`: readers
// see either the previous table or a freshly rebuilt one, never a torn one.
//
// =============================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::types::MemoryKey;
use crate::vector::Vector;

const MIN_PROFITABLE_SAMPLES: usize = 10;
const MIN_FEATURE_SAMPLES: usize = 10;
const QUANTILE_POINTS: [f64; 5] = [0.10, 0.25, 0.50, 0.75, 0.90];

/// Quantile summary for a single feature, computed over profitable vectors.
#[derive(Debug, Clone, Copy)]
pub struct FeatureRange {
    pub q10: f64,
    pub q25: f64,
    pub q50: f64,
    pub q75: f64,
    pub q90: f64,
    pub sample_size: usize,
    pub mean: f64,
    pub std_dev: f64,
}

impl FeatureRange {
    /// Which zone a query value falls into. Boundary values belong to the
    /// tighter zone: optimal beats good beats poor.
    pub fn zone(&self, value: f64) -> Zone {
        if value >= self.q25 && value <= self.q75 {
            Zone::Optimal
        } else if (value >= self.q10 && value < self.q25) || (value > self.q75 && value <= self.q90)
        {
            Zone::Good
        } else {
            Zone::Poor
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    Optimal,
    Good,
    Poor,
}

impl Zone {
    pub fn score(self) -> f64 {
        match self {
            Zone::Optimal => 0.90,
            Zone::Good => 0.65,
            Zone::Poor => 0.20,
        }
    }
}

pub enum BuildOutcome {
    Built(Arc<RangeTable>),
    NotReady,
}

/// The graduated range table for one key.
#[derive(Debug)]
pub struct RangeTable {
    pub features: HashMap<String, FeatureRange>,
    pub vector_count: usize,
    pub built_at: u64,
}

impl RangeTable {
    pub fn get(&self, feature: &str) -> Option<&FeatureRange> {
        self.features.get(feature)
    }
}

#[derive(Default)]
struct Slot {
    table: Option<Arc<RangeTable>>,
    source_len_at_build: usize,
}

/// Owns the per-key lazily-built graduated range tables and the tick counter
/// used to stamp `built_at`.
pub struct RangeTables {
    slots: Mutex<HashMap<MemoryKey, Slot>>,
    tick: AtomicU64,
}

impl Default for RangeTables {
    fn default() -> Self {
        Self::new()
    }
}

impl RangeTables {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            tick: AtomicU64::new(0),
        }
    }

    /// Invalidates the table for `key`, forcing a rebuild on next demand.
    /// Called by outcome intake whenever a vector is inserted into that key.
    pub fn invalidate(&self, key: &MemoryKey) {
        self.slots.lock().remove(key);
    }

    /// Returns the current table for `key`, building (or rebuilding, if the
    /// source partition grew by more than 5% since the last build) as
    /// needed. `vectors` is the full set for the key (training + recent).
    pub fn get_or_build(&self, key: &MemoryKey, vectors: &[Vector]) -> BuildOutcome {
        let mut slots = self.slots.lock();
        let needs_build = match slots.get(key) {
            None => true,
            Some(slot) => {
                let grown = vectors.len() as f64
                    > slot.source_len_at_build as f64 * 1.05
                    && vectors.len() != slot.source_len_at_build;
                slot.table.is_none() || grown
            }
        };

        if !needs_build {
            return match slots.get(key).and_then(|s| s.table.clone()) {
                Some(t) => BuildOutcome::Built(t),
                None => BuildOutcome::NotReady,
            };
        }

        let built = build_table(vectors, self.tick.fetch_add(1, Ordering::Relaxed));
        match built {
            Some(table) => {
                let table = Arc::new(table);
                slots.insert(
                    key.clone(),
                    Slot {
                        table: Some(Arc::clone(&table)),
                        source_len_at_build: vectors.len(),
                    },
                );
                BuildOutcome::Built(table)
            }
            None => {
                slots.insert(
                    key.clone(),
                    Slot {
                        table: None,
                        source_len_at_build: vectors.len(),
                    },
                );
                BuildOutcome::NotReady
            }
        }
    }
}

fn build_table(vectors: &[Vector], built_at: u64) -> Option<RangeTable> {
    let profitable: Vec<&Vector> = vectors.iter().filter(|v| v.is_profitable()).collect();
    if profitable.len() < MIN_PROFITABLE_SAMPLES {
        return None;
    }

    let mut by_feature: HashMap<&str, Vec<f64>> = HashMap::new();
    for v in &profitable {
        for (name, value) in &v.features {
            if value.is_finite() {
                by_feature.entry(name.as_str()).or_default().push(*value);
            }
        }
    }

    let mut features = HashMap::new();
    for (name, mut values) in by_feature {
        if values.len() < MIN_FEATURE_SAMPLES {
            continue;
        }
        values.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let n = values.len();
        let quantile = |p: f64| -> f64 {
            let idx = ((p * n as f64).floor() as usize).min(n - 1);
            values[idx]
        };
        let mean = values.iter().sum::<f64>() / n as f64;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
        features.insert(
            name.to_string(),
            FeatureRange {
                q10: quantile(QUANTILE_POINTS[0]),
                q25: quantile(QUANTILE_POINTS[1]),
                q50: quantile(QUANTILE_POINTS[2]),
                q75: quantile(QUANTILE_POINTS[3]),
                q90: quantile(QUANTILE_POINTS[4]),
                sample_size: n,
                mean,
                std_dev: variance.sqrt(),
            },
        );
    }

    Some(RangeTable {
        features,
        vector_count: profitable.len(),
        built_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Direction;
    use crate::vector::Outcome;
    use chrono::Utc;
    use std::collections::HashMap as Map;

    fn profitable_vector(rsi: f64) -> Vector {
        let mut features = Map::new();
        features.insert("rsi_14".to_string(), rsi);
        let outcome = Outcome {
            pnl: 10.0,
            quantity: 1.0,
            pnl_per_contract: 10.0,
            exit_reason: crate::types::ExitReason::TakeProfit,
            max_profit: 10.0,
            max_loss: 0.0,
            holding_bars: 5,
            was_good_exit: true,
            profit_by_bar: Map::new(),
        };
        Vector {
            entry_signal_id: "s".into(),
            instrument: "MGC".into(),
            direction: Direction::Long,
            entry_type: "x".into(),
            timestamp: Utc::now(),
            features,
            outcome: Some(outcome),
            data_type: crate::types::DataType::Recent,
            importance: 0.5,
        }
    }

    #[test]
    fn not_ready_below_minimum_samples() {
        let vectors: Vec<Vector> = (0..5).map(|i| profitable_vector(40.0 + i as f64)).collect();
        let tables = RangeTables::new();
        let key = MemoryKey::new("MGC", Direction::Long);
        match tables.get_or_build(&key, &vectors) {
            BuildOutcome::NotReady => {}
            BuildOutcome::Built(_) => panic!("expected NotReady"),
        }
    }

    #[test]
    fn builds_quantiles_with_enough_samples() {
        let vectors: Vec<Vector> = (0..20).map(|i| profitable_vector(40.0 + i as f64)).collect();
        let tables = RangeTables::new();
        let key = MemoryKey::new("MGC", Direction::Long);
        match tables.get_or_build(&key, &vectors) {
            BuildOutcome::Built(table) => {
                let range = table.get("rsi_14").unwrap();
                assert!(range.q25 < range.q50);
                assert!(range.q50 < range.q75);
            }
            BuildOutcome::NotReady => panic!("expected Built"),
        }
    }

    #[test]
    fn zone_boundary_prefers_tighter_zone() {
        let range = FeatureRange {
            q10: 10.0,
            q25: 20.0,
            q50: 30.0,
            q75: 40.0,
            q90: 50.0,
            sample_size: 20,
            mean: 30.0,
            std_dev: 5.0,
        };
        assert_eq!(range.zone(20.0), Zone::Optimal);
        assert_eq!(range.zone(40.0), Zone::Optimal);
        assert_eq!(range.zone(15.0), Zone::Good);
    }
}
