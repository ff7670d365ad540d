// =============================================================================
// Pattern Memory — per-key TRAINING/RECENT partitions of historical vectors
// =============================================================================
//
// State behind a lock, snapshot reads, single-writer-per-key mutation. Each
// key gets its own entry so that a write against one instrument never blocks
// a read against another.
//
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::types::{DataType, MemoryKey};
use crate::vector::Vector;

#[derive(Debug, Default)]
struct KeyMemory {
    training: Vec<Vector>,
    recent: Vec<Vector>,
}

impl KeyMemory {
    fn insert(&mut self, vector: Vector) {
        match vector.data_type {
            DataType::Training => self.training.push(vector),
            DataType::Recent | DataType::OutOfSample => self.recent.push(vector),
        }
    }
}

/// Process-wide store of historical vectors, keyed by `(instrumentBase,
/// direction)`. Populated at startup from the vector store (`vector_store.rs`)
/// and mutated thereafter only through `insert` from outcome intake.
#[derive(Debug, Default)]
pub struct PatternMemory {
    keys: RwLock<HashMap<MemoryKey, Arc<RwLock<KeyMemory>>>>,
}

impl PatternMemory {
    pub fn new() -> Self {
        Self::default()
    }

    fn key_slot(&self, key: &MemoryKey) -> Arc<RwLock<KeyMemory>> {
        if let Some(slot) = self.keys.read().get(key) {
            return Arc::clone(slot);
        }
        let mut keys = self.keys.write();
        Arc::clone(
            keys.entry(key.clone())
                .or_insert_with(|| Arc::new(RwLock::new(KeyMemory::default()))),
        )
    }

    /// Appends `vector` into the partition selected by its `data_type`.
    /// Single-writer per key via the key's own lock.
    pub fn insert(&self, vector: Vector) {
        let slot = self.key_slot(&vector.key());
        slot.write().insert(vector);
    }

    /// Both partitions concatenated, training vectors first, each internally
    /// in insertion (timestamp) order.
    pub fn vectors_for(&self, key: &MemoryKey) -> Vec<Vector> {
        let Some(slot) = self.keys.read().get(key).map(Arc::clone) else {
            return Vec::new();
        };
        let guard = slot.read();
        let mut out = Vec::with_capacity(guard.training.len() + guard.recent.len());
        out.extend(guard.training.iter().cloned());
        out.extend(guard.recent.iter().cloned());
        out
    }

    /// The RECENT partition only, used by the recent-trade adjuster.
    pub fn recent_for(&self, key: &MemoryKey) -> Vec<Vector> {
        let Some(slot) = self.keys.read().get(key).map(Arc::clone) else {
            return Vec::new();
        };
        slot.read().recent.clone()
    }

    /// Number of vectors held for a key, across both partitions.
    pub fn len_for(&self, key: &MemoryKey) -> usize {
        let Some(slot) = self.keys.read().get(key).map(Arc::clone) else {
            return 0;
        };
        let guard = slot.read();
        guard.training.len() + guard.recent.len()
    }

    /// Total vector count across all keys, used for health reporting.
    pub fn total_len(&self) -> usize {
        self.keys
            .read()
            .values()
            .map(|slot| {
                let guard = slot.read();
                guard.training.len() + guard.recent.len()
            })
            .sum()
    }

    /// One-shot bulk load used at startup. Malformed records are the
    /// caller's concern (skipped before they reach here); this just inserts.
    pub fn load_all(&self, vectors: impl IntoIterator<Item = Vector>) {
        for v in vectors {
            self.insert(v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Direction;
    use crate::vector::Outcome;
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap as Map;

    fn vector(year: i32, pnl_pc: f64) -> Vector {
        let outcome = Outcome {
            pnl: pnl_pc,
            quantity: 1.0,
            pnl_per_contract: pnl_pc,
            exit_reason: crate::types::ExitReason::TakeProfit,
            max_profit: pnl_pc.max(0.0),
            max_loss: (-pnl_pc).max(0.0),
            holding_bars: 5,
            was_good_exit: pnl_pc > 0.0,
            profit_by_bar: Map::new(),
        };
        Vector::new(
            "sig".into(),
            "MGC".into(),
            Direction::Long,
            "EMA".into(),
            Utc.with_ymd_and_hms(year, 6, 1, 0, 0, 0).unwrap(),
            Map::new(),
            Some(outcome),
            0.5,
        )
    }

    #[test]
    fn partitions_by_data_type() {
        let mem = PatternMemory::new();
        mem.insert(vector(2023, 10.0));
        mem.insert(vector(2025, -5.0));
        let key = MemoryKey::new("MGC", Direction::Long);
        assert_eq!(mem.recent_for(&key).len(), 1);
        assert_eq!(mem.vectors_for(&key).len(), 2);
    }

    #[test]
    fn keys_with_suffixes_share_memory() {
        let mem = PatternMemory::new();
        let mut v = vector(2025, 1.0);
        v.instrument = "MGC AUG25".to_string();
        mem.insert(v);
        let key = MemoryKey::new("mgc dec25", Direction::Long);
        assert_eq!(mem.vectors_for(&key).len(), 1);
    }
}
