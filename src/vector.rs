// =============================================================================
// Vector — an immutable record of one trade, open or closed
// =============================================================================

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{DataType, Direction, ExitReason, MemoryKey};

/// Outcome fields attached to a vector once the trade has closed. Absent for
/// an open position, which is not eligible for range computation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    pub pnl: f64,
    pub quantity: f64,
    pub pnl_per_contract: f64,
    pub exit_reason: ExitReason,
    pub max_profit: f64,
    pub max_loss: f64,
    pub holding_bars: u32,
    pub was_good_exit: bool,
    #[serde(default)]
    pub profit_by_bar: HashMap<u32, f64>,
}

impl Outcome {
    pub fn is_profitable(&self) -> bool {
        self.pnl_per_contract > 0.0
    }
}

/// An immutable trade record: the unit the pattern memory stores and the
/// range tables are built from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vector {
    pub entry_signal_id: String,
    pub instrument: String,
    pub direction: Direction,
    pub entry_type: String,
    pub timestamp: DateTime<Utc>,
    pub features: HashMap<String, f64>,
    pub outcome: Option<Outcome>,
    pub data_type: DataType,
    pub importance: f64,
}

impl Vector {
    /// Constructs a vector, normalizing the feature map (dropping
    /// non-finite values) and deriving `data_type` from the timestamp year.
    pub fn new(
        entry_signal_id: String,
        instrument: String,
        direction: Direction,
        entry_type: String,
        timestamp: DateTime<Utc>,
        features: HashMap<String, f64>,
        outcome: Option<Outcome>,
        importance: f64,
    ) -> Self {
        let features = features
            .into_iter()
            .filter(|(_, v)| v.is_finite())
            .collect();

        let data_type = if timestamp.format("%Y").to_string().parse::<i32>().unwrap_or(9999) <= 2024
        {
            DataType::Training
        } else {
            DataType::Recent
        };

        Self {
            entry_signal_id,
            instrument,
            direction,
            entry_type,
            timestamp,
            features,
            outcome,
            data_type,
            importance,
        }
    }

    pub fn key(&self) -> MemoryKey {
        MemoryKey::new(&self.instrument, self.direction)
    }

    pub fn is_profitable(&self) -> bool {
        self.outcome.as_ref().is_some_and(Outcome::is_profitable)
    }

    pub fn pnl_per_contract(&self) -> Option<f64> {
        self.outcome.as_ref().map(|o| o.pnl_per_contract)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(year: i32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn drops_non_finite_features() {
        let mut features = HashMap::new();
        features.insert("rsi_14".to_string(), 55.0);
        features.insert("broken".to_string(), f64::NAN);
        let v = Vector::new(
            "sig-1".to_string(),
            "MGC AUG25".to_string(),
            Direction::Long,
            "EMA_CROSS".to_string(),
            ts(2025),
            features,
            None,
            0.5,
        );
        assert!(v.features.contains_key("rsi_14"));
        assert!(!v.features.contains_key("broken"));
    }

    #[test]
    fn training_vs_recent_by_year() {
        let v1 = Vector::new(
            "a".into(),
            "MGC".into(),
            Direction::Long,
            "x".into(),
            ts(2023),
            HashMap::new(),
            None,
            0.5,
        );
        let v2 = Vector::new(
            "b".into(),
            "MGC".into(),
            Direction::Long,
            "x".into(),
            ts(2025),
            HashMap::new(),
            None,
            0.5,
        );
        assert_eq!(v1.data_type, DataType::Training);
        assert_eq!(v2.data_type, DataType::Recent);
    }

    #[test]
    fn pnl_normalization_holds() {
        let outcome = Outcome {
            pnl: 200.0,
            quantity: 4.0,
            pnl_per_contract: 50.0,
            exit_reason: ExitReason::TakeProfit,
            max_profit: 60.0,
            max_loss: 0.0,
            holding_bars: 10,
            was_good_exit: true,
            profit_by_bar: HashMap::new(),
        };
        assert!((outcome.pnl_per_contract * outcome.quantity - outcome.pnl).abs() < 1e-6);
    }
}
