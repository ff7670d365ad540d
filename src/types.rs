// =============================================================================
// Shared types used across the risk-decision engine
// =============================================================================

use serde::{Deserialize, Serialize};

/// Trade direction. Drives the second half of a pattern-memory key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// The opposite side, used by the directional-bias check.
    pub fn opposite(self) -> Self {
        match self {
            Self::Long => Self::Short,
            Self::Short => Self::Long,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "long"),
            Self::Short => write!(f, "short"),
        }
    }
}

/// How a closed trade exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    Manual,
    Time,
    Trailing,
    Unknown,
}

impl Default for ExitReason {
    fn default() -> Self {
        Self::Unknown
    }
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TakeProfit => write!(f, "take_profit"),
            Self::StopLoss => write!(f, "stop_loss"),
            Self::Manual => write!(f, "manual"),
            Self::Time => write!(f, "time"),
            Self::Trailing => write!(f, "trailing"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Which partition of pattern memory a vector belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataType {
    Training,
    Recent,
    OutOfSample,
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Training => write!(f, "TRAINING"),
            Self::Recent => write!(f, "RECENT"),
            Self::OutOfSample => write!(f, "OUT_OF_SAMPLE"),
        }
    }
}

/// Identifies which code path produced a decision, surfaced in the response
/// so operators can see when the engine has degraded to a fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionMethod {
    FluidRiskModel,
    RuleBased,
    DefaultApproval,
    Failsafe,
    DirectionalBiasRejection,
}

impl std::fmt::Display for DecisionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FluidRiskModel => write!(f, "fluid_risk_model"),
            Self::RuleBased => write!(f, "rule_based"),
            Self::DefaultApproval => write!(f, "default_approval"),
            Self::Failsafe => write!(f, "failsafe"),
            Self::DirectionalBiasRejection => write!(f, "directional_bias_rejection"),
        }
    }
}

/// The (instrument, direction) key that partitions pattern memory and range
/// tables. The instrument half is always the normalized base symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemoryKey {
    pub instrument_base: String,
    pub direction: Direction,
}

impl MemoryKey {
    /// Normalizes a raw instrument string (which may carry a contract suffix,
    /// e.g. "MGC AUG25") down to its base symbol: the first whitespace
    /// delimited token, upper-cased.
    pub fn new(instrument: &str, direction: Direction) -> Self {
        let instrument_base = instrument
            .split_whitespace()
            .next()
            .unwrap_or(instrument)
            .to_uppercase();
        Self {
            instrument_base,
            direction,
        }
    }
}

impl std::fmt::Display for MemoryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.instrument_base, self.direction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_normalizes_contract_suffix() {
        let a = MemoryKey::new("MGC AUG25", Direction::Long);
        let b = MemoryKey::new("mgc", Direction::Long);
        let c = MemoryKey::new("MGC DEC25", Direction::Long);
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn key_distinguishes_direction() {
        let a = MemoryKey::new("MGC", Direction::Long);
        let b = MemoryKey::new("MGC", Direction::Short);
        assert_ne!(a, b);
    }
}
