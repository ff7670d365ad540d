// =============================================================================
// Recent-Trade Adjuster — modulates SL/TP and confidence off a loss streak
// =============================================================================
//
// Scans the RECENT partition the way `signals/signal_decay.rs` scans its
// recency-windowed entries, but over trade outcomes rather than signal
// scores.
//
// =============================================================================

use chrono::{DateTime, Utc};

use crate::types::Direction;
use crate::vector::Vector;

const LOOKBACK: usize = 10;
const LIVE_WINDOW: chrono::Duration = chrono::Duration::hours(24);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recommendation {
    TighterRisk,
    UltraTightRisk,
    CautiousRisk,
    HighCaution,
    None,
}

#[derive(Debug, Clone)]
pub struct AdjusterResult {
    pub recommendation: Recommendation,
    pub override_sl: Option<f64>,
    pub override_tp: Option<f64>,
    pub confidence_penalty: f64,
    pub consecutive_losses: u32,
    pub recent_win_rate: f64,
    pub total_recent_trades: usize,
    pub reason: Option<String>,
}

/// `backtest_mode` selects the lookback strategy: sequence-based (most
/// recent N by insertion order) vs time-window-based (last 24h before
/// `now`).
pub fn evaluate(recent: &[Vector], now: DateTime<Utc>, backtest_mode: bool) -> AdjusterResult {
    let mut ordered: Vec<&Vector> = recent.iter().filter(|v| v.outcome.is_some()).collect();
    ordered.sort_by_key(|v| v.timestamp);

    let window: Vec<&Vector> = if backtest_mode {
        ordered.into_iter().rev().take(LOOKBACK).collect()
    } else {
        ordered
            .into_iter()
            .rev()
            .filter(|v| now - v.timestamp < LIVE_WINDOW && v.timestamp <= now)
            .take(LOOKBACK)
            .collect()
    };

    let total_recent_trades = window.len();
    if window.is_empty() {
        return AdjusterResult {
            recommendation: Recommendation::None,
            override_sl: None,
            override_tp: None,
            confidence_penalty: 0.0,
            consecutive_losses: 0,
            recent_win_rate: 0.0,
            total_recent_trades: 0,
            reason: None,
        };
    }

    let mut consecutive_losses = 0u32;
    let mut losing_direction: Option<Direction> = None;
    let mut same_direction_losses = 0u32;
    for v in &window {
        let pnl = v.outcome.as_ref().unwrap().pnl_per_contract;
        if pnl <= 0.0 {
            consecutive_losses += 1;
            if losing_direction.is_none() {
                losing_direction = Some(v.direction);
            }
            if Some(v.direction) == losing_direction {
                same_direction_losses += 1;
            }
        } else {
            break;
        }
    }

    let losses_during_streak: Vec<&&Vector> = window
        .iter()
        .take(consecutive_losses as usize)
        .collect();
    let avg_max_profit = mean(losses_during_streak.iter().map(|v| v.outcome.as_ref().unwrap().max_profit));
    let avg_loss_mag = mean(
        losses_during_streak
            .iter()
            .map(|v| v.outcome.as_ref().unwrap().max_loss.abs()),
    );

    let wins = window
        .iter()
        .filter(|v| v.outcome.as_ref().unwrap().pnl_per_contract > 0.0)
        .count();
    let recent_win_rate = wins as f64 / total_recent_trades as f64;

    // First match wins.
    if consecutive_losses >= 5 && avg_max_profit > 20.0 {
        // Unit note: `avg_max_profit` is a point/price-space quantity from
        // history, divided by 10 here, then written straight into the
        // dollar-denominated suggested_tp field. The mismatch is carried
        // over deliberately rather than silently corrected.
        return AdjusterResult {
            recommendation: Recommendation::TighterRisk,
            override_sl: Some((0.7 * avg_loss_mag / 10.0).ceil().max(1.0)),
            override_tp: Some((avg_max_profit / 10.0).ceil().max(1.0)),
            confidence_penalty: 0.0,
            consecutive_losses,
            recent_win_rate,
            total_recent_trades,
            reason: Some("5+ consecutive losses with meaningful unrealized profit".to_string()),
        };
    }
    if consecutive_losses >= 3 && avg_max_profit < 10.0 {
        return AdjusterResult {
            recommendation: Recommendation::UltraTightRisk,
            override_sl: Some((0.3 * avg_loss_mag / 10.0).max(1.0)),
            override_tp: Some((avg_max_profit / 10.0).max(1.0)),
            confidence_penalty: 0.0,
            consecutive_losses,
            recent_win_rate,
            total_recent_trades,
            reason: Some("3+ consecutive losses with thin unrealized profit".to_string()),
        };
    }
    if consecutive_losses >= 3 && (10.0..=20.0).contains(&avg_max_profit) {
        return AdjusterResult {
            recommendation: Recommendation::CautiousRisk,
            override_sl: Some((0.5 * avg_loss_mag / 10.0).ceil()),
            override_tp: Some((avg_max_profit / 10.0).ceil()),
            confidence_penalty: 0.3,
            consecutive_losses,
            recent_win_rate,
            total_recent_trades,
            reason: Some("3+ consecutive losses, moderate unrealized profit".to_string()),
        };
    }
    if consecutive_losses >= 2 && same_direction_losses >= 2 {
        return AdjusterResult {
            recommendation: Recommendation::HighCaution,
            override_sl: None,
            override_tp: None,
            confidence_penalty: 0.3,
            consecutive_losses,
            recent_win_rate,
            total_recent_trades,
            reason: Some("2+ consecutive losses concentrated on one direction".to_string()),
        };
    }
    if total_recent_trades >= 5 && recent_win_rate < 0.4 {
        return AdjusterResult {
            recommendation: Recommendation::None,
            override_sl: None,
            override_tp: None,
            confidence_penalty: 0.3,
            consecutive_losses,
            recent_win_rate,
            total_recent_trades,
            reason: Some("recent win rate below 40%".to_string()),
        };
    }

    AdjusterResult {
        recommendation: Recommendation::None,
        override_sl: None,
        override_tp: None,
        confidence_penalty: 0.0,
        consecutive_losses,
        recent_win_rate,
        total_recent_trades,
        reason: None,
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let values: Vec<f64> = values.collect();
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ExitReason;
    use crate::vector::Outcome;
    use std::collections::HashMap;

    fn losing_vector(max_profit: f64, max_loss: f64, minutes_ago: i64, now: DateTime<Utc>) -> Vector {
        let outcome = Outcome {
            pnl: -25.0,
            quantity: 1.0,
            pnl_per_contract: -25.0,
            exit_reason: ExitReason::StopLoss,
            max_profit,
            max_loss,
            holding_bars: 5,
            was_good_exit: false,
            profit_by_bar: HashMap::new(),
        };
        Vector {
            entry_signal_id: "s".into(),
            instrument: "MGC".into(),
            direction: Direction::Long,
            entry_type: "x".into(),
            timestamp: now - chrono::Duration::minutes(minutes_ago),
            features: HashMap::new(),
            outcome: Some(outcome),
            data_type: crate::types::DataType::Recent,
            importance: 0.5,
        }
    }

    #[test]
    fn five_losses_triggers_tighter_risk() {
        let now = Utc::now();
        let vectors: Vec<Vector> = (0..5)
            .map(|i| losing_vector(25.0, 30.0, (5 - i) * 10, now))
            .collect();
        let result = evaluate(&vectors, now, true);
        assert_eq!(result.recommendation, Recommendation::TighterRisk);
        assert!(result.override_sl.unwrap() <= 3.0);
        assert!(result.override_tp.unwrap() <= 3.0);
    }

    #[test]
    fn no_losses_is_a_no_op() {
        let now = Utc::now();
        let result = evaluate(&[], now, true);
        assert_eq!(result.recommendation, Recommendation::None);
        assert_eq!(result.confidence_penalty, 0.0);
    }
}
