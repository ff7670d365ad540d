// =============================================================================
// Equity State — global, single-writer, ring buffer of recent outcomes
// =============================================================================
//
// Tracks running pnl, win/loss streaks, and drawdown over a trailing ring
// buffer of closed trades. There is no daily reset boundary here — state
// accumulates across the process lifetime.
//
// =============================================================================

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::types::Direction;

const RING_CAPACITY: usize = 100;
const BIAS_WINDOW: chrono::Duration = chrono::Duration::days(7);

#[derive(Debug, Clone)]
pub struct TradeRecord {
    pub timestamp: DateTime<Utc>,
    pub instrument: String,
    pub direction: Direction,
    pub pnl_per_contract: f64,
    pub running_total: f64,
    pub max_profit: f64,
    pub max_loss: f64,
    pub efficiency: Option<f64>,
}

#[derive(Debug, Default)]
struct Inner {
    records: VecDeque<TradeRecord>,
    running_total: f64,
    peak_equity: f64,
    win_streak: u32,
    loss_streak: u32,
    current_drawdown: f64,
    max_drawdown: f64,
}

/// A read-only snapshot of the equity state, cheap to clone and hand to
/// readers without holding the lock.
#[derive(Debug, Clone, Default)]
pub struct EquitySnapshot {
    pub records: Vec<TradeRecord>,
    pub win_streak: u32,
    pub loss_streak: u32,
    pub current_drawdown: f64,
    pub max_drawdown: f64,
}

pub struct EquityState {
    inner: Mutex<Inner>,
}

impl Default for EquityState {
    fn default() -> Self {
        Self::new()
    }
}

impl EquityState {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Records one closed trade, updating streaks and drawdown. Called only
    /// by outcome intake (C8), which guarantees single-writer ordering.
    pub fn record_trade(
        &self,
        timestamp: DateTime<Utc>,
        instrument: String,
        direction: Direction,
        pnl_per_contract: f64,
        max_profit: f64,
        max_loss: f64,
        efficiency: Option<f64>,
    ) {
        let mut inner = self.inner.lock();

        inner.running_total += pnl_per_contract;
        if inner.running_total > inner.peak_equity {
            inner.peak_equity = inner.running_total;
        }

        if inner.peak_equity > 0.0 {
            inner.current_drawdown =
                ((inner.peak_equity - inner.running_total) / inner.peak_equity * 100.0).max(0.0);
        } else {
            inner.current_drawdown = 0.0;
        }
        inner.max_drawdown = inner.max_drawdown.max(inner.current_drawdown);

        if pnl_per_contract > 0.0 {
            inner.win_streak += 1;
            inner.loss_streak = 0;
        } else if pnl_per_contract < 0.0 {
            inner.loss_streak += 1;
            inner.win_streak = 0;
        }

        let record = TradeRecord {
            timestamp,
            instrument,
            direction,
            pnl_per_contract,
            running_total: inner.running_total,
            max_profit,
            max_loss,
            efficiency,
        };
        inner.records.push_back(record);
        while inner.records.len() > RING_CAPACITY {
            inner.records.pop_front();
        }
    }

    pub fn snapshot(&self) -> EquitySnapshot {
        let inner = self.inner.lock();
        EquitySnapshot {
            records: inner.records.iter().cloned().collect(),
            win_streak: inner.win_streak,
            loss_streak: inner.loss_streak,
            current_drawdown: inner.current_drawdown,
            max_drawdown: inner.max_drawdown,
        }
    }

    /// Mean `efficiency` over the last 5 records that carried one, if any.
    pub fn recent_efficiency_mean(&self) -> Option<f64> {
        let inner = self.inner.lock();
        let values: Vec<f64> = inner
            .records
            .iter()
            .rev()
            .filter_map(|r| r.efficiency)
            .take(5)
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(values.iter().sum::<f64>() / values.len() as f64)
        }
    }

    /// Directional-bias score inputs: for a given instrument and side, the
    /// `winRate * avgWin * tradeCount` aggregate over the trailing 7-day
    /// window used by the fluid risk model's directional-bias check.
    pub fn side_score(&self, now: DateTime<Utc>, instrument: &str, direction: Direction) -> f64 {
        let inner = self.inner.lock();
        let cutoff = now - BIAS_WINDOW;
        let relevant: Vec<&TradeRecord> = inner
            .records
            .iter()
            .filter(|r| r.instrument == instrument && r.direction == direction && r.timestamp >= cutoff)
            .collect();
        if relevant.is_empty() {
            return 0.0;
        }
        let wins: Vec<&&TradeRecord> = relevant.iter().filter(|r| r.pnl_per_contract > 0.0).collect();
        let win_rate = wins.len() as f64 / relevant.len() as f64;
        let avg_win = if wins.is_empty() {
            0.0
        } else {
            wins.iter().map(|r| r.pnl_per_contract).sum::<f64>() / wins.len() as f64
        };
        win_rate * avg_win * relevant.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drawdown_resets_on_new_peak() {
        let eq = EquityState::new();
        let now = Utc::now();
        eq.record_trade(now, "MGC".into(), Direction::Long, 50.0, 50.0, 0.0, None);
        eq.record_trade(now, "MGC".into(), Direction::Long, -20.0, 0.0, 20.0, None);
        let snap = eq.snapshot();
        assert!(snap.current_drawdown > 0.0);
        eq.record_trade(now, "MGC".into(), Direction::Long, 100.0, 100.0, 0.0, None);
        let snap = eq.snapshot();
        assert_eq!(snap.current_drawdown, 0.0);
    }

    #[test]
    fn streaks_are_mutually_exclusive() {
        let eq = EquityState::new();
        let now = Utc::now();
        eq.record_trade(now, "MGC".into(), Direction::Long, 10.0, 10.0, 0.0, None);
        eq.record_trade(now, "MGC".into(), Direction::Long, 10.0, 10.0, 0.0, None);
        let snap = eq.snapshot();
        assert_eq!(snap.win_streak, 2);
        assert_eq!(snap.loss_streak, 0);
        eq.record_trade(now, "MGC".into(), Direction::Long, -5.0, 0.0, 5.0, None);
        let snap = eq.snapshot();
        assert_eq!(snap.win_streak, 0);
        assert_eq!(snap.loss_streak, 1);
    }

    #[test]
    fn ring_buffer_is_capped() {
        let eq = EquityState::new();
        let now = Utc::now();
        for _ in 0..150 {
            eq.record_trade(now, "MGC".into(), Direction::Long, 1.0, 1.0, 0.0, None);
        }
        assert_eq!(eq.snapshot().records.len(), RING_CAPACITY);
    }
}
