// =============================================================================
// Fluid Risk Model — four weighted probability components, SL/TP, bias check
// =============================================================================
//
// The combination structure (weighted sub-scores feeding a clipped overall
// score, which then drives a mode/decision) follows `risk.rs`'s
// `compute_risk_mode`; the Gaussian-membership regime scoring borrows the
// "classify from cached historical stats" idiom in `regime/detector.rs`
// without reusing its live-candle algorithm, which this engine has no
// access to.
// =============================================================================

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::equity::EquitySnapshot;
use crate::types::{DecisionMethod, Direction};
use crate::vector::Vector;

const WEIGHT_EQUITY: f64 = 0.30;
const WEIGHT_REGIME: f64 = 0.25;
const WEIGHT_LOSS_AVOID: f64 = 0.25;
const WEIGHT_PROFIT_SIM: f64 = 0.20;

const REGIME_INDICATORS: [&str; 5] = [
    "atr_percentage",
    "atr_14",
    "volatility_ratio",
    "rsi_14",
    "volume_ratio",
];

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn mean_std(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

/// Equity-curve protection score.
pub fn equity_score(snapshot: &EquitySnapshot) -> f64 {
    let mut e = 0.6;
    e += 0.3 * sigmoid(0.5 * (snapshot.win_streak as f64 - 2.0));
    e -= 0.4 * (1.0 - (-0.3 * snapshot.loss_streak as f64).exp());
    e -= 0.2 * (1.0 - (-snapshot.current_drawdown / 100.0).exp());
    e.clamp(0.0, 1.0)
}

fn equity_score_with_efficiency(snapshot: &EquitySnapshot, recent_efficiency_mean: Option<f64>) -> f64 {
    let mut e = equity_score(snapshot);
    if let Some(mean_eff) = recent_efficiency_mean {
        if mean_eff < 0.5 {
            e -= 0.15 * (0.5 - mean_eff);
        }
    }
    e.clamp(0.0, 1.0)
}

/// Market-regime fit score via Gaussian membership over
/// profitable-only feature statistics. Returns the neutral default 0.65
/// when there isn't enough history or none of the regime indicators are
/// present in the query.
pub fn regime_score(query_features: &HashMap<String, f64>, profitable: &[&Vector]) -> f64 {
    if profitable.len() < 10 {
        return 0.65;
    }

    let mut memberships = Vec::new();
    for indicator in REGIME_INDICATORS {
        let Some(&query_value) = query_features.get(indicator) else {
            continue;
        };
        if !query_value.is_finite() {
            continue;
        }
        let values: Vec<f64> = profitable
            .iter()
            .filter_map(|v| v.features.get(indicator).copied())
            .filter(|v| v.is_finite())
            .collect();
        if values.len() < 5 {
            continue;
        }
        let (mean, std) = mean_std(&values);
        if std <= 0.0 {
            memberships.push(if (query_value - mean).abs() < 1e-9 { 1.0 } else { 0.0 });
            continue;
        }
        let z = (query_value - mean) / std;
        memberships.push((-0.5 * z * z).exp());
    }

    if memberships.is_empty() {
        0.65
    } else {
        memberships.iter().sum::<f64>() / memberships.len() as f64
    }
}

fn normalized_distance(query: &HashMap<String, f64>, other: &HashMap<String, f64>) -> Option<f64> {
    let mut sum_sq = 0.0;
    let mut n = 0usize;
    for (name, qv) in query {
        if let Some(ov) = other.get(name) {
            if qv.is_finite() && ov.is_finite() {
                sum_sq += (qv - ov).powi(2);
                n += 1;
            }
        }
    }
    if n == 0 {
        None
    } else {
        Some((sum_sq / n as f64).sqrt())
    }
}

/// Loss-avoidance score from nearest unprofitable neighbours.
pub fn loss_avoid_score(query_features: &HashMap<String, f64>, unprofitable: &[&Vector]) -> f64 {
    if unprofitable.len() < 5 {
        return 0.8;
    }
    let mut distances: Vec<(f64, f64)> = unprofitable
        .iter()
        .filter_map(|v| {
            let d = normalized_distance(query_features, &v.features)?;
            let pnl = v.pnl_per_contract().unwrap_or(0.0);
            Some((d, pnl))
        })
        .collect();
    distances.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
    let k = (unprofitable.len() as f64 * 0.3).floor().min(10.0).max(1.0) as usize;
    let neighbours = &distances[..k.min(distances.len())];

    let mut weight_sum = 0.0;
    let mut weighted_risk = 0.0;
    for (d, pnl) in neighbours {
        let w = (-d).exp();
        let m = (pnl.abs() / 50.0).min(1.0);
        weight_sum += w;
        weighted_risk += w * m;
    }
    let risk = if weight_sum > 0.0 {
        weighted_risk / weight_sum
    } else {
        0.0
    };
    (1.0 - risk).max(0.2)
}

/// Profit-similarity score from nearest profitable neighbours.
pub fn profit_sim_score(query_features: &HashMap<String, f64>, profitable: &[&Vector]) -> f64 {
    if profitable.len() < 5 {
        return 0.6;
    }
    let mut distances: Vec<(f64, f64)> = profitable
        .iter()
        .filter_map(|v| {
            let d = normalized_distance(query_features, &v.features)?;
            let pnl = v.pnl_per_contract().unwrap_or(0.0);
            Some((d, pnl))
        })
        .collect();
    distances.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
    let k = (profitable.len() as f64 * 0.4).floor().min(15.0).max(1.0) as usize;
    let neighbours = &distances[..k.min(distances.len())];

    let mut weight_sum = 0.0;
    let mut weighted_sim = 0.0;
    for (d, pnl) in neighbours {
        let w = (-2.0 * d).exp();
        let m = (pnl.abs() / 50.0).min(1.0);
        weight_sum += w;
        weighted_sim += w * m;
    }
    let similarity = if weight_sum > 0.0 {
        weighted_sim / weight_sum
    } else {
        0.0
    };
    (2.0 * similarity).min(1.0)
}

#[derive(Debug, Clone)]
pub struct ComponentScores {
    pub equity: f64,
    pub regime: f64,
    pub loss_avoid: f64,
    pub profit_sim: f64,
}

#[derive(Debug, Clone)]
pub struct FluidRiskResult {
    pub approved: bool,
    pub confidence: f64,
    pub suggested_sl: f64,
    pub suggested_tp: f64,
    pub method: DecisionMethod,
    pub reasons: Vec<String>,
    pub components: ComponentScores,
}

/// Combines the four components and derives dollar-denominated SL/TP.
pub fn combine(components: ComponentScores) -> (f64, f64, f64) {
    let confidence = (WEIGHT_EQUITY * components.equity
        + WEIGHT_REGIME * components.regime
        + WEIGHT_LOSS_AVOID * components.loss_avoid
        + WEIGHT_PROFIT_SIM * components.profit_sim)
        .clamp(0.1, 1.0);

    let c = sigmoid(10.0 * (confidence - 0.6));
    let conf_mult = 1.0 + 0.5 * c;
    let equity_mult = 1.0 + 0.3 * (2.0 * (components.equity - 0.7)).exp();

    let sl = (25.0 / conf_mult).round().clamp(15.0, 40.0);
    let tp = (50.0 * conf_mult * equity_mult).round().clamp(30.0, 100.0);

    (confidence, sl, tp)
}

/// Seedable RNG shared across the bias-rejection draws, guarded by a mutex
/// since a single engine-wide draw stream is what makes the observed
/// rejection rate reproducible under a pinned seed.
pub struct BiasRng {
    inner: Mutex<ChaCha8Rng>,
}

impl BiasRng {
    pub fn from_seed(seed: u64) -> Self {
        Self {
            inner: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            inner: Mutex::new(ChaCha8Rng::seed_from_u64(rand::thread_rng().gen())),
        }
    }

    fn draw(&self) -> f64 {
        self.inner.lock().gen::<f64>()
    }
}

/// Directional-bias probabilistic rejection. `side_score` and
/// `opposite_score` are `EquityState::side_score` outputs for the
/// requested side and its opposite over the trailing 7-day window.
///
/// NOTE: the ratio compares `winRate * avgWin * tradeCount` across
/// directions even when the two sides carry very different sample sizes;
/// this statistical quirk is intentionally preserved rather than
/// normalized away.
pub fn bias_rejection(rng: &BiasRng, side_score: f64, opposite_score: f64) -> Option<f64> {
    if side_score <= 0.0 || opposite_score < 1.5 * side_score {
        return None;
    }
    let ratio = opposite_score / side_score;
    let bias_strength = (0.2 * (ratio - 1.0)).min(0.4);
    let p = (2.0 * bias_strength).min(0.35);
    if rng.draw() < p {
        Some(p)
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FluidRiskInputs<'a> {
    pub query_features: &'a HashMap<String, f64>,
    pub direction: Direction,
    pub instrument: &'a str,
    pub now: DateTime<Utc>,
}

/// Runs the full C5 pipeline: component scoring, combination, and the bias
/// check, given the vectors already partitioned by profitability.
pub fn evaluate(
    inputs: FluidRiskInputs,
    equity_snapshot: &EquitySnapshot,
    recent_efficiency_mean: Option<f64>,
    profitable: &[&Vector],
    unprofitable: &[&Vector],
    bias_rng: &BiasRng,
    opposite_side_score: f64,
    this_side_score: f64,
) -> FluidRiskResult {
    let components = ComponentScores {
        equity: equity_score_with_efficiency(equity_snapshot, recent_efficiency_mean),
        regime: regime_score(inputs.query_features, profitable),
        loss_avoid: loss_avoid_score(inputs.query_features, unprofitable),
        profit_sim: profit_sim_score(inputs.query_features, profitable),
    };

    let (confidence, sl, tp) = combine(components.clone());
    let approved = confidence >= 0.50;

    if let Some(_p) = bias_rejection(bias_rng, this_side_score, opposite_side_score) {
        return FluidRiskResult {
            approved: false,
            confidence: 0.3,
            suggested_sl: 25.0,
            suggested_tp: 35.0,
            method: DecisionMethod::DirectionalBiasRejection,
            reasons: vec!["directional bias rejection".to_string()],
            components,
        };
    }

    let mut reasons = Vec::new();
    reasons.push(format!(
        "equity={:.2} regime={:.2} loss_avoid={:.2} profit_sim={:.2}",
        components.equity, components.regime, components.loss_avoid, components.profit_sim
    ));

    FluidRiskResult {
        approved,
        confidence,
        suggested_sl: sl,
        suggested_tp: tp,
        method: DecisionMethod::FluidRiskModel,
        reasons,
        components,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equity_clamped_to_unit_interval() {
        let mut snapshot = EquitySnapshot::default();
        snapshot.loss_streak = 50;
        snapshot.current_drawdown = 200.0;
        assert!(equity_score(&snapshot) >= 0.0);

        snapshot.loss_streak = 0;
        snapshot.win_streak = 50;
        snapshot.current_drawdown = 0.0;
        assert!(equity_score(&snapshot) <= 1.0);
    }

    #[test]
    fn regime_default_is_neutral_with_no_history() {
        let features = HashMap::new();
        assert_eq!(regime_score(&features, &[]), 0.65);
    }

    #[test]
    fn bias_rejection_rate_within_band_over_many_draws() {
        let rng = BiasRng::from_seed(42);
        let mut rejections = 0;
        let trials = 20_000;
        for _ in 0..trials {
            if bias_rejection(&rng, 40.0, 100.0).is_some() {
                rejections += 1;
            }
        }
        let rate = rejections as f64 / trials as f64;
        // ratio = 2.5 -> bias_strength = min(0.4, 0.2*1.5) = 0.3 -> p = min(0.35, 0.6) = 0.35
        assert!((rate - 0.35).abs() < 0.02, "rate was {rate}");
    }

    #[test]
    fn no_bias_rejection_when_sides_are_comparable() {
        let rng = BiasRng::from_seed(1);
        for _ in 0..1000 {
            assert!(bias_rejection(&rng, 50.0, 55.0).is_none());
        }
    }
}
