// =============================================================================
// RecPullback Calculator — soft-floor trailing-exit parameters
// =============================================================================
//
// A handful of const-documented derived scalars handed to the execution
// platform for a soft-floor trailing exit, not a live order-flow state
// machine.
// =============================================================================

const THRESHOLD_DROP_PERCENT: f64 = 15.0;

#[derive(Debug, Clone, Copy)]
pub struct RecPullback {
    pub soft_floor: f64,
    pub step_size: f64,
    pub max_profit_estimate: f64,
    pub threshold_drop_percent: f64,
}

/// `profitable_pnl_per_contract` and `positive_max_profits` come from the
/// matched historical profitable vectors for the key; `fallback_tp` is C5's
/// suggested take-profit, used when there is no profitable history yet.
pub fn compute(
    profitable_pnl_per_contract: &[f64],
    positive_max_profits: &[f64],
    fallback_tp: f64,
) -> RecPullback {
    let avg_profit = if profitable_pnl_per_contract.is_empty() {
        fallback_tp
    } else {
        profitable_pnl_per_contract.iter().sum::<f64>() / profitable_pnl_per_contract.len() as f64
    };

    let avg_max_profit = if positive_max_profits.is_empty() {
        1.5 * avg_profit
    } else {
        positive_max_profits.iter().sum::<f64>() / positive_max_profits.len() as f64
    };

    RecPullback {
        soft_floor: (0.4 * avg_profit).round().max(10.0),
        step_size: (0.25 * avg_profit).round().max(5.0),
        max_profit_estimate: avg_max_profit.round(),
        threshold_drop_percent: THRESHOLD_DROP_PERCENT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_suggested_tp_when_no_history() {
        let result = compute(&[], &[], 50.0);
        assert_eq!(result.step_size, (0.25 * 50.0_f64).round().max(5.0));
        assert_eq!(result.threshold_drop_percent, 15.0);
    }

    #[test]
    fn floors_are_respected() {
        let result = compute(&[1.0, 1.0], &[1.0], 1.0);
        assert!(result.soft_floor >= 10.0);
        assert!(result.step_size >= 5.0);
    }
}
