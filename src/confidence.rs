// =============================================================================
// Range Confidence Engine — scores a feature vector against a graduated table
// =============================================================================

use std::collections::HashMap;

use crate::ranges::{RangeTable, Zone};

const MIN_OVERALL_CONFIDENCE: f64 = 0.55;
const MIN_VALID_FEATURES: usize = 3;

#[derive(Debug, Clone, Copy)]
pub struct FeatureScore {
    pub confidence: f64,
    pub zone: Zone,
}

#[derive(Debug, Clone)]
pub struct ConfidenceResult {
    pub overall_confidence: f64,
    pub valid_features: usize,
    pub per_feature: HashMap<String, FeatureScore>,
    pub approved: bool,
    pub reason: String,
}

/// Scores `features` against `table` using the default approval thresholds.
pub fn score(features: &HashMap<String, f64>, table: &RangeTable) -> ConfidenceResult {
    score_with_thresholds(features, table, MIN_OVERALL_CONFIDENCE, MIN_VALID_FEATURES)
}

/// Scores `features` against `table` using configured approval thresholds.
/// Values that are non-finite or for which the table has no entry are
/// skipped rather than penalized.
pub fn score_with_thresholds(
    features: &HashMap<String, f64>,
    table: &RangeTable,
    min_overall_confidence: f64,
    min_valid_features: usize,
) -> ConfidenceResult {
    let mut per_feature = HashMap::new();
    let mut optimal = 0;
    let mut good = 0;
    let mut poor = 0;

    for (name, value) in features {
        if !value.is_finite() {
            continue;
        }
        let Some(range) = table.get(name) else {
            continue;
        };
        let zone = range.zone(*value);
        match zone {
            Zone::Optimal => optimal += 1,
            Zone::Good => good += 1,
            Zone::Poor => poor += 1,
        }
        per_feature.insert(
            name.clone(),
            FeatureScore {
                confidence: zone.score(),
                zone,
            },
        );
    }

    let valid_features = per_feature.len();
    if valid_features == 0 {
        return ConfidenceResult {
            overall_confidence: 0.0,
            valid_features: 0,
            per_feature,
            approved: false,
            reason: "no graduated features applicable".to_string(),
        };
    }

    let overall_confidence =
        per_feature.values().map(|f| f.confidence).sum::<f64>() / valid_features as f64;
    let approved = overall_confidence >= min_overall_confidence && valid_features >= min_valid_features;
    let reason = format!(
        "{optimal} optimal, {good} good, {poor} poor across {valid_features} graduated features"
    );

    ConfidenceResult {
        overall_confidence,
        valid_features,
        per_feature,
        approved,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranges::FeatureRange;
    use std::collections::HashMap as Map;

    fn table_with(name: &str, range: FeatureRange) -> RangeTable {
        let mut features = Map::new();
        features.insert(name.to_string(), range);
        RangeTable {
            features,
            vector_count: 20,
            built_at: 0,
        }
    }

    fn rsi_range() -> FeatureRange {
        FeatureRange {
            q10: 40.0,
            q25: 45.0,
            q50: 52.0,
            q75: 60.0,
            q90: 68.0,
            sample_size: 20,
            mean: 52.0,
            std_dev: 6.0,
        }
    }

    #[test]
    fn in_zone_value_scores_optimal() {
        let table = table_with("rsi_14", rsi_range());
        let mut features = Map::new();
        features.insert("rsi_14".to_string(), 52.0);
        features.insert("atr_percentage".to_string(), 0.02);
        features.insert("momentum_5".to_string(), 0.002);
        let result = score(&features, &table);
        assert_eq!(result.valid_features, 1);
        assert!(result.overall_confidence >= 0.90 - 1e-9);
    }

    #[test]
    fn moving_value_into_zone_never_decreases_confidence() {
        let table = table_with("rsi_14", rsi_range());
        let mut outside = Map::new();
        outside.insert("rsi_14".to_string(), 90.0);
        let mut inside = outside.clone();
        inside.insert("rsi_14".to_string(), 52.0);

        let outside_result = score(&outside, &table);
        let inside_result = score(&inside, &table);
        assert!(inside_result.overall_confidence >= outside_result.overall_confidence);
    }

    #[test]
    fn no_applicable_features_is_unapproved() {
        let table = table_with("rsi_14", rsi_range());
        let mut features = Map::new();
        features.insert("unrelated".to_string(), 1.0);
        let result = score(&features, &table);
        assert!(!result.approved);
        assert_eq!(result.valid_features, 0);
    }
}
