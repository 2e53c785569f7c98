//! Reducers used to merge provider readings.

use std::collections::HashMap;

use crate::model::AggregatedStat;

/// Average, min and max over `values`. Empty input yields the zero stat.
pub fn aggregate_numeric(values: Vec<f64>) -> AggregatedStat {
    if values.is_empty() {
        return AggregatedStat::default();
    }

    let sum: f64 = values.iter().sum();
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    // Rounding in the sum can push the mean of equal values just past them.
    let average = (sum / values.len() as f64).clamp(min, max);

    AggregatedStat {
        average,
        min,
        max,
        values,
    }
}

/// Value with the highest occurrence count, or `""` for empty input.
///
/// Ties are resolved by hash-map iteration order, so which of several equally
/// frequent values wins is unspecified.
pub fn most_frequent(values: &[String]) -> String {
    let mut freq: HashMap<&str, usize> = HashMap::new();
    for v in values {
        *freq.entry(v.as_str()).or_default() += 1;
    }

    let mut best = ("", 0usize);
    for (value, count) in freq {
        if count > best.1 {
            best = (value, count);
        }
    }

    best.0.to_string()
}
