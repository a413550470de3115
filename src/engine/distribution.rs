//! Categorical percentage breakdowns.
//!
//! Two distinct views share this module. [`distribution`] measures "share of
//! active identities": it is fed one value per latest-state row, drops
//! sub-threshold noise and renormalizes so the kept shares sum to 100.
//! [`connectivity`] measures "share of traffic": it is fed every record in
//! the window and applies no filtering, so small categories stay visible.

use std::collections::HashMap;

/// Raw shares below this percentage are dropped before renormalization.
pub const MIN_SHARE_PERCENT: f64 = 0.5;

/// Builds a normalized percentage distribution from categorical values.
///
/// Categories whose raw share is below [`MIN_SHARE_PERCENT`] are dropped and
/// the remainder rescaled by `100 / sum(kept)`, rounded to one decimal. If
/// the filter would drop every category it is skipped entirely. After
/// rounding, the sum may land at 99.9 or 100.1; that noise is accepted, not
/// corrected (downstream consumers see the historical behavior).
pub fn distribution<'a>(values: impl IntoIterator<Item = &'a str>) -> HashMap<String, f64> {
    let counts = count_categories(values);
    let total: u64 = counts.values().sum();
    if total == 0 {
        return HashMap::new();
    }

    let raw: HashMap<&String, f64> = counts
        .iter()
        .map(|(cat, n)| (cat, (*n as f64 / total as f64) * 100.0))
        .collect();

    let mut kept: Vec<(&String, f64)> = raw
        .iter()
        .filter(|(_, pct)| **pct >= MIN_SHARE_PERCENT)
        .map(|(cat, pct)| (*cat, *pct))
        .collect();

    if kept.is_empty() {
        // Filtering would erase the whole distribution; keep everything.
        kept = raw.iter().map(|(cat, pct)| (*cat, *pct)).collect();
    }

    let kept_sum: f64 = kept.iter().map(|(_, pct)| pct).sum();
    let scale = 100.0 / kept_sum;

    kept.into_iter()
        .map(|(cat, pct)| (cat.clone(), round_one_decimal(pct * scale)))
        .collect()
}

/// Per-category share of all records, rounded to one decimal. No minimum
/// share filter and no renormalization.
pub fn connectivity<'a>(values: impl IntoIterator<Item = &'a str>) -> HashMap<String, f64> {
    let counts = count_categories(values);
    let total: u64 = counts.values().sum();
    if total == 0 {
        return HashMap::new();
    }

    counts
        .into_iter()
        .map(|(cat, n)| (cat, round_one_decimal((n as f64 / total as f64) * 100.0)))
        .collect()
}

/// Occurrence counts per category.
pub fn count_categories<'a>(values: impl IntoIterator<Item = &'a str>) -> HashMap<String, u64> {
    let mut counts = HashMap::new();
    for value in values {
        *counts.entry(value.to_string()).or_insert(0) += 1;
    }
    counts
}

pub fn round_one_decimal(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repeat(cat: &str, n: usize) -> impl Iterator<Item = &str> {
        std::iter::repeat(cat).take(n)
    }

    #[test]
    fn test_distribution_sums_to_100_within_rounding() {
        let values: Vec<&str> = repeat("LTE", 3)
            .chain(repeat("5G", 2))
            .chain(repeat("3G", 1))
            .collect();
        let dist = distribution(values.iter().copied());

        assert_eq!(dist.len(), 3);
        let sum: f64 = dist.values().sum();
        // Rounding to one decimal can leave the sum at 99.9 or 100.1.
        assert!((sum - 100.0).abs() <= 0.2, "sum was {sum}");
        assert_eq!(dist["LTE"], 50.0);
    }

    #[test]
    fn test_distribution_drops_below_threshold_and_renormalizes() {
        // 1 of 250 = 0.4% raw, below the 0.5% floor.
        let values: Vec<&str> = repeat("LTE", 249).chain(repeat("EDGE", 1)).collect();
        let dist = distribution(values.iter().copied());

        assert!(!dist.contains_key("EDGE"));
        assert_eq!(dist["LTE"], 100.0);
        assert!(dist.values().all(|pct| *pct >= MIN_SHARE_PERCENT));
    }

    #[test]
    fn test_distribution_keeps_all_when_filter_would_empty_it() {
        // 201 singleton categories, each ~0.497% raw: every one is below
        // the floor, so the filter is skipped and nothing is dropped.
        let names: Vec<String> = (0..201).map(|i| format!("cell-{i}")).collect();
        let dist = distribution(names.iter().map(String::as_str));

        assert_eq!(dist.len(), 201);
        // 0.4975% each rounds to 0.5; per-category rounding error
        // accumulates across 201 entries, so the tolerance is wider here.
        assert!(dist.values().all(|pct| *pct == 0.5));
        let sum: f64 = dist.values().sum();
        assert!((sum - 100.0).abs() <= 1.0, "sum was {sum}");
    }

    #[test]
    fn test_distribution_empty_input() {
        assert!(distribution(std::iter::empty()).is_empty());
    }

    #[test]
    fn test_distribution_single_category() {
        let dist = distribution(repeat("5G", 4));
        assert_eq!(dist.len(), 1);
        assert_eq!(dist["5G"], 100.0);
    }

    #[test]
    fn test_connectivity_keeps_small_categories() {
        let values: Vec<&str> = repeat("Alfa", 999).chain(repeat("Touch", 1)).collect();
        let conn = connectivity(values.iter().copied());

        assert_eq!(conn["Alfa"], 99.9);
        assert_eq!(conn["Touch"], 0.1);
    }

    #[test]
    fn test_connectivity_rounds_to_one_decimal() {
        let values: Vec<&str> = repeat("LTE", 1).chain(repeat("5G", 2)).collect();
        let conn = connectivity(values.iter().copied());
        assert_eq!(conn["LTE"], 33.3);
        assert_eq!(conn["5G"], 66.7);
    }

    #[test]
    fn test_connectivity_empty_input() {
        assert!(connectivity(std::iter::empty()).is_empty());
    }
}
