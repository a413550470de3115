//! Latest-state resolution: one most-recent record per identity.
//!
//! The "group by key, keep the max" shape recurs across the stats endpoints
//! (latest sample per user, last sighting per device), so the reduction is
//! implemented once, generically, and specialized here for measurements.

use std::collections::HashMap;
use std::hash::Hash;

use crate::model::Measurement;

/// Reduces `items` to one element per group: the one with the maximum
/// `order` key. Ties are broken by keeping the earlier element, so callers
/// get a consistent result as long as `order` keys are distinct per group or
/// input order is stable.
pub fn max_per_group<T, K, O>(
    items: impl IntoIterator<Item = T>,
    group: impl Fn(&T) -> K,
    order: impl Fn(&T) -> O,
) -> Vec<T>
where
    K: Eq + Hash,
    O: Ord,
{
    let mut best: HashMap<K, T> = HashMap::new();
    for item in items {
        let key = group(&item);
        match best.get(&key) {
            Some(current) if order(&item) <= order(current) => {}
            _ => {
                best.insert(key, item);
            }
        }
    }
    best.into_values().collect()
}

/// Selects the most recent measurement per identity, ordered by
/// `captured_at` descending.
///
/// Ties on `captured_at` within an identity are broken by the store id, so
/// the same input always yields the same output.
pub fn latest_per_identity(records: impl IntoIterator<Item = Measurement>) -> Vec<Measurement> {
    let mut latest = max_per_group(
        records,
        |m| m.identity.clone(),
        |m| (m.captured_at, m.id),
    );
    latest.sort_by(|a, b| (b.captured_at, b.id).cmp(&(a.captured_at, a.id)));
    latest
}
