//! In-process numeric rollups.
//!
//! Arithmetic means of extracted numeric fields, grouped by a categorical
//! key or by identity. Records without an extractable value drop out of the
//! denominator; a group with no extractable values at all produces no entry,
//! never a zero placeholder.
//!
//! This is the in-process half of the capability strategy: when the store
//! can push the extraction down (Postgres `substring`), the orchestrator
//! asks the store instead, and both paths must agree within floating
//! rounding tolerance.

use std::collections::HashMap;

use crate::model::Measurement;

/// Numeric fields the engine rolls up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericField {
    Signal,
    Snr,
}

impl NumericField {
    /// Extracted value of this field on a loaded measurement.
    pub fn value(self, m: &Measurement) -> Option<f64> {
        match self {
            Self::Signal => m.signal,
            Self::Snr => m.snr,
        }
    }
}

/// Mean of `field` per group. Groups without any extractable value are
/// absent from the result.
pub fn mean_by_group<'a>(
    records: impl IntoIterator<Item = &'a Measurement>,
    field: NumericField,
    group: impl Fn(&Measurement) -> &str,
) -> HashMap<String, f64> {
    let mut sums: HashMap<String, (f64, u64)> = HashMap::new();
    for record in records {
        let Some(value) = field.value(record) else {
            continue;
        };
        let entry = sums.entry(group(record).to_string()).or_insert((0.0, 0));
        entry.0 += value;
        entry.1 += 1;
    }

    sums.into_iter()
        .map(|(key, (sum, count))| (key, sum / count as f64))
        .collect()
}

/// Mean of `field` over all records, or `None` when no record has an
/// extractable value.
pub fn mean_of<'a>(
    records: impl IntoIterator<Item = &'a Measurement>,
    field: NumericField,
) -> Option<f64> {
    let mut sum = 0.0;
    let mut count = 0u64;
    for record in records {
        if let Some(value) = field.value(record) {
            sum += value;
            count += 1;
        }
    }
    (count > 0).then(|| sum / count as f64)
}
