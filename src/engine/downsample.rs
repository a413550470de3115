//! Fixed-stride downsampling of time-ordered series.
//!
//! The sampler keeps every k-th element of the original order, so the
//! relative temporal spacing of a chartable series survives reduction. It is
//! deliberately not value-aware: a short spike between two kept points is
//! lost. That trade-off keeps the reduction deterministic and cheap; callers
//! that need min/max preservation must fetch a tighter window instead.

/// Reduces `items` to roughly `max_points` elements.
///
/// Series at or under the cap pass through unchanged, which also makes the
/// sampler idempotent: re-applying it with the same cap is a no-op once the
/// series fits.
pub fn downsample<T>(items: Vec<T>, max_points: usize) -> Vec<T> {
    if max_points == 0 || items.len() <= max_points {
        return items;
    }

    let stride = (items.len() / max_points).max(1);
    items
        .into_iter()
        .step_by(stride)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_series_unchanged() {
        let items: Vec<u32> = (0..10).collect();
        assert_eq!(downsample(items.clone(), 10), items);
        assert_eq!(downsample(items.clone(), 100), items);
    }

    #[test]
    fn test_stride_preserves_order_and_endpoints_spacing() {
        let items: Vec<u32> = (0..100).collect();
        let sampled = downsample(items, 10);

        // stride = 10: every 10th element, starting at the first.
        assert_eq!(sampled.first(), Some(&0));
        assert_eq!(sampled[1], 10);
        assert!(sampled.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_idempotent_once_under_cap() {
        let items: Vec<u32> = (0..1000).collect();
        let once = downsample(items, 50);
        let twice = downsample(once.clone(), 50);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_non_divisible_lengths() {
        let items: Vec<u32> = (0..7).collect();
        // stride = 7/3 = 2 -> indices 0, 2, 4, 6.
        assert_eq!(downsample(items, 3), vec![0, 2, 4, 6]);
    }

    #[test]
    fn test_zero_cap_passes_through() {
        let items: Vec<u32> = (0..5).collect();
        assert_eq!(downsample(items.clone(), 0), items);
    }
}
