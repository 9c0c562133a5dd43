//! Injection ordering
//!
//! Higher weight injects earlier within one (type, scope, timing) bucket.
//! The sort is stable, so equal-weight entries keep the bucket's iteration
//! order, which for catalog buckets is lexicographic by filename.

use std::cmp::Ordering;

/// Stable sort of bucket entries, descending by weight. Pure; used for both
/// css and js buckets.
pub fn sort_by_weight<'a, T, F>(
    entries: impl IntoIterator<Item = (&'a String, &'a T)>,
    weight: F,
) -> Vec<(&'a String, &'a T)>
where
    T: 'a,
    F: Fn(&T) -> f64,
{
    let mut sorted: Vec<(&String, &T)> = entries.into_iter().collect();
    sorted.sort_by(|a, b| {
        weight(b.1)
            .partial_cmp(&weight(a.1))
            .unwrap_or(Ordering::Equal)
    });
    sorted
}
