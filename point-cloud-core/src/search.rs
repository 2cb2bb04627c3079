//! Floor lookup over monotonic keys, shared by every time-addressed collection.

/// Returns the index of the last entry whose key is at or below `target`.
///
/// `key_at` must be non-decreasing over `0..len`. Targets before the first key
/// resolve to 0 and targets past the last key resolve to `len - 1`. Returns
/// `None` only when `len` is zero or a key is unavailable.
pub fn floor_index<F>(len: usize, target: f64, key_at: F) -> Option<usize>
where
    F: Fn(usize) -> Option<f64>,
{
    if len == 0 {
        return None;
    }

    // First index whose key is strictly greater than the target.
    let mut low = 0usize;
    let mut high = len;
    while low < high {
        let mid = low + (high - low) / 2;
        if key_at(mid)? <= target {
            low = mid + 1;
        } else {
            high = mid;
        }
    }

    Some(low.saturating_sub(1))
}

/// Floor lookup over a slice of sorted timestamps.
pub fn floor_in_slice(times: &[f64], target: f64) -> Option<usize> {
    floor_index(times.len(), target, |ix| times.get(ix).copied())
}
