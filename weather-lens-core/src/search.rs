//! Tolerance-bounded lookup over a time-sorted slice.

use chrono::NaiveDateTime;

use crate::model::Timestamped;

/// Three hours.
pub const DEFAULT_TOLERANCE_SECS: i64 = 3 * 60 * 60;

/// Bisect `sorted` for an entry at most `tolerance_secs` away from `target`.
///
/// Returns the index of the first midpoint that lands inside the window,
/// which is not necessarily the entry closest to `target`. `sorted` must be
/// ascending by timestamp; use [`crate::Timeline`] to get that guarantee.
pub fn find_within_tolerance<T>(
    sorted: &[Timestamped<T>],
    target: NaiveDateTime,
    tolerance_secs: i64,
) -> Option<usize> {
    // Remaining range is [lo, hi). The midpoint is taken over the closed
    // range [lo, hi - 1], i.e. the lower middle for even lengths.
    let mut lo = 0;
    let mut hi = sorted.len();

    while lo < hi {
        let mid = lo + (hi - 1 - lo) / 2;
        let at = sorted[mid].at;
        let diff = (at - target).num_seconds().abs();

        if diff <= tolerance_secs {
            return Some(mid);
        }

        if at < target {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }

    None
}
