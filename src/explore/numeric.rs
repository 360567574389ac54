//! Saturating byte-range arithmetic and length bucketing.
//!
//! Offsets and sizes can sit right at the top of the 64-bit range, so every
//! sum or product here clamps at `u64::MAX` instead of wrapping.

use serde::Serialize;

/// Number of length-histogram buckets.
pub const HISTOGRAM_BUCKETS: usize = 64;

/// Adds two byte counts, clamping at `u64::MAX`.
#[inline]
pub fn add_bytes(total: u64, delta: u64) -> u64 {
    total.saturating_add(delta)
}

/// Start address of bin `index`.
#[inline]
pub fn bin_offset(start: u64, index: u64, bin_size: u64) -> u64 {
    start.saturating_add(index.saturating_mul(bin_size))
}

/// Bins needed to cover `size` bytes, rounding up.
#[inline]
pub fn bin_count(size: u64, bin_size: u64) -> u64 {
    if bin_size == 0 {
        return 0;
    }
    size / bin_size + u64::from(size % bin_size != 0)
}

/// Length of the intersection of `[a_start, a_end)` and `[b_start, b_end)`.
#[inline]
pub fn overlap(a_start: u64, a_end: u64, b_start: u64, b_end: u64) -> u64 {
    a_end.min(b_end).saturating_sub(a_start.max(b_start))
}

/// Histogram bucket for an extent length: `floor(log2(length))`, with zero
/// folded into bucket 0.
#[inline]
pub fn length_bucket(length: u64) -> usize {
    if length == 0 {
        0
    } else {
        (u64::BITS - 1 - length.leading_zeros()) as usize
    }
}

/// `[min, max)` lengths covered by a bucket; the last bucket has no upper bound.
pub fn bucket_bounds(bucket: usize) -> (u64, Option<u64>) {
    let bucket = bucket.min(HISTOGRAM_BUCKETS - 1);
    let min = 1u64 << bucket;
    let max = (bucket < HISTOGRAM_BUCKETS - 1).then(|| 1u64 << (bucket + 1));
    (min, max)
}

/// Signed `alloc - free` that cannot overflow.
#[inline]
pub fn net_bytes(alloc: u64, free: u64) -> i128 {
    i128::from(alloc) - i128::from(free)
}

/// Observed transaction-group range; unknown (zero) txgs are ignored.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TxgSpan {
    #[serde(rename = "txg_min")]
    min: Option<u64>,
    #[serde(rename = "txg_max")]
    max: Option<u64>,
}

impl TxgSpan {
    /// Widens the span to include `txg` unless it is unknown.
    pub fn observe(&mut self, txg: u64) {
        if txg == 0 {
            return;
        }
        self.min = Some(self.min.map_or(txg, |cur| cur.min(txg)));
        self.max = Some(self.max.map_or(txg, |cur| cur.max(txg)));
    }

    /// Smallest observed txg.
    pub fn min(&self) -> Option<u64> {
        self.min
    }

    /// Largest observed txg.
    pub fn max(&self) -> Option<u64> {
        self.max
    }
}
