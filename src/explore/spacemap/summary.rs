//! Whole-map accounting: totals, net bytes, txg span and length histogram.

use std::ops::ControlFlow;

use serde::Serialize;

use super::{open, scan, SpaceMapHeader};
use crate::error::Result;
use crate::explore::numeric::{
    add_bytes, bucket_bounds, length_bucket, net_bytes, TxgSpan, HISTOGRAM_BUCKETS,
};
use crate::provider::{PoolAccess, SpaceOp};
use crate::types::ObjectId;

/// One non-empty length-histogram bucket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct HistogramBucket {
    /// Bucket index, `floor(log2(length))`.
    pub bucket: u32,
    /// Smallest length in the bucket.
    pub min_length: u64,
    /// Exclusive upper length bound; `None` for the overflow bucket.
    pub max_length: Option<u64>,
    /// Allocations in the bucket.
    pub alloc_count: u64,
    /// Frees in the bucket.
    pub free_count: u64,
}

/// Whole-map accounting.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SpaceMapSummary {
    /// Map header.
    #[serde(flatten)]
    pub header: SpaceMapHeader,
    /// Records seen.
    pub range_entries: u64,
    /// Allocation records.
    pub alloc_entries: u64,
    /// Free records.
    pub free_entries: u64,
    /// Bytes allocated, saturating.
    pub alloc_bytes: u64,
    /// Bytes freed, saturating.
    pub free_bytes: u64,
    /// `alloc_bytes - free_bytes`.
    pub net_bytes: i128,
    /// Observed txg range.
    #[serde(flatten)]
    pub txg: TxgSpan,
    /// Non-empty buckets in ascending order.
    pub histogram: Vec<HistogramBucket>,
}

struct Tally {
    entries: u64,
    alloc_entries: u64,
    free_entries: u64,
    alloc_bytes: u64,
    free_bytes: u64,
    txg: TxgSpan,
    alloc_hist: [u64; HISTOGRAM_BUCKETS],
    free_hist: [u64; HISTOGRAM_BUCKETS],
}

impl Default for Tally {
    fn default() -> Self {
        Self {
            entries: 0,
            alloc_entries: 0,
            free_entries: 0,
            alloc_bytes: 0,
            free_bytes: 0,
            txg: TxgSpan::default(),
            alloc_hist: [0; HISTOGRAM_BUCKETS],
            free_hist: [0; HISTOGRAM_BUCKETS],
        }
    }
}

/// Single full pass over every record of the map.
pub fn summarize(pool: &dyn PoolAccess, object: ObjectId) -> Result<SpaceMapSummary> {
    let log = open(pool, object)?;
    let mut tally = Tally::default();
    scan(pool, &log, "summary", &mut |record| {
        let bucket = length_bucket(record.length);
        tally.entries += 1;
        match record.op {
            SpaceOp::Alloc => {
                tally.alloc_entries += 1;
                tally.alloc_bytes = add_bytes(tally.alloc_bytes, record.length);
                tally.alloc_hist[bucket] += 1;
            }
            SpaceOp::Free => {
                tally.free_entries += 1;
                tally.free_bytes = add_bytes(tally.free_bytes, record.length);
                tally.free_hist[bucket] += 1;
            }
        }
        tally.txg.observe(record.txg);
        ControlFlow::Continue(())
    })?;

    let mut histogram = Vec::new();
    for bucket in 0..HISTOGRAM_BUCKETS {
        let (alloc_count, free_count) = (tally.alloc_hist[bucket], tally.free_hist[bucket]);
        if alloc_count == 0 && free_count == 0 {
            continue;
        }
        let (min_length, max_length) = bucket_bounds(bucket);
        histogram.try_reserve(1)?;
        histogram.push(HistogramBucket {
            bucket: bucket as u32,
            min_length,
            max_length,
            alloc_count,
            free_count,
        });
    }

    Ok(SpaceMapSummary {
        header: SpaceMapHeader::from(&log),
        range_entries: tally.entries,
        alloc_entries: tally.alloc_entries,
        free_entries: tally.free_entries,
        alloc_bytes: tally.alloc_bytes,
        free_bytes: tally.free_bytes,
        net_bytes: net_bytes(tally.alloc_bytes, tally.free_bytes),
        txg: tally.txg,
        histogram,
    })
}
