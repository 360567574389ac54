//! Spatial aggregation of a space map into fixed-size bins.
//!
//! Pagination runs over bin indexes, not records. A record that spans
//! several bins contributes only its overlap to each one.

use std::ops::ControlFlow;

use serde::Serialize;

use super::{open, scan, RecordFilter, SpaceMapHeader};
use crate::error::Result;
use crate::explore::limits::ExploreLimits;
use crate::explore::numeric::{add_bytes, bin_count, bin_offset, overlap, TxgSpan};
use crate::explore::page::PageRequest;
use crate::provider::{PoolAccess, SpaceMapRecord, SpaceOp};
use crate::types::ObjectId;

/// Inputs of one bin page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BinRequest {
    /// Space-map object.
    pub object: ObjectId,
    /// Bin size in bytes; clamped.
    pub bin_size: Option<u64>,
    /// First bin index.
    pub cursor: Option<u64>,
    /// Bins per page; clamped.
    pub limit: Option<u64>,
    /// Record filter.
    pub filter: RecordFilter,
}

impl BinRequest {
    /// First page with defaults.
    pub fn new(object: ObjectId) -> Self {
        Self {
            object,
            bin_size: None,
            cursor: None,
            limit: None,
            filter: RecordFilter::default(),
        }
    }
}

/// Totals for one bin.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Bin {
    /// Bin index from the map start.
    pub index: u64,
    /// Absolute start address.
    pub offset: u64,
    /// Bytes covered; the last bin of a map may be short.
    pub length: u64,
    /// Overlapping allocated bytes.
    pub alloc_bytes: u64,
    /// Overlapping freed bytes.
    pub free_bytes: u64,
    /// Allocation records touching the bin.
    pub alloc_ops: u64,
    /// Free records touching the bin.
    pub free_ops: u64,
    /// Largest single overlap.
    pub max_overlap: u64,
    /// Observed txg range.
    #[serde(flatten)]
    pub txg: TxgSpan,
}

impl Bin {
    fn end(&self) -> u64 {
        self.offset.saturating_add(self.length)
    }

    fn is_empty(&self) -> bool {
        self.alloc_ops == 0 && self.free_ops == 0
    }

    fn absorb(&mut self, record: &SpaceMapRecord, covered: u64) {
        match record.op {
            SpaceOp::Alloc => {
                self.alloc_bytes = add_bytes(self.alloc_bytes, covered);
                self.alloc_ops += 1;
            }
            SpaceOp::Free => {
                self.free_bytes = add_bytes(self.free_bytes, covered);
                self.free_ops += 1;
            }
        }
        self.max_overlap = self.max_overlap.max(covered);
        self.txg.observe(record.txg);
    }
}

/// One page of bins.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BinPage {
    /// Map header.
    #[serde(flatten)]
    pub header: SpaceMapHeader,
    /// Normalized filter.
    pub filter: RecordFilter,
    /// Effective bin size.
    pub bin_size: u64,
    /// First bin index on this page.
    pub cursor: u64,
    /// Effective limit.
    pub limit: u64,
    /// Bins the whole map spans, when its size is known.
    pub total_bins: Option<u64>,
    /// Bins on this page.
    pub count: u64,
    /// Whether bins past this page may hold data.
    pub has_more: bool,
    /// First bin index of the next page.
    pub next: Option<u64>,
    /// Bins in index order.
    pub bins: Vec<Bin>,
}

/// Aggregates one window of bins.
pub fn list_bins(
    pool: &dyn PoolAccess,
    limits: &ExploreLimits,
    request: &BinRequest,
) -> Result<BinPage> {
    request.filter.validate()?;
    let bin_size = limits.bin_size(request.bin_size);
    let page = PageRequest::new(request.cursor, request.limit, limits.bins);
    let log = open(pool, request.object)?;

    let total_bins = log.size.map(|size| bin_count(size, bin_size));
    let window_bins = match total_bins {
        Some(total) => total.saturating_sub(page.cursor).min(page.limit),
        None => page.limit,
    };
    let map_end = log.end().unwrap_or(u64::MAX);

    let mut bins: Vec<Bin> = Vec::new();
    bins.try_reserve(window_bins as usize)?;
    for slot in 0..window_bins {
        let index = page.cursor.saturating_add(slot);
        let offset = bin_offset(log.start, index, bin_size);
        let end = offset.saturating_add(bin_size).min(map_end);
        bins.push(Bin {
            index,
            offset,
            length: end.saturating_sub(offset),
            ..Bin::default()
        });
    }

    let window_start = bins.first().map_or(0, |bin| bin.offset);
    let window_end = bins.last().map_or(0, Bin::end);
    let filter = request.filter;
    let mut touched_beyond = false;

    if window_end > window_start {
        let bounded = total_bins.is_some();
        scan(pool, &log, "bins", &mut |record| {
            let matches = filter.matches(record);
            // Records arrive in ascending offset order.
            if record.offset >= window_end {
                if matches {
                    touched_beyond = true;
                    return ControlFlow::Break(());
                }
                return if bounded {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                };
            }
            if !matches {
                return ControlFlow::Continue(());
            }
            let record_end = record.end();
            if record_end <= window_start {
                return ControlFlow::Continue(());
            }
            if record_end > window_end {
                touched_beyond = true;
            }
            let first = (record.offset.max(window_start) - window_start) / bin_size;
            for bin in bins.iter_mut().skip(first as usize) {
                if bin.offset >= record_end {
                    break;
                }
                let covered = overlap(record.offset, record_end, bin.offset, bin.end());
                if covered > 0 {
                    bin.absorb(record, covered);
                }
            }
            ControlFlow::Continue(())
        })?;
    }

    let (has_more, next) = match total_bins {
        Some(total) => {
            let after = page.cursor.saturating_add(window_bins);
            let more = after < total;
            (more, more.then_some(after))
        }
        None => {
            if !touched_beyond {
                while bins.last().is_some_and(Bin::is_empty) {
                    bins.pop();
                }
            }
            let after = page.cursor.saturating_add(bins.len() as u64);
            (touched_beyond, touched_beyond.then_some(after))
        }
    };

    Ok(BinPage {
        header: SpaceMapHeader::from(&log),
        filter,
        bin_size,
        cursor: page.cursor,
        limit: page.limit,
        total_bins,
        count: bins.len() as u64,
        has_more,
        next,
        bins,
    })
}
