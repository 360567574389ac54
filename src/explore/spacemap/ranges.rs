//! Cursor-paged listing of individual extent records.

use std::ops::ControlFlow;

use serde::Serialize;

use super::{open, scan, RecordFilter, SpaceMapHeader};
use crate::error::Result;
use crate::explore::limits::ExploreLimits;
use crate::explore::page::{PageCollector, PageRequest};
use crate::provider::{PoolAccess, SpaceMapRecord, SpaceOp};
use crate::types::ObjectId;

/// Inputs of one range page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RangeRequest {
    /// Space-map object.
    pub object: ObjectId,
    /// Matching records to skip.
    pub cursor: Option<u64>,
    /// Page size; clamped.
    pub limit: Option<u64>,
    /// Record filter.
    pub filter: RecordFilter,
}

impl RangeRequest {
    /// First page with defaults.
    pub fn new(object: ObjectId) -> Self {
        Self {
            object,
            cursor: None,
            limit: None,
            filter: RecordFilter::default(),
        }
    }
}

/// One listed record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct RangeEntry {
    /// Ordinal among matching records.
    pub index: u64,
    /// Ordinal among all records in the log.
    pub position: u64,
    /// Operation.
    pub op: SpaceOp,
    /// Extent start.
    pub offset: u64,
    /// Extent length.
    pub length: u64,
    /// Transaction group, when known.
    pub txg: Option<u64>,
    /// Sync pass, when known.
    pub sync_pass: Option<u64>,
    /// Device id, when recorded.
    pub device_id: Option<u64>,
}

impl RangeEntry {
    fn new(index: u64, position: u64, record: &SpaceMapRecord) -> Self {
        Self {
            index,
            position,
            op: record.op,
            offset: record.offset,
            length: record.length,
            txg: (record.txg != 0).then_some(record.txg),
            sync_pass: (record.sync_pass != 0).then_some(record.sync_pass),
            device_id: record.device_id,
        }
    }
}

/// One page of records.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RangePage {
    /// Map header.
    #[serde(flatten)]
    pub header: SpaceMapHeader,
    /// Normalized filter.
    pub filter: RecordFilter,
    /// Cursor this page starts at.
    pub cursor: u64,
    /// Effective limit.
    pub limit: u64,
    /// Records on this page.
    pub count: u64,
    /// Whether more matching records follow.
    pub has_more: bool,
    /// Cursor of the next page.
    pub next: Option<u64>,
    /// Records in log order.
    pub ranges: Vec<RangeEntry>,
}

/// Lists matching records, `limit` at a time.
pub fn list_ranges(
    pool: &dyn PoolAccess,
    limits: &ExploreLimits,
    request: &RangeRequest,
) -> Result<RangePage> {
    request.filter.validate()?;
    let page = PageRequest::new(request.cursor, request.limit, limits.ranges);
    let log = open(pool, request.object)?;

    let filter = request.filter;
    let mut collector = PageCollector::new(page);
    let mut position = 0u64;
    scan(pool, &log, "ranges", &mut |record| {
        let here = position;
        position += 1;
        if !filter.matches(record) {
            return ControlFlow::Continue(());
        }
        collector.offer(|index| RangeEntry::new(index, here, record))
    })?;
    let collected = collector.finish()?;

    Ok(RangePage {
        header: SpaceMapHeader::from(&log),
        filter,
        cursor: page.cursor,
        limit: page.limit,
        count: collected.count,
        has_more: collected.next.is_some(),
        next: collected.next,
        ranges: collected.items,
    })
}
