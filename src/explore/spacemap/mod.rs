//! Space-map aggregator: summary, range and bin views over one extent log.
//!
//! Every view validates the object before touching its records and aborts
//! the whole call on any mid-scan provider failure. A partial accounting
//! total is never returned.

use std::ops::ControlFlow;

use serde::Serialize;
use tracing::warn;

use crate::error::{ExplorerError, Result};
use crate::provider::{
    ExtentLog, PoolAccess, ProviderError, SpaceMapRecord, SPACE_MAP_HEADER_MIN, SPACE_MAP_TYPE,
};
use crate::types::{object_type_name, Namespace, ObjectId};

pub mod bins;
pub mod filter;
pub mod ranges;
pub mod summary;

pub use bins::{Bin, BinPage, BinRequest};
pub use filter::{OpFilter, RecordFilter};
pub use ranges::{RangeEntry, RangePage, RangeRequest};
pub use summary::{HistogramBucket, SpaceMapSummary};

/// Header fields echoed by every space-map view.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct SpaceMapHeader {
    /// Object id of the map.
    pub object_id: ObjectId,
    /// First covered address.
    pub start: u64,
    /// Covered size, `None` when not statically known.
    pub size: Option<u64>,
    /// Allocation unit shift.
    pub shift: u8,
    /// Log length in bytes.
    pub length: u64,
    /// Header allocated counter.
    pub allocated: i64,
}

impl From<&ExtentLog> for SpaceMapHeader {
    fn from(log: &ExtentLog) -> Self {
        Self {
            object_id: log.object,
            start: log.start,
            size: log.size,
            shift: log.shift,
            length: log.length,
            allocated: log.allocated,
        }
    }
}

/// Checks that `object` is a space map and opens its log.
pub(crate) fn open(pool: &dyn PoolAccess, object: ObjectId) -> Result<ExtentLog> {
    let info = pool
        .object_info(Namespace::Meta, object)
        .map_err(ProviderError::into_lookup_error)?;
    if info.type_tag != SPACE_MAP_TYPE {
        return Err(ExplorerError::unsupported(format!(
            "object {object} is a {} (type {}), not a space map",
            object_type_name(info.type_tag),
            info.type_tag
        )));
    }
    if info.header_len < SPACE_MAP_HEADER_MIN {
        return Err(ExplorerError::unsupported(format!(
            "object {object} carries a {}-byte header; space maps need at least {SPACE_MAP_HEADER_MIN}",
            info.header_len
        )));
    }
    pool.open_extent_log(object)
        .map_err(ProviderError::into_lookup_error)
}

/// Visits every record of `log`, turning any provider failure into an
/// `Internal` error that aborts the view.
pub(crate) fn scan(
    pool: &dyn PoolAccess,
    log: &ExtentLog,
    view: &'static str,
    visitor: &mut dyn FnMut(&SpaceMapRecord) -> ControlFlow<()>,
) -> Result<()> {
    pool.iterate_log(log, visitor).map_err(|err| {
        warn!(object = %log.object, view, error = %err, "space map scan aborted");
        ExplorerError::internal(format!(
            "space map {} {view} scan failed: {err}",
            log.object
        ))
    })
}
