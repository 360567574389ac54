//! Paged listing of the pool's persistent data-error log.

use serde::Serialize;
use tracing::warn;

use super::limits::ExploreLimits;
use super::page::{PageCollector, PageRequest};
use crate::error::{ExplorerError, Result};
use crate::provider::{ErrorLogEntry, PoolAccess};

/// Inputs of one error-log page.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ErrorLogRequest {
    /// Entries to skip.
    pub cursor: Option<u64>,
    /// Page size; clamped.
    pub limit: Option<u64>,
}

/// One page of error-log entries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ErrorLogPage {
    /// Pool the log belongs to.
    pub pool: String,
    /// Cursor this page starts at.
    pub cursor: u64,
    /// Effective limit.
    pub limit: u64,
    /// Entries on this page.
    pub count: u64,
    /// Cursor of the next page.
    pub next: Option<u64>,
    /// Scrub-log entries first, then last-log entries.
    pub entries: Vec<ErrorLogEntry>,
}

/// Pages through the scrub and last error logs as one sequence.
pub fn list_errors(
    pool: &dyn PoolAccess,
    limits: &ExploreLimits,
    request: &ErrorLogRequest,
) -> Result<ErrorLogPage> {
    let page = PageRequest::new(request.cursor, request.limit, limits.errors);
    let mut collector = PageCollector::new(page);
    pool.iterate_error_log(&mut |entry| collector.offer(|_| entry.clone()))
        .map_err(|err| {
            warn!(pool = pool.pool_name(), error = %err, "error log scan aborted");
            ExplorerError::internal(format!("error log scan failed: {err}"))
        })?;
    let collected = collector.finish()?;

    Ok(ErrorLogPage {
        pool: pool.pool_name().to_owned(),
        cursor: page.cursor,
        limit: page.limit,
        count: collected.count,
        next: collected.next,
        entries: collected.items,
    })
}
