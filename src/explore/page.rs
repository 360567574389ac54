//! Cursor/limit contract shared by every list-producing view.
//!
//! A cursor is the number of matching items already consumed by earlier
//! pages. Limits are always clamped to `[1, max]` before use, and every page
//! reports how many items it returned plus either the next cursor or `None`.

use std::ops::ControlFlow;

use crate::error::{ExplorerError, Result};

/// Default and ceiling for one kind of page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageLimits {
    /// Limit used when the caller supplies none.
    pub default: u64,
    /// Largest limit ever honored.
    pub max: u64,
}

impl PageLimits {
    /// Creates limits; `max` is raised to at least 1 and `default` kept within it.
    pub const fn new(default: u64, max: u64) -> Self {
        let max = if max == 0 { 1 } else { max };
        let default = if default == 0 {
            1
        } else if default > max {
            max
        } else {
            default
        };
        Self { default, max }
    }

    /// Clamps a caller-supplied limit.
    pub fn clamp(&self, requested: Option<u64>) -> u64 {
        requested.unwrap_or(self.default).clamp(1, self.max)
    }
}

/// A resolved page request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRequest {
    /// Matching items to skip.
    pub cursor: u64,
    /// Items to return at most.
    pub limit: u64,
}

impl PageRequest {
    /// Resolves raw cursor/limit inputs against `limits`.
    pub fn new(cursor: Option<u64>, limit: Option<u64>, limits: PageLimits) -> Self {
        Self {
            cursor: cursor.unwrap_or(0),
            limit: limits.clamp(limit),
        }
    }
}

/// Collects one page of matching items out of a forward scan.
///
/// Feed it every matching item in order via [`PageCollector::offer`]; it
/// skips the first `cursor`, keeps up to `limit`, and asks the scan to stop
/// once it has seen one item past the page.
#[derive(Debug)]
pub struct PageCollector<T> {
    request: PageRequest,
    seen: u64,
    items: Vec<T>,
    has_more: bool,
    failure: Option<ExplorerError>,
}

impl<T> PageCollector<T> {
    /// Starts collecting for `request`.
    pub fn new(request: PageRequest) -> Self {
        Self {
            request,
            seen: 0,
            items: Vec::new(),
            has_more: false,
            failure: None,
        }
    }

    /// Offers the next matching item. `build` receives the item's ordinal
    /// among matching items and is only called when the item lands on the
    /// page.
    pub fn offer(&mut self, build: impl FnOnce(u64) -> T) -> ControlFlow<()> {
        if self.seen < self.request.cursor {
            self.seen += 1;
            return ControlFlow::Continue(());
        }
        if self.items.len() as u64 >= self.request.limit {
            self.has_more = true;
            return ControlFlow::Break(());
        }
        if let Err(err) = self.items.try_reserve(1) {
            self.failure = Some(err.into());
            return ControlFlow::Break(());
        }
        self.items.push(build(self.seen));
        self.seen += 1;
        ControlFlow::Continue(())
    }

    /// Finishes the page, surfacing any allocation failure.
    pub fn finish(self) -> Result<Page<T>> {
        if let Some(err) = self.failure {
            return Err(err);
        }
        let count = self.items.len() as u64;
        let next = self
            .has_more
            .then(|| self.request.cursor.saturating_add(count));
        Ok(Page {
            items: self.items,
            count,
            next,
        })
    }
}

/// One collected page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Number of items on this page.
    pub count: u64,
    /// Cursor for the following page, `None` when exhausted.
    pub next: Option<u64>,
}
