//! One serialized handle per open pool.
//!
//! Provider read primitives are not safe for concurrent use against one
//! handle, so every core call takes the session mutex and runs to
//! completion before the next one starts.

use std::path::Path;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug_span;

use crate::error::Result;
use crate::explore::limits::MIN_BIN_SIZE;
use crate::explore::{
    BinPage, BinRequest, BlockTree, ErrorLogPage, ErrorLogRequest, ExploreLimits, Explorer, ObjectDescription, ObjectListRequest,
    ObjectPage, RangePage, RangeRequest, SpaceMapSummary, TreeRequest,
};
use crate::provider::{ImageError, PoolAccess, PoolImage};
use crate::types::{Namespace, ObjectId};

/// Pool name plus the caps requests are clamped to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PoolInfo {
    /// Pool name.
    pub name: String,
    /// Deepest block-tree expansion.
    pub tree_depth_max: u64,
    /// Largest block-tree node budget.
    pub tree_nodes_max: u64,
    /// Largest range page.
    pub ranges_limit_max: u64,
    /// Largest bin page.
    pub bins_limit_max: u64,
    /// Smallest bin size.
    pub bin_size_min: u64,
    /// Largest bin size.
    pub bin_size_max: u64,
    /// Largest object page.
    pub objects_limit_max: u64,
    /// Largest error-log page.
    pub errors_limit_max: u64,
}

/// An open pool whose provider calls are serialized.
pub struct PoolSession {
    name: String,
    pool: Mutex<Box<dyn PoolAccess>>,
    limits: ExploreLimits,
}

impl PoolSession {
    /// Wraps a provider with default limits.
    pub fn new(pool: impl PoolAccess + 'static) -> Self {
        Self {
            name: pool.pool_name().to_owned(),
            pool: Mutex::new(Box::new(pool)),
            limits: ExploreLimits::default(),
        }
    }

    /// Replaces the limits.
    pub fn with_limits(mut self, limits: ExploreLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Loads a JSON pool image from disk.
    pub fn open_image(path: impl AsRef<Path>) -> std::result::Result<Self, ImageError> {
        let pool = PoolImage::from_path(path)?.into_pool()?;
        Ok(Self::new(pool))
    }

    /// Pool name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Limits in force.
    pub fn limits(&self) -> &ExploreLimits {
        &self.limits
    }

    /// Name and caps.
    pub fn info(&self) -> PoolInfo {
        PoolInfo {
            name: self.name.clone(),
            tree_depth_max: self.limits.tree_depth_max,
            tree_nodes_max: self.limits.tree_nodes.max,
            ranges_limit_max: self.limits.ranges.max,
            bins_limit_max: self.limits.bins.max,
            bin_size_min: MIN_BIN_SIZE,
            bin_size_max: self.limits.bin_size_max.max(MIN_BIN_SIZE),
            objects_limit_max: self.limits.objects.max,
            errors_limit_max: self.limits.errors.max,
        }
    }

    /// Runs `op` while holding the handle.
    pub fn with_explorer<T>(
        &self,
        op: &'static str,
        run: impl FnOnce(Explorer<'_>) -> Result<T>,
    ) -> Result<T> {
        let _span = debug_span!("pool_call", pool = %self.name, op).entered();
        let guard = self.pool.lock();
        run(Explorer::new(guard.as_ref(), &self.limits))
    }

    /// Materializes a block tree.
    pub fn block_tree(&self, request: &TreeRequest) -> Result<BlockTree> {
        self.with_explorer("block_tree", |explorer| explorer.materialize(request))
    }

    /// Summarizes a space map.
    pub fn spacemap_summary(&self, object: ObjectId) -> Result<SpaceMapSummary> {
        self.with_explorer("spacemap_summary", |explorer| explorer.summary(object))
    }

    /// Lists space-map records.
    pub fn spacemap_ranges(&self, request: &RangeRequest) -> Result<RangePage> {
        self.with_explorer("spacemap_ranges", |explorer| explorer.ranges(request))
    }

    /// Aggregates space-map bins.
    pub fn spacemap_bins(&self, request: &BinRequest) -> Result<BinPage> {
        self.with_explorer("spacemap_bins", |explorer| explorer.bins(request))
    }

    /// Lists objects.
    pub fn objects(&self, request: &ObjectListRequest) -> Result<ObjectPage> {
        self.with_explorer("objects", |explorer| explorer.list_objects(request))
    }

    /// Lists persistent error-log entries.
    pub fn errors(&self, request: &ErrorLogRequest) -> Result<ErrorLogPage> {
        self.with_explorer("errors", |explorer| explorer.errors(request))
    }

    /// Describes one object.
    pub fn describe(&self, namespace: Namespace, object: ObjectId) -> Result<ObjectDescription> {
        self.with_explorer("describe", |explorer| explorer.describe(namespace, object))
    }
}

impl std::fmt::Debug for PoolSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolSession")
            .field("name", &self.name)
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}
