//! Bounded traversal and aggregation over pool structures.
//!
//! Every operation takes a [`PoolAccess`] provider and the [`ExploreLimits`]
//! in force, runs to completion without suspension, and returns an owned,
//! serializable view. Nothing is cached between calls.

use crate::error::Result;
use crate::provider::PoolAccess;
use crate::types::{Namespace, ObjectId};

pub mod block_tree;
pub mod errors;
pub mod limits;
pub mod numeric;
pub mod objects;
pub mod outcome;
pub mod page;
pub mod spacemap;

pub use block_tree::{BlockNode, BlockTree, NodeDetail, NodeKind, ShapeSummary, TreeRequest};
pub use errors::{ErrorLogPage, ErrorLogRequest};
pub use limits::ExploreLimits;
pub use objects::{ObjectDescription, ObjectEntry, ObjectListRequest, ObjectPage};
pub use outcome::Outcome;
pub use page::{Page, PageCollector, PageLimits, PageRequest};
pub use spacemap::{
    Bin, BinPage, BinRequest, HistogramBucket, OpFilter, RangeEntry, RangePage, RangeRequest,
    RecordFilter, SpaceMapHeader, SpaceMapSummary,
};

/// A provider paired with the limits applied to every request against it.
#[derive(Clone, Copy)]
pub struct Explorer<'a> {
    pool: &'a dyn PoolAccess,
    limits: &'a ExploreLimits,
}

impl<'a> Explorer<'a> {
    /// Binds `pool` and `limits`.
    pub fn new(pool: &'a dyn PoolAccess, limits: &'a ExploreLimits) -> Self {
        Self { pool, limits }
    }

    /// Name of the underlying pool.
    pub fn pool_name(&self) -> &str {
        self.pool.pool_name()
    }

    /// See [`block_tree::materialize`].
    pub fn materialize(&self, request: &TreeRequest) -> Result<BlockTree> {
        block_tree::materialize(self.pool, self.limits, request)
    }

    /// See [`spacemap::summary::summarize`].
    pub fn summary(&self, object: ObjectId) -> Result<SpaceMapSummary> {
        spacemap::summary::summarize(self.pool, object)
    }

    /// See [`spacemap::ranges::list_ranges`].
    pub fn ranges(&self, request: &RangeRequest) -> Result<RangePage> {
        spacemap::ranges::list_ranges(self.pool, self.limits, request)
    }

    /// See [`spacemap::bins::list_bins`].
    pub fn bins(&self, request: &BinRequest) -> Result<BinPage> {
        spacemap::bins::list_bins(self.pool, self.limits, request)
    }

    /// See [`objects::list_objects`].
    pub fn list_objects(&self, request: &ObjectListRequest) -> Result<ObjectPage> {
        objects::list_objects(self.pool, self.limits, request)
    }

    /// See [`errors::list_errors`].
    pub fn errors(&self, request: &ErrorLogRequest) -> Result<ErrorLogPage> {
        errors::list_errors(self.pool, self.limits, request)
    }

    /// See [`objects::describe_object`].
    pub fn describe(&self, namespace: Namespace, object: ObjectId) -> Result<ObjectDescription> {
        objects::describe_object(self.pool, namespace, object)
    }
}
