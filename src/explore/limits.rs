//! Default and maximum caps for every bounded view.

use super::page::PageLimits;

/// Smallest bin size honored by the bin view.
pub const MIN_BIN_SIZE: u64 = 512;

/// Caps applied to every exploration request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExploreLimits {
    /// Default block-tree depth.
    pub tree_depth_default: u64,
    /// Deepest block-tree expansion ever honored.
    pub tree_depth_max: u64,
    /// Block-tree node budget.
    pub tree_nodes: PageLimits,
    /// Space-map range page size.
    pub ranges: PageLimits,
    /// Space-map bin page size.
    pub bins: PageLimits,
    /// Default bin size in bytes.
    pub bin_size_default: u64,
    /// Largest bin size in bytes.
    pub bin_size_max: u64,
    /// Object listing page size.
    pub objects: PageLimits,
    /// Error-log page size.
    pub errors: PageLimits,
}

impl Default for ExploreLimits {
    fn default() -> Self {
        Self {
            tree_depth_default: 4,
            tree_depth_max: 16,
            tree_nodes: PageLimits::new(2_000, 50_000),
            ranges: PageLimits::new(200, 2_000),
            bins: PageLimits::new(256, 2_048),
            bin_size_default: 1 << 20,
            bin_size_max: 1 << 32,
            objects: PageLimits::new(200, 10_000),
            errors: PageLimits::new(200, 10_000),
        }
    }
}

impl ExploreLimits {
    /// Resolves a requested tree depth.
    pub fn tree_depth(&self, requested: Option<u64>) -> u64 {
        requested
            .unwrap_or(self.tree_depth_default)
            .min(self.tree_depth_max)
    }

    /// Resolves a requested node budget.
    pub fn tree_nodes(&self, requested: Option<u64>) -> u64 {
        self.tree_nodes.clamp(requested)
    }

    /// Resolves a requested bin size.
    pub fn bin_size(&self, requested: Option<u64>) -> u64 {
        requested
            .unwrap_or(self.bin_size_default)
            .clamp(MIN_BIN_SIZE, self.bin_size_max.max(MIN_BIN_SIZE))
    }
}
