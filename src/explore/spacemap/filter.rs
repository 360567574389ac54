//! Record filters shared by the range and bin views.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{ExplorerError, Result};
use crate::provider::{SpaceMapRecord, SpaceOp};

/// Operation selector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OpFilter {
    /// Every record.
    #[default]
    All,
    /// Allocations only.
    Alloc,
    /// Frees only.
    Free,
}

impl OpFilter {
    fn admits(self, op: SpaceOp) -> bool {
        match self {
            OpFilter::All => true,
            OpFilter::Alloc => op == SpaceOp::Alloc,
            OpFilter::Free => op == SpaceOp::Free,
        }
    }
}

impl FromStr for OpFilter {
    type Err = ExplorerError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "all" => Ok(OpFilter::All),
            "alloc" => Ok(OpFilter::Alloc),
            "free" => Ok(OpFilter::Free),
            other => Err(ExplorerError::invalid(format!(
                "op must be all, alloc or free (got '{other}')"
            ))),
        }
    }
}

impl fmt::Display for OpFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OpFilter::All => "all",
            OpFilter::Alloc => "alloc",
            OpFilter::Free => "free",
        })
    }
}

/// Record filter shared by the range and bin views.
///
/// A zero txg bound means "unbounded". Once either bound is set, records
/// whose txg is unknown are excluded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RecordFilter {
    /// Operation selector.
    pub op: OpFilter,
    /// Shortest admitted length; 0 admits everything.
    pub min_length: u64,
    /// Inclusive lower txg bound.
    pub txg_min: Option<u64>,
    /// Inclusive upper txg bound.
    pub txg_max: Option<u64>,
}

impl RecordFilter {
    /// Builds a filter from raw request parameters.
    pub fn from_params(
        op: Option<&str>,
        min_length: Option<u64>,
        txg_min: Option<u64>,
        txg_max: Option<u64>,
    ) -> Result<Self> {
        let op = match op {
            Some(raw) => raw.parse()?,
            None => OpFilter::All,
        };
        let filter = Self {
            op,
            min_length: min_length.unwrap_or(0),
            txg_min: txg_min.filter(|&txg| txg != 0),
            txg_max: txg_max.filter(|&txg| txg != 0),
        };
        filter.validate()?;
        Ok(filter)
    }

    /// Rejects inverted txg bounds.
    pub fn validate(&self) -> Result<()> {
        if let (Some(min), Some(max)) = (self.txg_min, self.txg_max) {
            if min > max {
                return Err(ExplorerError::invalid(format!(
                    "txg_min {min} exceeds txg_max {max}"
                )));
            }
        }
        Ok(())
    }

    fn bounds_txg(&self) -> bool {
        self.txg_min.is_some() || self.txg_max.is_some()
    }

    /// Whether `record` passes the filter.
    pub fn matches(&self, record: &SpaceMapRecord) -> bool {
        if !self.op.admits(record.op) || record.length < self.min_length {
            return false;
        }
        if !self.bounds_txg() {
            return true;
        }
        if record.txg == 0 {
            return false;
        }
        self.txg_min.map_or(true, |min| record.txg >= min)
            && self.txg_max.map_or(true, |max| record.txg <= max)
    }
}
