//! Identifier newtypes and addressing scopes shared by every view.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ExplorerError, Result};

/// Identifier of an object inside a namespace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub u64);

/// Identifier of a dataset whose objects live in their own namespace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ObjectId {
    /// Accepts a caller-supplied id, rejecting zero.
    pub fn checked(raw: u64) -> Result<Self> {
        if raw == 0 {
            return Err(ExplorerError::invalid("object id must be non-zero"));
        }
        Ok(ObjectId(raw))
    }

    /// Parses a decimal id taken from a path segment or command line.
    pub fn parse(raw: &str) -> Result<Self> {
        let value = raw
            .trim()
            .parse::<u64>()
            .map_err(|_| ExplorerError::invalid(format!("malformed object id '{raw}'")))?;
        Self::checked(value)
    }
}

impl DatasetId {
    /// Accepts a caller-supplied id, rejecting zero.
    pub fn checked(raw: u64) -> Result<Self> {
        if raw == 0 {
            return Err(ExplorerError::invalid("dataset id must be non-zero"));
        }
        Ok(DatasetId(raw))
    }

    /// Parses a decimal id taken from a path segment or command line.
    pub fn parse(raw: &str) -> Result<Self> {
        let value = raw
            .trim()
            .parse::<u64>()
            .map_err(|_| ExplorerError::invalid(format!("malformed dataset id '{raw}'")))?;
        Self::checked(value)
    }
}

/// Object namespace a request is resolved in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// The pool-wide metadata object set.
    Meta,
    /// The object set belonging to one dataset.
    Dataset(DatasetId),
}

impl Namespace {
    /// Builds a namespace from an optional dataset id.
    pub fn from_dataset(dataset: Option<DatasetId>) -> Self {
        match dataset {
            Some(id) => Namespace::Dataset(id),
            None => Namespace::Meta,
        }
    }

    /// Scope label echoed in responses.
    pub fn scope(&self) -> Scope {
        match self {
            Namespace::Meta => Scope::Meta,
            Namespace::Dataset(_) => Scope::Dataset,
        }
    }

    /// Dataset id when the namespace is dataset-scoped.
    pub fn dataset(&self) -> Option<DatasetId> {
        match self {
            Namespace::Meta => None,
            Namespace::Dataset(id) => Some(*id),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Namespace::Meta => f.write_str("meta"),
            Namespace::Dataset(id) => write!(f, "dataset {id}"),
        }
    }
}

/// Wire label for a [`Namespace`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Pool-wide metadata object set.
    Meta,
    /// A dataset's object set.
    Dataset,
}

/// Human name for a well-known object type tag.
pub fn object_type_name(tag: u8) -> &'static str {
    match tag {
        0 => "none",
        1 => "object directory",
        2 => "object array",
        3 => "packed nvlist",
        4 => "packed nvlist size",
        5 => "bpobj",
        6 => "bpobj header",
        7 => "space map header",
        8 => "space map",
        9 => "intent log",
        10 => "dnode",
        11 => "objset",
        12 => "dsl directory",
        13 => "dsl directory child map",
        14 => "dsl dataset snap map",
        15 => "dsl props",
        16 => "dsl dataset",
        17 => "znode",
        18 => "acl (v0)",
        19 => "plain file contents",
        20 => "directory contents",
        21 => "master node",
        22 => "unlinked set",
        23 => "zvol",
        24 => "zvol prop",
        25 => "plain other",
        26 => "uint64 other",
        27 => "zap other",
        28 => "persistent error log",
        29 => "spa history",
        30 => "spa history offsets",
        31 => "pool properties",
        32 => "dsl permissions",
        33 => "acl",
        34 => "sysacl",
        35 => "fuid table",
        36 => "fuid table size",
        37 => "dataset next clones",
        38 => "scan work queue",
        39 => "user/group used",
        40 => "user/group quota",
        41 => "userrefs",
        42 => "ddt zap",
        43 => "ddt stats",
        44 => "sa attribute",
        45 => "sa master node",
        46 => "sa attr registration",
        47 => "sa attr layouts",
        48 => "scan translations",
        49 => "deduplicated block",
        50 => "dsl deadlist map",
        51 => "dsl deadlist map hdr",
        52 => "dsl dir clones",
        53 => "bpobj subobj",
        _ => "unknown",
    }
}
