//! JSON pool image documents.
//!
//! A pool image describes objects, node shapes, child pointers, extent
//! logs and error-log entries of a pool snapshot. It is loaded into a [`MemoryPool`] so the CLI and
//! dashboard can serve it through the same provider boundary as a live pool.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::memory::{MemoryLog, MemoryObject, MemoryPool};
use super::{ErrorLogEntry, NodeShape, PointerRecord, SpaceMapRecord};
use crate::types::{DatasetId, Namespace};

/// Errors raised while loading a pool image.
#[derive(Debug, Error)]
pub enum ImageError {
    /// The image file could not be read.
    #[error("failed to read pool image {path}: {source}")]
    Io {
        /// Path that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The document is not valid JSON for the image schema.
    #[error("failed to parse pool image: {0}")]
    Parse(#[from] serde_json::Error),
    /// The document parsed but is inconsistent.
    #[error("invalid pool image: {0}")]
    Invalid(String),
}

/// Top-level pool image document.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PoolImage {
    /// Pool name.
    pub name: String,
    /// Metadata-namespace objects.
    #[serde(default)]
    pub objects: Vec<ImageObject>,
    /// Dataset namespaces.
    #[serde(default)]
    pub datasets: Vec<ImageDataset>,
    /// Persistent error-log entries.
    #[serde(default)]
    pub errors: Vec<ErrorLogEntry>,
}

/// One dataset namespace.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImageDataset {
    /// Dataset id.
    pub id: u64,
    /// Objects in the dataset's object set.
    #[serde(default)]
    pub objects: Vec<ImageObject>,
}

/// One object.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImageObject {
    /// Object id.
    pub id: u64,
    /// On-disk type tag.
    pub type_tag: u8,
    /// Header length; defaults to the space-map minimum when an extent log
    /// is present, otherwise zero.
    #[serde(default)]
    pub header_len: Option<u32>,
    /// Node shape metadata.
    #[serde(default)]
    pub shape: Option<NodeShape>,
    /// Pointers stored beneath the node's indirect blocks.
    #[serde(default)]
    pub children: Vec<ImageChild>,
    /// Extent log contents.
    #[serde(default)]
    pub extent_log: Option<ImageLog>,
}

/// A pointer stored at `(level, block_id)`, or a read failure there.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImageChild {
    /// Level of the stored pointer.
    pub level: u8,
    /// Block id at that level.
    pub block_id: u64,
    /// The pointer, when readable.
    #[serde(default)]
    pub pointer: Option<PointerRecord>,
    /// Failure message, when unreadable.
    #[serde(default)]
    pub error: Option<String>,
}

/// Extent log contents.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImageLog {
    /// First covered address.
    #[serde(default)]
    pub start: u64,
    /// Covered size; omitted when not statically known.
    #[serde(default)]
    pub size: Option<u64>,
    /// Allocation unit shift.
    #[serde(default = "default_shift")]
    pub shift: u8,
    /// Header allocated counter.
    #[serde(default)]
    pub allocated: i64,
    /// Records in ascending offset order.
    #[serde(default)]
    pub records: Vec<SpaceMapRecord>,
    /// Fail iteration after this many records.
    #[serde(default)]
    pub fail_after: Option<usize>,
}

fn default_shift() -> u8 {
    9
}

impl PoolImage {
    /// Reads and parses an image file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ImageError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ImageError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Parses an image document.
    pub fn from_json_str(raw: &str) -> Result<Self, ImageError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Validates the image and builds an in-memory pool from it.
    pub fn into_pool(self) -> Result<MemoryPool, ImageError> {
        let mut pool = MemoryPool::new(self.name).with_errors(self.errors);
        load_objects(&mut pool, Namespace::Meta, self.objects)?;
        let mut seen = HashSet::new();
        for dataset in self.datasets {
            let id = DatasetId::checked(dataset.id)
                .map_err(|_| ImageError::Invalid("dataset id 0 is reserved".into()))?;
            if !seen.insert(id) {
                return Err(ImageError::Invalid(format!("dataset {id} listed twice")));
            }
            pool.add_dataset(id);
            load_objects(&mut pool, Namespace::Dataset(id), dataset.objects)?;
        }
        Ok(pool)
    }
}

fn load_objects(
    pool: &mut MemoryPool,
    namespace: Namespace,
    objects: Vec<ImageObject>,
) -> Result<(), ImageError> {
    for object in objects {
        if object.id == 0 {
            return Err(ImageError::Invalid(format!(
                "object id 0 is reserved ({namespace})"
            )));
        }
        let has_log = object.extent_log.is_some();
        let built = build_object(object)?;
        if pool.contains(namespace, built.id()) {
            return Err(ImageError::Invalid(format!(
                "object {} listed twice in {namespace}",
                built.id()
            )));
        }
        if has_log && namespace != Namespace::Meta {
            return Err(ImageError::Invalid(format!(
                "object {} in {namespace}: extent logs live in the meta namespace",
                built.id()
            )));
        }
        pool.insert(namespace, built);
    }
    Ok(())
}

fn build_object(object: ImageObject) -> Result<MemoryObject, ImageError> {
    let default_header = if object.extent_log.is_some() {
        super::SPACE_MAP_HEADER_MIN
    } else {
        0
    };
    let mut built = MemoryObject::new(object.id, object.type_tag)
        .header_len(object.header_len.unwrap_or(default_header));
    if let Some(shape) = object.shape {
        built = built.shape(shape);
    }
    for child in object.children {
        built = match (child.pointer, child.error) {
            (Some(pointer), None) => built.child(child.level, child.block_id, pointer),
            (None, Some(reason)) => built.unreadable_child(child.level, child.block_id, reason),
            _ => {
                return Err(ImageError::Invalid(format!(
                    "object {} child ({}, {}) needs exactly one of pointer or error",
                    object.id, child.level, child.block_id
                )))
            }
        };
    }
    if let Some(log) = object.extent_log {
        if let Some(at) = log
            .records
            .windows(2)
            .position(|pair| pair[1].offset < pair[0].offset)
        {
            return Err(ImageError::Invalid(format!(
                "object {} extent log record {} at offset {} precedes offset {}",
                object.id,
                at + 1,
                log.records[at + 1].offset,
                log.records[at].offset
            )));
        }
        let mut memory = match log.size {
            Some(size) => MemoryLog::new(log.start, size),
            None => MemoryLog::unbounded(log.start),
        }
        .records(log.records);
        memory.shift = log.shift;
        memory.allocated = log.allocated;
        memory.fail_after = log.fail_after;
        built = built.extent_log(memory);
    }
    Ok(built)
}
