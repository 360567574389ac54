//! Pool access provider boundary.
//!
//! The exploration core never decodes on-disk records itself. It asks a
//! [`PoolAccess`] implementation for object metadata, node shapes, child
//! block pointers and ordered extent records, and turns those into bounded
//! views. Implementations are not required to be safe for concurrent use;
//! [`crate::session::PoolSession`] serializes every call.

use std::ops::ControlFlow;
use std::sync::Arc;

use parking_lot::{lock_api::ArcRwLockReadGuard, RawRwLock, RwLock};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use thiserror::Error;

use crate::error::ExplorerError;
use crate::types::{DatasetId, Namespace, ObjectId};

pub mod image;
pub mod memory;

pub use image::{ImageError, PoolImage};
pub use memory::{MemoryLog, MemoryObject, MemoryPool};

/// Object type tag carried by space-map objects.
pub const SPACE_MAP_TYPE: u8 = 8;

/// Smallest header a space-map object can carry (start, size, alloc words).
pub const SPACE_MAP_HEADER_MIN: u32 = 24;

/// log2 of the on-disk size of one block pointer.
pub const BLOCK_POINTER_SHIFT: u8 = 7;

/// Failure reported by a provider.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// The object does not exist in the requested namespace.
    #[error("object {0} does not exist")]
    ObjectNotFound(ObjectId),
    /// The dataset namespace does not exist.
    #[error("dataset {0} does not exist")]
    DatasetNotFound(DatasetId),
    /// The object exists but carries no readable node shape.
    #[error("object {0} has no readable shape metadata")]
    NoShape(ObjectId),
    /// The object exists but is not an extent log.
    #[error("object {0} is not an extent log")]
    NotExtentLog(ObjectId),
    /// Reading a block or record failed.
    #[error("read failed: {0}")]
    Read(String),
    /// A record was read but failed validation.
    #[error("corrupt structure: {0}")]
    Corrupt(String),
}

impl ProviderError {
    /// Whether the failure means the addressed thing is absent.
    pub fn is_missing(&self) -> bool {
        matches!(
            self,
            ProviderError::ObjectNotFound(_)
                | ProviderError::DatasetNotFound(_)
                | ProviderError::NoShape(_)
        )
    }

    /// Maps a failure to resolve a root object: absence is `NotFound`,
    /// anything else is `Internal`.
    pub(crate) fn into_lookup_error(self) -> ExplorerError {
        if self.is_missing() {
            ExplorerError::not_found(self.to_string())
        } else {
            ExplorerError::internal(self.to_string())
        }
    }
}

/// Result alias for provider calls.
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Type and header metadata for one object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ObjectInfo {
    /// Object id.
    pub object: ObjectId,
    /// On-disk type tag.
    pub type_tag: u8,
    /// Size in bytes of the fixed header attached to the object.
    pub header_len: u32,
}

/// One physical copy backing a block pointer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceAddress {
    /// Top-level device id.
    pub device_id: u64,
    /// Byte offset on the device.
    pub offset: u64,
    /// Allocated size in bytes.
    pub size: u64,
    /// Whether this copy is a gang header.
    #[serde(default)]
    pub is_gang: bool,
}

/// Device copies of a pointer; at most three in practice.
pub type DeviceAddresses = SmallVec<[DeviceAddress; 3]>;

/// Decoded block pointer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointerRecord {
    /// Indirection level; 0 points at data.
    pub level: u8,
    /// Type tag of the referenced block.
    pub type_tag: u8,
    /// Logical (uncompressed) size.
    pub logical_size: u64,
    /// Physical (compressed) size.
    pub physical_size: u64,
    /// Allocated size summed over all copies.
    pub allocated_size: u64,
    /// Transaction group the block was born in.
    pub birth_txg: u64,
    /// Count of non-hole blocks beneath this pointer.
    pub fill: u64,
    /// Checksum algorithm id.
    pub checksum: u8,
    /// Compression algorithm id.
    pub compression: u8,
    /// Whether the block is deduplicated.
    pub dedup: bool,
    /// Hole pointers reference nothing.
    pub is_hole: bool,
    /// Embedded pointers carry their payload inline.
    pub is_embedded: bool,
    /// Gang pointers reference a gang header rather than the block.
    pub is_gang: bool,
    /// Physical copies.
    pub addresses: DeviceAddresses,
}

impl PointerRecord {
    /// A hole at the given level.
    pub fn hole(level: u8) -> Self {
        PointerRecord {
            level,
            is_hole: true,
            ..PointerRecord::default()
        }
    }

    /// Whether the pointer can never be expanded into children.
    pub fn is_terminal(&self) -> bool {
        self.level == 0 || self.is_hole || self.is_embedded || self.is_gang
    }
}

/// Shape metadata of a node: level count, fan-out and its own pointer slots.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeShape {
    /// Number of indirection levels, including the data level.
    pub levels: u8,
    /// log2 of the indirect block size.
    pub indirect_block_shift: u8,
    /// Data block size in bytes.
    pub data_block_size: u32,
    /// Highest allocated block id.
    pub max_block_id: u64,
    /// Top-level pointer slots, in slot order.
    #[serde(default)]
    pub pointers: Vec<PointerRecord>,
    /// Spill pointer, when the node has one.
    #[serde(default)]
    pub spill: Option<PointerRecord>,
}

impl NodeShape {
    /// Number of top-level pointer slots.
    pub fn pointer_slots(&self) -> usize {
        self.pointers.len()
    }

    /// Pointers held by one indirect block, zero when the shift is unusable.
    pub fn children_per_indirect(&self) -> u64 {
        self.indirect_block_shift
            .checked_sub(BLOCK_POINTER_SHIFT)
            .and_then(|shift| 1u64.checked_shl(u32::from(shift)))
            .unwrap_or(0)
    }
}

/// Reader guard over a node's structural lock.
pub type StructureGuard = ArcRwLockReadGuard<RawRwLock, ()>;

/// A resolved node: its shape plus the lock that keeps the shape stable.
#[derive(Clone, Debug)]
pub struct NodeHandle {
    namespace: Namespace,
    object: ObjectId,
    shape: NodeShape,
    structure: Arc<RwLock<()>>,
}

impl NodeHandle {
    /// Wraps a shape and the provider-owned structural lock guarding it.
    pub fn new(
        namespace: Namespace,
        object: ObjectId,
        shape: NodeShape,
        structure: Arc<RwLock<()>>,
    ) -> Self {
        Self {
            namespace,
            object,
            shape,
            structure,
        }
    }

    /// Namespace the node was resolved in.
    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    /// Object id of the node.
    pub fn object(&self) -> ObjectId {
        self.object
    }

    /// Shape metadata.
    pub fn shape(&self) -> &NodeShape {
        &self.shape
    }

    /// Takes the structural lock in reader mode; released when the guard drops.
    pub fn read_structure(&self) -> StructureGuard {
        RwLock::read_arc(&self.structure)
    }

    /// Whether any guard over the structural lock is currently alive.
    pub fn structure_locked(&self) -> bool {
        self.structure.is_locked()
    }
}

/// Operation recorded by an extent log entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpaceOp {
    /// Range became allocated.
    Alloc,
    /// Range became free.
    Free,
}

/// One allocate/free extent record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceMapRecord {
    /// Absolute start of the extent.
    pub offset: u64,
    /// Extent length in bytes.
    pub length: u64,
    /// Allocate or free.
    pub op: SpaceOp,
    /// Transaction group, 0 when unknown.
    #[serde(default)]
    pub txg: u64,
    /// Sync pass, 0 when unknown.
    #[serde(default)]
    pub sync_pass: u64,
    /// Device the extent belongs to, when recorded.
    #[serde(default)]
    pub device_id: Option<u64>,
}

impl SpaceMapRecord {
    /// Exclusive end of the extent, saturating at `u64::MAX`.
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.length)
    }
}

/// Opened extent log: its header, used to drive iteration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExtentLog {
    /// Object id of the log.
    pub object: ObjectId,
    /// First address covered by the map.
    pub start: u64,
    /// Size of the covered address range, when statically known.
    pub size: Option<u64>,
    /// Allocation unit shift.
    pub shift: u8,
    /// Length of the log in bytes.
    pub length: u64,
    /// Net allocated bytes according to the header.
    pub allocated: i64,
}

impl ExtentLog {
    /// Exclusive end of the covered address range, when known.
    pub fn end(&self) -> Option<u64> {
        self.size.map(|size| self.start.saturating_add(size))
    }
}

/// Persistent error log an entry was recorded in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorLogSource {
    /// Log filled by the most recent completed scrub.
    Scrub,
    /// Log of errors seen since that scrub.
    Last,
}

/// Bookmark of one block with a persistent data error.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorLogEntry {
    /// Log the entry came from.
    pub source: ErrorLogSource,
    /// Dataset object owning the damaged block; 0 for the metadata namespace.
    pub dataset_obj: u64,
    /// Object holding the block.
    pub object: u64,
    /// Indirection level; negative levels address special blocks.
    pub level: i64,
    /// Block id at that level.
    pub block_id: u64,
    /// Birth txg, recorded only by logs that track it.
    #[serde(default)]
    pub birth_txg: Option<u64>,
    /// Resolved file path, when the provider can name one.
    #[serde(default)]
    pub path: Option<String>,
}

/// Read primitives the exploration core consumes.
pub trait PoolAccess: Send {
    /// Name of the pool behind this handle.
    fn pool_name(&self) -> &str;

    /// Type and header metadata of one object.
    fn object_info(&self, namespace: Namespace, object: ObjectId) -> ProviderResult<ObjectInfo>;

    /// Visits objects of a namespace in ascending id order until the
    /// visitor breaks.
    fn iterate_objects(
        &self,
        namespace: Namespace,
        visitor: &mut dyn FnMut(&ObjectInfo) -> ControlFlow<()>,
    ) -> ProviderResult<()>;

    /// Resolves an object's node shape.
    fn resolve_node(&self, namespace: Namespace, object: ObjectId) -> ProviderResult<NodeHandle>;

    /// Resolves the pointer stored for `block_id` at `level` beneath `node`.
    /// Callers hold the node's structural lock for the duration.
    fn resolve_child_pointer(
        &self,
        node: &NodeHandle,
        level: u8,
        block_id: u64,
    ) -> ProviderResult<PointerRecord>;

    /// Opens a metadata-namespace extent log.
    fn open_extent_log(&self, object: ObjectId) -> ProviderResult<ExtentLog>;

    /// Visits records in ascending offset order. A `Break` from the visitor
    /// stops iteration and is not an error.
    fn iterate_log(
        &self,
        log: &ExtentLog,
        visitor: &mut dyn FnMut(&SpaceMapRecord) -> ControlFlow<()>,
    ) -> ProviderResult<()>;

    /// Visits persistent error-log entries, scrub log before last log, until
    /// the visitor breaks.
    fn iterate_error_log(
        &self,
        visitor: &mut dyn FnMut(&ErrorLogEntry) -> ControlFlow<()>,
    ) -> ProviderResult<()>;
}
