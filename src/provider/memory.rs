//! In-memory pool used by tests, benches and pool image fixtures.

use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use super::{
    ErrorLogEntry, ExtentLog, NodeHandle, NodeShape, ObjectInfo, PoolAccess, PointerRecord, ProviderError,
    ProviderResult, SpaceMapRecord, SPACE_MAP_HEADER_MIN, SPACE_MAP_TYPE,
};
use crate::types::{DatasetId, Namespace, ObjectId};

/// Bytes one record occupies in the log, used to report log length.
const RECORD_BYTES: u64 = 8;

#[derive(Clone, Debug)]
enum ChildEntry {
    Present(PointerRecord),
    Unreadable(String),
}

/// Extent log contents held by a [`MemoryObject`].
#[derive(Clone, Debug, Default)]
pub struct MemoryLog {
    /// First covered address.
    pub start: u64,
    /// Covered size, `None` when not statically known.
    pub size: Option<u64>,
    /// Allocation unit shift.
    pub shift: u8,
    /// Header allocated counter.
    pub allocated: i64,
    records: Vec<SpaceMapRecord>,
    /// Fail iteration after yielding this many records.
    pub fail_after: Option<usize>,
}

impl MemoryLog {
    /// A log covering `[start, start + size)`.
    pub fn new(start: u64, size: u64) -> Self {
        Self {
            start,
            size: Some(size),
            shift: 9,
            ..Self::default()
        }
    }

    /// A log whose covered size is unknown.
    pub fn unbounded(start: u64) -> Self {
        Self {
            start,
            size: None,
            shift: 9,
            ..Self::default()
        }
    }

    /// Inserts one record at its offset position.
    pub fn record(mut self, record: SpaceMapRecord) -> Self {
        let at = self
            .records
            .partition_point(|held| held.offset <= record.offset);
        self.records.insert(at, record);
        self
    }

    /// Adds many records; the log stays in ascending offset order, with equal
    /// offsets kept in insertion order.
    pub fn records(mut self, records: impl IntoIterator<Item = SpaceMapRecord>) -> Self {
        self.records.extend(records);
        self.records.sort_by_key(|record| record.offset);
        self
    }

    /// Injects a read failure after `count` records.
    pub fn fail_after(mut self, count: usize) -> Self {
        self.fail_after = Some(count);
        self
    }
}

/// One object held by a [`MemoryPool`].
#[derive(Clone, Debug)]
pub struct MemoryObject {
    id: ObjectId,
    type_tag: u8,
    header_len: u32,
    shape: Option<NodeShape>,
    children: FxHashMap<(u8, u64), ChildEntry>,
    log: Option<MemoryLog>,
    structure: Arc<RwLock<()>>,
}

impl MemoryObject {
    /// A bare object with the given type tag.
    pub fn new(id: u64, type_tag: u8) -> Self {
        Self {
            id: ObjectId(id),
            type_tag,
            header_len: 0,
            shape: None,
            children: FxHashMap::default(),
            log: None,
            structure: Arc::new(RwLock::new(())),
        }
    }

    /// A space-map object carrying `log`.
    pub fn space_map(id: u64, log: MemoryLog) -> Self {
        Self::new(id, SPACE_MAP_TYPE)
            .header_len(SPACE_MAP_HEADER_MIN)
            .extent_log(log)
    }

    /// Object id.
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Sets the header length.
    pub fn header_len(mut self, len: u32) -> Self {
        self.header_len = len;
        self
    }

    /// Attaches node shape metadata.
    pub fn shape(mut self, shape: NodeShape) -> Self {
        self.shape = Some(shape);
        self
    }

    /// Records the pointer stored for `(level, block_id)`.
    pub fn child(mut self, level: u8, block_id: u64, pointer: PointerRecord) -> Self {
        self.children
            .insert((level, block_id), ChildEntry::Present(pointer));
        self
    }

    /// Makes `(level, block_id)` fail to resolve.
    pub fn unreadable_child(mut self, level: u8, block_id: u64, reason: impl Into<String>) -> Self {
        self.children
            .insert((level, block_id), ChildEntry::Unreadable(reason.into()));
        self
    }

    /// Attaches an extent log.
    pub fn extent_log(mut self, log: MemoryLog) -> Self {
        self.log = Some(log);
        self
    }

    fn info(&self) -> ObjectInfo {
        ObjectInfo {
            object: self.id,
            type_tag: self.type_tag,
            header_len: self.header_len,
        }
    }
}

/// Pool whose objects live entirely in memory.
#[derive(Clone, Debug)]
pub struct MemoryPool {
    name: String,
    namespaces: FxHashMap<Namespace, BTreeMap<ObjectId, MemoryObject>>,
    errors: Vec<ErrorLogEntry>,
    errors_fail_after: Option<usize>,
}

impl MemoryPool {
    /// An empty pool with only the metadata namespace.
    pub fn new(name: impl Into<String>) -> Self {
        let mut namespaces = FxHashMap::default();
        namespaces.insert(Namespace::Meta, BTreeMap::new());
        Self {
            name: name.into(),
            namespaces,
            errors: Vec::new(),
            errors_fail_after: None,
        }
    }

    /// Records error-log entries; scrub entries stay ahead of last-log ones.
    pub fn with_errors(mut self, entries: impl IntoIterator<Item = ErrorLogEntry>) -> Self {
        self.errors.extend(entries);
        self.errors.sort_by_key(|entry| entry.source);
        self
    }

    /// Injects an error-log read failure after `count` entries.
    pub fn fail_error_log_after(mut self, count: usize) -> Self {
        self.errors_fail_after = Some(count);
        self
    }

    /// Registers an empty dataset namespace.
    pub fn add_dataset(&mut self, dataset: DatasetId) -> &mut Self {
        self.namespaces
            .entry(Namespace::Dataset(dataset))
            .or_default();
        self
    }

    /// Inserts or replaces an object; dataset namespaces are created on demand.
    pub fn insert(&mut self, namespace: Namespace, object: MemoryObject) -> &mut Self {
        self.namespaces
            .entry(namespace)
            .or_default()
            .insert(object.id, object);
        self
    }

    /// Builder form of [`MemoryPool::insert`] for the metadata namespace.
    pub fn with_object(mut self, object: MemoryObject) -> Self {
        self.insert(Namespace::Meta, object);
        self
    }

    /// Builder form of [`MemoryPool::insert`] for a dataset namespace.
    pub fn with_dataset_object(mut self, dataset: DatasetId, object: MemoryObject) -> Self {
        self.insert(Namespace::Dataset(dataset), object);
        self
    }

    /// Whether an object id is taken in `namespace`.
    pub fn contains(&self, namespace: Namespace, object: ObjectId) -> bool {
        self.namespaces
            .get(&namespace)
            .is_some_and(|objects| objects.contains_key(&object))
    }

    fn namespace(&self, namespace: Namespace) -> ProviderResult<&BTreeMap<ObjectId, MemoryObject>> {
        self.namespaces.get(&namespace).ok_or(match namespace {
            Namespace::Meta => ProviderError::Corrupt("metadata namespace missing".into()),
            Namespace::Dataset(id) => ProviderError::DatasetNotFound(id),
        })
    }

    fn object(&self, namespace: Namespace, object: ObjectId) -> ProviderResult<&MemoryObject> {
        self.namespace(namespace)?
            .get(&object)
            .ok_or(ProviderError::ObjectNotFound(object))
    }

    fn log(&self, object: ObjectId) -> ProviderResult<&MemoryLog> {
        self.object(Namespace::Meta, object)?
            .log
            .as_ref()
            .ok_or(ProviderError::NotExtentLog(object))
    }
}

impl PoolAccess for MemoryPool {
    fn pool_name(&self) -> &str {
        &self.name
    }

    fn object_info(&self, namespace: Namespace, object: ObjectId) -> ProviderResult<ObjectInfo> {
        Ok(self.object(namespace, object)?.info())
    }

    fn iterate_objects(
        &self,
        namespace: Namespace,
        visitor: &mut dyn FnMut(&ObjectInfo) -> ControlFlow<()>,
    ) -> ProviderResult<()> {
        for object in self.namespace(namespace)?.values() {
            if visitor(&object.info()).is_break() {
                break;
            }
        }
        Ok(())
    }

    fn resolve_node(&self, namespace: Namespace, object: ObjectId) -> ProviderResult<NodeHandle> {
        let entry = self.object(namespace, object)?;
        let shape = entry.shape.clone().ok_or(ProviderError::NoShape(object))?;
        Ok(NodeHandle::new(
            namespace,
            object,
            shape,
            Arc::clone(&entry.structure),
        ))
    }

    fn resolve_child_pointer(
        &self,
        node: &NodeHandle,
        level: u8,
        block_id: u64,
    ) -> ProviderResult<PointerRecord> {
        let entry = self.object(node.namespace(), node.object())?;
        match entry.children.get(&(level, block_id)) {
            Some(ChildEntry::Present(pointer)) => Ok(pointer.clone()),
            Some(ChildEntry::Unreadable(reason)) => Err(ProviderError::Read(format!(
                "object {} level {level} block {block_id}: {reason}",
                node.object()
            ))),
            // Sparse ranges read back as holes.
            None => Ok(PointerRecord::hole(level)),
        }
    }

    fn open_extent_log(&self, object: ObjectId) -> ProviderResult<ExtentLog> {
        let log = self.log(object)?;
        Ok(ExtentLog {
            object,
            start: log.start,
            size: log.size,
            shift: log.shift,
            length: (log.records.len() as u64).saturating_mul(RECORD_BYTES),
            allocated: log.allocated,
        })
    }

    fn iterate_log(
        &self,
        log: &ExtentLog,
        visitor: &mut dyn FnMut(&SpaceMapRecord) -> ControlFlow<()>,
    ) -> ProviderResult<()> {
        let contents = self.log(log.object)?;
        for (position, record) in contents.records.iter().enumerate() {
            if contents.fail_after == Some(position) {
                return Err(ProviderError::Read(format!(
                    "extent log {} unreadable at record {position}",
                    log.object
                )));
            }
            if visitor(record).is_break() {
                return Ok(());
            }
        }
        Ok(())
    }

    fn iterate_error_log(
        &self,
        visitor: &mut dyn FnMut(&ErrorLogEntry) -> ControlFlow<()>,
    ) -> ProviderResult<()> {
        for (position, entry) in self.errors.iter().enumerate() {
            if self.errors_fail_after == Some(position) {
                return Err(ProviderError::Read(format!(
                    "error log unreadable at entry {position}"
                )));
            }
            if visitor(entry).is_break() {
                break;
            }
        }
        Ok(())
    }
}
