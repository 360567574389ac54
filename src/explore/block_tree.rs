//! Block-tree materializer.
//!
//! Expands an object's pointer tree into a flat, parent-indexed node list in
//! pre-order. The walk uses an explicit stack of per-indirect-block frames so
//! native stack use stays constant no matter how deep the caps allow it to go.
//!
//! Failure policy: a child pointer that cannot be resolved is skipped and the
//! sibling walk continues. Only a missing root or an allocation failure ends
//! the call with an error.

use serde::Serialize;
use tracing::debug;

use super::limits::ExploreLimits;
use crate::error::Result;
use crate::provider::{
    DeviceAddress, NodeHandle, NodeShape, PointerRecord, PoolAccess, ProviderError,
};
use crate::types::{DatasetId, Namespace, ObjectId, Scope};

/// Inputs of one materialization.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TreeRequest {
    /// Namespace the object lives in.
    pub namespace: Namespace,
    /// Object whose tree is expanded.
    pub object: ObjectId,
    /// Requested depth cap; clamped against [`ExploreLimits`].
    pub max_depth: Option<u64>,
    /// Requested node budget; clamped against [`ExploreLimits`].
    pub max_nodes: Option<u64>,
}

impl TreeRequest {
    /// Request with default caps.
    pub fn new(namespace: Namespace, object: ObjectId) -> Self {
        Self {
            namespace,
            object,
            max_depth: None,
            max_nodes: None,
        }
    }
}

/// Materialized tree.
#[derive(Clone, Debug, Serialize)]
pub struct BlockTree {
    /// Namespace label.
    pub scope: Scope,
    /// Dataset id for dataset-scoped requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset_id: Option<DatasetId>,
    /// Root object.
    pub object_id: ObjectId,
    /// Effective depth cap.
    pub max_depth: u64,
    /// Effective node budget.
    pub max_nodes: u64,
    /// Number of emitted nodes, root included.
    pub count: u64,
    /// Whether the real tree holds nodes that were not emitted.
    pub truncated: bool,
    /// Whether at least one expandable pointer sat at the depth cap.
    pub depth_limited: bool,
    /// Children dropped because they could not be resolved.
    pub skipped_children: u64,
    /// Nodes in pre-order; ids equal positions.
    pub nodes: Vec<BlockNode>,
}

/// Kind of an emitted node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// The object's own shape record.
    Root,
    /// A block pointer reached through the slot tree.
    Pointer,
    /// The spill pointer; emitted but never expanded.
    Spill,
}

/// One emitted node.
#[derive(Clone, Debug, Serialize)]
pub struct BlockNode {
    /// Pre-order id; the root is 0.
    pub id: u64,
    /// Node kind.
    pub kind: NodeKind,
    /// Id of the referencing node, `None` for the root.
    pub parent_id: Option<u64>,
    /// Slot position under the parent, `None` for the root.
    pub edge_index: Option<u64>,
    /// Kind-specific fields.
    #[serde(flatten)]
    pub detail: NodeDetail,
}

/// Kind-specific node fields.
#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum NodeDetail {
    /// Root shape.
    Root(RootDetail),
    /// Pointer contents.
    Pointer(PointerDetail),
}

/// Root fields: the object id plus its shape.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RootDetail {
    /// Object id.
    pub object_id: ObjectId,
    /// Shape metadata.
    #[serde(flatten)]
    pub shape: ShapeSummary,
}

/// Shape metadata as reported to callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ShapeSummary {
    /// Indirection levels.
    pub levels: u8,
    /// Top-level pointer slots.
    pub pointer_slots: u64,
    /// log2 of the indirect block size.
    pub indirect_block_shift: u8,
    /// Pointers per indirect block.
    pub children_per_indirect: u64,
    /// Data block size in bytes.
    pub data_block_size: u32,
    /// Highest allocated block id.
    pub max_block_id: u64,
    /// Whether a spill pointer exists.
    pub has_spill: bool,
}

impl ShapeSummary {
    /// Summarizes `shape`.
    pub fn of(shape: &NodeShape) -> Self {
        Self {
            levels: shape.levels,
            pointer_slots: shape.pointer_slots() as u64,
            indirect_block_shift: shape.indirect_block_shift,
            children_per_indirect: shape.children_per_indirect(),
            data_block_size: shape.data_block_size,
            max_block_id: shape.max_block_id,
            has_spill: shape.spill.is_some(),
        }
    }
}

/// Contents of one pointer node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PointerDetail {
    /// Logical block index at this pointer's level.
    pub block_id: u64,
    /// Distance from the top-level slots; top-level pointers are depth 0.
    pub depth: u64,
    /// Indirection level.
    pub level: u8,
    /// Type tag of the referenced block.
    pub type_tag: u8,
    /// Logical size.
    pub logical_size: u64,
    /// Physical size.
    pub physical_size: u64,
    /// Allocated size.
    pub allocated_size: u64,
    /// Birth transaction group.
    pub birth_txg: u64,
    /// Non-hole blocks beneath.
    pub fill: u64,
    /// Checksum algorithm id.
    pub checksum: u8,
    /// Compression algorithm id.
    pub compression: u8,
    /// Dedup flag.
    pub dedup: bool,
    /// Hole flag.
    pub is_hole: bool,
    /// Embedded flag.
    pub is_embedded: bool,
    /// Gang flag.
    pub is_gang: bool,
    /// Child slots held by the referenced indirect block; 0 at level 0.
    pub child_slots: u64,
    /// Physical copies.
    pub addresses: Vec<DeviceAddress>,
}

/// Expands the pointer tree of `request.object`.
pub fn materialize(
    pool: &dyn PoolAccess,
    limits: &ExploreLimits,
    request: &TreeRequest,
) -> Result<BlockTree> {
    let max_depth = limits.tree_depth(request.max_depth);
    let max_nodes = limits.tree_nodes(request.max_nodes);
    let node = pool
        .resolve_node(request.namespace, request.object)
        .map_err(ProviderError::into_lookup_error)?;

    // Held until the walk returns, error paths included.
    let _structure = node.read_structure();

    let mut walk = Walk {
        pool,
        node: &node,
        fan_out: node.shape().children_per_indirect(),
        max_depth,
        max_nodes,
        nodes: Vec::new(),
        truncated: false,
        depth_limited: false,
        skipped_children: 0,
    };
    walk.emit_root()?;

    let shape = node.shape();
    for (slot, pointer) in shape.pointers.iter().enumerate() {
        let slot = slot as u64;
        if walk.descend(pointer, slot)?.is_none() {
            break;
        }
    }
    if let Some(spill) = &shape.spill {
        let edge = shape.pointer_slots() as u64;
        walk.emit(spill, NodeKind::Spill, 0, edge, 0, 0)?;
    }

    debug!(
        object = %request.object,
        namespace = %request.namespace,
        count = walk.nodes.len(),
        truncated = walk.truncated,
        skipped = walk.skipped_children,
        "block tree materialized"
    );

    Ok(BlockTree {
        scope: request.namespace.scope(),
        dataset_id: request.namespace.dataset(),
        object_id: request.object,
        max_depth,
        max_nodes,
        count: walk.nodes.len() as u64,
        truncated: walk.truncated,
        depth_limited: walk.depth_limited,
        skipped_children: walk.skipped_children,
        nodes: walk.nodes,
    })
}

/// Pending children of one expanded indirect pointer.
#[derive(Clone, Copy, Debug)]
struct Frame {
    node_id: u64,
    block_id: u64,
    child_level: u8,
    child_depth: u64,
    next_slot: u64,
}

struct Walk<'a> {
    pool: &'a dyn PoolAccess,
    node: &'a NodeHandle,
    fan_out: u64,
    max_depth: u64,
    max_nodes: u64,
    nodes: Vec<BlockNode>,
    truncated: bool,
    depth_limited: bool,
    skipped_children: u64,
}

impl Walk<'_> {
    fn next_id(&self) -> u64 {
        self.nodes.len() as u64
    }

    fn push(&mut self, node: BlockNode) -> Result<()> {
        self.nodes.try_reserve(1)?;
        self.nodes.push(node);
        Ok(())
    }

    fn emit_root(&mut self) -> Result<()> {
        let detail = RootDetail {
            object_id: self.node.object(),
            shape: ShapeSummary::of(self.node.shape()),
        };
        self.push(BlockNode {
            id: 0,
            kind: NodeKind::Root,
            parent_id: None,
            edge_index: None,
            detail: NodeDetail::Root(detail),
        })
    }

    /// Emits one pointer node, or marks the tree truncated when the budget
    /// is spent. Returns the new id.
    fn emit(
        &mut self,
        pointer: &PointerRecord,
        kind: NodeKind,
        parent_id: u64,
        edge_index: u64,
        block_id: u64,
        depth: u64,
    ) -> Result<Option<u64>> {
        if self.next_id() >= self.max_nodes {
            self.truncated = true;
            return Ok(None);
        }
        let id = self.next_id();
        let child_slots = if pointer.level > 0 { self.fan_out } else { 0 };
        let detail = PointerDetail {
            block_id,
            depth,
            level: pointer.level,
            type_tag: pointer.type_tag,
            logical_size: pointer.logical_size,
            physical_size: pointer.physical_size,
            allocated_size: pointer.allocated_size,
            birth_txg: pointer.birth_txg,
            fill: pointer.fill,
            checksum: pointer.checksum,
            compression: pointer.compression,
            dedup: pointer.dedup,
            is_hole: pointer.is_hole,
            is_embedded: pointer.is_embedded,
            is_gang: pointer.is_gang,
            child_slots,
            addresses: pointer.addresses.to_vec(),
        };
        self.push(BlockNode {
            id,
            kind,
            parent_id: Some(parent_id),
            edge_index: Some(edge_index),
            detail: NodeDetail::Pointer(detail),
        })?;
        Ok(Some(id))
    }

    /// Frame for the children of `pointer`, when it may be expanded.
    fn expansion(
        &mut self,
        pointer: &PointerRecord,
        id: u64,
        block_id: u64,
        depth: u64,
    ) -> Option<Frame> {
        if pointer.is_terminal() || self.fan_out == 0 {
            return None;
        }
        if depth >= self.max_depth {
            self.depth_limited = true;
            self.truncated = true;
            return None;
        }
        Some(Frame {
            node_id: id,
            block_id,
            child_level: pointer.level - 1,
            child_depth: depth + 1,
            next_slot: 0,
        })
    }

    /// Emits a top-level pointer and its subtree. Returns `None` once the
    /// node budget is spent.
    fn descend(&mut self, pointer: &PointerRecord, slot: u64) -> Result<Option<()>> {
        let Some(id) = self.emit(pointer, NodeKind::Pointer, 0, slot, slot, 0)? else {
            return Ok(None);
        };
        let mut stack: Vec<Frame> = Vec::new();
        if let Some(frame) = self.expansion(pointer, id, slot, 0) {
            stack.push(frame);
        }

        while let Some(frame) = stack.last_mut() {
            if frame.next_slot >= self.fan_out {
                stack.pop();
                continue;
            }
            let slot = frame.next_slot;
            frame.next_slot += 1;
            let Frame {
                node_id,
                block_id,
                child_level,
                child_depth,
                ..
            } = *frame;

            let Some(child_block) = block_id
                .checked_mul(self.fan_out)
                .and_then(|base| base.checked_add(slot))
            else {
                self.skipped_children += 1;
                debug!(parent = node_id, slot, "child block id overflows; skipped");
                continue;
            };

            if self.next_id() >= self.max_nodes {
                self.truncated = true;
                return Ok(None);
            }

            let child = match self
                .pool
                .resolve_child_pointer(self.node, child_level, child_block)
            {
                Ok(child) => child,
                Err(err) => {
                    self.skipped_children += 1;
                    debug!(
                        object = %self.node.object(),
                        level = child_level,
                        block = child_block,
                        error = %err,
                        "unreadable child skipped"
                    );
                    continue;
                }
            };

            let Some(id) =
                self.emit(&child, NodeKind::Pointer, node_id, slot, child_block, child_depth)?
            else {
                return Ok(None);
            };
            if let Some(frame) = self.expansion(&child, id, child_block, child_depth) {
                stack.try_reserve(1)?;
                stack.push(frame);
            }
        }
        Ok(Some(()))
    }
}
