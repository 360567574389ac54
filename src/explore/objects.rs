//! Object listing and single-object description.

use std::ops::ControlFlow;

use serde::Serialize;

use super::block_tree::ShapeSummary;
use super::limits::ExploreLimits;
use super::page::{PageCollector, PageRequest};
use crate::error::{ExplorerError, Result};
use crate::provider::{
    ObjectInfo, PoolAccess, ProviderError, SPACE_MAP_HEADER_MIN, SPACE_MAP_TYPE,
};
use crate::types::{object_type_name, DatasetId, Namespace, ObjectId, Scope};

/// Inputs of one object listing page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ObjectListRequest {
    /// Namespace to list.
    pub namespace: Namespace,
    /// Matching objects to skip.
    pub cursor: Option<u64>,
    /// Page size; clamped.
    pub limit: Option<u64>,
    /// Only list objects with this type tag.
    pub type_tag: Option<u8>,
}

impl ObjectListRequest {
    /// First page of `namespace` with defaults.
    pub fn new(namespace: Namespace) -> Self {
        Self {
            namespace,
            cursor: None,
            limit: None,
            type_tag: None,
        }
    }
}

/// One listed object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ObjectEntry {
    /// Object id.
    pub object_id: ObjectId,
    /// Type tag.
    pub type_tag: u8,
    /// Human type name.
    pub type_name: &'static str,
    /// Header length.
    pub header_len: u32,
    /// Indirection levels, when shape metadata is readable.
    pub levels: Option<u8>,
}

/// One page of objects.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ObjectPage {
    /// Namespace label.
    pub scope: Scope,
    /// Dataset id for dataset-scoped listings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset_id: Option<DatasetId>,
    /// Cursor this page starts at.
    pub cursor: u64,
    /// Effective limit.
    pub limit: u64,
    /// Objects on this page.
    pub count: u64,
    /// Cursor of the next page.
    pub next: Option<u64>,
    /// Objects in ascending id order.
    pub objects: Vec<ObjectEntry>,
}

/// Lists objects of a namespace in ascending id order.
pub fn list_objects(
    pool: &dyn PoolAccess,
    limits: &ExploreLimits,
    request: &ObjectListRequest,
) -> Result<ObjectPage> {
    let page = PageRequest::new(request.cursor, request.limit, limits.objects);
    let mut collector = PageCollector::new(page);
    pool.iterate_objects(request.namespace, &mut |info| {
        if request.type_tag.is_some_and(|tag| tag != info.type_tag) {
            return ControlFlow::Continue(());
        }
        collector.offer(|_| *info)
    })
    .map_err(ProviderError::into_lookup_error)?;
    let collected = collector.finish()?;

    let mut objects = Vec::new();
    objects.try_reserve(collected.items.len())?;
    for info in &collected.items {
        let levels = pool
            .resolve_node(request.namespace, info.object)
            .ok()
            .map(|node| node.shape().levels);
        objects.push(entry(info, levels));
    }

    Ok(ObjectPage {
        scope: request.namespace.scope(),
        dataset_id: request.namespace.dataset(),
        cursor: page.cursor,
        limit: page.limit,
        count: collected.count,
        next: collected.next,
        objects,
    })
}

fn entry(info: &ObjectInfo, levels: Option<u8>) -> ObjectEntry {
    ObjectEntry {
        object_id: info.object,
        type_tag: info.type_tag,
        type_name: object_type_name(info.type_tag),
        header_len: info.header_len,
        levels,
    }
}

/// Metadata of one object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ObjectDescription {
    /// Namespace label.
    pub scope: Scope,
    /// Dataset id for dataset-scoped requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset_id: Option<DatasetId>,
    /// Object id.
    pub object_id: ObjectId,
    /// Type tag.
    pub type_tag: u8,
    /// Human type name.
    pub type_name: &'static str,
    /// Header length.
    pub header_len: u32,
    /// Whether the space-map views accept this object.
    pub is_space_map: bool,
    /// Root shape, when readable.
    pub shape: Option<ShapeSummary>,
}

/// Describes one object and, when available, its root shape.
pub fn describe_object(
    pool: &dyn PoolAccess,
    namespace: Namespace,
    object: ObjectId,
) -> Result<ObjectDescription> {
    let info = pool
        .object_info(namespace, object)
        .map_err(ProviderError::into_lookup_error)?;
    let shape = match pool.resolve_node(namespace, object) {
        Ok(node) => Some(ShapeSummary::of(node.shape())),
        Err(ProviderError::NoShape(_)) => None,
        Err(err) => {
            return Err(ExplorerError::internal(format!(
                "object {object} shape unreadable: {err}"
            )))
        }
    };
    Ok(ObjectDescription {
        scope: namespace.scope(),
        dataset_id: namespace.dataset(),
        object_id: object,
        type_tag: info.type_tag,
        type_name: object_type_name(info.type_tag),
        header_len: info.header_len,
        is_space_map: namespace == Namespace::Meta
            && info.type_tag == SPACE_MAP_TYPE
            && info.header_len >= SPACE_MAP_HEADER_MIN,
        shape,
    })
}
