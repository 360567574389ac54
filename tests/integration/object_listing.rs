#![allow(missing_docs)]

use poolscope::{
    explore::ObjectListRequest,
    provider::{MemoryLog, MemoryObject, MemoryPool, NodeShape, PointerRecord},
    types::{DatasetId, Namespace, ObjectId},
    ErrorCode, PoolSession,
};

const DATASET: DatasetId = DatasetId(54);

fn shaped(id: u64, type_tag: u8, levels: u8) -> MemoryObject {
    MemoryObject::new(id, type_tag).shape(NodeShape {
        levels,
        indirect_block_shift: 17,
        data_block_size: 131_072,
        max_block_id: 0,
        pointers: vec![PointerRecord {
            level: levels.saturating_sub(1),
            birth_txg: 4,
            ..PointerRecord::default()
        }],
        spill: None,
    })
}

fn session() -> PoolSession {
    let mut pool = MemoryPool::new("tank");
    for id in 1..=25u64 {
        let object = if id % 5 == 0 {
            MemoryObject::space_map(id, MemoryLog::new(0, 1 << 20))
        } else {
            shaped(id, 1, 1)
        };
        pool.insert(Namespace::Meta, object);
    }
    pool.add_dataset(DATASET);
    pool.insert(Namespace::Dataset(DATASET), shaped(1, 21, 1));
    pool.insert(Namespace::Dataset(DATASET), shaped(2, 20, 2));
    PoolSession::new(pool)
}

fn request(namespace: Namespace, cursor: u64, limit: u64) -> ObjectListRequest {
    ObjectListRequest {
        cursor: Some(cursor),
        limit: Some(limit),
        ..ObjectListRequest::new(namespace)
    }
}

#[test]
fn paging_visits_every_object_once() {
    let session = session();
    let mut seen = Vec::new();
    let mut cursor = 0;
    loop {
        let page = session.objects(&request(Namespace::Meta, cursor, 7)).unwrap();
        assert!(page.count <= 7);
        seen.extend(page.objects.iter().map(|o| o.object_id.0));
        match page.next {
            Some(next) => cursor = next,
            None => break,
        }
    }
    assert_eq!(seen, (1..=25).collect::<Vec<_>>());
}

#[test]
fn type_filter_selects_space_maps() {
    let session = session();
    let page = session
        .objects(&ObjectListRequest {
            type_tag: Some(8),
            ..request(Namespace::Meta, 0, 100)
        })
        .unwrap();
    let ids: Vec<_> = page.objects.iter().map(|o| o.object_id.0).collect();
    assert_eq!(ids, vec![5, 10, 15, 20, 25]);
    assert!(page.objects.iter().all(|o| o.type_name == "space map"));
    assert!(page.objects.iter().all(|o| o.levels.is_none()));
    assert_eq!(page.next, None);
}

#[test]
fn dataset_namespace_is_separate() {
    let session = session();
    let page = session
        .objects(&request(Namespace::Dataset(DATASET), 0, 10))
        .unwrap();
    assert_eq!(page.dataset_id, Some(DATASET));
    assert_eq!(page.count, 2);
    assert_eq!(page.objects[1].levels, Some(2));
    assert_eq!(page.objects[0].type_name, "master node");

    let err = session
        .objects(&request(Namespace::Dataset(DatasetId(99)), 0, 10))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);
}

#[test]
fn describe_reports_shape_and_kind() {
    let session = session();
    let desc = session.describe(Namespace::Meta, ObjectId(5)).unwrap();
    assert!(desc.is_space_map);
    assert!(desc.shape.is_none());

    let desc = session
        .describe(Namespace::Dataset(DATASET), ObjectId(2))
        .unwrap();
    assert!(!desc.is_space_map);
    let shape = desc.shape.unwrap();
    assert_eq!(shape.levels, 2);
    assert_eq!(shape.pointer_slots, 1);
    assert_eq!(shape.children_per_indirect, 1024);

    let err = session.describe(Namespace::Meta, ObjectId(26)).unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);
}

#[test]
fn oversized_limits_are_clamped() {
    let session = session();
    let page = session
        .objects(&request(Namespace::Meta, 0, u64::MAX))
        .unwrap();
    assert_eq!(page.limit, session.info().objects_limit_max);
    let page = session.objects(&request(Namespace::Meta, 0, 0)).unwrap();
    assert_eq!(page.limit, 1);
    assert_eq!(page.next, Some(1));
    let page = session
        .objects(&ObjectListRequest::new(Namespace::Meta))
        .unwrap();
    assert_eq!(page.limit, 200);
    assert_eq!(page.count, 25);
}
