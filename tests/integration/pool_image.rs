#![allow(missing_docs)]

use std::fs;

use poolscope::{
    provider::{ImageError, PoolImage},
    types::{DatasetId, Namespace, ObjectId},
    ErrorCode, PoolSession,
};
use serde_json::json;
use tempfile::TempDir;

fn image() -> serde_json::Value {
    json!({
        "name": "tank",
        "objects": [
            {
                "id": 31,
                "type_tag": 8,
                "extent_log": {
                    "start": 0,
                    "size": 1048576,
                    "records": [
                        {"offset": 0, "length": 100, "op": "alloc", "txg": 5, "sync_pass": 1, "device_id": 0},
                        {"offset": 100, "length": 50, "op": "free", "txg": 6, "sync_pass": 1, "device_id": 0}
                    ]
                }
            },
            {
                "id": 34,
                "type_tag": 19,
                "shape": {
                    "levels": 2,
                    "indirect_block_shift": 8,
                    "data_block_size": 131072,
                    "max_block_id": 1,
                    "pointers": [{"level": 1, "birth_txg": 12, "fill": 2}]
                },
                "children": [
                    {"level": 0, "block_id": 0, "pointer": {"birth_txg": 11, "fill": 1}},
                    {"level": 0, "block_id": 1, "error": "checksum mismatch"}
                ]
            }
        ],
        "datasets": [
            {"id": 54, "objects": [{"id": 2, "type_tag": 20}]}
        ]
    })
}

fn write_image(dir: &TempDir, value: &serde_json::Value) -> std::path::PathBuf {
    let path = dir.path().join("pool.json");
    fs::write(&path, serde_json::to_vec_pretty(value).unwrap()).unwrap();
    path
}

#[test]
fn image_loads_into_a_session() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_image(&dir, &image());
    let session = PoolSession::open_image(&path).unwrap();
    assert_eq!(session.name(), "tank");

    let summary = session.spacemap_summary(ObjectId(31)).unwrap();
    assert_eq!(summary.alloc_bytes, 100);
    assert_eq!(summary.header.shift, 9);

    let tree = session
        .block_tree(&poolscope::explore::TreeRequest::new(
            Namespace::Meta,
            ObjectId(34),
        ))
        .unwrap();
    assert_eq!(tree.count, 3);
    assert_eq!(tree.skipped_children, 1);

    let page = session
        .objects(&poolscope::explore::ObjectListRequest::new(Namespace::Dataset(
            DatasetId(54),
        )))
        .unwrap();
    assert_eq!(page.count, 1);
}

#[test]
fn space_map_header_defaults_to_the_minimum() {
    let pool = PoolImage::from_json_str(&image().to_string()).unwrap();
    let session = PoolSession::new(pool.into_pool().unwrap());
    let desc = session.describe(Namespace::Meta, ObjectId(31)).unwrap();
    assert_eq!(desc.header_len, 24);
    assert!(desc.is_space_map);
}

#[test]
fn inconsistent_images_are_rejected() {
    let mut twice = image();
    twice["objects"][1]["id"] = json!(31);
    let err = PoolImage::from_json_str(&twice.to_string())
        .unwrap()
        .into_pool()
        .unwrap_err();
    assert!(matches!(err, ImageError::Invalid(_)), "{err}");

    let mut zero = image();
    zero["datasets"][0]["id"] = json!(0);
    assert!(matches!(
        PoolImage::from_json_str(&zero.to_string())
            .unwrap()
            .into_pool(),
        Err(ImageError::Invalid(_))
    ));

    let mut both = image();
    both["objects"][1]["children"][0]["error"] = json!("also broken");
    assert!(matches!(
        PoolImage::from_json_str(&both.to_string())
            .unwrap()
            .into_pool(),
        Err(ImageError::Invalid(_))
    ));

    let mut dataset_log = image();
    dataset_log["datasets"][0]["objects"][0]["extent_log"] = json!({"size": 4096});
    assert!(matches!(
        PoolImage::from_json_str(&dataset_log.to_string())
            .unwrap()
            .into_pool(),
        Err(ImageError::Invalid(_))
    ));
}

#[test]
fn unreadable_files_surface_io_and_parse_errors() {
    let dir = TempDir::new().expect("tempdir");
    let missing = PoolSession::open_image(dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(missing, ImageError::Io { .. }));

    let path = dir.path().join("garbage.json");
    fs::write(&path, "{ not json").unwrap();
    let garbage = PoolSession::open_image(&path).unwrap_err();
    assert!(matches!(garbage, ImageError::Parse(_)));
}

#[test]
fn failing_log_reports_internal() {
    let mut failing = image();
    failing["objects"][0]["extent_log"]["fail_after"] = json!(1);
    let pool = PoolImage::from_json_str(&failing.to_string())
        .unwrap()
        .into_pool()
        .unwrap();
    let err = PoolSession::new(pool)
        .spacemap_summary(ObjectId(31))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Internal);
}

#[test]
fn out_of_order_logs_are_rejected() {
    let mut unsorted = image();
    unsorted["objects"][0]["extent_log"] = json!({
        "size": 8192,
        "records": [
            {"offset": 4096, "length": 100, "op": "alloc", "txg": 5},
            {"offset": 0, "length": 100, "op": "alloc", "txg": 5}
        ]
    });
    let err = PoolImage::from_json_str(&unsorted.to_string())
        .unwrap()
        .into_pool()
        .unwrap_err();
    assert!(matches!(err, ImageError::Invalid(_)), "{err}");
    assert!(err.to_string().contains("precedes"), "{err}");
}

#[test]
fn ordered_log_bins_agree_with_summary() {
    let mut ordered = image();
    ordered["objects"][0]["extent_log"] = json!({
        "size": 8192,
        "records": [
            {"offset": 0, "length": 100, "op": "alloc", "txg": 5},
            {"offset": 4096, "length": 100, "op": "alloc", "txg": 5}
        ]
    });
    let pool = PoolImage::from_json_str(&ordered.to_string())
        .unwrap()
        .into_pool()
        .unwrap();
    let session = PoolSession::new(pool);
    let summary = session.spacemap_summary(ObjectId(31)).unwrap();
    let bins = session
        .spacemap_bins(&poolscope::explore::BinRequest {
            bin_size: Some(512),
            limit: Some(2),
            ..poolscope::explore::BinRequest::new(ObjectId(31))
        })
        .unwrap();
    assert_eq!(summary.alloc_bytes, 200);
    assert_eq!(bins.bins[0].alloc_bytes, 100);
    assert_eq!(bins.next, Some(2));
}
