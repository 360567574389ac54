#![allow(missing_docs)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use poolscope::{
    dashboard::build_router,
    provider::{
        ErrorLogEntry, ErrorLogSource, MemoryLog, MemoryObject, MemoryPool, NodeShape,
        PointerRecord, SpaceMapRecord, SpaceOp,
    },
    types::DatasetId,
    PoolSession,
};
use serde_json::Value;
use tower::ServiceExt;

fn record(offset: u64, length: u64, op: SpaceOp, txg: u64) -> SpaceMapRecord {
    SpaceMapRecord {
        offset,
        length,
        op,
        txg,
        sync_pass: 1,
        device_id: Some(0),
    }
}

fn router(origins: &[String]) -> Router {
    let log = MemoryLog::new(0, 1 << 20).records([
        record(0, 100, SpaceOp::Alloc, 5),
        record(100, 50, SpaceOp::Free, 6),
        record(8192, 4096, SpaceOp::Alloc, 7),
    ]);
    let shape = NodeShape {
        levels: 1,
        indirect_block_shift: 17,
        data_block_size: 512,
        max_block_id: 1,
        pointers: vec![
            PointerRecord {
                birth_txg: 3,
                ..PointerRecord::default()
            },
            PointerRecord::hole(0),
        ],
        spill: None,
    };
    let pool = MemoryPool::new("tank")
        .with_object(MemoryObject::space_map(31, log))
        .with_object(MemoryObject::new(34, 19).shape(shape.clone()))
        .with_dataset_object(DatasetId(54), MemoryObject::new(2, 20).shape(shape))
        .with_errors((1..=3).map(|object| ErrorLogEntry {
            source: if object == 3 {
                ErrorLogSource::Last
            } else {
                ErrorLogSource::Scrub
            },
            dataset_obj: 54,
            object,
            level: 0,
            block_id: 7,
            birth_txg: (object == 3).then_some(40),
            path: None,
        }));
    build_router(Arc::new(PoolSession::new(pool)), origins)
}

async fn get(router: Router, uri: &str) -> (StatusCode, Value) {
    let response = router
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn assert_failure(body: &Value, code: &str) {
    assert_eq!(body["error_code"], code, "body {body}");
    assert!(body["error_message"].as_str().is_some_and(|m| !m.is_empty()));
    assert!(body.get("payload").is_none());
}

#[tokio::test]
async fn health_and_pool_info() {
    let (status, body) = get(router(&[]), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["pool"], "tank");

    let (status, body) = get(router(&[]), "/api/pool").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["payload"]["name"], "tank");
    assert_eq!(body["payload"]["bin_size_min"], 512);
    assert_eq!(body["payload"]["ranges_limit_max"], 2000);
}

#[tokio::test]
async fn error_log_pages_through_query_params() {
    let (status, body) = get(router(&[]), "/api/errors?limit=2").await;
    assert_eq!(status, StatusCode::OK);
    let payload = &body["payload"];
    assert_eq!(payload["pool"], "tank");
    assert_eq!(payload["count"], 2);
    assert_eq!(payload["next"], 2);
    assert_eq!(payload["entries"][0]["source"], "scrub");
    assert!(payload["entries"][0]["birth_txg"].is_null());

    let (_, body) = get(router(&[]), "/api/errors?cursor=2&limit=2").await;
    let payload = &body["payload"];
    assert_eq!(payload["count"], 1);
    assert!(payload["next"].is_null());
    assert_eq!(payload["entries"][0]["source"], "last");
    assert_eq!(payload["entries"][0]["birth_txg"], 40);

    let (status, body) = get(router(&[]), "/api/errors?cursor=minus").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_failure(&body, "INVALID_ARGUMENT");
}

#[tokio::test]
async fn summary_payload_matches_contract() {
    let (status, body) = get(router(&[]), "/api/spacemap/31/summary").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.get("error_code").is_none());
    let payload = &body["payload"];
    assert_eq!(payload["alloc_bytes"], 4196);
    assert_eq!(payload["free_bytes"], 50);
    assert_eq!(payload["net_bytes"], 4146);
    assert_eq!(payload["range_entries"], 3);
    assert_eq!(payload["txg_min"], 5);
    assert_eq!(payload["txg_max"], 7);
}

#[tokio::test]
async fn ranges_page_through_query_params() {
    let (status, body) = get(router(&[]), "/api/spacemap/31/ranges?limit=2&op=alloc").await;
    assert_eq!(status, StatusCode::OK);
    let payload = &body["payload"];
    assert_eq!(payload["count"], 2);
    assert_eq!(payload["has_more"], false);
    assert_eq!(payload["filter"]["op"], "alloc");
    assert_eq!(payload["ranges"][1]["offset"], 8192);
    assert_eq!(payload["ranges"][1]["position"], 2);

    let (_, body) = get(router(&[]), "/api/spacemap/31/ranges?limit=1").await;
    assert_eq!(body["payload"]["next"], 1);
    let (_, body) = get(router(&[]), "/api/spacemap/31/ranges?cursor=1&limit=1").await;
    assert_eq!(body["payload"]["ranges"][0]["op"], "free");
}

#[tokio::test]
async fn bins_respect_bin_size() {
    let (status, body) = get(router(&[]), "/api/spacemap/31/bins?bin_size=4096&limit=4").await;
    assert_eq!(status, StatusCode::OK);
    let payload = &body["payload"];
    assert_eq!(payload["bin_size"], 4096);
    assert_eq!(payload["total_bins"], 256);
    assert_eq!(payload["next"], 4);
    assert_eq!(payload["bins"][0]["alloc_bytes"], 100);
    assert_eq!(payload["bins"][2]["alloc_bytes"], 4096);
}

#[tokio::test]
async fn block_tree_routes_cover_both_namespaces() {
    let (status, body) = get(router(&[]), "/api/obj/34/block-tree").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["payload"]["count"], 3);
    assert_eq!(body["payload"]["truncated"], false);
    assert_eq!(body["payload"]["nodes"][2]["is_hole"], true);

    let (status, body) = get(
        router(&[]),
        "/api/datasets/54/obj/2/block-tree?max_depth=2&max_nodes=2",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["payload"]["scope"], "dataset");
    assert_eq!(body["payload"]["dataset_id"], 54);
    assert_eq!(body["payload"]["count"], 2);
    assert_eq!(body["payload"]["truncated"], true);

    let (status, body) = get(router(&[]), "/api/datasets/54/objects").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["payload"]["objects"][0]["type_name"], "directory contents");
}

#[tokio::test]
async fn failures_use_the_error_envelope() {
    let (status, body) = get(router(&[]), "/api/spacemap/0/summary").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_failure(&body, "INVALID_ARGUMENT");

    let (status, body) = get(router(&[]), "/api/spacemap/abc/ranges").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_failure(&body, "INVALID_ARGUMENT");

    let (status, body) = get(router(&[]), "/api/spacemap/99/summary").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_failure(&body, "NOT_FOUND");

    let (status, body) = get(router(&[]), "/api/spacemap/34/bins").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_failure(&body, "UNSUPPORTED");

    let (status, body) = get(router(&[]), "/api/spacemap/31/ranges?txg_min=9&txg_max=2").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_failure(&body, "INVALID_ARGUMENT");

    let (status, body) = get(router(&[]), "/api/spacemap/31/ranges?limit=many").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_failure(&body, "INVALID_ARGUMENT");

    let (status, body) = get(router(&[]), "/api/datasets/0/objects").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_failure(&body, "INVALID_ARGUMENT");
}

#[tokio::test]
async fn cors_allows_configured_origins() {
    let router = router(&["http://localhost:5173/".to_string()]);
    let response = router
        .oneshot(
            Request::builder()
                .uri("/api/pool")
                .header(header::ORIGIN, "http://localhost:5173")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .and_then(|v| v.to_str().ok()),
        Some("http://localhost:5173")
    );
}
