#![allow(missing_docs)]

use std::fs;
use std::path::PathBuf;

use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::{json, Value};
use tempfile::TempDir;

fn setup_image(name: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join(format!("{name}.json"));
    let image = json!({
        "name": name,
        "objects": [
            {
                "id": 31,
                "type_tag": 8,
                "extent_log": {
                    "size": 1048576,
                    "records": [
                        {"offset": 0, "length": 100, "op": "alloc", "txg": 5, "sync_pass": 1, "device_id": 0},
                        {"offset": 100, "length": 50, "op": "free", "txg": 6, "sync_pass": 1, "device_id": 0},
                        {"offset": 4096, "length": 512, "op": "alloc", "txg": 7, "sync_pass": 1, "device_id": 0}
                    ]
                }
            },
            {
                "id": 34,
                "type_tag": 19,
                "shape": {
                    "levels": 1,
                    "indirect_block_shift": 17,
                    "data_block_size": 512,
                    "max_block_id": 1,
                    "pointers": [{"birth_txg": 3}, {"birth_txg": 4}]
                }
            }
        ],
        "errors": [
            {"source": "last", "dataset_obj": 54, "object": 9, "level": 0, "block_id": 2, "birth_txg": 77},
            {"source": "scrub", "dataset_obj": 54, "object": 8, "level": 0, "block_id": 1}
        ]
    });
    fs::write(&path, serde_json::to_vec(&image).unwrap()).expect("write image");
    (dir, path)
}

fn json_output(args: &[&str], image: &PathBuf) -> Value {
    let output = cargo_bin_cmd!("poolscope")
        .args(["--format", "json", "--image"])
        .arg(image)
        .args(args)
        .env_remove("POOLSCOPE_CONFIG")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    serde_json::from_slice(&output).expect("valid json")
}

#[test]
fn summary_emits_payload_envelope() {
    let (_dir, image) = setup_image("summary");
    let json = json_output(&["spacemap", "summary", "31"], &image);
    assert_eq!(json["payload"]["alloc_bytes"], 612);
    assert_eq!(json["payload"]["free_bytes"], 50);
    assert_eq!(json["payload"]["range_entries"], 3);
}

#[test]
fn ranges_honor_filters() {
    let (_dir, image) = setup_image("ranges");
    let json = json_output(
        &["spacemap", "ranges", "31", "--op", "alloc", "--limit", "1"],
        &image,
    );
    let payload = &json["payload"];
    assert_eq!(payload["count"], 1);
    assert_eq!(payload["next"], 1);
    assert_eq!(payload["ranges"][0]["op"], "alloc");
}

#[test]
fn bins_and_tree_render() {
    let (_dir, image) = setup_image("bins");
    let json = json_output(&["spacemap", "bins", "31", "--bin-size", "4096"], &image);
    assert_eq!(json["payload"]["total_bins"], 256);
    assert_eq!(json["payload"]["bins"][1]["alloc_bytes"], 512);

    let json = json_output(&["tree", "34", "--max-nodes", "2"], &image);
    assert_eq!(json["payload"]["count"], 2);
    assert_eq!(json["payload"]["truncated"], true);
}

#[test]
fn errors_page_scrub_log_first() {
    let (_dir, image) = setup_image("errors");
    let json = json_output(&["errors", "--limit", "1"], &image);
    let payload = &json["payload"];
    assert_eq!(payload["count"], 1);
    assert_eq!(payload["next"], 1);
    assert_eq!(payload["entries"][0]["source"], "scrub");
    assert_eq!(payload["entries"][0]["object"], 8);

    let json = json_output(&["errors", "--cursor", "1"], &image);
    assert_eq!(json["payload"]["entries"][0]["birth_txg"], 77);
    assert!(json["payload"]["next"].is_null());
}

#[test]
fn text_output_is_readable() {
    let (_dir, image) = setup_image("text");
    let output = cargo_bin_cmd!("poolscope")
        .args(["--theme", "plain", "--image"])
        .arg(&image)
        .args(["objects"])
        .env_remove("POOLSCOPE_CONFIG")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(output).expect("utf8");
    assert!(text.contains("space map"), "{text}");
    assert!(text.contains("end of listing"), "{text}");
}

#[test]
fn failures_exit_nonzero_with_error_envelope() {
    let (_dir, image) = setup_image("failure");
    let output = cargo_bin_cmd!("poolscope")
        .args(["--format", "json", "--image"])
        .arg(&image)
        .args(["spacemap", "summary", "34"])
        .env_remove("POOLSCOPE_CONFIG")
        .assert()
        .failure()
        .get_output()
        .stdout
        .clone();
    let json: Value = serde_json::from_slice(&output).expect("valid json");
    assert_eq!(json["error_code"], "UNSUPPORTED");
    assert!(json.get("payload").is_none());

    let stderr = cargo_bin_cmd!("poolscope")
        .arg("--image")
        .arg(&image)
        .args(["describe", "0"])
        .env_remove("POOLSCOPE_CONFIG")
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    assert!(String::from_utf8_lossy(&stderr).contains("INVALID_ARGUMENT"));
}

#[test]
fn missing_image_is_reported() {
    let dir = TempDir::new().expect("tempdir");
    let config = dir.path().join("config.toml");
    fs::write(&config, "[serve]\nport = 9000\n").unwrap();
    let stderr = cargo_bin_cmd!("poolscope")
        .arg("--config")
        .arg(&config)
        .args(["objects"])
        .env_remove("POOLSCOPE_IMAGE")
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    assert!(String::from_utf8_lossy(&stderr).contains("no pool image"));
}

#[test]
fn config_supplies_the_default_image() {
    let (dir, image) = setup_image("configured");
    let config = dir.path().join("config.toml");
    fs::write(
        &config,
        format!("[image]\ndefault = {:?}\n", image.display().to_string()),
    )
    .unwrap();
    let output = cargo_bin_cmd!("poolscope")
        .args(["--format", "json", "--config"])
        .arg(&config)
        .args(["pool"])
        .env_remove("POOLSCOPE_IMAGE")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json: Value = serde_json::from_slice(&output).expect("valid json");
    assert_eq!(json["payload"]["name"], "configured");
}

#[test]
fn completions_need_no_image() {
    let stdout = cargo_bin_cmd!("poolscope")
        .args(["completions", "bash"])
        .env_remove("POOLSCOPE_IMAGE")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    assert!(String::from_utf8_lossy(&stdout).contains("poolscope"));
}
