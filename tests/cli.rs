use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use assert_cmd::Command;
use tempfile::tempdir;

use ctiscan::cache::{CacheStore, SqliteCacheStore};
use ctiscan::models::{CachedEntity, EntityType, PlatformCacheSnapshot, PlatformFamily};

fn write_config(temp: &Path, family: &str, url: &str) -> PathBuf {
    let path = temp.join("config.yaml");
    let contents = format!(
        "platforms:\n  - id: test-1\n    family: {family}\n    url: {url}\n    token: test-token\ncache:\n  dir: {}\n",
        temp.join("cache").display()
    );
    fs::write(&path, contents).expect("failed to write config");
    path
}

fn ctiscan() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("ctiscan"));
    cmd.env_remove("CTISCAN_CONFIG")
        .env_remove("CTISCAN_FORMAT")
        .env_remove("CTISCAN_DEBUG");
    cmd
}

async fn seed_snapshot(temp: &Path) {
    let store = SqliteCacheStore::open_at(&temp.join("cache")).expect("open cache");
    let mut snapshot = PlatformCacheSnapshot::empty("test-1", PlatformFamily::Cti);
    snapshot.entities_by_type.insert(
        EntityType::Malware,
        vec![CachedEntity::new("m-1", "Emotet", EntityType::Malware, "test-1")],
    );
    snapshot.entities_by_type.insert(
        EntityType::Tool,
        vec![
            CachedEntity::new("t-1", "Cobalt Strike", EntityType::Tool, "test-1")
                .with_aliases(["Beacon"]),
        ],
    );
    snapshot.timestamp = Some(chrono::Utc::now());
    snapshot.last_refresh_succeeded = true;
    store.save_snapshot(&snapshot).await.expect("save snapshot");
}

#[test]
fn status_without_config_suggests_init() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    let config_path = temp.path().join("missing.yaml");

    ctiscan()
        .arg("status")
        .arg("--config")
        .arg(&config_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration not found"))
        .stdout(predicate::str::contains("ctiscan init"));

    Ok(())
}

#[test]
fn status_lists_configured_platform() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    let config_path = write_config(temp.path(), "cti", "https://cti.example.com");

    let assert = ctiscan()
        .arg("status")
        .arg("--config")
        .arg(&config_path)
        .assert()
        .success();

    let stdout = String::from_utf8_lossy(&assert.get_output().stdout);
    assert!(stdout.contains("test-1"));
    assert!(stdout.contains("not cached yet"));
    assert!(stdout.contains(&config_path.to_string_lossy().to_string()));

    Ok(())
}

#[tokio::test]
async fn scan_reports_cached_entities_as_json() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    let config_path = write_config(temp.path(), "cti", "https://cti.example.com");
    seed_snapshot(temp.path()).await;

    let assert = ctiscan()
        .arg("--config")
        .arg(&config_path)
        .arg("scan")
        .arg("--format")
        .arg("json")
        .write_stdin("The loader dropped a BEACON payload after Emotet ran.")
        .assert()
        .success();

    let output: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout)?;
    let records = output["data"].as_array().expect("data array");
    assert_eq!(records.len(), 2);

    let beacon = records
        .iter()
        .find(|r| r["entity_id"] == "t-1")
        .expect("tool match");
    assert_eq!(beacon["type"], "Tool");
    assert_eq!(beacon["name"], "Cobalt Strike");
    assert_eq!(beacon["matched_text"], "BEACON");
    assert_eq!(beacon["start_index"], 21);
    assert_eq!(beacon["end_index"], 27);

    assert!(records.iter().any(|r| r["name"] == "Emotet"));
    Ok(())
}

#[tokio::test]
async fn scan_excludes_types_from_command_line() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    let config_path = write_config(temp.path(), "cti", "https://cti.example.com");
    seed_snapshot(temp.path()).await;

    let report = temp.path().join("report.txt");
    fs::write(&report, "Emotet and Cobalt Strike")?;

    let assert = ctiscan()
        .arg("--config")
        .arg(&config_path)
        .arg("--format")
        .arg("json")
        .arg("scan")
        .arg(&report)
        .arg("--exclude-type")
        .arg("tool")
        .assert()
        .success();

    let output: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout)?;
    let records = output["data"].as_array().expect("data array");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["name"], "Emotet");
    Ok(())
}

#[test]
fn scan_without_snapshots_finds_nothing() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    let config_path = write_config(temp.path(), "cti", "https://cti.example.com");

    ctiscan()
        .arg("--config")
        .arg(&config_path)
        .arg("scan")
        .write_stdin("Emotet")
        .assert()
        .success()
        .stdout(predicate::str::contains("No matches found."));

    Ok(())
}

#[test]
fn scan_rejects_unknown_entity_type() {
    ctiscan()
        .arg("scan")
        .arg("--include-type")
        .arg("spaceship")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown entity type"));
}

#[test]
fn cache_path_uses_configured_dir() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    let config_path = write_config(temp.path(), "cti", "https://cti.example.com");

    ctiscan()
        .arg("cache")
        .arg("path")
        .arg("--config")
        .arg(&config_path)
        .assert()
        .success()
        .stdout(predicate::str::contains(
            temp.path().join("cache").to_string_lossy().to_string(),
        ));

    Ok(())
}

#[tokio::test]
async fn cache_clear_removes_one_platform() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    let config_path = write_config(temp.path(), "cti", "https://cti.example.com");
    seed_snapshot(temp.path()).await;

    ctiscan()
        .arg("cache")
        .arg("clear")
        .arg("--platform")
        .arg("test-1")
        .arg("--config")
        .arg(&config_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Cleared snapshot for test-1"));

    let store = SqliteCacheStore::open_at(&temp.path().join("cache"))?;
    assert!(store.load_snapshot("test-1").await?.is_none());
    Ok(())
}

#[test]
fn completion_generates_bash_script() {
    ctiscan()
        .arg("completion")
        .arg("bash")
        .assert()
        .success()
        .stdout(predicate::str::contains("ctiscan"));
}

#[test]
fn version_flag_prints_version() {
    ctiscan()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[cfg_attr(not(feature = "http-tests"), ignore)]
#[test]
fn refresh_then_scan_simulation_platform() -> Result<(), Box<dyn std::error::Error>> {
    let mut server = mockito::Server::new();

    let _endpoints = server
        .mock("GET", "/api/endpoints")
        .match_header("authorization", "Bearer test-token")
        .with_status(200)
        .with_body(r#"[{ "endpoint_id": "e-1", "endpoint_name": "Payroll Server" }]"#)
        .create();
    let mut empty = Vec::new();
    for path in [
        "/api/asset_groups",
        "/api/players",
        "/api/teams",
        "/api/attack_patterns",
        "/api/findings",
    ] {
        empty.push(server.mock("GET", path).with_status(200).with_body("[]").create());
    }

    let temp = tempdir()?;
    let config_path = write_config(temp.path(), "simulation", &server.url());

    let assert = ctiscan()
        .arg("--config")
        .arg(&config_path)
        .arg("--format")
        .arg("json")
        .arg("refresh")
        .assert()
        .success();
    let report: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout)?;
    assert_eq!(report["data"]["healthy"], true);
    assert_eq!(report["data"]["snapshots"][0]["entity_count"], 1);

    ctiscan()
        .arg("--config")
        .arg(&config_path)
        .arg("scan")
        .write_stdin("Lateral movement reached the payroll server overnight.")
        .assert()
        .success()
        .stdout(predicate::str::contains("Payroll Server"));

    Ok(())
}
