use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::prelude::*;
use chrono::Utc;
use predicates::str::contains;
use tempfile::TempDir;

use figsync_core::{config, Config, DocumentConfig, DocumentId, GeneratedFileSet, RetryPolicy};
use figsync_sync::snapshot_store::ChangeRequestRecord;
use figsync_sync::{FileSnapshotStore, PublishedSnapshot, SnapshotStore};

fn figsync_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("figsync"));
    cmd.env("HOME", home)
        .env("USERPROFILE", home)
        .env("NO_COLOR", "1")
        .env_remove("FIGSYNC_DESIGN_TOKEN")
        .env_remove("FIGSYNC_HOST_TOKEN")
        .env_remove("RUST_LOG");
    cmd
}

fn fixture() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/home_settings.json")
}

fn write_config(home: &Path, api: &str) {
    let mut config = Config::new("acme", "web");
    config.design.api_base = api.to_string();
    config.design.token = Some("figd_test".to_string());
    config.host.api_base = api.to_string();
    config.host.token = Some("ghp_test".to_string());
    config.publish.retry = RetryPolicy::none();
    config.documents.push(DocumentConfig {
        id: DocumentId::from("FILEKEY"),
        target_prefix: "src/design".to_string(),
        base_branch: Some("main".to_string()),
    });
    config::save_at(home, &config).expect("save config");
}

// ---------------------------------------------------------------------------
// generate
// ---------------------------------------------------------------------------

#[test]
fn generate_writes_files_under_out_dir() {
    let home = TempDir::new().expect("home");
    let out = TempDir::new().expect("out");

    figsync_cmd(home.path())
        .args(["generate", "--prefix", "src/design", "--input"])
        .arg(fixture())
        .arg("--out")
        .arg(out.path())
        .assert()
        .success()
        .stdout(contains("Generated 5 files from 'Mobile App'"));

    let root = out.path().join("src/design");
    for file in [
        "index.ts",
        "screens.json",
        "screens/home.tsx",
        "screens/settings.tsx",
        "tokens.ts",
    ] {
        assert!(root.join(file).is_file(), "missing {file}");
    }
    let manifest: Vec<String> =
        serde_json::from_str(&fs::read_to_string(root.join("screens.json")).unwrap()).unwrap();
    assert_eq!(manifest, vec!["Home", "Settings"]);
    let tokens = fs::read_to_string(root.join("tokens.ts")).unwrap();
    assert!(tokens.contains("#ffffff"), "{tokens}");
    let settings = fs::read_to_string(root.join("screens/settings.tsx")).unwrap();
    assert!(!settings.contains("Hidden banner"), "hidden nodes must be dropped");
}

#[test]
fn generate_without_out_only_lists_paths() {
    let home = TempDir::new().expect("home");
    figsync_cmd(home.path())
        .args(["generate", "--input"])
        .arg(fixture())
        .assert()
        .success()
        .stdout(contains("generates 5 files"))
        .stdout(contains("generated/design/screens/home.tsx"));
}

#[test]
fn generate_rejects_escaping_prefix() {
    let home = TempDir::new().expect("home");
    figsync_cmd(home.path())
        .args(["generate", "--prefix", "../outside", "--input"])
        .arg(fixture())
        .assert()
        .failure()
        .stderr(contains("invalid prefix"));
}

#[test]
fn generate_reports_malformed_input() {
    let home = TempDir::new().expect("home");
    let input = home.path().join("broken.json");
    fs::write(&input, r#"{"name": "No document"}"#).unwrap();
    figsync_cmd(home.path())
        .args(["generate", "--input"])
        .arg(&input)
        .assert()
        .failure()
        .stderr(contains("broken.json"));
}

// ---------------------------------------------------------------------------
// init / status
// ---------------------------------------------------------------------------

#[test]
fn status_without_config_points_to_init() {
    let home = TempDir::new().expect("home");
    figsync_cmd(home.path())
        .arg("status")
        .assert()
        .failure()
        .stderr(contains("figsync init"));
}

#[test]
fn init_then_status_json_lists_unpublished_document() {
    let home = TempDir::new().expect("home");
    figsync_cmd(home.path())
        .args([
            "init", "--owner", "acme", "--repo", "web", "--document", "FILEKEY", "--prefix",
            "src/design",
        ])
        .assert()
        .success()
        .stdout(contains("Initialized figsync for 'acme/web'"));
    assert!(config::config_path_at(home.path()).is_file());

    let output = figsync_cmd(home.path())
        .args(["status", "--json"])
        .output()
        .expect("run status");
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).expect("status json");
    assert_eq!(json["repository"], "acme/web");
    assert_eq!(json["documents"][0]["document"], "FILEKEY");
    assert_eq!(json["documents"][0]["prefix"], "src/design");
    assert!(json["documents"][0]["published_at"].is_null());
}

#[test]
fn init_twice_keeps_existing_config() {
    let home = TempDir::new().expect("home");
    write_config(home.path(), "http://127.0.0.1:9");
    figsync_cmd(home.path())
        .args(["init", "--owner", "other", "--repo", "repo"])
        .assert()
        .success()
        .stdout(contains("left unchanged"));
    let config = config::load_at(home.path()).unwrap();
    assert_eq!(config.host.owner, "acme");
}

#[test]
fn status_table_shows_last_publish() {
    let home = TempDir::new().expect("home");
    write_config(home.path(), "http://127.0.0.1:9");

    let mut files = GeneratedFileSet::new(figsync_core::TreeHash("abc".into()));
    files.insert("src/design/index.ts", "export {};\n");
    FileSnapshotStore::new(home.path())
        .put(&PublishedSnapshot {
            document: DocumentId::from("FILEKEY"),
            files,
            blobs: BTreeMap::new(),
            branch: "figsync/filekey/20240501T100000Z-abc-123456".to_string(),
            base_branch: "main".to_string(),
            change_request: Some(ChangeRequestRecord {
                number: 12,
                url: "https://github.test/acme/web/pull/12".to_string(),
            }),
            published_at: Utc::now(),
        })
        .unwrap();

    figsync_cmd(home.path())
        .arg("status")
        .assert()
        .success()
        .stdout(contains("FILEKEY"))
        .stdout(contains("#12"))
        .stdout(contains("just now"));
}

// ---------------------------------------------------------------------------
// sync --dry-run / diff against a mock design API
// ---------------------------------------------------------------------------

fn mock_design_api(server: &mut mockito::Server) -> mockito::Mock {
    server
        .mock("GET", "/v1/files/FILEKEY")
        .match_header("x-figma-token", "figd_test")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(fs::read_to_string(fixture()).unwrap())
        .create()
}

#[test]
fn dry_run_fetches_but_never_calls_the_host() {
    let home = TempDir::new().expect("home");
    let mut server = mockito::Server::new();
    write_config(home.path(), &server.url());
    let design = mock_design_api(&mut server);
    let host = server
        .mock("GET", mockito::Matcher::Regex("^/repos/".to_string()))
        .expect(0)
        .create();

    figsync_cmd(home.path())
        .args(["sync", "FILEKEY", "--dry-run"])
        .assert()
        .success()
        .stdout(contains("[dry-run]"))
        .stdout(contains("5 added, 0 modified, 0 removed"))
        .stdout(contains("src/design/tokens.ts"));

    design.assert();
    host.assert();
}

#[test]
fn diff_shows_every_file_as_added_before_first_publish() {
    let home = TempDir::new().expect("home");
    let mut server = mockito::Server::new();
    write_config(home.path(), &server.url());
    mock_design_api(&mut server);

    figsync_cmd(home.path())
        .args(["diff", "FILEKEY"])
        .assert()
        .success()
        .stdout(contains("+++ b/src/design/tokens.ts"))
        .stdout(contains("+++ b/src/design/screens/settings.tsx"));
}

#[test]
fn sync_of_unconfigured_document_fails() {
    let home = TempDir::new().expect("home");
    write_config(home.path(), "http://127.0.0.1:9");
    figsync_cmd(home.path())
        .args(["sync", "NOPE", "--dry-run"])
        .assert()
        .failure()
        .stderr(contains("NOPE"));
}

#[test]
fn unauthorized_design_token_fails_sync() {
    let home = TempDir::new().expect("home");
    let mut server = mockito::Server::new();
    write_config(home.path(), &server.url());
    server
        .mock("GET", "/v1/files/FILEKEY")
        .with_status(403)
        .with_body(r#"{"status":403,"err":"Invalid token"}"#)
        .create();
    let host = server
        .mock("POST", mockito::Matcher::Regex("^/repos/".to_string()))
        .expect(0)
        .create();

    figsync_cmd(home.path())
        .args(["sync", "FILEKEY"])
        .assert()
        .failure()
        .stderr(contains("sync failed for 'FILEKEY'"));
    host.assert();
}
