use httpmock::prelude::*;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn wls_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("wls");
    path
}

const FEED: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
  <item><title>Dune (2021)</title><guid>imdb://tt1160419</guid></item>
  <item><title>Heat (1995)</title><guid>https://www.imdb.com/title/tt0113277/</guid></item>
  <item><title>Severance (2022)</title><guid>tvdb://371980</guid><category>show</category></item>
</channel></rss>"#;

fn setup_test_env(plex_url: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let feed_path = root.join("watchlist.xml");
    fs::write(&feed_path, FEED).unwrap();

    let config_content = format!(
        r#"[store]
path = "{root}/data/watchlist.json"

[[feeds]]
url = "file://{feed}"
name = "local"

[library]
base_url = "{plex}"
token = "secret"
max_retries = 0
timeout_secs = 5
"#,
        root = root.display(),
        feed = feed_path.display(),
        plex = plex_url,
    );

    let config_path = config_dir.join("wls.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_wls(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = wls_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("PLEX_TOKEN")
        .env_remove("DISCORD_BOT_TOKEN")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run wls binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn empty_container() -> serde_json::Value {
    json!({ "MediaContainer": { "size": 0 } })
}

/// A Plex server holding only Dune.
fn mock_plex(server: &MockServer) {
    server.mock(|when, then| {
        when.method(GET)
            .path("/library/all")
            .query_param("guid", "imdb://tt1160419");
        then.status(200).json_body(json!({
            "MediaContainer": {
                "size": 1,
                "Metadata": [{
                    "title": "Dune",
                    "year": 2021,
                    "type": "movie",
                    "guid": "plex://movie/5d776b59ad5437001f79c6f8",
                    "Guid": [{ "id": "imdb://tt1160419" }, { "id": "tmdb://438631" }]
                }]
            }
        }));
    });
    for guid in ["imdb://tt0113277", "tvdb://371980"] {
        server.mock(|when, then| {
            when.method(GET).path("/library/all").query_param("guid", guid);
            then.status(200).json_body(empty_container());
        });
    }
    server.mock(|when, then| {
        when.method(GET).path("/search");
        then.status(200).json_body(empty_container());
    });
    server.mock(|when, then| {
        when.method(GET).path("/library/sections");
        then.status(200)
            .json_body(json!({ "MediaContainer": { "size": 0, "Directory": [] } }));
    });
}

#[test]
fn test_init_creates_store() {
    let (tmp, config_path) = setup_test_env("http://127.0.0.1:9");

    let (stdout, stderr, success) = run_wls(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Store created"));
    assert!(tmp.path().join("data/watchlist.json").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env("http://127.0.0.1:9");

    let (_, _, success1) = run_wls(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (stdout, _, success2) = run_wls(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
    assert!(stdout.contains("already exists"));
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_wls(&tmp.path().join("nope.toml"), &["status"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_status_on_empty_store() {
    let (_tmp, config_path) = setup_test_env("http://127.0.0.1:9");

    let (stdout, _, success) = run_wls(&config_path, &["status"]);
    assert!(success);
    assert!(stdout.contains("Pending:     0 movies, 0 shows"));
    assert!(stdout.contains("No entries."));
}

#[test]
fn test_feeds_lists_item_counts() {
    let (_tmp, config_path) = setup_test_env("http://127.0.0.1:9");

    let (stdout, stderr, success) = run_wls(&config_path, &["feeds"]);
    assert!(success, "feeds failed: {}", stderr);
    assert!(stdout.contains("local"));
    assert!(stdout.contains(" 3 "), "Expected 3 items, got: {}", stdout);
    assert!(stdout.contains("OK"));
}

#[test]
fn test_sync_dry_run_does_not_write() {
    let server = MockServer::start();
    mock_plex(&server);
    let (tmp, config_path) = setup_test_env(&server.base_url());

    let (stdout, stderr, success) = run_wls(&config_path, &["sync", "--dry-run"]);
    assert!(success, "sync failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("[dry run]"));
    assert!(stdout.contains("items: 3, added: 1"));
    assert!(!tmp.path().join("data/watchlist.json").exists());
}

#[test]
fn test_sync_then_status() {
    let server = MockServer::start();
    mock_plex(&server);
    let (_tmp, config_path) = setup_test_env(&server.base_url());

    let (stdout, stderr, success) = run_wls(&config_path, &["sync"]);
    assert!(success, "sync failed: stdout={}, stderr={}", stdout, stderr);
    assert!(
        stdout.contains("items: 3, added: 1, demoted: 0, removed: 0, pending: 2"),
        "unexpected report: {}",
        stdout
    );

    let (stdout, _, _) = run_wls(&config_path, &["status", "--status", "added"]);
    assert!(stdout.contains("Dune"));
    assert!(!stdout.contains("Heat"));

    let (stdout, _, _) = run_wls(&config_path, &["status", "--type", "show"]);
    assert!(stdout.contains("Severance"));
    assert!(stdout.contains("Pending:     1 movies, 1 shows"));

    // Nothing changed upstream: a second sync announces nothing new.
    let (stdout, _, success) = run_wls(&config_path, &["sync"]);
    assert!(success);
    assert!(stdout.contains("items: 3, added: 0, demoted: 0, removed: 0, pending: 2"));
}

#[test]
fn test_check_reports_verdicts() {
    let server = MockServer::start();
    mock_plex(&server);
    let (_tmp, config_path) = setup_test_env(&server.base_url());

    let (stdout, stderr, success) = run_wls(
        &config_path,
        &["check", "Dune", "--year", "2021", "--provider", "IMDB", "--id", "tt1160419"],
    );
    assert!(success, "check failed: {}", stderr);
    assert!(stdout.contains("index-lookup"));
    assert!(stdout.contains("in library as \"Dune\""));

    let (stdout, _, success) = run_wls(
        &config_path,
        &["check", "Heat", "--year", "1995", "--provider", "imdb", "--id", "tt0113277"],
    );
    assert!(success);
    assert!(stdout.contains("not in library"));
}

#[test]
fn test_check_rejects_provider_without_id() {
    let (_tmp, config_path) = setup_test_env("http://127.0.0.1:9");
    let (_, _, success) = run_wls(&config_path, &["check", "Dune", "--provider", "imdb"]);
    assert!(!success);
}
