use assert_cmd::Command;
use predicates::prelude::*;

fn bugtriage() -> Command {
    let mut cmd = Command::cargo_bin("bugtriage").unwrap();
    for var in [
        "BZ_API_KEY",
        "BZ_API_ROOT",
        "BUGTRIAGE_CONFIG",
        "PERNOSCO_USER",
        "PERNOSCO_GROUP",
        "PERNOSCO_USER_SECRET_KEY",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn help_lists_subcommands() {
    bugtriage()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("process"))
        .stdout(predicate::str::contains("export"));
}

#[test]
fn process_requires_a_bug_source() {
    bugtriage()
        .arg("process")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("required"));
}

#[test]
fn bugs_and_search_are_exclusive() {
    bugtriage()
        .args(["process", "--bugs", "1234", "--search", "search.json"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn missing_api_key_is_config_error() {
    bugtriage()
        .args(["process", "--bugs", "1234"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("BZ_API_KEY must be set"));
}

#[test]
fn missing_config_file_is_config_error() {
    bugtriage()
        .args(["process", "--bugs", "1234", "--config", "/nonexistent/bugtriage.toml"])
        .env("BZ_API_KEY", "test-key")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Config file not found"));
}

#[test]
fn offline_duplicate_is_closed_without_network() {
    let dir = tempfile::tempdir().unwrap();
    let record = dir.path().join("bug.json");
    std::fs::write(
        &record,
        r#"{
            "id": 1234,
            "status": "RESOLVED",
            "resolution": "DUPLICATE",
            "version": "Trunk",
            "whiteboard": "[bugmon:confirmed,verify]",
            "keywords": ["bugmon"],
            "comments": [{"id": 1, "text": "Crash", "creation_time": "2024-01-05T09:30:15Z"}]
        }"#,
    )
    .unwrap();

    bugtriage()
        .args(["-v", "process", "--dry-run", "--from-json"])
        .arg(&record)
        .env("BZ_API_KEY", "test-key")
        .env("BZ_API_ROOT", "http://127.0.0.1:9/rest")
        .assert()
        .success()
        .stderr(predicate::str::contains("No valid actions for resolution (DUPLICATE)."));
}

#[test]
fn export_requires_output() {
    bugtriage()
        .args(["export", "1234"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--output"));
}
