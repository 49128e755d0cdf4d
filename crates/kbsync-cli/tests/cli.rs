//! CLI integration tests that need no network: config loading, bot
//! selection errors, listings and the local store.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn write_config(dir: &Path, extra: &str) -> PathBuf {
    let db = dir.join("kbsync.db");
    let content = format!(
        r#"
[jira]
server = "http://127.0.0.1:9"
username = "bot"
password = "secret"
parent_query = "project = FB"

[store]
path = "{}"

[retry]
max_attempts = 1
base_delay_ms = 0

[classifiers.support]
kind = "ai_bot_platform"
url = "http://127.0.0.1:9/bot"
app_id = "app"
user_email = "bot@example.com"

[classifiers.kb]
kind = "alpha_knowledge"
url = "http://127.0.0.1:9"
expert_id = "7"
api_key = "key"
{extra}"#,
        db.display().to_string().replace('\\', "/")
    );
    let path = dir.join("kbsync.toml");
    std::fs::write(&path, content).expect("write config");
    path
}

fn kbsync(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("kbsync").expect("binary");
    cmd.current_dir(dir)
        .env_remove("KBSYNC_LOG")
        .env_remove("KBSYNC_JIRA_PASSWORD")
        .env_remove("CLASSIFIER_BOT_APP_SECRET")
        .env_remove("SUMMARIZER_BOT_APP_SECRET");
    cmd
}

#[test]
fn bots_lists_classifiers_and_simulated_default() {
    let dir = TempDir::new().expect("tempdir");
    write_config(dir.path(), "");

    kbsync(dir.path())
        .arg("bots")
        .assert()
        .success()
        .stdout(predicate::str::contains("support"))
        .stdout(predicate::str::contains("AI Bot Platform"))
        .stdout(predicate::str::contains("Alpha Knowledge"))
        .stdout(predicate::str::contains("simulated"));
}

#[test]
fn bots_json_reports_kinds() {
    let dir = TempDir::new().expect("tempdir");
    write_config(dir.path(), "");

    let out = kbsync(dir.path())
        .args(["bots", "--json"])
        .output()
        .expect("run");
    assert!(out.status.success());

    let listing: serde_json::Value = serde_json::from_slice(&out.stdout).expect("json");
    let classifiers = listing["classifiers"].as_array().expect("classifiers");
    assert_eq!(classifiers.len(), 2);
    assert_eq!(classifiers[0]["name"], "kb");
    assert_eq!(classifiers[0]["kind"], "alpha_knowledge");
    assert_eq!(classifiers[0]["updates_in_place"], false);
    assert_eq!(classifiers[1]["kind"], "ai_bot_platform");
    assert_eq!(classifiers[1]["updates_in_place"], true);
    assert_eq!(listing["simulated_default"], true);
}

#[test]
fn explicit_config_path_is_honored() {
    let dir = TempDir::new().expect("tempdir");
    let config = write_config(dir.path(), "");
    let elsewhere = TempDir::new().expect("tempdir");

    kbsync(elsewhere.path())
        .arg("--config")
        .arg(&config)
        .arg("bots")
        .assert()
        .success()
        .stdout(predicate::str::contains("support"));
}

#[test]
fn unknown_classifier_fails_before_any_request() {
    let dir = TempDir::new().expect("tempdir");
    write_config(dir.path(), "");

    kbsync(dir.path())
        .args(["--classifier-bot", "nope", "update"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E1004"))
        .stderr(predicate::str::contains("kb, support"));

    assert!(!dir.path().join("kbsync.db").exists());
}

#[test]
fn unknown_summarizer_fails() {
    let dir = TempDir::new().expect("tempdir");
    write_config(dir.path(), "");

    kbsync(dir.path())
        .args(["--summarizer-bot", "ghost", "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E1004"));
}

#[test]
fn resize_without_classifier_is_rejected() {
    let dir = TempDir::new().expect("tempdir");
    write_config(dir.path(), "");

    kbsync(dir.path())
        .args(["resize", "5"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E1005"));
}

#[test]
fn errors_render_as_json_with_json_flag() {
    let dir = TempDir::new().expect("tempdir");
    write_config(dir.path(), "");

    let out = kbsync(dir.path())
        .args(["--json", "resize", "5"])
        .output()
        .expect("run");
    assert!(!out.status.success());

    let body: serde_json::Value = serde_json::from_slice(&out.stderr).expect("json error");
    assert_eq!(body["error"]["error_code"], "E1005");
}

#[test]
fn missing_config_reports_not_found() {
    let dir = TempDir::new().expect("tempdir");

    kbsync(dir.path())
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("E1001"));
}

#[test]
fn missing_password_is_a_missing_field() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_config(dir.path(), "");
    let content = std::fs::read_to_string(&path).expect("read");
    std::fs::write(&path, content.replace("password = \"secret\"\n", "")).expect("write");

    kbsync(dir.path())
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("E1003"))
        .stderr(predicate::str::contains("jira.password"));
}

#[test]
fn password_can_come_from_env() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_config(dir.path(), "");
    let content = std::fs::read_to_string(&path).expect("read");
    std::fs::write(&path, content.replace("password = \"secret\"\n", "")).expect("write");

    kbsync(dir.path())
        .env("KBSYNC_JIRA_PASSWORD", "from-env")
        .arg("status")
        .assert()
        .success();
}

#[test]
fn status_on_fresh_store_is_empty() {
    let dir = TempDir::new().expect("tempdir");
    write_config(dir.path(), "");

    let out = kbsync(dir.path())
        .args(["status", "--json"])
        .output()
        .expect("run");
    assert!(out.status.success());

    let status: serde_json::Value = serde_json::from_slice(&out.stdout).expect("json");
    assert_eq!(status["tickets"], 0);
    assert_eq!(status["bots"].as_array().map(Vec::len), Some(0));
    assert!(dir.path().join("kbsync.db").exists());
}

#[test]
fn completions_emit_a_script() {
    let dir = TempDir::new().expect("tempdir");

    kbsync(dir.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("kbsync"));
}
