//! Binary smoke tests
//!
//! Each test runs in a scratch directory with HOME and XDG paths pointed at
//! it, so no user config is picked up and logs stay out of the real home.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn courtside(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("courtside").expect("binary built");
    cmd.current_dir(home.path())
        .env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path().join("config"))
        .env("XDG_DATA_HOME", home.path().join("data"))
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_categories_lists_taxonomy() {
    let home = TempDir::new().expect("Failed to create temp dir");
    courtside(&home)
        .arg("categories")
        .assert()
        .success()
        .stdout(predicate::str::contains("get_tools_by_category"))
        .stdout(predicate::str::contains("base"))
        .stdout(predicate::str::contains("boxscore"))
        .stdout(predicate::str::contains("franchise"));
}

#[test]
fn test_graph_lists_tasks_in_dependency_order() {
    let home = TempDir::new().expect("Failed to create temp dir");
    let output = courtside(&home).arg("graph").assert().success().get_output().stdout.clone();
    let text = String::from_utf8(output).expect("utf8 output");

    let position = |needle: &str| text.find(needle).unwrap_or_else(|| panic!("missing {}", needle));
    assert!(position("team_schedule (leaf)") < position("schedule (composite"));
    assert!(position("match_prediction (composite") < position("writer (composite"));
    assert!(text.contains("writer (composite, critic: writer_critic) <- [match_prediction, fan_narrative, rivalry]"));
}

#[test]
fn test_graph_json_output() {
    let home = TempDir::new().expect("Failed to create temp dir");
    let output = courtside(&home)
        .args(["graph", "--format", "json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let tasks: serde_json::Value = serde_json::from_slice(&output).expect("valid json");
    let tasks = tasks.as_array().expect("array of tasks");
    assert_eq!(tasks.len(), 11);
    assert_eq!(tasks.last().unwrap()["name"], "writer");
    assert_eq!(tasks.last().unwrap()["critic"], "writer_critic");
}

#[test]
fn test_run_without_api_key_fails() {
    let home = TempDir::new().expect("Failed to create temp dir");
    courtside(&home)
        .env_remove("OPENROUTER_API_KEY")
        .args(["run", "Celtics", "Knicks", "--date", "2025-01-15"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("OPENROUTER_API_KEY"));
}

#[test]
fn test_unknown_category_filter_rejected() {
    let home = TempDir::new().expect("Failed to create temp dir");
    courtside(&home)
        .args(["tools", "--category", "weather"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("weather"));
}
