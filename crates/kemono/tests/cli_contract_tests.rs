//! CLI command contract tests
//!
//! Runs the `kemono` binary against a temp workspace holding a server
//! catalog and a config file.
//!
//! Contract guarantees tested:
//! - Deterministic exit codes
//! - Stable JSON schema in `--format json` mode
//! - No ANSI escapes in `--format plain` mode
//! - Actionable error messages for failure paths

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

// =============================================================================
// Test fixture helpers
// =============================================================================

/// Temp workspace with `servers.json` (45 servers, every third one "Lofi")
/// and a `kemono.toml` with short timings.
fn setup_workspace() -> TempDir {
    let dir = TempDir::new().expect("create temp dir");
    let servers: Vec<serde_json::Value> = (0..45)
        .map(|i| {
            let name = if i % 3 == 0 {
                format!("Lofi Lounge {i}")
            } else {
                format!("Pixel Club {i}")
            };
            serde_json::json!({ "id": format!("{}", 5000 + i), "name": name })
        })
        .collect();
    std::fs::write(
        dir.path().join("servers.json"),
        serde_json::to_string_pretty(&servers).expect("serialize catalog"),
    )
    .expect("write catalog");
    std::fs::write(
        dir.path().join("kemono.toml"),
        "[search]\nquiet_interval_ms = 50\n\n[paging]\npage_size = 20\nsettle_delay_ms = 10\n",
    )
    .expect("write config");
    dir
}

/// Build a kemono command configured for the given workspace.
#[allow(deprecated)]
fn kemono_cmd_for(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("kemono").expect("kemono binary should be built");
    cmd.current_dir(dir.path());
    cmd.env("KEMONO_CONFIG", dir.path().join("kemono.toml"));
    cmd.env_remove("RUST_LOG");
    cmd
}

/// Assert that output contains no ANSI escape sequences.
fn assert_no_ansi(output: &str, context: &str) {
    assert!(
        !output.contains("\x1b["),
        "{context}: output should not contain ANSI escapes, got:\n{output}"
    );
}

fn stdout_of(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn parse_json(output: &std::process::Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("stdout should be valid JSON")
}

// =============================================================================
// kemono browse contract tests
// =============================================================================

#[test]
fn contract_browse_first_page_plain() {
    let dir = setup_workspace();
    let output = kemono_cmd_for(&dir)
        .args(["browse", "--catalog", "servers.json"])
        .output()
        .expect("run browse");
    assert!(output.status.success());
    let stdout = stdout_of(&output);
    assert_no_ansi(&stdout, "browse plain");
    assert!(stdout.starts_with("Showing 20 of 45 servers"), "got:\n{stdout}");
    assert_eq!(stdout.lines().count(), 21);
}

#[test]
fn contract_browse_reveal_steps_json() {
    let dir = setup_workspace();
    for (steps, expected) in [(1, 40), (2, 45), (5, 45)] {
        let output = kemono_cmd_for(&dir)
            .args(["browse", "--catalog", "servers.json", "--format", "json"])
            .args(["--steps", &steps.to_string()])
            .output()
            .expect("run browse");
        assert!(output.status.success());
        let json = parse_json(&output);
        assert_eq!(json["mode"], "infinite_scroll");
        assert_eq!(json["backing_len"], 45);
        assert_eq!(json["visible_count"], expected, "steps={steps}");
        assert_eq!(json["servers"].as_array().map(Vec::len), Some(expected));
    }
}

#[test]
fn contract_browse_missing_catalog_is_actionable() {
    let dir = setup_workspace();
    kemono_cmd_for(&dir)
        .args(["browse", "--catalog", "missing.json"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("loading catalog"))
        .stderr(predicate::str::contains("To fix:"));
}

#[test]
fn contract_browse_duplicate_ids_rejected() {
    let dir = setup_workspace();
    std::fs::write(
        dir.path().join("dupes.json"),
        r#"[{"id":"1","name":"A"},{"id":"1","name":"B"}]"#,
    )
    .expect("write dupes");
    kemono_cmd_for(&dir)
        .args(["browse", "--catalog", "dupes.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("duplicate server id"))
        .stderr(predicate::str::contains("Remove or rename"));
}

// =============================================================================
// kemono search contract tests
// =============================================================================

#[test]
fn contract_search_pages_json() {
    let dir = setup_workspace();
    let output = kemono_cmd_for(&dir)
        .args(["search", "--catalog", "servers.json", "--format", "json", "pixel"])
        .output()
        .expect("run search");
    assert!(output.status.success());
    let json = parse_json(&output);
    assert_eq!(json["query"], "pixel");
    assert_eq!(json["total_results"], 30);
    assert_eq!(json["total_pages"], 2);
    assert_eq!(json["page"], 1);
    assert_eq!(json["servers"].as_array().map(Vec::len), Some(20));
}

#[test]
fn contract_search_page_is_clamped() {
    let dir = setup_workspace();
    let output = kemono_cmd_for(&dir)
        .args(["search", "--catalog", "servers.json", "--format", "json"])
        .args(["--page", "99", "pixel"])
        .output()
        .expect("run search");
    assert!(output.status.success());
    let json = parse_json(&output);
    assert_eq!(json["page"], 2);
    assert_eq!(json["servers"].as_array().map(Vec::len), Some(10));
}

#[test]
fn contract_search_plain_and_no_match() {
    let dir = setup_workspace();
    let output = kemono_cmd_for(&dir)
        .args(["search", "--catalog", "servers.json", "  LOFI  "])
        .output()
        .expect("run search");
    assert!(output.status.success());
    let stdout = stdout_of(&output);
    assert_no_ansi(&stdout, "search plain");
    assert!(stdout.starts_with("15 result(s) for \"LOFI\", page 1 of 1"), "got:\n{stdout}");

    kemono_cmd_for(&dir)
        .args(["search", "--catalog", "servers.json", "nothing-here"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No servers match"));
}

#[test]
fn contract_search_blank_query_is_rejected() {
    let dir = setup_workspace();
    for query in ["", "   "] {
        kemono_cmd_for(&dir)
            .args(["search", "--catalog", "servers.json", query])
            .assert()
            .failure()
            .code(1)
            .stdout(predicate::str::is_empty())
            .stderr(predicate::str::contains("search query is blank"))
            .stderr(predicate::str::contains("kemono browse"));
    }
}

// =============================================================================
// kemono watch contract tests
// =============================================================================

#[test]
fn contract_watch_burst_commits_final_text() {
    let dir = setup_workspace();
    let output = kemono_cmd_for(&dir)
        .args(["watch", "--catalog", "servers.json", "--format", "json"])
        .write_stdin("l\nlo\nlof\nlofi\n")
        .output()
        .expect("run watch");
    assert!(output.status.success());
    let stdout = stdout_of(&output);
    let records: Vec<serde_json::Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).expect("json line"))
        .collect();
    assert_eq!(records.len(), 1, "got:\n{stdout}");
    assert_eq!(records[0]["event"], "commit");
    assert_eq!(records[0]["query"], "lofi");
    assert_eq!(records[0]["total"], 15);
}

#[test]
fn contract_watch_empty_input_prints_nothing() {
    let dir = setup_workspace();
    kemono_cmd_for(&dir)
        .args(["watch", "--catalog", "servers.json"])
        .write_stdin("")
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

// =============================================================================
// kemono config contract tests
// =============================================================================

#[test]
fn contract_config_default_is_valid_toml() {
    let dir = setup_workspace();
    kemono_cmd_for(&dir)
        .args(["config", "--default"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[paging]"))
        .stdout(predicate::str::contains("quiet_interval_ms = 500"))
        .stdout(predicate::str::contains("mode = \"infinite_scroll\""));
}

#[test]
fn contract_config_reflects_file() {
    let dir = setup_workspace();
    kemono_cmd_for(&dir)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("quiet_interval_ms = 50"))
        .stdout(predicate::str::contains("settle_delay_ms = 10"));
}

#[test]
fn contract_invalid_config_is_actionable() {
    let dir = setup_workspace();
    std::fs::write(dir.path().join("kemono.toml"), "[paging]\npage_size = 0\n").expect("write");
    kemono_cmd_for(&dir)
        .arg("config")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("page_size must be at least 1"))
        .stderr(predicate::str::contains("To fix:"));
}

#[test]
fn contract_unknown_log_level_rejected() {
    let dir = setup_workspace();
    kemono_cmd_for(&dir)
        .args(["--log-level", "loud", "config"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("log_level"));
}

#[test]
fn contract_log_level_flag_overrides_bad_config_level() {
    let dir = setup_workspace();
    std::fs::write(
        dir.path().join("kemono.toml"),
        "[general]\nlog_level = \"loud\"\n",
    )
    .expect("write");
    kemono_cmd_for(&dir)
        .arg("config")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("general.log_level is not a known level"));
    kemono_cmd_for(&dir)
        .args(["--log-level", "warn", "config"])
        .assert()
        .success()
        .stdout(predicate::str::contains("log_level = \"warn\""));
}
