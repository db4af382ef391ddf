//! CLI integration tests for every subcommand.
//!
//! Uses `assert_cmd` to spawn the `foursight` binary against a temporary
//! store directory and verify exit codes, stdout content, and stderr
//! content. No test reaches a real portal: environments either have no
//! manifest or point at a closed local port.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Helper: a `foursight` command rooted in `store`, isolated from any
/// `foursight.toml` in the working directory.
fn foursight(store: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("foursight");
    cmd.current_dir(store.path())
        .arg("--store-dir")
        .arg(store.path())
        .env("RUST_LOG", "off");
    cmd
}

/// Write an object the way the filesystem store lays it out.
fn put_object(root: &Path, bucket: &str, key: &str, body: &str) {
    let path = root.join(bucket).join(format!("{key}.obj"));
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, body).unwrap();
}

/// An environment whose portal and search URLs refuse connections.
fn write_unreachable_env(root: &Path, env: &str) {
    put_object(
        root,
        "foursight-envs",
        env,
        &format!(
            r#"{{"fourfront": "http://127.0.0.1:1", "es": "http://127.0.0.1:1", "ff_env": "fourfront-{env}"}}"#
        ),
    );
    put_object(
        root,
        "foursight-envs",
        &format!("{env}/access_key_admin"),
        r#"{"key": "KEY", "secret": "SECRET", "server": "http://127.0.0.1:1"}"#,
    );
}

// ──────────────────────────────────────────────
// 1. Help and version
// ──────────────────────────────────────────────

#[test]
fn help_exits_0_with_description() {
    let store = TempDir::new().unwrap();
    foursight(&store)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Foursight check-and-action runner"));
}

#[test]
fn version_exits_0() {
    let store = TempDir::new().unwrap();
    foursight(&store)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("foursight"));
}

// ──────────────────────────────────────────────
// 2. list
// ──────────────────────────────────────────────

#[test]
fn list_shows_builtin_checks_and_actions() {
    let store = TempDir::new().unwrap();
    foursight(&store)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("access_key_status"))
        .stdout(predicate::str::contains("-> refresh_access_keys"))
        .stdout(predicate::str::contains("wipe_build_indices"));
}

#[test]
fn list_json_describes_kinds_and_bindings() {
    let store = TempDir::new().unwrap();
    let output = foursight(&store)
        .args(["--output", "json", "list"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let entries: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let entries = entries.as_array().unwrap();
    let check = entries
        .iter()
        .find(|e| e["name"] == "access_key_status")
        .unwrap();
    assert_eq!(check["kind"], "check");
    assert_eq!(check["action"], "refresh_access_keys");
    let action = entries
        .iter()
        .find(|e| e["name"] == "refresh_access_keys")
        .unwrap();
    assert_eq!(action["kind"], "action");
}

// ──────────────────────────────────────────────
// 3. latest / history
// ──────────────────────────────────────────────

#[test]
fn latest_without_history_shows_placeholder() {
    let store = TempDir::new().unwrap();
    foursight(&store)
        .args(["latest", "access_key_status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Check has not yet run"));
}

#[test]
fn latest_primary_of_an_action_is_rejected() {
    let store = TempDir::new().unwrap();
    foursight(&store)
        .args(["latest", "refresh_access_keys", "--primary"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("is an action"));
}

#[test]
fn history_of_unknown_name_is_empty() {
    let store = TempDir::new().unwrap();
    foursight(&store)
        .args(["history", "never_ran"])
        .assert()
        .success()
        .stdout(predicate::str::contains("no results stored for never_ran"));
}

// ──────────────────────────────────────────────
// 4. run
// ──────────────────────────────────────────────

#[test]
fn run_unknown_check_exits_1() {
    let store = TempDir::new().unwrap();
    foursight(&store)
        .args(["run", "no_such_check"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("no check or action named 'no_such_check'"));
}

#[test]
fn run_action_directly_is_rejected() {
    let store = TempDir::new().unwrap();
    foursight(&store)
        .args(["run", "refresh_access_keys"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not check"));
}

#[test]
fn run_rejects_non_object_kwargs() {
    let store = TempDir::new().unwrap();
    foursight(&store)
        .args(["run", "access_key_status", "--kwargs", "[1]"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("must be a JSON object"));
}

#[test]
fn run_without_manifest_stores_an_error_result() {
    let store = TempDir::new().unwrap();
    foursight(&store)
        .args(["run", "access_key_status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ERROR"))
        .stdout(predicate::str::contains("could not connect to mastertest"));

    foursight(&store)
        .args(["latest", "access_key_status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("could not connect to mastertest"));

    assert!(store
        .path()
        .join("foursight-dev-mastertest")
        .join("access_key_status")
        .is_dir());
}

#[test]
fn run_against_unreachable_portal_warns() {
    let store = TempDir::new().unwrap();
    write_unreachable_env(store.path(), "mastertest");

    foursight(&store)
        .args(["run", "access_key_status", "--kwargs", r#"{"primary": true}"#])
        .assert()
        .success()
        .stdout(predicate::str::contains("access_key_status"))
        .stdout(predicate::str::contains("WARN"))
        .stdout(predicate::str::contains("refresh_access_keys").not());

    let output = foursight(&store)
        .args(["--output", "json", "latest", "access_key_status", "--primary"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let record: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(record["status"], "WARN");
    assert_eq!(record["kwargs"]["primary"], true);
}

#[test]
fn history_lists_runs_newest_first() {
    let store = TempDir::new().unwrap();
    for _ in 0..3 {
        foursight(&store)
            .args(["run", "access_key_status"])
            .assert()
            .success();
    }

    let output = foursight(&store)
        .args(["--output", "json", "history", "access_key_status", "--limit", "2"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let records: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let records = records.as_array().unwrap();
    assert_eq!(records.len(), 2);
    let first = records[0]["uuid"].as_str().unwrap();
    let second = records[1]["uuid"].as_str().unwrap();
    assert!(first > second, "{first} should be newer than {second}");
}

#[test]
fn env_flag_selects_the_results_bucket() {
    let store = TempDir::new().unwrap();
    foursight(&store)
        .args(["--env", "webprod", "run", "access_key_status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("could not connect to webprod"));
    assert!(store.path().join("foursight-dev-webprod").is_dir());
}

// ──────────────────────────────────────────────
// 5. worker
// ──────────────────────────────────────────────

#[test]
fn worker_once_runs_configured_checks() {
    let store = TempDir::new().unwrap();
    let config = store.path().join("foursight.toml");
    fs::write(
        &config,
        "[foursight]\nenv = \"staging\"\nstage = \"prod\"\n\n[worker]\nchecks = [\"access_key_status\"]\n",
    )
    .unwrap();

    foursight(&store)
        .args(["--config"])
        .arg(&config)
        .args(["worker", "--once"])
        .assert()
        .success()
        .stdout(predicate::str::contains("access_key_status"))
        .stdout(predicate::str::contains("could not connect to staging"));
    assert!(store.path().join("foursight-prod-staging").is_dir());
}

#[test]
fn worker_rejects_unknown_scheduled_check() {
    let store = TempDir::new().unwrap();
    fs::write(
        store.path().join("foursight.toml"),
        "[worker]\nchecks = [\"bogus\"]\n",
    )
    .unwrap();

    foursight(&store)
        .args(["worker", "--once"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("[worker] checks"));
}

#[test]
fn malformed_config_exits_1() {
    let store = TempDir::new().unwrap();
    let config = store.path().join("bad.toml");
    fs::write(&config, "[worker\n").unwrap();

    foursight(&store)
        .arg("--config")
        .arg(&config)
        .arg("list")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("could not parse"));
}

// ──────────────────────────────────────────────
// 6. envs
// ──────────────────────────────────────────────

#[test]
fn envs_lists_manifests_but_not_keys() {
    let store = TempDir::new().unwrap();
    write_unreachable_env(store.path(), "mastertest");
    write_unreachable_env(store.path(), "webdev");

    let output = foursight(&store)
        .args(["--output", "json", "envs"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let envs: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let names: Vec<&str> = envs
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["env"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["mastertest", "webdev"]);
    assert_eq!(envs[1]["ff_env"], "fourfront-webdev");
}

#[test]
fn envs_reports_empty_bucket() {
    let store = TempDir::new().unwrap();
    foursight(&store)
        .arg("envs")
        .assert()
        .success()
        .stdout(predicate::str::contains("no environments found"));
}
