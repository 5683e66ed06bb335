//! Stale command integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn stale_lists_targets_without_running() {
  let env = TestEnv::from_fixture("c_project.toml").with_sources();

  env
    .kiln_cmd()
    .arg("stale")
    .assert()
    .success()
    .stdout(predicate::str::contains("compile [debug]: 2 of 2 stale"))
    .stdout(predicate::str::contains("src/a.c: missing"));

  assert!(env.runs().is_empty());
  assert!(!env.path("out").exists());
}

#[test]
fn stale_after_build_is_clean() {
  let env = TestEnv::from_fixture("c_project.toml").with_sources();
  env.kiln_cmd().arg("build").assert().success();

  env
    .kiln_cmd()
    .arg("stale")
    .assert()
    .success()
    .stdout(predicate::str::contains("Everything up to date"));
}

#[test]
fn stale_explains_newer_target() {
  let env = TestEnv::from_fixture("c_project.toml").with_sources();
  env.kiln_cmd().arg("build").assert().success();
  env.bump("src/b.c");

  env
    .kiln_cmd()
    .arg("stale")
    .assert()
    .success()
    .stdout(predicate::str::contains("compile [debug]: 1 of 2 stale"))
    .stdout(predicate::str::contains("src/b.c: newer than"));
}

#[test]
fn stale_json_output() {
  let env = TestEnv::from_fixture("generate.toml");

  let assert = env.kiln_cmd().args(["stale", "-o", "json"]).assert().success();

  let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
  let report: serde_json::Value = serde_json::from_str(&stdout).unwrap();
  assert_eq!(report[0]["name"], "gen");
  assert_eq!(report[0]["stale"].as_object().map(|m| m.len()), Some(1));
}
