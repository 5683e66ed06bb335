//! Build command integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn build_runs_every_stage() {
  let env = TestEnv::from_fixture("c_project.toml").with_sources();

  env
    .kiln_cmd()
    .arg("build")
    .assert()
    .success()
    .stdout(predicate::str::contains("Build complete"))
    .stdout(predicate::str::contains("Commands run: 3"));

  let mut runs = env.runs();
  assert_eq!(runs.pop().as_deref(), Some("link debug"));
  runs.sort();
  assert_eq!(runs, vec!["compile a.c", "compile b.c"]);
  assert!(env.path("out/debug/obj/a.o").exists());
  assert!(env.path("out/debug/obj/b.o").exists());
  assert!(env.path("out/debug/app.stamp").exists());
}

#[test]
fn second_build_is_up_to_date() {
  let env = TestEnv::from_fixture("c_project.toml").with_sources();

  env.kiln_cmd().arg("build").assert().success();
  env
    .kiln_cmd()
    .arg("build")
    .assert()
    .success()
    .stdout(predicate::str::contains("Everything up to date"))
    .stdout(predicate::str::contains("Commands run: 0"));

  assert_eq!(env.runs().len(), 3);
}

#[test]
fn changed_source_rebuilds_only_that_target() {
  let env = TestEnv::from_fixture("c_project.toml").with_sources();
  env.kiln_cmd().arg("build").assert().success();

  env.bump("src/a.c");
  env.kiln_cmd().arg("build").assert().success();

  let runs = env.runs();
  assert_eq!(&runs[3..], &["compile a.c".to_string(), "link debug".to_string()]);
}

#[test]
fn release_flag_selects_configuration() {
  let env = TestEnv::from_fixture("c_project.toml").with_sources();

  env.kiln_cmd().args(["build", "--release", "-j", "1"]).assert().success();

  assert!(env.path("out/release/app.stamp").exists());
  assert_eq!(env.runs().last().map(String::as_str), Some("link release"));
}

#[test]
fn explicit_manifest_path() {
  let env = TestEnv::from_fixture("generate.toml");
  let elsewhere = tempfile::TempDir::new().unwrap();

  env
    .kiln_cmd()
    .current_dir(elsewhere.path())
    .arg("build")
    .arg("-f")
    .arg(&env.manifest_path)
    .assert()
    .success();

  assert_eq!(env.runs(), vec!["gen"]);
  assert!(env.path("build/debug/gen/.done").exists());
}

#[test]
fn json_output_reports_stages() {
  let env = TestEnv::from_fixture("generate.toml");

  let assert = env.kiln_cmd().args(["build", "--output", "json"]).assert().success();

  let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
  let summary: serde_json::Value = serde_json::from_str(&stdout).unwrap();
  assert_eq!(summary["stages"][0]["name"], "gen");
  assert_eq!(summary["stages"][0]["ran"], 1);
}

#[test]
fn failing_target_reports_output_and_exits_nonzero() {
  let env = TestEnv::from_fixture("failing.toml").with_sources();

  env
    .kiln_cmd()
    .arg("build")
    .assert()
    .failure()
    .stderr(predicate::str::contains("expected declaration"))
    .stderr(predicate::str::contains("1 of 2 target(s) failed"));

  assert!(env.path("build/debug/obj/a.o").exists());
  assert!(!env.path("build/debug/obj/b.o").exists());
  assert!(env.runs().is_empty(), "link must not run after a failed stage");
}

#[test]
fn invalid_manifest_is_fatal() {
  let env = TestEnv::from_fixture("missing_command.toml");

  env
    .kiln_cmd()
    .arg("build")
    .assert()
    .failure()
    .stderr(predicate::str::contains("missing required value 'command'"));
}
