//! Clean command integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn clean_removes_output_and_forces_rebuild() {
  let env = TestEnv::from_fixture("c_project.toml").with_sources();
  env.kiln_cmd().arg("build").assert().success();

  env
    .kiln_cmd()
    .arg("clean")
    .assert()
    .success()
    .stdout(predicate::str::contains("Removed"));
  assert!(!env.root().join("out").exists());

  env
    .kiln_cmd()
    .arg("build")
    .assert()
    .success()
    .stdout(predicate::str::contains("Commands run: 3"));
}

#[test]
fn clean_without_output_is_a_no_op() {
  let env = TestEnv::from_fixture("generate.toml");

  env
    .kiln_cmd()
    .arg("clean")
    .assert()
    .success()
    .stdout(predicate::str::contains("Nothing to clean"));
}
