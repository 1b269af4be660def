//! Install, build and environment commands over a project with a linked
//! dependency.

use predicates::prelude::*;
use serial_test::serial;

use super::common::TestEnv;

#[test]
#[serial]
fn install_writes_the_lock() {
  let env = TestEnv::with_linked_dep("one");

  env
    .esy_cmd()
    .arg("install")
    .assert()
    .success()
    .stdout(predicate::str::contains("Installed 2 package(s)"));
  assert!(env.project_path().join("esy.lock/index.json").is_file());
}

#[test]
#[serial]
fn build_then_run_dependency_executable() {
  let env = TestEnv::with_linked_dep("one");

  env.esy_cmd().arg("install").assert().success();
  env
    .esy_cmd()
    .arg("build")
    .assert()
    .success()
    .stdout(predicate::str::contains("Build complete"))
    .stderr(predicate::str::contains("building dep@1.0.0"));

  env
    .esy_cmd()
    .args(["x", "hello-dep"])
    .assert()
    .success()
    .stdout(predicate::str::contains("one"));
}

#[test]
#[serial]
fn unchanged_sources_are_not_rebuilt() {
  let env = TestEnv::with_linked_dep("one");

  env.esy_cmd().arg("build").assert().success();
  env
    .esy_cmd()
    .arg("build")
    .assert()
    .success()
    .stderr(predicate::str::contains("building dep@1.0.0").not());
}

#[test]
#[serial]
fn changed_linked_sources_are_rebuilt() {
  let env = TestEnv::with_linked_dep("one");
  env.esy_cmd().arg("build").assert().success();

  env.write_hello("two");
  env
    .esy_cmd()
    .arg("build")
    .assert()
    .success()
    .stderr(predicate::str::contains("building dep@1.0.0"));

  env
    .esy_cmd()
    .args(["x", "hello-dep"])
    .assert()
    .success()
    .stdout(predicate::str::contains("two"));
}

#[test]
#[serial]
fn no_command_installs_and_builds() {
  let env = TestEnv::with_linked_dep("one");

  env
    .esy_cmd()
    .assert()
    .success()
    .stdout(predicate::str::contains("Installed 2 package(s)"))
    .stdout(predicate::str::contains("Build complete"));
  assert!(env.project_path().join("_esyinstall").exists());
}

#[test]
#[serial]
fn failing_build_reports_command_and_log() {
  let env = TestEnv::empty();
  env.write_file(
    "app/package.json",
    r#"{ "name": "app", "version": "0.1.0", "esy": { "build": "sh -c 'echo boom-output; exit 3'" } }"#,
  );

  env
    .esy_cmd()
    .arg("build")
    .assert()
    .failure()
    .stderr(predicate::str::contains("error while building app@0.1.0"))
    .stderr(predicate::str::contains("exit code: 3"))
    .stderr(predicate::str::contains("boom-output"));
}

#[test]
#[serial]
fn dependency_cycle_is_rejected() {
  let env = TestEnv::empty();
  env.write_file(
    "app/package.json",
    r#"{ "name": "app", "version": "0.1.0", "dependencies": { "a": "link:./a" } }"#,
  );
  env.write_file(
    "app/a/package.json",
    r#"{ "name": "a", "version": "1.0.0", "dependencies": { "b": "link:../b" } }"#,
  );
  env.write_file(
    "app/b/package.json",
    r#"{ "name": "b", "version": "1.0.0", "dependencies": { "a": "link:../a" } }"#,
  );

  env
    .esy_cmd()
    .arg("build")
    .assert()
    .failure()
    .stderr(predicate::str::contains("circular dependency"));
}

#[test]
#[serial]
fn status_reports_progress() {
  let env = TestEnv::with_linked_dep("one");

  env
    .esy_cmd()
    .args(["status", "--json"])
    .assert()
    .success()
    .stdout(predicate::str::contains("\"isProject\": true"))
    .stdout(predicate::str::contains("\"isProjectSolved\": false"));

  env.esy_cmd().arg("build").assert().success();
  env
    .esy_cmd()
    .args(["status", "--json"])
    .assert()
    .success()
    .stdout(predicate::str::contains("\"isProjectSolved\": true"))
    .stdout(predicate::str::contains("\"isProjectReadyForDev\": true"));
}

#[test]
#[serial]
fn build_plan_of_a_dependency() {
  let env = TestEnv::with_linked_dep("one");

  env
    .esy_cmd()
    .args(["build-plan", "-p", "dep"])
    .assert()
    .success()
    .stdout(predicate::str::contains("\"name\": \"dep\""))
    .stdout(predicate::str::contains("\"sourceType\": \"transient\""))
    .stdout(predicate::str::contains("hello-dep"));
}

#[test]
#[serial]
fn unknown_package_is_an_error() {
  let env = TestEnv::with_linked_dep("one");

  env
    .esy_cmd()
    .args(["build-env", "-p", "nope"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("nope"));
}

#[test]
#[serial]
fn build_env_exposes_builtins() {
  let env = TestEnv::with_linked_dep("one");

  env
    .esy_cmd()
    .args(["build-env", "--json"])
    .assert()
    .success()
    .stdout(predicate::str::contains("\"cur__name\": \"app\""));

  env
    .esy_cmd()
    .arg("build-env")
    .assert()
    .success()
    .stdout(predicate::str::contains("export cur__name="));
}

#[test]
#[serial]
fn external_command_runs_in_command_env() {
  let env = TestEnv::with_linked_dep("one");

  env
    .esy_cmd()
    .args(["sh", "-c", "echo name=$cur__name"])
    .assert()
    .success()
    .stdout(predicate::str::contains("name=app"));
}

#[test]
#[serial]
fn exit_code_of_x_is_propagated() {
  let env = TestEnv::with_linked_dep("one");

  env.esy_cmd().args(["x", "sh", "-c", "exit 7"]).assert().code(7);
}
