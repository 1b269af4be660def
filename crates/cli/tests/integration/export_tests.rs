//! Export and import of built packages.

use predicates::prelude::*;
use serial_test::serial;

use super::common::TestEnv;

#[test]
#[serial]
fn export_then_import_dependencies() {
  let env = TestEnv::with_linked_dep("one");
  env.esy_cmd().arg("build").assert().success();

  env
    .esy_cmd()
    .arg("export-dependencies")
    .assert()
    .success()
    .stdout(predicate::str::contains("Exported 1 build(s)"));

  let export_dir = env.project_path().join("_export");
  let archives: Vec<_> = std::fs::read_dir(&export_dir)
    .unwrap()
    .map(|entry| entry.unwrap().path())
    .collect();
  assert_eq!(archives.len(), 1);
  let archive = &archives[0];
  assert!(archive.to_string_lossy().ends_with(".tar.gz"));

  env
    .esy_cmd()
    .arg("import-build")
    .arg(archive)
    .assert()
    .success()
    .stdout(predicate::str::contains("Imported dep-1.0.0-"));

  env
    .esy_cmd()
    .args(["x", "hello-dep"])
    .assert()
    .success()
    .stdout(predicate::str::contains("one"));
}

#[test]
#[serial]
fn import_from_a_list() {
  let env = TestEnv::with_linked_dep("one");
  env.esy_cmd().arg("build").assert().success();
  env.esy_cmd().arg("export-dependencies").assert().success();

  let export_dir = env.project_path().join("_export");
  let listing: String = std::fs::read_dir(&export_dir)
    .unwrap()
    .map(|entry| format!("{}\n", entry.unwrap().path().display()))
    .collect();
  env.write_file("imports.txt", &listing);

  env
    .esy_cmd()
    .arg("import-build")
    .arg("--from")
    .arg(env.temp.path().join("imports.txt"))
    .assert()
    .success()
    .stdout(predicate::str::contains("Imported"));
}

#[test]
#[serial]
fn export_build_of_a_store_path() {
  let env = TestEnv::with_linked_dep("one");
  env.esy_cmd().arg("build").assert().success();

  let install_root = env.project_path().join("_esy/default/store/i");
  let entry = std::fs::read_dir(&install_root)
    .unwrap()
    .map(|entry| entry.unwrap().path())
    .find(|path| path.file_name().unwrap().to_string_lossy().starts_with("dep-"))
    .unwrap();

  env
    .esy_cmd()
    .arg("export-build")
    .arg(&entry)
    .assert()
    .success()
    .stdout(predicate::str::contains("Exported dep-1.0.0-"));
  assert!(env.project_path().join("_export").is_dir());
}
