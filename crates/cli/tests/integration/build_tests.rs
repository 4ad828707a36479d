//! Build command integration tests.

use std::fs::{self, File};
use std::io::Read;

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn build_produces_release_bundle() {
  let env = TestEnv::new();

  env
    .pvbundle_cmd()
    .arg("build")
    .assert()
    .success()
    .stdout(predicate::str::contains("Release written to"));

  let mut names: Vec<String> = fs::read_dir(env.output_path())
    .unwrap()
    .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
    .collect();
  names.sort();
  assert_eq!(
    names,
    vec![
      "Setup.exe",
      "managementagentx64.msi",
      "managementagentx86.msi",
      "testsign.cer",
      "win-pv-drivers.zip"
    ]
  );

  let mut archive = zip::ZipArchive::new(File::open(env.output_path().join("win-pv-drivers.zip")).unwrap()).unwrap();
  assert_eq!(archive.len(), 4);
  for i in 0..archive.len() {
    let mut entry = archive.by_index(i).unwrap();
    let mut data = Vec::new();
    entry.read_to_end(&mut data).unwrap();
    assert_eq!(fs::read(env.output_path().join(entry.name())).unwrap(), data);
  }
}

#[test]
fn build_takes_the_test_key_back_out_of_the_store() {
  let env = TestEnv::new();

  env.pvbundle_cmd().arg("build").assert().success();

  let removed = fs::read_to_string(env.toolchain("kit").join("bin/removed.txt")).unwrap();
  assert_eq!(removed.lines().count(), 1);
  assert!(removed.contains("-del -c -n XCP-ng(test)"));
}

#[test]
fn build_honours_output_option() {
  let env = TestEnv::new();
  let output = env.temp.path().join("release");

  env.pvbundle_cmd().arg("build").arg("--output").arg(&output).assert().success();

  assert!(output.join("win-pv-drivers.zip").exists());
  assert!(!env.output_path().exists());
}

#[test]
fn failed_component_is_listed_with_its_log() {
  let env = TestEnv::new();
  env.break_component("win-xenvif");

  env
    .pvbundle_cmd()
    .arg("build")
    .assert()
    .failure()
    .stderr(predicate::str::contains("win-xenvif [build]"))
    .stderr(predicate::str::contains("build-win-xenvif.log"))
    .stderr(predicate::str::contains("broken build"))
    .stderr(predicate::str::contains("build failed at build stage"));

  assert!(!env.workspace().join("win-installer/installer").exists());
  assert!(!env.output_path().exists());
}

#[test]
fn missing_packaging_root_fails_before_building() {
  let env = TestEnv::new();

  env
    .pvbundle_cmd()
    .env_remove("WIX")
    .arg("build")
    .assert()
    .failure()
    .stderr(predicate::str::contains("WIX"));

  assert!(!env.workspace().join(".pvbundle").exists());
  assert!(!env.workspace().join("win-xenbus/xenbus").exists());
}

#[test]
fn nonexistent_toolchain_root_is_reported() {
  let env = TestEnv::new();

  env
    .pvbundle_cmd()
    .env("VS", env.temp.path().join("no-such-dir"))
    .arg("build")
    .assert()
    .failure()
    .stderr(predicate::str::contains("VS points to"));
}

#[test]
fn supplied_certificate_is_shipped() {
  let env = TestEnv::new();
  let cert = env.temp.path().join("mine.cer");
  fs::write(&cert, "externally issued").unwrap();

  env
    .pvbundle_cmd()
    .env_remove("KIT")
    .arg("build")
    .arg("--sign")
    .arg(&cert)
    .assert()
    .success();

  assert_eq!(
    fs::read_to_string(env.output_path().join("testsign.cer")).unwrap(),
    "externally issued"
  );
}
