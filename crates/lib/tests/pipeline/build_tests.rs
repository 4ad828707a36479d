//! End-to-end `build` pipeline tests.

use std::fs::{self, File};
use std::io::Read;

use pvbundle_lib::build::{BuildConfiguration, build_all};
use pvbundle_lib::package::PackagingError;
use pvbundle_lib::pipeline::{PipelineError, resolve_all, run_build};
use pvbundle_lib::run_lock::RunLock;
use pvbundle_lib::sign::SigningSetupError;
use pvbundle_lib::stage::{StagingError, stage};

use super::common::{Fixture, RELEASE_FILES, file_names, write_file, write_script};

#[tokio::test]
async fn release_contains_exactly_the_expected_files() {
  let f = Fixture::new();
  assert_eq!(f.set.non_installer().count(), 6);

  let summary = run_build(&f.set, &f.toolchain, &f.workspace, &f.options()).await.unwrap();

  let mut expected: Vec<String> = RELEASE_FILES.iter().map(|s| s.to_string()).collect();
  expected.push("win-pv-drivers.zip".to_string());
  expected.sort();
  assert_eq!(file_names(&f.output_dir()), expected);
  assert_eq!(summary.builds.results.len(), 6);
  assert!(summary.builds.is_success());
}

#[tokio::test]
async fn archive_reproduces_the_other_files() {
  let f = Fixture::new();

  let summary = run_build(&f.set, &f.toolchain, &f.workspace, &f.options()).await.unwrap();

  let mut archive = zip::ZipArchive::new(File::open(&summary.bundle.archive).unwrap()).unwrap();
  let mut names = Vec::new();
  for i in 0..archive.len() {
    let mut entry = archive.by_index(i).unwrap();
    let mut data = Vec::new();
    entry.read_to_end(&mut data).unwrap();
    let on_disk = fs::read(f.output_dir().join(entry.name())).unwrap();
    assert_eq!(data, on_disk, "{} differs from the archived copy", entry.name());
    names.push(entry.name().to_string());
  }
  assert_eq!(names, RELEASE_FILES);
}

#[tokio::test]
async fn installer_starts_after_every_component_finished() {
  let f = Fixture::new();

  let summary = run_build(&f.set, &f.toolchain, &f.workspace, &f.options()).await.unwrap();

  let latest = summary.builds.latest_finish().unwrap();
  assert!(summary.bundle.installer.started_at >= latest);
}

#[tokio::test]
async fn certificate_is_issued_for_the_manufacturer() {
  let f = Fixture::new();

  let summary = run_build(&f.set, &f.toolchain, &f.workspace, &f.options()).await.unwrap();

  assert_eq!(summary.certificate.subject.as_deref(), Some("XCP-ng(test)"));
  let cert = fs::read_to_string(f.output_dir().join("testsign.cer")).unwrap();
  assert_eq!(cert.trim(), "certificate for CN=XCP-ng(test)");
  let msi = fs::read_to_string(f.output_dir().join("managementagentx64.msi")).unwrap();
  assert!(msi.contains("certificate for CN=XCP-ng(test)"));
}

#[tokio::test]
async fn issued_key_is_removed_after_packaging() {
  let f = Fixture::new();

  let summary = run_build(&f.set, &f.toolchain, &f.workspace, &f.options()).await.unwrap();

  assert_eq!(f.key_removals(), vec!["-del -c -n XCP-ng(test) -s -r currentUser my"]);
  assert!(summary.run_dir.join("logs/sign-remove-key.log").exists());
}

#[tokio::test]
async fn issued_key_is_removed_when_packaging_fails() {
  let f = Fixture::new();
  write_script(&f.workspace.checkout("win-installer").join("build.sh"), "exit 7");

  let err = run_build(&f.set, &f.toolchain, &f.workspace, &f.options())
    .await
    .unwrap_err();

  assert!(matches!(err, PipelineError::Packaging(_)), "unexpected error: {err}");
  assert_eq!(f.key_removals().len(), 1);
}

#[tokio::test]
async fn failed_key_removal_fails_the_run() {
  let f = Fixture::new();
  write_script(
    &f.toolchain.sdk.as_ref().unwrap().join("bin/certmgr"),
    "echo access denied; exit 1",
  );

  let err = run_build(&f.set, &f.toolchain, &f.workspace, &f.options())
    .await
    .unwrap_err();

  assert!(matches!(err, PipelineError::Signing(SigningSetupError::RemoveFailed { .. })));
}

#[tokio::test]
async fn successful_run_discards_intermediates_but_keeps_logs() {
  let f = Fixture::new();

  let summary = run_build(&f.set, &f.toolchain, &f.workspace, &f.options()).await.unwrap();

  assert!(!summary.run_dir.join("staging").exists());
  assert!(!summary.run_dir.join("cert").exists());
  assert!(summary.run_dir.join("logs/build-win-xenbus.log").exists());
  assert!(summary.run_dir.join("logs/package-win-installer.log").exists());
}

#[tokio::test]
async fn staging_fills_every_required_destination() {
  let f = Fixture::new();
  let jobs = resolve_all(&f.set, &f.toolchain, &f.workspace).unwrap();
  let run = f.workspace.create_run().unwrap();

  let report = build_all(&jobs, BuildConfiguration::Free, &run).await;
  let tree = stage(&report.results, &f.set.layout, &f.workspace, &run.staging_dir()).unwrap();

  for entry in f.set.layout.required() {
    let dest = tree.root.join(&entry.dest);
    let staged: Vec<_> = fs::read_dir(&dest)
      .unwrap()
      .map(|e| e.unwrap().path())
      .filter(|p| fs::metadata(p).unwrap().len() > 0)
      .collect();
    assert!(
      !staged.is_empty(),
      "{} {} {} has nothing in {}",
      entry.component,
      entry.arch,
      entry.role,
      dest.display()
    );
  }
  assert!(tree.root.join("vmcleaner/vmcleaner.ps1").exists());
}

#[tokio::test]
async fn one_failed_component_is_named_and_installer_never_runs() {
  let f = Fixture::new();
  f.break_component("win-xenvif");

  let err = run_build(&f.set, &f.toolchain, &f.workspace, &f.options())
    .await
    .unwrap_err();

  let PipelineError::BuildsFailed(report) = &err else {
    panic!("unexpected error: {err}");
  };
  let failed: Vec<&str> = report.failures().map(|r| r.component.as_str()).collect();
  assert_eq!(failed, vec!["win-xenvif"]);
  assert_eq!(report.results.len(), 6);
  assert_eq!(err.stage(), "build");
  assert!(!f.installer_ran());
  assert!(!f.output_dir().exists());

  let log = &report.get("win-xenvif").unwrap().log_path;
  assert!(fs::read_to_string(log).unwrap().contains("compiler exploded"));
}

#[tokio::test]
async fn every_failed_component_is_reported_in_one_pass() {
  let f = Fixture::new();
  f.break_component("win-xenbus");
  f.break_component("win-xenguestagent");

  let err = run_build(&f.set, &f.toolchain, &f.workspace, &f.options())
    .await
    .unwrap_err();

  let PipelineError::BuildsFailed(report) = &err else {
    panic!("unexpected error: {err}");
  };
  let failed: Vec<&str> = report.failures().map(|r| r.component.as_str()).collect();
  assert_eq!(failed, vec!["win-xenbus", "win-xenguestagent"]);
}

#[tokio::test]
async fn failed_run_keeps_its_directory() {
  let f = Fixture::new();
  f.break_component("win-xennet");

  run_build(&f.set, &f.toolchain, &f.workspace, &f.options())
    .await
    .unwrap_err();

  let runs = f.runs();
  assert_eq!(runs.len(), 1);
  assert!(runs[0].join("logs/build-win-xennet.log").exists());
}

#[tokio::test]
async fn missing_installer_output_preserves_previous_release() {
  let f = Fixture::new();
  write_script(
    &f.workspace.checkout("win-installer").join("build.sh"),
    "mkdir -p installer && echo x64 > installer/managementagentx64.msi",
  );
  write_file(&f.output_dir().join("win-pv-drivers.zip"), "previous release");

  let err = run_build(&f.set, &f.toolchain, &f.workspace, &f.options())
    .await
    .unwrap_err();

  assert!(matches!(err, PipelineError::Packaging(PackagingError::MissingOutputs(ref m)) if m.len() == 2));
  assert_eq!(
    fs::read_to_string(f.output_dir().join("win-pv-drivers.zip")).unwrap(),
    "previous release"
  );
}

#[tokio::test]
async fn installer_outputs_of_an_earlier_run_are_not_shipped_again() {
  let f = Fixture::new();
  run_build(&f.set, &f.toolchain, &f.workspace, &f.options()).await.unwrap();
  let first = fs::read(f.output_dir().join("win-pv-drivers.zip")).unwrap();
  write_script(
    &f.workspace.checkout("win-installer").join("build.sh"),
    "[ -s \"$4\" ] || exit 5\nmkdir -p installer && echo x64 > installer/managementagentx64.msi",
  );

  let err = run_build(&f.set, &f.toolchain, &f.workspace, &f.options())
    .await
    .unwrap_err();

  assert!(matches!(err, PipelineError::Packaging(PackagingError::MissingOutputs(ref m)) if m.len() == 2));
  assert_eq!(fs::read(f.output_dir().join("win-pv-drivers.zip")).unwrap(), first);
}

#[tokio::test]
async fn component_artifacts_of_an_earlier_run_fail_staging() {
  let f = Fixture::new();
  run_build(&f.set, &f.toolchain, &f.workspace, &f.options()).await.unwrap();
  write_script(&f.workspace.checkout("win-xenbus").join("build.sh"), "true");
  fs::remove_file(f.workspace.checkout("win-installer").join("ran")).unwrap();

  let err = run_build(&f.set, &f.toolchain, &f.workspace, &f.options())
    .await
    .unwrap_err();

  assert!(
    matches!(err, PipelineError::Staging(StagingError::MissingArtifact { ref component, .. }) if component == "win-xenbus"),
    "unexpected error: {err}"
  );
  assert!(!f.installer_ran());
}

#[tokio::test]
async fn checked_configuration_reaches_component_builds() {
  let f = Fixture::new();
  let mut options = f.options();
  options.configuration = BuildConfiguration::Checked;

  let summary = run_build(&f.set, &f.toolchain, &f.workspace, &options).await.unwrap();

  let xenbus = summary.builds.get("win-xenbus").unwrap();
  let artifact = fs::read_to_string(&xenbus.artifacts[0].path).unwrap();
  assert!(artifact.trim_end().ends_with("checked"));
}

#[tokio::test]
async fn local_tree_and_certificate_skip_builds_and_issuance() {
  let f = Fixture::new();
  let tree = f.temp.path().join("prebuilt");
  write_file(&tree.join("xenbus/x64/xenbus.sys"), "prebuilt");
  let cert = f.temp.path().join("mine.cer");
  write_file(&cert, "my certificate");
  // Neither makecert nor the component builds may run
  fs::remove_file(f.toolchain.sdk.as_ref().unwrap().join("bin/makecert")).unwrap();
  f.break_component("win-xenbus");

  let mut options = f.options();
  options.local = Some(tree.clone());
  options.sign = Some(cert);
  let summary = run_build(&f.set, &f.toolchain, &f.workspace, &options).await.unwrap();

  assert!(summary.builds.results.is_empty());
  assert!(summary.staging.is_none());
  assert!(f.key_removals().is_empty());
  assert_eq!(
    fs::read_to_string(f.output_dir().join("testsign.cer")).unwrap(),
    "my certificate"
  );
  let inputs = fs::read_to_string(f.workspace.checkout("win-installer").join("inputs.txt")).unwrap();
  assert!(inputs.contains("xenbus.sys"));
}

#[tokio::test]
async fn concurrent_run_on_same_output_is_rejected() {
  let f = Fixture::new();
  let output = f.output_dir();
  let _held = RunLock::acquire(&RunLock::path_for_output(&output), &output, "build").unwrap();

  let err = run_build(&f.set, &f.toolchain, &f.workspace, &f.options())
    .await
    .unwrap_err();

  assert!(matches!(err, PipelineError::Lock(_)));
  assert!(!f.installer_ran());
}

#[tokio::test]
async fn missing_checkout_is_reported_per_component() {
  let f = Fixture::new();
  fs::remove_dir_all(f.workspace.checkout("win-xenvbd")).unwrap();

  let err = run_build(&f.set, &f.toolchain, &f.workspace, &f.options())
    .await
    .unwrap_err();

  let PipelineError::BuildsFailed(report) = &err else {
    panic!("unexpected error: {err}");
  };
  let failure = report.get("win-xenvbd").unwrap();
  assert!(failure.error().unwrap().to_string().contains("fetch"));
}
