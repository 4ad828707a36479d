//! Shared fixture for pipeline tests.
//!
//! Builds a workspace for the built-in registry where every component's
//! entry point is a shell script standing in for the real build, plus fake
//! toolchain roots with a setup script and the certificate utilities.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use pvbundle_lib::build::BuildConfiguration;
use pvbundle_lib::config::ToolchainConfig;
use pvbundle_lib::pipeline::BuildOptions;
use pvbundle_lib::registry::{RepositorySet, builtin};
use pvbundle_lib::workspace::Workspace;

pub const RELEASE_FILES: [&str; 4] = [
  "Setup.exe",
  "managementagentx64.msi",
  "managementagentx86.msi",
  "testsign.cer",
];

pub fn write_file(path: &Path, contents: &str) {
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent).unwrap();
  }
  fs::write(path, contents).unwrap();
}

pub fn write_script(path: &Path, body: &str) {
  write_file(path, &format!("#!/bin/sh\n{}\n", body));
  fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

/// Stand-in installer build: checks its inputs, then writes the release files.
const INSTALLER_SCRIPT: &str = r#"
[ "$1" = "--local" ] || exit 2
[ -d "$2" ] || exit 3
[ "$3" = "--sign" ] || exit 4
[ -s "$4" ] || exit 5
ls -R "$2" > inputs.txt
mkdir -p installer
for f in managementagentx64.msi managementagentx86.msi Setup.exe; do
  echo "$f signed with $(cat "$4")" > "installer/$f"
done
touch ran
"#;

/// Stand-in certificate utility: writes its last argument.
const MAKECERT_SCRIPT: &str = r#"
for last in "$@"; do :; done
echo "certificate for $6" > "$last"
"#;

/// Stand-in certificate manager: records its arguments, one call per line.
const CERTMGR_SCRIPT: &str = r#"echo "$@" >> "$(dirname "$0")/removed.txt""#;

pub struct Fixture {
  pub temp: TempDir,
  pub workspace: Workspace,
  pub set: RepositorySet,
  pub toolchain: ToolchainConfig,
}

impl Fixture {
  pub fn new() -> Self {
    let temp = TempDir::new().unwrap();
    let workspace = Workspace::new(temp.path().join("ws"));
    let mut set = builtin();

    for spec in &mut set.components {
      spec.entry = Some("./build.sh".to_string());
      let checkout = workspace.checkout(&spec.name);
      if spec.is_installer() {
        write_script(&checkout.join("build.sh"), INSTALLER_SCRIPT);
        write_file(&checkout.join("src/vmcleaner/vmcleaner.ps1"), "cleanup");
        continue;
      }

      // Produce one file per declared artifact; $1 is the configuration
      let mut body = String::from("sleep 0.2\n");
      for decl in &spec.artifacts {
        let path = decl.pattern.replace('*', "out");
        body.push_str(&format!(
          "mkdir -p \"$(dirname '{path}')\" && echo \"{} {path} $1\" > '{path}'\n",
          spec.name
        ));
      }
      write_script(&checkout.join("build.sh"), &body);
    }

    let tc = temp.path().join("toolchain");
    write_file(&tc.join("ewdk/SetupBuildEnv.sh"), "true\n");
    write_script(&tc.join("kit/bin/makecert"), MAKECERT_SCRIPT);
    write_script(&tc.join("kit/bin/certmgr"), CERTMGR_SCRIPT);
    fs::create_dir_all(tc.join("vs")).unwrap();
    fs::create_dir_all(tc.join("wix")).unwrap();

    let toolchain = ToolchainConfig {
      build_env: Some(tc.join("ewdk")),
      compiler: Some(tc.join("vs")),
      sdk: Some(tc.join("kit")),
      packaging: Some(tc.join("wix")),
    };

    Fixture {
      temp,
      workspace,
      set,
      toolchain,
    }
  }

  pub fn output_dir(&self) -> PathBuf {
    self.temp.path().join("output")
  }

  pub fn options(&self) -> BuildOptions {
    BuildOptions {
      output_dir: self.output_dir(),
      configuration: BuildConfiguration::Free,
      local: None,
      sign: None,
    }
  }

  /// Make a component's build fail.
  pub fn break_component(&self, name: &str) {
    write_script(
      &self.workspace.checkout(name).join("build.sh"),
      "echo \"compiler exploded\"\nexit 1",
    );
  }

  /// Whether the installer's entry point ever ran.
  pub fn installer_ran(&self) -> bool {
    self.workspace.checkout("win-installer").join("ran").exists()
  }

  /// Arguments of every certificate manager call so far.
  pub fn key_removals(&self) -> Vec<String> {
    let record = self.toolchain.sdk.as_ref().unwrap().join("bin/removed.txt");
    fs::read_to_string(record)
      .map(|s| s.lines().map(str::to_string).collect())
      .unwrap_or_default()
  }

  pub fn runs(&self) -> Vec<PathBuf> {
    let dir = self.workspace.scratch_dir().join("runs");
    let mut runs: Vec<PathBuf> = fs::read_dir(dir)
      .map(|entries| entries.map(|e| e.unwrap().path()).collect())
      .unwrap_or_default();
    runs.sort();
    runs
  }
}

/// Sorted file names directly inside `dir`.
pub fn file_names(dir: &Path) -> Vec<String> {
  let mut names: Vec<String> = fs::read_dir(dir)
    .unwrap()
    .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
    .collect();
  names.sort();
  names
}
