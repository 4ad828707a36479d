//! Shared test helpers for CLI integration tests.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

use pvbundle_lib::registry::{RepositorySet, builtin};

/// Stand-in installer build writing the three installer outputs.
const INSTALLER_SCRIPT: &str = r#"
[ -d "$2" ] && [ -s "$4" ] || exit 3
mkdir -p installer
for f in managementagentx64.msi managementagentx86.msi Setup.exe; do
  echo "$f" > "installer/$f"
done
"#;

const MAKECERT_SCRIPT: &str = r#"
for last in "$@"; do :; done
echo "test certificate" > "$last"
"#;

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

const CERTMGR_SCRIPT: &str = r#"echo "$@" >> "$(dirname "$0")/removed.txt""#;

/// Isolated test environment.
///
/// Holds a workspace whose components build with shell scripts, a registry
/// file pointing at those scripts, and fake toolchain roots.
pub struct TestEnv {
  pub temp: TempDir,
  pub set: RepositorySet,
}

impl TestEnv {
  pub fn new() -> Self {
    let temp = TempDir::new().unwrap();
    let mut set = builtin();

    for spec in &mut set.components {
      spec.entry = Some("./build.sh".to_string());
      let checkout = temp.path().join("ws").join(&spec.name);
      if spec.is_installer() {
        write_script(&checkout.join("build.sh"), INSTALLER_SCRIPT);
        write_file(&checkout.join("src/vmcleaner/readme.txt"), "cleaner");
        continue;
      }
      let mut body = String::new();
      for decl in &spec.artifacts {
        let path = decl.pattern.replace('*', "out");
        body.push_str(&format!("mkdir -p \"$(dirname '{path}')\" && echo {path} > '{path}'\n"));
      }
      write_script(&checkout.join("build.sh"), &body);
    }

    let env = TestEnv { temp, set };
    env.write_registry();
    write_file(&env.toolchain("ewdk").join("SetupBuildEnv.sh"), "true\n");
    write_script(&env.toolchain("kit").join("bin/makecert"), MAKECERT_SCRIPT);
    write_script(&env.toolchain("kit").join("bin/certmgr"), CERTMGR_SCRIPT);
    fs::create_dir_all(env.toolchain("vs")).unwrap();
    fs::create_dir_all(env.toolchain("wix")).unwrap();
    env
  }

  pub fn write_registry(&self) {
    write_file(&self.registry_path(), &serde_json::to_string_pretty(&self.set).unwrap());
  }

  pub fn registry_path(&self) -> PathBuf {
    self.temp.path().join("registry.json")
  }

  pub fn workspace(&self) -> PathBuf {
    self.temp.path().join("ws")
  }

  pub fn output_path(&self) -> PathBuf {
    self.workspace().join("output")
  }

  pub fn toolchain(&self, root: &str) -> PathBuf {
    self.temp.path().join("toolchain").join(root)
  }

  /// Replace a component's build with one that fails.
  pub fn break_component(&self, name: &str) {
    write_script(&self.workspace().join(name).join("build.sh"), "echo broken build\nexit 1");
  }

  /// Get a pre-configured Command for the pvbundle binary.
  ///
  /// Sets the workspace and registry and points `BUILD_ENV`, `VS`, `KIT`
  /// and `WIX` at the fake toolchain.
  pub fn pvbundle_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("pvbundle");
    cmd.env_remove("RUST_LOG");
    cmd.env("BUILD_ENV", self.toolchain("ewdk"));
    cmd.env("VS", self.toolchain("vs"));
    cmd.env("KIT", self.toolchain("kit"));
    cmd.env("WIX", self.toolchain("wix"));
    cmd.arg("--workspace").arg(self.workspace());
    cmd.arg("--registry").arg(self.registry_path());
    cmd
  }
}
