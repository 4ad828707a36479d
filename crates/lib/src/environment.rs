//! Per-component build environment resolution.
//!
//! [`resolve`] is a pure function of the component record and the validated
//! toolchain configuration: it touches neither the filesystem nor the process
//! environment, so two calls with the same inputs yield equal values.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::{ConfigError, ToolchainConfig, ToolchainRoot};
use crate::consts::SETUP_SCRIPT;
use crate::exec::Invocation;
use crate::registry::{ComponentSpec, EnvironmentKind};

/// How a command line is handed to the shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Launcher {
  pub program: String,
  /// Arguments placed before the command line.
  pub args: Vec<String>,
  /// Command chained in front of the build command, e.g. sourcing the setup script.
  pub prelude: Option<String>,
  /// The shell parses its command line itself; the line is passed through
  /// unescaped, wrapped in one pair of quotes (`cmd.exe /S /C "..."`).
  pub raw: bool,
}

impl Launcher {
  /// The shell used for plain commands.
  #[cfg(windows)]
  pub fn shell() -> Self {
    Launcher {
      program: "cmd.exe".to_string(),
      args: vec!["/S".to_string(), "/C".to_string()],
      prelude: None,
      raw: true,
    }
  }

  #[cfg(not(windows))]
  pub fn shell() -> Self {
    Launcher {
      program: "/bin/sh".to_string(),
      args: vec!["-c".to_string()],
      prelude: None,
      raw: false,
    }
  }

  /// The shell with the build environment setup script run first.
  pub fn with_setup_script(script: &Path) -> Self {
    Launcher {
      prelude: Some(source_command(script)),
      ..Self::shell()
    }
  }

  /// Program and full argument list for `command`.
  pub fn command_line(&self, command: &str) -> (String, Vec<String>) {
    let line = match &self.prelude {
      Some(prelude) => format!("{} && {}", prelude, command),
      None => command.to_string(),
    };
    let mut args = self.args.clone();
    if self.raw {
      args.push(format!("\"{}\"", line));
    } else {
      args.push(line);
    }
    (self.program.clone(), args)
  }
}

#[cfg(windows)]
fn source_command(script: &Path) -> String {
  format!("call {}", quote(script))
}

#[cfg(not(windows))]
fn source_command(script: &Path) -> String {
  format!(". {}", quote(script))
}

/// Quote a path for use inside a shell command line.
pub fn quote(path: &Path) -> String {
  format!("\"{}\"", path.display())
}

/// Everything needed to launch a component's build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildEnvironment {
  pub working_dir: PathBuf,
  /// Variables set on top of the inherited process environment.
  pub env: BTreeMap<String, String>,
  pub launcher: Launcher,
}

impl BuildEnvironment {
  /// A process invocation running `command` in this environment.
  pub fn invocation(&self, command: &str, log_path: PathBuf) -> Invocation {
    let (program, args) = self.launcher.command_line(command);
    Invocation {
      program,
      args,
      working_dir: self.working_dir.clone(),
      env: self.env.clone(),
      log_path,
      raw_args: self.launcher.raw,
    }
  }
}

/// Resolve the environment a component's build runs in.
///
/// The working directory is the component checkout below `workspace`. Every
/// configured toolchain root is exported under its conventional variable name.
pub fn resolve(
  spec: &ComponentSpec,
  config: &ToolchainConfig,
  workspace: &Path,
) -> Result<BuildEnvironment, ConfigError> {
  let launcher = match spec.kind {
    EnvironmentKind::Ewdk => {
      let build_env = config.require(ToolchainRoot::BuildEnv)?;
      Launcher::with_setup_script(&build_env.join(SETUP_SCRIPT))
    }
    EnvironmentKind::Native => {
      config.require(ToolchainRoot::Compiler)?;
      Launcher::shell()
    }
  };

  let mut env: BTreeMap<String, String> = config
    .exports()
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();
  env.insert("PVBUNDLE_COMPONENT".to_string(), spec.name.clone());

  Ok(BuildEnvironment {
    working_dir: workspace.join(&spec.name),
    env,
    launcher,
  })
}
