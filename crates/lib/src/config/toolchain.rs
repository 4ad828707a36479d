//! Toolchain roots supplied through the environment.
//!
//! Each root is read from the variable its toolchain conventionally uses.
//! Unset variables fall back to the default install locations on Windows,
//! which mirrors what the toolchains' own installers set up.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use super::ConfigError;
use crate::consts::{CERT_MANAGER, CERT_TOOL, SETUP_SCRIPT};
use crate::registry::{EnvironmentKind, RepositorySet};

/// One externally installed toolchain location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolchainRoot {
  /// Directory holding the build environment setup script.
  BuildEnv,
  /// Primary compiler toolchain root.
  Compiler,
  /// Platform SDK root; holds the certificate utility.
  Sdk,
  /// Packaging toolchain root, used by the installer build.
  Packaging,
}

impl ToolchainRoot {
  pub const ALL: [ToolchainRoot; 4] = [
    ToolchainRoot::BuildEnv,
    ToolchainRoot::Compiler,
    ToolchainRoot::Sdk,
    ToolchainRoot::Packaging,
  ];

  /// The environment variable the root is read from and exported as.
  pub fn env_var(&self) -> &'static str {
    match self {
      ToolchainRoot::BuildEnv => "BUILD_ENV",
      ToolchainRoot::Compiler => "VS",
      ToolchainRoot::Sdk => "KIT",
      ToolchainRoot::Packaging => "WIX",
    }
  }
}

impl fmt::Display for ToolchainRoot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.env_var())
  }
}

/// The set of toolchain roots, validated once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ToolchainConfig {
  pub build_env: Option<PathBuf>,
  pub compiler: Option<PathBuf>,
  pub sdk: Option<PathBuf>,
  pub packaging: Option<PathBuf>,
}

impl ToolchainConfig {
  /// Read every root from its environment variable. Empty values count as unset.
  pub fn from_env() -> Self {
    let read = |root: ToolchainRoot| {
      std::env::var_os(root.env_var())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
    };

    ToolchainConfig {
      build_env: read(ToolchainRoot::BuildEnv),
      compiler: read(ToolchainRoot::Compiler),
      sdk: read(ToolchainRoot::Sdk),
      packaging: read(ToolchainRoot::Packaging),
    }
  }

  /// Read the environment, then fill unset roots from default install locations.
  pub fn detect() -> Self {
    let mut config = Self::from_env();
    config.discover(&default_candidates());
    config
  }

  pub fn get(&self, root: ToolchainRoot) -> Option<&Path> {
    match root {
      ToolchainRoot::BuildEnv => self.build_env.as_deref(),
      ToolchainRoot::Compiler => self.compiler.as_deref(),
      ToolchainRoot::Sdk => self.sdk.as_deref(),
      ToolchainRoot::Packaging => self.packaging.as_deref(),
    }
  }

  fn slot(&mut self, root: ToolchainRoot) -> &mut Option<PathBuf> {
    match root {
      ToolchainRoot::BuildEnv => &mut self.build_env,
      ToolchainRoot::Compiler => &mut self.compiler,
      ToolchainRoot::Sdk => &mut self.sdk,
      ToolchainRoot::Packaging => &mut self.packaging,
    }
  }

  /// Like [`ToolchainConfig::get`], for roots validation already guaranteed.
  pub fn require(&self, root: ToolchainRoot) -> Result<&Path, ConfigError> {
    self.get(root).ok_or(ConfigError::Unconfigured(root.env_var()))
  }

  /// Fill unset roots from the first candidate whose marker file exists.
  ///
  /// Roots that are already set are never replaced.
  pub fn discover(&mut self, candidates: &[Candidate]) {
    for candidate in candidates {
      let slot = self.slot(candidate.root);
      if slot.is_some() {
        continue;
      }
      let found = candidate.markers.iter().all(|m| candidate.dir.join(m).exists());
      debug!(var = candidate.root.env_var(), path = %candidate.dir.display(), found, "searching toolchain root");
      if found {
        info!(var = candidate.root.env_var(), path = %candidate.dir.display(), "discovered toolchain root");
        *slot = Some(candidate.dir.clone());
      }
    }
  }

  /// Check that every required root is set and exists, and canonicalize them.
  ///
  /// All unset roots are reported together.
  pub fn validate(&self, required: &BTreeSet<ToolchainRoot>) -> Result<ToolchainConfig, ConfigError> {
    let missing: Vec<&'static str> = required
      .iter()
      .filter(|root| self.get(**root).is_none())
      .map(|root| root.env_var())
      .collect();
    if !missing.is_empty() {
      return Err(ConfigError::MissingRoots(missing));
    }

    let mut validated = ToolchainConfig::default();
    for root in ToolchainRoot::ALL {
      let Some(path) = self.get(root) else {
        continue;
      };
      let canonical = match dunce::canonicalize(path) {
        Ok(p) => p,
        Err(_) if !required.contains(&root) => continue,
        Err(_) => {
          return Err(ConfigError::RootNotFound {
            var: root.env_var(),
            path: path.to_path_buf(),
          });
        }
      };
      *validated.slot(root) = Some(canonical);
    }

    if required.contains(&ToolchainRoot::BuildEnv) {
      let script = validated.require(ToolchainRoot::BuildEnv)?.join(SETUP_SCRIPT);
      if !script.is_file() {
        return Err(ConfigError::MissingSetupScript(script));
      }
    }

    for root in required {
      debug!(var = root.env_var(), path = ?validated.get(*root), "toolchain root");
    }

    Ok(validated)
  }

  /// The certificate generation utility inside the SDK root.
  pub fn cert_tool(&self) -> Result<PathBuf, ConfigError> {
    Ok(self.require(ToolchainRoot::Sdk)?.join(CERT_TOOL))
  }

  pub fn cert_manager(&self) -> Result<PathBuf, ConfigError> {
    Ok(self.require(ToolchainRoot::Sdk)?.join(CERT_MANAGER))
  }

  /// Every configured root as `(variable, value)` pairs, in a fixed order.
  pub fn exports(&self) -> Vec<(&'static str, String)> {
    ToolchainRoot::ALL
      .into_iter()
      .filter_map(|root| self.get(root).map(|p| (root.env_var(), p.display().to_string())))
      .collect()
  }
}

/// The roots a run needs, given the registry and whether a certificate will be issued.
pub fn required_roots(set: &RepositorySet, issue_certificate: bool) -> BTreeSet<ToolchainRoot> {
  let mut required = BTreeSet::new();
  for component in &set.components {
    required.insert(match component.kind {
      EnvironmentKind::Ewdk => ToolchainRoot::BuildEnv,
      EnvironmentKind::Native => ToolchainRoot::Compiler,
    });
    if component.is_installer() {
      required.insert(ToolchainRoot::Packaging);
    }
  }
  if issue_certificate {
    required.insert(ToolchainRoot::Sdk);
  }
  required
}

/// A default install location checked when a root is unset.
#[derive(Debug, Clone)]
pub struct Candidate {
  pub root: ToolchainRoot,
  pub dir: PathBuf,
  /// Files that must exist below `dir` for it to count.
  pub markers: Vec<PathBuf>,
}

/// Default install locations below a Program Files directory and the drive roots.
///
/// The build environment usually comes from a mounted ISO, so every drive
/// root is searched for it.
pub fn candidates_in(program_files: &Path, drives: &[PathBuf]) -> Vec<Candidate> {
  let mut candidates: Vec<Candidate> = drives
    .iter()
    .map(|drive| Candidate {
      root: ToolchainRoot::BuildEnv,
      dir: drive.join("BuildEnv"),
      markers: vec![PathBuf::from(SETUP_SCRIPT)],
    })
    .collect();

  candidates.push(Candidate {
    root: ToolchainRoot::Compiler,
    dir: program_files.join("Microsoft Visual Studio 11.0"),
    markers: vec![Path::new("VC").join("vcvarsall.bat")],
  });
  candidates.push(Candidate {
    root: ToolchainRoot::Packaging,
    dir: program_files.join("WiX Toolset v3.6"),
    markers: Vec::new(),
  });
  candidates.push(Candidate {
    root: ToolchainRoot::Sdk,
    dir: program_files.join("Windows Kits").join("8.0"),
    markers: vec![PathBuf::from(CERT_TOOL), PathBuf::from(CERT_MANAGER)],
  });

  candidates
}

#[cfg(windows)]
fn default_candidates() -> Vec<Candidate> {
  let drives: Vec<PathBuf> = (b'A'..=b'Z').map(|d| PathBuf::from(format!("{}:\\", d as char))).collect();
  candidates_in(Path::new("C:\\Program Files (x86)"), &drives)
}

#[cfg(not(windows))]
fn default_candidates() -> Vec<Candidate> {
  Vec::new()
}
