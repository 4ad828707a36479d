use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::exec::ProcessError;
use crate::registry::{Arch, ArtifactRole};

/// Driver build flavour handed to every non-installer entry point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildConfiguration {
  #[default]
  Free,
  Checked,
}

impl BuildConfiguration {
  pub fn as_arg(&self) -> &'static str {
    match self {
      BuildConfiguration::Free => "free",
      BuildConfiguration::Checked => "checked",
    }
  }
}

/// Why a single component's build did not succeed.
#[derive(Debug, Error)]
pub enum BuildError {
  #[error("no checkout at '{}' (has 'fetch' been run?)", .0.display())]
  MissingCheckout(PathBuf),

  #[error("no build entry point in '{}' (expected build.py or build.ps1)", .0.display())]
  NoEntryPoint(PathBuf),

  #[error(transparent)]
  Process(#[from] ProcessError),

  #[error("build exited with {} (see {})", describe_exit(.code), .log_path.display())]
  Exited { code: Option<i32>, log_path: PathBuf },

  #[error("invalid artifact pattern '{pattern}': {source}")]
  Pattern {
    pattern: String,
    #[source]
    source: globset::Error,
  },

  #[error("failed to scan for artifacts: {0}")]
  Scan(#[from] walkdir::Error),

  #[error("failed to remove previous output '{}': {source}", path.display())]
  ClearOutput {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("build task failed: {0}")]
  Task(String),
}

fn describe_exit(code: &Option<i32>) -> String {
  match code {
    Some(code) => format!("code {}", code),
    None => "a signal".to_string(),
  }
}

impl BuildError {
  /// The captured output of the failed build, when there is one.
  pub fn log_path(&self) -> Option<&PathBuf> {
    match self {
      BuildError::Exited { log_path, .. } => Some(log_path),
      _ => None,
    }
  }
}

#[derive(Debug)]
pub enum BuildStatus {
  Succeeded,
  Failed(BuildError),
}

/// A file a successful build produced, matched against an artifact declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuiltArtifact {
  pub arch: Arch,
  pub role: ArtifactRole,
  pub path: PathBuf,
}

/// The outcome of one component's build.
#[derive(Debug)]
pub struct BuildResult {
  pub component: String,
  pub status: BuildStatus,
  pub started_at: SystemTime,
  pub finished_at: SystemTime,
  /// Combined stdout/stderr of the entry point.
  pub log_path: PathBuf,
  /// Empty unless the build succeeded.
  pub artifacts: Vec<BuiltArtifact>,
}

impl BuildResult {
  pub fn succeeded(&self) -> bool {
    matches!(self.status, BuildStatus::Succeeded)
  }

  pub fn error(&self) -> Option<&BuildError> {
    match &self.status {
      BuildStatus::Succeeded => None,
      BuildStatus::Failed(e) => Some(e),
    }
  }

  pub fn duration(&self) -> Duration {
    self.finished_at.duration_since(self.started_at).unwrap_or_default()
  }

  pub(crate) fn failed(component: &str, error: BuildError, log_path: PathBuf) -> Self {
    let now = SystemTime::now();
    BuildResult {
      component: component.to_string(),
      status: BuildStatus::Failed(error),
      started_at: now,
      finished_at: now,
      log_path,
      artifacts: Vec::new(),
    }
  }
}

/// Results of every non-installer build of a run, in registry order.
#[derive(Debug, Default)]
pub struct BuildReport {
  pub results: Vec<BuildResult>,
}

impl BuildReport {
  pub fn is_success(&self) -> bool {
    self.results.iter().all(BuildResult::succeeded)
  }

  pub fn failures(&self) -> impl Iterator<Item = &BuildResult> {
    self.results.iter().filter(|r| !r.succeeded())
  }

  pub fn get(&self, component: &str) -> Option<&BuildResult> {
    self.results.iter().find(|r| r.component == component)
  }

  /// When the last build finished.
  pub fn latest_finish(&self) -> Option<SystemTime> {
    self.results.iter().map(|r| r.finished_at).max()
  }
}
