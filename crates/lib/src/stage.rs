//! Artifact staging.
//!
//! Copies the artifacts of successful builds into the directory shape the
//! installer's build expects, as described by the [`InstallerLayout`]. Each
//! artifact lands at `<staging>/<dest>/<file name>`. Nothing here knows about
//! particular components; all mapping comes from the layout records.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::build::BuildResult;
use crate::registry::{Arch, ArtifactRole, InstallerLayout};
use crate::util::hash::{ContentHash, HashError, hash_directory};
use crate::workspace::Workspace;

#[derive(Debug, Error)]
pub enum StagingError {
  #[error("{component} produced no non-empty {role} artifact for {arch}")]
  MissingArtifact {
    component: String,
    arch: Arch,
    role: ArtifactRole,
  },

  #[error("'{}' and '{}' would both be staged as '{}'", first.display(), second.display(), dest.display())]
  Conflict { dest: PathBuf, first: PathBuf, second: PathBuf },

  #[error("extra directory '{}' of {component} does not exist", path.display())]
  MissingExtra { component: String, path: PathBuf },

  #[error("failed to stage '{}': {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to walk '{}': {source}", path.display())]
  Walk {
    path: PathBuf,
    #[source]
    source: walkdir::Error,
  },

  #[error("failed to hash staging tree: {0}")]
  Hash(#[from] HashError),
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> StagingError + '_ {
  move |source| StagingError::Io {
    path: path.to_path_buf(),
    source,
  }
}

/// A populated staging directory owned by the current run.
#[derive(Debug, Clone)]
pub struct StagingTree {
  pub root: PathBuf,
  /// Staged files relative to `root`, sorted.
  pub files: Vec<PathBuf>,
  pub digest: ContentHash,
}

/// Assemble the staging tree at `staging_dir` from `results`.
///
/// Failed results contribute nothing. Empty artifact files are skipped. Every
/// required layout entry must receive at least one file, otherwise the error
/// names the component, architecture and role that came up short. Any
/// previous contents of `staging_dir` are removed first.
pub fn stage(
  results: &[BuildResult],
  layout: &InstallerLayout,
  workspace: &Workspace,
  staging_dir: &Path,
) -> Result<StagingTree, StagingError> {
  if staging_dir.exists() {
    fs::remove_dir_all(staging_dir).map_err(io_err(staging_dir))?;
  }
  fs::create_dir_all(staging_dir).map_err(io_err(staging_dir))?;

  // Staged destination -> source, for conflict detection
  let mut staged: BTreeMap<PathBuf, PathBuf> = BTreeMap::new();

  for entry in &layout.entries {
    let Some(result) = results.iter().find(|r| r.component == entry.component && r.succeeded()) else {
      if entry.required {
        return Err(StagingError::MissingArtifact {
          component: entry.component.clone(),
          arch: entry.arch,
          role: entry.role,
        });
      }
      continue;
    };

    let mut copied = 0;
    for artifact in result
      .artifacts
      .iter()
      .filter(|a| a.arch == entry.arch && a.role == entry.role)
    {
      let len = fs::metadata(&artifact.path).map_err(io_err(&artifact.path))?.len();
      if len == 0 {
        warn!(component = %entry.component, path = %artifact.path.display(), "skipping empty artifact");
        continue;
      }
      let Some(file_name) = artifact.path.file_name() else {
        continue;
      };

      let rel = Path::new(&entry.dest).join(file_name);
      if let Some(first) = staged.get(&rel)
        && first != &artifact.path
      {
        return Err(StagingError::Conflict {
          dest: rel,
          first: first.clone(),
          second: artifact.path.clone(),
        });
      }

      let target = staging_dir.join(&rel);
      if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
      }
      fs::copy(&artifact.path, &target).map_err(io_err(&artifact.path))?;
      debug!(from = %artifact.path.display(), to = %target.display(), "staged artifact");

      staged.insert(rel, artifact.path.clone());
      copied += 1;
    }

    if copied == 0 && entry.required {
      return Err(StagingError::MissingArtifact {
        component: entry.component.clone(),
        arch: entry.arch,
        role: entry.role,
      });
    }
  }

  for extra in &layout.extras {
    let source = workspace.checkout(&extra.component).join(&extra.source);
    if !source.is_dir() {
      return Err(StagingError::MissingExtra {
        component: extra.component.clone(),
        path: source,
      });
    }
    copy_tree(&source, &staging_dir.join(&extra.dest))?;
  }

  let files = list_files(staging_dir)?;
  let digest = hash_directory(staging_dir, &[])?;
  info!(path = %staging_dir.display(), files = files.len(), digest = %digest, "staging complete");

  Ok(StagingTree {
    root: staging_dir.to_path_buf(),
    files,
    digest,
  })
}

/// Recursively copy `from` into `to`, merging with whatever is already there.
fn copy_tree(from: &Path, to: &Path) -> Result<(), StagingError> {
  for entry in WalkDir::new(from) {
    let entry = entry.map_err(|source| StagingError::Walk {
      path: from.to_path_buf(),
      source,
    })?;
    let Ok(rel) = entry.path().strip_prefix(from) else {
      continue;
    };
    let target = to.join(rel);
    if entry.file_type().is_dir() {
      fs::create_dir_all(&target).map_err(io_err(&target))?;
    } else if entry.file_type().is_file() {
      fs::copy(entry.path(), &target).map_err(io_err(entry.path()))?;
    }
  }
  Ok(())
}

fn list_files(root: &Path) -> Result<Vec<PathBuf>, StagingError> {
  let mut files = Vec::new();
  for entry in WalkDir::new(root).sort_by_file_name() {
    let entry = entry.map_err(|source| StagingError::Walk {
      path: root.to_path_buf(),
      source,
    })?;
    if entry.file_type().is_file()
      && let Ok(rel) = entry.path().strip_prefix(root)
    {
      files.push(rel.to_path_buf());
    }
  }
  Ok(files)
}
