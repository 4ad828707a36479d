//! Declared artifact matching.
//!
//! Patterns are globs relative to the checkout, matched against `/`-separated
//! relative paths. `*` never crosses a directory boundary; `**` does.

use std::fs;
use std::path::Path;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use super::{BuildError, BuiltArtifact};
use crate::registry::ArtifactDecl;

fn compile(decls: &[ArtifactDecl]) -> Result<GlobSet, BuildError> {
  let mut builder = GlobSetBuilder::new();
  for decl in decls {
    let glob = GlobBuilder::new(&decl.pattern)
      .literal_separator(true)
      .build()
      .map_err(|source| BuildError::Pattern {
        pattern: decl.pattern.clone(),
        source,
      })?;
    builder.add(glob);
  }
  builder.build().map_err(|source| BuildError::Pattern {
    pattern: decls.iter().map(|d| d.pattern.as_str()).collect::<Vec<_>>().join(", "),
    source,
  })
}

/// Every file under `checkout` matching one of `decls`, sorted by path.
///
/// A file matching several declarations is reported once per declaration.
/// The `.git` directory is never searched.
pub fn resolve_artifacts(decls: &[ArtifactDecl], checkout: &Path) -> Result<Vec<BuiltArtifact>, BuildError> {
  if decls.is_empty() {
    return Ok(Vec::new());
  }
  let set = compile(decls)?;

  let walker = WalkDir::new(checkout)
    .sort_by_file_name()
    .into_iter()
    .filter_entry(|e| e.file_name() != ".git");

  let mut artifacts = Vec::new();
  for entry in walker {
    let entry = entry?;
    if !entry.file_type().is_file() {
      continue;
    }
    let Ok(rel) = entry.path().strip_prefix(checkout) else {
      continue;
    };
    let rel = rel
      .components()
      .map(|c| c.as_os_str().to_string_lossy())
      .collect::<Vec<_>>()
      .join("/");

    for index in set.matches(&rel) {
      let decl = &decls[index];
      artifacts.push(BuiltArtifact {
        arch: decl.arch,
        role: decl.role,
        path: entry.path().to_path_buf(),
      });
    }
  }

  Ok(artifacts)
}

/// Remove every file under `checkout` matching one of `decls`.
///
/// Run before a build, so only files the build itself writes are picked up
/// afterwards. Returns the number of files removed.
pub fn clear_artifacts(decls: &[ArtifactDecl], checkout: &Path) -> Result<usize, BuildError> {
  let mut paths: Vec<_> = resolve_artifacts(decls, checkout)?.into_iter().map(|a| a.path).collect();
  paths.dedup();

  for path in &paths {
    fs::remove_file(path).map_err(|source| BuildError::ClearOutput {
      path: path.clone(),
      source,
    })?;
  }
  Ok(paths.len())
}
