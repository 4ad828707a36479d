//! Static component registry.
//!
//! The registry is either the built-in one or a JSON document of the same
//! shape. It is validated once when loaded and never mutated afterwards.

mod builtin;
pub mod types;

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use tracing::debug;

use crate::config::ConfigError;

pub use builtin::builtin;
pub use types::{
  Arch, ArtifactDecl, ArtifactRole, Branding, ComponentRole, ComponentSpec, EnvironmentKind, ExtraCopy, InstallerLayout,
  LayoutEntry, ReleaseSpec, RepositorySet,
};

/// Load the registry from `path`, or the built-in registry when `path` is `None`.
pub fn load(path: Option<&Path>) -> Result<RepositorySet, ConfigError> {
  let set = match path {
    Some(path) => {
      debug!(path = %path.display(), "loading component registry");
      let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadRegistry {
        path: path.to_path_buf(),
        source: e,
      })?;
      serde_json::from_str(&contents).map_err(|e| ConfigError::ParseRegistry {
        path: path.to_path_buf(),
        source: e,
      })?
    }
    None => builtin(),
  };

  validate(&set)?;
  Ok(set)
}

/// Check the registry's internal consistency.
pub fn validate(set: &RepositorySet) -> Result<(), ConfigError> {
  let invalid = |message: String| Err(ConfigError::InvalidRegistry(message));

  if set.components.is_empty() {
    return invalid("no components registered".to_string());
  }

  let mut seen = HashSet::new();
  for component in &set.components {
    if component.name.trim().is_empty() {
      return invalid("component with an empty name".to_string());
    }
    if !seen.insert(component.name.as_str()) {
      return invalid(format!("component '{}' is registered twice", component.name));
    }
    if component.url.trim().is_empty() {
      return invalid(format!("component '{}' has no source url", component.name));
    }
    if component.git_ref.trim().is_empty() {
      return invalid(format!("component '{}' has no ref", component.name));
    }
  }

  let installers = set.components.iter().filter(|c| c.is_installer()).count();
  if installers != 1 {
    return invalid(format!("expected exactly one installer component, found {}", installers));
  }

  for entry in &set.layout.entries {
    let Some(component) = set.get(&entry.component) else {
      return invalid(format!("layout entry references unknown component '{}'", entry.component));
    };
    if component.is_installer() {
      return invalid(format!(
        "layout entry for '{}' points at the installer itself",
        entry.component
      ));
    }
    let declared = component
      .artifacts
      .iter()
      .any(|a| a.arch == entry.arch && a.role == entry.role);
    if entry.required && !declared {
      return invalid(format!(
        "layout requires {} {} from '{}' but the component declares no such artifact",
        entry.arch, entry.role, entry.component
      ));
    }
  }

  for extra in &set.layout.extras {
    if set.get(&extra.component).is_none() {
      return invalid(format!("extra copy references unknown component '{}'", extra.component));
    }
  }

  if set.release.outputs.is_empty() {
    return invalid("release names no installer outputs".to_string());
  }
  if set.release.archive_name.trim().is_empty() || set.release.certificate_name.trim().is_empty() {
    return invalid("release archive and certificate names must not be empty".to_string());
  }

  let mut names = HashSet::new();
  let output_names = set
    .release
    .outputs
    .iter()
    .map(|o| Path::new(o).file_name().and_then(|n| n.to_str()).unwrap_or(o.as_str()));
  for name in output_names.chain([set.release.archive_name.as_str(), set.release.certificate_name.as_str()]) {
    if !names.insert(name) {
      return invalid(format!("release file name '{}' is used twice", name));
    }
  }

  Ok(())
}
