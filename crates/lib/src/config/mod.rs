//! Process-wide configuration: toolchain roots and the errors raised while
//! loading configuration.
//!
//! Configuration problems are fatal and are reported before any repository is
//! touched or any build is started.

pub mod toolchain;

use std::path::PathBuf;

use thiserror::Error;

pub use toolchain::{ToolchainConfig, ToolchainRoot, required_roots};

/// Missing or invalid configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
  /// One or more required toolchain variables are unset and could not be discovered.
  #[error("please set the following environment variables: {}", .0.join(", "))]
  MissingRoots(Vec<&'static str>),

  /// A toolchain variable points at a path that does not exist.
  #[error("{var} points to '{path}', which does not exist")]
  RootNotFound { var: &'static str, path: PathBuf },

  /// The build environment root has no setup script.
  #[error("build environment setup script not found: {0}")]
  MissingSetupScript(PathBuf),

  /// A root was needed after validation but is not configured.
  #[error("toolchain root {0} is not configured")]
  Unconfigured(&'static str),

  #[error("failed to read component registry '{path}': {source}")]
  ReadRegistry {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse component registry '{path}': {source}")]
  ParseRegistry {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("invalid component registry: {0}")]
  InvalidRegistry(String),

  /// A directory named on the command line does not exist.
  #[error("{what} '{path}' does not exist")]
  PathNotFound { what: &'static str, path: PathBuf },
}
