mod build;
mod env;
mod fetch;

use std::future::Future;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{debug, warn};

use pvbundle_lib::registry::{self, RepositorySet};
use pvbundle_lib::workspace::Workspace;

pub use build::{BuildArgs, cmd_build};
pub use env::cmd_env;
pub use fetch::cmd_fetch;

fn load_registry(path: Option<&Path>) -> Result<RepositorySet> {
  let set = registry::load(path).context("Failed to load component registry")?;
  debug!(components = ?set.names(), "loaded component registry");
  Ok(set)
}

/// The workspace at `path`, absolute when it already exists.
fn open_workspace(path: &Path) -> Workspace {
  let root: PathBuf = dunce::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
  Workspace::new(root)
}

/// Drive `future` to completion, giving up on Ctrl-C.
///
/// Dropping the future terminates every child process it started.
fn run_until_interrupted<F: Future>(future: F) -> Result<F::Output> {
  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  rt.block_on(async {
    tokio::select! {
      output = future => Ok(output),
      _ = tokio::signal::ctrl_c() => {
        warn!("interrupted, stopping running processes");
        pvbundle_lib::fetch::interrupt();
        bail!("interrupted")
      }
    }
  })
}
