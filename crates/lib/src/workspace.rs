//! Workspace layout and per-run scratch directories.
//!
//! ```text
//! <workspace>/
//!   <component>/                 one checkout per registered component
//!   .pvbundle/
//!     workspace.lock
//!     runs/<run-id>/               the newest RUNS_KEPT runs
//!       logs/<stage>-<component>.log
//!       staging/                 the staging tree handed to the installer
//!       cert/                    the test-signing certificate
//! ```

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::consts::{RUNS_KEPT, SCRATCH_DIR};

static RUN_SEQUENCE: AtomicU32 = AtomicU32::new(0);

#[derive(Debug, Clone)]
pub struct Workspace {
  root: PathBuf,
}

impl Workspace {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Workspace { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  /// Checkout directory of a component.
  pub fn checkout(&self, component: &str) -> PathBuf {
    self.root.join(component)
  }

  pub fn scratch_dir(&self) -> PathBuf {
    self.root.join(SCRATCH_DIR)
  }

  pub fn lock_path(&self) -> PathBuf {
    self.scratch_dir().join("workspace.lock")
  }

  fn runs_dir(&self) -> PathBuf {
    self.scratch_dir().join("runs")
  }

  /// Create a fresh run directory with its `logs` subdirectory, pruning runs
  /// beyond the newest [`RUNS_KEPT`].
  pub fn create_run(&self) -> io::Result<RunDir> {
    let secs = SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .unwrap_or_default()
      .as_secs();
    let seq = RUN_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let id = format!("{}-{}-{}", secs, std::process::id(), seq);
    let path = self.runs_dir().join(&id);

    std::fs::create_dir_all(path.join("logs"))?;
    debug!(run = %id, path = %path.display(), "created run directory");
    self.prune_runs(RUNS_KEPT);
    Ok(RunDir { path })
  }

  /// Remove all but the newest `keep` run directories. Entries whose names
  /// are not run ids are left alone. Failures are logged, not returned.
  pub fn prune_runs(&self, keep: usize) {
    let entries = match std::fs::read_dir(self.runs_dir()) {
      Ok(entries) => entries,
      Err(e) => {
        warn!(error = %e, "failed to list run directories");
        return;
      }
    };
    let mut runs: Vec<((u64, u32, u32), PathBuf)> = entries
      .filter_map(Result::ok)
      .filter_map(|entry| Some((run_order(&entry.file_name().to_string_lossy())?, entry.path())))
      .collect();
    if runs.len() <= keep {
      return;
    }
    runs.sort();

    let stale = runs.len() - keep;
    for (_, path) in runs.into_iter().take(stale) {
      match std::fs::remove_dir_all(&path) {
        Ok(()) => debug!(path = %path.display(), "removed old run directory"),
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove old run directory"),
      }
    }
  }
}

/// Sort key of a `<secs>-<pid>-<seq>` run id.
fn run_order(id: &str) -> Option<(u64, u32, u32)> {
  let mut parts = id.splitn(3, '-');
  let secs = parts.next()?.parse().ok()?;
  let pid = parts.next()?.parse().ok()?;
  let seq = parts.next()?.parse().ok()?;
  Some((secs, pid, seq))
}

/// Scratch space owned by a single run.
#[derive(Debug, Clone)]
pub struct RunDir {
  path: PathBuf,
}

impl RunDir {
  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn log_path(&self, stage: &str, component: &str) -> PathBuf {
    self.path.join("logs").join(format!("{}-{}.log", stage, component))
  }

  pub fn staging_dir(&self) -> PathBuf {
    self.path.join("staging")
  }

  pub fn cert_dir(&self) -> PathBuf {
    self.path.join("cert")
  }

  /// Discard the staging tree and certificate after a successful run. Logs stay.
  pub fn discard_intermediates(&self) -> io::Result<()> {
    for dir in [self.staging_dir(), self.cert_dir()] {
      if dir.exists() {
        std::fs::remove_dir_all(&dir)?;
      }
    }
    Ok(())
  }
}
