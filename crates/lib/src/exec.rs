//! External process runner.
//!
//! Every child process this crate starts (component builds, the installer
//! build, the certificate utility, git) goes through [`run_process`]. The
//! child inherits the parent environment plus the invocation's overrides, and
//! its stdout and stderr are written, interleaved, to one log file.
//!
//! If the future returned by [`run_process`] is dropped before the child exits
//! (for example on Ctrl-C), the child and everything it spawned are terminated.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, SystemTime};

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

/// A fully resolved child process launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
  pub program: String,
  pub args: Vec<String>,
  pub working_dir: PathBuf,
  /// Variables set on top of the inherited environment.
  pub env: BTreeMap<String, String>,
  /// File receiving the combined output.
  pub log_path: PathBuf,
  /// Hand `args` to the program without quoting them (Windows). `cmd.exe`
  /// parses its own command line and does not understand the escaping the
  /// standard library applies.
  pub raw_args: bool,
}

/// How a child process ended.
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
  /// Exit code, `None` when the process was killed by a signal.
  pub code: Option<i32>,
  pub started_at: SystemTime,
  pub finished_at: SystemTime,
  pub log_path: PathBuf,
}

impl ProcessOutcome {
  pub fn success(&self) -> bool {
    self.code == Some(0)
  }

  pub fn duration(&self) -> Duration {
    self.finished_at.duration_since(self.started_at).unwrap_or_default()
  }
}

/// The process could not be run at all.
#[derive(Debug, Error)]
pub enum ProcessError {
  #[error("failed to create log file '{path}': {source}")]
  CreateLog {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to launch '{program}': {source}")]
  Spawn {
    program: String,
    #[source]
    source: io::Error,
  },

  #[error("failed waiting for '{program}': {source}")]
  Wait {
    program: String,
    #[source]
    source: io::Error,
  },
}

/// Run `invocation` to completion and report how it ended.
///
/// A non-zero exit is not an error here; callers decide what it means.
pub async fn run_process(invocation: &Invocation) -> Result<ProcessOutcome, ProcessError> {
  let log_err = |e| ProcessError::CreateLog {
    path: invocation.log_path.clone(),
    source: e,
  };
  if let Some(parent) = invocation.log_path.parent() {
    tokio::fs::create_dir_all(parent).await.map_err(log_err)?;
  }
  let stdout = File::create(&invocation.log_path).map_err(log_err)?;
  let stderr = stdout.try_clone().map_err(log_err)?;

  let mut command = Command::new(&invocation.program);
  #[cfg(windows)]
  {
    if invocation.raw_args {
      for arg in &invocation.args {
        command.raw_arg(arg);
      }
    } else {
      command.args(&invocation.args);
    }
  }
  #[cfg(not(windows))]
  command.args(&invocation.args);
  command
    .current_dir(&invocation.working_dir)
    .envs(&invocation.env)
    .stdin(Stdio::null())
    .stdout(Stdio::from(stdout))
    .stderr(Stdio::from(stderr))
    .kill_on_drop(true);

  // Own process group, so the whole tree can be signalled on abort
  #[cfg(unix)]
  command.process_group(0);

  debug!(
    program = %invocation.program,
    args = ?invocation.args,
    working_dir = %invocation.working_dir.display(),
    log = %invocation.log_path.display(),
    "spawning process"
  );

  let started_at = SystemTime::now();
  let mut child = command.spawn().map_err(|e| ProcessError::Spawn {
    program: invocation.program.clone(),
    source: e,
  })?;
  let guard = TreeGuard { pid: child.id() };

  let status = child.wait().await.map_err(|e| ProcessError::Wait {
    program: invocation.program.clone(),
    source: e,
  })?;
  guard.disarm();
  let finished_at = SystemTime::now();

  debug!(program = %invocation.program, code = ?status.code(), "process exited");

  Ok(ProcessOutcome {
    code: status.code(),
    started_at,
    finished_at,
    log_path: invocation.log_path.clone(),
  })
}

/// Terminates a child's process tree when dropped while still armed.
struct TreeGuard {
  pid: Option<u32>,
}

impl TreeGuard {
  fn disarm(mut self) {
    self.pid = None;
  }
}

impl Drop for TreeGuard {
  fn drop(&mut self) {
    if let Some(pid) = self.pid.take() {
      warn!(pid, "terminating unfinished child process tree");
      terminate_tree(pid);
    }
  }
}

#[cfg(unix)]
fn terminate_tree(pid: u32) {
  use rustix::process::{Pid, Signal, kill_process_group};

  let Some(pid) = i32::try_from(pid).ok().and_then(Pid::from_raw) else {
    return;
  };
  if let Err(e) = kill_process_group(pid, Signal::TERM) {
    debug!(error = %e, "failed to signal process group");
  }
}

#[cfg(windows)]
fn terminate_tree(pid: u32) {
  let result = std::process::Command::new("taskkill")
    .args(["/T", "/F", "/PID", &pid.to_string()])
    .stdin(Stdio::null())
    .stdout(Stdio::null())
    .stderr(Stdio::null())
    .status();
  if let Err(e) = result {
    debug!(error = %e, "failed to run taskkill");
  }
}

/// The last `lines` lines of a log file, for failure reports.
///
/// Reads at most the final 64 KiB. Unreadable logs yield an empty string.
pub fn log_tail(path: &Path, lines: usize) -> String {
  const WINDOW: u64 = 64 * 1024;

  let read = || -> io::Result<String> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    file.seek(SeekFrom::Start(len.saturating_sub(WINDOW)))?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
  };

  let contents = read().unwrap_or_default();
  let all: Vec<&str> = contents.lines().collect();
  all[all.len().saturating_sub(lines)..].join("\n")
}
