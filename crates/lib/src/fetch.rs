//! Fetching component repositories.
//!
//! Each component is checked out at `<workspace>/<name>`:
//! - no `.git` there yet: clone
//! - existing checkout: fetch from the default remote
//!
//! The configured ref is then resolved (`origin/<ref>` first, the literal
//! revision second). When HEAD already is that commit nothing on disk changes,
//! so fetching twice in a row is a no-op the second time. Otherwise the
//! worktree is moved with `git checkout` through the process runner.

use std::fs;
use std::path::{Path, PathBuf};

use gix::remote::Direction;
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::exec::{Invocation, ProcessError, run_process};
use crate::registry::ComponentSpec;
use crate::workspace::{RunDir, Workspace};

/// Errors that can occur while fetching one component.
#[derive(Debug, Error)]
pub enum FetchError {
  /// Failed to create the workspace directory.
  #[error("failed to create workspace directory '{0}': {1}")]
  CreateDir(PathBuf, #[source] std::io::Error),

  /// Failed to clone a git repository.
  #[error("failed to clone repository '{url}': {source}")]
  Clone {
    url: String,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },

  /// Failed to open an existing git repository.
  #[error("failed to open repository at '{path}': {source}")]
  Open {
    path: PathBuf,
    #[source]
    source: Box<gix::open::Error>,
  },

  /// Failed to connect to the remote.
  #[error("failed to connect to remote '{url}': {source}")]
  Connect {
    url: String,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },

  /// Failed to fetch from the remote.
  #[error("failed to fetch from '{url}': {source}")]
  Fetch {
    url: String,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },

  /// The checkout has no remote to fetch from.
  #[error("no remote configured for repository at '{0}'")]
  NoRemote(PathBuf),

  /// The configured ref does not exist upstream.
  #[error("ref '{0}' not found in repository")]
  RefNotFound(String),

  /// Failed to resolve HEAD of the checkout.
  #[error("failed to resolve HEAD: {0}")]
  ResolveHead(String),

  /// `git checkout` of the resolved commit failed.
  #[error("checkout of {commit} exited with code {code:?} (see {})", log_path.display())]
  Checkout {
    commit: String,
    code: Option<i32>,
    log_path: PathBuf,
  },

  #[error(transparent)]
  Process(#[from] ProcessError),

  /// The fetch task died before reporting.
  #[error("fetch task failed: {0}")]
  Task(String),
}

/// Ask in-flight clones and fetches to stop at the next opportunity.
pub fn interrupt() {
  gix::interrupt::IS_INTERRUPTED.store(true, std::sync::atomic::Ordering::SeqCst);
}

/// What happened to the checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchAction {
  Cloned,
  Updated,
  Unchanged,
}

/// A successfully fetched component.
#[derive(Debug, Clone, Serialize)]
pub struct FetchOutcome {
  pub component: String,
  pub path: PathBuf,
  pub commit: String,
  pub action: FetchAction,
}

/// A component that failed to fetch.
#[derive(Debug)]
pub struct FetchFailure {
  pub component: String,
  pub error: FetchError,
}

/// Per-component results of a fetch pass, in registry order.
#[derive(Debug, Default)]
pub struct FetchReport {
  pub fetched: Vec<FetchOutcome>,
  pub failed: Vec<FetchFailure>,
}

impl FetchReport {
  pub fn is_success(&self) -> bool {
    self.failed.is_empty()
  }
}

/// Clone or update one component and move its worktree to the configured ref.
pub async fn fetch(spec: &ComponentSpec, workspace: &Workspace, run: &RunDir) -> Result<FetchOutcome, FetchError> {
  let repo_path = workspace.checkout(&spec.name);
  let url = spec.url.clone();
  let git_ref = spec.git_ref.clone();
  let path = repo_path.clone();

  let synced = tokio::task::spawn_blocking(move || sync_repository(&url, &git_ref, &path))
    .await
    .map_err(|e| FetchError::Task(e.to_string()))??;

  let mut action = if synced.cloned {
    FetchAction::Cloned
  } else {
    FetchAction::Unchanged
  };

  if synced.head != synced.target {
    info!(component = %spec.name, commit = %synced.target, "checking out");
    let invocation = Invocation {
      program: "git".to_string(),
      args: vec![
        "checkout".to_string(),
        "--force".to_string(),
        "--detach".to_string(),
        synced.target.clone(),
      ],
      working_dir: repo_path.clone(),
      env: Default::default(),
      log_path: run.log_path("fetch", &spec.name),
      raw_args: false,
    };
    let outcome = run_process(&invocation).await?;
    if !outcome.success() {
      return Err(FetchError::Checkout {
        commit: synced.target,
        code: outcome.code,
        log_path: outcome.log_path,
      });
    }
    if action == FetchAction::Unchanged {
      action = FetchAction::Updated;
    }
  }

  debug!(component = %spec.name, commit = %synced.target, ?action, "fetched");
  Ok(FetchOutcome {
    component: spec.name.clone(),
    path: repo_path,
    commit: synced.target,
    action,
  })
}

/// Fetch every component concurrently.
///
/// A failure is recorded against its component and never stops the others.
pub async fn fetch_all(components: &[ComponentSpec], workspace: &Workspace, run: &RunDir) -> FetchReport {
  info!(count = components.len(), "fetching components");

  let mut tasks = JoinSet::new();
  for spec in components {
    let spec = spec.clone();
    let workspace = workspace.clone();
    let run = run.clone();
    tasks.spawn(async move {
      let result = fetch(&spec, &workspace, &run).await;
      (spec.name, result)
    });
  }

  let mut report = FetchReport::default();
  while let Some(joined) = tasks.join_next().await {
    let (name, result) = match joined {
      Ok(pair) => pair,
      Err(e) => {
        // A panicked task has lost its name; report it under a placeholder
        error!(error = %e, "fetch task failed");
        report.failed.push(FetchFailure {
          component: "<unknown>".to_string(),
          error: FetchError::Task(e.to_string()),
        });
        continue;
      }
    };
    match result {
      Ok(outcome) => {
        info!(component = %name, commit = %outcome.commit, action = ?outcome.action, "fetch succeeded");
        report.fetched.push(outcome);
      }
      Err(e) => {
        error!(component = %name, error = %e, "fetch failed");
        report.failed.push(FetchFailure {
          component: name,
          error: e,
        });
      }
    }
  }

  let position = |name: &str| components.iter().position(|c| c.name == name).unwrap_or(usize::MAX);
  report.fetched.sort_by_key(|o| position(&o.component));
  report.failed.sort_by_key(|f| position(&f.component));
  report
}

struct Synced {
  cloned: bool,
  head: String,
  target: String,
}

/// Clone or fetch, then resolve HEAD and the target ref. Blocking.
fn sync_repository(url: &str, git_ref: &str, repo_path: &Path) -> Result<Synced, FetchError> {
  if let Some(parent) = repo_path.parent()
    && !parent.exists()
  {
    fs::create_dir_all(parent).map_err(|e| FetchError::CreateDir(parent.to_path_buf(), e))?;
  }

  let (repo, cloned) = if repo_path.join(".git").exists() {
    debug!(url, path = %repo_path.display(), "opening existing checkout");
    let repo = gix::open(repo_path).map_err(|e| FetchError::Open {
      path: repo_path.to_path_buf(),
      source: Box::new(e),
    })?;
    fetch_updates(&repo, url, repo_path)?;
    (repo, false)
  } else {
    info!(url, path = %repo_path.display(), "cloning repository");
    (clone_repo(url, repo_path)?, true)
  };

  let target = resolve_ref(&repo, git_ref)?;
  let head = repo
    .head_id()
    .map_err(|e| FetchError::ResolveHead(e.to_string()))?
    .to_string();

  Ok(Synced { cloned, head, target })
}

/// Clone a git repository to the specified path.
fn clone_repo(url: &str, dest: &Path) -> Result<gix::Repository, FetchError> {
  let mut prepared = gix::prepare_clone(url, dest).map_err(|e| clone_error(url, e))?;

  let (mut checkout, _outcome) = prepared
    .fetch_then_checkout(gix::progress::Discard, &gix::interrupt::IS_INTERRUPTED)
    .map_err(|e| clone_error(url, e))?;

  let (repo, _outcome) = checkout
    .main_worktree(gix::progress::Discard, &gix::interrupt::IS_INTERRUPTED)
    .map_err(|e| clone_error(url, e))?;

  Ok(repo)
}

fn clone_error(url: &str, source: impl std::error::Error + Send + Sync + 'static) -> FetchError {
  FetchError::Clone {
    url: url.to_string(),
    source: Box::new(source),
  }
}

/// Fetch updates from the default remote.
fn fetch_updates(repo: &gix::Repository, url: &str, repo_path: &Path) -> Result<(), FetchError> {
  debug!(url, "fetching updates");

  let remote = repo
    .find_default_remote(Direction::Fetch)
    .ok_or_else(|| FetchError::NoRemote(repo_path.to_path_buf()))?
    .map_err(|e| FetchError::Connect {
      url: url.to_string(),
      source: Box::new(e),
    })?;

  let connection = remote.connect(Direction::Fetch).map_err(|e| FetchError::Connect {
    url: url.to_string(),
    source: Box::new(e),
  })?;

  connection
    .prepare_fetch(gix::progress::Discard, Default::default())
    .map_err(|e| FetchError::Fetch {
      url: url.to_string(),
      source: Box::new(e),
    })?
    .receive(gix::progress::Discard, &gix::interrupt::IS_INTERRUPTED)
    .map_err(|e| FetchError::Fetch {
      url: url.to_string(),
      source: Box::new(e),
    })?;

  Ok(())
}

/// Resolve a branch, tag or commit to the commit hash it names.
///
/// Remote-tracking branches win over local names so an updated upstream
/// branch is picked up after a fetch.
fn resolve_ref(repo: &gix::Repository, git_ref: &str) -> Result<String, FetchError> {
  for candidate in [format!("origin/{}", git_ref), git_ref.to_string()] {
    let spec = format!("{}^{{commit}}", candidate);
    if let Ok(id) = repo.rev_parse_single(spec.as_str()) {
      return Ok(id.to_string());
    }
  }
  Err(FetchError::RefNotFound(git_ref.to_string()))
}
