//! Launching component entry points.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::artifacts::{clear_artifacts, resolve_artifacts};
use super::{BuildConfiguration, BuildError, BuildReport, BuildResult, BuildStatus};
use crate::environment::BuildEnvironment;
use crate::exec::run_process;
use crate::registry::ComponentSpec;
use crate::workspace::RunDir;

/// A component paired with the environment it builds in.
#[derive(Debug, Clone)]
pub struct BuildJob {
  pub spec: ComponentSpec,
  pub env: BuildEnvironment,
}

/// The command that starts a component's build.
///
/// An explicit `entry` wins. Otherwise `build.py` (run with `python`) or
/// `build.ps1` (run with `powershell -file`) in the checkout is used.
pub fn entry_point(spec: &ComponentSpec, checkout: &Path) -> Result<String, BuildError> {
  if let Some(entry) = &spec.entry {
    return Ok(entry.clone());
  }
  if checkout.join("build.py").is_file() {
    return Ok("python build.py".to_string());
  }
  if checkout.join("build.ps1").is_file() {
    return Ok("powershell -file build.ps1".to_string());
  }
  Err(BuildError::NoEntryPoint(checkout.to_path_buf()))
}

/// Run one component's build to completion.
///
/// Outputs matching the component's declarations are removed first, so a
/// build that exits 0 without writing them reports no artifacts. `args` are
/// appended to the entry point verbatim. Never fails: launch errors and
/// non-zero exits become a failed [`BuildResult`].
pub async fn build(spec: &ComponentSpec, env: &BuildEnvironment, args: &[String], log_path: PathBuf) -> BuildResult {
  let checkout = &env.working_dir;
  if !checkout.is_dir() {
    return BuildResult::failed(&spec.name, BuildError::MissingCheckout(checkout.clone()), log_path);
  }
  let entry = match entry_point(spec, checkout) {
    Ok(entry) => entry,
    Err(e) => return BuildResult::failed(&spec.name, e, log_path),
  };

  match clear_artifacts(&spec.artifacts, checkout) {
    Ok(0) => {}
    Ok(removed) => debug!(component = %spec.name, removed, "removed previous outputs"),
    Err(e) => return BuildResult::failed(&spec.name, e, log_path),
  }

  let mut command = entry;
  for arg in args {
    command.push(' ');
    command.push_str(arg);
  }
  info!(component = %spec.name, command = %command, "starting build");

  let outcome = match run_process(&env.invocation(&command, log_path.clone())).await {
    Ok(outcome) => outcome,
    Err(e) => return BuildResult::failed(&spec.name, e.into(), log_path),
  };

  let (status, artifacts) = if !outcome.success() {
    let error = BuildError::Exited {
      code: outcome.code,
      log_path: outcome.log_path.clone(),
    };
    (BuildStatus::Failed(error), Vec::new())
  } else {
    match resolve_artifacts(&spec.artifacts, checkout) {
      Ok(artifacts) => {
        debug!(component = %spec.name, count = artifacts.len(), "resolved artifacts");
        (BuildStatus::Succeeded, artifacts)
      }
      Err(e) => (BuildStatus::Failed(e), Vec::new()),
    }
  };

  BuildResult {
    component: spec.name.clone(),
    status,
    started_at: outcome.started_at,
    finished_at: outcome.finished_at,
    log_path: outcome.log_path,
    artifacts,
  }
}

/// Build every non-installer job concurrently and wait for all of them.
///
/// Failures do not cancel the other builds. Installer jobs are skipped; the
/// installer only runs once this has returned.
pub async fn build_all(jobs: &[BuildJob], configuration: BuildConfiguration, run: &RunDir) -> BuildReport {
  let args = vec![configuration.as_arg().to_string()];

  let mut tasks = JoinSet::new();
  for job in jobs {
    if job.spec.is_installer() {
      warn!(component = %job.spec.name, "installer is not built with the components, skipping");
      continue;
    }
    let job = job.clone();
    let args = args.clone();
    let log_path = run.log_path("build", &job.spec.name);
    tasks.spawn(async move { build(&job.spec, &job.env, &args, log_path).await });
  }
  info!(count = tasks.len(), configuration = configuration.as_arg(), "building components");

  let mut report = BuildReport::default();
  while let Some(joined) = tasks.join_next().await {
    match joined {
      Ok(result) => {
        match result.error() {
          None => info!(
            component = %result.component,
            seconds = result.duration().as_secs(),
            artifacts = result.artifacts.len(),
            "build succeeded"
          ),
          Some(e) => error!(component = %result.component, error = %e, "build failed"),
        }
        report.results.push(result);
      }
      Err(e) => {
        error!(error = %e, "build task failed");
        report.results.push(BuildResult {
          component: "<unknown>".to_string(),
          status: BuildStatus::Failed(BuildError::Task(e.to_string())),
          started_at: SystemTime::now(),
          finished_at: SystemTime::now(),
          log_path: PathBuf::new(),
          artifacts: Vec::new(),
        });
      }
    }
  }

  let position = |name: &str| jobs.iter().position(|j| j.spec.name == name).unwrap_or(usize::MAX);
  report.results.sort_by_key(|r| position(&r.component));
  report
}
