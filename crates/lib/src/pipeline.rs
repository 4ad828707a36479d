//! Sequencing of the `fetch` and `build` commands.
//!
//! # Build stages
//!
//! 1. Validate the toolchain configuration and resolve every component's
//!    environment. Nothing on disk has been touched yet.
//! 2. Lock the workspace and the output directory, create a run directory.
//! 3. Build every non-installer component concurrently and join them all.
//!    Any failure ends the run here, after every build has reported.
//! 4. Stage the artifacts, issue the test certificate, run the installer
//!    build and collect the release. The first failure ends the run.
//!
//! On failure or abort the run directory is left in place for inspection.
//! On success its staging tree and certificate are removed; logs stay.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use crate::build::{BuildConfiguration, BuildError, BuildJob, BuildReport, build_all};
use crate::config::{ConfigError, ToolchainConfig, required_roots};
use crate::environment::resolve;
use crate::fetch::{FetchReport, fetch_all};
use crate::package::{PackagingError, ReleaseBundle, package};
use crate::registry::RepositorySet;
use crate::run_lock::{RunLock, RunLockError};
use crate::sign::{CertificateIssuer, SigningCertificate, SigningSetupError};
use crate::stage::{StagingError, StagingTree, stage};
use crate::workspace::{RunDir, Workspace};

/// A failed `fetch` or `build` run.
#[derive(Debug, Error)]
pub enum PipelineError {
  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error(transparent)]
  Lock(#[from] RunLockError),

  #[error("failed to create run directory: {0}")]
  RunDir(#[source] std::io::Error),

  #[error("failed to fetch: {}", .0.failed.iter().map(|f| f.component.as_str()).collect::<Vec<_>>().join(", "))]
  FetchFailed(FetchReport),

  #[error("failed to build: {}", .0.failures().map(|r| r.component.as_str()).collect::<Vec<_>>().join(", "))]
  BuildsFailed(BuildReport),

  #[error(transparent)]
  Staging(#[from] StagingError),

  #[error(transparent)]
  Signing(#[from] SigningSetupError),

  #[error(transparent)]
  Packaging(#[from] PackagingError),
}

impl PipelineError {
  /// The pipeline stage the run failed in.
  pub fn stage(&self) -> &'static str {
    match self {
      PipelineError::Config(_) | PipelineError::Lock(_) | PipelineError::RunDir(_) => "setup",
      PipelineError::FetchFailed(_) => "fetch",
      PipelineError::BuildsFailed(_) => "build",
      PipelineError::Staging(_) => "stage",
      PipelineError::Signing(_) => "sign",
      PipelineError::Packaging(_) => "package",
    }
  }
}

/// Clone or update every registered component.
///
/// All components are attempted; failures are collected into
/// [`PipelineError::FetchFailed`].
pub async fn run_fetch(set: &RepositorySet, workspace: &Workspace) -> Result<FetchReport, PipelineError> {
  let _lock = RunLock::acquire(&workspace.lock_path(), workspace.root(), "fetch")?;
  let run = workspace.create_run().map_err(PipelineError::RunDir)?;

  let report = fetch_all(&set.components, workspace, &run).await;
  if !report.is_success() {
    return Err(PipelineError::FetchFailed(report));
  }
  Ok(report)
}

/// Resolve the build environment of every component, in registry order.
pub fn resolve_all(set: &RepositorySet, config: &ToolchainConfig, workspace: &Workspace) -> Result<Vec<BuildJob>, ConfigError> {
  set
    .components
    .iter()
    .map(|spec| {
      Ok(BuildJob {
        spec: spec.clone(),
        env: resolve(spec, config, workspace.root())?,
      })
    })
    .collect()
}

#[derive(Debug, Clone)]
pub struct BuildOptions {
  pub output_dir: PathBuf,
  pub configuration: BuildConfiguration,
  /// Prebuilt installer input tree; component builds and staging are skipped.
  pub local: Option<PathBuf>,
  /// Existing certificate; issuance is skipped.
  pub sign: Option<PathBuf>,
}

/// Everything a successful `build` produced.
#[derive(Debug)]
pub struct BuildSummary {
  /// Empty when a prebuilt tree was supplied.
  pub builds: BuildReport,
  pub staging: Option<StagingTree>,
  pub certificate: SigningCertificate,
  pub bundle: ReleaseBundle,
  pub run_dir: PathBuf,
}

/// Build, stage, sign and package the release.
///
/// `toolchain` is the unvalidated configuration; validation happens here,
/// before any lock, directory or process is created.
pub async fn run_build(
  set: &RepositorySet,
  toolchain: &ToolchainConfig,
  workspace: &Workspace,
  options: &BuildOptions,
) -> Result<BuildSummary, PipelineError> {
  let config = toolchain.validate(&required_roots(set, options.sign.is_none()))?;

  let local = match &options.local {
    Some(path) => Some(dunce::canonicalize(path).map_err(|_| ConfigError::PathNotFound {
      what: "local artifact tree",
      path: path.clone(),
    })?),
    None => None,
  };
  let external_cert = options.sign.as_deref().map(SigningCertificate::external).transpose()?;

  let jobs = resolve_all(set, &config, workspace)?;
  let installer = jobs
    .iter()
    .find(|j| j.spec.is_installer())
    .ok_or_else(|| ConfigError::InvalidRegistry("no installer component".to_string()))?;

  let _workspace_lock = RunLock::acquire(&workspace.lock_path(), workspace.root(), "build")?;
  let _output_lock = RunLock::acquire(
    &RunLock::path_for_output(&options.output_dir),
    &options.output_dir,
    "build",
  )?;
  let run = workspace.create_run().map_err(PipelineError::RunDir)?;
  info!(run = %run.path().display(), "starting build run");

  let result = build_stages(set, &config, workspace, options, &jobs, installer, local, external_cert, &run).await;
  match result {
    Ok(summary) => {
      if let Err(e) = run.discard_intermediates() {
        warn!(path = %run.path().display(), error = %e, "failed to remove intermediates");
      }
      Ok(summary)
    }
    Err(e) => {
      warn!(path = %run.path().display(), "run directory kept for inspection");
      Err(e)
    }
  }
}

#[allow(clippy::too_many_arguments)]
async fn build_stages(
  set: &RepositorySet,
  config: &ToolchainConfig,
  workspace: &Workspace,
  options: &BuildOptions,
  jobs: &[BuildJob],
  installer: &BuildJob,
  local: Option<PathBuf>,
  external_cert: Option<SigningCertificate>,
  run: &RunDir,
) -> Result<BuildSummary, PipelineError> {
  if !installer.env.working_dir.is_dir() {
    let missing = BuildError::MissingCheckout(installer.env.working_dir.clone());
    return Err(PackagingError::Installer(missing).into());
  }

  let (builds, staging, tree) = match local {
    Some(tree) => {
      info!(path = %tree.display(), "using prebuilt artifact tree");
      (BuildReport::default(), None, tree)
    }
    None => {
      let builds = build_all(jobs, options.configuration, run).await;
      if !builds.is_success() {
        return Err(PipelineError::BuildsFailed(builds));
      }
      let staging = stage(&builds.results, &set.layout, workspace, &run.staging_dir())?;
      let root = staging.root.clone();
      (builds, Some(staging), root)
    }
  };

  let (certificate, key) = match external_cert {
    Some(cert) => {
      info!(path = %cert.cert_path.display(), "using supplied certificate");
      (cert, None)
    }
    None => {
      let issuer = CertificateIssuer::from_config(config, set.branding.test_certificate_name())?;
      let (cert, key) = issuer
        .issue(&run.cert_dir(), &set.release.certificate_name, run.log_path("sign", "certificate"))
        .await?;
      (cert, Some(key))
    }
  };

  let packaged = package(installer, &set.release, &tree, &certificate, &options.output_dir, run).await;

  // The issued key only signs this run's installer, whether or not it succeeded
  if let Some(key) = key {
    let removed = key.remove(run.log_path("sign", "remove-key")).await;
    match removed {
      Ok(()) => {}
      Err(e) if packaged.is_ok() => return Err(e.into()),
      Err(e) => warn!(error = %e, "failed to remove test-signing key"),
    }
  }
  let bundle = packaged?;
  info!(path = %bundle.output_dir.display(), fingerprint = %certificate.fingerprint, "release complete");

  Ok(BuildSummary {
    builds,
    staging,
    certificate,
    bundle,
    run_dir: run.path().to_path_buf(),
  })
}

/// Default output directory for a workspace.
pub fn default_output_dir(workspace: &Path) -> PathBuf {
  workspace.join(crate::consts::DEFAULT_OUTPUT_DIR)
}
