//! Installer packaging and the release bundle.
//!
//! The installer's own build does the signing and packaging. This module
//! hands it the input tree and certificate, then collects the fixed set of
//! release files into the output directory and bundles them into an archive.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::build::{BuildError, BuildJob, BuildResult, BuildStatus, build};
use crate::environment::quote;
use crate::registry::ReleaseSpec;
use crate::sign::SigningCertificate;
use crate::util::hash::ContentHash;
use crate::workspace::RunDir;

#[derive(Debug, Error)]
pub enum PackagingError {
  #[error("installer build failed: {0}")]
  Installer(BuildError),

  #[error("installer build succeeded but did not produce: {}", list(.0))]
  MissingOutputs(Vec<PathBuf>),

  #[error("failed to write '{}': {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write archive: {0}")]
  Archive(#[from] zip::result::ZipError),
}

fn list(paths: &[PathBuf]) -> String {
  paths.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", ")
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> PackagingError + '_ {
  move |source| PackagingError::Io {
    path: path.to_path_buf(),
    source,
  }
}

/// The release files delivered to the output directory.
#[derive(Debug, Serialize)]
pub struct ReleaseBundle {
  pub output_dir: PathBuf,
  /// Installer outputs and the certificate, in archive order.
  pub files: Vec<PathBuf>,
  pub archive: PathBuf,
  /// Fingerprint of the certificate the installer signed with.
  pub fingerprint: ContentHash,
  #[serde(skip)]
  pub installer: BuildResult,
}

/// Run the installer build and collect the release into `output_dir`.
///
/// The installer entry point gets `--local "<tree>" --sign "<certificate>"`.
/// Release outputs left in the installer checkout by an earlier run are
/// removed before it starts. `output_dir` is only touched once the installer succeeded and every
/// expected output exists; its previous contents are replaced.
pub async fn package(
  installer: &BuildJob,
  release: &ReleaseSpec,
  tree: &Path,
  cert: &SigningCertificate,
  output_dir: &Path,
  run: &RunDir,
) -> Result<ReleaseBundle, PackagingError> {
  let args = vec![
    "--local".to_string(),
    quote(tree),
    "--sign".to_string(),
    quote(&cert.cert_path),
  ];
  let checkout = &installer.env.working_dir;
  let outputs: Vec<PathBuf> = release.outputs.iter().map(|o| checkout.join(o)).collect();
  for stale in outputs.iter().filter(|p| p.exists()) {
    debug!(path = %stale.display(), "removing previous installer output");
    fs::remove_file(stale).map_err(io_err(stale))?;
  }

  let log_path = run.log_path("package", &installer.spec.name);
  let mut result = build(&installer.spec, &installer.env, &args, log_path).await;
  if let BuildStatus::Failed(e) = std::mem::replace(&mut result.status, BuildStatus::Succeeded) {
    return Err(PackagingError::Installer(e));
  }
  info!(component = %installer.spec.name, seconds = result.duration().as_secs(), "installer build succeeded");

  let missing: Vec<PathBuf> = outputs.iter().filter(|p| !p.is_file()).cloned().collect();
  if !missing.is_empty() {
    return Err(PackagingError::MissingOutputs(missing));
  }

  if output_dir.exists() {
    warn!(path = %output_dir.display(), "replacing previous release");
    fs::remove_dir_all(output_dir).map_err(io_err(output_dir))?;
  }
  fs::create_dir_all(output_dir).map_err(io_err(output_dir))?;

  let mut files = Vec::new();
  for source in &outputs {
    let Some(name) = source.file_name() else {
      continue;
    };
    let target = output_dir.join(name);
    fs::copy(source, &target).map_err(io_err(source))?;
    files.push(target);
  }
  let cert_target = output_dir.join(&release.certificate_name);
  fs::copy(&cert.cert_path, &cert_target).map_err(io_err(&cert.cert_path))?;
  files.push(cert_target);
  files.sort();

  let archive = output_dir.join(&release.archive_name);
  write_archive(&archive, &files)?;
  info!(path = %archive.display(), files = files.len(), "wrote release archive");

  Ok(ReleaseBundle {
    output_dir: output_dir.to_path_buf(),
    files,
    archive,
    fingerprint: cert.fingerprint.clone(),
    installer: result,
  })
}

/// Write `files` into a flat zip at `archive`, one entry per file name.
///
/// Entries are written in the given order with fixed timestamps and
/// permissions, so identical inputs give an identical archive.
pub fn write_archive(archive: &Path, files: &[PathBuf]) -> Result<(), PackagingError> {
  let out = File::create(archive).map_err(io_err(archive))?;
  let mut zip = ZipWriter::new(BufWriter::new(out));
  let options = SimpleFileOptions::default()
    .compression_method(CompressionMethod::Deflated)
    .last_modified_time(DateTime::default())
    .unix_permissions(0o644);

  for path in files {
    let name = path
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_default();
    zip.start_file(name, options)?;
    let mut reader = BufReader::new(File::open(path).map_err(io_err(path))?);
    io::copy(&mut reader, &mut zip).map_err(io_err(path))?;
  }

  zip.finish()?;
  Ok(())
}
