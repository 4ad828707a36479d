//! Test-signing certificate issuance.
//!
//! The certificate is produced by the SDK's certificate utility with a fixed
//! test-signing policy: self-signed, exportable private key written to the
//! Personal certificate store, code-signing usage only. It is scoped to one
//! run and never chains to a public trust root. Once the installer is
//! signed the key is deleted from the store again with the SDK's certificate
//! manager; see [`StoredKey`].

use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{ConfigError, ToolchainConfig};
use crate::consts::{CERT_STORE, CODE_SIGNING_EKU};
use crate::exec::{Invocation, ProcessError, run_process};
use crate::util::hash::{ContentHash, HashError, hash_file};

#[derive(Debug, Error)]
pub enum SigningSetupError {
  #[error("certificate utility not available: {0}")]
  Config(#[from] ConfigError),

  #[error("certificate utility '{}' does not exist", .0.display())]
  ToolUnavailable(PathBuf),

  #[error(transparent)]
  Process(#[from] ProcessError),

  #[error("certificate utility exited with code {code:?} (see {})", log_path.display())]
  Failed { code: Option<i32>, log_path: PathBuf },

  #[error("failed to remove test key '{subject}' from the certificate store, exit code {code:?} (see {})", log_path.display())]
  RemoveFailed {
    subject: String,
    code: Option<i32>,
    log_path: PathBuf,
  },

  #[error("certificate utility reported success but '{}' is missing or empty", .0.display())]
  MissingOutput(PathBuf),

  #[error("certificate '{}' does not exist", .0.display())]
  NotFound(PathBuf),

  #[error("failed to create certificate directory '{}': {source}", path.display())]
  CreateDir {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to fingerprint certificate: {0}")]
  Hash(#[from] HashError),
}

/// Where the certificate's private key lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum KeyLocation {
  /// Named system certificate store.
  CertStore(String),
  /// Supplied by the caller; the key is wherever they put it.
  External,
}

#[derive(Debug, Clone, Serialize)]
pub struct SigningCertificate {
  /// Subject common name, when this run issued the certificate.
  pub subject: Option<String>,
  pub cert_path: PathBuf,
  pub key_location: KeyLocation,
  /// SHA-256 of the certificate file.
  pub fingerprint: ContentHash,
}

impl SigningCertificate {
  /// Use a certificate file that was issued elsewhere.
  pub fn external(path: &Path) -> Result<Self, SigningSetupError> {
    if !path.is_file() {
      return Err(SigningSetupError::NotFound(path.to_path_buf()));
    }
    let cert_path = dunce::canonicalize(path).map_err(|_| SigningSetupError::NotFound(path.to_path_buf()))?;
    let fingerprint = hash_file(&cert_path)?;
    Ok(SigningCertificate {
      subject: None,
      cert_path,
      key_location: KeyLocation::External,
      fingerprint,
    })
  }
}

/// Issues a fresh self-signed test certificate per run.
#[derive(Debug, Clone)]
pub struct CertificateIssuer {
  tool: PathBuf,
  manager: PathBuf,
  subject: String,
}

impl CertificateIssuer {
  pub fn new(tool: impl Into<PathBuf>, manager: impl Into<PathBuf>, subject: impl Into<String>) -> Self {
    CertificateIssuer {
      tool: tool.into(),
      manager: manager.into(),
      subject: subject.into(),
    }
  }

  /// The issuer using the certificate utilities of the configured SDK.
  pub fn from_config(config: &ToolchainConfig, subject: impl Into<String>) -> Result<Self, SigningSetupError> {
    Ok(Self::new(config.cert_tool()?, config.cert_manager()?, subject))
  }

  pub fn tool(&self) -> &Path {
    &self.tool
  }

  pub fn manager(&self) -> &Path {
    &self.manager
  }

  pub fn subject(&self) -> &str {
    &self.subject
  }

  fn args(&self, file_name: &str) -> Vec<String> {
    vec![
      "-r".to_string(),
      "-pe".to_string(),
      "-ss".to_string(),
      CERT_STORE.to_string(),
      "-n".to_string(),
      format!("CN={}", self.subject),
      "-eku".to_string(),
      CODE_SIGNING_EKU.to_string(),
      file_name.to_string(),
    ]
  }

  /// Generate `<cert_dir>/<file_name>`.
  ///
  /// The private key lands in the certificate store; the returned
  /// [`StoredKey`] removes it again.
  pub async fn issue(
    &self,
    cert_dir: &Path,
    file_name: &str,
    log_path: PathBuf,
  ) -> Result<(SigningCertificate, StoredKey), SigningSetupError> {
    // Both are needed, so nothing is put in the store that cannot be taken out
    for tool in [&self.tool, &self.manager] {
      if !tool.is_file() {
        return Err(SigningSetupError::ToolUnavailable(tool.clone()));
      }
    }
    std::fs::create_dir_all(cert_dir).map_err(|source| SigningSetupError::CreateDir {
      path: cert_dir.to_path_buf(),
      source,
    })?;

    let invocation = Invocation {
      program: self.tool.display().to_string(),
      args: self.args(file_name),
      working_dir: cert_dir.to_path_buf(),
      env: Default::default(),
      log_path,
      raw_args: false,
    };
    let outcome = run_process(&invocation).await?;
    if !outcome.success() {
      return Err(SigningSetupError::Failed {
        code: outcome.code,
        log_path: outcome.log_path,
      });
    }
    let key = StoredKey {
      manager: self.manager.clone(),
      subject: self.subject.clone(),
      working_dir: cert_dir.to_path_buf(),
      armed: true,
    };

    let cert_path = cert_dir.join(file_name);
    let len = std::fs::metadata(&cert_path).map(|m| m.len()).unwrap_or(0);
    if len == 0 {
      return Err(SigningSetupError::MissingOutput(cert_path));
    }

    let fingerprint = hash_file(&cert_path)?;
    info!(subject = %self.subject, path = %cert_path.display(), fingerprint = %fingerprint, "issued test-signing certificate");

    let certificate = SigningCertificate {
      subject: Some(self.subject.clone()),
      cert_path,
      key_location: KeyLocation::CertStore(CERT_STORE.to_string()),
      fingerprint,
    };
    Ok((certificate, key))
  }
}

/// A test-signing key sitting in the certificate store.
///
/// [`StoredKey::remove`] deletes it once it is no longer needed. A key dropped
/// without being removed, e.g. because the run was interrupted, is deleted
/// synchronously from `Drop`.
#[derive(Debug)]
#[must_use = "the key stays in the certificate store until removed"]
pub struct StoredKey {
  manager: PathBuf,
  subject: String,
  working_dir: PathBuf,
  armed: bool,
}

impl StoredKey {
  pub fn subject(&self) -> &str {
    &self.subject
  }

  fn args(&self) -> Vec<String> {
    vec![
      "-del".to_string(),
      "-c".to_string(),
      "-n".to_string(),
      self.subject.clone(),
      "-s".to_string(),
      "-r".to_string(),
      "currentUser".to_string(),
      CERT_STORE.to_string(),
    ]
  }

  /// Delete the certificate and its private key from the store.
  pub async fn remove(mut self, log_path: PathBuf) -> Result<(), SigningSetupError> {
    let invocation = Invocation {
      program: self.manager.display().to_string(),
      args: self.args(),
      working_dir: self.working_dir.clone(),
      env: Default::default(),
      log_path,
      raw_args: false,
    };
    let outcome = run_process(&invocation).await;
    self.armed = false;

    let outcome = outcome?;
    if !outcome.success() {
      return Err(SigningSetupError::RemoveFailed {
        subject: self.subject.clone(),
        code: outcome.code,
        log_path: outcome.log_path,
      });
    }
    info!(subject = %self.subject, "removed test-signing key from certificate store");
    Ok(())
  }
}

impl Drop for StoredKey {
  fn drop(&mut self) {
    if !self.armed {
      return;
    }
    warn!(subject = %self.subject, "removing test-signing key left by an unfinished run");
    let status = std::process::Command::new(&self.manager)
      .args(self.args())
      .stdin(Stdio::null())
      .stdout(Stdio::null())
      .stderr(Stdio::null())
      .status();
    match status {
      Ok(status) if status.success() => {}
      Ok(status) => warn!(subject = %self.subject, code = ?status.code(), "test-signing key may still be in the certificate store"),
      Err(e) => warn!(subject = %self.subject, error = %e, "test-signing key may still be in the certificate store"),
    }
  }
}
