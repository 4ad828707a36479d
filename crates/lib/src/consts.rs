/// Application name, used for the scratch directory and lock metadata.
pub const APP_NAME: &str = "pvbundle";

/// Directory under the workspace that holds per-run scratch directories.
pub const SCRATCH_DIR: &str = ".pvbundle";

/// Number of run directories kept under the scratch directory. Older ones are
/// removed when a new run starts.
pub const RUNS_KEPT: usize = 10;

/// Default name of the output directory, relative to the workspace.
pub const DEFAULT_OUTPUT_DIR: &str = "output";

/// Build environment setup script looked up inside `BUILD_ENV`.
#[cfg(windows)]
pub const SETUP_SCRIPT: &str = "SetupBuildEnv.cmd";
#[cfg(not(windows))]
pub const SETUP_SCRIPT: &str = "SetupBuildEnv.sh";

/// Certificate generation utility, relative to the platform SDK root.
#[cfg(windows)]
pub const CERT_TOOL: &str = "bin/x64/makecert.exe";
#[cfg(not(windows))]
pub const CERT_TOOL: &str = "bin/makecert";

/// Certificate store manager, relative to the platform SDK root. Removes the
/// issued key from the store once the installer is signed.
#[cfg(windows)]
pub const CERT_MANAGER: &str = "bin/x64/certmgr.exe";
#[cfg(not(windows))]
pub const CERT_MANAGER: &str = "bin/certmgr";

/// Certificate store the private key is written to. The installer's signing
/// step looks the key up in the Personal store.
pub const CERT_STORE: &str = "my";

/// Extended key usage OID for code signing.
pub const CODE_SIGNING_EKU: &str = "1.3.6.1.5.5.7.3.3";
