//! Implementation of the `pvbundle build` command.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Result, anyhow};
use owo_colors::OwoColorize;

use pvbundle_lib::build::{BuildConfiguration, BuildReport};
use pvbundle_lib::config::ToolchainConfig;
use pvbundle_lib::pipeline::{BuildOptions, BuildSummary, PipelineError, default_output_dir, run_build};

use super::{load_registry, open_workspace, run_until_interrupted};
use crate::output::{
  format_bytes, format_duration, print_component_failure, print_stat, print_success, print_warning, symbols,
  truncate_hash,
};

pub struct BuildArgs {
  pub local: Option<PathBuf>,
  pub sign: Option<PathBuf>,
  pub checked: bool,
  pub output: Option<PathBuf>,
}

/// Execute the build command.
///
/// Toolchain roots come from `BUILD_ENV`, `VS`, `KIT` and `WIX`, falling back
/// to default install locations. A missing root fails the command before any
/// component is built.
pub fn cmd_build(workspace: &Path, registry: Option<&Path>, args: BuildArgs) -> Result<()> {
  let start = Instant::now();
  let set = load_registry(registry)?;
  let workspace = open_workspace(workspace);
  let options = BuildOptions {
    output_dir: args.output.unwrap_or_else(|| default_output_dir(workspace.root())),
    configuration: if args.checked {
      BuildConfiguration::Checked
    } else {
      BuildConfiguration::Free
    },
    local: args.local,
    sign: args.sign,
  };
  let toolchain = ToolchainConfig::detect();

  match run_until_interrupted(run_build(&set, &toolchain, &workspace, &options))? {
    Ok(summary) => {
      print_summary(&summary);
      println!();
      print_success(&format!(
        "Release written to {} ({})",
        summary.bundle.output_dir.display(),
        format_duration(start.elapsed())
      ));
      Ok(())
    }
    Err(e) => {
      let stage = e.stage();
      match &e {
        PipelineError::BuildsFailed(report) => print_build_failures(report),
        other => print_component_failure(&failed_component(other), stage, &other.to_string(), None),
      }
      let runs = workspace.scratch_dir().join("runs");
      if stage != "setup" && runs.is_dir() {
        print_warning(&format!("Logs and intermediates kept under {}", runs.display()));
      }
      Err(anyhow!(e).context(format!("build failed at {} stage", stage)))
    }
  }
}

/// Name shown for failures that are not tied to a single component build.
fn failed_component(e: &PipelineError) -> String {
  match e {
    PipelineError::Packaging(_) => "installer".to_string(),
    PipelineError::Signing(_) => "certificate".to_string(),
    PipelineError::Staging(_) => "staging".to_string(),
    _ => "configuration".to_string(),
  }
}

fn print_build_failures(report: &BuildReport) {
  for result in report.failures() {
    let error = result.error().map(|e| e.to_string()).unwrap_or_default();
    print_component_failure(&result.component, "build", &error, Some(&result.log_path));
  }
}

fn print_summary(summary: &BuildSummary) {
  for result in &summary.builds.results {
    println!(
      "  {} {} {} {}",
      symbols::SUCCESS.green(),
      result.component.cyan(),
      format!("{} artifacts", result.artifacts.len()).dimmed(),
      format_duration(result.duration()).dimmed()
    );
  }
  let installer = &summary.bundle.installer;
  println!(
    "  {} {} {}",
    symbols::SUCCESS.green(),
    installer.component.cyan(),
    format_duration(installer.duration()).dimmed()
  );
  println!();

  if let Some(staging) = &summary.staging {
    print_stat("Staged files", &staging.files.len().to_string());
  }
  let subject = summary.certificate.subject.as_deref().unwrap_or("supplied");
  print_stat(
    "Certificate",
    &format!("{} (SHA-256 {})", subject, truncate_hash(&summary.certificate.fingerprint.0)),
  );
  for file in &summary.bundle.files {
    let size = std::fs::metadata(file).map(|m| m.len()).unwrap_or(0);
    print_stat("File", &format!("{} ({})", file.display(), format_bytes(size)));
  }
  print_stat("Archive", &summary.bundle.archive.display().to_string());
}
