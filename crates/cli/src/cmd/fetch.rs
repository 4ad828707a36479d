//! Implementation of the `pvbundle fetch` command.

use std::path::Path;
use std::time::Instant;

use anyhow::{Result, bail};
use owo_colors::OwoColorize;

use pvbundle_lib::fetch::{FetchAction, FetchReport};
use pvbundle_lib::pipeline::{PipelineError, run_fetch};

use super::{load_registry, open_workspace, run_until_interrupted};
use crate::output::{format_duration, print_component_failure, print_success, symbols};

/// Clone or update every registered component.
///
/// Every component is attempted even when some fail; the failures are listed
/// together and the command exits non-zero.
pub fn cmd_fetch(workspace: &Path, registry: Option<&Path>) -> Result<()> {
  let start = Instant::now();
  let set = load_registry(registry)?;
  let workspace = open_workspace(workspace);

  match run_until_interrupted(run_fetch(&set, &workspace))? {
    Ok(report) => {
      print_report(&report);
      println!();
      print_success(&format!(
        "Fetched {} components into {} ({})",
        report.fetched.len(),
        workspace.root().display(),
        format_duration(start.elapsed())
      ));
      Ok(())
    }
    Err(PipelineError::FetchFailed(report)) => {
      print_report(&report);
      eprintln!();
      for failure in &report.failed {
        print_component_failure(&failure.component, "fetch", &failure.error.to_string(), None);
      }
      bail!(
        "{} of {} components failed to fetch",
        report.failed.len(),
        report.failed.len() + report.fetched.len()
      )
    }
    Err(e) => Err(e.into()),
  }
}

fn print_report(report: &FetchReport) {
  for outcome in &report.fetched {
    let (symbol, action) = match outcome.action {
      FetchAction::Cloned => (symbols::SUCCESS, "cloned"),
      FetchAction::Updated => (symbols::SUCCESS, "updated"),
      FetchAction::Unchanged => (symbols::INFO, "unchanged"),
    };
    println!(
      "  {} {} {} {}",
      symbol.green(),
      outcome.component.cyan(),
      action,
      (&outcome.commit[..outcome.commit.len().min(8)]).dimmed()
    );
  }
}
