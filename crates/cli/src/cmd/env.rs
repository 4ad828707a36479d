//! Implementation of the `pvbundle env` command.
//!
//! Validates the toolchain configuration and shows the environment each
//! component's build would run in, without running anything.

use std::path::Path;

use anyhow::{Context, Result};
use owo_colors::OwoColorize;

use pvbundle_lib::config::{ToolchainConfig, required_roots};
use pvbundle_lib::pipeline::resolve_all;

use super::{load_registry, open_workspace};
use crate::output::{print_json, print_stat, symbols};

pub fn cmd_env(workspace: &Path, registry: Option<&Path>, json: bool) -> Result<()> {
  let set = load_registry(registry)?;
  let workspace = open_workspace(workspace);
  let config = ToolchainConfig::detect()
    .validate(&required_roots(&set, true))
    .context("Invalid toolchain configuration")?;
  let jobs = resolve_all(&set, &config, &workspace)?;

  if json {
    let items: Vec<_> = jobs
      .iter()
      .map(|job| {
        serde_json::json!({
          "component": job.spec.name,
          "kind": job.spec.kind,
          "role": job.spec.role,
          "environment": job.env,
        })
      })
      .collect();
    return print_json(&items);
  }

  for (var, value) in config.exports() {
    print_stat(var, &value);
  }
  for job in &jobs {
    println!();
    println!(
      "{} {} {}",
      symbols::INFO.blue(),
      job.spec.name.cyan(),
      format!("({})", job.spec.kind).dimmed()
    );
    print_stat("Directory", &job.env.working_dir.display().to_string());
    print_stat("Shell", &format!("{} {}", job.env.launcher.program, job.env.launcher.args.join(" ")));
    if let Some(prelude) = &job.env.launcher.prelude {
      print_stat("Prelude", prelude);
    }
  }

  Ok(())
}
