mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use crate::output::print_error;

/// Fetch, build, test-sign and package the Windows PV drivers release
#[derive(Parser)]
#[command(name = "pvbundle")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Log level (defaults to RUST_LOG, then info)
  #[arg(long, global = true, value_enum)]
  log_level: Option<LogLevel>,

  /// Directory holding one checkout per component
  #[arg(short, long, global = true, default_value = ".")]
  workspace: PathBuf,

  /// Component registry (JSON); the built-in registry when omitted
  #[arg(long, global = true)]
  registry: Option<PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
  Error,
  Warn,
  Info,
  Debug,
  Trace,
}

impl LogLevel {
  fn as_filter(self) -> &'static str {
    match self {
      LogLevel::Error => "error",
      LogLevel::Warn => "warn",
      LogLevel::Info => "info",
      LogLevel::Debug => "debug",
      LogLevel::Trace => "trace",
    }
  }
}

#[derive(Subcommand)]
enum Commands {
  /// Clone or update every component repository
  Fetch,

  /// Build every component, stage, sign and package the release
  Build {
    /// Prebuilt installer input tree; skips component builds and staging
    #[arg(long)]
    local: Option<PathBuf>,

    /// Existing test-signing certificate; skips certificate issuance
    #[arg(long)]
    sign: Option<PathBuf>,

    /// Build the checked (debug) driver configuration
    #[arg(long)]
    checked: bool,

    /// Release output directory (default: <workspace>/output)
    #[arg(short, long)]
    output: Option<PathBuf>,
  },

  /// Show the resolved build environment of every component
  Env {
    /// Output as JSON
    #[arg(long)]
    json: bool,
  },
}

fn init_tracing(level: Option<LogLevel>) {
  let filter = match level {
    Some(level) => EnvFilter::new(format!("pvbundle_lib={0},pvbundle={0}", level.as_filter())),
    None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
  };

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  init_tracing(cli.log_level);

  let result = match cli.command {
    Commands::Fetch => cmd::cmd_fetch(&cli.workspace, cli.registry.as_deref()),
    Commands::Build {
      local,
      sign,
      checked,
      output,
    } => cmd::cmd_build(
      &cli.workspace,
      cli.registry.as_deref(),
      cmd::BuildArgs {
        local,
        sign,
        checked,
        output,
      },
    ),
    Commands::Env { json } => cmd::cmd_env(&cli.workspace, cli.registry.as_deref(), json),
  };

  match result {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      print_error(&format!("{:#}", e));
      ExitCode::FAILURE
    }
  }
}
