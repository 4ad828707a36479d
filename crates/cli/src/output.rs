//! Terminal output for `fetch`, `build` and `env`.
//!
//! Per-component status lines, the release summary (file sizes, certificate
//! fingerprint, run time) and failure reports with log excerpts. Colors are
//! dropped when the stream is not a terminal.

use std::time::Duration;

use anyhow::Context;
use owo_colors::{OwoColorize, Stream};

/// Markers in front of component status lines: built or fetched, failed,
/// run kept for inspection, unchanged checkout, log location.
pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const WARNING: &str = "⚠";
  pub const INFO: &str = "•";
  pub const ARROW: &str = "→";
}

/// First 12 hex digits of a certificate fingerprint, enough to tell two test
/// certificates apart in the summary.
pub fn truncate_hash(hash: &str) -> &str {
  let len = hash.len().min(12);
  &hash[..len]
}

/// Size of a release file (`Setup.exe`, the MSIs, the archive).
pub fn format_bytes(bytes: u64) -> String {
  const KB: u64 = 1024;
  const MB: u64 = KB * 1024;
  const GB: u64 = MB * 1024;

  if bytes >= GB {
    format!("{:.1} GB", bytes as f64 / GB as f64)
  } else if bytes >= MB {
    format!("{:.1} MB", bytes as f64 / MB as f64)
  } else if bytes >= KB {
    format!("{:.1} KB", bytes as f64 / KB as f64)
  } else {
    format!("{} B", bytes)
  }
}

/// Wall time of one component build, the installer build or a whole run.
/// Driver builds run for minutes, the certificate tool for milliseconds.
pub fn format_duration(duration: Duration) -> String {
  let secs = duration.as_secs();
  let millis = duration.subsec_millis();

  if secs >= 60 {
    format!("{}m {}s", secs / 60, secs % 60)
  } else if secs > 0 {
    format!("{}.{:02}s", secs, millis / 10)
  } else {
    format!("{}ms", millis)
  }
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

/// Top-level error of a failed command, on stderr.
pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_warning(message: &str) {
  eprintln!(
    "{} {}",
    symbols::WARNING.if_supports_color(Stream::Stderr, |s| s.yellow()),
    message.if_supports_color(Stream::Stderr, |s| s.yellow())
  );
}

/// Indented `label: value` line of the build summary or `env` listing.
pub fn print_stat(label: &str, value: &str) {
  println!("  {}: {}", label.if_supports_color(Stream::Stdout, |s| s.dimmed()), value);
}

/// Lines of a failed component's log shown under its failure.
const LOG_TAIL_LINES: usize = 5;

/// One failed component: `✗ <component> [<stage>]: <error>`, where its log
/// is and the last few lines of that log.
pub fn print_component_failure(component: &str, stage: &str, error: &str, log: Option<&std::path::Path>) {
  eprintln!(
    "  {} {} [{}]: {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    component.if_supports_color(Stream::Stderr, |s| s.bold()),
    stage,
    error
  );
  if let Some(log) = log {
    eprintln!(
      "    {} {}",
      symbols::ARROW.if_supports_color(Stream::Stderr, |s| s.dimmed()),
      log.display()
    );
    for line in pvbundle_lib::exec::log_tail(log, LOG_TAIL_LINES).lines() {
      eprintln!("      {}", line.if_supports_color(Stream::Stderr, |s| s.dimmed()));
    }
  }
}

/// `env --json` output.
pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}
