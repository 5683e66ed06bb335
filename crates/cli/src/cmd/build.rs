//! Implementation of the `kiln build` command.
//!
//! Brings external resources to their pinned revisions, then runs every
//! stale stage of the manifest in kind order.

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::debug;

use kiln_lib::pipeline::{self, BuildOptions, BuildSummary};
use kiln_lib::resource::{ResourceStatus, short_commit};

use crate::output::{OutputFormat, format_duration, print_info, print_json, print_stat, print_success};

pub fn cmd_build(file: &Path, options: &BuildOptions, output: OutputFormat) -> Result<()> {
  let start = Instant::now();
  debug!(manifest = %file.display(), jobs = ?options.jobs, config = ?options.config, "build requested");

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let summary = rt.block_on(pipeline::build(file, options))?;

  if output.is_json() {
    return print_json(&summary);
  }

  print_summary(&summary);
  print_stat("Duration", &format_duration(start.elapsed()));
  Ok(())
}

fn print_summary(summary: &BuildSummary) {
  for res in &summary.resources {
    print_info(&format!(
      "{} @ {} ({})",
      res.name,
      short_commit(&res.commit),
      resource_state(res)
    ));
  }

  for stage in &summary.stages {
    let state = if stage.skipped {
      "up to date".to_string()
    } else {
      format!("ran {}", stage.ran)
    };
    print_info(&format!("{} [{}]: {}", stage.name, stage.config, state));
  }

  println!();
  if summary.up_to_date() {
    print_success("Everything up to date");
  } else {
    print_success("Build complete!");
  }
  print_stat("Commands run", &summary.commands_run().to_string());
}

fn resource_state(res: &ResourceStatus) -> &'static str {
  if res.cloned {
    "cloned"
  } else if res.repinned {
    "repinned"
  } else if res.bootstrapped {
    "bootstrapped"
  } else {
    "up to date"
  }
}
