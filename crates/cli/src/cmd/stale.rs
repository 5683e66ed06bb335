//! Implementation of the `kiln stale` command.
//!
//! Runs the staleness analysis for every stage and reports what a build
//! would run. Nothing is executed and no check file is touched.

use std::path::Path;

use anyhow::Result;

use kiln_lib::pipeline::{BuildOptions, Project};

use crate::output::{OutputFormat, display_path, print_info, print_item, print_json, print_success};

pub fn cmd_stale(file: &Path, options: &BuildOptions, output: OutputFormat) -> Result<()> {
  let project = Project::load(file, options)?;
  let report = project.staleness()?;

  if output.is_json() {
    return print_json(&report);
  }

  let mut any = false;
  for stage in &report {
    if stage.stale.is_empty() {
      print_info(&format!("{} [{}]: up to date", stage.name, stage.config));
      continue;
    }
    any = true;
    print_info(&format!(
      "{} [{}]: {} of {} stale",
      stage.name,
      stage.config,
      stage.stale.len(),
      stage.targets
    ));
    for (target, entry) in stage.stale.iter() {
      print_item(&format!("{}: {}", display_path(target, &project.root), entry.reason));
    }
  }

  if !any {
    println!();
    print_success("Everything up to date");
  }
  Ok(())
}
