//! Implementation of the `kiln clean` command.

use std::path::Path;

use anyhow::Result;

use kiln_lib::pipeline;

use crate::output::{print_info, print_success};

pub fn cmd_clean(file: &Path) -> Result<()> {
  match pipeline::clean(file)? {
    Some(path) => print_success(&format!("Removed {}", path.display())),
    None => print_info("Nothing to clean"),
  }
  Ok(())
}
