//! Manifest types for kiln.
//!
//! A manifest is the project's build definition, read from `kiln.toml`:
//!
//! ```toml
//! [build]
//! out_dir = "build"
//!
//! [[resource]]
//! name = "fmt-tool"
//! url = "https://example.com/fmt.git"
//! version = "v1.2.0"
//! bootstrap = "make"
//! artifact = "bin/fmt"
//!
//! [[stage]]
//! name = "compile"
//! kind = "compile"
//! sources = ["src"]
//! extensions = [".c"]
//! checks = ["obj/[stem].o"]
//! command = "cc -c [] -o {out}/obj/[stem].o"
//! ```
//!
//! Values the format allows to be absent but a run needs are kept optional
//! here and checked by [`Manifest::validate`](super::Manifest::validate), so
//! a missing value is reported by name rather than as a parse error.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::context::BuildConfig;
use crate::resource::ResourceKind;

/// A parsed `kiln.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
  #[serde(default)]
  pub build: BuildSection,

  #[serde(default, rename = "resource")]
  pub resources: Vec<ResourceDef>,

  #[serde(default, rename = "stage")]
  pub stages: Vec<StageDef>,
}

/// The `[build]` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildSection {
  /// Build-output root, relative to the manifest directory.
  pub out_dir: Option<PathBuf>,

  /// Configuration used when neither the command line nor a stage picks one.
  pub default_config: Option<BuildConfig>,

  /// Shell used to run commands instead of the platform default.
  pub shell: Option<String>,

  /// Default worker count for parallel stages.
  pub jobs: Option<usize>,
}

/// A `[[resource]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceDef {
  pub name: String,

  #[serde(default = "default_resource_kind")]
  pub kind: ResourceKind,

  pub url: Option<String>,
  pub version: Option<String>,

  /// Working-copy directory relative to the manifest directory.
  pub dir: Option<PathBuf>,

  /// Command run inside the checkout for tools and toolchains.
  pub bootstrap: Option<String>,

  /// Manifest a sub-build runs, relative to the checkout.
  pub manifest: Option<PathBuf>,

  /// Path inside the checkout that must exist once bootstrapped.
  pub artifact: Option<PathBuf>,
}

fn default_resource_kind() -> ResourceKind {
  ResourceKind::Tool
}

/// Pipeline phase a stage belongs to. Stages run in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
  Generate,
  Format,
  Compile,
  Link,
}

impl StageKind {
  /// Whether stages of this kind fan out per target unless told otherwise.
  pub fn parallel_by_default(self) -> bool {
    matches!(self, StageKind::Format | StageKind::Compile)
  }
}

impl fmt::Display for StageKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      StageKind::Generate => "generate",
      StageKind::Format => "format",
      StageKind::Compile => "compile",
      StageKind::Link => "link",
    };
    f.write_str(name)
  }
}

/// A `[[stage]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageDef {
  pub name: String,
  pub kind: StageKind,

  /// Files or directories (searched recursively), relative to the manifest
  /// directory.
  #[serde(default)]
  pub sources: Vec<PathBuf>,

  /// Extensions a source file must have; empty accepts every file.
  #[serde(default)]
  pub extensions: Vec<String>,

  /// Check-file templates, resolved per target.
  #[serde(default)]
  pub checks: Vec<String>,

  pub command: Option<String>,

  /// Run once per stale target instead of once per stage.
  pub parallel: Option<bool>,

  /// Make-style dependency file template feeding the deep predicate.
  pub depfile: Option<String>,

  /// Single guard file; makes the stage run at most once.
  pub guard: Option<String>,

  /// Stage default configuration.
  pub config: Option<BuildConfig>,
}

impl StageDef {
  pub fn is_parallel(&self) -> bool {
    self.parallel.unwrap_or_else(|| self.kind.parallel_by_default())
  }
}
