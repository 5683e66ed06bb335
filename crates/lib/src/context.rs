//! Per-run build context.
//!
//! A `BuildContext` is created once per pipeline invocation and passed to
//! every stage. It replaces process-wide configuration so that components can
//! be exercised in isolation.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::consts::JOBS_ENV;
use crate::template;

/// Build configuration selected for a run or a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildConfig {
  #[default]
  Debug,
  Release,
}

impl BuildConfig {
  pub fn as_str(self) -> &'static str {
    match self {
      BuildConfig::Debug => "debug",
      BuildConfig::Release => "release",
    }
  }
}

impl fmt::Display for BuildConfig {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for BuildConfig {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "debug" => Ok(BuildConfig::Debug),
      "release" => Ok(BuildConfig::Release),
      other => Err(format!("unknown build configuration '{other}' (expected debug or release)")),
    }
  }
}

/// Everything a stage needs to know about the current invocation.
#[derive(Debug, Clone)]
pub struct BuildContext {
  /// Configuration forced from the command line, if any.
  pub config_override: Option<BuildConfig>,

  /// Configuration used when neither an override nor a stage default applies.
  pub default_config: BuildConfig,

  /// Project root (the directory holding the manifest).
  pub root: PathBuf,

  /// Build-output directory for this run. Relative check files land here.
  pub out_dir: PathBuf,

  /// The builder's own definition files. A check file older than any of
  /// these is stale.
  pub definition_files: Vec<PathBuf>,

  /// Maximum number of workers in a parallel batch.
  pub parallelism: usize,

  /// Shell override for command execution.
  pub shell: Option<String>,
}

impl BuildContext {
  pub fn new(root: impl Into<PathBuf>, out_dir: impl Into<PathBuf>) -> Self {
    Self {
      config_override: None,
      default_config: BuildConfig::default(),
      root: root.into(),
      out_dir: out_dir.into(),
      definition_files: Vec::new(),
      parallelism: default_parallelism(),
      shell: None,
    }
  }

  pub fn with_config_override(mut self, config: Option<BuildConfig>) -> Self {
    self.config_override = config;
    self
  }

  pub fn with_default_config(mut self, config: BuildConfig) -> Self {
    self.default_config = config;
    self
  }

  pub fn with_definition_files(mut self, files: Vec<PathBuf>) -> Self {
    self.definition_files = files;
    self
  }

  pub fn with_parallelism(mut self, parallelism: usize) -> Self {
    self.parallelism = parallelism.max(1);
    self
  }

  pub fn with_shell(mut self, shell: Option<String>) -> Self {
    self.shell = shell;
    self
  }

  /// The configuration of the run as a whole.
  pub fn config(&self) -> BuildConfig {
    self.config_override.unwrap_or(self.default_config)
  }

  /// The configuration a stage runs with: the override wins, then the
  /// stage's own default, then the run default.
  pub fn config_for(&self, stage_default: Option<BuildConfig>) -> BuildConfig {
    self.config_override.or(stage_default).unwrap_or(self.default_config)
  }

  /// Anchor a resolved check-file path: relative paths live in `out_dir`.
  pub fn check_path(&self, resolved: impl AsRef<Path>) -> PathBuf {
    let resolved = resolved.as_ref();
    if resolved.is_absolute() {
      resolved.to_path_buf()
    } else {
      self.out_dir.join(resolved)
    }
  }

  /// Expand `{out}`, `{root}` and `{config}` in a command or check template.
  ///
  /// Substituted values are bracket-escaped so they survive path-template
  /// resolution unchanged.
  pub fn expand(&self, text: &str, config: BuildConfig) -> String {
    text
      .replace("{out}", &template::escape(&self.out_dir.to_string_lossy()))
      .replace("{root}", &template::escape(&self.root.to_string_lossy()))
      .replace("{config}", config.as_str())
  }
}

/// Number of workers used when nothing else is configured.
///
/// `KILN_JOBS` wins when it holds a positive number; otherwise the available
/// hardware parallelism is used.
pub fn default_parallelism() -> usize {
  if let Some(jobs) = std::env::var(JOBS_ENV)
    .ok()
    .and_then(|v| v.trim().parse::<usize>().ok())
    .filter(|n| *n > 0)
  {
    return jobs;
  }
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}
