//! Staleness analysis over check files.
//!
//! A target is up to date when every one of its check files exists and is at
//! least as new as the target itself and the builder's definition files.
//! Nothing is cached between runs: the filesystem is the only record of what
//! has been done.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Serialize;
use tracing::{debug, warn};

use crate::context::BuildContext;
use crate::template::{self, Segment};
use crate::util::fs::{modified, newest_modified};

/// Error type a deep-dependency predicate may return.
pub type PredicateError = Box<dyn std::error::Error + Send + Sync>;

/// Caller-supplied check for dependencies the direct comparison cannot see,
/// such as headers listed in a compiler-emitted dependency file.
///
/// Receives the target and its resolved check files; `Ok(true)` means stale.
pub type DeepPredicate = dyn Fn(&Path, &[PathBuf]) -> Result<bool, PredicateError> + Send + Sync;

/// Why a target needs rework.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum StaleReason {
  /// A check file does not exist.
  MissingCheckFile { path: PathBuf },

  /// The target's own modification time could not be read.
  TargetUnreadable,

  /// The target was modified after a check file.
  TargetNewer { check_file: PathBuf },

  /// A builder definition file was modified after a check file.
  DefinitionNewer { check_file: PathBuf },

  /// The deep-dependency predicate reported the target stale.
  DeepDependency,

  /// The deep-dependency predicate failed; treated as stale.
  DeepPredicateFailed { message: String },
}

impl std::fmt::Display for StaleReason {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      StaleReason::MissingCheckFile { path } => write!(f, "missing {}", path.display()),
      StaleReason::TargetUnreadable => write!(f, "target unreadable"),
      StaleReason::TargetNewer { check_file } => write!(f, "newer than {}", check_file.display()),
      StaleReason::DefinitionNewer { check_file } => {
        write!(f, "build definition newer than {}", check_file.display())
      }
      StaleReason::DeepDependency => write!(f, "dependency changed"),
      StaleReason::DeepPredicateFailed { message } => write!(f, "dependency check failed: {message}"),
    }
  }
}

/// A stale target's check files and the reason it was flagged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaleEntry {
  pub check_files: Vec<PathBuf>,
  #[serde(flatten)]
  pub reason: StaleReason,
}

/// Stale targets mapped to their resolved check files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct StaleSet(BTreeMap<PathBuf, StaleEntry>);

impl StaleSet {
  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn contains(&self, target: &Path) -> bool {
    self.0.contains_key(target)
  }

  pub fn check_files(&self, target: &Path) -> Option<&[PathBuf]> {
    self.0.get(target).map(|e| e.check_files.as_slice())
  }

  pub fn reason(&self, target: &Path) -> Option<&StaleReason> {
    self.0.get(target).map(|e| &e.reason)
  }

  pub fn targets(&self) -> impl Iterator<Item = &PathBuf> {
    self.0.keys()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &StaleEntry)> {
    self.0.iter()
  }

  /// Every check file owned by a stale target.
  pub fn all_check_files(&self) -> impl Iterator<Item = &PathBuf> {
    self.0.values().flat_map(|e| e.check_files.iter())
  }

  pub(crate) fn insert(&mut self, target: PathBuf, entry: StaleEntry) {
    self.0.insert(target, entry);
  }
}

impl IntoIterator for StaleSet {
  type Item = (PathBuf, StaleEntry);
  type IntoIter = std::collections::btree_map::IntoIter<PathBuf, StaleEntry>;

  fn into_iter(self) -> Self::IntoIter {
    self.0.into_iter()
  }
}

/// Resolve check-file templates for one target, anchored in the output directory.
pub fn resolve_check_files(ctx: &BuildContext, target: &Path, templates: &[Vec<Segment>]) -> Vec<PathBuf> {
  templates
    .iter()
    .map(|segments| ctx.check_path(template::resolve_segments(segments, target)))
    .collect()
}

/// Compute the subset of `targets` that needs rework.
///
/// # Arguments
///
/// * `ctx` - Build context; supplies the output directory and definition files
/// * `targets` - The rule's input files
/// * `check_templates` - Path templates resolved per target into check files
/// * `deep` - Optional deep-dependency predicate consulted for otherwise fresh targets
pub fn analyze(
  ctx: &BuildContext,
  targets: &[PathBuf],
  check_templates: &[String],
  deep: Option<&DeepPredicate>,
) -> StaleSet {
  let templates: Vec<Vec<Segment>> = check_templates.iter().map(|t| template::parse(t)).collect();
  let definitions = newest_modified(&ctx.definition_files);
  let mut stale = StaleSet::default();

  for target in targets {
    let check_files = resolve_check_files(ctx, target, &templates);
    if let Some(reason) = verdict(target, &check_files, definitions, deep) {
      debug!(target = %target.display(), reason = %reason, "stale");
      stale.insert(target.clone(), StaleEntry { check_files, reason });
    }
  }

  debug!(targets = targets.len(), stale = stale.len(), "staleness analysis complete");
  stale
}

/// Decide whether a single target is stale.
///
/// `definitions` is the newest modification time among the builder's
/// definition files, if any exist.
pub fn verdict(
  target: &Path,
  check_files: &[PathBuf],
  definitions: Option<SystemTime>,
  deep: Option<&DeepPredicate>,
) -> Option<StaleReason> {
  // Oldest check file; a check file that vanished since the listing counts as missing.
  let mut oldest: Option<(SystemTime, &PathBuf)> = None;
  for check in check_files {
    match modified(check) {
      Ok(time) => {
        if oldest.is_none_or(|(t, _)| time < t) {
          oldest = Some((time, check));
        }
      }
      Err(_) => return Some(StaleReason::MissingCheckFile { path: check.clone() }),
    }
  }

  if let Some((check_time, check_file)) = oldest {
    let target_time = match modified(target) {
      Ok(time) => time,
      Err(e) => {
        warn!(target = %target.display(), error = %e, "cannot read target modification time");
        return Some(StaleReason::TargetUnreadable);
      }
    };

    if target_time > check_time {
      return Some(StaleReason::TargetNewer {
        check_file: check_file.clone(),
      });
    }

    if definitions.is_some_and(|d| d > check_time) {
      return Some(StaleReason::DefinitionNewer {
        check_file: check_file.clone(),
      });
    }
  }

  let predicate = deep?;
  match panic::catch_unwind(AssertUnwindSafe(|| predicate(target, check_files))) {
    Ok(Ok(true)) => Some(StaleReason::DeepDependency),
    Ok(Ok(false)) => None,
    Ok(Err(e)) => Some(StaleReason::DeepPredicateFailed { message: e.to_string() }),
    Err(_) => Some(StaleReason::DeepPredicateFailed {
      message: "predicate panicked".to_string(),
    }),
  }
}
