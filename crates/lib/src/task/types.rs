//! Types for task execution.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::stale::DeepPredicate;

/// Error type a callback task may return.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// In-process task body. Receives the target when run per target.
///
/// `Ok(true)` is success, `Ok(false)` a plain failure.
pub type Callback = Arc<dyn Fn(Option<&Path>) -> Result<bool, CallbackError> + Send + Sync>;

/// The work a rule performs.
#[derive(Clone)]
pub enum Task {
  /// A command line; path placeholders are resolved against the target.
  Command(String),

  /// An in-process function.
  Callback(Callback),
}

impl Task {
  pub fn command(template: impl Into<String>) -> Self {
    Task::Command(template.into())
  }

  pub fn callback<F>(f: F) -> Self
  where
    F: Fn(Option<&Path>) -> Result<bool, CallbackError> + Send + Sync + 'static,
  {
    Task::Callback(Arc::new(f))
  }
}

impl fmt::Debug for Task {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Task::Command(template) => f.debug_tuple("Command").field(template).finish(),
      Task::Callback(_) => f.write_str("Callback(..)"),
    }
  }
}

/// A set of targets, the check files that prove each was processed, and an
/// optional deep-dependency predicate.
#[derive(Clone)]
pub struct Rule {
  /// Name used in logs and error messages.
  pub name: String,

  /// The rule's input files.
  pub targets: Vec<PathBuf>,

  /// Check-file templates, resolved per target.
  pub checks: Vec<String>,

  /// Consulted for targets whose direct check files are up to date.
  pub deep: Option<Arc<DeepPredicate>>,
}

impl Rule {
  pub fn new(name: impl Into<String>, targets: Vec<PathBuf>, checks: Vec<String>) -> Self {
    Self {
      name: name.into(),
      targets,
      checks,
      deep: None,
    }
  }

  pub fn with_deep(mut self, deep: Arc<DeepPredicate>) -> Self {
    self.deep = Some(deep);
    self
  }
}

impl fmt::Debug for Rule {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Rule")
      .field("name", &self.name)
      .field("targets", &self.targets)
      .field("checks", &self.checks)
      .field("deep", &self.deep.is_some())
      .finish()
  }
}

/// One captured error from a parallel batch.
#[derive(Debug)]
pub struct TaskFailure {
  /// Target the worker was processing.
  pub target: PathBuf,

  /// The error the worker hit.
  pub error: TaskError,
}

impl fmt::Display for TaskFailure {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}: {}", self.target.display(), self.error)
  }
}

/// Errors that can occur while running tasks.
#[derive(Debug, Error)]
pub enum TaskError {
  /// The process could not be spawned or read from.
  #[error("failed to run '{cmd}': {source}")]
  Process {
    cmd: String,
    #[source]
    source: io::Error,
  },

  /// The command exited unsuccessfully.
  #[error("command failed with exit code {code:?}: {cmd}\n{output}")]
  CmdFailed {
    cmd: String,
    code: Option<i32>,
    output: String,
  },

  /// A callback returned `Ok(false)`.
  #[error("{name}: callback reported failure")]
  CallbackFailed { name: String },

  /// A callback returned an error.
  #[error("{name}: {source}")]
  Callback {
    name: String,
    #[source]
    source: CallbackError,
  },

  /// A callback panicked.
  #[error("{name}: callback panicked")]
  Panicked { name: String },

  /// The directory for a check file could not be created.
  #[error("failed to create output directory '{path}': {source}")]
  OutputDir {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  /// A check file could not be created or bumped.
  #[error("failed to mark '{path}' done: {source}")]
  Touch {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  /// One or more workers of a parallel batch failed.
  #[error("{rule}: {failed} of {total} target(s) failed")]
  BatchFailed {
    rule: String,
    total: usize,
    failed: usize,
    errors: Vec<TaskFailure>,
  },
}

impl TaskError {
  /// Whether this is a plain unsuccessful run (nonzero exit or a callback
  /// returning `false`) rather than an error raised while running.
  pub fn is_unsuccessful(&self) -> bool {
    matches!(self, TaskError::CmdFailed { .. } | TaskError::CallbackFailed { .. })
  }
}

/// Summary of a successful executor call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecReport {
  /// Number of task invocations performed.
  pub ran: usize,

  /// True when everything was up to date and nothing ran.
  pub skipped: bool,
}

impl ExecReport {
  pub fn skipped() -> Self {
    Self { ran: 0, skipped: true }
  }

  pub fn ran(count: usize) -> Self {
    Self {
      ran: count,
      skipped: false,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unsuccessful_vs_raised() {
    let failed = TaskError::CmdFailed {
      cmd: "cc".to_string(),
      code: Some(1),
      output: String::new(),
    };
    let declined = TaskError::CallbackFailed { name: "gen".to_string() };
    let panicked = TaskError::Panicked { name: "gen".to_string() };
    assert!(failed.is_unsuccessful());
    assert!(declined.is_unsuccessful());
    assert!(!panicked.is_unsuccessful());
  }

  #[test]
  fn cmd_failure_message_carries_output() {
    let err = TaskError::CmdFailed {
      cmd: "cc -c a.c".to_string(),
      code: Some(1),
      output: "a.c:1: error: expected ';'\n".to_string(),
    };
    let message = err.to_string();
    assert!(message.contains("exit code Some(1)"));
    assert!(message.contains("expected ';'"));
  }

  #[test]
  fn task_debug_hides_callback() {
    let task = Task::callback(|_| Ok(true));
    assert_eq!(format!("{task:?}"), "Callback(..)");
    assert_eq!(format!("{:?}", Task::command("cc")), "Command(\"cc\")");
  }

  #[test]
  fn batch_failure_display() {
    let err = TaskError::BatchFailed {
      rule: "compile".to_string(),
      total: 5,
      failed: 1,
      errors: vec![],
    };
    assert_eq!(err.to_string(), "compile: 1 of 5 target(s) failed");
  }
}
