//! Task execution.
//!
//! This module runs a [`Task`] in one of three forms:
//! - [`run_guarded`]: once, unless a single guard file already exists
//! - [`run_serial`]: once, if any target of a rule is stale
//! - [`run_parallel`]: once per stale target, fanned out over a bounded pool
//!
//! Completion is recorded only by touching check files. A failed task leaves
//! its check files alone so the next run retries it.

pub mod cmd;
pub mod types;

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::context::BuildContext;
use crate::stale;
use crate::template;
use crate::util::fs::{ensure_dir, touch};

pub use cmd::{CmdOutput, run_cmd, run_cmd_streaming};
pub use types::{Callback, CallbackError, ExecReport, Rule, Task, TaskError, TaskFailure};

/// Run `task` once unless `guard` exists; touch `guard` on success.
///
/// Command templates are resolved against the guard path.
pub async fn run_guarded(ctx: &BuildContext, name: &str, task: &Task, guard: &Path) -> Result<ExecReport, TaskError> {
  let guard = ctx.check_path(guard);
  if guard.exists() {
    debug!(task = name, guard = %guard.display(), "guard present, skipping");
    return Ok(ExecReport::skipped());
  }

  info!(task = name, "running");
  prepare_outputs(std::slice::from_ref(&guard))?;
  let output = run_task(ctx, name, task, &guard, None).await?;
  log_output(name, None, &output);
  mark_done(std::slice::from_ref(&guard))?;
  Ok(ExecReport::ran(1))
}

/// Run `task` once if any target of `rule` is stale.
///
/// Command templates are resolved against the build-output directory. On
/// success every check file of every stale target is touched.
pub async fn run_serial(ctx: &BuildContext, task: &Task, rule: &Rule) -> Result<ExecReport, TaskError> {
  let stale = stale::analyze(ctx, &rule.targets, &rule.checks, rule.deep.as_deref());
  if stale.is_empty() {
    debug!(rule = %rule.name, "up to date");
    return Ok(ExecReport::skipped());
  }

  info!(rule = %rule.name, stale = stale.len(), "running");
  let checks: Vec<PathBuf> = stale.all_check_files().cloned().collect();
  prepare_outputs(&checks)?;
  let output = run_task(ctx, &rule.name, task, &ctx.out_dir, None).await?;
  log_output(&rule.name, None, &output);
  mark_done(&checks)?;
  Ok(ExecReport::ran(1))
}

/// Run `task` once per stale target of `rule`, in parallel.
///
/// Workers are bounded by `ctx.parallelism` and are never cancelled: once
/// dispatched, every worker runs to completion whatever its siblings do. A
/// worker that succeeds touches its own check files even if a sibling has
/// already failed.
///
/// Workers share only a locked list of raised errors and an atomic failure
/// flag set by plain unsuccessful runs (nonzero exit, callback returning
/// `false`). The batch fails if either is non-empty/set; every captured error
/// is logged individually first.
pub async fn run_parallel(ctx: &BuildContext, task: &Task, rule: &Rule) -> Result<ExecReport, TaskError> {
  let stale = stale::analyze(ctx, &rule.targets, &rule.checks, rule.deep.as_deref());
  if stale.is_empty() {
    debug!(rule = %rule.name, "up to date");
    return Ok(ExecReport::skipped());
  }

  let total = stale.len();
  info!(rule = %rule.name, stale = total, parallelism = ctx.parallelism, "dispatching workers");

  let errors: Arc<Mutex<Vec<TaskFailure>>> = Arc::new(Mutex::new(Vec::new()));
  let any_failed = Arc::new(AtomicBool::new(false));
  let semaphore = Arc::new(Semaphore::new(ctx.parallelism.max(1)));
  let mut join_set = JoinSet::new();

  for (target, entry) in stale {
    let ctx = ctx.clone();
    let task = task.clone();
    let name = rule.name.clone();
    let errors = errors.clone();
    let any_failed = any_failed.clone();
    let semaphore = semaphore.clone();

    join_set.spawn(async move {
      // The semaphore is never closed, so acquire cannot fail.
      let _permit = semaphore.acquire_owned().await.ok();

      let result: Result<(), TaskError> = async {
        prepare_outputs(&entry.check_files)?;
        let output = run_task(&ctx, &name, &task, &target, Some(&target)).await?;
        log_output(&name, Some(&target), &output);
        mark_done(&entry.check_files)
      }
      .await;

      match result {
        Ok(()) => true,
        Err(e) if e.is_unsuccessful() => {
          error!(rule = %name, target = %target.display(), "{e}");
          any_failed.store(true, Ordering::SeqCst);
          false
        }
        Err(e) => {
          record_failure(&errors, TaskFailure { target, error: e });
          false
        }
      }
    });
  }

  let mut succeeded = 0;
  while let Some(joined) = join_set.join_next().await {
    match joined {
      Ok(true) => succeeded += 1,
      Ok(false) => {}
      Err(e) => {
        // Worker tasks catch callback panics themselves; this is a bug path.
        warn!(rule = %rule.name, error = %e, "worker aborted");
        any_failed.store(true, Ordering::SeqCst);
      }
    }
  }

  let errors = drain_failures(&errors);

  for failure in &errors {
    error!(rule = %rule.name, "{failure}");
  }

  if !errors.is_empty() || any_failed.load(Ordering::SeqCst) {
    return Err(TaskError::BatchFailed {
      rule: rule.name.clone(),
      total,
      failed: total - succeeded,
      errors,
    });
  }

  debug!(rule = %rule.name, ran = total, "batch complete");
  Ok(ExecReport::ran(total))
}

/// Run one task invocation and return its captured output.
///
/// Command templates are resolved against `base`; callbacks receive `target`.
pub async fn run_task(
  ctx: &BuildContext,
  name: &str,
  task: &Task,
  base: &Path,
  target: Option<&Path>,
) -> Result<String, TaskError> {
  match task {
    Task::Command(command) => {
      let cmd = template::resolve(command, base);
      let output = run_cmd(&cmd, &ctx.root, ctx.shell.as_deref()).await?;
      if output.success() {
        Ok(output.output)
      } else {
        Err(TaskError::CmdFailed {
          cmd,
          code: output.code,
          output: output.output,
        })
      }
    }
    Task::Callback(callback) => {
      let callback = callback.clone();
      let target = target.map(Path::to_path_buf);
      let outcome = tokio::task::spawn_blocking(move || {
        panic::catch_unwind(AssertUnwindSafe(|| callback(target.as_deref())))
      })
      .await;

      match outcome {
        Ok(Ok(Ok(true))) => Ok(String::new()),
        Ok(Ok(Ok(false))) => Err(TaskError::CallbackFailed { name: name.to_string() }),
        Ok(Ok(Err(source))) => Err(TaskError::Callback {
          name: name.to_string(),
          source,
        }),
        Ok(Err(_)) | Err(_) => Err(TaskError::Panicked { name: name.to_string() }),
      }
    }
  }
}

/// Add a worker's error to the shared list. A poisoned lock still records it.
fn record_failure(errors: &Mutex<Vec<TaskFailure>>, failure: TaskFailure) {
  errors
    .lock()
    .unwrap_or_else(|poisoned| poisoned.into_inner())
    .push(failure);
}

/// Take every recorded error out of the shared list.
fn drain_failures(errors: &Mutex<Vec<TaskFailure>>) -> Vec<TaskFailure> {
  let mut list = errors.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
  std::mem::take(&mut *list)
}

/// Create the directories check files live in, so commands can write their
/// outputs next to them.
fn prepare_outputs(check_files: &[PathBuf]) -> Result<(), TaskError> {
  for dir in check_files.iter().filter_map(|p| p.parent()) {
    ensure_dir(dir).map_err(|source| TaskError::OutputDir {
      path: dir.to_path_buf(),
      source,
    })?;
  }
  Ok(())
}

/// Touch every check file.
fn mark_done(check_files: &[PathBuf]) -> Result<(), TaskError> {
  for path in check_files {
    touch(path).map_err(|source| TaskError::Touch {
      path: path.clone(),
      source,
    })?;
  }
  Ok(())
}

/// Log a worker's captured output as a single event so it is never
/// interleaved with another worker's.
fn log_output(name: &str, target: Option<&Path>, output: &str) {
  let output = output.trim_end();
  if output.is_empty() {
    return;
  }
  match target {
    Some(target) => info!(rule = name, target = %target.display(), "\n{output}"),
    None => info!(rule = name, "\n{output}"),
  }
}
