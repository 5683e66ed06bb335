//! End-to-end behaviour of the analyzer and executors through the public API.
//!
//! Tasks here are callbacks, so the tests run on every platform.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use filetime::FileTime;
use tempfile::TempDir;

use kiln_lib::context::BuildContext;
use kiln_lib::stale::{self, PredicateError, StaleReason};
use kiln_lib::task::{self, Rule, Task, TaskError};

const OLD: i64 = 1_000_000;

struct Tree {
  _temp: TempDir,
  ctx: BuildContext,
  targets: Vec<PathBuf>,
}

impl Tree {
  /// `count` old sources `src/t1.c` .. `src/tN.c`.
  fn new(count: usize) -> Self {
    let temp = TempDir::new().unwrap();
    let root = temp.path().to_path_buf();
    fs::create_dir_all(root.join("src")).unwrap();
    let targets = (1..=count)
      .map(|i| {
        let path = root.join(format!("src/t{i}.c"));
        fs::write(&path, "").unwrap();
        filetime::set_file_mtime(&path, FileTime::from_unix_time(OLD, 0)).unwrap();
        path
      })
      .collect();
    let ctx = BuildContext::new(&root, root.join("build")).with_parallelism(3);
    Self {
      _temp: temp,
      ctx,
      targets,
    }
  }

  fn rule(&self) -> Rule {
    Rule::new("compile", self.targets.clone(), vec!["obj/[stem].o".to_string()])
  }

  fn check(&self, stem: &str) -> PathBuf {
    self.ctx.out_dir.join(format!("obj/{stem}.o"))
  }
}

fn counting(counter: Arc<AtomicUsize>) -> Task {
  Task::callback(move |_| {
    counter.fetch_add(1, Ordering::SeqCst);
    Ok(true)
  })
}

fn stem(target: Option<&Path>) -> String {
  target
    .and_then(Path::file_stem)
    .map(|s| s.to_string_lossy().into_owned())
    .unwrap_or_default()
}

#[tokio::test]
async fn third_of_five_failing_keeps_the_other_four() {
  let tree = Tree::new(5);
  let task = Task::callback(|target| Ok(stem(target) != "t3"));

  let err = task::run_parallel(&tree.ctx, &task, &tree.rule()).await.unwrap_err();

  assert!(matches!(err, TaskError::BatchFailed { total: 5, failed: 1, .. }));
  for s in ["t1", "t2", "t4", "t5"] {
    assert!(tree.check(s).exists(), "{s} should be marked done");
  }
  assert!(!tree.check("t3").exists());
}

#[tokio::test]
async fn rerun_after_success_executes_nothing() {
  let tree = Tree::new(4);
  let counter = Arc::new(AtomicUsize::new(0));
  let task = counting(counter.clone());

  task::run_parallel(&tree.ctx, &task, &tree.rule()).await.unwrap();
  let second = task::run_parallel(&tree.ctx, &task, &tree.rule()).await.unwrap();

  assert!(second.skipped);
  assert_eq!(counter.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn bumping_one_target_marks_exactly_that_target() {
  let tree = Tree::new(3);
  let task = counting(Arc::new(AtomicUsize::new(0)));
  task::run_parallel(&tree.ctx, &task, &tree.rule()).await.unwrap();

  let future = FileTime::from_unix_time(4_000_000_000, 0);
  filetime::set_file_mtime(&tree.targets[1], future).unwrap();
  let stale = stale::analyze(&tree.ctx, &tree.targets, &tree.rule().checks, None);

  assert_eq!(stale.len(), 1);
  assert!(stale.contains(&tree.targets[1]));
  assert!(matches!(stale.reason(&tree.targets[1]), Some(StaleReason::TargetNewer { .. })));
}

#[tokio::test]
async fn deleted_check_file_marks_its_target() {
  let tree = Tree::new(3);
  let task = counting(Arc::new(AtomicUsize::new(0)));
  task::run_parallel(&tree.ctx, &task, &tree.rule()).await.unwrap();

  fs::remove_file(tree.check("t2")).unwrap();
  let stale = stale::analyze(&tree.ctx, &tree.targets, &tree.rule().checks, None);

  assert_eq!(stale.targets().collect::<Vec<_>>(), vec![&tree.targets[1]]);
}

#[tokio::test]
async fn deep_predicate_overrides_fresh_check_files() {
  let tree = Tree::new(2);
  let task = counting(Arc::new(AtomicUsize::new(0)));
  task::run_parallel(&tree.ctx, &task, &tree.rule()).await.unwrap();
  let checks = tree.rule().checks;

  let never = |_: &Path, _: &[PathBuf]| -> Result<bool, PredicateError> { Ok(false) };
  assert!(stale::analyze(&tree.ctx, &tree.targets, &checks, Some(&never)).is_empty());

  let only_t1 = |target: &Path, _: &[PathBuf]| -> Result<bool, PredicateError> { Ok(target.ends_with("t1.c")) };
  let stale = stale::analyze(&tree.ctx, &tree.targets, &checks, Some(&only_t1));
  assert_eq!(stale.len(), 1);
  assert_eq!(stale.reason(&tree.targets[0]), Some(&StaleReason::DeepDependency));
}
