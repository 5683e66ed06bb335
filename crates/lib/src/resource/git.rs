//! Git-backed source control for external resources.
//!
//! Cloning, fetching and revision resolution go through `gix`. Detached
//! checkout of an existing worktree runs the `git` executable, which also
//! takes care of updating the index and removing stale files.

use std::path::Path;
use std::process::Command;

use gix::remote::Direction;
use tracing::debug;

use super::{ResourceError, SourceControl};

/// [`SourceControl`] over git repositories.
#[derive(Debug, Clone, Default)]
pub struct GitSource {
  /// Path or name of the `git` executable used for checkouts.
  pub git: Option<String>,
}

impl GitSource {
  pub fn new() -> Self {
    Self::default()
  }

  fn open(&self, dir: &Path) -> Result<gix::Repository, ResourceError> {
    gix::open(dir).map_err(|e| ResourceError::Open {
      path: dir.to_path_buf(),
      source: Box::new(e),
    })
  }
}

impl SourceControl for GitSource {
  fn is_checkout(&self, dir: &Path) -> bool {
    dir.join(".git").exists()
  }

  fn clone_repo(&self, url: &str, dest: &Path) -> Result<(), ResourceError> {
    let clone_err = |e: Box<dyn std::error::Error + Send + Sync>| ResourceError::Clone {
      url: url.to_string(),
      source: e,
    };

    let mut prepared = gix::prepare_clone(url, dest).map_err(|e| clone_err(Box::new(e)))?;

    let (mut checkout, _outcome) = prepared
      .fetch_then_checkout(gix::progress::Discard, &gix::interrupt::IS_INTERRUPTED)
      .map_err(|e| clone_err(Box::new(e)))?;

    checkout
      .main_worktree(gix::progress::Discard, &gix::interrupt::IS_INTERRUPTED)
      .map_err(|e| clone_err(Box::new(e)))?;

    Ok(())
  }

  fn fetch(&self, dir: &Path, url: &str) -> Result<(), ResourceError> {
    debug!(url, "fetching updates");
    let repo = self.open(dir)?;
    let fetch_err = |e: Box<dyn std::error::Error + Send + Sync>| ResourceError::Fetch {
      url: url.to_string(),
      source: e,
    };

    let remote = repo
      .find_default_remote(Direction::Fetch)
      .ok_or(ResourceError::NoRemote)?
      .map_err(|e| fetch_err(Box::new(e)))?;

    remote
      .connect(Direction::Fetch)
      .map_err(|e| fetch_err(Box::new(e)))?
      .prepare_fetch(gix::progress::Discard, Default::default())
      .map_err(|e| fetch_err(Box::new(e)))?
      .receive(gix::progress::Discard, &gix::interrupt::IS_INTERRUPTED)
      .map_err(|e| fetch_err(Box::new(e)))?;

    Ok(())
  }

  fn head(&self, dir: &Path) -> Result<String, ResourceError> {
    let repo = self.open(dir)?;
    let mut head = repo.head().map_err(|e| ResourceError::ResolveHead(e.to_string()))?;
    let commit = head
      .peel_to_commit()
      .map_err(|e| ResourceError::ResolveHead(e.to_string()))?;
    Ok(commit.id.to_string())
  }

  fn resolve(&self, dir: &Path, rev: &str) -> Result<String, ResourceError> {
    let repo = self.open(dir)?;
    let not_found = |detail: Option<String>| ResourceError::RevisionNotFound {
      rev: match detail {
        Some(d) => format!("{rev} ({d})"),
        None => rev.to_string(),
      },
    };

    let spec = repo.rev_parse(rev).map_err(|_| not_found(None))?;
    let id = spec.single().ok_or_else(|| not_found(Some("ambiguous".to_string())))?;

    // Tags point at tag objects; the pin is the commit underneath.
    let commit = id
      .object()
      .map_err(|e| not_found(Some(e.to_string())))?
      .peel_to_kind(gix::object::Kind::Commit)
      .map_err(|e| not_found(Some(e.to_string())))?;

    Ok(commit.id.to_string())
  }

  fn checkout(&self, dir: &Path, commit: &str) -> Result<(), ResourceError> {
    let git = self.git.as_deref().unwrap_or("git");
    let checkout_err = |e: Box<dyn std::error::Error + Send + Sync>| ResourceError::Checkout {
      rev: commit.to_string(),
      source: e,
    };

    let output = Command::new(git)
      .arg("-C")
      .arg(dir)
      .args(["checkout", "--quiet", "--force", "--detach", commit])
      .output()
      .map_err(|e| checkout_err(Box::new(e)))?;

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
      return Err(checkout_err(stderr.into()));
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::fs;
  use tempfile::TempDir;

  /// Run git in `dir`, returning trimmed stdout.
  fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
      .arg("-C")
      .arg(dir)
      .args(["-c", "user.name=kiln", "-c", "user.email=kiln@example.com"])
      .args(args)
      .output()
      .unwrap();
    assert!(output.status.success(), "git {args:?} failed");
    String::from_utf8_lossy(&output.stdout).trim().to_string()
  }

  fn git_available() -> bool {
    Command::new("git").arg("--version").output().is_ok_and(|o| o.status.success())
  }

  /// An upstream repository with two commits, the first tagged `v1`.
  fn upstream() -> (TempDir, String, String) {
    let temp = TempDir::new().unwrap();
    let dir = temp.path();
    git(dir, &["init", "--quiet"]);
    fs::write(dir.join("VERSION"), "1").unwrap();
    git(dir, &["add", "VERSION"]);
    git(dir, &["commit", "--quiet", "-m", "one"]);
    git(dir, &["tag", "-a", "v1", "-m", "v1"]);
    let first = git(dir, &["rev-parse", "HEAD"]);
    fs::write(dir.join("VERSION"), "2").unwrap();
    git(dir, &["commit", "--quiet", "-am", "two"]);
    let second = git(dir, &["rev-parse", "HEAD"]);
    (temp, first, second)
  }

  #[test]
  fn clone_resolve_and_checkout_local_repository() {
    if !git_available() {
      return;
    }
    let (upstream, first, second) = upstream();
    let work = TempDir::new().unwrap();
    let dest = work.path().join("tool");
    let scm = GitSource::new();

    assert!(!scm.is_checkout(&dest));
    scm.clone_repo(upstream.path().to_str().unwrap(), &dest).unwrap();
    assert!(scm.is_checkout(&dest));

    assert_eq!(scm.head(&dest).unwrap(), second);
    assert_eq!(scm.resolve(&dest, "v1").unwrap(), first);

    scm.checkout(&dest, &first).unwrap();
    assert_eq!(scm.head(&dest).unwrap(), first);
    assert_eq!(fs::read_to_string(dest.join("VERSION")).unwrap(), "1");
  }

  #[test]
  fn unknown_revision_is_not_found() {
    if !git_available() {
      return;
    }
    let (upstream, _, _) = upstream();
    let scm = GitSource::new();

    let result = scm.resolve(upstream.path(), "no-such-tag");

    assert!(matches!(result, Err(ResourceError::RevisionNotFound { .. })));
  }

  #[test]
  fn open_missing_repository_fails() {
    let temp = TempDir::new().unwrap();
    let result = GitSource::new().head(&temp.path().join("nope"));
    assert!(matches!(result, Err(ResourceError::Open { .. })));
  }
}
