//! Versioned external resources.
//!
//! An external resource is a tool, toolchain or sub-build fetched from a
//! version-control remote and pinned to a declared revision. [`ensure`]
//! converges the working copy on disk to that pin:
//!
//! 1. Absent: clone it.
//! 2. Resolve the current commit and the pinned revision. When the pin does
//!    not resolve, fetch once and retry.
//! 3. Current differs from the pin: check the pinned commit out detached.
//! 4. Repinned, no bootstrap marker for the pinned commit, or the expected
//!    artifact is missing: bootstrap, verify the artifact exists, then record
//!    the commit in the marker.
//!
//! Re-running against an unchanged pin does nothing.

pub mod git;

use std::fmt;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::consts::BOOTSTRAP_MARKER;
use crate::context::BuildContext;
use crate::pipeline::{self, BuildOptions, BuildSummary, PipelineError};
use crate::task::{self, Task, TaskError};

pub use git::GitSource;

/// What an external resource provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
  Tool,
  Toolchain,
  SubBuild,
}

impl fmt::Display for ResourceKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ResourceKind::Tool => write!(f, "tool"),
      ResourceKind::Toolchain => write!(f, "toolchain"),
      ResourceKind::SubBuild => write!(f, "sub_build"),
    }
  }
}

/// How a freshly pinned working copy is made usable.
#[derive(Debug, Clone)]
pub enum Bootstrap {
  /// Run a task with the working copy as project root.
  Task(Task),

  /// Build the working copy with its own manifest, relative to its root.
  SubBuild(PathBuf),
}

/// A pinned external resource.
#[derive(Debug, Clone)]
pub struct Resource {
  pub name: String,
  pub kind: ResourceKind,

  /// Remote location to clone from.
  pub url: String,

  /// Pinned revision: a tag, branch or commit id.
  pub version: String,

  /// Working-copy directory.
  pub dir: PathBuf,

  pub bootstrap: Bootstrap,

  /// File that must exist once bootstrapped, relative to `dir`.
  pub artifact: PathBuf,
}

impl Resource {
  pub fn artifact_path(&self) -> PathBuf {
    self.dir.join(&self.artifact)
  }
}

/// Version-control operations the resource manager needs.
///
/// Commit ids are returned as full hex strings.
pub trait SourceControl: Send + Sync {
  /// Whether `dir` holds a working copy.
  fn is_checkout(&self, dir: &Path) -> bool;

  fn clone_repo(&self, url: &str, dest: &Path) -> Result<(), ResourceError>;

  fn fetch(&self, dir: &Path, url: &str) -> Result<(), ResourceError>;

  /// Commit currently checked out in `dir`.
  fn head(&self, dir: &Path) -> Result<String, ResourceError>;

  /// Commit a revision name refers to.
  fn resolve(&self, dir: &Path, rev: &str) -> Result<String, ResourceError>;

  /// Check `commit` out detached.
  fn checkout(&self, dir: &Path, commit: &str) -> Result<(), ResourceError>;
}

/// What [`ensure`] did to a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceStatus {
  pub name: String,

  /// Commit the working copy is pinned to.
  pub commit: String,

  pub cloned: bool,
  pub repinned: bool,
  pub bootstrapped: bool,
}

impl ResourceStatus {
  /// True when nothing had to change.
  pub fn up_to_date(&self) -> bool {
    !(self.cloned || self.repinned || self.bootstrapped)
  }
}

#[derive(Debug, Error)]
pub enum ResourceError {
  #[error("failed to clone {url}: {source}")]
  Clone {
    url: String,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },

  #[error("failed to open repository at {path}: {source}")]
  Open {
    path: PathBuf,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },

  #[error("failed to fetch from {url}: {source}")]
  Fetch {
    url: String,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },

  #[error("no remote configured")]
  NoRemote,

  #[error("failed to resolve HEAD: {0}")]
  ResolveHead(String),

  #[error("revision not found: {rev}")]
  RevisionNotFound { rev: String },

  #[error("failed to check out {rev}: {source}")]
  Checkout {
    rev: String,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },

  #[error("failed to create {path}: {source}")]
  CreateDir {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("{name}: bootstrap failed: {source}")]
  Bootstrap {
    name: String,
    #[source]
    source: TaskError,
  },

  #[error("{name}: sub-build failed: {source}")]
  SubBuild {
    name: String,
    #[source]
    source: Box<PipelineError>,
  },

  #[error("failed to update bootstrap marker {path}: {source}")]
  Marker {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("{name}: expected artifact {path} is missing after bootstrap")]
  MissingArtifact { name: String, path: PathBuf },
}

/// Bring `resource` to its pinned revision and make sure it is bootstrapped.
pub async fn ensure(
  ctx: &BuildContext,
  resource: &Resource,
  scm: &dyn SourceControl,
) -> Result<ResourceStatus, ResourceError> {
  let dir = &resource.dir;
  let mut status = ResourceStatus {
    name: resource.name.clone(),
    commit: String::new(),
    cloned: false,
    repinned: false,
    bootstrapped: false,
  };

  if !scm.is_checkout(dir) {
    info!(resource = %resource.name, url = %resource.url, "cloning");
    if let Some(parent) = dir.parent() {
      std::fs::create_dir_all(parent).map_err(|source| ResourceError::CreateDir {
        path: parent.to_path_buf(),
        source,
      })?;
    }
    scm.clone_repo(&resource.url, dir)?;
    status.cloned = true;
  }

  let current = scm.head(dir)?;
  let target = match scm.resolve(dir, &resource.version) {
    Ok(commit) => commit,
    Err(e) => {
      debug!(resource = %resource.name, version = %resource.version, error = %e, "revision unknown locally, fetching");
      scm.fetch(dir, &resource.url)?;
      scm.resolve(dir, &resource.version)?
    }
  };

  if current != target {
    info!(
      resource = %resource.name,
      from = short_commit(&current),
      to = short_commit(&target),
      version = %resource.version,
      "repinning"
    );
    scm.checkout(dir, &target)?;
    status.repinned = true;
  }
  status.commit = target;

  let artifact = resource.artifact_path();
  let marker = dir.join(BOOTSTRAP_MARKER);
  let built_at = bootstrapped_commit(&marker);
  if status.repinned || built_at.as_deref() != Some(status.commit.as_str()) || !artifact.exists() {
    if !(status.repinned || status.cloned) {
      warn!(
        resource = %resource.name,
        artifact = %artifact.display(),
        built_at = built_at.as_deref().map(short_commit).unwrap_or("none"),
        "bootstrap missing or stale, bootstrapping"
      );
    }
    // An interrupted bootstrap must not leave a marker behind.
    remove_marker(&marker)?;
    bootstrap(ctx, resource, scm).await?;
    if !artifact.exists() {
      return Err(ResourceError::MissingArtifact {
        name: resource.name.clone(),
        path: artifact,
      });
    }
    std::fs::write(&marker, format!("{}\n", status.commit)).map_err(|source| ResourceError::Marker {
      path: marker.clone(),
      source,
    })?;
    status.bootstrapped = true;
    info!(resource = %resource.name, commit = short_commit(&status.commit), "bootstrapped");
  } else {
    debug!(resource = %resource.name, commit = short_commit(&status.commit), "up to date");
  }

  Ok(status)
}

async fn bootstrap(ctx: &BuildContext, resource: &Resource, scm: &dyn SourceControl) -> Result<(), ResourceError> {
  let dir = &resource.dir;
  match &resource.bootstrap {
    Bootstrap::Task(bootstrap_task) => {
      let mut local = ctx.clone();
      local.root = dir.clone();
      local.out_dir = dir.clone();
      let output = task::run_task(&local, &resource.name, bootstrap_task, dir, None)
        .await
        .map_err(|source| ResourceError::Bootstrap {
          name: resource.name.clone(),
          source,
        })?;
      let output = output.trim_end();
      if !output.is_empty() {
        info!(resource = %resource.name, "\n{output}");
      }
      Ok(())
    }
    Bootstrap::SubBuild(manifest) => {
      let manifest = dir.join(manifest);
      let options = BuildOptions {
        config: ctx.config_override,
        jobs: Some(ctx.parallelism),
        shell: ctx.shell.clone(),
      };
      info!(resource = %resource.name, manifest = %manifest.display(), "running sub-build");
      // Sub-builds may declare resources of their own.
      let sub_build: Pin<Box<dyn Future<Output = Result<BuildSummary, PipelineError>> + '_>> =
        Box::pin(pipeline::build_with(&manifest, &options, scm));
      sub_build.await.map_err(|source| ResourceError::SubBuild {
        name: resource.name.clone(),
        source: Box::new(source),
      })?;
      Ok(())
    }
  }
}

/// Commit recorded by the last successful bootstrap, if any.
fn bootstrapped_commit(marker: &Path) -> Option<String> {
  std::fs::read_to_string(marker)
    .ok()
    .map(|s| s.trim().to_string())
    .filter(|s| !s.is_empty())
}

fn remove_marker(marker: &Path) -> Result<(), ResourceError> {
  match std::fs::remove_file(marker) {
    Ok(()) => Ok(()),
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
    Err(source) => Err(ResourceError::Marker {
      path: marker.to_path_buf(),
      source,
    }),
  }
}

/// Abbreviate a commit id for display.
pub fn short_commit(commit: &str) -> &str {
  commit.get(..12).unwrap_or(commit)
}
