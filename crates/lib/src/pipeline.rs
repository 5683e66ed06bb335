//! Manifest-driven build pipeline.
//!
//! A build loads `kiln.toml`, brings every external resource to its pinned
//! revision, then runs the stages in kind order (generate, format, compile,
//! link). Each stage gets its own [`BuildContext`] whose output directory is
//! `<out_dir>/<config>`, so debug and release artifacts never share check
//! files.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::consts::{DEFAULT_OUT_DIR, DEPS_DIR, MANIFEST_FILENAME};
use crate::context::{BuildConfig, BuildContext, default_parallelism};
use crate::depfile;
use crate::manifest::{Manifest, ManifestError, ResourceDef, StageDef, StageKind};
use crate::resource::{self, Bootstrap, GitSource, Resource, ResourceError, ResourceStatus, SourceControl};
use crate::stale::{self, StaleEntry, StaleReason, StaleSet};
use crate::task::{self, ExecReport, Rule, Task, TaskError};
use crate::util::fs::{has_extension, list_files};

/// Invocation settings that override the manifest.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
  /// Forced build configuration (`--release` / `--debug`).
  pub config: Option<BuildConfig>,

  /// Worker count for parallel stages.
  pub jobs: Option<usize>,

  /// Shell override for command execution.
  pub shell: Option<String>,
}

#[derive(Debug, Error)]
pub enum PipelineError {
  #[error("failed to locate manifest '{path}': {source}")]
  Locate {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error(transparent)]
  Manifest(#[from] ManifestError),

  #[error("resource '{name}' failed: {source}")]
  Resource {
    name: String,
    #[source]
    source: ResourceError,
  },

  #[error("stage '{stage}': failed to list sources: {source}")]
  Sources {
    stage: String,
    #[source]
    source: walkdir::Error,
  },

  #[error("stage '{stage}' failed: {source}")]
  Stage {
    stage: String,
    #[source]
    source: TaskError,
  },

  #[error("failed to remove '{path}': {source}")]
  Clean {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// Outcome of one stage.
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
  pub name: String,
  pub kind: StageKind,
  pub config: BuildConfig,
  pub ran: usize,
  pub skipped: bool,
}

/// Outcome of a whole build.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildSummary {
  pub resources: Vec<ResourceStatus>,
  pub stages: Vec<StageReport>,
}

impl BuildSummary {
  /// Number of stage task invocations performed.
  pub fn commands_run(&self) -> usize {
    self.stages.iter().map(|s| s.ran).sum()
  }

  pub fn up_to_date(&self) -> bool {
    self.commands_run() == 0 && self.resources.iter().all(ResourceStatus::up_to_date)
  }
}

/// Stale targets of one stage, as reported by a dry run.
#[derive(Debug, Clone, Serialize)]
pub struct StageStaleness {
  pub name: String,
  pub kind: StageKind,
  pub config: BuildConfig,
  pub targets: usize,
  pub stale: StaleSet,
}

/// A loaded manifest together with the paths and context derived from it.
#[derive(Debug, Clone)]
pub struct Project {
  pub manifest: Manifest,
  pub manifest_path: PathBuf,

  /// Directory holding the manifest.
  pub root: PathBuf,

  /// Build-output root; per-configuration directories live below it.
  pub out_root: PathBuf,

  /// Run-wide context. Stages derive their own from it.
  pub ctx: BuildContext,
}

impl Project {
  pub fn load(manifest_path: &Path, options: &BuildOptions) -> Result<Self, PipelineError> {
    let manifest_path = dunce::canonicalize(manifest_path).map_err(|source| PipelineError::Locate {
      path: manifest_path.to_path_buf(),
      source,
    })?;
    let manifest = Manifest::load(&manifest_path)?;

    let root = manifest_path
      .parent()
      .map(Path::to_path_buf)
      .unwrap_or_else(|| PathBuf::from("."));
    let out_root = root.join(manifest.build.out_dir.as_deref().unwrap_or(Path::new(DEFAULT_OUT_DIR)));

    let jobs = options
      .jobs
      .or(manifest.build.jobs)
      .unwrap_or_else(default_parallelism);
    let shell = options.shell.clone().or_else(|| manifest.build.shell.clone());

    let ctx = BuildContext::new(&root, &out_root)
      .with_config_override(options.config)
      .with_default_config(manifest.build.default_config.unwrap_or_default())
      .with_definition_files(vec![manifest_path.clone()])
      .with_parallelism(jobs)
      .with_shell(shell);

    Ok(Self {
      manifest,
      manifest_path,
      root,
      out_root,
      ctx,
    })
  }

  /// Context and configuration a stage runs with.
  pub fn stage_context(&self, stage: &StageDef) -> (BuildContext, BuildConfig) {
    let config = self.ctx.config_for(stage.config);
    let mut ctx = self.ctx.clone();
    ctx.out_dir = self.out_root.join(config.as_str());
    (ctx, config)
  }

  /// External resources in manifest order.
  pub fn resources(&self) -> Vec<Resource> {
    self.manifest.resources.iter().map(|def| self.resource(def)).collect()
  }

  fn resource(&self, def: &ResourceDef) -> Resource {
    let dir = match &def.dir {
      Some(dir) => self.root.join(dir),
      None => self.out_root.join(DEPS_DIR).join(&def.name),
    };
    let config = self.ctx.config();
    let bootstrap = match def.kind {
      resource::ResourceKind::SubBuild => {
        Bootstrap::SubBuild(def.manifest.clone().unwrap_or_else(|| PathBuf::from(MANIFEST_FILENAME)))
      }
      _ => Bootstrap::Task(Task::command(
        self.ctx.expand(def.bootstrap.as_deref().unwrap_or_default(), config),
      )),
    };

    Resource {
      name: def.name.clone(),
      kind: def.kind,
      url: def.url.clone().unwrap_or_default(),
      version: def.version.clone().unwrap_or_default(),
      dir,
      bootstrap,
      artifact: def.artifact.clone().unwrap_or_default(),
    }
  }

  /// Source files a stage operates on, sorted and without duplicates.
  pub fn targets(&self, stage: &StageDef) -> Result<Vec<PathBuf>, PipelineError> {
    let mut targets = BTreeSet::new();
    for source in &stage.sources {
      let path = self.root.join(source);
      if path.is_file() {
        if has_extension(&path, &stage.extensions) {
          targets.insert(path);
        }
        continue;
      }
      let files = list_files(&path, &stage.extensions).map_err(|source| PipelineError::Sources {
        stage: stage.name.clone(),
        source,
      })?;
      targets.extend(files);
    }
    Ok(targets.into_iter().collect())
  }

  /// The executor rule for a guard-less stage.
  pub fn rule(&self, stage: &StageDef, ctx: &BuildContext, config: BuildConfig) -> Result<Rule, PipelineError> {
    let checks = stage.checks.iter().map(|c| ctx.expand(c, config)).collect();
    let mut rule = Rule::new(&stage.name, self.targets(stage)?, checks);
    if let Some(depfile) = &stage.depfile {
      rule = rule.with_deep(Arc::from(depfile::predicate(ctx, &ctx.expand(depfile, config))));
    }
    Ok(rule)
  }

  async fn run_stage(&self, stage: &StageDef) -> Result<StageReport, PipelineError> {
    let (ctx, config) = self.stage_context(stage);
    let command = ctx.expand(stage.command.as_deref().unwrap_or_default(), config);
    let task = Task::command(command);
    let stage_err = |source| PipelineError::Stage {
      stage: stage.name.clone(),
      source,
    };

    debug!(stage = %stage.name, kind = %stage.kind, config = %config, out = %ctx.out_dir.display(), "stage");
    let report: ExecReport = match &stage.guard {
      Some(guard) => task::run_guarded(&ctx, &stage.name, &task, Path::new(guard))
        .await
        .map_err(stage_err)?,
      None => {
        let rule = self.rule(stage, &ctx, config)?;
        if stage.is_parallel() {
          task::run_parallel(&ctx, &task, &rule).await.map_err(stage_err)?
        } else {
          task::run_serial(&ctx, &task, &rule).await.map_err(stage_err)?
        }
      }
    };

    Ok(StageReport {
      name: stage.name.clone(),
      kind: stage.kind,
      config,
      ran: report.ran,
      skipped: report.skipped,
    })
  }

  /// Report what a build would run, without running anything.
  pub fn staleness(&self) -> Result<Vec<StageStaleness>, PipelineError> {
    let mut report = Vec::new();
    for stage in self.manifest.ordered_stages() {
      let (ctx, config) = self.stage_context(stage);
      let (targets, stale) = match &stage.guard {
        Some(guard) => {
          let guard = ctx.check_path(guard);
          let mut stale = StaleSet::default();
          if !guard.exists() {
            stale.insert(
              guard.clone(),
              StaleEntry {
                check_files: vec![guard.clone()],
                reason: StaleReason::MissingCheckFile { path: guard },
              },
            );
          }
          (1, stale)
        }
        None => {
          let rule = self.rule(stage, &ctx, config)?;
          let stale = stale::analyze(&ctx, &rule.targets, &rule.checks, rule.deep.as_deref());
          (rule.targets.len(), stale)
        }
      };
      report.push(StageStaleness {
        name: stage.name.clone(),
        kind: stage.kind,
        config,
        targets,
        stale,
      });
    }
    Ok(report)
  }
}

/// Build the project described by `manifest_path`.
pub async fn build(manifest_path: &Path, options: &BuildOptions) -> Result<BuildSummary, PipelineError> {
  build_with(manifest_path, options, &GitSource::new()).await
}

/// Build with an explicit source-control implementation for resources.
pub async fn build_with(
  manifest_path: &Path,
  options: &BuildOptions,
  scm: &dyn SourceControl,
) -> Result<BuildSummary, PipelineError> {
  let project = Project::load(manifest_path, options)?;
  info!(
    manifest = %project.manifest_path.display(),
    config = %project.ctx.config(),
    jobs = project.ctx.parallelism,
    "starting build"
  );

  let mut summary = BuildSummary::default();

  for res in project.resources() {
    let status = resource::ensure(&project.ctx, &res, scm)
      .await
      .map_err(|source| PipelineError::Resource {
        name: res.name.clone(),
        source,
      })?;
    summary.resources.push(status);
  }

  for stage in project.manifest.ordered_stages() {
    let report = project.run_stage(stage).await?;
    summary.stages.push(report);
  }

  info!(commands = summary.commands_run(), "build finished");
  Ok(summary)
}

/// Report stale targets per stage without running anything.
pub fn stale_report(manifest_path: &Path, options: &BuildOptions) -> Result<Vec<StageStaleness>, PipelineError> {
  Project::load(manifest_path, options)?.staleness()
}

/// Delete the build-output directory. Returns the removed path, or `None`
/// when there was nothing to remove.
pub fn clean(manifest_path: &Path) -> Result<Option<PathBuf>, PipelineError> {
  let project = Project::load(manifest_path, &BuildOptions::default())?;
  let out = &project.out_root;
  if !out.exists() {
    return Ok(None);
  }
  std::fs::remove_dir_all(out).map_err(|source| PipelineError::Clean {
    path: out.clone(),
    source,
  })?;
  info!(path = %out.display(), "removed build output");
  Ok(Some(out.clone()))
}
