//! Loading and validating `kiln.toml`.

mod types;

pub use types::*;

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

/// Errors found while reading a manifest. All of them are fatal.
#[derive(Debug, Error)]
pub enum ManifestError {
  #[error("failed to read manifest '{path}': {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("invalid manifest '{path}': {message}")]
  Parse { path: PathBuf, message: String },

  #[error("{section} '{name}' is missing required value '{field}'")]
  Missing {
    section: &'static str,
    name: String,
    field: &'static str,
  },

  #[error("{section} '{name}' is defined more than once")]
  Duplicate { section: &'static str, name: String },

  #[error("{section} '{name}': {message}")]
  Invalid {
    section: &'static str,
    name: String,
    message: String,
  },
}

impl Manifest {
  /// Read, parse and validate a manifest file.
  pub fn load(path: &Path) -> Result<Self, ManifestError> {
    let content = fs::read_to_string(path).map_err(|source| ManifestError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let manifest = Self::parse(&content).map_err(|e| match e {
      ManifestError::Parse { message, .. } => ManifestError::Parse {
        path: path.to_path_buf(),
        message,
      },
      other => other,
    })?;
    debug!(
      path = %path.display(),
      resources = manifest.resources.len(),
      stages = manifest.stages.len(),
      "loaded manifest"
    );
    Ok(manifest)
  }

  /// Parse and validate manifest text.
  pub fn parse(content: &str) -> Result<Self, ManifestError> {
    let manifest: Manifest = toml::from_str(content).map_err(|e| ManifestError::Parse {
      path: PathBuf::new(),
      message: e.to_string().trim_end().to_string(),
    })?;
    manifest.validate()?;
    Ok(manifest)
  }

  /// Check every value a run will need is present and consistent.
  pub fn validate(&self) -> Result<(), ManifestError> {
    let mut seen = HashSet::new();
    for res in &self.resources {
      let missing = |field| ManifestError::Missing {
        section: "resource",
        name: res.name.clone(),
        field,
      };
      if !seen.insert(res.name.as_str()) {
        return Err(ManifestError::Duplicate {
          section: "resource",
          name: res.name.clone(),
        });
      }
      if res.url.as_deref().is_none_or(str::is_empty) {
        return Err(missing("url"));
      }
      if res.version.as_deref().is_none_or(str::is_empty) {
        return Err(missing("version"));
      }
      if res.artifact.is_none() {
        return Err(missing("artifact"));
      }
      match res.kind {
        crate::resource::ResourceKind::SubBuild => {
          if res.bootstrap.is_some() {
            return Err(ManifestError::Invalid {
              section: "resource",
              name: res.name.clone(),
              message: "sub_build resources run their own manifest and take no 'bootstrap'".to_string(),
            });
          }
        }
        _ => {
          if res.bootstrap.as_deref().is_none_or(str::is_empty) {
            return Err(missing("bootstrap"));
          }
        }
      }
    }

    let mut seen = HashSet::new();
    for stage in &self.stages {
      let missing = |field| ManifestError::Missing {
        section: "stage",
        name: stage.name.clone(),
        field,
      };
      if !seen.insert(stage.name.as_str()) {
        return Err(ManifestError::Duplicate {
          section: "stage",
          name: stage.name.clone(),
        });
      }
      if stage.command.as_deref().is_none_or(str::is_empty) {
        return Err(missing("command"));
      }
      if stage.guard.is_some() {
        if stage.parallel == Some(true) || stage.depfile.is_some() {
          return Err(ManifestError::Invalid {
            section: "stage",
            name: stage.name.clone(),
            message: "a guarded stage runs once and takes neither 'parallel' nor 'depfile'".to_string(),
          });
        }
        continue;
      }
      if stage.sources.is_empty() {
        return Err(missing("sources"));
      }
      if stage.checks.is_empty() {
        return Err(missing("checks"));
      }
    }

    Ok(())
  }

  /// Stages in execution order: by kind, then manifest order.
  pub fn ordered_stages(&self) -> Vec<&StageDef> {
    let mut stages: Vec<&StageDef> = self.stages.iter().collect();
    stages.sort_by_key(|s| s.kind);
    stages
  }
}
