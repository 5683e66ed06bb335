//! Make-style dependency files.
//!
//! Compilers emit these with flags like `-MD -MF obj/foo.d`:
//!
//! ```text
//! obj/foo.o: src/foo.c include/foo.h \
//!   include/bar\ baz.h
//! ```
//!
//! The prerequisites listed there include headers that never appear in a
//! rule's own target list, so they feed a deep-dependency predicate for the
//! staleness analyzer.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use thiserror::Error;
use tracing::trace;

use crate::context::BuildContext;
use crate::stale::{DeepPredicate, PredicateError};
use crate::template::{self, Segment};
use crate::util::fs::modified;

#[derive(Debug, Error)]
pub enum DepfileError {
  #[error("failed to read dependency file '{path}': {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// Parse the prerequisites out of a dependency file's contents.
///
/// Rule targets (everything before the first unescaped `:` of a rule) are
/// dropped. Backslash-newline continuations and `\ `-escaped spaces are
/// honoured. Duplicate prerequisites are kept once, in first-seen order.
pub fn parse(contents: &str) -> Vec<PathBuf> {
  let mut prereqs: Vec<PathBuf> = Vec::new();
  let joined = contents.replace("\\\r\n", " ").replace("\\\n", " ");

  for line in joined.lines() {
    let Some(rest) = split_rule(line) else {
      continue;
    };
    for word in split_words(rest) {
      let path = PathBuf::from(word);
      if !prereqs.contains(&path) {
        prereqs.push(path);
      }
    }
  }

  prereqs
}

/// Return the text after the rule separator, or `None` for lines without one.
fn split_rule(line: &str) -> Option<&str> {
  let bytes = line.as_bytes();
  let mut i = 0;
  while i < bytes.len() {
    match bytes[i] {
      b'\\' => i += 2,
      // A drive letter (`C:\`) is not a rule separator.
      b':' if i == 1 && bytes.get(2).is_some_and(|b| *b == b'\\' || *b == b'/') => i += 1,
      b':' => return Some(&line[i + 1..]),
      _ => i += 1,
    }
  }
  None
}

fn split_words(text: &str) -> Vec<String> {
  let mut words = Vec::new();
  let mut current = String::new();
  let mut chars = text.chars().peekable();

  while let Some(ch) = chars.next() {
    match ch {
      '\\' if chars.peek() == Some(&' ') => {
        current.push(' ');
        chars.next();
      }
      c if c.is_whitespace() => {
        if !current.is_empty() {
          words.push(std::mem::take(&mut current));
        }
      }
      c => current.push(c),
    }
  }

  if !current.is_empty() {
    words.push(current);
  }
  words
}

/// Read and parse a dependency file.
pub fn read(path: &Path) -> Result<Vec<PathBuf>, DepfileError> {
  let contents = fs::read_to_string(path).map_err(|source| DepfileError::Read {
    path: path.to_path_buf(),
    source,
  })?;
  Ok(parse(&contents))
}

/// Build a deep-dependency predicate backed by per-target dependency files.
///
/// `depfile_template` is resolved against each target (and anchored in the
/// output directory like any check file). The target is stale when any
/// listed prerequisite is missing or newer than the oldest check file.
/// Relative prerequisites are taken relative to the project root, the
/// working directory commands run in. A missing or unreadable dependency
/// file is an error, which the analyzer treats as stale.
pub fn predicate(ctx: &BuildContext, depfile_template: &str) -> Box<DeepPredicate> {
  let segments: Vec<Segment> = template::parse(depfile_template);
  let ctx = ctx.clone();

  Box::new(move |target: &Path, check_files: &[PathBuf]| -> Result<bool, PredicateError> {
    let depfile = ctx.check_path(template::resolve_segments(&segments, target));
    let prereqs = read(&depfile)?;

    let mut oldest: Option<SystemTime> = None;
    for check in check_files {
      let time = modified(check)?;
      oldest = Some(oldest.map_or(time, |o| o.min(time)));
    }
    let Some(oldest) = oldest else {
      return Ok(true);
    };

    for prereq in prereqs {
      let path = if prereq.is_absolute() {
        prereq
      } else {
        ctx.root.join(prereq)
      };
      match modified(&path) {
        Ok(time) if time <= oldest => {}
        Ok(_) => {
          trace!(target = %target.display(), prereq = %path.display(), "prerequisite changed");
          return Ok(true);
        }
        Err(_) => {
          trace!(target = %target.display(), prereq = %path.display(), "prerequisite missing");
          return Ok(true);
        }
      }
    }

    Ok(false)
  })
}
