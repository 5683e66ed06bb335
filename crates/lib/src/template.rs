//! Path templates for projecting one rule over many files.
//!
//! A template is ordinary text with bracketed placeholders that are resolved
//! against a base path, typically the target file of a build rule. This lets a
//! rule say "the object file for `src/foo.c` lives at `obj/[stem].o`" once,
//! instead of listing every file.
//!
//! # Placeholder Format
//!
//! `[` + zero or more dot-separated transform names + `]`. Transforms are
//! applied left to right to a working copy of the base path:
//!
//! - `filename` - last path component (`a/b/c.txt` -> `c.txt`)
//! - `stem` - filename without its final extension (`c`)
//! - `extension` - final extension including the separator (`.txt`)
//! - `parent_path` - containing directory (`a/b`)
//!
//! Empty brackets (`[]`) yield the whole base path. Unknown transform names
//! are skipped, leaving the working path unchanged for that step.
//!
//! # Escaping
//!
//! `[[` produces a literal `[` and `]]` a literal `]`. Escapes are recognised
//! before any placeholder scanning, so `[[x]]` is the literal text `[x]`.
//! An unterminated `[` is kept as literal text.
//!
//! # Example
//!
//! ```
//! use std::path::Path;
//! use kiln_lib::template::resolve;
//!
//! let base = Path::new("src/net/socket.c");
//! assert_eq!(resolve("obj/[stem].o", base), "obj/socket.o");
//! assert_eq!(resolve("[parent_path.filename]", base), "net");
//! assert_eq!(resolve("[[literal]]", base), "[literal]");
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;

/// A single path transform inside a placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
  Filename,
  Stem,
  Extension,
  ParentPath,
}

impl FromStr for Transform {
  type Err = ();

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "filename" => Ok(Transform::Filename),
      "stem" => Ok(Transform::Stem),
      "extension" => Ok(Transform::Extension),
      "parent_path" => Ok(Transform::ParentPath),
      _ => Err(()),
    }
  }
}

impl Transform {
  /// Apply this transform to a working path.
  fn apply(self, path: &Path) -> PathBuf {
    match self {
      Transform::Filename => path.file_name().map(PathBuf::from).unwrap_or_default(),
      Transform::Stem => path.file_stem().map(PathBuf::from).unwrap_or_default(),
      Transform::Extension => match path.extension() {
        Some(ext) => {
          let mut dotted = std::ffi::OsString::from(".");
          dotted.push(ext);
          PathBuf::from(dotted)
        }
        None => PathBuf::new(),
      },
      Transform::ParentPath => path.parent().map(Path::to_path_buf).unwrap_or_default(),
    }
  }
}

/// A segment of parsed template text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
  /// Literal text, escapes already decoded.
  Literal(String),

  /// A placeholder; an empty transform list means the whole base path.
  /// Unknown transform names are dropped at parse time.
  Placeholder(Vec<Transform>),
}

/// One scanned unit of template text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
  Open,
  Close,
  Char(char),
}

/// Split the input into tokens, turning `[[` and `]]` into literal chars
/// before any bracket is interpreted.
fn tokenize(input: &str) -> Vec<Token> {
  let mut tokens = Vec::with_capacity(input.len());
  let mut chars = input.chars().peekable();

  while let Some(ch) = chars.next() {
    match ch {
      '[' if chars.peek() == Some(&'[') => {
        chars.next();
        tokens.push(Token::Char('['));
      }
      ']' if chars.peek() == Some(&']') => {
        chars.next();
        tokens.push(Token::Char(']'));
      }
      '[' => tokens.push(Token::Open),
      ']' => tokens.push(Token::Close),
      c => tokens.push(Token::Char(c)),
    }
  }

  tokens
}

fn token_text(token: Token) -> char {
  match token {
    Token::Open => '[',
    Token::Close => ']',
    Token::Char(c) => c,
  }
}

fn parse_transforms(content: &str) -> Vec<Transform> {
  if content.is_empty() {
    return Vec::new();
  }
  content.split('.').filter_map(|name| name.parse().ok()).collect()
}

/// Parse a template into segments.
///
/// Parsing never fails: unknown transforms are skipped and an unterminated
/// placeholder is kept as literal text.
pub fn parse(template: &str) -> Vec<Segment> {
  let tokens = tokenize(template);
  let mut segments = Vec::new();
  let mut literal = String::new();
  let mut i = 0;

  while i < tokens.len() {
    match tokens[i] {
      Token::Open => {
        let close = tokens[i + 1..].iter().position(|t| *t == Token::Close);
        match close {
          Some(offset) => {
            let content: String = tokens[i + 1..i + 1 + offset].iter().map(|t| token_text(*t)).collect();
            if !literal.is_empty() {
              segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(Segment::Placeholder(parse_transforms(&content)));
            i += offset + 2;
          }
          None => {
            // Unterminated: the rest of the template is literal text.
            literal.extend(tokens[i..].iter().map(|t| token_text(*t)));
            i = tokens.len();
          }
        }
      }
      token => {
        literal.push(token_text(token));
        i += 1;
      }
    }
  }

  if !literal.is_empty() {
    segments.push(Segment::Literal(literal));
  }

  segments
}

/// Resolve pre-parsed segments against a base path.
///
/// Use this when one template is projected over many targets.
pub fn resolve_segments(segments: &[Segment], base: &Path) -> String {
  let mut result = String::new();

  for segment in segments {
    match segment {
      Segment::Literal(text) => result.push_str(text),
      Segment::Placeholder(transforms) => {
        let mut working = base.to_path_buf();
        for transform in transforms {
          working = transform.apply(&working);
        }
        let value = working.to_string_lossy();
        // A separator already spelled out in the template is not doubled.
        if transforms.last() == Some(&Transform::Extension) && result.ends_with('.') {
          result.push_str(value.strip_prefix('.').unwrap_or(&value));
        } else {
          result.push_str(&value);
        }
      }
    }
  }

  result
}

/// Resolve every placeholder in `template` against `base`.
pub fn resolve(template: &str, base: &Path) -> String {
  resolve_segments(&parse(template), base)
}

/// Resolve a template and return it as a path.
pub fn resolve_path(template: &str, base: &Path) -> PathBuf {
  PathBuf::from(resolve(template, base))
}

/// Escape text so it is reproduced literally when embedded in a template.
pub fn escape(text: &str) -> String {
  text.replace('[', "[[").replace(']', "]]")
}
