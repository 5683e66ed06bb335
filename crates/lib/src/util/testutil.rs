//! Test utilities for kiln-lib.
//!
//! Cross-platform shell snippets for tests that run real commands.

/// A command that prints `out` on stdout and `err` on stderr.
#[cfg(unix)]
pub fn echo_both(out: &str, err: &str) -> String {
  format!("echo {out}; echo {err} 1>&2")
}

#[cfg(windows)]
pub fn echo_both(out: &str, err: &str) -> String {
  format!("echo {out} & echo {err} 1>&2")
}

/// A command that prints `msg` and exits with `code`.
#[cfg(unix)]
pub fn fail_with(msg: &str, code: i32) -> String {
  format!("echo {msg}; exit {code}")
}

#[cfg(windows)]
pub fn fail_with(msg: &str, code: i32) -> String {
  format!("echo {msg} & exit /b {code}")
}

/// A command that appends a line to `file` in the working directory.
#[cfg(unix)]
pub fn append_line(file: &str, line: &str) -> String {
  format!("echo {line} >> {file}")
}

#[cfg(windows)]
pub fn append_line(file: &str, line: &str) -> String {
  format!("echo {line}>> {file}")
}

/// A command that creates an empty file at `path`.
#[cfg(unix)]
pub fn create_file(path: &str) -> String {
  format!("mkdir -p \"$(dirname '{path}')\" && : > '{path}'")
}

#[cfg(windows)]
pub fn create_file(path: &str) -> String {
  format!("type nul > \"{path}\"")
}
