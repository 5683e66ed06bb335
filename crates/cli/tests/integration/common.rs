//! Shared test helpers for CLI integration tests.

use std::path::PathBuf;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use filetime::FileTime;
use tempfile::TempDir;

/// Get path to a fixture file.
pub fn fixture_path(name: &str) -> PathBuf {
  PathBuf::from(env!("CARGO_MANIFEST_DIR"))
    .join("tests")
    .join("fixtures")
    .join(name)
}

/// Read fixture content.
pub fn fixture_content(name: &str) -> String {
  std::fs::read_to_string(fixture_path(name)).unwrap_or_else(|e| panic!("Failed to load fixture {}: {}", name, e))
}

/// Isolated project directory.
///
/// Each test gets its own temporary directory holding a `kiln.toml` and
/// whatever sources it writes.
pub struct TestEnv {
  pub temp: TempDir,
  pub manifest_path: PathBuf,
}

impl TestEnv {
  /// Create from a fixture file, copied to `kiln.toml`.
  pub fn from_fixture(name: &str) -> Self {
    let temp = TempDir::new().unwrap();
    let manifest_path = temp.path().join("kiln.toml");
    std::fs::write(&manifest_path, fixture_content(name)).unwrap();
    Self { temp, manifest_path }
  }

  /// Write a file relative to the project directory.
  pub fn write_file(&self, relative_path: &str, content: &str) {
    let path = self.path(relative_path);
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
  }

  pub fn path(&self, relative_path: &str) -> PathBuf {
    self.temp.path().join(relative_path)
  }

  /// Write `src/a.c` and `src/b.c`, dated well before any build.
  pub fn with_sources(self) -> Self {
    self.write_file("src/a.c", "int a;\n");
    self.write_file("src/b.c", "int b;\n");
    self.age(&["src/a.c", "src/b.c", "kiln.toml"]);
    self
  }

  pub fn age(&self, relative_paths: &[&str]) {
    let old = FileTime::from_unix_time(1_000_000, 0);
    for rel in relative_paths {
      filetime::set_file_mtime(self.path(rel), old).unwrap();
    }
  }

  /// Move a file's modification time past every check file.
  pub fn bump(&self, relative_path: &str) {
    let future = FileTime::from_unix_time(4_000_000_000, 0);
    filetime::set_file_mtime(self.path(relative_path), future).unwrap();
  }

  /// Lines the fixture commands appended to `runs.log`.
  pub fn runs(&self) -> Vec<String> {
    std::fs::read_to_string(self.path("runs.log"))
      .map(|s| s.lines().map(str::to_string).collect())
      .unwrap_or_default()
  }

  /// Canonical project directory.
  pub fn root(&self) -> PathBuf {
    dunce::canonicalize(self.temp.path()).unwrap()
  }

  /// Get a Command for the kiln binary, run from the project directory.
  pub fn kiln_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("kiln");
    cmd.current_dir(self.temp.path());
    cmd.env_remove("KILN_JOBS");
    cmd.env_remove("RUST_LOG");
    cmd
  }
}
