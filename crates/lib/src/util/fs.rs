//! Filesystem helpers used by staleness analysis and check-file bookkeeping.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use filetime::FileTime;
use tracing::trace;
use walkdir::WalkDir;

/// Read the modification time of a file.
pub fn modified(path: &Path) -> io::Result<SystemTime> {
  fs::metadata(path)?.modified()
}

/// Newest modification time among `paths`, ignoring paths that do not exist.
pub fn newest_modified<'a>(paths: impl IntoIterator<Item = &'a PathBuf>) -> Option<SystemTime> {
  paths.into_iter().filter_map(|p| modified(p).ok()).max()
}

/// Create a file if missing, otherwise bump its modification time to now.
///
/// Parent directories are created as needed.
pub fn touch(path: &Path) -> io::Result<()> {
  if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
    fs::create_dir_all(parent)?;
  }

  if !path.exists() {
    fs::OpenOptions::new().create(true).append(true).open(path)?;
  }

  let now = FileTime::now();
  filetime::set_file_mtime(path, now)?;
  trace!(path = %path.display(), "touched");
  Ok(())
}

/// Create a directory and all of its parents.
pub fn ensure_dir(path: &Path) -> io::Result<()> {
  fs::create_dir_all(path)
}

/// Whether `path` has one of `extensions`.
///
/// Extensions may be written with or without the leading dot. An empty list
/// matches every file.
pub fn has_extension(path: &Path, extensions: &[String]) -> bool {
  if extensions.is_empty() {
    return true;
  }
  let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
    return false;
  };
  extensions.iter().any(|wanted| wanted.trim_start_matches('.') == ext)
}

/// List files under `root` recursively, keeping those with a matching extension.
///
/// If `root` is a file it is returned as-is when it matches. The result is
/// sorted so callers see a stable order.
pub fn list_files(root: &Path, extensions: &[String]) -> Result<Vec<PathBuf>, walkdir::Error> {
  let mut files = Vec::new();

  for entry in WalkDir::new(root).follow_links(true) {
    let entry = entry?;
    if entry.file_type().is_file() && has_extension(entry.path(), extensions) {
      files.push(entry.into_path());
    }
  }

  files.sort();
  Ok(files)
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;
  use tempfile::TempDir;

  #[test]
  fn touch_creates_missing_file_and_parents() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("obj/nested/a.o");

    touch(&path).unwrap();

    assert!(path.exists());
  }

  #[test]
  fn touch_bumps_existing_mtime() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("a.o");
    fs::write(&path, "payload").unwrap();
    let old = FileTime::from_unix_time(1_000_000, 0);
    filetime::set_file_mtime(&path, old).unwrap();

    touch(&path).unwrap();

    let now = modified(&path).unwrap();
    assert!(now > SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000));
    assert_eq!(fs::read_to_string(&path).unwrap(), "payload");
  }

  #[test]
  fn newest_modified_skips_missing() {
    let temp = TempDir::new().unwrap();
    let old = temp.path().join("old");
    let new = temp.path().join("new");
    fs::write(&old, "").unwrap();
    fs::write(&new, "").unwrap();
    filetime::set_file_mtime(&old, FileTime::from_unix_time(1_000, 0)).unwrap();
    filetime::set_file_mtime(&new, FileTime::from_unix_time(2_000, 0)).unwrap();

    let paths = vec![old, temp.path().join("missing"), new.clone()];
    assert_eq!(newest_modified(&paths), Some(modified(&new).unwrap()));
    assert_eq!(newest_modified(&Vec::new()), None);
  }

  #[test]
  fn has_extension_accepts_dotted_and_bare() {
    let exts = vec![".c".to_string(), "cpp".to_string()];
    assert!(has_extension(Path::new("a.c"), &exts));
    assert!(has_extension(Path::new("src/b.cpp"), &exts));
    assert!(!has_extension(Path::new("c.h"), &exts));
    assert!(!has_extension(Path::new("Makefile"), &exts));
    assert!(has_extension(Path::new("Makefile"), &[]));
  }

  #[test]
  fn list_files_filters_recursively_and_sorts() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    fs::create_dir_all(root.join("src/sub")).unwrap();
    fs::write(root.join("src/b.c"), "").unwrap();
    fs::write(root.join("src/a.c"), "").unwrap();
    fs::write(root.join("src/a.h"), "").unwrap();
    fs::write(root.join("src/sub/c.c"), "").unwrap();

    let files = list_files(&root.join("src"), &[".c".to_string()]).unwrap();

    assert_eq!(
      files,
      vec![root.join("src/a.c"), root.join("src/b.c"), root.join("src/sub/c.c")]
    );
  }

  #[test]
  fn list_files_on_single_file() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("main.c");
    fs::write(&file, "").unwrap();

    assert_eq!(list_files(&file, &[".c".to_string()]).unwrap(), vec![file.clone()]);
    assert!(list_files(&file, &[".rs".to_string()]).unwrap().is_empty());
  }

  #[test]
  fn list_files_missing_root_is_error() {
    let temp = TempDir::new().unwrap();
    assert!(list_files(&temp.path().join("nope"), &[]).is_err());
  }
}
