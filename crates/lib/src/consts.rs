//! Crate-wide constants.

/// Default manifest file name looked up in the working directory.
pub const MANIFEST_FILENAME: &str = "kiln.toml";

/// Default build-output directory, relative to the manifest directory.
pub const DEFAULT_OUT_DIR: &str = "build";

/// Directory under the output root that holds acquired external resources.
pub const DEPS_DIR: &str = "deps";

/// Environment variable that overrides the default worker parallelism.
pub const JOBS_ENV: &str = "KILN_JOBS";

/// File inside a resource's working copy recording the commit its last
/// successful bootstrap was built from.
pub const BOOTSTRAP_MARKER: &str = ".kiln-bootstrap";
