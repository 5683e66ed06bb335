mod build;
mod clean;
mod stale;

pub use build::cmd_build;
pub use clean::cmd_clean;
pub use stale::cmd_stale;
