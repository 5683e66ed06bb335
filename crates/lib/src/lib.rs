//! kiln-lib: an embedded incremental build orchestrator.
//!
//! The crate is organised around a few small pieces:
//! - [`template`]: path templates like `obj/[stem].o`
//! - [`stale`]: decides which targets need work from check-file mtimes
//! - [`task`]: runs commands or callbacks, serially or fanned out in parallel
//! - [`resource`]: pins external tools and sub-builds to a revision
//! - [`pipeline`]: drives a `kiln.toml` manifest through all of the above
//!
//! A [`context::BuildContext`] carries the per-run settings through every
//! stage; there is no process-wide state.

pub mod consts;
pub mod context;
pub mod depfile;
pub mod manifest;
pub mod pipeline;
pub mod resource;
pub mod stale;
pub mod task;
pub mod template;
pub mod util;
