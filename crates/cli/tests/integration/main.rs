//! CLI integration tests for kiln.
//!
//! Fixtures use POSIX shell commands, so these run on Unix only.

#![cfg(unix)]

mod common;

mod build_tests;
mod clean_tests;
mod stale_tests;
