//! Command-line interface for course-forge.
//!
//! Provides commands for generating a course, regenerating single
//! materials and reassembling the publish package.

mod commands;

pub use commands::{parse_cli, run, run_with_cli};
