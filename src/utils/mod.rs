//! Shared utility functions for course-forge.
//!
//! This module provides the parsing boundary for model output (tolerant JSON
//! parsing and progressive record extraction) and artifact naming helpers.

pub mod json_extraction;
pub mod progressive;
pub mod text;

pub use json_extraction::{parse_json, Wrap, MAX_REPAIR_ATTEMPTS};
pub use progressive::{
    extract_partial, PartialExtraction, ProgressUpdate, ProgressiveExtractor, RecordFields,
};
pub use text::{extract_html, pad, slugify, truncate_chars};
