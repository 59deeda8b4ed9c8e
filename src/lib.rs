//! course-forge: orchestrate generative calls into a complete course package.
//!
//! A course is produced in four resumable stages: a streamed syllabus,
//! per-chapter research with web search, chapter bodies with their teaching
//! materials, and a static publish package. Every artifact is checkpointed,
//! so interrupted runs pick up where they stopped.

// Core modules
pub mod cli;
pub mod course;
pub mod error;
pub mod export;
pub mod llm;
pub mod pipeline;
pub mod prompts;
pub mod quiz;
pub mod scheduler;
pub mod storage;
pub mod utils;
pub mod validation;

// Re-export commonly used error types
pub use error::{ExportError, LlmError, ParseError, StoreError, ValidationError};
