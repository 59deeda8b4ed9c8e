//! Pipeline orchestration for course generation.
//!
//! A course moves through four stages, each of which can be resumed from
//! the checkpoint store:
//!
//! - **Syllabus**: one streaming call, previewed chapter by chapter while the
//!   response arrives, then committed as `syllabus.json`
//! - **Research**: one web-search call per chapter in a bounded pool
//! - **Chapters**: the chapter body, then seven materials split across a
//!   heavy pool and a light pool that run concurrently
//! - **Publish**: a static package assembled from checkpoints only
//!
//! # Example
//!
//! ```rust,ignore
//! use course_forge::course::CourseSetup;
//! use course_forge::llm::AnthropicClient;
//! use course_forge::pipeline::{CoursePipeline, PipelineConfig, RunOptions};
//! use course_forge::storage::FsCheckpointStore;
//! use std::sync::Arc;
//!
//! let pipeline = CoursePipeline::new(
//!     Arc::new(AnthropicClient::from_env()?),
//!     Arc::new(FsCheckpointStore::new("output/memory")),
//!     CourseSetup::new("Human memory").with_chapters(8),
//! )
//! .with_config(PipelineConfig::from_env()?);
//!
//! let report = pipeline.run(RunOptions::new()).await?;
//! println!("{} chapters generated", report.chapters.generated.len());
//! ```
//!
//! # Configuration
//!
//! ```rust,ignore
//! // Via builder pattern
//! let config = PipelineConfig::new()
//!     .with_research_concurrency(3)
//!     .with_light_concurrency(5)
//!     .with_theme("ocean");
//!
//! // Via environment variables
//! let config = PipelineConfig::from_env()?;
//! ```

pub mod chapters;
pub mod config;
pub mod events;
pub mod materials;
pub mod orchestrator;
pub mod research;

// Re-export main types for convenience
pub use config::{ConfigError, OutputLimits, PipelineConfig};
pub use events::{PipelineEvent, Stage};
pub use orchestrator::{
    ChapterSummary, CoursePipeline, PipelineError, RunOptions, RunReport, StopAfter, SYLLABUS_RAW_KEY,
};
pub use research::RESEARCH_FAILED_NOTE;
