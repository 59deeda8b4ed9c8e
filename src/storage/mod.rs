//! Durable checkpoint storage.
//!
//! The pipeline keeps no job-state ledger: a unit of work is complete when
//! its checkpoint exists and is non-empty.
//!
//! # Usage
//!
//! ```rust,ignore
//! use course_forge::storage::{keys, read_json, CheckpointStore, FsCheckpointStore};
//!
//! let store = FsCheckpointStore::new("output/memory-course");
//! if store.exists(keys::SYLLABUS).await? {
//!     let syllabus: Option<Syllabus> = read_json(&store, keys::SYLLABUS).await?;
//! }
//! ```

pub mod checkpoint;
pub mod keys;

pub use checkpoint::{
    read_json, read_json_lenient, read_text, write_json, write_text, CheckpointStore, FsCheckpointStore,
    MemoryCheckpointStore,
};
