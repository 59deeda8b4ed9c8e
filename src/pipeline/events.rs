//! Progress events emitted while the pipeline runs.

use std::fmt;

use crate::course::{ChapterSyllabus, MaterialKind};

/// One phase of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Syllabus,
    Research,
    Chapters,
    Publish,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Syllabus => write!(f, "syllabus"),
            Stage::Research => write!(f, "research"),
            Stage::Chapters => write!(f, "chapters"),
            Stage::Publish => write!(f, "publish"),
        }
    }
}

/// Progress notification for an attached consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    StageStarted(Stage),
    StageCompleted(Stage),
    /// Syllabus fields and chapters that have finished streaming so far.
    SyllabusPreview {
        title: Option<String>,
        overview: Option<String>,
        new_chapters: Vec<ChapterSyllabus>,
        total_chapters: usize,
    },
    /// The syllabus call was retried; previews start over from nothing.
    SyllabusRestarted {
        attempt: u32,
    },
    ResearchSearch {
        chapter: u32,
        query: String,
    },
    /// The chapter record already exists.
    ChapterSkipped {
        chapter: u32,
    },
    /// The chapter has no research and was not generated.
    ChapterMissingResearch {
        chapter: u32,
    },
    ChapterFailed {
        chapter: u32,
        error: String,
    },
    ChapterCompleted {
        chapter: u32,
        materials: Vec<MaterialKind>,
    },
    MaterialCompleted {
        chapter: u32,
        kind: MaterialKind,
    },
    MaterialFailed {
        chapter: u32,
        kind: MaterialKind,
        error: String,
    },
    PublishWritten {
        files: usize,
    },
}
