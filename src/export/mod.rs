//! Document export and publish assembly.
//!
//! Exporters turn a fully formed in-memory record into a downloadable file.
//! They are leaf consumers: every failure is reported to the caller, which
//! logs it and carries on.
//!
//! Publish assembly reads checkpoint artifacts only and renders a static
//! course package below `publish/`.

pub mod markdown;
pub mod publish;

pub use markdown::MarkdownExporter;
pub use publish::{assemble_publish, ManifestEntry, PublishReport};

use crate::course::{Activity, ChapterSyllabus, DiscussionPrompt, Dossier, QuizQuestion, Slide, Syllabus};
use crate::error::ExportError;
use crate::quiz::VersionSet;

/// A record that can be exported as a document.
#[derive(Debug, Clone, Copy)]
pub enum ExportDocument<'a> {
    Syllabus(&'a Syllabus),
    Research {
        chapter: &'a ChapterSyllabus,
        dossier: &'a Dossier,
    },
    Discussion {
        chapter: &'a ChapterSyllabus,
        prompts: &'a [DiscussionPrompt],
    },
    Activities {
        chapter: &'a ChapterSyllabus,
        activities: &'a [Activity],
    },
    InClassQuiz {
        chapter: &'a ChapterSyllabus,
        questions: &'a [QuizQuestion],
        versions: &'a VersionSet,
    },
    Slides {
        chapter: &'a ChapterSyllabus,
        slides: &'a [Slide],
    },
}

impl ExportDocument<'_> {
    /// Short name used in file names.
    pub fn kind(&self) -> &'static str {
        match self {
            ExportDocument::Syllabus(_) => "syllabus",
            ExportDocument::Research { .. } => "research",
            ExportDocument::Discussion { .. } => "discussion",
            ExportDocument::Activities { .. } => "activities",
            ExportDocument::InClassQuiz { .. } => "inclass",
            ExportDocument::Slides { .. } => "slides",
        }
    }

    /// Chapter the document belongs to, if any.
    pub fn chapter_number(&self) -> Option<u32> {
        match self {
            ExportDocument::Syllabus(_) => None,
            ExportDocument::Research { chapter, .. }
            | ExportDocument::Discussion { chapter, .. }
            | ExportDocument::Activities { chapter, .. }
            | ExportDocument::InClassQuiz { chapter, .. }
            | ExportDocument::Slides { chapter, .. } => Some(chapter.number),
        }
    }

    /// Human-readable label for download links.
    pub fn label(&self) -> &'static str {
        kind_label(self.kind())
    }
}

/// Label of an exported document kind, as shown in download links.
pub fn kind_label(kind: &str) -> &'static str {
    match kind {
        "syllabus" => "Syllabus",
        "research" => "Research",
        "discussion" => "Discussion",
        "activities" => "Activities",
        "inclass" => "Quiz Versions",
        "slides" => "Slides",
        _ => "Download",
    }
}

/// Converts records into downloadable documents.
pub trait DocumentExporter: Send + Sync {
    /// Exporter name for logs.
    fn name(&self) -> &str;

    /// File extension of produced documents, without the dot.
    fn extension(&self) -> &str;

    /// Renders `document` to bytes.
    fn export(&self, document: &ExportDocument<'_>) -> Result<Vec<u8>, ExportError>;
}
