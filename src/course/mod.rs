//! Course records and the conversion boundary for model output.

pub mod convert;
pub mod types;

pub use convert::{
    activities_from_value, chapter_from_value, discussion_from_value, dossier_from_value,
    parse_syllabus, questions_from_value, slides_from_value, syllabus_from_value,
};
pub use types::{
    Activity, ChapterLength, ChapterSyllabus, CourseRecord, CourseSetup, DiscussionPrompt, Distractor, Dossier,
    EducationLevel, GeneratedChapter, MaterialKind, PriorKnowledge, QuizQuestion, ResearchSource,
    ScienceAnnotation, SciencePrinciple, Slide, Syllabus, TeachingEnvironment, Widget,
};
