//! Course domain records.
//!
//! These records are what the pipeline checkpoints and what later stages
//! read back. Field names are camelCase on the wire so checkpoints stay
//! readable by other course tooling.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Target audience of a course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum EducationLevel {
    HighSchool,
    #[default]
    FirstYear,
    AdvancedUndergrad,
    Postgraduate,
    Professional,
    GeneralPublic,
}

impl EducationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EducationLevel::HighSchool => "high-school",
            EducationLevel::FirstYear => "first-year",
            EducationLevel::AdvancedUndergrad => "advanced-undergrad",
            EducationLevel::Postgraduate => "postgraduate",
            EducationLevel::Professional => "professional",
            EducationLevel::GeneralPublic => "general-public",
        }
    }
}

impl FromStr for EducationLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "high-school" => Ok(EducationLevel::HighSchool),
            "first-year" => Ok(EducationLevel::FirstYear),
            "advanced-undergrad" => Ok(EducationLevel::AdvancedUndergrad),
            "postgraduate" => Ok(EducationLevel::Postgraduate),
            "professional" => Ok(EducationLevel::Professional),
            "general-public" => Ok(EducationLevel::GeneralPublic),
            other => Err(format!("unknown education level '{}'", other)),
        }
    }
}

/// How much learners already know.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PriorKnowledge {
    #[default]
    None,
    Some,
    Significant,
}

/// Target length of each chapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChapterLength {
    Concise,
    #[default]
    Standard,
    Comprehensive,
}

impl ChapterLength {
    /// Approximate word count for a chapter.
    pub fn word_count(&self) -> u32 {
        match self {
            ChapterLength::Concise => 2_000,
            ChapterLength::Standard => 4_000,
            ChapterLength::Comprehensive => 6_000,
        }
    }

    /// Approximate reading time in minutes.
    pub fn read_minutes(&self) -> u32 {
        match self {
            ChapterLength::Concise => 10,
            ChapterLength::Standard => 20,
            ChapterLength::Comprehensive => 30,
        }
    }
}

impl FromStr for ChapterLength {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "concise" => Ok(ChapterLength::Concise),
            "standard" => Ok(ChapterLength::Standard),
            "comprehensive" => Ok(ChapterLength::Comprehensive),
            other => Err(format!("unknown chapter length '{}'", other)),
        }
    }
}

/// Room layout the course is taught in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TeachingEnvironment {
    LectureTheatre,
    Collaborative,
    FlatClassroom,
    Online,
}

impl TeachingEnvironment {
    pub fn description(&self) -> &'static str {
        match self {
            TeachingEnvironment::LectureTheatre => "a tiered lecture theatre with fixed seating",
            TeachingEnvironment::Collaborative => "a collaborative room with group tables",
            TeachingEnvironment::FlatClassroom => "a flat classroom with movable desks",
            TeachingEnvironment::Online => "an online, synchronous video session",
        }
    }
}

impl FromStr for TeachingEnvironment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "lecture-theatre" => Ok(TeachingEnvironment::LectureTheatre),
            "collaborative" => Ok(TeachingEnvironment::Collaborative),
            "flat-classroom" => Ok(TeachingEnvironment::FlatClassroom),
            "online" => Ok(TeachingEnvironment::Online),
            other => Err(format!("unknown teaching environment '{}'", other)),
        }
    }
}

/// Everything the user decided before generation starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseSetup {
    pub topic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specific_topics: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avoid_topics: Option<String>,
    #[serde(default)]
    pub education_level: EducationLevel,
    #[serde(default)]
    pub prior_knowledge: PriorKnowledge,
    pub cohort_size: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learner_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teaching_environment: Option<TeachingEnvironment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment_notes: Option<String>,
    pub num_chapters: u32,
    #[serde(default)]
    pub chapter_length: ChapterLength,
    pub widgets_per_chapter: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme_id: Option<String>,
}

impl CourseSetup {
    /// Creates a setup for `topic` with the usual defaults.
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            specific_topics: None,
            avoid_topics: None,
            education_level: EducationLevel::default(),
            prior_knowledge: PriorKnowledge::default(),
            cohort_size: 50,
            learner_notes: None,
            teaching_environment: None,
            environment_notes: None,
            num_chapters: 12,
            chapter_length: ChapterLength::default(),
            widgets_per_chapter: 2,
            theme_id: None,
        }
    }

    /// Builder method to set the number of chapters.
    pub fn with_chapters(mut self, num_chapters: u32) -> Self {
        self.num_chapters = num_chapters;
        self
    }

    /// Builder method to set the education level.
    pub fn with_level(mut self, level: EducationLevel) -> Self {
        self.education_level = level;
        self
    }

    /// Builder method to set the chapter length.
    pub fn with_length(mut self, length: ChapterLength) -> Self {
        self.chapter_length = length;
        self
    }

    /// Builder method to set learner notes.
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.learner_notes = Some(notes.into());
        self
    }
}

/// Learning-science principle a chapter annotation refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SciencePrinciple {
    Spacing,
    Interleaving,
    Retrieval,
    Examples,
    DualCoding,
}

impl SciencePrinciple {
    /// Maps a free-form principle name to its canonical value, defaulting to
    /// spacing when nothing matches.
    pub fn normalize(raw: &str) -> Self {
        let lowered = raw.trim().to_lowercase();
        let s: String = lowered
            .split(|c: char| c == '_' || c.is_whitespace())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("-");

        if s.contains("spacing") || s.contains("distributed") {
            SciencePrinciple::Spacing
        } else if s.contains("interleav") {
            SciencePrinciple::Interleaving
        } else if s.contains("retrieval") || s.contains("testing-effect") || s.contains("test-effect") {
            SciencePrinciple::Retrieval
        } else if s.contains("example")
            || s.contains("concrete")
            || s.contains("analogy")
            || s.contains("case-stud")
        {
            SciencePrinciple::Examples
        } else if s.contains("dual") || s.contains("visual") {
            SciencePrinciple::DualCoding
        } else {
            SciencePrinciple::Spacing
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SciencePrinciple::Spacing => "spacing",
            SciencePrinciple::Interleaving => "interleaving",
            SciencePrinciple::Retrieval => "retrieval",
            SciencePrinciple::Examples => "examples",
            SciencePrinciple::DualCoding => "dual-coding",
        }
    }
}

impl fmt::Display for SciencePrinciple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An interactive widget planned for a chapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Widget {
    pub title: String,
    pub description: String,
    pub concept: String,
    pub rationale: String,
}

/// How a chapter applies one learning-science principle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScienceAnnotation {
    pub principle: SciencePrinciple,
    pub description: String,
    #[serde(default)]
    pub related_chapters: Vec<u32>,
}

/// One chapter of the syllabus. Immutable once the syllabus is committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterSyllabus {
    pub number: u32,
    pub title: String,
    #[serde(default)]
    pub narrative: String,
    #[serde(default)]
    pub key_concepts: Vec<String>,
    #[serde(default)]
    pub widgets: Vec<Widget>,
    #[serde(default)]
    pub science_annotations: Vec<ScienceAnnotation>,
    #[serde(default)]
    pub spacing_connections: Vec<u32>,
}

/// The course blueprint produced by the syllabus stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Syllabus {
    pub course_title: String,
    #[serde(default)]
    pub course_overview: String,
    pub chapters: Vec<ChapterSyllabus>,
}

impl Syllabus {
    /// Looks up a chapter by its number.
    pub fn chapter(&self, number: u32) -> Option<&ChapterSyllabus> {
        self.chapters.iter().find(|ch| ch.number == number)
    }
}

/// One reference found during research.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchSource {
    pub title: String,
    pub authors: String,
    pub year: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    pub summary: String,
    pub relevance: String,
    #[serde(default)]
    pub is_verified: bool,
}

/// Research output for one chapter.
///
/// A dossier without sources is a valid terminal state (research failed or
/// found nothing); downstream stages treat it as "no research".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dossier {
    pub chapter_number: u32,
    pub sources: Vec<ResearchSource>,
    pub synthesis_notes: String,
}

impl Dossier {
    /// Creates a dossier without sources.
    pub fn empty(chapter_number: u32, synthesis_notes: impl Into<String>) -> Self {
        Self {
            chapter_number,
            sources: Vec::new(),
            synthesis_notes: synthesis_notes.into(),
        }
    }

    /// True when the dossier carries at least one source.
    pub fn has_research(&self) -> bool {
        !self.sources.is_empty()
    }
}

/// A wrong option of a multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distractor {
    pub text: String,
    pub feedback: String,
}

/// A multiple-choice question in canonical form: the correct answer always
/// lives in its own slot and display order is never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    pub question: String,
    pub correct_answer: String,
    pub correct_feedback: String,
    pub distractors: Vec<Distractor>,
}

/// A discussion opener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscussionPrompt {
    pub prompt: String,
    pub hook: String,
}

/// An in-class activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub title: String,
    pub duration: String,
    pub description: String,
    pub materials: String,
    pub learning_goal: String,
    pub scaling_notes: String,
}

/// One presentation slide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slide {
    pub title: String,
    #[serde(default)]
    pub bullets: Vec<String>,
    #[serde(default)]
    pub speaker_notes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_text: Option<String>,
}

/// The dependent materials generated for a chapter after its body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MaterialKind {
    PracticeQuiz,
    InClassQuiz,
    Discussion,
    Activities,
    AudioTranscript,
    Slides,
    Infographic,
}

impl MaterialKind {
    /// Every material kind, heavy ones first.
    pub const ALL: [MaterialKind; 7] = [
        MaterialKind::PracticeQuiz,
        MaterialKind::InClassQuiz,
        MaterialKind::Discussion,
        MaterialKind::Activities,
        MaterialKind::AudioTranscript,
        MaterialKind::Slides,
        MaterialKind::Infographic,
    ];

    /// Heavy materials run in the small quiz pool.
    pub fn is_heavy(&self) -> bool {
        matches!(self, MaterialKind::PracticeQuiz | MaterialKind::InClassQuiz)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MaterialKind::PracticeQuiz => "practice-quiz",
            MaterialKind::InClassQuiz => "in-class-quiz",
            MaterialKind::Discussion => "discussion",
            MaterialKind::Activities => "activities",
            MaterialKind::AudioTranscript => "audio-transcript",
            MaterialKind::Slides => "slides",
            MaterialKind::Infographic => "infographic",
        }
    }
}

impl fmt::Display for MaterialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MaterialKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('_', "-");
        MaterialKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| format!("unknown material '{}'", s))
    }
}

/// A chapter with its body and whichever materials have been generated.
///
/// Every optional field is produced independently; the record is valid in
/// any partially filled state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedChapter {
    pub number: u32,
    pub title: String,
    pub html_content: String,
    #[serde(default, rename = "practiceQuizData", skip_serializing_if = "Option::is_none")]
    pub practice_quiz: Option<String>,
    #[serde(default, rename = "inClassQuizData", skip_serializing_if = "Option::is_none")]
    pub in_class_quiz: Option<Vec<QuizQuestion>>,
    #[serde(default, rename = "discussionData", skip_serializing_if = "Option::is_none")]
    pub discussion: Option<Vec<DiscussionPrompt>>,
    #[serde(default, rename = "activityData", skip_serializing_if = "Option::is_none")]
    pub activities: Option<Vec<Activity>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_transcript: Option<String>,
    /// Checkpoint key of the narrated transcript, when speech is configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_asset: Option<String>,
    #[serde(default, rename = "slidesJson", skip_serializing_if = "Option::is_none")]
    pub slides: Option<Vec<Slide>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infographic_prompt: Option<String>,
    /// Checkpoint key of the rendered infographic image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infographic_asset: Option<String>,
}

impl GeneratedChapter {
    /// Creates a record holding only the chapter body.
    pub fn new(number: u32, title: impl Into<String>, html_content: impl Into<String>) -> Self {
        Self {
            number,
            title: title.into(),
            html_content: html_content.into(),
            practice_quiz: None,
            in_class_quiz: None,
            discussion: None,
            activities: None,
            audio_transcript: None,
            audio_asset: None,
            slides: None,
            infographic_prompt: None,
            infographic_asset: None,
        }
    }

    /// True when the material is present.
    pub fn has(&self, kind: MaterialKind) -> bool {
        match kind {
            MaterialKind::PracticeQuiz => self.practice_quiz.is_some(),
            MaterialKind::InClassQuiz => self.in_class_quiz.is_some(),
            MaterialKind::Discussion => self.discussion.is_some(),
            MaterialKind::Activities => self.activities.is_some(),
            MaterialKind::AudioTranscript => self.audio_transcript.is_some(),
            MaterialKind::Slides => self.slides.is_some(),
            MaterialKind::Infographic => self.infographic_prompt.is_some(),
        }
    }

    /// Materials currently present, in [`MaterialKind::ALL`] order.
    pub fn present_materials(&self) -> Vec<MaterialKind> {
        MaterialKind::ALL
            .into_iter()
            .filter(|kind| self.has(*kind))
            .collect()
    }
}

/// The assembled course written as `course.json` before publishing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseRecord {
    pub setup: CourseSetup,
    pub syllabus: Syllabus,
    #[serde(default)]
    pub research_dossiers: Vec<Dossier>,
    /// RFC 3339 timestamp.
    pub generated_at: String,
}

impl CourseRecord {
    /// Dossier of a chapter, if research ran for it.
    pub fn dossier(&self, chapter: u32) -> Option<&Dossier> {
        self.research_dossiers.iter().find(|d| d.chapter_number == chapter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_principle() {
        assert_eq!(SciencePrinciple::normalize("Distributed Practice"), SciencePrinciple::Spacing);
        assert_eq!(SciencePrinciple::normalize("interleaving"), SciencePrinciple::Interleaving);
        assert_eq!(SciencePrinciple::normalize("Testing Effect"), SciencePrinciple::Retrieval);
        assert_eq!(SciencePrinciple::normalize("retrieval_practice"), SciencePrinciple::Retrieval);
        assert_eq!(SciencePrinciple::normalize("Case Studies"), SciencePrinciple::Examples);
        assert_eq!(SciencePrinciple::normalize("concrete examples"), SciencePrinciple::Examples);
        assert_eq!(SciencePrinciple::normalize("Dual Coding"), SciencePrinciple::DualCoding);
        assert_eq!(SciencePrinciple::normalize("visual"), SciencePrinciple::DualCoding);
        assert_eq!(SciencePrinciple::normalize("metacognition"), SciencePrinciple::Spacing);
    }

    #[test]
    fn test_principle_wire_format() {
        let json = serde_json::to_string(&SciencePrinciple::DualCoding).unwrap();
        assert_eq!(json, "\"dual-coding\"");
    }

    #[test]
    fn test_material_kind_parse() {
        assert_eq!("slides".parse::<MaterialKind>(), Ok(MaterialKind::Slides));
        assert_eq!("in_class_quiz".parse::<MaterialKind>(), Ok(MaterialKind::InClassQuiz));
        assert!("podcast".parse::<MaterialKind>().is_err());
        assert!(MaterialKind::PracticeQuiz.is_heavy());
        assert!(!MaterialKind::Slides.is_heavy());
    }

    #[test]
    fn test_generated_chapter_wire_names() {
        let mut chapter = GeneratedChapter::new(1, "Seeing", "<html></html>");
        chapter.practice_quiz = Some("Q1".to_string());
        let value = serde_json::to_value(&chapter).unwrap();
        assert_eq!(value["htmlContent"], "<html></html>");
        assert_eq!(value["practiceQuizData"], "Q1");
        assert!(value.get("slidesJson").is_none());
        assert_eq!(chapter.present_materials(), vec![MaterialKind::PracticeQuiz]);
    }

    #[test]
    fn test_setup_roundtrip_defaults() {
        let setup: CourseSetup = serde_json::from_str(
            r#"{"topic": "Memory", "cohortSize": 30, "numChapters": 3, "widgetsPerChapter": 1}"#,
        )
        .unwrap();
        assert_eq!(setup.education_level, EducationLevel::FirstYear);
        assert_eq!(setup.chapter_length.word_count(), 4_000);
    }
}
