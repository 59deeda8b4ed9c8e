//! Pipeline orchestrator for course generation.
//!
//! [`CoursePipeline`] sequences the four stages:
//! - Syllabus: one streaming call, tolerant parse, checkpoint
//! - Research: one pooled task per chapter
//! - Chapters: body first, then the material fan-out
//! - Publish: pure aggregation of checkpoint artifacts
//!
//! Every unit of work is skipped when its checkpoint already exists, so a
//! run can be re-entered at any stage.

use std::sync::Arc;

use futures::StreamExt;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::course::{chapter_from_value, parse_syllabus, ChapterSyllabus, CourseRecord, CourseSetup, Dossier, MaterialKind, Syllabus};
use crate::error::{ExportError, LlmError, ParseError, StoreError};
use crate::export::{assemble_publish, DocumentExporter, ExportDocument, MarkdownExporter, PublishReport};
use crate::llm::{
    stream_events, CallEvent, GenerationRequest, GenerativeService, ImageGenerator, SpeechGenerator, StreamEvent,
    ThinkingEffort,
};
use crate::prompts::syllabus_prompt;
use crate::scheduler::PoolError;
use crate::storage::{keys, read_json, write_json, write_text, CheckpointStore};
use crate::utils::{ProgressiveExtractor, RecordFields};
use crate::validation::IdentifierValidator;

use super::config::{ConfigError, PipelineConfig};
use super::events::{PipelineEvent, Stage};

/// Key where an unparseable syllabus response is kept for inspection.
pub const SYLLABUS_RAW_KEY: &str = "syllabus_raw.txt";

/// Errors that abort a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The syllabus call failed.
    #[error("Syllabus generation failed: {0}")]
    Generation(#[from] LlmError),

    /// The syllabus response could not be parsed.
    #[error("Syllabus response could not be parsed: {0}")]
    SyllabusParse(#[from] ParseError),

    /// The syllabus has no chapters.
    #[error("Syllabus has no chapters")]
    EmptySyllabus,

    /// No syllabus checkpoint exists.
    #[error("No syllabus found: run the syllabus stage first")]
    MissingSyllabus,

    /// Checkpoint store failure.
    #[error("Checkpoint error: {0}")]
    Store(#[from] StoreError),

    /// Invalid pool configuration.
    #[error("Scheduler error: {0}")]
    Pool(#[from] PoolError),

    /// Publish assembly failed.
    #[error("Publish failed: {0}")]
    Publish(#[from] ExportError),

    /// The syllabus has no chapter with this number.
    #[error("Chapter {0} is not in the syllabus")]
    ChapterNotFound(u32),

    /// The chapter body has not been generated yet.
    #[error("Chapter {0} has not been generated yet")]
    ChapterNotGenerated(u32),

    /// The material cannot be produced with the configured services.
    #[error("Material {0} is unavailable: no image generator configured")]
    MaterialUnavailable(MaterialKind),

    /// Regenerating a material failed; the previous version is kept.
    #[error("Chapter {chapter} {kind} failed: {message}")]
    MaterialFailed {
        chapter: u32,
        kind: MaterialKind,
        message: String,
    },
}

/// Last stage to run before stopping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopAfter {
    Syllabus,
    Research,
}

/// Options for one [`CoursePipeline::run`].
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub stop_after: Option<StopAfter>,
    /// A syllabus to commit instead of generating one.
    pub syllabus: Option<Syllabus>,
    /// Whether to assemble the publish package.
    pub publish: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            stop_after: None,
            syllabus: None,
            publish: true,
        }
    }
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to stop after a stage.
    pub fn with_stop_after(mut self, stage: StopAfter) -> Self {
        self.stop_after = Some(stage);
        self
    }

    /// Builder method to supply a syllabus.
    pub fn with_syllabus(mut self, syllabus: Syllabus) -> Self {
        self.syllabus = Some(syllabus);
        self
    }

    /// Builder method to disable publish assembly.
    pub fn without_publish(mut self) -> Self {
        self.publish = false;
        self
    }
}

/// Outcome of the chapter stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChapterSummary {
    /// Chapters generated in this run.
    pub generated: Vec<u32>,
    /// Chapters whose record already existed with every material present.
    pub skipped: Vec<u32>,
    /// Chapters whose existing record lacked materials that were filled in
    /// this run.
    pub refilled: Vec<u32>,
    /// Chapters left out because they have no research.
    pub missing_research: Vec<u32>,
    /// Chapters whose body generation failed.
    pub failed: Vec<u32>,
}

/// Outcome of a pipeline run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub syllabus: Syllabus,
    pub dossiers: Vec<Dossier>,
    pub chapters: ChapterSummary,
    pub publish: Option<PublishReport>,
    /// The stage the run stopped after, when asked to stop early.
    pub stopped_after: Option<StopAfter>,
}

/// Drives a course through syllabus, research, chapters and publish.
pub struct CoursePipeline {
    pub(super) service: Arc<dyn GenerativeService>,
    pub(super) store: Arc<dyn CheckpointStore>,
    pub(super) validator: Option<Arc<dyn IdentifierValidator>>,
    pub(super) images: Option<Arc<dyn ImageGenerator>>,
    pub(super) speech: Option<Arc<dyn SpeechGenerator>>,
    pub(super) exporters: Vec<Box<dyn DocumentExporter>>,
    pub(super) config: PipelineConfig,
    pub(super) setup: CourseSetup,
    events: Option<mpsc::Sender<PipelineEvent>>,
}

impl CoursePipeline {
    /// Creates a pipeline with default configuration and the Markdown exporter.
    pub fn new(
        service: Arc<dyn GenerativeService>,
        store: Arc<dyn CheckpointStore>,
        setup: CourseSetup,
    ) -> Self {
        Self {
            service,
            store,
            validator: None,
            images: None,
            speech: None,
            exporters: vec![Box::new(MarkdownExporter::new())],
            config: PipelineConfig::default(),
            setup,
            events: None,
        }
    }

    /// Builder method to set the configuration.
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Builder method to set the DOI validator.
    pub fn with_validator(mut self, validator: Arc<dyn IdentifierValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Builder method to enable infographics.
    pub fn with_image_generator(mut self, images: Arc<dyn ImageGenerator>) -> Self {
        self.images = Some(images);
        self
    }

    /// Builder method to narrate audio transcripts.
    pub fn with_speech_generator(mut self, speech: Arc<dyn SpeechGenerator>) -> Self {
        self.speech = Some(speech);
        self
    }

    /// Builder method to add a document exporter.
    pub fn with_exporter(mut self, exporter: Box<dyn DocumentExporter>) -> Self {
        self.exporters.push(exporter);
        self
    }

    /// Builder method to remove all document exporters.
    pub fn without_exporters(mut self) -> Self {
        self.exporters.clear();
        self
    }

    /// Builder method to attach an event consumer.
    pub fn with_events(mut self, events: mpsc::Sender<PipelineEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn setup(&self) -> &CourseSetup {
        &self.setup
    }

    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        &self.store
    }

    /// Theme from the setup, or the configured fallback.
    pub fn theme(&self) -> Option<&str> {
        self.setup.theme_id.as_deref().or(self.config.theme.as_deref())
    }

    /// Sends an event to the attached consumer. Delivery failures are ignored.
    pub(super) async fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event).await;
        }
    }

    /// Runs every stage the options ask for.
    pub async fn run(&self, options: RunOptions) -> Result<RunReport, PipelineError> {
        self.config.validate()?;
        info!(
            topic = %self.setup.topic,
            chapters = self.setup.num_chapters,
            heavy_model = %self.config.heavy_model,
            standard_model = %self.config.standard_model,
            infographics = self.images.is_some(),
            "Starting course pipeline"
        );

        let syllabus = self.run_syllabus(options.syllabus).await?;
        if options.stop_after == Some(StopAfter::Syllabus) {
            info!("Stopped after syllabus");
            return Ok(RunReport {
                syllabus,
                dossiers: Vec::new(),
                chapters: ChapterSummary::default(),
                publish: None,
                stopped_after: Some(StopAfter::Syllabus),
            });
        }

        let dossiers = self.run_research(&syllabus).await?;
        if options.stop_after == Some(StopAfter::Research) {
            info!("Stopped after research");
            return Ok(RunReport {
                syllabus,
                dossiers,
                chapters: ChapterSummary::default(),
                publish: None,
                stopped_after: Some(StopAfter::Research),
            });
        }

        let chapters = self.run_chapters(&syllabus, &dossiers).await?;
        self.write_course_record(&syllabus, &dossiers).await?;

        let publish = if options.publish {
            Some(self.run_publish().await?)
        } else {
            None
        };

        info!(
            generated = chapters.generated.len(),
            skipped = chapters.skipped.len(),
            refilled = chapters.refilled.len(),
            missing_research = chapters.missing_research.len(),
            failed = chapters.failed.len(),
            "Course pipeline complete"
        );

        Ok(RunReport {
            syllabus,
            dossiers,
            chapters,
            publish,
            stopped_after: None,
        })
    }

    /// Returns the committed syllabus, generating it when no checkpoint exists.
    ///
    /// A supplied syllabus is committed as the checkpoint and no call is made.
    pub async fn run_syllabus(&self, provided: Option<Syllabus>) -> Result<Syllabus, PipelineError> {
        self.emit(PipelineEvent::StageStarted(Stage::Syllabus)).await;

        let syllabus = if let Some(syllabus) = provided {
            if syllabus.chapters.is_empty() {
                return Err(PipelineError::EmptySyllabus);
            }
            info!(course = %syllabus.course_title, chapters = syllabus.chapters.len(), "Using supplied syllabus");
            write_json(self.store.as_ref(), keys::SYLLABUS, &syllabus).await?;
            syllabus
        } else if let Some(syllabus) = read_json::<Syllabus>(self.store.as_ref(), keys::SYLLABUS).await? {
            if syllabus.chapters.is_empty() {
                return Err(PipelineError::EmptySyllabus);
            }
            info!(course = %syllabus.course_title, chapters = syllabus.chapters.len(), "Syllabus checkpoint found, skipping generation");
            syllabus
        } else {
            let syllabus = self.generate_syllabus().await?;
            if syllabus.chapters.is_empty() {
                return Err(PipelineError::EmptySyllabus);
            }
            write_json(self.store.as_ref(), keys::SYLLABUS, &syllabus).await?;
            self.export(&ExportDocument::Syllabus(&syllabus)).await;
            syllabus
        };

        self.emit(PipelineEvent::StageCompleted(Stage::Syllabus)).await;
        Ok(syllabus)
    }

    async fn generate_syllabus(&self) -> Result<Syllabus, PipelineError> {
        info!(topic = %self.setup.topic, "Generating syllabus");
        let prompt = syllabus_prompt(&self.setup);
        let request = GenerationRequest::new("syllabus", &self.config.heavy_model, prompt.system)
            .with_user_message(prompt.user)
            .with_thinking(ThinkingEffort::Max)
            .with_max_tokens(self.config.limits.syllabus);

        let mut extractor = ProgressiveExtractor::new(RecordFields::syllabus());
        let mut buffer = String::new();
        let text = self
            .call(request, |event| {
                let delta = match event {
                    StreamEvent::Text(delta) => delta,
                    StreamEvent::Retrying { attempt } => {
                        buffer.clear();
                        extractor.reset();
                        return Some(PipelineEvent::SyllabusRestarted { attempt });
                    }
                    _ => return None,
                };
                buffer.push_str(&delta);
                let update = extractor.update(&buffer);
                if update.new_records.is_empty() {
                    return None;
                }
                let first = update.total_records - update.new_records.len();
                let new_chapters: Vec<ChapterSyllabus> = update
                    .new_records
                    .iter()
                    .enumerate()
                    .map(|(i, value)| chapter_from_value(value, first + i))
                    .collect();
                for ch in &new_chapters {
                    info!(chapter = ch.number, title = %ch.title, "Syllabus chapter streamed");
                }
                Some(PipelineEvent::SyllabusPreview {
                    title: update.title,
                    overview: update.overview,
                    new_chapters,
                    total_chapters: update.total_records,
                })
            })
            .await?;

        match parse_syllabus(&text) {
            Ok(syllabus) => {
                info!(course = %syllabus.course_title, chapters = syllabus.chapters.len(), "Syllabus generated");
                Ok(syllabus)
            }
            Err(err) => {
                warn!(error = %err, key = SYLLABUS_RAW_KEY, "Failed to parse syllabus response, raw text saved");
                write_text(self.store.as_ref(), SYLLABUS_RAW_KEY, &text).await?;
                Err(err.into())
            }
        }
    }

    /// Runs one retrying streaming call and returns its full text.
    ///
    /// Every incremental event is handed to `observe`; the pipeline events it
    /// returns are forwarded to the consumer.
    pub(super) async fn call<F>(&self, request: GenerationRequest, mut observe: F) -> Result<String, LlmError>
    where
        F: FnMut(StreamEvent) -> Option<PipelineEvent> + Send,
    {
        let label = request.label.clone();
        let mut events = Box::pin(stream_events(
            Arc::clone(&self.service),
            request,
            self.config.retry.clone(),
        ));
        while let Some(event) = events.next().await {
            match event {
                CallEvent::Token(token) => {
                    if let Some(progress) = observe(token) {
                        self.emit(progress).await;
                    }
                }
                CallEvent::Completed(text) => return Ok(text),
                CallEvent::Failed(err) => return Err(err),
            }
        }
        Err(LlmError::Stream(format!("{} ended without a result", label)))
    }

    /// Writes `course.json` with the setup, syllabus and dossiers.
    pub async fn write_course_record(
        &self,
        syllabus: &Syllabus,
        dossiers: &[Dossier],
    ) -> Result<(), PipelineError> {
        let record = CourseRecord {
            setup: self.setup.clone(),
            syllabus: syllabus.clone(),
            research_dossiers: dossiers.to_vec(),
            generated_at: chrono::Utc::now().to_rfc3339(),
        };
        write_json(self.store.as_ref(), keys::COURSE, &record).await?;
        Ok(())
    }

    /// Assembles the publish package from the checkpoint store.
    pub async fn run_publish(&self) -> Result<PublishReport, PipelineError> {
        self.emit(PipelineEvent::StageStarted(Stage::Publish)).await;
        let report = assemble_publish(self.store.as_ref(), self.theme()).await?;
        self.emit(PipelineEvent::PublishWritten {
            files: report.files.len(),
        })
        .await;
        self.emit(PipelineEvent::StageCompleted(Stage::Publish)).await;
        Ok(report)
    }

    /// Runs every exporter on `document` and checkpoints the results.
    ///
    /// Failures are logged and never returned.
    pub(super) async fn export(&self, document: &ExportDocument<'_>) {
        for exporter in &self.exporters {
            let key = keys::export(document.chapter_number(), document.kind(), exporter.extension());
            match exporter.export(document) {
                Ok(bytes) => {
                    if let Err(e) = self.store.write(&key, &bytes).await {
                        warn!(key = %key, error = %e, "Failed to write export");
                    }
                }
                Err(e) => {
                    warn!(
                        exporter = exporter.name(),
                        kind = document.kind(),
                        error = %e,
                        "Export failed"
                    );
                }
            }
        }
    }

    /// Loads the committed syllabus.
    pub(super) async fn load_syllabus(&self) -> Result<Syllabus, PipelineError> {
        read_json::<Syllabus>(self.store.as_ref(), keys::SYLLABUS)
            .await?
            .ok_or(PipelineError::MissingSyllabus)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::EventSink;
    use crate::storage::MemoryCheckpointStore;
    use async_trait::async_trait;

    struct Fixed(String);

    #[async_trait]
    impl GenerativeService for Fixed {
        async fn stream(&self, _request: &GenerationRequest, sink: &EventSink) -> Result<String, LlmError> {
            for chunk in self.0.as_bytes().chunks(16) {
                sink.text(String::from_utf8_lossy(chunk).into_owned());
            }
            Ok(self.0.clone())
        }
    }

    const SYLLABUS_JSON: &str = r#"{"courseTitle": "Minds", "courseOverview": "Arc.", "chapters": [
        {"number": 1, "title": "Seeing", "narrative": "n1", "keyConcepts": ["light"]},
        {"number": 2, "title": "Judging", "narrative": "n2", "keyConcepts": ["bias"]}
    ]}"#;

    fn pipeline(response: &str) -> (CoursePipeline, Arc<MemoryCheckpointStore>) {
        let store = Arc::new(MemoryCheckpointStore::new());
        let pipeline = CoursePipeline::new(
            Arc::new(Fixed(response.to_string())),
            store.clone(),
            CourseSetup::new("Cognition").with_chapters(2),
        );
        (pipeline, store)
    }

    #[tokio::test]
    async fn test_syllabus_generated_with_preview() {
        let (tx, mut rx) = mpsc::channel(64);
        let (pipeline, store) = pipeline(SYLLABUS_JSON);
        let pipeline = pipeline.with_events(tx);

        let syllabus = pipeline.run_syllabus(None).await.unwrap();
        assert_eq!(syllabus.chapters.len(), 2);
        assert!(store.exists(keys::SYLLABUS).await.unwrap());
        assert!(store.exists("exports/syllabus.md").await.unwrap());
        drop(pipeline);

        let mut previewed = Vec::new();
        while let Some(event) = rx.recv().await {
            if let PipelineEvent::SyllabusPreview { new_chapters, .. } = event {
                previewed.extend(new_chapters.into_iter().map(|ch| ch.number));
            }
        }
        assert_eq!(previewed, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_unparseable_syllabus_keeps_raw_text() {
        let (pipeline, store) = pipeline("I cannot design this course.");
        let err = pipeline.run_syllabus(None).await.unwrap_err();
        assert!(matches!(err, PipelineError::SyllabusParse(_)));
        assert!(store.exists(SYLLABUS_RAW_KEY).await.unwrap());
        assert!(!store.exists(keys::SYLLABUS).await.unwrap());
    }

    #[tokio::test]
    async fn test_supplied_syllabus_is_committed() {
        let (pipeline, store) = pipeline("unused");
        let supplied = parse_syllabus(SYLLABUS_JSON).unwrap();
        let syllabus = pipeline.run_syllabus(Some(supplied.clone())).await.unwrap();
        assert_eq!(syllabus, supplied);
        let stored: Syllabus = read_json(store.as_ref(), keys::SYLLABUS).await.unwrap().unwrap();
        assert_eq!(stored, supplied);
    }

    #[tokio::test]
    async fn test_stop_after_syllabus() {
        let (pipeline, store) = pipeline(SYLLABUS_JSON);
        let report = pipeline
            .run(RunOptions::new().with_stop_after(StopAfter::Syllabus))
            .await
            .unwrap();
        assert_eq!(report.stopped_after, Some(StopAfter::Syllabus));
        assert!(report.dossiers.is_empty());
        assert!(store.list("research/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_config_is_fatal() {
        let (pipeline, _) = pipeline(SYLLABUS_JSON);
        let pipeline = pipeline.with_config(PipelineConfig::new().with_research_concurrency(0));
        let err = pipeline.run(RunOptions::new()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn test_theme_falls_back_to_config() {
        let (pipeline, _) = pipeline("");
        assert_eq!(pipeline.theme(), None);
        let pipeline = pipeline.with_config(PipelineConfig::new().with_theme("forest"));
        assert_eq!(pipeline.theme(), Some("forest"));
    }
}
