//! CLI command definitions for course-forge.
//!
//! `generate` runs the full pipeline (resuming from whatever checkpoints the
//! output directory already holds), `regenerate` redoes one material of a
//! finished chapter, and `publish` reassembles the static package.

use crate::course::{
    parse_syllabus, ChapterLength, CourseRecord, CourseSetup, EducationLevel, MaterialKind, Syllabus,
    TeachingEnvironment,
};
use crate::export::assemble_publish;
use crate::llm::{AnthropicClient, ElevenLabsClient, GeminiImageClient};
use crate::pipeline::{CoursePipeline, PipelineConfig, PipelineEvent, RunOptions, StopAfter};
use crate::storage::{keys, read_json_lenient, FsCheckpointStore};
use crate::utils::slugify;
use crate::validation::DoiValidator;
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Default parent directory for course output.
const DEFAULT_OUTPUT_ROOT: &str = "./output";

/// Event channel capacity between the pipeline and the progress reporter.
const EVENT_BUFFER: usize = 256;

/// Course generation pipeline.
#[derive(Parser)]
#[command(name = "course-forge")]
#[command(about = "Generate a complete, researched course package")]
#[command(version)]
#[command(
    long_about = "course-forge turns a topic into a syllabus, research dossiers, interactive chapters and teaching materials.\n\nEvery artifact is checkpointed under the output directory, so an interrupted run resumes where it stopped.\n\nExample usage:\n  course-forge generate --topic \"Human memory\" --chapters 8 --output ./output/memory"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Generate (or resume) a course.
    #[command(alias = "gen")]
    Generate(GenerateArgs),

    /// Regenerate one material of an already generated chapter.
    Regenerate(RegenerateArgs),

    /// Reassemble the publish package from existing checkpoints.
    Publish(PublishArgs),
}

/// Stage to stop after.
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopStage {
    Syllabus,
    Research,
}

impl From<StopStage> for StopAfter {
    fn from(stage: StopStage) -> Self {
        match stage {
            StopStage::Syllabus => StopAfter::Syllabus,
            StopStage::Research => StopAfter::Research,
        }
    }
}

/// Arguments for `course-forge generate`.
#[derive(Parser, Debug)]
pub struct GenerateArgs {
    /// Course topic.
    #[arg(short = 't', long)]
    pub topic: String,

    /// Number of chapters.
    #[arg(short = 'c', long, default_value = "12")]
    pub chapters: u32,

    /// Education level (high-school, first-year, advanced-undergrad, postgraduate, professional, general-public).
    #[arg(long, default_value = "first-year")]
    pub level: EducationLevel,

    /// Chapter length (concise, standard, comprehensive).
    #[arg(long, default_value = "standard")]
    pub length: ChapterLength,

    /// Interactive widgets per chapter.
    #[arg(long, default_value = "2")]
    pub widgets: u32,

    /// Expected cohort size.
    #[arg(long, default_value = "50")]
    pub cohort: u32,

    /// Teaching environment (lecture-theatre, collaborative, flat-classroom, online).
    #[arg(long)]
    pub environment: Option<TeachingEnvironment>,

    /// Notes about the learners.
    #[arg(long)]
    pub notes: Option<String>,

    /// Visual theme identifier.
    #[arg(long)]
    pub theme: Option<String>,

    /// Output directory. Defaults to ./output/<topic-slug>.
    #[arg(short = 'o', long)]
    pub output: Option<String>,

    /// Stop after the given stage.
    #[arg(long, value_enum)]
    pub stop_after: Option<StopStage>,

    /// Use this syllabus file instead of generating one.
    #[arg(long)]
    pub syllabus: Option<String>,

    /// Skip publish assembly.
    #[arg(long)]
    pub no_publish: bool,

    /// Output a JSON summary to stdout.
    #[arg(short = 'j', long)]
    pub json: bool,
}

impl GenerateArgs {
    fn setup(&self) -> CourseSetup {
        let mut setup = CourseSetup::new(self.topic.trim())
            .with_chapters(self.chapters)
            .with_level(self.level)
            .with_length(self.length);
        setup.widgets_per_chapter = self.widgets;
        setup.cohort_size = self.cohort;
        setup.teaching_environment = self.environment;
        setup.learner_notes = self.notes.clone();
        setup.theme_id = self.theme.clone();
        setup
    }

    fn output_dir(&self) -> PathBuf {
        match &self.output {
            Some(dir) => PathBuf::from(dir),
            None => PathBuf::from(DEFAULT_OUTPUT_ROOT).join(slugify(&self.topic)),
        }
    }
}

/// Arguments for `course-forge regenerate`.
#[derive(Parser, Debug)]
pub struct RegenerateArgs {
    /// Course output directory.
    #[arg(short = 'o', long)]
    pub output: String,

    /// Chapter number.
    #[arg(short = 'c', long)]
    pub chapter: u32,

    /// Material to regenerate (practice-quiz, in-class-quiz, discussion, activities, audio-transcript, slides, infographic).
    #[arg(short = 'm', long)]
    pub material: MaterialKind,

    /// Reassemble the publish package afterwards.
    #[arg(long)]
    pub publish: bool,
}

/// Arguments for `course-forge publish`.
#[derive(Parser, Debug)]
pub struct PublishArgs {
    /// Course output directory.
    #[arg(short = 'o', long)]
    pub output: String,

    /// Override the visual theme.
    #[arg(long)]
    pub theme: Option<String>,
}

/// Parse command-line arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
///
/// For more control over logging initialization, use `parse_cli()` and `run_with_cli()`.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Generate(args) => run_generate_command(args).await,
        Commands::Regenerate(args) => run_regenerate_command(args).await,
        Commands::Publish(args) => run_publish_command(args).await,
    }
}

/// JSON summary of a generate run.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationOutput {
    pub status: String,
    pub course_title: String,
    pub output_directory: String,
    pub chapters: usize,
    pub researched: usize,
    pub generated: Vec<u32>,
    pub skipped: Vec<u32>,
    pub refilled: Vec<u32>,
    pub missing_research: Vec<u32>,
    pub failed: Vec<u32>,
    pub published_files: Option<usize>,
    pub total_duration_ms: u64,
}

// ============================================================================
// Shared wiring
// ============================================================================

fn build_pipeline(store: Arc<FsCheckpointStore>, setup: CourseSetup) -> anyhow::Result<CoursePipeline> {
    let config = PipelineConfig::from_env()?;
    let client = AnthropicClient::from_env().map_err(|e| {
        anyhow::anyhow!(
            "Failed to initialize the generative service: {}. Please set ANTHROPIC_API_KEY.",
            e
        )
    })?;

    let mut pipeline = CoursePipeline::new(Arc::new(client), store, setup)
        .with_config(config)
        .with_validator(Arc::new(DoiValidator::new()));

    match GeminiImageClient::from_env() {
        Some(images) => pipeline = pipeline.with_image_generator(Arc::new(images)),
        None => info!("No image generator configured, infographics disabled"),
    }
    match ElevenLabsClient::from_env() {
        Some(speech) => pipeline = pipeline.with_speech_generator(Arc::new(speech)),
        None => info!("No speech generator configured, audio stays as transcripts"),
    }
    Ok(pipeline)
}

/// Logs pipeline progress until the sending side is dropped.
fn spawn_reporter() -> (mpsc::Sender<PipelineEvent>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel(EVENT_BUFFER);
    let handle = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            report_event(&event);
        }
    });
    (tx, handle)
}

fn report_event(event: &PipelineEvent) {
    match event {
        PipelineEvent::StageStarted(stage) => info!(stage = %stage, "Stage started"),
        PipelineEvent::StageCompleted(stage) => info!(stage = %stage, "Stage completed"),
        PipelineEvent::SyllabusPreview {
            title,
            total_chapters,
            ..
        } => info!(
            title = title.as_deref().unwrap_or("(untitled)"),
            chapters = total_chapters,
            "Syllabus taking shape"
        ),
        PipelineEvent::SyllabusRestarted { attempt } => {
            warn!(attempt, "Syllabus call retried, preview restarted")
        }
        PipelineEvent::ResearchSearch { chapter, query } => {
            info!(chapter, query = %query, "Searching")
        }
        PipelineEvent::ChapterSkipped { chapter } => info!(chapter, "Chapter already done"),
        PipelineEvent::ChapterMissingResearch { chapter } => {
            warn!(chapter, "Chapter has no research and was not generated")
        }
        PipelineEvent::ChapterFailed { chapter, error } => warn!(chapter, error = %error, "Chapter failed"),
        PipelineEvent::ChapterCompleted { chapter, materials } => {
            info!(chapter, materials = materials.len(), "Chapter done")
        }
        PipelineEvent::MaterialCompleted { chapter, kind } => info!(chapter, kind = %kind, "Material done"),
        PipelineEvent::MaterialFailed { chapter, kind, error } => {
            warn!(chapter, kind = %kind, error = %error, "Material failed")
        }
        PipelineEvent::PublishWritten { files } => info!(files, "Publish package written"),
    }
}

async fn load_syllabus_file(path: &str) -> anyhow::Result<Syllabus> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read syllabus file {}: {}", path, e))?;
    let syllabus = parse_syllabus(&text)?;
    Ok(syllabus)
}

// ============================================================================
// Generate Command Implementation
// ============================================================================

async fn run_generate_command(args: GenerateArgs) -> anyhow::Result<()> {
    let output_dir = args.output_dir();
    tokio::fs::create_dir_all(&output_dir).await?;
    info!(topic = %args.topic, output = %output_dir.display(), "Generating course");

    let store = Arc::new(FsCheckpointStore::new(&output_dir));
    let (events, reporter) = spawn_reporter();
    let pipeline = build_pipeline(store, args.setup())?.with_events(events);

    let mut options = RunOptions::new();
    if let Some(stage) = args.stop_after {
        options = options.with_stop_after(stage.into());
    }
    if let Some(path) = &args.syllabus {
        options = options.with_syllabus(load_syllabus_file(path).await?);
    }
    if args.no_publish {
        options = options.without_publish();
    }

    let start = std::time::Instant::now();
    let result = pipeline.run(options).await;
    drop(pipeline);
    let _ = reporter.await;
    let report = result?;

    let output = GenerationOutput {
        status: if report.chapters.failed.is_empty() {
            "success".to_string()
        } else {
            "partial".to_string()
        },
        course_title: report.syllabus.course_title.clone(),
        output_directory: output_dir.display().to_string(),
        chapters: report.syllabus.chapters.len(),
        researched: report.dossiers.iter().filter(|d| d.has_research()).count(),
        generated: report.chapters.generated,
        skipped: report.chapters.skipped,
        refilled: report.chapters.refilled,
        missing_research: report.chapters.missing_research,
        failed: report.chapters.failed,
        published_files: report.publish.as_ref().map(|p| p.files.len()),
        total_duration_ms: start.elapsed().as_millis() as u64,
    };

    if args.json {
        let json_output = serde_json::to_string_pretty(&output)
            .map_err(|e| anyhow::anyhow!("Failed to serialize JSON output: {}", e))?;
        println!("{}", json_output);
        return Ok(());
    }

    println!("{} ({} chapters)", output.course_title, output.chapters);
    println!("  generated:        {:?}", output.generated);
    println!("  already done:     {:?}", output.skipped);
    if !output.refilled.is_empty() {
        println!("  refilled:         {:?}", output.refilled);
    }
    if !output.missing_research.is_empty() {
        println!("  missing research: {:?}", output.missing_research);
    }
    if !output.failed.is_empty() {
        println!("  failed:           {:?}", output.failed);
    }
    match output.published_files {
        Some(files) => println!("  published {} files to {}/publish", files, output.output_directory),
        None => println!("  output in {}", output.output_directory),
    }
    Ok(())
}

// ============================================================================
// Regenerate Command Implementation
// ============================================================================

async fn run_regenerate_command(args: RegenerateArgs) -> anyhow::Result<()> {
    let store = Arc::new(FsCheckpointStore::new(&args.output));

    let setup = match read_json_lenient::<CourseRecord>(store.as_ref(), keys::COURSE).await? {
        Some(record) => record.setup,
        None => match read_json_lenient::<Syllabus>(store.as_ref(), keys::SYLLABUS).await? {
            Some(syllabus) => CourseSetup::new(syllabus.course_title),
            None => anyhow::bail!("No syllabus found in {}", args.output),
        },
    };

    let (events, reporter) = spawn_reporter();
    let pipeline = build_pipeline(store, setup)?.with_events(events);
    let result = pipeline.regenerate_material(args.chapter, args.material).await;
    let published = match (&result, args.publish) {
        (Ok(_), true) => Some(pipeline.run_publish().await),
        _ => None,
    };
    drop(pipeline);
    let _ = reporter.await;

    let chapter = result?;
    println!("Regenerated {} for chapter {} ({})", args.material, chapter.number, chapter.title);
    if let Some(report) = published {
        println!("Published {} files", report?.files.len());
    }
    Ok(())
}

// ============================================================================
// Publish Command Implementation
// ============================================================================

async fn run_publish_command(args: PublishArgs) -> anyhow::Result<()> {
    let store = FsCheckpointStore::new(&args.output);
    let theme = match args.theme {
        Some(theme) => Some(theme),
        None => read_json_lenient::<CourseRecord>(&store, keys::COURSE)
            .await?
            .and_then(|record| record.setup.theme_id)
            .or(PipelineConfig::from_env()?.theme),
    };

    let report = assemble_publish(&store, theme.as_deref()).await?;
    println!(
        "Published {} ({} chapters, {} files) to {}/publish",
        report.course_title,
        report.chapters,
        report.files.len(),
        args.output
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses() {
        // Verify CLI definition is valid
        Cli::command().debug_assert();
    }

    #[test]
    fn test_generate_command_defaults() {
        let args = vec!["course-forge", "generate", "--topic", "Human Memory"];
        let cli = Cli::try_parse_from(args).expect("should parse");

        match cli.command {
            Commands::Generate(args) => {
                assert_eq!(args.chapters, 12);
                assert_eq!(args.level, EducationLevel::FirstYear);
                assert_eq!(args.length, ChapterLength::Standard);
                assert!(args.stop_after.is_none());
                assert!(!args.no_publish);
                assert_eq!(args.output_dir(), PathBuf::from("./output/human-memory"));

                let setup = args.setup();
                assert_eq!(setup.num_chapters, 12);
                assert_eq!(setup.widgets_per_chapter, 2);
                assert_eq!(setup.cohort_size, 50);
            }
            _ => panic!("Expected Generate command"),
        }
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn test_generate_command_with_all_options() {
        let args = vec![
            "course-forge",
            "gen",
            "-t",
            "Cognition",
            "-c",
            "6",
            "--level",
            "postgraduate",
            "--length",
            "concise",
            "--environment",
            "online",
            "--theme",
            "ocean",
            "-o",
            "/tmp/cognition",
            "--stop-after",
            "research",
            "--no-publish",
            "-j",
            "--log-level",
            "debug",
        ];
        let cli = Cli::try_parse_from(args).expect("should parse");

        assert_eq!(cli.log_level, "debug");
        match cli.command {
            Commands::Generate(args) => {
                let setup = args.setup();
                assert_eq!(setup.num_chapters, 6);
                assert_eq!(setup.education_level, EducationLevel::Postgraduate);
                assert_eq!(setup.chapter_length, ChapterLength::Concise);
                assert_eq!(setup.teaching_environment, Some(TeachingEnvironment::Online));
                assert_eq!(setup.theme_id.as_deref(), Some("ocean"));
                assert_eq!(args.output_dir(), PathBuf::from("/tmp/cognition"));
                assert_eq!(args.stop_after.map(StopAfter::from), Some(StopAfter::Research));
                assert!(args.no_publish);
                assert!(args.json);
            }
            _ => panic!("Expected Generate command"),
        }
    }

    #[test]
    fn test_generate_rejects_unknown_length() {
        let args = vec!["course-forge", "generate", "-t", "x", "--length", "epic"];
        assert!(Cli::try_parse_from(args).is_err());
    }

    #[test]
    fn test_regenerate_command() {
        let args = vec![
            "course-forge",
            "regenerate",
            "-o",
            "./output/memory",
            "--chapter",
            "3",
            "--material",
            "in-class-quiz",
        ];
        let cli = Cli::try_parse_from(args).expect("should parse");

        match cli.command {
            Commands::Regenerate(args) => {
                assert_eq!(args.chapter, 3);
                assert_eq!(args.material, MaterialKind::InClassQuiz);
                assert!(!args.publish);
            }
            _ => panic!("Expected Regenerate command"),
        }
    }

    #[test]
    fn test_publish_command() {
        let args = vec!["course-forge", "publish", "--output", "./output/memory"];
        let cli = Cli::try_parse_from(args).expect("should parse");

        match cli.command {
            Commands::Publish(args) => {
                assert_eq!(args.output, "./output/memory");
                assert!(args.theme.is_none());
            }
            _ => panic!("Expected Publish command"),
        }
    }

    #[test]
    fn test_generation_output_serialization() {
        let output = GenerationOutput {
            status: "success".to_string(),
            course_title: "Memory".to_string(),
            output_directory: "./output/memory".to_string(),
            chapters: 3,
            researched: 2,
            generated: vec![1, 3],
            skipped: Vec::new(),
            refilled: Vec::new(),
            missing_research: vec![2],
            failed: Vec::new(),
            published_files: Some(12),
            total_duration_ms: 1000,
        };

        let json = serde_json::to_string_pretty(&output).expect("serialization should succeed");
        assert!(json.contains("\"status\": \"success\""));
        assert!(json.contains("\"missing_research\": [\n    2\n  ]"));
        assert!(json.contains("\"published_files\": 12"));
    }
}
