//! Static course package assembly.
//!
//! Reads whatever checkpoint artifacts exist for every chapter, copies the
//! chapter bodies and binary assets under `publish/`, renders
//! `publish/index.html` and records every written file in
//! `publish/manifest.json`. Materials may be partially present; a missing
//! artifact is simply left out of the package.

use serde::Serialize;
use sha2::{Digest, Sha256};
use tera::{Context, Tera};
use tracing::{debug, info, warn};

use super::kind_label;
use crate::course::{
    Activity, CourseRecord, DiscussionPrompt, Dossier, MaterialKind, QuizQuestion, Slide, Syllabus,
};
use crate::error::{ExportError, StoreError};
use crate::storage::{keys, read_json_lenient, read_text, CheckpointStore};
use crate::utils::pad;

/// Image extensions recognized as infographic assets.
const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "webp"];

/// Audio extensions recognized as narration assets.
const AUDIO_EXTENSIONS: [&str; 2] = ["mp3", "wav"];

/// One file of the published package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    /// Path relative to `publish/`.
    pub path: String,
    pub bytes: usize,
    pub sha256: String,
}

/// Summary of an assembled package.
#[derive(Debug, Clone)]
pub struct PublishReport {
    pub course_title: String,
    pub chapters: usize,
    /// Every file written, excluding the manifest itself.
    pub files: Vec<ManifestEntry>,
}

impl PublishReport {
    /// Looks up a written file by its package path.
    pub fn file(&self, path: &str) -> Option<&ManifestEntry> {
        self.files.iter().find(|entry| entry.path == path)
    }
}

#[derive(Debug, Serialize)]
struct DownloadLink {
    label: String,
    path: String,
}

#[derive(Debug, Serialize)]
struct ChapterView {
    number: u32,
    title: String,
    narrative: String,
    reading: Option<String>,
    infographic: Option<String>,
    practice_quiz: Option<String>,
    transcript: Option<String>,
    audio: Option<String>,
    discussion: Vec<DiscussionPrompt>,
    activities: Vec<Activity>,
    slides: Vec<Slide>,
    in_class_questions: usize,
    dossier: Option<Dossier>,
    downloads: Vec<DownloadLink>,
    available: Vec<&'static str>,
}

/// Writes package files and records them for the manifest.
struct PackageWriter<'a> {
    store: &'a dyn CheckpointStore,
    entries: Vec<ManifestEntry>,
}

impl<'a> PackageWriter<'a> {
    fn new(store: &'a dyn CheckpointStore) -> Self {
        Self {
            store,
            entries: Vec::new(),
        }
    }

    async fn put(&mut self, path: &str, data: &[u8]) -> Result<(), ExportError> {
        self.store.write(&keys::publish(path), data).await?;
        debug!(path = %path, bytes = data.len(), "Wrote publish file");
        self.entries.push(ManifestEntry {
            path: path.to_string(),
            bytes: data.len(),
            sha256: sha256_hex(data),
        });
        Ok(())
    }

    /// Copies a checkpoint into the package. Returns false when the source is absent.
    async fn copy(&mut self, source: &str, path: &str) -> Result<bool, ExportError> {
        match self.store.read(source).await? {
            Some(bytes) => {
                self.put(path, &bytes).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Hex-encoded SHA-256 digest of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

async fn read_optional_text(
    store: &dyn CheckpointStore,
    key: &str,
) -> Result<Option<String>, ExportError> {
    match read_text(store, key).await {
        Ok(text) => Ok(text),
        Err(StoreError::NotUtf8 { .. }) => {
            warn!(key = %key, "Skipping non-UTF-8 checkpoint");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// Loads the syllabus and dossiers, preferring `course.json`.
async fn load_course(store: &dyn CheckpointStore) -> Result<(Syllabus, Vec<Dossier>), ExportError> {
    if let Some(course) = read_json_lenient::<CourseRecord>(store, keys::COURSE).await? {
        return Ok((course.syllabus, course.research_dossiers));
    }
    match read_json_lenient::<Syllabus>(store, keys::SYLLABUS).await? {
        Some(syllabus) => Ok((syllabus, Vec::new())),
        None => Err(ExportError::MissingSyllabus),
    }
}

fn file_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

fn extension(key: &str) -> Option<&str> {
    file_name(key).rsplit_once('.').map(|(_, ext)| ext)
}

/// Kind segment of an export key such as `exports/03_research.md`.
fn export_kind(key: &str) -> &str {
    let stem = file_name(key).split('.').next().unwrap_or_default();
    match stem.split_once('_') {
        Some((_, kind)) => kind,
        None => stem,
    }
}

fn download_label(key: &str) -> String {
    let label = kind_label(export_kind(key));
    match extension(key) {
        Some(ext) => format!("{} ({})", label, ext.to_uppercase()),
        None => label.to_string(),
    }
}

const INDEX_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{{ course_title }}</title>
<style>
body { font-family: system-ui, sans-serif; max-width: 60rem; margin: 0 auto; padding: 2rem; line-height: 1.5; }
.chapter { border-top: 1px solid #ccc; padding: 1rem 0; }
.chapter img { max-width: 100%; }
.downloads a { margin-right: 1rem; }
.missing { color: #888; font-style: italic; }
</style>
</head>
<body class="theme-{{ theme }}">
<header>
<h1>{{ course_title }}</h1>
<p>{{ course_overview }}</p>
{% if course_downloads %}<p class="downloads">{% for link in course_downloads %}<a href="{{ link.path }}">{{ link.label }}</a>{% endfor %}</p>{% endif %}
</header>
<main>
{% for ch in chapters %}
<section class="chapter" id="chapter-{{ ch.number }}">
<h2>Chapter {{ ch.number }}: {{ ch.title }}</h2>
<p>{{ ch.narrative }}</p>
{% if ch.reading %}<p><a href="{{ ch.reading }}">Read the chapter</a></p>{% endif %}
{% if ch.infographic %}<figure><img src="{{ ch.infographic }}" alt="Infographic for {{ ch.title }}"></figure>{% endif %}
{% if ch.discussion %}
<h3>Conversation Starters</h3>
<ul>{% for d in ch.discussion %}<li><strong>{{ d.hook }}</strong> {{ d.prompt }}</li>{% endfor %}</ul>
{% endif %}
{% if ch.activities %}
<h3>Activities</h3>
{% for a in ch.activities %}<details><summary>{{ a.title }} ({{ a.duration }})</summary><p>{{ a.description }}</p>{% if a.learningGoal %}<p><em>Learning goal:</em> {{ a.learningGoal }}</p>{% endif %}</details>{% endfor %}
{% endif %}
{% if ch.slides %}
<h3>Slides</h3>
<ol>{% for s in ch.slides %}<li>{{ s.title }}</li>{% endfor %}</ol>
{% endif %}
{% if ch.practice_quiz %}<details><summary>Practice Quiz</summary><pre>{{ ch.practice_quiz }}</pre></details>{% endif %}
{% if ch.in_class_questions > 0 %}<p>In-class quiz: {{ ch.in_class_questions }} questions</p>{% endif %}
{% if ch.audio %}<audio controls src="{{ ch.audio }}"></audio>{% endif %}
{% if ch.transcript %}<details><summary>Audio Transcript</summary><pre>{{ ch.transcript }}</pre></details>{% endif %}
{% if ch.dossier and ch.dossier.sources %}
<h3>Sources</h3>
<ul>{% for src in ch.dossier.sources %}<li>{{ src.authors }} ({{ src.year }}). {{ src.title }}{% if src.doi %}. doi:{{ src.doi }}{% endif %}</li>{% endfor %}</ul>
{% endif %}
{% if ch.downloads %}<p class="downloads">{% for link in ch.downloads %}<a href="{{ link.path }}">{{ link.label }}</a>{% endfor %}</p>{% endif %}
{% if not ch.available %}<p class="missing">No materials yet.</p>{% endif %}
</section>
{% endfor %}
</main>
</body>
</html>
"#;

/// Assembles the static package under `publish/` from checkpoint artifacts.
/// Never calls the generative service.
///
/// # Errors
///
/// Fails when neither `course.json` nor `syllabus.json` exists, or when a
/// store read, template render or write fails. Missing materials are not
/// errors.
pub async fn assemble_publish(
    store: &dyn CheckpointStore,
    theme: Option<&str>,
) -> Result<PublishReport, ExportError> {
    let (syllabus, dossiers) = load_course(store).await?;
    info!(
        course = %syllabus.course_title,
        chapters = syllabus.chapters.len(),
        "Assembling publish package"
    );

    let chapter_keys = store.list("chapters/").await?;
    let image_keys = store.list("infographic/").await?;
    let audio_keys = store.list("audio/").await?;
    let export_keys = store.list("exports/").await?;

    let mut writer = PackageWriter::new(store);
    let mut views = Vec::with_capacity(syllabus.chapters.len());

    for ch in &syllabus.chapters {
        let prefix = pad(ch.number);
        let mut available = Vec::new();

        let mut reading = None;
        let body_prefix = format!("chapters/{}_", prefix);
        if let Some(source) = chapter_keys
            .iter()
            .find(|key| key.starts_with(&body_prefix) && key.ends_with(".html"))
        {
            let path = format!("chapters/{}.html", prefix);
            if writer.copy(source, &path).await? {
                reading = Some(path);
                available.push("reading");
            }
        }

        let mut infographic = None;
        let image_prefix = format!("infographic/{}.", prefix);
        if let Some(source) = image_keys.iter().find(|key| {
            key.starts_with(&image_prefix)
                && extension(key).is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext))
        }) {
            let ext = extension(source).unwrap_or("png");
            let path = format!("assets/{}.{}", prefix, ext);
            if writer.copy(source, &path).await? {
                infographic = Some(path);
                available.push("infographic");
            }
        }

        let practice_quiz =
            read_optional_text(store, &keys::material(MaterialKind::PracticeQuiz, ch.number)).await?;
        if practice_quiz.is_some() {
            available.push("quiz");
        }

        let discussion: Option<Vec<DiscussionPrompt>> = read_json_lenient(
            store,
            &keys::material(MaterialKind::Discussion, ch.number),
        )
        .await?;
        if discussion.is_some() {
            available.push("discussion");
        }

        let activities: Option<Vec<Activity>> = read_json_lenient(
            store,
            &keys::material(MaterialKind::Activities, ch.number),
        )
        .await?;
        if activities.is_some() {
            available.push("activities");
        }

        let slides: Option<Vec<Slide>> = read_json_lenient(
            store,
            &keys::material(MaterialKind::Slides, ch.number),
        )
        .await?;
        if slides.is_some() {
            available.push("slides");
        }

        let in_class: Option<Vec<QuizQuestion>> = read_json_lenient(
            store,
            &keys::material(MaterialKind::InClassQuiz, ch.number),
        )
        .await?;
        if in_class.is_some() {
            available.push("inclass-quiz");
        }

        let transcript =
            read_optional_text(store, &keys::material(MaterialKind::AudioTranscript, ch.number))
                .await?;
        if transcript.is_some() {
            available.push("transcript");
        }

        let mut audio = None;
        let audio_prefix = format!("audio/{}.", prefix);
        if let Some(source) = audio_keys.iter().find(|key| {
            key.starts_with(&audio_prefix) && extension(key).is_some_and(|ext| AUDIO_EXTENSIONS.contains(&ext))
        }) {
            let ext = extension(source).unwrap_or("mp3");
            let path = format!("assets/{}_audio.{}", prefix, ext);
            if writer.copy(source, &path).await? {
                audio = Some(path);
                available.push("audio");
            }
        }

        let dossier = dossiers
            .iter()
            .find(|d| d.chapter_number == ch.number)
            .cloned();
        if dossier.as_ref().is_some_and(Dossier::has_research) {
            available.push("research");
        }

        let mut downloads = Vec::new();
        for source in export_keys.iter().filter(|key| key.starts_with(&format!("exports/{}_", prefix))) {
            let path = format!("downloads/{}", file_name(source));
            if writer.copy(source, &path).await? {
                downloads.push(DownloadLink {
                    label: download_label(source),
                    path,
                });
            }
        }

        if available.is_empty() {
            info!(chapter = ch.number, "No materials found");
        } else {
            info!(chapter = ch.number, materials = %available.join(", "), "Collected chapter");
        }

        views.push(ChapterView {
            number: ch.number,
            title: ch.title.clone(),
            narrative: ch.narrative.clone(),
            reading,
            infographic,
            practice_quiz,
            transcript,
            audio,
            discussion: discussion.unwrap_or_default(),
            activities: activities.unwrap_or_default(),
            slides: slides.unwrap_or_default(),
            in_class_questions: in_class.map(|q| q.len()).unwrap_or(0),
            dossier,
            downloads,
            available,
        });
    }

    let mut course_downloads = Vec::new();
    let syllabus_export = keys::export(None, "syllabus", "md");
    if writer.copy(&syllabus_export, "downloads/syllabus.md").await? {
        course_downloads.push(DownloadLink {
            label: download_label(&syllabus_export),
            path: "downloads/syllabus.md".to_string(),
        });
    }

    let mut context = Context::new();
    context.insert("course_title", &syllabus.course_title);
    context.insert("course_overview", &syllabus.course_overview);
    context.insert("theme", theme.unwrap_or("default"));
    context.insert("chapters", &views);
    context.insert("course_downloads", &course_downloads);
    let index = Tera::one_off(INDEX_TEMPLATE, &context, true)?;
    writer.put("index.html", index.as_bytes()).await?;

    let manifest = serde_json::to_vec_pretty(&writer.entries)?;
    store.write(&keys::publish("manifest.json"), &manifest).await?;

    info!(
        files = writer.entries.len(),
        chapters = views.len(),
        "Publish package written"
    );

    Ok(PublishReport {
        course_title: syllabus.course_title,
        chapters: views.len(),
        files: writer.entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::course::ChapterSyllabus;
    use crate::storage::{read_json, write_json, write_text, MemoryCheckpointStore};

    fn syllabus() -> Syllabus {
        let chapter = |number: u32, title: &str| ChapterSyllabus {
            number,
            title: title.to_string(),
            narrative: format!("About {}", title),
            key_concepts: Vec::new(),
            widgets: Vec::new(),
            science_annotations: Vec::new(),
            spacing_connections: Vec::new(),
        };
        Syllabus {
            course_title: "Minds & Machines".to_string(),
            course_overview: "An overview.".to_string(),
            chapters: vec![chapter(1, "Perception"), chapter(2, "Memory")],
        }
    }

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_download_label() {
        assert_eq!(download_label("exports/03_research.md"), "Research (MD)");
        assert_eq!(download_label("exports/syllabus.md"), "Syllabus (MD)");
        assert_eq!(download_label("exports/01_inclass.md"), "Quiz Versions (MD)");
    }

    #[tokio::test]
    async fn test_missing_syllabus() {
        let store = MemoryCheckpointStore::new();
        let err = assemble_publish(&store, None).await.unwrap_err();
        assert!(matches!(err, ExportError::MissingSyllabus));
    }

    #[tokio::test]
    async fn test_assembles_partial_package() {
        let store = MemoryCheckpointStore::new();
        write_json(&store, keys::SYLLABUS, &syllabus()).await.unwrap();
        write_text(&store, "chapters/01_perception.html", "<html>one</html>")
            .await
            .unwrap();
        store.write("infographic/01.png", &[0x89, b'P', b'N', b'G']).await.unwrap();
        write_text(&store, &keys::material(MaterialKind::AudioTranscript, 1), "Welcome.")
            .await
            .unwrap();
        store.write(&keys::audio_file(1, "mp3"), b"ID3").await.unwrap();
        write_json(
            &store,
            &keys::material(MaterialKind::Discussion, 1),
            &vec![DiscussionPrompt {
                prompt: "What did you see first?".to_string(),
                hook: "First glance".to_string(),
            }],
        )
        .await
        .unwrap();
        write_text(&store, "exports/01_discussion.md", "# Conversation Starters")
            .await
            .unwrap();

        let report = assemble_publish(&store, Some("ocean")).await.unwrap();
        assert_eq!(report.chapters, 2);

        let body = report.file("chapters/01.html").unwrap();
        assert_eq!(body.sha256, sha256_hex(b"<html>one</html>"));
        assert!(report.file("assets/01.png").is_some());
        assert_eq!(report.file("assets/01_audio.mp3").unwrap().bytes, 3);
        assert!(report.file("downloads/01_discussion.md").is_some());
        assert!(report.file("chapters/02.html").is_none());

        let index = read_text(&store, "publish/index.html").await.unwrap().unwrap();
        assert!(index.contains("Minds &amp; Machines"));
        assert!(index.contains("First glance"));
        assert_eq!(index.matches("<audio controls").count(), 1);
        assert!(index.contains("theme-ocean"));
        assert!(index.contains("No materials yet."));

        let manifest: Vec<serde_json::Value> = read_json(&store, "publish/manifest.json")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(manifest.len(), report.files.len());
    }

    #[tokio::test]
    async fn test_prefers_course_record() {
        let store = MemoryCheckpointStore::new();
        let mut stale = syllabus();
        stale.course_title = "Stale".to_string();
        write_json(&store, keys::SYLLABUS, &stale).await.unwrap();

        let record = CourseRecord {
            setup: crate::course::CourseSetup::new("Cognition"),
            syllabus: syllabus(),
            research_dossiers: vec![Dossier::empty(1, "none found")],
            generated_at: "2026-01-01T00:00:00Z".to_string(),
        };
        write_json(&store, keys::COURSE, &record).await.unwrap();

        let report = assemble_publish(&store, None).await.unwrap();
        assert_eq!(report.course_title, "Minds & Machines");
    }
}
