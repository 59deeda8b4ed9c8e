//! Speech synthesis for chapter audio transcripts.
//!
//! Long transcripts are split at paragraph and sentence boundaries into
//! chunks the service accepts, synthesized in order and concatenated into
//! one MP3.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::json;
use tracing::debug;

use crate::error::LlmError;

/// Default narrator voice.
pub const DEFAULT_VOICE_ID: &str = "ZF6FPAbjXT4488VcRRnw";

/// Default speech model.
pub const DEFAULT_SPEECH_MODEL: &str = "eleven_v3";

/// Longest text sent in one synthesis request.
pub const MAX_CHUNK_CHARS: usize = 2_800;

const ELEVENLABS_TTS_URL: &str = "https://api.elevenlabs.io/v1/text-to-speech";

/// Synthesized narration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedSpeech {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl GeneratedSpeech {
    /// File extension matching the MIME type.
    pub fn extension(&self) -> &'static str {
        if self.mime_type.contains("wav") {
            "wav"
        } else {
            "mp3"
        }
    }
}

/// A service that narrates a transcript.
#[async_trait]
pub trait SpeechGenerator: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<GeneratedSpeech, LlmError>;
}

/// ElevenLabs text-to-speech client.
#[derive(Debug, Clone)]
pub struct ElevenLabsClient {
    client: reqwest::Client,
    api_key: String,
    voice_id: String,
    model: String,
}

impl ElevenLabsClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            voice_id: DEFAULT_VOICE_ID.to_string(),
            model: DEFAULT_SPEECH_MODEL.to_string(),
        }
    }

    /// Creates a client from `ELEVENLABS_API_KEY`, or `None` when it is not
    /// set. `ELEVENLABS_VOICE_ID` overrides the narrator voice.
    pub fn from_env() -> Option<Self> {
        let client = std::env::var("ELEVENLABS_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .map(Self::new)?;
        match std::env::var("ELEVENLABS_VOICE_ID") {
            Ok(voice) if !voice.trim().is_empty() => Some(client.with_voice(voice)),
            _ => Some(client),
        }
    }

    /// Builder method to set the voice.
    pub fn with_voice(mut self, voice_id: impl Into<String>) -> Self {
        self.voice_id = voice_id.into();
        self
    }

    /// Builder method to set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    async fn synthesize_chunk(&self, text: &str) -> Result<Vec<u8>, LlmError> {
        let url = format!("{}/{}", ELEVENLABS_TTS_URL, self.voice_id);
        let body = json!({
            "text": text,
            "model_id": self.model,
            "voice_settings": { "stability": 0.5, "similarity_boost": 0.75 },
        });

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let code = status.as_u16();
            let message: String = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(200)
                .collect();
            if code == 429 {
                return Err(LlmError::RateLimited(message));
            }
            return Err(LlmError::ApiError { code, message });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;
        if bytes.is_empty() {
            return Err(LlmError::ParseError("speech service returned no audio".to_string()));
        }
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl SpeechGenerator for ElevenLabsClient {
    async fn synthesize(&self, text: &str) -> Result<GeneratedSpeech, LlmError> {
        let chunks = chunk_transcript(text, MAX_CHUNK_CHARS);
        if chunks.is_empty() {
            return Err(LlmError::ParseError("cannot narrate an empty transcript".to_string()));
        }

        let mut bytes = Vec::new();
        for (i, chunk) in chunks.iter().enumerate() {
            debug!(chunk = i + 1, total = chunks.len(), chars = chunk.len(), "Synthesizing speech");
            bytes.extend(self.synthesize_chunk(chunk).await?);
        }
        Ok(GeneratedSpeech {
            bytes,
            mime_type: "audio/mpeg".to_string(),
        })
    }
}

fn sentence_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^.!?]+[.!?]+\s*").ok()).as_ref()
}

fn split_sentences(paragraph: &str) -> Vec<&str> {
    let sentences: Vec<&str> = sentence_regex()
        .map(|re| re.find_iter(paragraph).map(|m| m.as_str()).collect())
        .unwrap_or_default();
    if sentences.is_empty() {
        vec![paragraph]
    } else {
        sentences
    }
}

/// Splits `text` into chunks of at most `max_chars`, breaking between
/// paragraphs first and between sentences inside an oversized paragraph.
///
/// A single sentence longer than `max_chars` stays whole.
pub fn chunk_transcript(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    let flush = |current: &mut String, chunks: &mut Vec<String>| {
        let trimmed = current.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_string());
        }
        current.clear();
    };

    for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        if !current.is_empty() && current.len() + 2 + paragraph.len() > max_chars {
            flush(&mut current, &mut chunks);
        }

        if paragraph.len() <= max_chars {
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(paragraph);
            continue;
        }

        flush(&mut current, &mut chunks);
        for sentence in split_sentences(paragraph) {
            if !current.is_empty() && current.len() + sentence.len() > max_chars {
                flush(&mut current, &mut chunks);
            }
            current.push_str(sentence);
        }
    }
    flush(&mut current, &mut chunks);
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_transcript_is_one_chunk() {
        let chunks = chunk_transcript("Welcome.\n\nToday we cover memory.", MAX_CHUNK_CHARS);
        assert_eq!(chunks, vec!["Welcome.\n\nToday we cover memory.".to_string()]);
    }

    #[test]
    fn test_paragraphs_are_packed_up_to_the_limit() {
        let text = "aaaa.\n\nbbbb.\n\ncccc.";
        let chunks = chunk_transcript(text, 12);
        assert_eq!(chunks, vec!["aaaa.\n\nbbbb.".to_string(), "cccc.".to_string()]);
    }

    #[test]
    fn test_long_paragraph_splits_on_sentences() {
        let text = "One two three. Four five six. Seven eight nine.";
        let chunks = chunk_transcript(text, 20);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0], "One two three.");
        assert!(chunks.iter().all(|c| c.len() <= 20));
    }

    #[test]
    fn test_blank_transcript_has_no_chunks() {
        assert!(chunk_transcript("  \n\n \n\n", MAX_CHUNK_CHARS).is_empty());
    }

    #[test]
    fn test_extension() {
        let speech = GeneratedSpeech {
            bytes: Vec::new(),
            mime_type: "audio/mpeg".to_string(),
        };
        assert_eq!(speech.extension(), "mp3");
    }
}
