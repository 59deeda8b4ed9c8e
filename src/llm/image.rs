//! Image generation for chapter infographics.

use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;

use crate::error::LlmError;

/// Default image model.
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-3-pro-image-preview";

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// A generated image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl GeneratedImage {
    /// File extension matching the MIME type.
    pub fn extension(&self) -> &'static str {
        if self.mime_type.contains("png") {
            "png"
        } else {
            "jpg"
        }
    }
}

/// A service that renders an image from a text prompt.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate_image(&self, prompt: &str) -> Result<GeneratedImage, LlmError>;
}

/// Gemini image generation client.
#[derive(Debug, Clone)]
pub struct GeminiImageClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiImageClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: DEFAULT_IMAGE_MODEL.to_string(),
        }
    }

    /// Creates a client from `GEMINI_API_KEY`, or `None` when it is not set.
    pub fn from_env() -> Option<Self> {
        std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .map(Self::new)
    }

    /// Builder method to set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    error: Option<GeminiError>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    inline_data: Option<InlineData>,
    #[serde(default)]
    thought: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
}

fn decode_image(response: GeminiResponse) -> Result<GeneratedImage, LlmError> {
    if let Some(error) = response.error {
        return Err(LlmError::ParseError(format!("Gemini error: {}", error.message)));
    }

    let inline = response
        .candidates
        .into_iter()
        .filter_map(|candidate| candidate.content)
        .flat_map(|content| content.parts)
        .filter(|part| !part.thought)
        .find_map(|part| part.inline_data)
        .ok_or_else(|| LlmError::ParseError("Gemini returned no image data".to_string()))?;

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(inline.data.as_bytes())
        .map_err(|e| LlmError::ParseError(format!("invalid base64 image data: {}", e)))?;

    Ok(GeneratedImage {
        bytes,
        mime_type: inline.mime_type,
    })
}

#[async_trait]
impl ImageGenerator for GeminiImageClient {
    async fn generate_image(&self, prompt: &str) -> Result<GeneratedImage, LlmError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            GEMINI_API_BASE, self.model, self.api_key
        );
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": { "responseModalities": ["TEXT", "IMAGE"] },
        });

        let response = self
            .client
            .post(&url)
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

        let parsed: GeminiResponse = response
            .json()
            .await
            .map_err(|e| LlmError::ParseError(e.to_string()))?;
        decode_image(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_skips_thought_parts() {
        let response: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {
                    "parts": [
                        { "text": "planning", "thought": true,
                          "inlineData": { "mimeType": "image/png", "data": "AAAA" } },
                        { "text": "here it is" },
                        { "inlineData": { "mimeType": "image/png", "data": "aGVsbG8=" } }
                    ]
                }
            }]
        }))
        .unwrap();

        let image = decode_image(response).unwrap();
        assert_eq!(image.bytes, b"hello");
        assert_eq!(image.extension(), "png");
    }

    #[test]
    fn test_decode_reports_missing_image() {
        let response: GeminiResponse =
            serde_json::from_value(json!({ "candidates": [{ "content": { "parts": [{ "text": "no" }] } }] }))
                .unwrap();
        assert!(matches!(decode_image(response), Err(LlmError::ParseError(_))));
    }

    #[test]
    fn test_decode_reports_api_error() {
        let response: GeminiResponse =
            serde_json::from_value(json!({ "error": { "message": "quota" } })).unwrap();
        let err = decode_image(response).unwrap_err();
        assert!(err.to_string().contains("quota"));
    }

    #[test]
    fn test_extension_for_jpeg() {
        let image = GeneratedImage {
            bytes: Vec::new(),
            mime_type: "image/jpeg".to_string(),
        };
        assert_eq!(image.extension(), "jpg");
    }
}
