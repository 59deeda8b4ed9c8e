//! Pipeline configuration for the course orchestrator.
//!
//! This module provides configuration options for the course pipeline,
//! including per-stage concurrency limits, the rate-limit retry policy,
//! model selection and per-call output limits.

use std::time::Duration;
use thiserror::Error;

use crate::llm::{Backoff, RetryPolicy};
use crate::quiz::DEFAULT_VERSION_COUNT;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// IO error while reading configuration.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Model used for syllabus, chapter bodies, quizzes and infographic prompts.
pub const DEFAULT_HEAVY_MODEL: &str = "claude-opus-4-6";
/// Model used for research and the light materials.
pub const DEFAULT_STANDARD_MODEL: &str = "claude-sonnet-4-5-20250929";
/// Model used for quiz distractor rebalancing.
pub const DEFAULT_FAST_MODEL: &str = "claude-haiku-4-5-20251001";

/// Answer-token limits per call type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLimits {
    pub syllabus: u32,
    pub research: u32,
    pub chapter: u32,
    pub quiz: u32,
    pub audio: u32,
    /// Discussion, activities and slides.
    pub light: u32,
    pub infographic: u32,
}

impl Default for OutputLimits {
    fn default() -> Self {
        Self {
            syllabus: 16_000,
            research: 16_000,
            chapter: 16_000,
            quiz: 8_000,
            audio: 8_000,
            light: 4_000,
            infographic: 2_000,
        }
    }
}

/// Configuration for the course pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    // Concurrency
    /// Chapters researched concurrently.
    pub research_concurrency: usize,
    /// Concurrent quiz generations per chapter.
    pub heavy_concurrency: usize,
    /// Concurrent light materials per chapter.
    pub light_concurrency: usize,
    /// Chapters whose body and materials are generated concurrently.
    pub body_concurrency: usize,

    // Service
    /// Retry policy for rate-limited calls.
    pub retry: RetryPolicy,
    pub heavy_model: String,
    pub standard_model: String,
    pub fast_model: String,
    pub limits: OutputLimits,
    /// Maximum web searches per research call. `None` leaves it to the service.
    pub max_searches: Option<u32>,

    // Materials
    /// Printable versions generated per in-class quiz.
    pub quiz_versions: usize,
    /// Whether cited DOIs are checked against the handle API.
    pub validate_dois: bool,
    /// Theme used when the course setup does not name one.
    pub theme: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            research_concurrency: 3,
            heavy_concurrency: 2,
            light_concurrency: 5,
            body_concurrency: 1,

            retry: RetryPolicy::default(),
            heavy_model: DEFAULT_HEAVY_MODEL.to_string(),
            standard_model: DEFAULT_STANDARD_MODEL.to_string(),
            fast_model: DEFAULT_FAST_MODEL.to_string(),
            limits: OutputLimits::default(),
            max_searches: None,

            quiz_versions: DEFAULT_VERSION_COUNT,
            validate_dois: true,
            theme: None,
        }
    }
}

impl PipelineConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `COURSE_RESEARCH_CONCURRENCY`: Concurrent research calls (default: 3)
    /// - `COURSE_HEAVY_CONCURRENCY`: Concurrent quiz calls per chapter (default: 2)
    /// - `COURSE_LIGHT_CONCURRENCY`: Concurrent light materials per chapter (default: 5)
    /// - `COURSE_BODY_CONCURRENCY`: Concurrent chapters (default: 1)
    /// - `COURSE_MAX_RETRIES`: Retries for rate-limited calls (default: 3)
    /// - `COURSE_RETRY_BASE_DELAY_MS`: Base retry delay (default: 1500)
    /// - `COURSE_RETRY_BACKOFF`: `linear` or `exponential` (default: linear)
    /// - `COURSE_HEAVY_MODEL`, `COURSE_STANDARD_MODEL`, `COURSE_FAST_MODEL`: Model ids
    /// - `COURSE_MAX_SEARCHES`: Web searches per research call
    /// - `COURSE_QUIZ_VERSIONS`: Printable quiz versions (default: 5)
    /// - `COURSE_VALIDATE_DOIS`: Check cited DOIs (default: true)
    /// - `COURSE_THEME`: Fallback theme id
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("COURSE_RESEARCH_CONCURRENCY") {
            config.research_concurrency = parse_env_value(&val, "COURSE_RESEARCH_CONCURRENCY")?;
        }

        if let Ok(val) = std::env::var("COURSE_HEAVY_CONCURRENCY") {
            config.heavy_concurrency = parse_env_value(&val, "COURSE_HEAVY_CONCURRENCY")?;
        }

        if let Ok(val) = std::env::var("COURSE_LIGHT_CONCURRENCY") {
            config.light_concurrency = parse_env_value(&val, "COURSE_LIGHT_CONCURRENCY")?;
        }

        if let Ok(val) = std::env::var("COURSE_BODY_CONCURRENCY") {
            config.body_concurrency = parse_env_value(&val, "COURSE_BODY_CONCURRENCY")?;
        }

        // Retry policy
        if let Ok(val) = std::env::var("COURSE_MAX_RETRIES") {
            config.retry.max_retries = parse_env_value(&val, "COURSE_MAX_RETRIES")?;
        }

        if let Ok(val) = std::env::var("COURSE_RETRY_BASE_DELAY_MS") {
            let millis: u64 = parse_env_value(&val, "COURSE_RETRY_BASE_DELAY_MS")?;
            config.retry.base_delay = Duration::from_millis(millis);
        }

        if let Ok(val) = std::env::var("COURSE_RETRY_BACKOFF") {
            config.retry.backoff = parse_backoff(&val, "COURSE_RETRY_BACKOFF")?;
        }

        // Models
        if let Ok(val) = std::env::var("COURSE_HEAVY_MODEL") {
            config.heavy_model = val;
        }

        if let Ok(val) = std::env::var("COURSE_STANDARD_MODEL") {
            config.standard_model = val;
        }

        if let Ok(val) = std::env::var("COURSE_FAST_MODEL") {
            config.fast_model = val;
        }

        if let Ok(val) = std::env::var("COURSE_MAX_SEARCHES") {
            config.max_searches = Some(parse_env_value(&val, "COURSE_MAX_SEARCHES")?);
        }

        // Materials
        if let Ok(val) = std::env::var("COURSE_QUIZ_VERSIONS") {
            config.quiz_versions = parse_env_value(&val, "COURSE_QUIZ_VERSIONS")?;
        }

        if let Ok(val) = std::env::var("COURSE_VALIDATE_DOIS") {
            config.validate_dois = parse_env_bool(&val, "COURSE_VALIDATE_DOIS")?;
        }

        if let Ok(val) = std::env::var("COURSE_THEME") {
            if !val.trim().is_empty() {
                config.theme = Some(val);
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let limits = [
            ("research_concurrency", self.research_concurrency),
            ("heavy_concurrency", self.heavy_concurrency),
            ("light_concurrency", self.light_concurrency),
            ("body_concurrency", self.body_concurrency),
        ];
        for (name, value) in limits {
            if value == 0 {
                return Err(ConfigError::ValidationFailed(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }

        let models = [
            ("heavy_model", &self.heavy_model),
            ("standard_model", &self.standard_model),
            ("fast_model", &self.fast_model),
        ];
        for (name, model) in models {
            if model.trim().is_empty() {
                return Err(ConfigError::ValidationFailed(format!("{} cannot be empty", name)));
            }
        }

        if self.quiz_versions == 0 {
            return Err(ConfigError::ValidationFailed(
                "quiz_versions must be greater than 0".to_string(),
            ));
        }

        if self.limits.syllabus == 0 || self.limits.chapter == 0 {
            return Err(ConfigError::ValidationFailed(
                "output limits must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Builder method to set research concurrency.
    pub fn with_research_concurrency(mut self, limit: usize) -> Self {
        self.research_concurrency = limit;
        self
    }

    /// Builder method to set heavy-material concurrency.
    pub fn with_heavy_concurrency(mut self, limit: usize) -> Self {
        self.heavy_concurrency = limit;
        self
    }

    /// Builder method to set light-material concurrency.
    pub fn with_light_concurrency(mut self, limit: usize) -> Self {
        self.light_concurrency = limit;
        self
    }

    /// Builder method to set chapter concurrency.
    pub fn with_body_concurrency(mut self, limit: usize) -> Self {
        self.body_concurrency = limit;
        self
    }

    /// Builder method to set the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Builder method to set the heavy model.
    pub fn with_heavy_model(mut self, model: impl Into<String>) -> Self {
        self.heavy_model = model.into();
        self
    }

    /// Builder method to set the standard model.
    pub fn with_standard_model(mut self, model: impl Into<String>) -> Self {
        self.standard_model = model.into();
        self
    }

    /// Builder method to set the number of quiz versions.
    pub fn with_quiz_versions(mut self, count: usize) -> Self {
        self.quiz_versions = count;
        self
    }

    /// Builder method to enable or disable DOI validation.
    pub fn with_doi_validation(mut self, enabled: bool) -> Self {
        self.validate_dois = enabled;
        self
    }

    /// Builder method to set the fallback theme.
    pub fn with_theme(mut self, theme: impl Into<String>) -> Self {
        self.theme = Some(theme.into());
        self
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

/// Parse an environment variable as a boolean.
fn parse_env_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean value, got '{}'", value),
        }),
    }
}

fn parse_backoff(value: &str, key: &str) -> Result<Backoff, ConfigError> {
    match value.to_lowercase().as_str() {
        "linear" => Ok(Backoff::Linear),
        "exponential" => Ok(Backoff::Exponential),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected 'linear' or 'exponential', got '{}'", value),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.research_concurrency, 3);
        assert_eq!(config.heavy_concurrency, 2);
        assert_eq!(config.light_concurrency, 5);
        assert_eq!(config.body_concurrency, 1);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.base_delay, Duration::from_millis(1_500));
        assert_eq!(config.retry.backoff, Backoff::Linear);
        assert_eq!(config.quiz_versions, 5);
        assert!(config.validate_dois);
        assert_eq!(config.limits.infographic, 2_000);
    }

    #[test]
    fn test_config_builder() {
        let config = PipelineConfig::new()
            .with_research_concurrency(6)
            .with_heavy_concurrency(1)
            .with_light_concurrency(2)
            .with_body_concurrency(2)
            .with_heavy_model("big")
            .with_standard_model("medium")
            .with_quiz_versions(3)
            .with_doi_validation(false)
            .with_theme("ocean");

        assert_eq!(config.research_concurrency, 6);
        assert_eq!(config.heavy_concurrency, 1);
        assert_eq!(config.light_concurrency, 2);
        assert_eq!(config.body_concurrency, 2);
        assert_eq!(config.heavy_model, "big");
        assert_eq!(config.standard_model, "medium");
        assert_eq!(config.quiz_versions, 3);
        assert!(!config.validate_dois);
        assert_eq!(config.theme.as_deref(), Some("ocean"));
    }

    #[test]
    fn test_validation_valid_config() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validation_zero_concurrency() {
        let result = PipelineConfig::default().with_light_concurrency(0).validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("light_concurrency"));

        let result = PipelineConfig::default().with_research_concurrency(0).validate();
        assert!(result.unwrap_err().to_string().contains("research_concurrency"));
    }

    #[test]
    fn test_validation_empty_model() {
        let result = PipelineConfig::default().with_heavy_model(" ").validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("heavy_model"));
    }

    #[test]
    fn test_validation_zero_versions() {
        let result = PipelineConfig::default().with_quiz_versions(0).validate();
        assert!(result.unwrap_err().to_string().contains("quiz_versions"));
    }

    #[test]
    fn test_parse_env_bool() {
        assert!(parse_env_bool("true", "test").unwrap());
        assert!(parse_env_bool("1", "test").unwrap());
        assert!(parse_env_bool("YES", "test").unwrap());
        assert!(!parse_env_bool("off", "test").unwrap());
        assert!(parse_env_bool("maybe", "test").is_err());
    }

    #[test]
    fn test_parse_backoff() {
        assert_eq!(parse_backoff("Linear", "k").unwrap(), Backoff::Linear);
        assert_eq!(parse_backoff("exponential", "k").unwrap(), Backoff::Exponential);
        assert!(parse_backoff("cubic", "k").is_err());
    }

    #[test]
    fn test_parse_env_value() {
        let n: usize = parse_env_value(" 4 ", "k").unwrap();
        assert_eq!(n, 4);
        let err = parse_env_value::<usize>("four", "COURSE_X").unwrap_err();
        assert!(err.to_string().contains("COURSE_X"));
    }
}
