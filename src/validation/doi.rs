//! DOI validation against the doi.org handle API.

use std::collections::HashMap;
use std::sync::OnceLock;

use async_trait::async_trait;
use futures::future::join_all;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::error::ValidationError;

/// Default handle API endpoint.
pub const DOI_HANDLE_API: &str = "https://doi.org/api/handles/";

/// Checks whether external identifiers resolve.
///
/// Callers treat any error as "validation unavailable" and keep their data.
#[async_trait]
pub trait IdentifierValidator: Send + Sync {
    /// Maps every distinct id in `ids` to its validity.
    async fn validate(&self, ids: &[String]) -> Result<HashMap<String, bool>, ValidationError>;
}

fn prefix_regex() -> Option<&'static Regex> {
    static PREFIX: OnceLock<Option<Regex>> = OnceLock::new();
    PREFIX
        .get_or_init(|| Regex::new(r"(?i)^(?:https?://(?:dx\.)?doi\.org/|doi:\s*)").ok())
        .as_ref()
}

/// Strips URL and `doi:` prefixes and trailing citation punctuation.
pub fn normalize_doi(doi: &str) -> String {
    let trimmed = doi.trim();
    let stripped = match prefix_regex() {
        Some(re) => re.replace(trimmed, "").into_owned(),
        None => trimmed.to_string(),
    };
    stripped.trim_end_matches(['.', ',', ';']).to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HandleResponse {
    response_code: i64,
}

/// Validates DOIs by resolving them through the handle API.
#[derive(Debug, Clone)]
pub struct DoiValidator {
    client: reqwest::Client,
    base_url: String,
}

impl Default for DoiValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl DoiValidator {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: DOI_HANDLE_API.to_string(),
        }
    }

    /// Builder method to point at another handle endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Resolves one DOI. A network failure counts as valid.
    async fn check(&self, doi: &str) -> bool {
        let normalized = normalize_doi(doi);
        if normalized.is_empty() || !normalized.contains('/') {
            return false;
        }

        let url = format!("{}{}", self.base_url, normalized);
        let response = match self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                debug!(doi = %normalized, error = %e, "DOI lookup failed, keeping it");
                return true;
            }
        };

        if !response.status().is_success() {
            return false;
        }
        match response.json::<HandleResponse>().await {
            Ok(body) => body.response_code == 1,
            Err(_) => false,
        }
    }
}

#[async_trait]
impl IdentifierValidator for DoiValidator {
    async fn validate(&self, ids: &[String]) -> Result<HashMap<String, bool>, ValidationError> {
        let mut unique: Vec<&String> = ids.iter().filter(|id| !id.trim().is_empty()).collect();
        unique.sort();
        unique.dedup();

        let checks = unique.iter().map(|id| async move { ((*id).clone(), self.check(id).await) });
        Ok(join_all(checks).await.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_doi() {
        assert_eq!(normalize_doi("https://doi.org/10.1000/xyz123"), "10.1000/xyz123");
        assert_eq!(normalize_doi("http://dx.doi.org/10.1000/abc."), "10.1000/abc");
        assert_eq!(normalize_doi("DOI: 10.1037/a0012345;"), "10.1037/a0012345");
        assert_eq!(normalize_doi("  10.1/x,. "), "10.1/x");
    }

    #[tokio::test]
    async fn test_malformed_doi_is_invalid_without_lookup() {
        let validator = DoiValidator::new().with_base_url("http://127.0.0.1:9/");
        let result = validator
            .validate(&["not-a-doi".to_string(), "".to_string()])
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.get("not-a-doi"), Some(&false));
    }
}
