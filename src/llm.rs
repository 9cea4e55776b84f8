//! LLM client: prompt in, text out
//!
//! Implementations:
//! - `GeminiClient`: calls the Gemini `generateContent` endpoint over HTTPS
//! - `DisabledClient`: fails every call (no API key configured)
//! - `MockClient`: returns preconfigured responses (testing)
//!
//! The knowledge base calls the model for three things: framework
//! extraction from PDF text, intent classification and answer generation.

use crate::config::LlmSettings;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

/// Errors from LLM client operations.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("LLM not available: {0}")]
    Unavailable(String),
    #[error("invocation failed: {0}")]
    InvocationFailed(String),
    #[error("response parse error: {0}")]
    ParseError(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Client trait for single-turn completions.
///
/// Calls are never retried; callers fall back deterministically.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Gemini over the public REST API.
pub struct GeminiClient {
    client: Client,
    settings: LlmSettings,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

impl GeminiClient {
    pub fn new(settings: &LlmSettings) -> Result<Self, LlmError> {
        if settings.api_key.as_deref().map_or(true, str::is_empty) {
            return Err(LlmError::Unavailable("GEMINI_API_KEY is not set".to_string()));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            settings: settings.clone(),
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.settings.endpoint.trim_end_matches('/'),
            self.settings.model
        )
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let api_key = self.settings.api_key.as_deref().unwrap_or_default();
        let request = GenerateRequest {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: self.settings.temperature,
            },
        };

        debug!(model = %self.settings.model, prompt_chars = prompt.len(), "calling Gemini");
        let resp = self
            .client
            .post(self.url())
            .header("x-goog-api-key", api_key)
            .json(&request)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::InvocationFailed(format!("Gemini returned {status}: {body}")));
        }

        let parsed: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::ParseError(e.to_string()))?;

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(LlmError::ParseError("Gemini returned no text".to_string()));
        }
        Ok(text)
    }
}

/// Stand-in when no model is configured. Every call fails with `reason`,
/// so callers take their deterministic fallbacks.
pub struct DisabledClient {
    reason: String,
}

impl DisabledClient {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

#[async_trait]
impl LlmClient for DisabledClient {
    async fn complete(&self, _prompt: &str) -> Result<String, LlmError> {
        Err(LlmError::Unavailable(self.reason.clone()))
    }
}

/// Mock client for testing. Returns preconfigured responses.
///
/// Responses are matched by prompt substring, first registration wins.
/// Unmatched prompts get the default response, or an error when none is set.
pub struct MockClient {
    available: bool,
    responses: Vec<(String, Result<String, String>)>,
    default: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl MockClient {
    /// Create a mock client that reports as available.
    pub fn available() -> Self {
        Self {
            available: true,
            responses: Vec::new(),
            default: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock client whose every call fails.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::available()
        }
    }

    /// Register a response for prompts containing `needle`.
    pub fn with_response(mut self, needle: impl Into<String>, response: impl Into<String>) -> Self {
        self.responses.push((needle.into(), Ok(response.into())));
        self
    }

    /// Register a failure for prompts containing `needle`.
    pub fn with_failure(mut self, needle: impl Into<String>, message: impl Into<String>) -> Self {
        self.responses.push((needle.into(), Err(message.into())));
        self
    }

    pub fn with_default(mut self, response: impl Into<String>) -> Self {
        self.default = Some(response.into());
        self
    }

    /// Every prompt received so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for MockClient {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        if !self.available {
            return Err(LlmError::Unavailable(
                "mock client configured as unavailable".to_string(),
            ));
        }

        let matched = self
            .responses
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map(|(_, response)| response);

        match (matched, &self.default) {
            (Some(Ok(response)), _) => Ok(response.clone()),
            (Some(Err(message)), _) => Err(LlmError::InvocationFailed(message.clone())),
            (None, Some(default)) => Ok(default.clone()),
            (None, None) => Err(LlmError::InvocationFailed(
                "no mock response for prompt".to_string(),
            )),
        }
    }
}

/// Extract a JSON object from model output.
///
/// Models sometimes wrap JSON in markdown code fences or add explanation
/// text. Tries, in order:
/// 1. Direct parse (response is pure JSON)
/// 2. Extract from a ```json ... ``` or ``` ... ``` fenced block
/// 3. Find the first `{` to last `}` span and parse that
pub fn extract_json(text: &str) -> Option<serde_json::Value> {
    let trimmed = text.trim();

    if let Ok(v) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if v.is_object() {
            return Some(v);
        }
    }

    let fenced = if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        after.find("```").map(|end| &after[..end])
    } else if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        after.find("```").map(|end| &after[..end])
    } else {
        None
    };

    if let Some(block) = fenced {
        if let Ok(v) = serde_json::from_str::<serde_json::Value>(block.trim()) {
            if v.is_object() {
                return Some(v);
            }
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            if let Ok(v) = serde_json::from_str::<serde_json::Value>(&trimmed[start..=end]) {
                if v.is_object() {
                    return Some(v);
                }
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_matches_by_prompt_substring() {
        let client = MockClient::available()
            .with_response("CIS Controls", "{\"controls\": []}")
            .with_failure("Question:", "quota exceeded")
            .with_default("fallback");

        assert_eq!(
            client.complete("Extract CIS Controls information").await.unwrap(),
            "{\"controls\": []}"
        );
        assert!(matches!(
            client.complete("Question: what is T1055?").await,
            Err(LlmError::InvocationFailed(_))
        ));
        assert_eq!(client.complete("anything else").await.unwrap(), "fallback");
        assert_eq!(client.prompts().len(), 3);
    }

    #[tokio::test]
    async fn unavailable_mock_always_fails() {
        let client = MockClient::unavailable().with_default("never");
        assert!(matches!(client.complete("x").await, Err(LlmError::Unavailable(_))));
    }

    #[test]
    fn gemini_requires_api_key() {
        let settings = LlmSettings {
            api_key: None,
            ..LlmSettings::default()
        };
        assert!(matches!(GeminiClient::new(&settings), Err(LlmError::Unavailable(_))));
    }

    #[test]
    fn gemini_url_targets_generate_content() {
        let settings = LlmSettings {
            api_key: Some("test-key".into()),
            endpoint: "https://generativelanguage.googleapis.com/v1beta/".into(),
            model: "gemini-test".into(),
            ..LlmSettings::default()
        };
        let client = GeminiClient::new(&settings).unwrap();
        assert_eq!(
            client.url(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-test:generateContent"
        );
    }

    #[test]
    fn extract_json_handles_fences_and_prose() {
        assert!(extract_json("{\"a\": 1}").is_some());
        assert!(extract_json("```json\n{\"a\": 1}\n```").is_some());
        assert!(extract_json("```\n{\"a\": 1}\n```").is_some());
        assert!(extract_json("Here you go: {\"a\": 1} hope that helps").is_some());
        assert!(extract_json("[1, 2]").is_none());
        assert!(extract_json("no json here").is_none());
    }
}
