//! Gemini `generateContent` client.

use std::time::Duration;

use log::debug;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::error::CommentaryError;

pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-preview-05-20";
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Clone)]
pub struct GeminiConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: api_key.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Reads the key from `GEMINI_API_KEY`. `None` when unset or empty.
    pub fn from_env() -> Option<Self> {
        std::env::var(API_KEY_ENV)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .map(Self::new)
    }

    pub fn generate_url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.endpoint.trim_end_matches('/'),
            self.model
        )
    }
}

/// Something that turns a prompt into text. `Ok(None)` means the service
/// answered but produced no candidate.
pub trait TextGenerator: Send {
    fn generate(&self, prompt: &str) -> Result<Option<String>, CommentaryError>;
}

#[derive(Debug, Serialize)]
pub struct GenerateRequest<'a> {
    pub contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
pub struct Content<'a> {
    pub role: &'a str,
    pub parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
pub struct Part<'a> {
    pub text: &'a str,
}

pub fn request_body(prompt: &str) -> GenerateRequest<'_> {
    GenerateRequest {
        contents: vec![Content {
            role: "user",
            parts: vec![Part { text: prompt }],
        }],
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// Extracts `candidates[0].content.parts[0].text`.
pub fn parse_generate_response(body: &str) -> Result<Option<String>, CommentaryError> {
    let resp: GenerateResponse = serde_json::from_str(body)?;
    Ok(resp
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .and_then(|c| c.parts.into_iter().next())
        .and_then(|p| p.text))
}

pub struct GeminiClient {
    http: Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self, CommentaryError> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }
}

impl TextGenerator for GeminiClient {
    fn generate(&self, prompt: &str) -> Result<Option<String>, CommentaryError> {
        let url = self.config.generate_url();
        debug!("POST {url} ({} prompt bytes)", prompt.len());
        let res = self
            .http
            .post(&url)
            .query(&[("key", self.config.api_key.as_str())])
            .json(&request_body(prompt))
            .send()?;
        let status = res.status();
        if !status.is_success() {
            return Err(CommentaryError::Status(status.as_u16()));
        }
        let body = res.text()?;
        parse_generate_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_has_single_user_turn() {
        let body = serde_json::to_value(request_body("hello")).unwrap();
        assert_eq!(
            body,
            json!({ "contents": [{ "role": "user", "parts": [{ "text": "hello" }] }] })
        );
    }

    #[test]
    fn first_candidate_text_is_returned() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"a"},{"text":"b"}]}},{"content":{"parts":[{"text":"c"}]}}]}"#;
        assert_eq!(parse_generate_response(body).unwrap().as_deref(), Some("a"));
    }

    #[test]
    fn missing_candidates_yield_none() {
        assert_eq!(parse_generate_response("{}").unwrap(), None);
        assert_eq!(parse_generate_response(r#"{"candidates":[]}"#).unwrap(), None);
        assert_eq!(
            parse_generate_response(r#"{"candidates":[{"finishReason":"SAFETY"}]}"#).unwrap(),
            None
        );
        assert!(parse_generate_response("<html>").is_err());
    }

    #[test]
    fn url_does_not_carry_the_key() {
        let cfg = GeminiConfig {
            endpoint: "http://localhost:1/v1beta/".to_string(),
            ..GeminiConfig::new("secret")
        };
        assert_eq!(
            cfg.generate_url(),
            "http://localhost:1/v1beta/models/gemini-2.5-flash-preview-05-20:generateContent"
        );
        assert!(!format!("{cfg:?}").contains("secret"));
    }
}
