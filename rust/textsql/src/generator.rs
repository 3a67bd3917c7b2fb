//! Natural language to SQL through the Gemini `generateContent` API.

use crate::config::GenerationConfig;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

const FENCE: &str = "```";
const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("GEMINI_API_KEY is not configured")]
    MissingApiKey,

    #[error("request to generation provider failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("generation provider returned {status}: {body}")]
    Provider { status: StatusCode, body: String },

    #[error("generation provider returned no text")]
    EmptyResponse,
}

/// Produces SQL text from a natural-language request.
#[async_trait]
pub trait SqlGenerator: Send + Sync {
    async fn generate(&self, request: &str) -> Result<String, GenerationError>;
}

pub fn build_prompt(request: &str) -> String {
    format!(
        "Convert the following natural language request into a SQL query for PostgreSQL.\n\
         Return ONLY the SQL query without any explanations, comments, or additional text.\n\
         Do not include markdown formatting or code blocks.\n\
         Make sure the query is compatible with PostgreSQL syntax.\n\
         \n\
         Request: {request}\n\
         \n\
         SQL Query:\n"
    )
}

/// Strips code fences the model adds despite being told not to.
///
/// Only applies when the trimmed text opens with a fence; then every line
/// whose trimmed form starts with a fence marker is dropped and the rest
/// is re-trimmed.
pub fn clean_generated_sql(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with(FENCE) {
        return trimmed.to_string();
    }

    trimmed
        .split('\n')
        .filter(|line| !line.trim().starts_with(FENCE))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

impl GenerateContentResponse {
    fn into_text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let text: String = content
            .parts
            .into_iter()
            .filter_map(|part| part.text)
            .collect();
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

#[derive(Clone)]
pub struct GeminiGenerator {
    client: Client,
    config: GenerationConfig,
}

impl GeminiGenerator {
    pub fn new(config: GenerationConfig) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }
}

#[async_trait]
impl SqlGenerator for GeminiGenerator {
    async fn generate(&self, request: &str) -> Result<String, GenerationError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(GenerationError::MissingApiKey)?;

        debug!(model = %self.config.model, "requesting SQL generation");
        let response = self
            .client
            .post(self.endpoint())
            .header(API_KEY_HEADER, api_key)
            .json(&json!({
                "contents": [
                    { "parts": [ { "text": build_prompt(request) } ] }
                ]
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Provider { status, body });
        }

        let body: GenerateContentResponse = response.json().await?;
        let text = body.into_text().ok_or(GenerationError::EmptyResponse)?;
        Ok(clean_generated_sql(&text))
    }
}
