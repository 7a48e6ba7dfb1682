//! Wire payloads exchanged with the provider HTTP APIs.
//!
//! Chat request bodies are assembled as JSON in [`crate::core::engine`]
//! because their shape depends on the model; the response-side structures
//! that are read field-by-field live here.

pub mod images;
pub mod models;

use serde::Deserialize;

use crate::core::usage::TokenUsage;

#[derive(Debug, Deserialize)]
pub struct OpenAiCompletionDetails {
    #[serde(default)]
    pub reasoning_tokens: Option<u64>,
}

/// `usage` object of an OpenAI chat completion or final stream frame.
#[derive(Debug, Deserialize)]
pub struct OpenAiUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: Option<u64>,
    #[serde(default)]
    pub completion_tokens_details: Option<OpenAiCompletionDetails>,
}

impl From<OpenAiUsage> for TokenUsage {
    fn from(usage: OpenAiUsage) -> Self {
        let reasoning = usage
            .completion_tokens_details
            .and_then(|details| details.reasoning_tokens);
        TokenUsage::new(
            usage.prompt_tokens,
            usage.completion_tokens,
            reasoning,
            usage.total_tokens,
        )
    }
}

/// `usageMetadata` object of a Gemini response or stream frame.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiUsageMetadata {
    #[serde(default)]
    pub prompt_token_count: u64,
    #[serde(default)]
    pub candidates_token_count: u64,
    #[serde(default)]
    pub cached_content_token_count: Option<u64>,
    #[serde(default)]
    pub total_token_count: Option<u64>,
}

impl From<GeminiUsageMetadata> for TokenUsage {
    fn from(usage: GeminiUsageMetadata) -> Self {
        TokenUsage::new(
            usage.prompt_token_count,
            usage.candidates_token_count,
            usage.cached_content_token_count,
            usage.total_token_count,
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct OpenAiModel {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct OpenAiModelsResponse {
    #[serde(default)]
    pub data: Vec<OpenAiModel>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiModel {
    pub name: String,
    #[serde(default)]
    pub supported_generation_methods: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct GeminiModelsResponse {
    #[serde(default)]
    pub models: Vec<GeminiModel>,
}

#[derive(Debug, Deserialize)]
pub struct GeneratedImage {
    #[serde(default)]
    pub b64_json: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ImagesResponse {
    #[serde(default)]
    pub data: Vec<GeneratedImage>,
}
