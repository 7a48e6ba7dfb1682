use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::api::{GeminiModel, GeminiModelsResponse, OpenAiModel, OpenAiModelsResponse};
use crate::utils::url::construct_api_url;

/// What a listed model is wanted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelTask {
    #[default]
    Chat,
    Image,
}

impl fmt::Display for ModelTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelTask::Chat => f.write_str("chat"),
            ModelTask::Image => f.write_str("image"),
        }
    }
}

impl FromStr for ModelTask {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chat" => Ok(ModelTask::Chat),
            "image" => Ok(ModelTask::Image),
            other => Err(format!("Unknown model task '{other}'. Expected 'chat' or 'image'.")),
        }
    }
}

async fn get_json<T: serde::de::DeserializeOwned>(
    request: reqwest::RequestBuilder,
) -> Result<T, Box<dyn std::error::Error>> {
    let response = request.send().await?;

    if !response.status().is_success() {
        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(format!("API request failed with status {status}: {error_text}").into());
    }

    Ok(response.json::<T>().await?)
}

pub async fn fetch_openai_models(
    client: &reqwest::Client,
    base_url: &str,
    api_key: &str,
    timeout: Duration,
) -> Result<OpenAiModelsResponse, Box<dyn std::error::Error>> {
    let request = client
        .get(construct_api_url(base_url, "models"))
        .header("Authorization", format!("Bearer {api_key}"))
        .timeout(timeout);
    get_json(request).await
}

pub async fn fetch_gemini_models(
    client: &reqwest::Client,
    base_url: &str,
    api_key: &str,
    timeout: Duration,
) -> Result<GeminiModelsResponse, Box<dyn std::error::Error>> {
    let request = client
        .get(construct_api_url(base_url, "models"))
        .query(&[("key", api_key)])
        .timeout(timeout);
    get_json(request).await
}

/// Chat models are the `gpt*` family; image models are `dall-e*` or
/// anything mentioning `image`.
pub fn filter_openai_models(models: &[OpenAiModel], task: ModelTask) -> Vec<String> {
    let mut ids: Vec<String> = models
        .iter()
        .map(|model| model.id.as_str())
        .filter(|id| match task {
            ModelTask::Chat => id.starts_with("gpt"),
            ModelTask::Image => id.starts_with("dall-e") || id.contains("image"),
        })
        .map(str::to_owned)
        .collect();
    ids.sort();
    ids
}

/// Gemini only lists models that support `generateContent`, with the
/// `models/` prefix removed. Gemini has no image task, so `task` is ignored.
pub fn filter_gemini_models(models: &[GeminiModel]) -> Vec<String> {
    let mut names: Vec<String> = models
        .iter()
        .filter(|model| {
            model
                .supported_generation_methods
                .iter()
                .any(|method| method == "generateContent")
        })
        .map(|model| model.name.replace("models/", ""))
        .collect();
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    fn openai(ids: &[&str]) -> Vec<OpenAiModel> {
        ids.iter()
            .map(|id| OpenAiModel { id: id.to_string() })
            .collect()
    }

    #[test]
    fn openai_chat_models_are_gpt_only_and_sorted() {
        let models = openai(&["whisper-1", "gpt-4o", "dall-e-3", "gpt-3.5-turbo", "gpt-image-1"]);
        assert_eq!(
            filter_openai_models(&models, ModelTask::Chat),
            vec!["gpt-3.5-turbo", "gpt-4o", "gpt-image-1"]
        );
    }

    #[test]
    fn openai_image_models() {
        let models = openai(&["gpt-4o", "dall-e-3", "dall-e-2", "gpt-image-1"]);
        assert_eq!(
            filter_openai_models(&models, ModelTask::Image),
            vec!["dall-e-2", "dall-e-3", "gpt-image-1"]
        );
    }

    #[test]
    fn gemini_models_require_generate_content() {
        let models = vec![
            GeminiModel {
                name: "models/gemini-pro".to_string(),
                supported_generation_methods: vec!["generateContent".to_string()],
            },
            GeminiModel {
                name: "models/embedding-001".to_string(),
                supported_generation_methods: vec!["embedContent".to_string()],
            },
            GeminiModel {
                name: "models/gemini-1.5-flash-latest".to_string(),
                supported_generation_methods: vec![
                    "countTokens".to_string(),
                    "generateContent".to_string(),
                ],
            },
        ];
        assert_eq!(
            filter_gemini_models(&models),
            vec!["gemini-1.5-flash-latest", "gemini-pro"]
        );
    }

    #[test]
    fn task_parses_case_insensitively() {
        assert_eq!("Image".parse::<ModelTask>(), Ok(ModelTask::Image));
        assert!("audio".parse::<ModelTask>().is_err());
    }
}
