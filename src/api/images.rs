//! OpenAI image generation.

use base64::Engine as _;
use chrono::Local;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::api::ImagesResponse;
use crate::utils::formatters::{file_timestamp, sanitize_filename};
use crate::utils::url::construct_api_url;

pub const IMAGE_SIZE: &str = "1024x1024";

/// `dall-e` models only return base64 when asked to; newer models always do
/// and reject the field.
pub fn build_image_payload(model: &str, prompt: &str) -> Value {
    let mut payload = json!({
        "model": model,
        "prompt": prompt,
        "n": 1,
        "size": IMAGE_SIZE,
    });
    if model.starts_with("dall-e") {
        payload["response_format"] = json!("b64_json");
    }
    payload
}

/// Generate one image and return its decoded bytes.
pub async fn generate_image(
    client: &reqwest::Client,
    base_url: &str,
    api_key: &str,
    model: &str,
    prompt: &str,
    timeout: Duration,
) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let response = client
        .post(construct_api_url(base_url, "images/generations"))
        .header("Authorization", format!("Bearer {api_key}"))
        .json(&build_image_payload(model, prompt))
        .timeout(timeout)
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(format!("Image generation failed with status {status}: {error_text}").into());
    }

    let body: ImagesResponse = response.json().await?;
    let image = body
        .data
        .into_iter()
        .next()
        .ok_or("Image generation returned no data")?;

    if let Some(encoded) = image.b64_json {
        return Ok(base64::engine::general_purpose::STANDARD.decode(encoded.trim())?);
    }
    if let Some(url) = image.url {
        debug!(%url, "downloading generated image");
        let bytes = client
            .get(url)
            .timeout(timeout)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        return Ok(bytes.to_vec());
    }
    Err("Image generation returned neither b64_json nor url".into())
}

/// Write image bytes as `<dir>/<timestamp>_<prompt>.png`.
pub fn save_image(dir: &Path, prompt: &str, bytes: &[u8]) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let name = format!(
        "{}_{}.png",
        file_timestamp(Local::now()),
        sanitize_filename(prompt, 50)
    );
    let path = dir.join(name);
    std::fs::write(&path, bytes)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::{spawn_mock_server, MockResponse};
    use tempfile::TempDir;

    #[test]
    fn response_format_only_for_dall_e() {
        let dalle = build_image_payload("dall-e-3", "a fox");
        assert_eq!(dalle["response_format"], "b64_json");
        assert_eq!(dalle["size"], "1024x1024");
        assert_eq!(dalle["n"], 1);

        let other = build_image_payload("gpt-image-1", "a fox");
        assert!(other.get("response_format").is_none());
    }

    #[tokio::test]
    async fn decodes_base64_payload() {
        let server = spawn_mock_server(vec![MockResponse::json(
            200,
            r#"{"data":[{"b64_json":"aGVsbG8="}]}"#,
        )])
        .await;

        let bytes = generate_image(
            &reqwest::Client::new(),
            &server.base_url(),
            "sk-test",
            "dall-e-3",
            "a fox",
            Duration::from_secs(5),
        )
        .await
        .expect("image");
        assert_eq!(bytes, b"hello");

        let requests = server.requests().await;
        assert!(requests[0].request_line.contains("/images/generations"));
        assert_eq!(
            requests[0].header("authorization").as_deref(),
            Some("Bearer sk-test")
        );
    }

    #[tokio::test]
    async fn status_errors_are_reported() {
        let server = spawn_mock_server(vec![MockResponse::json(
            400,
            r#"{"error":{"message":"bad prompt"}}"#,
        )])
        .await;

        let err = generate_image(
            &reqwest::Client::new(),
            &server.base_url(),
            "sk-test",
            "dall-e-3",
            "a fox",
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("400"));
        assert!(err.to_string().contains("bad prompt"));
    }

    #[test]
    fn saved_file_name_carries_prompt() {
        let dir = TempDir::new().unwrap();
        let path = save_image(dir.path(), "A red fox!", b"png").unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.ends_with("_A_red_fox.png"));
        assert_eq!(std::fs::read(&path).unwrap(), b"png");
    }
}
