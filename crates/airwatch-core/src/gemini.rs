//! Gemini [`ForecastModel`] over the Generative Language REST API.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use airwatch_core::{ForecastGateway, GeminiModel};
//!
//! # async fn example() -> airwatch_core::Result<()> {
//! let model = GeminiModel::new("my-api-key")?;
//! let gateway = ForecastGateway::new(Arc::new(model));
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::forecast::ForecastModel;

/// Default model name.
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Header carrying the API key.
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Client for a Gemini `generateContent` endpoint.
#[derive(Clone)]
pub struct GeminiModel {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl std::fmt::Debug for GeminiModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiModel")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl GeminiModel {
    /// Create a client for the default model and endpoint.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_options(api_key, DEFAULT_MODEL, DEFAULT_BASE_URL)
    }

    /// Create a client for a specific model and endpoint.
    ///
    /// No request timeout is configured.
    pub fn with_options(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: &str,
    ) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(Error::invalid_field(
                "base_url",
                format!("URL must start with http:// or https://, got: {}", base_url),
            ));
        }

        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::NotConfigured("Gemini API key is empty".to_string()));
        }

        let client = Client::builder().build()?;
        Ok(Self {
            client,
            base_url,
            model: model.into(),
            api_key,
        })
    }

    /// Endpoint URL. The key travels in a header.
    pub fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
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
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

fn request_body(prompt: &str) -> GenerateRequest<'_> {
    GenerateRequest {
        contents: vec![Content {
            role: "user",
            parts: vec![RequestPart { text: prompt }],
        }],
        generation_config: GenerationConfig {
            response_mime_type: "application/json",
        },
    }
}

/// Pull `candidates[0].content.parts[0].text` out of a reply.
fn extract_text(response: GenerateResponse) -> Result<String> {
    response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .and_then(|c| c.parts.into_iter().next())
        .and_then(|p| p.text)
        .ok_or_else(|| Error::Schema("model reply has no candidate text".to_string()))
}

#[async_trait]
impl ForecastModel for GeminiModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let response = self
            .client
            .post(self.endpoint())
            .header(API_KEY_HEADER, self.api_key.as_str())
            .json(&request_body(prompt))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Transport(format!(
                "model endpoint returned {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let reply: GenerateResponse = response
            .json()
            .await
            .map_err(|e| Error::Schema(format!("unreadable model reply: {}", e.without_url())))?;
        extract_text(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_body_shape() {
        let body = serde_json::to_value(request_body("hello")).unwrap();
        assert_eq!(
            body,
            json!({
                "contents": [{ "role": "user", "parts": [{ "text": "hello" }] }],
                "generationConfig": { "responseMimeType": "application/json" }
            })
        );
    }

    #[test]
    fn test_extract_text() {
        let reply: GenerateResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": { "parts": [{ "text": "{\"breachProbability\":0.1}" }] }
            }]
        }))
        .unwrap();
        assert_eq!(extract_text(reply).unwrap(), "{\"breachProbability\":0.1}");

        let empty: GenerateResponse = serde_json::from_value(json!({})).unwrap();
        assert!(matches!(extract_text(empty), Err(Error::Schema(_))));
    }

    #[test]
    fn test_endpoint_and_validation() {
        let model = GeminiModel::with_options("key", "gemini-1.5-flash", "http://localhost:9/").unwrap();
        assert_eq!(
            model.endpoint(),
            "http://localhost:9/v1beta/models/gemini-1.5-flash:generateContent"
        );

        assert!(GeminiModel::with_options("key", "m", "localhost").is_err());
        assert!(matches!(
            GeminiModel::new(" "),
            Err(Error::NotConfigured(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        let model = GeminiModel::with_options("key", DEFAULT_MODEL, "http://127.0.0.1:1").unwrap();
        assert!(matches!(
            model.generate("prompt").await,
            Err(Error::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_transport_error_omits_api_key() {
        let model =
            GeminiModel::with_options("SECRET-KEY-1234", DEFAULT_MODEL, "http://127.0.0.1:1")
                .unwrap();
        let err = model.generate("prompt").await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert!(!err.to_string().contains("SECRET-KEY-1234"));
    }
}
