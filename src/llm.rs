use crate::error::{FunnelError, GenerationFailure};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// One prompt in, one block of text out.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationFailure>;
}

/// Client for the Gemini `generateContent` endpoint.
#[derive(Clone)]
pub struct LlmClient {
    api_key: String,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl LlmClient {
    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            client: reqwest::Client::new(),
        }
    }

    /// Bound each request; the analyzer applies its own overall timeout too.
    pub fn with_request_timeout(mut self, timeout: Duration) -> crate::error::Result<Self> {
        self.client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FunnelError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(self)
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl Generator for LlmClient {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationFailure> {
        let body = serde_json::json!({
            "contents": [
                {"role": "user", "parts": [{"text": prompt}]}
            ]
        });

        debug!("Calling {} with {} prompt chars", self.model, prompt.len());
        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerationFailure::Network(e.to_string()))?;

        // Check HTTP status
        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(match status.as_u16() {
                401 | 403 => GenerationFailure::Auth(status.as_u16()),
                429 => GenerationFailure::Quota,
                code => GenerationFailure::Remote {
                    status: code,
                    body: error_text,
                },
            });
        }

        let response_json: serde_json::Value = response.json().await.map_err(|e| {
            GenerationFailure::Remote {
                status: status.as_u16(),
                body: format!("unreadable response body: {}", e),
            }
        })?;

        if let Some(error) = response_json.get("error") {
            return Err(GenerationFailure::Remote {
                status: status.as_u16(),
                body: error.to_string(),
            });
        }

        let text = extract_text(&response_json).ok_or(GenerationFailure::EmptyResponse)?;
        info!("Received {} chars from {}", text.len(), self.model);
        Ok(text)
    }
}

/// Concatenate the text parts of the first candidate.
fn extract_text(response_json: &serde_json::Value) -> Option<String> {
    let parts = response_json["candidates"][0]["content"]["parts"].as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}
