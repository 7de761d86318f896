//! Prompt template sources
//!
//! The template is configuration: it can come from a URL, a local file, or the
//! bundled default. Fetch failures never stop an analysis; they fall back to
//! the bundled template.

use crate::error::{FunnelError, Result};
use crate::prompt::PromptTemplate;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Anything that can produce prompt template text.
#[async_trait]
pub trait TemplateSource: Send + Sync {
    async fn fetch_template(&self) -> Result<String>;

    /// Short description for logs.
    fn describe(&self) -> String;
}

/// Plain-text template served over HTTP.
pub struct HttpTemplateSource {
    url: String,
    client: reqwest::Client,
}

impl HttpTemplateSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FunnelError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl TemplateSource for HttpTemplateSource {
    async fn fetch_template(&self) -> Result<String> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| FunnelError::TemplateFetch(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FunnelError::TemplateFetch(format!("HTTP {}", status)));
        }

        response
            .text()
            .await
            .map_err(|e| FunnelError::TemplateFetch(format!("failed to read body: {}", e)))
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// Template read from a local text file.
pub struct FileTemplateSource {
    path: PathBuf,
}

impl FileTemplateSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl TemplateSource for FileTemplateSource {
    async fn fetch_template(&self) -> Result<String> {
        tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| FunnelError::TemplateFetch(format!("{}: {}", self.path.display(), e)))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Fetch and repair a template, falling back to the bundled default.
pub async fn resolve_template(source: Option<&dyn TemplateSource>) -> PromptTemplate {
    let Some(source) = source else {
        return PromptTemplate::default();
    };

    match source.fetch_template().await {
        Ok(text) => {
            info!("Using prompt template from {}", source.describe());
            PromptTemplate::repaired(&text)
        }
        Err(e) => {
            warn!("{}; using bundled prompt template", e);
            PromptTemplate::default()
        }
    }
}
