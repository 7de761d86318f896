//! Runtime configuration, read from the environment (and `.env` via the binary).

use crate::error::{FunnelError, Result};
use crate::llm::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use std::time::Duration;

pub const DEFAULT_ANALYSIS_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_TEMPLATE_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub template_url: Option<String>,
    pub analysis_timeout: Duration,
    pub template_timeout: Duration,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            template_url: None,
            analysis_timeout: Duration::from_secs(DEFAULT_ANALYSIS_TIMEOUT_SECS),
            template_timeout: Duration::from_secs(DEFAULT_TEMPLATE_TIMEOUT_SECS),
        }
    }
}

impl AnalysisConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        Ok(Self {
            api_key: get("GEMINI_API_KEY"),
            model: get("GEMINI_MODEL").unwrap_or(defaults.model),
            base_url: get("GEMINI_BASE_URL").unwrap_or(defaults.base_url),
            template_url: get("PROMPT_TEMPLATE_URL"),
            analysis_timeout: parse_secs("ANALYSIS_TIMEOUT_SECS", get("ANALYSIS_TIMEOUT_SECS"))?
                .unwrap_or(defaults.analysis_timeout),
            template_timeout: parse_secs(
                "TEMPLATE_FETCH_TIMEOUT_SECS",
                get("TEMPLATE_FETCH_TIMEOUT_SECS"),
            )?
            .unwrap_or(defaults.template_timeout),
        })
    }

    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            FunnelError::Config("GEMINI_API_KEY is not set (use --api-key or the environment)".to_string())
        })
    }
}

fn parse_secs(key: &str, value: Option<String>) -> Result<Option<Duration>> {
    match value {
        None => Ok(None),
        Some(raw) => match raw.parse::<u64>() {
            Ok(0) | Err(_) => Err(FunnelError::Config(format!(
                "{} must be a positive number of seconds, got '{}'",
                key, raw
            ))),
            Ok(secs) => Ok(Some(Duration::from_secs(secs))),
        },
    }
}
