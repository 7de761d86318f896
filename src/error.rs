use thiserror::Error;

/// Why a call to the external generator did not produce text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationFailure {
    #[error("network error: {0}")]
    Network(String),

    #[error("authentication rejected ({0})")]
    Auth(u16),

    #[error("quota exhausted")]
    Quota,

    #[error("remote error ({status}): {body}")]
    Remote { status: u16, body: String },

    #[error("generator returned no text")]
    EmptyResponse,

    #[error("no response within {seconds}s")]
    Timeout { seconds: u64 },
}

#[derive(Error, Debug)]
pub enum FunnelError {
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("{message}")]
    SchemaValidation { missing: Vec<String>, message: String },

    #[error("Template fetch failed: {0}")]
    TemplateFetch(String),

    #[error("Analysis failed: {0}")]
    Generation(#[from] GenerationFailure),

    #[error("No level data uploaded")]
    NoData,

    #[error("An analysis is already in progress")]
    Busy,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl FunnelError {
    /// True for errors that reject an upload outright.
    pub fn is_upload_rejection(&self) -> bool {
        matches!(
            self,
            FunnelError::MalformedInput(_) | FunnelError::SchemaValidation { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FunnelError>;
