pub mod analysis;
pub mod config;
pub mod dataset;
pub mod error;
pub mod ingestion;
pub mod llm;
pub mod metrics;
pub mod prompt;
pub mod service;
pub mod state;
pub mod template;

pub use analysis::{parse_analysis_response, AnalysisResult};
pub use config::AnalysisConfig;
pub use dataset::{CanonicalColumn, CellValue, LevelDataset, LevelRow};
pub use error::{FunnelError, GenerationFailure, Result};
pub use ingestion::{ingest, validate_level_data, ValidationVerdict};
pub use llm::{Generator, LlmClient};
pub use metrics::{MetricDisplay, MetricTab};
pub use prompt::{build_prompt, FocusMode, PromptTemplate};
pub use service::{AnalysisRun, FunnelAnalyzer, Session};
pub use state::{Action, AnalysisStatus, AppState};
pub use template::{FileTemplateSource, HttpTemplateSource, TemplateSource};
