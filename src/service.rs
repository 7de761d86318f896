//! Analysis orchestration
//!
//! `FunnelAnalyzer` turns a dataset into a prompt, calls the generator and
//! parses what comes back. `Session` wraps it with the application state and
//! the single-flight guard that keeps uploads and analyses from overlapping.

use crate::analysis::{parse_analysis_response, AnalysisResult};
use crate::config::AnalysisConfig;
use crate::dataset::LevelDataset;
use crate::error::{FunnelError, GenerationFailure, Result};
use crate::ingestion::ingest;
use crate::llm::{Generator, LlmClient};
use crate::metrics::MetricTab;
use crate::prompt::FocusMode;
use crate::state::{Action, AppState};
use crate::template::{resolve_template, HttpTemplateSource, TemplateSource};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{info, warn};
use uuid::Uuid;

/// One completed analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRun {
    pub run_id: Uuid,
    pub focus_mode: FocusMode,
    pub levels_analyzed: usize,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub result: AnalysisResult,
}

pub struct FunnelAnalyzer {
    generator: Arc<dyn Generator>,
    template_source: Option<Arc<dyn TemplateSource>>,
    timeout: Duration,
}

impl FunnelAnalyzer {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self {
            generator,
            template_source: None,
            timeout: AnalysisConfig::default().analysis_timeout,
        }
    }

    /// Gemini-backed analyzer; template URL and timeouts come from `config`.
    pub fn from_config(config: &AnalysisConfig) -> Result<Self> {
        let api_key = config.require_api_key()?.to_string();
        let client = LlmClient::new(api_key, config.model.clone(), config.base_url.clone())
            .with_request_timeout(config.analysis_timeout)?;

        let mut analyzer = Self::new(Arc::new(client)).with_timeout(config.analysis_timeout);
        if let Some(url) = &config.template_url {
            let source = HttpTemplateSource::new(url.clone(), config.template_timeout)?;
            analyzer = analyzer.with_template_source(Arc::new(source));
        }
        Ok(analyzer)
    }

    pub fn with_template_source(mut self, source: Arc<dyn TemplateSource>) -> Self {
        self.template_source = Some(source);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Resolve the template and render the full prompt text.
    pub async fn prepare_prompt(&self, dataset: &LevelDataset, focus: FocusMode) -> String {
        let template = resolve_template(self.template_source.as_deref()).await;
        template.render(dataset, focus)
    }

    /// Send the prompt and return the raw generated text.
    pub async fn generate_raw(&self, dataset: &LevelDataset, focus: FocusMode) -> Result<String> {
        if dataset.is_empty() {
            return Err(FunnelError::NoData);
        }
        let prompt = self.prepare_prompt(dataset, focus).await;
        info!(
            "Requesting {} analysis of {} levels ({} prompt chars)",
            focus,
            dataset.len(),
            prompt.len()
        );

        let outcome = match tokio::time::timeout(self.timeout, self.generator.generate(&prompt)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(GenerationFailure::Timeout {
                seconds: self.timeout.as_secs(),
            }),
        };

        outcome.map_err(|failure| {
            warn!("Generation failed: {}", failure);
            FunnelError::Generation(failure)
        })
    }

    pub async fn analyze(&self, dataset: &LevelDataset, focus: FocusMode) -> Result<AnalysisRun> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let clock = Instant::now();

        let response = self.generate_raw(dataset, focus).await?;
        let result = parse_analysis_response(&response);
        if result.is_unstructured() {
            warn!("Run {}: no labeled sections recognized; keeping raw text only", run_id);
        }

        let elapsed_ms = clock.elapsed().as_millis() as u64;
        info!(
            "Run {} finished in {}ms with {} recommendations",
            run_id,
            elapsed_ms,
            result.recommendations.len()
        );

        Ok(AnalysisRun {
            run_id,
            focus_mode: focus,
            levels_analyzed: dataset.len(),
            started_at,
            completed_at: Utc::now(),
            elapsed_ms,
            result,
        })
    }
}

/// Application state plus the operations that mutate it.
pub struct Session {
    analyzer: FunnelAnalyzer,
    state: Mutex<AppState>,
    in_flight: tokio::sync::Mutex<()>,
}

impl Session {
    pub fn new(analyzer: FunnelAnalyzer) -> Self {
        Self {
            analyzer,
            state: Mutex::new(AppState::default()),
            in_flight: tokio::sync::Mutex::new(()),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, AppState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn dispatch(&self, action: Action) {
        let mut state = self.lock_state();
        let current = std::mem::take(&mut *state);
        *state = current.reduce(action);
    }

    pub fn state(&self) -> AppState {
        self.lock_state().clone()
    }

    /// Ingest an upload. On failure the previous dataset stays installed.
    pub fn upload(&self, csv_text: &str) -> Result<Arc<LevelDataset>> {
        let _guard = self.in_flight.try_lock().map_err(|_| FunnelError::Busy)?;
        self.dispatch(Action::UploadStarted);

        match ingest(csv_text) {
            Ok(dataset) => {
                let dataset = Arc::new(dataset);
                self.dispatch(Action::UploadSucceeded(dataset.clone()));
                Ok(dataset)
            }
            Err(e) => {
                self.dispatch(Action::UploadFailed(e.to_string()));
                Err(e)
            }
        }
    }

    /// Analyze the installed dataset with the current focus mode.
    pub async fn run_analysis(&self) -> Result<Arc<AnalysisRun>> {
        let _guard = self.in_flight.try_lock().map_err(|_| FunnelError::Busy)?;
        let (dataset, focus) = {
            let state = self.lock_state();
            (state.level_data.clone(), state.focus_mode)
        };
        let dataset = dataset.ok_or(FunnelError::NoData)?;

        self.dispatch(Action::AnalysisStarted);
        match self.analyzer.analyze(&dataset, focus).await {
            Ok(run) => {
                let run = Arc::new(run);
                self.dispatch(Action::AnalysisSucceeded(run.clone()));
                Ok(run)
            }
            Err(e) => {
                self.dispatch(Action::AnalysisFailed(e.to_string()));
                Err(e)
            }
        }
    }

    pub fn set_focus_mode(&self, focus: FocusMode) {
        self.dispatch(Action::SetFocusMode(focus));
    }

    pub fn set_deep_dive_tab(&self, tab: MetricTab) {
        self.dispatch(Action::SetDeepDiveTab(tab));
    }

    pub fn reset(&self) {
        self.dispatch(Action::Reset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AnalysisStatus;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const CSV: &str = "Level,Users,APS,Success Rate,FAR,Churn,ARPU\n1,1000,1.2,0.95,0.9,0.05,0.10\n2,900,2.5,0.6,0.4,0.12,0.25\n";

    struct Scripted {
        reply: std::result::Result<String, GenerationFailure>,
        calls: AtomicUsize,
        last_prompt: Mutex<String>,
    }

    impl Scripted {
        fn ok(text: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(text.to_string()),
                calls: AtomicUsize::new(0),
                last_prompt: Mutex::new(String::new()),
            })
        }

        fn failing(failure: GenerationFailure) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(failure),
                calls: AtomicUsize::new(0),
                last_prompt: Mutex::new(String::new()),
            })
        }
    }

    #[async_trait]
    impl Generator for Scripted {
        async fn generate(&self, prompt: &str) -> std::result::Result<String, GenerationFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_prompt.lock().unwrap() = prompt.to_string();
            self.reply.clone()
        }
    }

    struct Stalled;

    #[async_trait]
    impl Generator for Stalled {
        async fn generate(&self, _prompt: &str) -> std::result::Result<String, GenerationFailure> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(String::new())
        }
    }

    #[tokio::test]
    async fn test_analyze_parses_and_records_run() {
        let generator = Scripted::ok("Executive Summary:\nHealthy.\n3. Optimization Recommendations\n- Lower FAR at level 2\n");
        let analyzer = FunnelAnalyzer::new(generator.clone());
        let dataset = ingest(CSV).unwrap();

        let run = analyzer.analyze(&dataset, FocusMode::Revenue).await.unwrap();
        assert_eq!(run.focus_mode, FocusMode::Revenue);
        assert_eq!(run.levels_analyzed, 2);
        assert_eq!(run.result.executive_summary, "Healthy.");
        assert_eq!(run.result.recommendations, vec!["Lower FAR at level 2"]);
        assert!(run.completed_at >= run.started_at);

        let prompt = generator.last_prompt.lock().unwrap().clone();
        assert!(prompt.contains("revenue"));
        assert!(prompt.contains("Level Number | Number of Users"));
        assert!(!prompt.contains("{levelData}"));
    }

    #[tokio::test]
    async fn test_empty_dataset_is_not_sent() {
        let generator = Scripted::ok("unused");
        let analyzer = FunnelAnalyzer::new(generator.clone());
        let err = analyzer
            .analyze(&LevelDataset::default(), FocusMode::Balanced)
            .await
            .unwrap_err();
        assert!(matches!(err, FunnelError::NoData));
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_timeout_maps_to_generation_failure() {
        let analyzer = FunnelAnalyzer::new(Arc::new(Stalled)).with_timeout(Duration::from_millis(20));
        let dataset = ingest(CSV).unwrap();
        let err = analyzer.analyze(&dataset, FocusMode::Balanced).await.unwrap_err();
        assert!(matches!(
            err,
            FunnelError::Generation(GenerationFailure::Timeout { .. })
        ));
    }

    #[tokio::test]
    async fn test_session_failure_keeps_dataset() {
        let session = Session::new(FunnelAnalyzer::new(Scripted::failing(GenerationFailure::Quota)));
        session.upload(CSV).unwrap();

        let err = session.run_analysis().await.unwrap_err();
        assert!(matches!(err, FunnelError::Generation(GenerationFailure::Quota)));

        let state = session.state();
        assert!(state.level_data.is_some());
        assert!(matches!(state.analysis, AnalysisStatus::Failed { .. }));
        assert_eq!(state.error.as_deref(), Some("Analysis failed: quota exhausted"));
    }

    #[tokio::test]
    async fn test_session_requires_dataset() {
        let generator = Scripted::ok("unused");
        let session = Session::new(FunnelAnalyzer::new(generator.clone()));
        assert!(matches!(session.run_analysis().await, Err(FunnelError::NoData)));
        assert_eq!(session.state().analysis, AnalysisStatus::Idle);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_session_uses_selected_focus() {
        let generator = Scripted::ok("Executive Summary:\nOk.\n");
        let session = Session::new(FunnelAnalyzer::new(generator.clone()));
        session.upload(CSV).unwrap();
        session.set_focus_mode(FocusMode::Retention);

        let run = session.run_analysis().await.unwrap();
        assert_eq!(run.focus_mode, FocusMode::Retention);
        assert_eq!(session.state().analysis_run(), Some(run.as_ref()));

        // a fresh upload clears the stale analysis
        session.upload(CSV).unwrap();
        assert_eq!(session.state().analysis, AnalysisStatus::Idle);
    }
}
