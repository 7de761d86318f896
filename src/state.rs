//! Application state
//!
//! A plain value plus a reducer. Handlers dispatch actions; the last write
//! wins. The core never reads this state, it only produces the values stored
//! in it.

use crate::dataset::LevelDataset;
use crate::metrics::{extract_series, MetricTab, SeriesPoint};
use crate::prompt::FocusMode;
use crate::service::AnalysisRun;
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq)]
pub enum AnalysisStatus {
    #[default]
    Idle,
    InProgress,
    Completed(Arc<AnalysisRun>),
    Failed {
        reason: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppState {
    pub level_data: Option<Arc<LevelDataset>>,
    pub analysis: AnalysisStatus,
    pub is_uploading: bool,
    pub focus_mode: FocusMode,
    pub deep_dive_tab: MetricTab,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub enum Action {
    UploadStarted,
    UploadSucceeded(Arc<LevelDataset>),
    UploadFailed(String),
    AnalysisStarted,
    AnalysisSucceeded(Arc<AnalysisRun>),
    AnalysisFailed(String),
    SetFocusMode(FocusMode),
    SetDeepDiveTab(MetricTab),
    Reset,
}

impl AppState {
    pub fn reduce(self, action: Action) -> AppState {
        match action {
            Action::UploadStarted => AppState {
                is_uploading: true,
                ..self
            },
            // a new dataset invalidates any analysis of the previous one
            Action::UploadSucceeded(dataset) => AppState {
                level_data: Some(dataset),
                analysis: AnalysisStatus::Idle,
                is_uploading: false,
                error: None,
                ..self
            },
            Action::UploadFailed(message) => AppState {
                is_uploading: false,
                error: Some(message),
                ..self
            },
            Action::AnalysisStarted => AppState {
                analysis: AnalysisStatus::InProgress,
                error: None,
                ..self
            },
            Action::AnalysisSucceeded(run) => AppState {
                analysis: AnalysisStatus::Completed(run),
                ..self
            },
            Action::AnalysisFailed(reason) => AppState {
                analysis: AnalysisStatus::Failed {
                    reason: reason.clone(),
                },
                error: Some(reason),
                ..self
            },
            Action::SetFocusMode(focus_mode) => AppState { focus_mode, ..self },
            Action::SetDeepDiveTab(deep_dive_tab) => AppState {
                deep_dive_tab,
                ..self
            },
            Action::Reset => AppState::default(),
        }
    }

    pub fn is_analyzing(&self) -> bool {
        matches!(self.analysis, AnalysisStatus::InProgress)
    }

    pub fn analysis_run(&self) -> Option<&AnalysisRun> {
        match &self.analysis {
            AnalysisStatus::Completed(run) => Some(run),
            _ => None,
        }
    }

    /// Series for the selected deep-dive tab; empty with no dataset.
    pub fn deep_dive_series(&self) -> Vec<SeriesPoint> {
        self.level_data
            .as_deref()
            .map(|data| extract_series(data, self.deep_dive_tab.column()))
            .unwrap_or_default()
    }
}
