//! Funnel Metric Deriver
//!
//! Pure aggregates over a validated dataset, one canonical column at a time.
//!
//! Rate columns (`Success Rate`, `FAR`, `Churn`) use the percentage convention:
//! a value `v` with `0 < v <= 1` is a fraction and is shown as `v * 100`; any
//! other value is already a percentage. A literal 1% written as `1` is
//! therefore read as 100%. Every consumer goes through [`display_percent`].
//!
//! Unreadable or missing cells count as 0 and stay in the denominator.

use crate::dataset::{CanonicalColumn, CellValue, LevelDataset, LevelRow};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Neutral reading for columns without a gauge rule.
pub const NEUTRAL_GAUGE: f64 = 50.0;

/// Shown in place of an aggregate when there is nothing to aggregate.
pub const NO_DATA: &str = "---";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub level: CellValue,
    pub value: f64,
}

/// A formatted aggregate, or the "no data" sentinel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetricDisplay {
    NoData,
    Value { value: f64, text: String },
}

impl MetricDisplay {
    pub fn value(&self) -> Option<f64> {
        match self {
            MetricDisplay::NoData => None,
            MetricDisplay::Value { value, .. } => Some(*value),
        }
    }
}

impl fmt::Display for MetricDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricDisplay::NoData => f.pad(NO_DATA),
            MetricDisplay::Value { text, .. } => f.pad(text),
        }
    }
}

/// Deep-dive tab keys and the column each one reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MetricTab {
    #[default]
    Arpu,
    Churn,
    Far,
    SuccessRate,
    Aps,
    Users,
}

impl MetricTab {
    pub const ALL: [MetricTab; 6] = [
        MetricTab::Arpu,
        MetricTab::Churn,
        MetricTab::Far,
        MetricTab::SuccessRate,
        MetricTab::Aps,
        MetricTab::Users,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            MetricTab::Arpu => "arpu",
            MetricTab::Churn => "churn",
            MetricTab::Far => "far",
            MetricTab::SuccessRate => "success_rate",
            MetricTab::Aps => "aps",
            MetricTab::Users => "users",
        }
    }

    pub fn column(&self) -> CanonicalColumn {
        match self {
            MetricTab::Arpu => CanonicalColumn::Arpu,
            MetricTab::Churn => CanonicalColumn::Churn,
            MetricTab::Far => CanonicalColumn::Far,
            MetricTab::SuccessRate => CanonicalColumn::SuccessRate,
            MetricTab::Aps => CanonicalColumn::Aps,
            MetricTab::Users => CanonicalColumn::NumberOfUsers,
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.key() == key)
    }
}

/// Apply the fraction-or-percentage convention to one value.
pub fn display_percent(value: f64) -> f64 {
    if value > 0.0 && value <= 1.0 {
        value * 100.0
    } else {
        value
    }
}

fn cell_number(row: &LevelRow, column: CanonicalColumn) -> f64 {
    let raw = row.column(column).map(CellValue::numeric_or_zero).unwrap_or(0.0);
    if column.is_rate() {
        display_percent(raw)
    } else {
        raw
    }
}

/// Ordered `{level, value}` pairs for one column.
pub fn extract_series(dataset: &LevelDataset, column: CanonicalColumn) -> Vec<SeriesPoint> {
    dataset
        .iter()
        .map(|row| SeriesPoint {
            level: row
                .column(CanonicalColumn::LevelNumber)
                .cloned()
                .unwrap_or_else(|| CellValue::Text(String::new())),
            value: cell_number(row, column),
        })
        .collect()
}

fn mean(dataset: &LevelDataset, column: CanonicalColumn) -> Option<f64> {
    if dataset.is_empty() {
        return None;
    }
    let sum: f64 = dataset.iter().map(|row| cell_number(row, column)).sum();
    Some(sum / dataset.len() as f64)
}

/// Arithmetic mean, formatted for the column.
pub fn average(dataset: &LevelDataset, column: CanonicalColumn) -> MetricDisplay {
    match mean(dataset, column) {
        None => MetricDisplay::NoData,
        Some(value) => {
            let text = match column {
                CanonicalColumn::Arpu => format!("${:.3}", value),
                CanonicalColumn::NumberOfUsers => group_thousands(value),
                c if c.is_rate() => format!("{:.1}%", value),
                _ => format!("{:.2}", value),
            };
            MetricDisplay::Value { value, text }
        }
    }
}

/// Maximum over the series, formatted for the column.
pub fn peak(dataset: &LevelDataset, column: CanonicalColumn) -> MetricDisplay {
    let peak = dataset
        .iter()
        .map(|row| cell_number(row, column))
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))));

    match peak {
        None => MetricDisplay::NoData,
        Some(value) => {
            let text = match column {
                CanonicalColumn::Arpu => format!("${:.2}", value),
                CanonicalColumn::NumberOfUsers => group_thousands(value),
                c if c.is_rate() => format!("{:.1}%", value),
                _ => format!("{:.2}", value),
            };
            MetricDisplay::Value { value, text }
        }
    }
}

/// 0-100 reading for a segmented gauge; `None` for an empty dataset.
///
/// Churn is inverted (low churn reads high). APS loses 30 points per attempt
/// above the baseline of one.
pub fn gauge_value(dataset: &LevelDataset, column: CanonicalColumn) -> Option<f64> {
    let avg = mean(dataset, column)?;
    let value = match column {
        CanonicalColumn::Churn => 100.0 - avg,
        CanonicalColumn::SuccessRate | CanonicalColumn::Far => avg,
        CanonicalColumn::Aps => 100.0 - (avg - 1.0) * 30.0,
        _ => NEUTRAL_GAUGE,
    };
    Some(value.clamp(0.0, 100.0))
}

/// Three-digit gauge label, e.g. `042`.
pub fn gauge_label(value: f64) -> String {
    format!("{:03}", value.round() as i64)
}

/// Number of lit blocks in a gauge of `blocks` segments.
pub fn active_gauge_blocks(value: f64, blocks: usize) -> usize {
    let lit = ((value / 100.0) * blocks as f64).ceil();
    if lit <= 0.0 {
        0
    } else {
        (lit as usize).min(blocks)
    }
}

/// Render one table cell the way the level table shows it.
pub fn format_cell(column: &str, value: &CellValue) -> String {
    let Some(canonical) = CanonicalColumn::from_name(column) else {
        return value.to_string();
    };
    let num = value.numeric_or_zero();
    match canonical {
        CanonicalColumn::LevelNumber => value.to_string(),
        CanonicalColumn::NumberOfUsers => group_thousands(num),
        CanonicalColumn::Arpu => format!("${:.3}", num),
        c if c.is_rate() => format!("{:.1}%", display_percent(num)),
        _ => format!("{:.2}", num),
    }
}

/// Rounded integer with comma thousands separators.
pub fn group_thousands(value: f64) -> String {
    let rounded = value.round();
    let digits = (rounded.abs() as u64).to_string();
    let grouped = digits
        .as_bytes()
        .rchunks(3)
        .rev()
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .join(",");
    if rounded < 0.0 {
        format!("-{}", grouped)
    } else {
        grouped
    }
}
