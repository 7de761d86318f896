//! Level dataset model
//!
//! A dataset is an ordered list of rows (row order = level progression).
//! Each row keeps its columns in the order they were first seen, so the
//! first row's key order can serve as the column order of the whole table.

use crate::error::Result;
use lazy_static::lazy_static;
use regex::Regex;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;

lazy_static! {
    static ref LEADING_NUMBER: Regex =
        Regex::new(r"^[+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?").unwrap();
}

/// One of the seven columns every validated dataset must expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CanonicalColumn {
    LevelNumber,
    NumberOfUsers,
    Aps,
    SuccessRate,
    Far,
    Churn,
    Arpu,
}

impl CanonicalColumn {
    pub const ALL: [CanonicalColumn; 7] = [
        CanonicalColumn::LevelNumber,
        CanonicalColumn::NumberOfUsers,
        CanonicalColumn::Aps,
        CanonicalColumn::SuccessRate,
        CanonicalColumn::Far,
        CanonicalColumn::Churn,
        CanonicalColumn::Arpu,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CanonicalColumn::LevelNumber => "Level Number",
            CanonicalColumn::NumberOfUsers => "Number of Users",
            CanonicalColumn::Aps => "APS",
            CanonicalColumn::SuccessRate => "Success Rate",
            CanonicalColumn::Far => "FAR",
            CanonicalColumn::Churn => "Churn",
            CanonicalColumn::Arpu => "ARPU",
        }
    }

    /// Rate columns may arrive as a fraction or as a whole percentage.
    pub fn is_rate(&self) -> bool {
        matches!(
            self,
            CanonicalColumn::SuccessRate | CanonicalColumn::Far | CanonicalColumn::Churn
        )
    }

    /// Case-insensitive lookup by canonical name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.name().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for CanonicalColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single cell after numeric coercion.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Text(String),
}

impl CellValue {
    /// Best-effort numeric reading used by every aggregate.
    ///
    /// Text cells contribute their leading numeric prefix ("12%" reads as 12);
    /// anything unreadable, including empty text and non-finite numbers, is 0.
    pub fn numeric_or_zero(&self) -> f64 {
        let value = match self {
            CellValue::Number(n) => *n,
            CellValue::Text(s) => LEADING_NUMBER
                .find(s.trim_start())
                .and_then(|m| m.as_str().parse::<f64>().ok())
                .unwrap_or(0.0),
        };
        if value.is_finite() {
            value
        } else {
            0.0
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::Text(s) => f.write_str(s),
        }
    }
}

impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            CellValue::Number(n) if n.is_finite() => serializer.serialize_f64(*n),
            other => serializer.serialize_str(&other.to_string()),
        }
    }
}

/// One level of the funnel, keyed by column header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LevelRow {
    cells: Vec<(String, CellValue)>,
}

impl LevelRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a cell. An existing key keeps its position and takes the new value.
    pub fn insert(&mut self, key: impl Into<String>, value: CellValue) {
        let key = key.into();
        match self.cells.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.cells.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&CellValue> {
        self.cells.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn column(&self, column: CanonicalColumn) -> Option<&CellValue> {
        self.get(column.name())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.cells.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl FromIterator<(String, CellValue)> for LevelRow {
    fn from_iter<I: IntoIterator<Item = (String, CellValue)>>(iter: I) -> Self {
        let mut row = LevelRow::new();
        for (k, v) in iter {
            row.insert(k, v);
        }
        row
    }
}

impl Serialize for LevelRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (k, v) in &self.cells {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Ordered sequence of level rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct LevelDataset {
    rows: Vec<LevelRow>,
}

impl LevelDataset {
    pub fn new(rows: Vec<LevelRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[LevelRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<LevelRow> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LevelRow> {
        self.rows.iter()
    }

    /// Column order of the table: the first row's keys.
    pub fn columns(&self) -> Vec<&str> {
        self.rows
            .first()
            .map(|row| row.keys().collect())
            .unwrap_or_default()
    }

    /// Serialize as comma-separated text using the first row's column order.
    pub fn to_csv(&self) -> Result<String> {
        let columns = self.columns();
        let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
        writer.write_record(&columns)?;
        for row in &self.rows {
            let record: Vec<String> = columns
                .iter()
                .map(|c| row.get(c).map(|v| v.to_string()).unwrap_or_default())
                .collect();
            writer.write_record(&record)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| crate::error::FunnelError::Io(e.into_error()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl<'a> IntoIterator for &'a LevelDataset {
    type Item = &'a LevelRow;
    type IntoIter = std::slice::Iter<'a, LevelRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}
