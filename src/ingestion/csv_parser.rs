//! CSV Parser - turns raw upload text into typed level rows
//!
//! Headers are kept exactly as written (trimmed only). Each cell is trimmed,
//! thousands separators are removed, and the result becomes a number only if it
//! is a plain decimal literal. Everything else is kept as the trimmed text.

use crate::dataset::{CellValue, LevelDataset, LevelRow};
use crate::error::{FunnelError, Result};
use crate::ingestion::tokenizer::tokenize_row;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

lazy_static! {
    static ref PLAIN_DECIMAL: Regex = Regex::new(r"^-?\d*\.?\d+$").unwrap();
}

/// Parse raw CSV text into a dataset with source headers.
pub fn parse_csv(text: &str) -> Result<LevelDataset> {
    // spreadsheet exports often lead with a byte-order mark
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let lines: Vec<&str> = text.trim().split('\n').collect();
    if lines.len() < 2 {
        return Err(FunnelError::MalformedInput(
            "CSV must have at least a header row and one data row".to_string(),
        ));
    }

    let headers: Vec<String> = tokenize_row(lines[0])
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::with_capacity(lines.len() - 1);
    for line in &lines[1..] {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let values = tokenize_row(line);
        let row: LevelRow = headers
            .iter()
            .enumerate()
            .map(|(idx, header)| {
                let raw = values.get(idx).map(String::as_str).unwrap_or("");
                (header.clone(), coerce_cell(raw))
            })
            .collect();
        rows.push(row);
    }

    if rows.is_empty() {
        return Err(FunnelError::MalformedInput(
            "CSV must have at least a header row and one data row".to_string(),
        ));
    }

    debug!("Parsed {} rows with {} columns", rows.len(), headers.len());
    Ok(LevelDataset::new(rows))
}

/// Coerce one raw cell. "1,234.5" becomes 1234.5, "Version 1.2" stays text.
pub fn coerce_cell(raw: &str) -> CellValue {
    let trimmed = raw.trim();
    let cleaned = trimmed.replace(',', "");

    if !cleaned.is_empty() && PLAIN_DECIMAL.is_match(&cleaned) {
        if let Ok(n) = cleaned.parse::<f64>() {
            return CellValue::Number(n);
        }
    }

    CellValue::Text(trimmed.to_string())
}
