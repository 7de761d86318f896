//! Ingestion Module
//!
//! Upload text goes through four steps before it is accepted:
//! - Row tokenizing (quoted commas)
//! - CSV parsing with numeric coercion
//! - Header normalization onto canonical columns
//! - Schema validation (all canonical columns present)
//!
//! Any failure rejects the whole upload; no partial dataset is returned.

pub mod csv_parser;
pub mod normalizer;
pub mod tokenizer;
pub mod validator;

pub use csv_parser::{coerce_cell, parse_csv};
pub use normalizer::{canonical_header, normalize_columns};
pub use tokenizer::tokenize_row;
pub use validator::{validate_level_data, ValidationVerdict};

use crate::dataset::LevelDataset;
use crate::error::Result;
use tracing::{info, warn};

/// Parse, normalize and validate an uploaded CSV.
pub fn ingest(csv_text: &str) -> Result<LevelDataset> {
    let parsed = parse_csv(csv_text).map_err(|e| {
        warn!("Rejected upload: {}", e);
        e
    })?;
    let dataset = normalize_columns(parsed);

    let verdict = validate_level_data(&dataset);
    if !verdict.valid {
        warn!("Rejected upload: {}", verdict.message);
    }
    verdict.into_result()?;

    info!(
        "Accepted upload: {} levels, {} columns",
        dataset.len(),
        dataset.columns().len()
    );
    Ok(dataset)
}
