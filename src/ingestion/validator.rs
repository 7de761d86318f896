//! Schema Validator - checks that every canonical column is present

use crate::dataset::{CanonicalColumn, LevelDataset};
use crate::error::{FunnelError, Result};
use serde::{Deserialize, Serialize};

/// Outcome of one validation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub valid: bool,
    pub missing: Vec<String>,
    pub message: String,
}

impl ValidationVerdict {
    /// Convert a failed verdict into the upload-rejecting error.
    pub fn into_result(self) -> Result<()> {
        if self.valid {
            Ok(())
        } else {
            Err(FunnelError::SchemaValidation {
                missing: self.missing,
                message: self.message,
            })
        }
    }
}

/// Check column presence against the first row's keys (case-insensitive).
///
/// Cell types are not inspected.
pub fn validate_level_data(dataset: &LevelDataset) -> ValidationVerdict {
    let Some(first) = dataset.rows().first() else {
        return ValidationVerdict {
            valid: false,
            missing: CanonicalColumn::ALL.iter().map(|c| c.name().to_string()).collect(),
            message: "No data found in CSV".to_string(),
        };
    };

    let missing: Vec<String> = CanonicalColumn::ALL
        .iter()
        .filter(|col| !first.keys().any(|k| k.to_lowercase() == col.name().to_lowercase()))
        .map(|col| col.name().to_string())
        .collect();

    if missing.is_empty() {
        ValidationVerdict {
            valid: true,
            missing,
            message: "Data validated successfully".to_string(),
        }
    } else {
        let message = format!("Missing required columns: {}", missing.join(", "));
        ValidationVerdict {
            valid: false,
            missing,
            message,
        }
    }
}
