//! Column Normalizer - maps header spellings onto canonical column names

use crate::dataset::{LevelDataset, LevelRow};

/// Lower-cased header spelling -> canonical column name.
const COLUMN_ALIASES: &[(&str, &str)] = &[
    ("level number", "Level Number"),
    ("level", "Level Number"),
    ("sw_main_level", "Level Number"),
    ("number of users", "Number of Users"),
    ("users", "Number of Users"),
    ("aps", "APS"),
    ("attempts per success", "APS"),
    ("success rate", "Success Rate"),
    ("successrate", "Success Rate"),
    ("far", "FAR"),
    ("first attempt rate", "FAR"),
    ("churn", "Churn"),
    ("churn rate", "Churn"),
    ("arpu", "ARPU"),
    ("arpul", "ARPU"),
    ("revenue", "ARPU"),
];

/// Canonical name for a header, if it is a known alias.
pub fn canonical_header(header: &str) -> Option<&'static str> {
    let lower = header.to_lowercase();
    COLUMN_ALIASES
        .iter()
        .find(|(alias, _)| *alias == lower)
        .map(|(_, canonical)| *canonical)
}

/// Rename every recognized header; unknown headers pass through unchanged.
///
/// When two source headers map to the same canonical name, the later value
/// wins and the column stays at the position of the first one.
pub fn normalize_columns(dataset: LevelDataset) -> LevelDataset {
    let rows = dataset
        .into_rows()
        .into_iter()
        .map(|row| {
            row.iter()
                .map(|(key, value)| {
                    let key = canonical_header(key).unwrap_or(key).to_string();
                    (key, value.clone())
                })
                .collect::<LevelRow>()
        })
        .collect();
    LevelDataset::new(rows)
}
