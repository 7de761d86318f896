//! Analysis Prompt Builder
//!
//! Serializes a dataset as a pipe-delimited table and substitutes it, along
//! with the focus-mode tag, into a prompt template. Each placeholder is
//! replaced once; a template without a placeholder simply drops that slot.

use crate::dataset::LevelDataset;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const FOCUS_MODE_PLACEHOLDER: &str = "{focusMode}";
pub const LEVEL_DATA_PLACEHOLDER: &str = "{levelData}";

const FOCUS_MODE_BLOCK: &str = "\n\nFocus Mode: {focusMode}\n\
- revenue: Prioritize ARPU optimization, accept higher churn\n\
- retention: Prioritize player retention and LTV\n\
- balanced: Balance between immediate revenue and long-term retention";

const LEVEL_DATA_BLOCK: &str = "\n\nAnalyze the following level data:\n{levelData}";

/// Steers the analysis toward revenue, retention, or both.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum FocusMode {
    Revenue,
    Retention,
    #[default]
    Balanced,
}

impl FocusMode {
    pub fn as_tag(&self) -> &'static str {
        match self {
            FocusMode::Revenue => "revenue",
            FocusMode::Retention => "retention",
            FocusMode::Balanced => "balanced",
        }
    }
}

impl fmt::Display for FocusMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

impl FromStr for FocusMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "revenue" => Ok(FocusMode::Revenue),
            "retention" => Ok(FocusMode::Retention),
            "balanced" => Ok(FocusMode::Balanced),
            other => Err(format!(
                "unknown focus mode '{}', expected revenue, retention or balanced",
                other
            )),
        }
    }
}

/// Prompt text with `{focusMode}` / `{levelData}` slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    text: String,
}

impl PromptTemplate {
    /// Use the text exactly as given.
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Trim fetched text and append any placeholder block it lacks.
    pub fn repaired(text: &str) -> Self {
        let mut text = text.trim().to_string();
        if !text.contains(FOCUS_MODE_PLACEHOLDER) {
            text.push_str(FOCUS_MODE_BLOCK);
        }
        if !text.contains(LEVEL_DATA_PLACEHOLDER) {
            text.push_str(LEVEL_DATA_BLOCK);
        }
        Self { text }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn render(&self, dataset: &LevelDataset, focus: FocusMode) -> String {
        build_prompt(self, dataset, focus)
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::new(default_analysis_template())
    }
}

/// Pipe-delimited table: header, separator, one line per level.
///
/// Column order is the first row's key order for every row.
pub fn format_level_table(dataset: &LevelDataset) -> String {
    let columns = dataset.columns();
    let header = columns.join(" | ");
    let separator = "---".repeat(columns.len());
    let rows: Vec<String> = dataset
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|c| row.get(c).map(|v| v.to_string()).unwrap_or_default())
                .collect::<Vec<_>>()
                .join(" | ")
        })
        .collect();

    format!("{}\n{}\n{}", header, separator, rows.join("\n"))
}

/// Substitute the focus tag and the level table into the template.
pub fn build_prompt(template: &PromptTemplate, dataset: &LevelDataset, focus: FocusMode) -> String {
    template
        .as_str()
        .replacen(FOCUS_MODE_PLACEHOLDER, focus.as_tag(), 1)
        .replacen(LEVEL_DATA_PLACEHOLDER, &format_level_table(dataset), 1)
}

/// Bundled analysis prompt, used whenever no remote template is available.
pub fn default_analysis_template() -> &'static str {
    r#"Role: You are an expert Mobile Game Product Manager and Level Designer specializing in economy balancing and funnel optimization. You have deep knowledge of player psychology, "Flow" theory, and monetization mechanics.
Objective: Analyze the provided level data table to optimize the funnel for maximum revenue. Find the "sweet spot" between user churn/retention and revenue per user (ARPU).

Input Data Definitions:
* Level Number: The index/order of the level.
* Number of Users: Total users who reached this specific level.
* APS (Attempts per Success): Average number of attempts required to beat the level.
* Success Rate: Percentage of users who completed the level.
* FAR (First Attempt Rate): Percentage of users who beat the level on their first try.
* Churn: Percentage of users who quit the game entirely at this level.
* ARPU: Average Revenue Per User generated specifically at this level.

CRITICAL CONSTRAINT: Statistical Significance
Do NOT analyze or give recommendations for any level where "Number of Users" is less than 300.
* Mark such levels as "Insufficient Data" and skip them.

Frameworks:
1. Flow Channel & Funnel Dynamics
* Engagement lives between Boredom (too easy) and Anxiety (too hard).
* Win rates must not decrease linearly.
* Spike: a difficult "blocker" level that tests skill and drains resources.
* Relief: an easy level right after a Spike to reduce frustration and churn.

2. Funnel Phases
* Early Funnel (Levels 1-40): early conversion and retention. APS must not exceed 3.0. FAR may be low in rare spikes if the APS cap holds.
* Mid-to-Late Funnel (Level 41+): monetization through investment. APS can scale gradually to 10.0+.

3. Blocker and Relief Levels
* Blockers drain boosters/currency and identify hooked players; churn there is acceptable.
* Early Relief levels can reach ~90%+ FAR; mid and late Relief levels should stay below ~85% FAR.

4. Difficulty Rhythm
* After the tutorial (Levels 5-20), find the first level with FAR < 90% and squeeze FAR gradually from there.
* Once baseline FAR drops below 10%, add a Hard level (10%-30% FAR) every 3 to 4 levels.

5. Funnel Models (classify each section)
* Model A "Fast Burn / Fast Revenue": high-churn sections; accept churn, maximize immediate ARPU with pinch points.
* Model B "Slow and Steady": high-retention sections; keep 90-95% completion, Spike then Relief, maximize LTV.
* Model C "Balanced / Staircase": 5-6 high-confidence levels followed by one soft pinch.

Instructions:
Step 1: Filter out levels with <300 users.
Step 2: Segmentation. Group levels into sections of at least 10 levels based on user behavior.
Step 3: Assign one model (Fast Burn, Slow & Steady, Balanced) to each section.
Step 4: For each section, name the levels failing their model and give precise fixes.

Output Format:
Structure your response exactly as follows:
1. Executive Summary
* High-level view of funnel health
* Overall trajectory (early, mid, late loss/retention)
* Spike intervals and revenue generation

2. Segmentation
* Sections with level ranges and assigned model

3. Specific Optimization Recommendations
* Top 10 critical action items, citing KPIs and reasoning (e.g. "Level 20 is a Spike but has 90% FAR").

4. Full recommendation Table
* Section | Current Issue | Recommended Action | Expected Outcome

Focus Mode: {focusMode}
- revenue: Prioritize ARPU optimization, accept higher churn
- retention: Prioritize player retention and LTV
- balanced: Balance between immediate revenue and long-term retention

Analyze the following level data:
{levelData}"#
}
