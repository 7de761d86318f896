//! Analysis Response Parser
//!
//! Recovers the labeled sections of a generated funnel analysis. The output
//! format of the generator is not guaranteed, so every step degrades to a
//! weaker reading instead of failing, and the raw text is always kept.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Upper bound on the first-paragraph summary fallback, in characters.
pub const SUMMARY_FALLBACK_CHARS: usize = 1000;

/// Items kept when recommendations are scraped from the whole response.
pub const FALLBACK_RECOMMENDATION_LIMIT: usize = 10;

lazy_static! {
    static ref EXECUTIVE_HEADER: Regex =
        Regex::new(r"(?i)(?:1\.?\s*)?Executive Summary[:*_\s]*\n").unwrap();
    static ref EXECUTIVE_END: Regex = Regex::new(r"\n[*_]*(?:[234]|##)").unwrap();
    static ref SEGMENTATION_HEADER: Regex =
        Regex::new(r"(?i)(?:2\.?\s*)?Segment[ation]*[:*_\s]*\n").unwrap();
    static ref SEGMENTATION_END: Regex = Regex::new(r"\n[*_]*[34]").unwrap();
    static ref RECOMMENDATION_HEADER: Regex = Regex::new(
        r"(?i)(?:3\.?\s*)?(?:Specific )?Optimization Recommendations?[:*_\s]*\n"
    )
    .unwrap();
    static ref RECOMMENDATION_END: Regex = Regex::new(r"(?i)\n[*_]*4|Full.*Table").unwrap();
    static ref FULL_TABLE_HEADER: Regex =
        Regex::new(r"(?i)(?:4\.?\s*)?Full\s+recommendation\s+Table[:*_\s]*\n").unwrap();
    static ref LIST_ITEM: Regex = Regex::new(r"(?:^|\n)\s*(?:\d+\.|-|\*)\s*(.+)").unwrap();
    static ref LINE_START_ITEM: Regex = Regex::new(r"(?:^|\n)(?:\d+\.|-|\*)\s*(.+)").unwrap();
}

/// Structured view of one generated analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub executive_summary: String,
    pub segmentation: String,
    pub recommendations: Vec<String>,
    pub full_table: String,
    pub raw_response: String,
}

impl AnalysisResult {
    /// True when nothing but the raw text could be recovered.
    pub fn is_unstructured(&self) -> bool {
        self.executive_summary.is_empty()
            && self.segmentation.is_empty()
            && self.recommendations.is_empty()
            && self.full_table.is_empty()
    }
}

/// Text after `header` up to the first `end` match (or end of input).
fn labeled_section(text: &str, header: &Regex, end: Option<&Regex>) -> Option<String> {
    let found = header.find(text)?;
    let body = &text[found.end()..];
    let body = match end.and_then(|re| re.find(body)) {
        Some(stop) => &body[..stop.start()],
        None => body,
    };
    Some(body.trim().to_string())
}

fn list_items(text: &str, pattern: &Regex) -> Vec<String> {
    pattern
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| {
            m.as_str()
                .trim_start_matches(|c: char| c == '*' || c.is_whitespace())
                .trim()
                .to_string()
        })
        .filter(|item| !item.is_empty() && !item.chars().all(|c| c == '-'))
        .collect()
}

fn first_paragraph(text: &str) -> String {
    text.split("\n\n")
        .next()
        .unwrap_or_default()
        .chars()
        .take(SUMMARY_FALLBACK_CHARS)
        .collect()
}

/// Parse a generated response. Never fails; `raw_response` is always the input.
pub fn parse_analysis_response(response: &str) -> AnalysisResult {
    let executive_summary =
        match labeled_section(response, &EXECUTIVE_HEADER, Some(&EXECUTIVE_END)) {
            Some(section) => section,
            None => {
                debug!("No labeled executive summary; using first paragraph");
                first_paragraph(response)
            }
        };

    let segmentation =
        labeled_section(response, &SEGMENTATION_HEADER, Some(&SEGMENTATION_END)).unwrap_or_default();

    let recommendations =
        match labeled_section(response, &RECOMMENDATION_HEADER, Some(&RECOMMENDATION_END)) {
            Some(section) => list_items(&section, &LIST_ITEM),
            None => {
                debug!("No labeled recommendations; scanning whole response for list items");
                list_items(response, &LINE_START_ITEM)
                    .into_iter()
                    .take(FALLBACK_RECOMMENDATION_LIMIT)
                    .collect()
            }
        };

    let full_table = labeled_section(response, &FULL_TABLE_HEADER, None).unwrap_or_default();

    AnalysisResult {
        executive_summary,
        segmentation,
        recommendations,
        full_table,
        raw_response: response.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STRUCTURED: &str = "\
1. Executive Summary
The funnel is healthy early but leaks after level 40.
Spikes arrive every 6 levels.

2. Segmentation
Levels 1-20: Slow and Steady
Levels 21-40: Balanced

3. Specific Optimization Recommendations
1. Level 20 is a Spike but has 90% FAR; lower FAR to 40%.
2. Add a relief level after level 27.
- Cap APS at 3.0 for levels 30-40.
* **Level 45** needs a blocker.

4. Full recommendation Table
Section | Current Issue | Recommended Action | Expected Outcome
1-20 | Flat difficulty | Add spikes | +5% ARPU
";

    #[test]
    fn test_structured_response() {
        let result = parse_analysis_response(STRUCTURED);
        assert_eq!(
            result.executive_summary,
            "The funnel is healthy early but leaks after level 40.\nSpikes arrive every 6 levels."
        );
        assert_eq!(
            result.segmentation,
            "Levels 1-20: Slow and Steady\nLevels 21-40: Balanced"
        );
        assert_eq!(
            result.recommendations,
            vec![
                "Level 20 is a Spike but has 90% FAR; lower FAR to 40%.",
                "Add a relief level after level 27.",
                "Cap APS at 3.0 for levels 30-40.",
                "Level 45** needs a blocker.",
            ]
        );
        assert!(result.full_table.starts_with("Section | Current Issue"));
        assert!(result.full_table.ends_with("+5% ARPU"));
        assert_eq!(result.raw_response, STRUCTURED);
        assert!(!result.is_unstructured());
    }

    #[test]
    fn test_markdown_headings() {
        let text = "## 1. Executive Summary:\nSolid retention.\n## 3. Optimization Recommendation\n- Raise ARPU at level 12\n";
        let result = parse_analysis_response(text);
        assert_eq!(result.executive_summary, "Solid retention.");
        assert_eq!(result.recommendations, vec!["Raise ARPU at level 12"]);
    }

    #[test]
    fn test_bold_numbered_headings_bound_sections() {
        let text = "**1. Executive Summary**\nFunnel is healthy.\n\n**2. Segmentation**\nLevels 1-20: Slow and Steady\n\n**3. Specific Optimization Recommendations**\n- Lower FAR at 20\n\n**4. Full recommendation Table**\nSection | Issue\n";
        let result = parse_analysis_response(text);
        assert_eq!(result.executive_summary, "Funnel is healthy.");
        assert_eq!(result.segmentation, "Levels 1-20: Slow and Steady");
        assert_eq!(result.recommendations, vec!["Lower FAR at 20"]);
        assert_eq!(result.full_table, "Section | Issue");
    }

    #[test]
    fn test_bold_labels() {
        let text = "**Executive Summary:**\nChurn spikes at 15.\n";
        let result = parse_analysis_response(text);
        assert_eq!(result.executive_summary, "Churn spikes at 15.");
    }

    #[test]
    fn test_summary_falls_back_to_first_paragraph() {
        let text = "Overall the funnel looks fine.\nNo big spikes.\n\nSecond paragraph here.";
        let result = parse_analysis_response(text);
        assert_eq!(result.executive_summary, "Overall the funnel looks fine.\nNo big spikes.");
        assert_eq!(result.segmentation, "");
    }

    #[test]
    fn test_summary_fallback_is_truncated() {
        let text = "é".repeat(1500);
        let result = parse_analysis_response(&text);
        assert_eq!(result.executive_summary.chars().count(), SUMMARY_FALLBACK_CHARS);
    }

    #[test]
    fn test_recommendations_fall_back_to_line_items() {
        let mut text = String::from("Some intro text.\n");
        for i in 1..=12 {
            text.push_str(&format!("{}. Fix level {}\n", i, i * 10));
        }
        text.push_str("  - indented items are ignored\n");
        let result = parse_analysis_response(&text);
        assert_eq!(result.recommendations.len(), FALLBACK_RECOMMENDATION_LIMIT);
        assert_eq!(result.recommendations[0], "Fix level 10");
        assert_eq!(result.recommendations[9], "Fix level 100");
    }

    #[test]
    fn test_labeled_section_bounds_item_scan() {
        let text = "Optimization Recommendations:\nNothing to change.\n\n- stray item";
        let result = parse_analysis_response(text);
        assert_eq!(result.recommendations, vec!["stray item"]);

        let text = "Optimization Recommendations:\nNothing to change.\n4. Full recommendation Table\n- row";
        let result = parse_analysis_response(text);
        assert!(result.recommendations.is_empty());
    }

    #[test]
    fn test_empty_response() {
        let result = parse_analysis_response("");
        assert_eq!(result.executive_summary, "");
        assert!(result.recommendations.is_empty());
        assert_eq!(result.raw_response, "");
        assert!(result.is_unstructured());
    }

    #[test]
    fn test_horizontal_rules_are_not_items() {
        let text = "Optimization Recommendations\n---\n- Keep FAR under 85% on relief levels\n";
        let result = parse_analysis_response(text);
        assert_eq!(result.recommendations, vec!["Keep FAR under 85% on relief levels"]);
    }
}
