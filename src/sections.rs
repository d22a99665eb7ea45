//! Read-only views over the three result sections.
//!
//! The workflow's output shape is not validated; these helpers pull out the
//! fields a presenter usually wants and return `None` for anything missing or
//! of the wrong type. Nothing here ever fails.

use crate::output::{AnalysisResult, Section};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;

/// Display format for activity timestamps, e.g. "March 04, 2025 02:30 PM".
pub const TIMESTAMP_DISPLAY_FORMAT: &str = "%B %d, %Y %I:%M %p";

/// Narrative text of the visual analysis, found at
/// `output.message.content[0].text`.
pub fn visual_text(section: &Section) -> Option<&str> {
    section
        .as_value()?
        .pointer("/output/message/content/0/text")?
        .as_str()
        .filter(|s| !s.is_empty())
}

/// Fields of `activity_pattern.productivity_analysis`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivitySummary {
    pub summary: Option<String>,
    /// Human-formatted when the raw value is ISO-8601, otherwise verbatim.
    pub timestamp: Option<String>,
    /// First letter upper-cased, the rest lower-cased.
    pub status: Option<String>,
}

impl ActivitySummary {
    pub fn is_empty(&self) -> bool {
        self.summary.is_none() && self.timestamp.is_none() && self.status.is_none()
    }
}

pub fn activity_summary(section: &Section) -> Option<ActivitySummary> {
    let analysis = section.as_value()?.get("productivity_analysis")?;
    let summary = ActivitySummary {
        summary: non_empty_str(analysis, "summary").map(str::to_string),
        timestamp: non_empty_str(analysis, "timestamp").map(format_timestamp),
        status: non_empty_str(analysis, "status").map(capitalize),
    };
    (!summary.is_empty()).then_some(summary)
}

/// Fields of the productivity assessment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductivityView {
    /// Score out of 100.
    pub score: Option<f64>,
    pub factors: Vec<String>,
    pub error: Option<String>,
}

pub fn productivity_view(section: &Section) -> Option<ProductivityView> {
    let value = section.as_value()?;
    let factors = value
        .get("factors_considered")
        .and_then(Value::as_array)
        .map(|items| items.iter().map(display_value).collect())
        .unwrap_or_default();
    let view = ProductivityView {
        score: value.get("productivity_score").and_then(Value::as_f64),
        factors,
        error: value.get("error").filter(|v| !v.is_null()).map(display_value),
    };
    if view.score.is_none() && view.factors.is_empty() && view.error.is_none() {
        return None;
    }
    Some(view)
}

/// Convenience bundle of all three views.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultViews<'a> {
    pub visual: Option<&'a str>,
    pub activity: Option<ActivitySummary>,
    pub productivity: Option<ProductivityView>,
}

impl<'a> ResultViews<'a> {
    pub fn of(result: &'a AnalysisResult) -> Self {
        Self {
            visual: visual_text(&result.visual_analysis),
            activity: activity_summary(&result.activity_pattern),
            productivity: productivity_view(&result.productivity_assessment),
        }
    }
}

/// Reformat an ISO-8601 timestamp for display; anything unparseable is
/// returned unchanged.
pub fn format_timestamp(raw: &str) -> String {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.format(TIMESTAMP_DISPLAY_FORMAT).to_string();
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return dt.format(TIMESTAMP_DISPLAY_FORMAT).to_string();
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(dt) = date.and_hms_opt(0, 0, 0) {
            return dt.format(TIMESTAMP_DISPLAY_FORMAT).to_string();
        }
    }
    raw.to_string()
}

/// "aCTIVE" → "Active".
pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

fn non_empty_str<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key)?.as_str().filter(|s| !s.is_empty())
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn present(v: Value) -> Section {
        Section::from_value(Some(v))
    }

    #[test]
    fn visual_text_follows_message_content() {
        let section = present(json!({
            "output": { "message": { "content": [ { "text": "A code editor." } ] } }
        }));
        assert_eq!(visual_text(&section), Some("A code editor."));
        assert_eq!(visual_text(&present(json!({ "output": {} }))), None);
        assert_eq!(visual_text(&Section::Empty), None);
    }

    #[test]
    fn activity_timestamp_is_humanised() {
        let section = present(json!({
            "productivity_analysis": {
                "summary": "Focused work",
                "timestamp": "2025-03-04T14:30:00",
                "status": "aCTIVE"
            }
        }));
        let view = activity_summary(&section).unwrap();
        assert_eq!(view.summary.as_deref(), Some("Focused work"));
        assert_eq!(view.timestamp.as_deref(), Some("March 04, 2025 02:30 PM"));
        assert_eq!(view.status.as_deref(), Some("Active"));
    }

    #[test]
    fn timestamp_with_offset_and_garbage() {
        assert_eq!(
            format_timestamp("2024-12-25T09:05:00+02:00"),
            "December 25, 2024 09:05 AM"
        );
        assert_eq!(format_timestamp("yesterday"), "yesterday");
    }

    #[test]
    fn activity_without_analysis_is_none() {
        assert!(activity_summary(&present(json!({ "other": 1 }))).is_none());
        assert!(activity_summary(&present(json!({ "productivity_analysis": {} }))).is_none());
    }

    #[test]
    fn productivity_fields() {
        let section = present(json!({
            "productivity_score": 72,
            "factors_considered": ["IDE open", 3],
            "error": "partial data"
        }));
        let view = productivity_view(&section).unwrap();
        assert_eq!(view.score, Some(72.0));
        assert_eq!(view.factors, vec!["IDE open".to_string(), "3".to_string()]);
        assert_eq!(view.error.as_deref(), Some("partial data"));
        assert!(productivity_view(&present(json!({ "x": 1 }))).is_none());
    }

    #[test]
    fn views_of_empty_result() {
        let result = AnalysisResult::default();
        assert_eq!(ResultViews::of(&result), ResultViews::default());
    }
}
