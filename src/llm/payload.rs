use super::options::{ExplainOptions, ExplainStyle, LegacyLevel};
use crate::core::timeseries::normalize_points;
use crate::models::TimePoint;
use serde::Serialize;

/// Wire body of `POST /explain_forecast`.
///
/// Its JSON serialization doubles as the cache key, so the field order below is the canonical
/// order: `view, timeline, focus, explainStyle, style, format, readingLevel, level, audience`.
/// Optional fields are omitted when absent. Style and level are repeated under every alias older
/// servers look for.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExplainRequestPayload {
    pub view: &'static str,
    pub timeline: Vec<TimePoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focus: Option<TimePoint>,
    #[serde(rename = "explainStyle", skip_serializing_if = "Option::is_none")]
    pub explain_style: Option<ExplainStyle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<ExplainStyle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<ExplainStyle>,
    #[serde(rename = "readingLevel", skip_serializing_if = "Option::is_none")]
    pub reading_level: Option<LegacyLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<LegacyLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audience: Option<LegacyLevel>,
}

impl ExplainRequestPayload {
    pub fn build(timeline: &[TimePoint], focus: Option<&TimePoint>, options: &ExplainOptions) -> Self {
        let focus = focus
            .map(|f| TimePoint {
                date: f.date.chars().take(10).collect(),
                value: if f.value.is_finite() { f.value } else { 0.0 },
                source: f.source,
            })
            .filter(|f| !f.date.is_empty());

        let style = options.explain_style;
        let level = options.reading_level.map(|l| l.to_legacy());

        Self {
            view: "total",
            timeline: normalize_points(timeline),
            focus,
            explain_style: style,
            style,
            format: style,
            reading_level: level,
            level,
            audience: level,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.timeline.is_empty()
    }

    /// Canonical serialization, used as the cache key.
    pub fn cache_key(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// `style` / `level` echoed as query parameters for older handlers.
    pub fn query_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        if let Some(style) = self.style {
            params.push(("style".to_string(), style.as_str().to_string()));
        }
        if let Some(level) = self.level {
            params.push(("level".to_string(), level.as_str().to_string()));
        }
        params
    }
}
