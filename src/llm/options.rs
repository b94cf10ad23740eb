use serde::{Deserialize, Serialize};
use std::fmt;

/// Shape of the rendered explanation. Rendering without a requested style uses `Bullets`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExplainStyle {
    #[default]
    Bullets,
    Narrative,
    Actions,
}

impl ExplainStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExplainStyle::Bullets => "bullets",
            ExplainStyle::Narrative => "narrative",
            ExplainStyle::Actions => "actions",
        }
    }
}

impl fmt::Display for ExplainStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reading level as offered in the UI.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReadingLevel {
    Simple,
    #[default]
    Balanced,
    Advanced,
    Pro,
}

impl ReadingLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadingLevel::Simple => "simple",
            ReadingLevel::Balanced => "balanced",
            ReadingLevel::Advanced => "advanced",
            ReadingLevel::Pro => "pro",
        }
    }

    /// Accepts both vocabularies. Anything unknown is treated as `Pro` (no rewriting).
    pub fn parse(s: &str) -> ReadingLevel {
        match map_level_to_legacy(s) {
            LegacyLevel::Sixth => ReadingLevel::Simple,
            LegacyLevel::Ninth => ReadingLevel::Balanced,
            LegacyLevel::Twelfth => ReadingLevel::Advanced,
            LegacyLevel::Pro => ReadingLevel::Pro,
        }
    }

    pub fn to_legacy(self) -> LegacyLevel {
        match self {
            ReadingLevel::Simple => LegacyLevel::Sixth,
            ReadingLevel::Balanced => LegacyLevel::Ninth,
            ReadingLevel::Advanced => LegacyLevel::Twelfth,
            ReadingLevel::Pro => LegacyLevel::Pro,
        }
    }
}

impl fmt::Display for ReadingLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Grade-level vocabulary understood by older explanation servers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum LegacyLevel {
    #[serde(rename = "6th")]
    Sixth,
    #[serde(rename = "9th")]
    Ninth,
    #[serde(rename = "12th")]
    Twelfth,
    #[serde(rename = "pro")]
    Pro,
}

impl LegacyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LegacyLevel::Sixth => "6th",
            LegacyLevel::Ninth => "9th",
            LegacyLevel::Twelfth => "12th",
            LegacyLevel::Pro => "pro",
        }
    }
}

impl fmt::Display for LegacyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The complete set of knobs an explanation request recognizes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub struct ExplainOptions {
    pub explain_style: Option<ExplainStyle>,
    pub reading_level: Option<ReadingLevel>,
}

impl ExplainOptions {
    pub fn new(explain_style: ExplainStyle, reading_level: ReadingLevel) -> Self {
        Self {
            explain_style: Some(explain_style),
            reading_level: Some(reading_level),
        }
    }

    /// Style used for local rendering when none was requested.
    pub fn style_or_default(&self) -> ExplainStyle {
        self.explain_style.unwrap_or_default()
    }

    pub fn level_or_default(&self) -> ReadingLevel {
        self.reading_level.unwrap_or_default()
    }
}

/// Case-insensitive style lookup. Unknown input falls back to `Narrative`.
pub fn normalize_style(s: &str) -> ExplainStyle {
    match s.trim().to_lowercase().as_str() {
        "bullets" => ExplainStyle::Bullets,
        "narrative" => ExplainStyle::Narrative,
        "actions" | "action plan" | "actionplan" => ExplainStyle::Actions,
        _ => ExplainStyle::Narrative,
    }
}

pub fn map_level_to_legacy(level: &str) -> LegacyLevel {
    match level.trim().to_lowercase().as_str() {
        "simple" | "6th" => LegacyLevel::Sixth,
        "balanced" | "9th" | "default" => LegacyLevel::Ninth,
        "advanced" | "12th" => LegacyLevel::Twelfth,
        _ => LegacyLevel::Pro,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_style_aliases() {
        assert_eq!(normalize_style("Bullets"), ExplainStyle::Bullets);
        assert_eq!(normalize_style("NARRATIVE"), ExplainStyle::Narrative);
        assert_eq!(normalize_style("Action Plan"), ExplainStyle::Actions);
        assert_eq!(normalize_style("actionplan"), ExplainStyle::Actions);
        assert_eq!(normalize_style("haiku"), ExplainStyle::Narrative);
        assert_eq!(normalize_style(""), ExplainStyle::Narrative);
    }

    #[test]
    fn test_map_level_to_legacy() {
        assert_eq!(map_level_to_legacy("simple"), LegacyLevel::Sixth);
        assert_eq!(map_level_to_legacy("6th"), LegacyLevel::Sixth);
        assert_eq!(map_level_to_legacy("Balanced"), LegacyLevel::Ninth);
        assert_eq!(map_level_to_legacy("default"), LegacyLevel::Ninth);
        assert_eq!(map_level_to_legacy("12th"), LegacyLevel::Twelfth);
        assert_eq!(map_level_to_legacy("advanced"), LegacyLevel::Twelfth);
        assert_eq!(map_level_to_legacy("expert"), LegacyLevel::Pro);
        assert_eq!(map_level_to_legacy(""), LegacyLevel::Pro);
    }

    #[test]
    fn test_reading_level_round_trip_through_legacy() {
        for level in [ReadingLevel::Simple, ReadingLevel::Balanced, ReadingLevel::Advanced, ReadingLevel::Pro] {
            assert_eq!(ReadingLevel::parse(level.as_str()), level);
            assert_eq!(ReadingLevel::parse(level.to_legacy().as_str()), level);
        }
    }
}
