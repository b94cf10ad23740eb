use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Whether a point was observed or predicted.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PointSource {
    #[default]
    Actual,
    Forecast,
}

impl PointSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PointSource::Actual => "actual",
            PointSource::Forecast => "forecast",
        }
    }
}

/// Canonical time-series record. Field order is part of the cache key, do not reorder.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TimePoint {
    pub date: String, // YYYY-MM-DD
    pub value: f64,
    pub source: PointSource,
}

impl TimePoint {
    pub fn new(date: impl Into<String>, value: f64, source: PointSource) -> Self {
        Self { date: date.into(), value, source }
    }

    pub fn actual(date: impl Into<String>, value: f64) -> Self {
        Self::new(date, value, PointSource::Actual)
    }

    pub fn forecast(date: impl Into<String>, value: f64) -> Self {
        Self::new(date, value, PointSource::Forecast)
    }
}

/// One month of store history as returned by the forecast endpoint.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct HistoryRow {
    pub date: String,
    pub total: f64,
    pub categories: Option<BTreeMap<String, f64>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct ForecastBundle {
    pub history: Vec<HistoryRow>,
    pub forecast: Vec<TimePoint>,
    /// History followed by forecast, finite values only.
    pub timeline: Vec<TimePoint>,
}

pub type StoreId = u32;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StoreOption {
    pub value: StoreId,
    pub label: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct StoreListing {
    pub stores: Vec<StoreOption>,
    pub from_cache: bool,
    /// Non-blocking message for the UI (stale list shown, refresh failed...).
    pub warning: Option<String>,
}

/// Result of an explanation request.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct ExplainResult {
    pub summary: String,
    #[serde(default)]
    pub from_cache: bool,
}
