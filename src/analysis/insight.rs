use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};
use crate::analysis::statistics::{min_max, pct_change};
use crate::analysis::format_usd;
use crate::core::timeseries::normalize_points;
use crate::models::{PointSource, TimePoint};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Flat,
}

impl Direction {
    pub fn of(delta: f64) -> Self {
        if delta > 0.0 {
            Direction::Up
        } else if delta < 0.0 {
            Direction::Down
        } else {
            Direction::Flat
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Flat => "flat",
        }
    }
}

/// Change between two readings.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Change {
    pub base_date: String,
    pub absolute: f64,
    /// `None` when the base value is zero.
    pub percent: Option<f64>,
}

impl Change {
    fn between(base: &TimePoint, current: &TimePoint) -> Self {
        Self {
            base_date: base.date.clone(),
            absolute: current.value - base.value,
            percent: pct_change(base.value, current.value),
        }
    }

    fn describe(&self) -> String {
        let direction = Direction::of(self.absolute);
        let amount = format_usd(self.absolute.abs());
        let label = month_label(&self.base_date);
        match (direction, self.percent) {
            (Direction::Flat, _) => format!("flat vs {}", label),
            (_, Some(pct)) => format!("{} {} ({:+.1}%) vs {}", direction.as_str(), amount, pct, label),
            (_, None) => format!("{} {} vs {}", direction.as_str(), amount, label),
        }
    }
}

/// Numbers behind the fallback report.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TimelineSummary {
    pub latest: TimePoint,
    pub month_over_month: Change,
    pub year_over_year: Option<Change>,
    pub low: TimePoint,
    pub high: TimePoint,
}

/// Summarize a timeline. Needs at least two points.
pub fn summarize_timeline(timeline: &[TimePoint]) -> Option<TimelineSummary> {
    let points = normalize_points(timeline);
    if points.len() < 2 {
        return None;
    }

    // 1. Latest vs prior point
    let latest = points[points.len() - 1].clone();
    let prior = &points[points.len() - 2];
    let month_over_month = Change::between(prior, &latest);

    // 2. Same month one year earlier
    let year_over_year = year_ago_key(&latest.date).and_then(|key| {
        points
            .iter()
            .rev()
            .find(|p| p.date.starts_with(&key))
            .map(|base| Change::between(base, &latest))
    });

    // 3. Visible range
    let (low, high) = min_max(&points)?;

    Some(TimelineSummary {
        latest,
        month_over_month,
        year_over_year,
        low: low.clone(),
        high: high.clone(),
    })
}

/// Deterministic four-line report used when the remote explanation is empty or failed.
/// Returns an empty string for fewer than two points.
pub fn build_fallback_insight(timeline: &[TimePoint]) -> String {
    let Some(summary) = summarize_timeline(timeline) else {
        return String::new();
    };

    let latest_tag = match summary.latest.source {
        PointSource::Forecast => ", forecast",
        PointSource::Actual => "",
    };
    let yoy = match &summary.year_over_year {
        Some(change) => change.describe(),
        None => match year_ago_key(&summary.latest.date) {
            Some(key) => format!("not available (no data for {})", month_label(&format!("{}-01", key))),
            None => "not available".to_string(),
        },
    };

    [
        format!(
            "- Latest ({}{}): {}.",
            month_label(&summary.latest.date),
            latest_tag,
            format_usd(summary.latest.value)
        ),
        format!("- Month over month: {}.", summary.month_over_month.describe()),
        format!("- Year over year: {}.", yoy),
        format!(
            "- Range: low {} ({}), high {} ({}).",
            format_usd(summary.low.value),
            month_label(&summary.low.date),
            format_usd(summary.high.value),
            month_label(&summary.high.date)
        ),
    ]
    .join("\n")
}

/// "2023-08-01" -> "Aug 2023"; anything unparsable is returned unchanged.
pub fn month_label(date: &str) -> String {
    match NaiveDate::parse_from_str(date, "%Y-%m-%d") {
        Ok(d) => d.format("%b %Y").to_string(),
        Err(_) => date.to_string(),
    }
}

/// "2023-08-01" -> "2022-08"
fn year_ago_key(date: &str) -> Option<String> {
    let d = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    let earlier = d.checked_sub_months(Months::new(12))?;
    Some(earlier.format("%Y-%m").to_string())
}
