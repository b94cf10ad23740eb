use crate::models::{PointSource, TimePoint};
use serde_json::Value;

/// Field names that may carry a point's value, in priority order.
const VALUE_FIELDS: [&str; 5] = ["value", "total", "sales", "amount", "y"];

/// Extract a finite number from the first populated value field. Defaults to 0.
///
/// "Populated" means present and not null, so `{"value": null, "total": 5}` yields 5,
/// while `{"value": "abc", "total": 5}` yields 0 (the first field wins even when unparsable).
pub fn pick_number(raw: &Value) -> f64 {
    let first = VALUE_FIELDS
        .iter()
        .filter_map(|field| raw.get(*field))
        .find(|v| !v.is_null());

    let n = match first {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(s)) => parse_leading_float(s),
        _ => f64::NAN,
    };

    if n.is_finite() { n } else { 0.0 }
}

/// Lenient float parse: whole string first, then the longest numeric prefix ("12.5k" -> 12.5).
fn parse_leading_float(s: &str) -> f64 {
    let s = s.trim();
    if let Ok(v) = s.parse::<f64>() {
        return v;
    }
    let end = s
        .char_indices()
        .take_while(|(i, c)| c.is_ascii_digit() || *c == '.' || ((*c == '-' || *c == '+') && *i == 0))
        .map(|(i, c)| i + c.len_utf8())
        .last()
        .unwrap_or(0);
    s[..end].parse::<f64>().unwrap_or(f64::NAN)
}

/// First 10 characters of the date-ish field ("2023-08-01T00:00:00Z" -> "2023-08-01").
pub fn norm_date(raw: Option<&Value>) -> String {
    let s = match raw {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    };
    s.chars().take(10).collect()
}

fn norm_source(raw: Option<&Value>) -> PointSource {
    match raw.and_then(Value::as_str) {
        Some(s) if s.eq_ignore_ascii_case("forecast") => PointSource::Forecast,
        _ => PointSource::Actual,
    }
}

fn to_point(raw: &Value) -> TimePoint {
    TimePoint {
        date: norm_date(raw.get("date")),
        value: pick_number(raw),
        source: norm_source(raw.get("source")),
    }
}

/// Turn arbitrary point-like objects into a sorted timeline.
pub fn normalize_timeline(raw: &[Value]) -> Vec<TimePoint> {
    let mut points: Vec<TimePoint> = raw
        .iter()
        .map(to_point)
        .filter(|p| !p.date.is_empty() && p.value.is_finite())
        .collect();

    // Zero-padded ISO dates sort correctly as strings. Stable, so same-date order is kept.
    points.sort_by(|a, b| a.date.cmp(&b.date));
    points
}

/// Same extraction as the timeline, only when a date is present.
pub fn normalize_focus(raw: &Value) -> Option<TimePoint> {
    let date = raw.get("date")?;
    if date.is_null() {
        return None;
    }
    let point = to_point(raw);
    if point.date.is_empty() {
        None
    } else {
        Some(point)
    }
}

/// Re-normalize already typed points (dates truncated, non-finite values dropped, sorted).
pub fn normalize_points(points: &[TimePoint]) -> Vec<TimePoint> {
    let mut out: Vec<TimePoint> = points
        .iter()
        .map(|p| TimePoint {
            date: p.date.chars().take(10).collect(),
            value: p.value,
            source: p.source,
        })
        .filter(|p| !p.date.is_empty() && p.value.is_finite())
        .collect();
    out.sort_by(|a, b| a.date.cmp(&b.date));
    out
}
