use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use super::ApiTransport;
use crate::core::timeseries::norm_date;
use crate::error::{InsightError, Result};
use crate::models::{ForecastBundle, HistoryRow, StoreId, TimePoint};

const HISTORY_FIELDS: [&str; 3] = ["total_sales", "total", "value"];
const FORECAST_FIELDS: [&str; 3] = ["sales", "total", "value"];

pub fn forecast_path(store: StoreId) -> String {
    format!("forecast/{}", store)
}

/// `GET forecast/{store}`: history plus forecast for one store.
pub struct ForecastFetcher {
    transport: Arc<dyn ApiTransport>,
}

impl ForecastFetcher {
    pub fn new(transport: Arc<dyn ApiTransport>) -> Self {
        Self { transport }
    }

    /// Non-2xx and non-JSON responses are errors.
    pub async fn fetch(&self, store: StoreId, cancel: &CancellationToken) -> Result<ForecastBundle> {
        let path = forecast_path(store);
        let resp = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(InsightError::Cancelled),
            r = self.transport.get_json(&path, &[]) => r?,
        };

        if !resp.is_success() {
            return Err(InsightError::Status {
                status: resp.status,
                body: resp.body_text(),
            });
        }
        let body = resp
            .body
            .ok_or_else(|| InsightError::Transport(format!("forecast {}: response was not JSON", store)))?;

        let bundle = parse_forecast(&body);
        info!(store, history = bundle.history.len(), forecast = bundle.forecast.len(), "Forecast loaded");
        Ok(bundle)
    }
}

/// Accepts `forecast` as an array or a single object; missing parts become empty.
pub fn parse_forecast(body: &Value) -> ForecastBundle {
    let history: Vec<HistoryRow> = body
        .get("history")
        .and_then(Value::as_array)
        .map(|rows| rows.iter().map(parse_history_row).collect())
        .unwrap_or_default();

    let forecast_raw: Vec<&Value> = match body.get("forecast") {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(v) if v.is_object() => vec![v],
        _ => Vec::new(),
    };
    let forecast: Vec<TimePoint> = forecast_raw.into_iter().map(parse_forecast_point).collect();

    let timeline = history
        .iter()
        .map(|r| TimePoint::actual(r.date.clone(), r.total))
        .chain(forecast.iter().cloned())
        .filter(|p| p.value.is_finite())
        .collect();

    ForecastBundle { history, forecast, timeline }
}

fn parse_history_row(raw: &Value) -> HistoryRow {
    let categories = raw.get("categories").and_then(Value::as_object).map(|obj| {
        obj.iter()
            .map(|(k, v)| (k.clone(), coerce_number(Some(v))))
            .collect::<BTreeMap<String, f64>>()
    });
    HistoryRow {
        date: norm_date(raw.get("date")),
        total: coerce_number(first_present(raw, &HISTORY_FIELDS)),
        categories,
    }
}

fn parse_forecast_point(raw: &Value) -> TimePoint {
    // Month-only dates ("2023-09") are pinned to the first of the month.
    let mut date = norm_date(raw.get("date"));
    if date.len() == 7 {
        date.push_str("-01");
    }
    TimePoint::forecast(date, coerce_number(first_present(raw, &FORECAST_FIELDS)))
}

fn first_present<'a>(raw: &'a Value, fields: &[&str]) -> Option<&'a Value> {
    fields.iter().filter_map(|f| raw.get(*f)).find(|v| !v.is_null())
}

/// Strict numeric coercion: missing is 0, an unparsable string is NaN (dropped from the timeline).
fn coerce_number(v: Option<&Value>) -> f64 {
    match v {
        None | Some(Value::Null) => 0.0,
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(s)) if s.trim().is_empty() => 0.0,
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(f64::NAN),
        Some(Value::Bool(b)) => if *b { 1.0 } else { 0.0 },
        Some(_) => f64::NAN,
    }
}
