//! Entry points for a front end. Every command returns `Result<T, String>` so the caller can show
//! the message as is.

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use crate::analysis::category::CategorySlice;
use crate::dashboard::{ChartView, DashboardState};
use crate::fetcher::forecast::ForecastFetcher;
use crate::llm::options::{normalize_style, ExplainOptions, ReadingLevel};
use crate::models::{ForecastBundle, StoreId, StoreListing};
use crate::AppState;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct InsightPanel {
    pub store: StoreId,
    pub options: ExplainOptions,
    /// Raw service answer; empty when the service had nothing.
    pub summary: String,
    /// What the panel shows.
    pub text: String,
    pub fallback: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PointInsightView {
    pub date: String,
    pub value: f64,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CategoryReport {
    pub store: StoreId,
    pub month: String,
    pub slices: Vec<CategorySlice>,
    pub text: String,
    pub fallback: bool,
}

pub async fn get_stores(state: &AppState) -> Result<StoreListing, String> {
    let listing = state.stores.load().await;
    if listing.stores.is_empty() {
        if let Some(warning) = listing.warning {
            return Err(warning);
        }
    }
    Ok(listing)
}

pub async fn retry_stores(state: &AppState) -> Result<StoreListing, String> {
    Ok(state.stores.retry_refresh().await)
}

pub async fn get_forecast(state: &AppState, store: StoreId) -> Result<ForecastBundle, String> {
    ForecastFetcher::new(state.client.transport())
        .fetch(store, &CancellationToken::new())
        .await
        .map_err(|e| e.to_string())
}

/// Parse the UI's style and level strings. Missing values keep the dashboard defaults.
pub fn parse_options(style: Option<&str>, level: Option<&str>) -> ExplainOptions {
    let defaults = DashboardState::default().options;
    ExplainOptions {
        explain_style: style.map(normalize_style).or(defaults.explain_style),
        reading_level: level.map(ReadingLevel::parse).or(defaults.reading_level),
    }
}

/// Load the store and its total explanation, rendered for the requested style and level.
pub async fn explain_forecast(
    state: &AppState,
    store: StoreId,
    style: Option<String>,
    level: Option<String>,
) -> Result<InsightPanel, String> {
    let dashboard = &state.dashboard;
    dashboard.set_options(parse_options(style.as_deref(), level.as_deref()));
    load_store(state, store).await?;

    let st = dashboard.state();
    Ok(InsightPanel {
        store,
        options: st.options,
        fallback: st.summary.trim().is_empty(),
        text: dashboard.insight_text(),
        summary: st.summary,
    })
}

/// Explain one point of the store's timeline, picked by date (`YYYY-MM-DD` or `YYYY-MM`).
pub async fn explain_point(state: &AppState, store: StoreId, date: &str) -> Result<PointInsightView, String> {
    load_store(state, store).await?;
    let dashboard = &state.dashboard;

    let point = dashboard
        .state()
        .timeline
        .into_iter()
        .find(|p| p.date.starts_with(date))
        .ok_or_else(|| format!("No data point for {} in store {}", date, store))?;

    dashboard.select_point(point).await;
    let popup = dashboard
        .state()
        .popup
        .ok_or_else(|| "Point insight was discarded".to_string())?;
    Ok(PointInsightView {
        date: popup.point.date,
        value: popup.point.value,
        text: popup.insight.text().to_string(),
    })
}

/// Latest month's category mix and its insight.
pub async fn get_category_insight(state: &AppState, store: StoreId) -> Result<CategoryReport, String> {
    load_store(state, store).await?;
    let dashboard = &state.dashboard;

    let breakdown = dashboard
        .category_breakdown()
        .ok_or_else(|| format!("Store {} has no category data", store))?;

    if dashboard.state().view == ChartView::Category {
        dashboard.regenerate_insight().await;
    } else {
        dashboard.toggle_view().await;
    }

    let insight = dashboard
        .state()
        .category_insight
        .ok_or_else(|| "Category insight was discarded".to_string())?;
    Ok(CategoryReport {
        store,
        month: breakdown.month,
        slices: breakdown.slices,
        text: insight.text,
        fallback: insight.fallback,
    })
}

async fn load_store(state: &AppState, store: StoreId) -> Result<(), String> {
    state.dashboard.select_store(Some(store)).await;
    match state.dashboard.state().error {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::db;
    use crate::fetcher::category::CATEGORY_INSIGHT_PATH;
    use crate::fetcher::explain::EXPLAIN_PATH;
    use crate::fetcher::mock::{MockReply, MockTransport};
    use crate::fetcher::stores::STORES_PATH;
    use crate::llm::options::ExplainStyle;
    use serde_json::json;
    use std::sync::Arc;

    fn forecast_body() -> serde_json::Value {
        json!({
            "history": [
                { "date": "2023-07-01", "total_sales": 100, "categories": { "WINE": 60, "BEER": 40 } },
                { "date": "2023-08-01", "total_sales": 120, "categories": { "WINE": 80, "BEER": 40 } }
            ],
            "forecast": [{ "date": "2023-09-01", "sales": 130 }]
        })
    }

    async fn app(mock: MockTransport) -> (AppState, Arc<MockTransport>) {
        let mock = Arc::new(mock);
        let pool = db::init_memory().await.unwrap();
        (AppState::with_transport(AppConfig::default(), pool, mock.clone()), mock)
    }

    #[test]
    fn test_parse_options() {
        let opts = parse_options(Some("Action Plan"), Some("6th"));
        assert_eq!(opts, ExplainOptions::new(ExplainStyle::Actions, ReadingLevel::Simple));
        assert_eq!(parse_options(None, None), ExplainOptions::new(ExplainStyle::Narrative, ReadingLevel::Balanced));
    }

    #[tokio::test]
    async fn test_explain_forecast_renders_style() {
        let (state, mock) = app(
            MockTransport::new()
                .with_reply("GET", "forecast/3", MockReply::json(forecast_body()))
                .with_reply("POST", EXPLAIN_PATH, MockReply::json(json!({ "summary": "Sales rose.\nNext actions:\n- Restock wine" }))),
        )
        .await;

        let panel = explain_forecast(&state, 3, Some("actions".into()), Some("pro".into())).await.unwrap();
        assert!(!panel.fallback);
        assert_eq!(panel.text, "- Restock wine");

        let sent = &mock.calls()[1];
        assert!(sent.query.contains(&("style".to_string(), "actions".to_string())));
    }

    #[tokio::test]
    async fn test_explain_forecast_falls_back_locally() {
        let (state, _mock) = app(
            MockTransport::new()
                .with_reply("GET", "forecast/3", MockReply::json(forecast_body()))
                .with_reply("POST", EXPLAIN_PATH, MockReply::json(json!({ "summary": "" }))),
        )
        .await;

        let panel = explain_forecast(&state, 3, None, None).await.unwrap();
        assert!(panel.fallback);
        assert!(panel.text.starts_with("- Latest (Sep 2023, forecast): $130."));
    }

    #[tokio::test]
    async fn test_forecast_error_is_reported() {
        let (state, _mock) = app(MockTransport::new().with_reply("GET", "forecast/3", MockReply::status(500, json!("boom")))).await;
        let err = explain_forecast(&state, 3, None, None).await.unwrap_err();
        assert!(err.starts_with("Failed to load forecast"));
    }

    #[tokio::test]
    async fn test_explain_point_by_month() {
        let (state, _mock) = app(
            MockTransport::new()
                .with_reply("GET", "forecast/3", MockReply::json(forecast_body()))
                .with_reply("POST", EXPLAIN_PATH, MockReply::json(json!({ "summary": "overview" })))
                .with_reply("POST", EXPLAIN_PATH, MockReply::json(json!("August was strong"))),
        )
        .await;

        let view = explain_point(&state, 3, "2023-08").await.unwrap();
        assert_eq!(view.date, "2023-08-01");
        assert_eq!(view.text, "August was strong");

        let err = explain_point(&state, 3, "2020-01").await.unwrap_err();
        assert!(err.contains("No data point"));
    }

    #[tokio::test]
    async fn test_category_insight_command() {
        let (state, _mock) = app(
            MockTransport::new()
                .with_reply("GET", "forecast/3", MockReply::json(forecast_body()))
                .with_reply("POST", EXPLAIN_PATH, MockReply::json(json!({ "summary": "overview" })))
                .with_reply("POST", CATEGORY_INSIGHT_PATH, MockReply::json(json!({ "text": "Wine leads" }))),
        )
        .await;

        let report = get_category_insight(&state, 3).await.unwrap();
        assert_eq!(report.month, "2023-08");
        assert_eq!(report.text, "Wine leads");
        assert!(!report.fallback);
        assert_eq!(report.slices[0].label, "Wine");
    }

    #[tokio::test]
    async fn test_get_stores_error_without_cache() {
        let (state, _mock) = app(MockTransport::new().with_reply("GET", STORES_PATH, MockReply::fail("offline"))).await;
        let err = get_stores(&state).await.unwrap_err();
        assert_eq!(err, "Failed to load stores. (Transport error: offline)");
    }
}
