//! Session state behind the sales dashboard.
//!
//! Three independent scopes guard the asynchronous work:
//! - `store`: forecast load and the total explanation for the selected store
//! - `point`: the popup explaining one clicked chart point
//! - `category`: the category mix insight
//!
//! Selecting a store invalidates all three, so nothing from the previous store can land in the
//! state afterwards.

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use parking_lot::Mutex;
use tracing::{info, warn};
use crate::analysis::category::{build_breakdown, project_what_if, CategoryBreakdown, WhatIfProjection};
use crate::analysis::insight::build_fallback_insight;
use crate::analysis::statistics::{EtaKind, EtaTracker};
use crate::core::epoch::{Epoch, Generation};
use crate::core::orchestrator::InsightClient;
use crate::fetcher::category::{category_insight, CategoryInsight};
use crate::fetcher::forecast::ForecastFetcher;
use crate::llm::options::{ExplainOptions, ExplainStyle, ReadingLevel};
use crate::llm::style::apply_style_and_level;
use crate::models::{HistoryRow, StoreId, TimePoint};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartView {
    #[default]
    Total,
    Category,
}

impl ChartView {
    pub fn toggled(self) -> Self {
        match self {
            ChartView::Total => ChartView::Category,
            ChartView::Category => ChartView::Total,
        }
    }
}

/// Popup content for a clicked point.
#[derive(Debug, Clone, PartialEq)]
pub enum PointInsight {
    Analyzing,
    Ready(String),
    Empty,
    Failed,
}

impl PointInsight {
    pub fn text(&self) -> &str {
        match self {
            PointInsight::Analyzing => "Analyzing…",
            PointInsight::Ready(s) => s,
            PointInsight::Empty => "No insight available.",
            PointInsight::Failed => "Failed to fetch insight.",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointPopup {
    pub point: TimePoint,
    pub insight: PointInsight,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardState {
    pub store: Option<StoreId>,
    pub view: ChartView,
    pub options: ExplainOptions,
    pub history: Vec<HistoryRow>,
    pub forecast: Vec<TimePoint>,
    pub timeline: Vec<TimePoint>,
    /// Raw total explanation as returned by the service.
    pub summary: String,
    pub category_insight: Option<CategoryInsight>,
    pub popup: Option<PointPopup>,
    pub loading_forecast: bool,
    pub loading_insight: bool,
    pub loading_category: bool,
    pub error: Option<String>,
}

impl Default for DashboardState {
    fn default() -> Self {
        Self {
            store: None,
            view: ChartView::Total,
            options: ExplainOptions::new(ExplainStyle::Narrative, ReadingLevel::Balanced),
            history: Vec::new(),
            forecast: Vec::new(),
            timeline: Vec::new(),
            summary: String::new(),
            category_insight: None,
            popup: None,
            loading_forecast: false,
            loading_insight: false,
            loading_category: false,
            error: None,
        }
    }
}

impl DashboardState {
    /// Drop everything tied to the selected store; view and options survive.
    fn clear_store_data(&mut self) {
        *self = DashboardState {
            view: self.view,
            options: self.options,
            ..DashboardState::default()
        };
    }
}

pub struct Dashboard {
    client: Arc<InsightClient>,
    forecasts: ForecastFetcher,
    eta: EtaTracker,
    category_top_n: usize,
    state: Mutex<DashboardState>,
    store_scope: Generation,
    point_scope: Generation,
    category_scope: Generation,
}

impl Dashboard {
    pub fn new(client: Arc<InsightClient>, pool: SqlitePool, category_top_n: usize) -> Self {
        Self {
            forecasts: ForecastFetcher::new(client.transport()),
            client,
            eta: EtaTracker::new(pool),
            category_top_n,
            state: Mutex::new(DashboardState::default()),
            store_scope: Generation::new("store"),
            point_scope: Generation::new("point"),
            category_scope: Generation::new("category"),
        }
    }

    /// Snapshot for rendering.
    pub fn state(&self) -> DashboardState {
        self.state.lock().clone()
    }

    pub fn eta(&self) -> &EtaTracker {
        &self.eta
    }

    fn update(&self, scope: &Generation, epoch: &Epoch, f: impl FnOnce(&mut DashboardState)) -> bool {
        scope.apply_if_current(epoch, || f(&mut self.state.lock()))
    }

    /// Switch the selected store. `None` clears the dashboard.
    pub async fn select_store(&self, store: Option<StoreId>) {
        self.point_scope.invalidate();
        self.category_scope.invalidate();

        let Some(store) = store else {
            self.store_scope.invalidate();
            self.state.lock().clear_store_data();
            return;
        };

        let epoch = self.store_scope.begin();
        {
            let mut st = self.state.lock();
            st.clear_store_data();
            st.store = Some(store);
            st.loading_forecast = true;
        }
        info!(store, "Store selected");

        // 1. Forecast
        let started = Instant::now();
        let bundle = match self.forecasts.fetch(store, epoch.token()).await {
            Ok(bundle) => bundle,
            Err(e) if e.is_cancellation() => return,
            Err(e) => {
                warn!(store, error = %e, "Forecast load failed");
                self.update(&self.store_scope, &epoch, |st| {
                    st.loading_forecast = false;
                    st.loading_insight = false;
                    st.summary.clear();
                    st.error = Some(format!("Failed to load forecast: {}", e));
                });
                return;
            }
        };
        if !self.store_scope.is_current(&epoch) {
            return;
        }
        self.eta.record(EtaKind::Forecast, started.elapsed()).await;

        let applied = self.update(&self.store_scope, &epoch, |st| {
            st.history = bundle.history;
            st.forecast = bundle.forecast;
            st.timeline = bundle.timeline;
            st.loading_forecast = false;
        });
        if !applied {
            return;
        }

        // 2. Total explanation
        self.run_total_insight(epoch.clone()).await;
        if !self.store_scope.is_current(&epoch) {
            return;
        }

        // 3. Category insight when that view is showing
        let view = self.state.lock().view;
        if view == ChartView::Category {
            self.load_category_insight().await;
        }
    }

    async fn run_total_insight(&self, epoch: Epoch) {
        let (timeline, options) = {
            let mut st = self.state.lock();
            st.loading_insight = true;
            (st.timeline.clone(), st.options)
        };

        let started = Instant::now();
        let result = self.client.fetch_explanation(&timeline, None, &options, epoch.token()).await;
        let summary = match result {
            Ok(r) => r.summary,
            Err(e) if e.is_cancellation() => return,
            Err(e) => {
                // Degrades to the local fallback report.
                warn!(error = %e, "Explanation failed");
                String::new()
            }
        };
        if !self.store_scope.is_current(&epoch) {
            return;
        }
        self.eta.record(EtaKind::Insight, started.elapsed()).await;

        self.update(&self.store_scope, &epoch, |st| {
            st.summary = summary;
            st.loading_insight = false;
        });
    }

    /// Explain one clicked point. The popup shows "Analyzing…" until the answer arrives.
    pub async fn select_point(&self, point: TimePoint) {
        let epoch = self.point_scope.begin();
        let timeline = {
            let mut st = self.state.lock();
            st.popup = Some(PointPopup { point: point.clone(), insight: PointInsight::Analyzing });
            st.timeline.clone()
        };

        // Point requests carry no style hints; the popup shows the raw answer.
        let result = self
            .client
            .fetch_explanation(&timeline, Some(&point), &ExplainOptions::default(), epoch.token())
            .await;
        let insight = match result {
            Ok(r) if !r.summary.trim().is_empty() => PointInsight::Ready(r.summary),
            Ok(_) => PointInsight::Empty,
            Err(e) if e.is_cancellation() => return,
            Err(e) => {
                warn!(date = %point.date, error = %e, "Point explanation failed");
                PointInsight::Failed
            }
        };

        self.update(&self.point_scope, &epoch, |st| {
            if let Some(popup) = st.popup.as_mut() {
                popup.insight = insight;
            }
        });
    }

    pub fn close_point_popup(&self) {
        self.point_scope.invalidate();
        self.state.lock().popup = None;
    }

    /// Switch between the total and category charts. Entering the category view requests the
    /// category insight; the total explanation is kept in state and not fetched again.
    pub async fn toggle_view(&self) {
        self.category_scope.invalidate();
        let view = {
            let mut st = self.state.lock();
            st.view = st.view.toggled();
            st.category_insight = None;
            st.loading_category = false;
            st.view
        };
        if view == ChartView::Category {
            self.load_category_insight().await;
        }
    }

    /// Options apply to local rendering immediately; the server only sees them on the next
    /// request.
    pub fn set_options(&self, options: ExplainOptions) {
        self.state.lock().options = options;
    }

    /// Ask again for the insight of the active view, using the current options as hints.
    pub async fn regenerate_insight(&self) {
        let (view, busy, has_store) = {
            let st = self.state.lock();
            (st.view, st.loading_forecast, st.store.is_some())
        };
        if !has_store || busy {
            return;
        }
        match view {
            ChartView::Total => {
                let epoch = self.store_scope.begin();
                self.run_total_insight(epoch).await;
            }
            ChartView::Category => self.load_category_insight().await,
        }
    }

    async fn load_category_insight(&self) {
        let epoch = self.category_scope.begin();
        let breakdown = {
            let mut st = self.state.lock();
            let breakdown = build_breakdown(&st.history, self.category_top_n, st.store);
            st.loading_category = breakdown.is_some();
            breakdown
        };
        let Some(breakdown) = breakdown else {
            return;
        };

        // Only cancellation comes back as an error, and then a newer request owns the state.
        let transport = self.client.transport();
        if let Ok(insight) = category_insight(transport.as_ref(), &breakdown.payload, epoch.token()).await {
            self.update(&self.category_scope, &epoch, |st| {
                st.category_insight = Some(insight);
                st.loading_category = false;
            });
        }
    }

    pub fn category_breakdown(&self) -> Option<CategoryBreakdown> {
        let st = self.state.lock();
        build_breakdown(&st.history, self.category_top_n, st.store)
    }

    /// What-if projection over the latest month's categories.
    pub fn what_if(&self, deltas: &HashMap<String, f64>) -> Option<WhatIfProjection> {
        self.category_breakdown()
            .map(|b| project_what_if(&b.payload.categories, deltas))
    }

    /// Text for the insight panel of the active view.
    ///
    /// Total view: the explanation reshaped to the selected style and level, or the local
    /// fallback report when the service returned nothing.
    pub fn insight_text(&self) -> String {
        let st = self.state.lock();
        match st.view {
            ChartView::Category => st
                .category_insight
                .as_ref()
                .map(|c| c.text.clone())
                .unwrap_or_default(),
            ChartView::Total => {
                if !st.summary.trim().is_empty() {
                    apply_style_and_level(&st.summary, st.options.style_or_default(), st.options.level_or_default())
                } else if st.loading_insight {
                    String::new()
                } else {
                    build_fallback_insight(&st.timeline)
                }
            }
        }
    }

    /// First forecast value, for the headline card.
    pub fn forecast_value(&self) -> Option<f64> {
        self.state.lock().forecast.first().map(|p| p.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::fetcher::category::CATEGORY_INSIGHT_PATH;
    use crate::fetcher::explain::EXPLAIN_PATH;
    use crate::fetcher::mock::{MockReply, MockTransport};
    use serde_json::json;
    use std::time::Duration;

    fn forecast_body() -> serde_json::Value {
        json!({
            "history": [
                { "date": "2023-07-01", "total_sales": 100, "categories": { "WINE": 60, "BEER": 40 } },
                { "date": "2023-08-01", "total_sales": 120, "categories": { "WINE": 80, "BEER": 40, "Total": 120 } }
            ],
            "forecast": [{ "date": "2023-09", "sales": 130 }]
        })
    }

    async fn dashboard(mock: MockTransport) -> (Dashboard, Arc<MockTransport>) {
        let mock = Arc::new(mock);
        let client = Arc::new(InsightClient::new(mock.clone(), Duration::from_secs(300)));
        let pool = db::init_memory().await.unwrap();
        (Dashboard::new(client, pool, 12), mock)
    }

    #[tokio::test]
    async fn test_select_store_loads_forecast_and_summary() {
        let (dash, mock) = dashboard(
            MockTransport::new()
                .with_reply("GET", "forecast/1", MockReply::json(forecast_body()))
                .with_reply("POST", EXPLAIN_PATH, MockReply::json(json!({ "summary": "Sales increased to $12,345.67 (actual)." }))),
        )
        .await;

        dash.select_store(Some(1)).await;
        let st = dash.state();
        assert_eq!(st.store, Some(1));
        assert_eq!(st.timeline.len(), 3);
        assert!(!st.loading_forecast && !st.loading_insight);
        assert_eq!(dash.forecast_value(), Some(130.0));
        assert_eq!(dash.insight_text(), "Sales increased to $12,346.");

        // Initial explanation carries the selected options as hints.
        let call = mock.calls().into_iter().find(|c| c.path == EXPLAIN_PATH).unwrap();
        assert_eq!(call.query[0], ("style".to_string(), "narrative".to_string()));
    }

    #[tokio::test]
    async fn test_empty_summary_uses_fallback_report() {
        let (dash, _) = dashboard(
            MockTransport::new()
                .with_reply("GET", "forecast/1", MockReply::json(json!({ "history": [
                    { "date": "2023-07-01", "total_sales": 100 },
                    { "date": "2023-08-01", "total_sales": 120 }
                ] })))
                .with_reply("POST", EXPLAIN_PATH, MockReply::status(500, json!({ "error": "boom" }))),
        )
        .await;

        dash.select_store(Some(1)).await;
        let text = dash.insight_text();
        assert!(text.contains("+20.0%"));
        assert!(text.contains("Year over year: not available"));
        assert!(dash.state().error.is_none());
    }

    #[tokio::test]
    async fn test_forecast_failure_sets_error() {
        let (dash, _) = dashboard(MockTransport::new().with_reply("GET", "forecast/2", MockReply::status(404, json!("missing")))).await;
        dash.select_store(Some(2)).await;
        let st = dash.state();
        assert!(st.error.as_deref().unwrap().starts_with("Failed to load forecast"));
        assert!(!st.loading_forecast && !st.loading_insight);
    }

    #[tokio::test]
    async fn test_newer_store_selection_wins() {
        let (dash, _) = dashboard(
            MockTransport::new()
                .with_route_latency("GET", "forecast/1", Duration::from_millis(500))
                .with_route_latency("GET", "forecast/2", Duration::from_millis(100))
                .with_reply("GET", "forecast/1", MockReply::json(json!({ "history": [{ "date": "2023-01-01", "total_sales": 1 }] })))
                .with_reply("GET", "forecast/2", MockReply::json(json!({ "history": [{ "date": "2023-02-01", "total_sales": 2 }] })))
                .with_reply("POST", EXPLAIN_PATH, MockReply::json(json!("ok"))),
        )
        .await;
        // The pool must exist before the clock stops, or its acquire timeout fires.
        tokio::time::pause();

        tokio::join!(dash.select_store(Some(1)), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            dash.select_store(Some(2)).await;
        });

        let st = dash.state();
        assert_eq!(st.store, Some(2));
        assert_eq!(st.timeline, vec![TimePoint::actual("2023-02-01", 2.0)]);
    }

    #[tokio::test]
    async fn test_clearing_selection_resets_state() {
        let (dash, _) = dashboard(
            MockTransport::new()
                .with_reply("GET", "forecast/1", MockReply::json(forecast_body()))
                .with_reply("POST", EXPLAIN_PATH, MockReply::json(json!("ok"))),
        )
        .await;
        dash.select_store(Some(1)).await;
        dash.select_store(None).await;
        let st = dash.state();
        assert_eq!(st.store, None);
        assert!(st.timeline.is_empty() && st.summary.is_empty());
    }

    #[tokio::test]
    async fn test_point_popup_lifecycle() {
        let (dash, mock) = dashboard(
            MockTransport::new()
                .with_reply("GET", "forecast/1", MockReply::json(forecast_body()))
                .with_reply("POST", EXPLAIN_PATH, MockReply::json(json!("total")))
                .with_reply("POST", EXPLAIN_PATH, MockReply::json(json!(""))),
        )
        .await;
        dash.select_store(Some(1)).await;

        let point = TimePoint::actual("2023-08-01", 120.0);
        dash.select_point(point.clone()).await;
        let popup = dash.state().popup.unwrap();
        assert_eq!(popup.point, point);
        assert_eq!(popup.insight.text(), "No insight available.");

        let focus_call = mock.calls().into_iter().filter(|c| c.path == EXPLAIN_PATH).last().unwrap();
        assert_eq!(focus_call.body.unwrap()["focus"]["date"], "2023-08-01");

        dash.close_point_popup();
        assert!(dash.state().popup.is_none());
    }

    #[tokio::test]
    async fn test_point_failure_message() {
        let (dash, _) = dashboard(
            MockTransport::new()
                .with_reply("GET", "forecast/1", MockReply::json(forecast_body()))
                .with_reply("POST", EXPLAIN_PATH, MockReply::json(json!("total")))
                .with_reply("POST", EXPLAIN_PATH, MockReply::fail("offline")),
        )
        .await;
        dash.select_store(Some(1)).await;
        dash.select_point(TimePoint::actual("2023-08-01", 120.0)).await;
        let popup = dash.state().popup.unwrap();
        assert_eq!(popup.insight, PointInsight::Failed);
        assert_eq!(popup.insight.text(), "Failed to fetch insight.");
    }

    #[tokio::test]
    async fn test_point_without_timeline_skips_network() {
        let (dash, mock) = dashboard(MockTransport::new()).await;
        dash.select_point(TimePoint::actual("2023-08-01", 1.0)).await;
        assert_eq!(dash.state().popup.unwrap().insight, PointInsight::Empty);
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_closing_popup_discards_late_answer() {
        let (dash, _) = dashboard(
            MockTransport::new()
                .with_route_latency("POST", EXPLAIN_PATH, Duration::from_millis(200))
                .with_reply("GET", "forecast/1", MockReply::json(forecast_body()))
                .with_reply("POST", EXPLAIN_PATH, MockReply::json(json!("answer"))),
        )
        .await;
        tokio::time::pause();
        dash.select_store(Some(1)).await;

        let point = TimePoint::actual("2023-07-01", 100.0);
        tokio::join!(dash.select_point(point), async {
            tokio::task::yield_now().await;
            dash.close_point_popup();
        });
        assert!(dash.state().popup.is_none());
    }

    async fn wait_for_calls(mock: &MockTransport, path: &str, n: usize) {
        while mock.call_count(path) < n {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    #[tokio::test]
    async fn test_regenerate_while_loading_settles_insight() {
        let (dash, mock) = dashboard(
            MockTransport::new()
                .with_route_latency("POST", EXPLAIN_PATH, Duration::from_millis(200))
                .with_reply("GET", "forecast/1", MockReply::json(forecast_body()))
                .with_reply("POST", EXPLAIN_PATH, MockReply::json(json!("Sales rose."))),
        )
        .await;
        tokio::time::pause();

        tokio::join!(dash.select_store(Some(1)), async {
            wait_for_calls(&mock, EXPLAIN_PATH, 1).await;
            dash.regenerate_insight().await;
        });

        let st = dash.state();
        assert!(!st.loading_insight);
        assert_eq!(st.summary, "Sales rose.");
        assert_eq!(dash.insight_text(), "Sales rose.");
        assert_eq!(mock.call_count(EXPLAIN_PATH), 2);
    }

    #[tokio::test]
    async fn test_clicking_point_twice_settles_popup() {
        let (dash, mock) = dashboard(
            MockTransport::new()
                .with_route_latency("POST", EXPLAIN_PATH, Duration::from_millis(200))
                .with_reply("GET", "forecast/1", MockReply::json(forecast_body()))
                .with_reply("POST", EXPLAIN_PATH, MockReply::json(json!("July dipped."))),
        )
        .await;
        tokio::time::pause();
        dash.select_store(Some(1)).await;

        let point = TimePoint::actual("2023-07-01", 100.0);
        tokio::join!(dash.select_point(point.clone()), async {
            wait_for_calls(&mock, EXPLAIN_PATH, 2).await;
            dash.select_point(point.clone()).await;
        });

        let popup = dash.state().popup.unwrap();
        assert_eq!(popup.insight, PointInsight::Ready("July dipped.".to_string()));
        assert_eq!(mock.call_count(EXPLAIN_PATH), 3);
    }

    #[tokio::test]
    async fn test_toggle_view_loads_category_insight() {
        let (dash, mock) = dashboard(
            MockTransport::new()
                .with_reply("GET", "forecast/1", MockReply::json(forecast_body()))
                .with_reply("POST", EXPLAIN_PATH, MockReply::json(json!("total")))
                .with_reply("POST", CATEGORY_INSIGHT_PATH, MockReply::json(json!({ "text": "Wine leads." }))),
        )
        .await;
        dash.select_store(Some(1)).await;

        dash.toggle_view().await;
        assert_eq!(dash.state().view, ChartView::Category);
        assert_eq!(dash.insight_text(), "Wine leads.");

        let body = mock.calls().into_iter().find(|c| c.path == CATEGORY_INSIGHT_PATH).unwrap().body.unwrap();
        assert_eq!(body["month"], "2023-08");
        assert_eq!(body["categories"][0]["name"], "WINE");

        // Back to total: served from state, no new explanation call.
        dash.toggle_view().await;
        assert_eq!(dash.insight_text(), "total.");
        assert_eq!(mock.call_count(EXPLAIN_PATH), 1);
    }

    #[tokio::test]
    async fn test_set_options_and_regenerate() {
        let (dash, mock) = dashboard(
            MockTransport::new()
                .with_reply("GET", "forecast/1", MockReply::json(forecast_body()))
                .with_reply("POST", EXPLAIN_PATH, MockReply::json(json!("Sales rose.\nNext actions:\nReview staffing."))),
        )
        .await;
        dash.select_store(Some(1)).await;

        let opts = ExplainOptions::new(ExplainStyle::Actions, ReadingLevel::Pro);
        dash.set_options(opts);
        assert_eq!(dash.insight_text(), "- Review staffing.");

        dash.regenerate_insight().await;
        assert_eq!(mock.call_count(EXPLAIN_PATH), 2);
        let last = mock.calls().into_iter().filter(|c| c.path == EXPLAIN_PATH).last().unwrap();
        assert_eq!(last.query[1], ("level".to_string(), "pro".to_string()));
    }

    #[tokio::test]
    async fn test_what_if_over_latest_month() {
        let (dash, _) = dashboard(
            MockTransport::new()
                .with_reply("GET", "forecast/1", MockReply::json(forecast_body()))
                .with_reply("POST", EXPLAIN_PATH, MockReply::json(json!("ok"))),
        )
        .await;
        dash.select_store(Some(1)).await;
        let p = dash.what_if(&HashMap::from([("BEER".to_string(), -50.0)])).unwrap();
        assert_eq!(p.total, 120.0);
        assert_eq!(p.total_what_if, 100.0);
    }
}
