use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use store_insights_lib::core::epoch::Generation;
use store_insights_lib::db;
use store_insights_lib::fetcher::explain::EXPLAIN_PATH;
use store_insights_lib::fetcher::mock::{MockReply, MockTransport};
use store_insights_lib::llm::options::{ExplainOptions, ExplainStyle, ReadingLevel};
use store_insights_lib::models::TimePoint;
use store_insights_lib::{AppConfig, AppState, InsightClient, InsightError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

fn timeline() -> Vec<TimePoint> {
    vec![
        TimePoint::actual("2023-07-01", 100.0),
        TimePoint::actual("2023-08-01", 120.0),
        TimePoint::forecast("2023-09-01", 130.0),
    ]
}

fn client(mock: &Arc<MockTransport>) -> InsightClient {
    InsightClient::new(mock.clone(), Duration::from_secs(5 * 60))
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_identical_requests_share_one_call() {
    let mock = Arc::new(
        MockTransport::new()
            .with_latency(Duration::from_millis(300))
            .with_reply("POST", EXPLAIN_PATH, MockReply::json(json!({ "summary": "Sales are rising." }))),
    );
    let client = client(&mock);
    let tl = timeline();
    let opts = ExplainOptions::new(ExplainStyle::Bullets, ReadingLevel::Simple);
    let cancel = CancellationToken::new();

    let (a, b) = tokio::join!(
        client.fetch_explanation(&tl, None, &opts, &cancel),
        client.fetch_explanation(&tl, None, &opts, &cancel),
    );
    assert_eq!(a.unwrap().summary, "Sales are rising.");
    assert_eq!(b.unwrap().summary, "Sales are rising.");
    assert_eq!(mock.call_count(EXPLAIN_PATH), 1);
    assert!(client.inflight().is_empty());

    // Within the TTL the cache answers.
    tokio::time::advance(Duration::from_secs(4 * 60)).await;
    let cached = client.fetch_explanation(&tl, None, &opts, &cancel).await.unwrap();
    assert!(cached.from_cache);
    assert_eq!(mock.call_count(EXPLAIN_PATH), 1);

    // Reads do not extend the entry; past five minutes from the store it is gone.
    tokio::time::advance(Duration::from_secs(61)).await;
    let refreshed = client.fetch_explanation(&tl, None, &opts, &cancel).await.unwrap();
    assert!(!refreshed.from_cache);
    assert_eq!(mock.call_count(EXPLAIN_PATH), 2);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_hint_controls_the_single_retry() {
    let mock = Arc::new(
        MockTransport::new()
            .with_reply("POST", EXPLAIN_PATH, MockReply::status(429, json!({ "error": { "message": "Rate limit reached. Please try again in 2.5s." } })))
            .with_reply("POST", EXPLAIN_PATH, MockReply::json(json!("Recovered."))),
    );
    let client = client(&mock);

    let started = Instant::now();
    let out = client
        .fetch_explanation(&timeline(), None, &ExplainOptions::default(), &CancellationToken::new())
        .await
        .unwrap();
    let waited = started.elapsed();

    assert_eq!(out.summary, "Recovered.");
    assert_eq!(mock.call_count(EXPLAIN_PATH), 2);
    assert!(waited >= Duration::from_millis(2500), "waited {:?}", waited);
    assert!(waited < Duration::from_millis(2600), "waited {:?}", waited);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_backoff_leaves_cache_empty() {
    let mock = Arc::new(MockTransport::new().with_reply("POST", EXPLAIN_PATH, MockReply::status(429, json!({ "error": "rate limit" }))));
    let client = Arc::new(client(&mock));
    let cancel = CancellationToken::new();

    let task = {
        let client = client.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            client
                .fetch_explanation(&timeline(), None, &ExplainOptions::default(), &cancel)
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(500)).await;
    cancel.cancel();

    let err = task.await.unwrap().unwrap_err();
    assert!(matches!(err, InsightError::Cancelled));
    assert_eq!(mock.call_count(EXPLAIN_PATH), 1);
    assert!(client.cache().is_empty());
    assert!(client.inflight().is_empty());
}

#[tokio::test]
async fn test_empty_timeline_makes_no_call() {
    let mock = Arc::new(MockTransport::new());
    let client = client(&mock);
    let out = client
        .fetch_explanation_raw(&[json!({ "date": "", "value": 5 })], None, &ExplainOptions::default(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(out.summary, "");
    assert!(mock.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_older_response_is_discarded() {
    let scope = Arc::new(Generation::new("store"));

    let slow = {
        let scope = scope.clone();
        tokio::spawn(async move {
            scope
                .guard(|_| async {
                    tokio::time::sleep(Duration::from_millis(400)).await;
                    "A"
                })
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    let fast = scope
        .guard(|_| async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            "B"
        })
        .await;

    assert_eq!(fast, Some("B"));
    assert_eq!(slow.await.unwrap(), None);
}

#[tokio::test]
async fn test_dashboard_store_switch_end_to_end() {
    let mock = Arc::new(
        MockTransport::new()
            .with_reply("GET", "forecast/1", MockReply::json(json!({
                "history": [{ "date": "2023-07-01", "total_sales": 100 }, { "date": "2023-08-01", "total_sales": 120 }],
                "forecast": { "date": "2023-09", "sales": 125 }
            })))
            .with_reply("POST", EXPLAIN_PATH, MockReply::status(503, json!("down"))),
    );
    let pool = db::init_memory().await.unwrap();
    let state = AppState::with_transport(AppConfig::default(), pool, mock.clone());

    state.dashboard.select_store(Some(1)).await;
    let st = state.dashboard.state();
    assert_eq!(st.timeline.len(), 3);
    assert_eq!(st.timeline[2].date, "2023-09-01");
    assert!(st.summary.is_empty());
    assert!(!st.loading_insight);
    assert_eq!(state.dashboard.forecast_value(), Some(125.0));

    // The failed explanation degrades to the local report.
    let text = state.dashboard.insight_text();
    assert!(text.starts_with("- Latest (Sep 2023, forecast): $125."));
    assert!(text.contains("- Month over month: up $5 (+4.2%) vs Aug 2023."));

    state.dashboard.select_store(None).await;
    assert!(state.dashboard.state().timeline.is_empty());
    assert_eq!(state.dashboard.insight_text(), "");
}
