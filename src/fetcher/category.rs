use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use super::ApiTransport;
use crate::analysis::category::{summarize_categories, CategoryInsightPayload};
use crate::error::{InsightError, Result};

pub const CATEGORY_INSIGHT_PATH: &str = "insights/category-breakdown";

const TEXT_FIELDS: [&str; 4] = ["text", "summary", "insight", "message"];

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CategoryInsight {
    pub text: String,
    /// Built locally because the endpoint failed or returned no text.
    pub fallback: bool,
}

/// POST the breakdown and read the first non-empty text field. The status code is not checked:
/// an error body simply has no text.
pub async fn request_category_insight(
    transport: &dyn ApiTransport,
    payload: &CategoryInsightPayload,
    cancel: &CancellationToken,
) -> Result<String> {
    let body = serde_json::to_value(payload)?;
    let resp = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(InsightError::Cancelled),
        r = transport.post_json(CATEGORY_INSIGHT_PATH, &[], &body) => r?,
    };
    debug!(status = resp.status, "Category insight received");
    Ok(extract_text(resp.body.as_ref()))
}

pub fn extract_text(body: Option<&Value>) -> String {
    body.and_then(|b| {
        TEXT_FIELDS
            .iter()
            .filter_map(|f| b.get(*f).and_then(Value::as_str))
            .find(|s| !s.is_empty())
    })
    .unwrap_or_default()
    .to_string()
}

/// Remote insight with the local summary as fallback. Only cancellation is surfaced as an error.
pub async fn category_insight(
    transport: &dyn ApiTransport,
    payload: &CategoryInsightPayload,
    cancel: &CancellationToken,
) -> Result<CategoryInsight> {
    match request_category_insight(transport, payload, cancel).await {
        Ok(text) if !text.is_empty() => Ok(CategoryInsight { text, fallback: false }),
        Ok(_) => Ok(CategoryInsight { text: summarize_categories(payload), fallback: true }),
        Err(e) if e.is_cancellation() => Err(e),
        Err(e) => {
            warn!(error = %e, "Category insight failed, using local summary");
            Ok(CategoryInsight { text: summarize_categories(payload), fallback: true })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::category::{CategoryTotals, CategoryValue};
    use crate::fetcher::mock::{MockReply, MockTransport};
    use serde_json::json;

    fn payload() -> CategoryInsightPayload {
        CategoryInsightPayload {
            store_id: Some(3),
            month: "2023-08".into(),
            top_n: 12,
            totals: CategoryTotals { grand_total: 100.0, top_total: 100.0, other_total: 0.0 },
            categories: vec![CategoryValue { name: "WINE".into(), value: 100.0 }],
            prev_categories: None,
        }
    }

    #[test]
    fn test_extract_text_priority() {
        assert_eq!(extract_text(Some(&json!({ "summary": "s", "text": "t" }))), "t");
        assert_eq!(extract_text(Some(&json!({ "text": "", "insight": "i" }))), "i");
        assert_eq!(extract_text(Some(&json!({ "message": "m" }))), "m");
        assert_eq!(extract_text(Some(&json!({ "error": "e" }))), "");
        assert_eq!(extract_text(None), "");
    }

    #[tokio::test]
    async fn test_remote_text_used() {
        let mock = MockTransport::new().with_reply("POST", CATEGORY_INSIGHT_PATH, MockReply::json(json!({ "text": "* Wine leads" })));
        let out = category_insight(&mock, &payload(), &CancellationToken::new()).await.unwrap();
        assert_eq!(out, CategoryInsight { text: "* Wine leads".into(), fallback: false });

        let sent = mock.calls()[0].body.clone().unwrap();
        assert_eq!(sent["store_id"], 3);
        assert_eq!(sent["totals"]["grand_total"], 100.0);
        assert!(sent["prev_categories"].is_null());
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_local_summary() {
        let mock = MockTransport::new().with_reply("POST", CATEGORY_INSIGHT_PATH, MockReply::fail("offline"));
        let out = category_insight(&mock, &payload(), &CancellationToken::new()).await.unwrap();
        assert!(out.fallback);
        assert!(out.text.starts_with("Category breakdown for 2023-08."));
    }

    #[tokio::test]
    async fn test_cancelled_is_not_masked() {
        let mock = MockTransport::new().with_reply("POST", CATEGORY_INSIGHT_PATH, MockReply::json(json!({ "text": "x" })));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = category_insight(&mock, &payload(), &cancel).await.unwrap_err();
        assert!(matches!(err, InsightError::Cancelled));
    }
}
