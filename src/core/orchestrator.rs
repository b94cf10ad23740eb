use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use crate::config::AppConfig;
use crate::core::cache::{InFlightRegistry, ResponseCache, Slot};
use crate::core::timeseries::{normalize_focus, normalize_timeline};
use crate::error::{InsightError, Result};
use crate::fetcher::explain::request_explanation;
use crate::fetcher::http::HttpTransport;
use crate::fetcher::ApiTransport;
use crate::llm::options::ExplainOptions;
use crate::llm::payload::ExplainRequestPayload;
use crate::models::{ExplainResult, TimePoint};

/// Explanation service: payload normalization, TTL cache, request coalescing and the retrying
/// transport behind one entry point.
///
/// Construct one per application and share it (`Arc<InsightClient>`). Tests build isolated
/// instances over a mock transport.
pub struct InsightClient {
    transport: Arc<dyn ApiTransport>,
    cache: ResponseCache,
    inflight: InFlightRegistry,
}

impl InsightClient {
    pub fn new(transport: Arc<dyn ApiTransport>, cache_ttl: Duration) -> Self {
        Self {
            transport,
            cache: ResponseCache::new(cache_ttl),
            inflight: InFlightRegistry::new(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let transport = Arc::new(HttpTransport::new(config.api_base.clone(), config.request_timeout));
        Self::new(transport, config.explain_cache_ttl)
    }

    pub fn transport(&self) -> Arc<dyn ApiTransport> {
        self.transport.clone()
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn inflight(&self) -> &InFlightRegistry {
        &self.inflight
    }

    /// Explain a timeline, optionally focused on one point.
    ///
    /// 1. Empty normalized timeline: empty summary, no network.
    /// 2. Fresh cache entry: returned with `from_cache`.
    /// 3. Identical request already in flight: wait for its outcome.
    /// 4. Otherwise lead the request; cache the summary on success.
    pub async fn fetch_explanation(
        &self,
        timeline: &[TimePoint],
        focus: Option<&TimePoint>,
        options: &ExplainOptions,
        cancel: &CancellationToken,
    ) -> Result<ExplainResult> {
        let payload = ExplainRequestPayload::build(timeline, focus, options);
        self.fetch_payload(payload, cancel).await
    }

    /// Same as [`fetch_explanation`](Self::fetch_explanation) for raw upstream JSON points.
    pub async fn fetch_explanation_raw(
        &self,
        timeline: &[Value],
        focus: Option<&Value>,
        options: &ExplainOptions,
        cancel: &CancellationToken,
    ) -> Result<ExplainResult> {
        let points = normalize_timeline(timeline);
        let focus = focus.and_then(normalize_focus);
        self.fetch_explanation(&points, focus.as_ref(), options, cancel).await
    }

    async fn fetch_payload(&self, payload: ExplainRequestPayload, cancel: &CancellationToken) -> Result<ExplainResult> {
        if payload.is_empty() {
            return Ok(ExplainResult::default());
        }

        let key = payload.cache_key()?;

        loop {
            if let Some(summary) = self.cache.get(&key) {
                debug!(points = payload.timeline.len(), "Explanation cache hit");
                return Ok(ExplainResult { summary, from_cache: true });
            }

            let guard = match self.inflight.join(&key) {
                Slot::Leader(guard) => guard,
                Slot::Follower(follower) => {
                    debug!("Coalescing onto in-flight explanation request");
                    let outcome = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(InsightError::Cancelled),
                        outcome = follower.wait() => outcome,
                    };
                    match outcome {
                        // The leader was abandoned while this caller still wants the answer.
                        Err(e) if e.is_cancellation() && !cancel.is_cancelled() => {
                            debug!("In-flight leader was cancelled, requesting again");
                            continue;
                        }
                        other => return other.map(|summary| ExplainResult { summary, from_cache: false }),
                    }
                }
            };

            // A leader that settled between the cache read and `join` has already stored its answer.
            if let Some(summary) = self.cache.get(&key) {
                guard.complete(Ok(summary.clone()));
                return Ok(ExplainResult { summary, from_cache: true });
            }

            info!(points = payload.timeline.len(), focus = payload.focus.is_some(), "Requesting explanation");
            let outcome = request_explanation(self.transport.as_ref(), &payload, cancel).await;
            if let Ok(summary) = &outcome {
                self.cache.insert(key.clone(), summary.clone());
            }
            guard.complete(outcome.clone());
            return outcome.map(|summary| ExplainResult { summary, from_cache: false });
        }
    }
}
