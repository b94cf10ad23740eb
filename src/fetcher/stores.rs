use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use super::ApiTransport;
use crate::analysis::statistics::{EtaKind, EtaTracker};
use crate::config::StoreQuery;
use crate::db;
use crate::error::{InsightError, Result};
use crate::models::{StoreId, StoreListing, StoreOption};

pub const STORES_PATH: &str = "stores";
pub const STORES_CACHE_KEY: &str = "storesCache:v3";

/// Persisted store list. `ts` is milliseconds since the Unix epoch.
#[derive(Debug, Serialize, Deserialize)]
struct CachedStores {
    data: Vec<StoreOption>,
    ts: i64,
}

/// Store dropdown source: a persisted list that is shown immediately while fresh, refreshed
/// from `GET stores`.
pub struct StoreDirectory {
    transport: Arc<dyn ApiTransport>,
    pool: SqlitePool,
    query: StoreQuery,
    ttl: Duration,
    eta: EtaTracker,
}

impl StoreDirectory {
    pub fn new(transport: Arc<dyn ApiTransport>, pool: SqlitePool, query: StoreQuery, ttl: Duration) -> Self {
        Self {
            transport,
            eta: EtaTracker::new(pool.clone()),
            pool,
            query,
            ttl,
        }
    }

    pub fn eta(&self) -> &EtaTracker {
        &self.eta
    }

    /// The persisted list if it is younger than the TTL. Unreadable or corrupt entries are misses.
    pub async fn cached(&self) -> Option<Vec<StoreOption>> {
        let raw = match db::get_setting(&self.pool, STORES_CACHE_KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "Store cache read failed");
                return None;
            }
        };
        let cached: CachedStores = match serde_json::from_str(&raw) {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Ignoring corrupt store cache");
                return None;
            }
        };
        if cached.ts <= 0 {
            return None;
        }
        let age_ms = Utc::now().timestamp_millis() - cached.ts;
        if age_ms < self.ttl.as_millis() as i64 {
            debug!(stores = cached.data.len(), age_ms, "Store cache hit");
            Some(cached.data)
        } else {
            None
        }
    }

    async fn write_cache(&self, stores: &[StoreOption]) {
        let entry = CachedStores { data: stores.to_vec(), ts: Utc::now().timestamp_millis() };
        let result = match serde_json::to_string(&entry) {
            Ok(json) => db::save_setting(&self.pool, STORES_CACHE_KEY, &json).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            warn!(error = %e, "Store cache write failed");
        }
    }

    /// `GET stores` with the given filters. The elapsed time feeds the load ETA whether or not
    /// the call succeeds.
    pub async fn fetch_remote(&self, query: &StoreQuery) -> Result<Vec<StoreOption>> {
        let started = Instant::now();
        let outcome = self.fetch_remote_inner(query).await;
        self.eta.record(EtaKind::Stores, started.elapsed()).await;
        outcome
    }

    async fn fetch_remote_inner(&self, query: &StoreQuery) -> Result<Vec<StoreOption>> {
        let resp = self.transport.get_json(STORES_PATH, &store_query_params(query)).await?;
        if !resp.is_success() {
            return Err(InsightError::Status { status: resp.status, body: resp.body_text() });
        }
        let body = resp
            .body
            .ok_or_else(|| InsightError::Transport("stores: response was not JSON".to_string()))?;
        Ok(parse_store_list(&body))
    }

    /// Initial load: a fresh persisted list is shown while a refresh runs; the refresh result
    /// replaces it when it succeeds.
    pub async fn load(&self) -> StoreListing {
        let cached = self.cached().await;
        self.refresh(cached).await
    }

    /// Manual retry after a failed refresh.
    pub async fn retry_refresh(&self) -> StoreListing {
        let cached = self.cached().await.unwrap_or_default();
        self.refresh(Some(cached)).await
    }

    async fn refresh(&self, shown: Option<Vec<StoreOption>>) -> StoreListing {
        match self.fetch_remote(&self.query).await {
            Ok(stores) => {
                info!(stores = stores.len(), "Store list refreshed");
                self.write_cache(&stores).await;
                StoreListing { stores, from_cache: false, warning: None }
            }
            Err(e) => match shown {
                Some(stores) => {
                    warn!(error = %e, "Store refresh failed, keeping cached list");
                    StoreListing {
                        stores,
                        from_cache: true,
                        warning: Some(format!("Refresh failed; showing cached list. ({})", e)),
                    }
                }
                None => {
                    warn!(error = %e, "Store list unavailable");
                    StoreListing {
                        stores: Vec::new(),
                        from_cache: false,
                        warning: Some(format!("Failed to load stores. ({})", e)),
                    }
                }
            },
        }
    }
}

pub fn store_query_params(query: &StoreQuery) -> Vec<(String, String)> {
    let mut params = vec![
        ("min_year".to_string(), query.min_year.to_string()),
        ("min_points".to_string(), query.min_points.to_string()),
    ];
    if let Some(month) = &query.must_have_month {
        params.push(("must_have_month".to_string(), month.clone()));
    }
    params
}

/// The list is either the body itself or its `stores` field. Entries without a usable id are
/// skipped.
pub fn parse_store_list(body: &Value) -> Vec<StoreOption> {
    let items = match body {
        Value::Array(items) => items.as_slice(),
        other => other.get("stores").and_then(Value::as_array).map(Vec::as_slice).unwrap_or_default(),
    };
    items.iter().filter_map(parse_store_option).collect()
}

fn parse_store_option(raw: &Value) -> Option<StoreOption> {
    let id_value = match raw {
        Value::Object(_) => ["value", "store_id", "id"].iter().find_map(|k| raw.get(*k).filter(|v| !v.is_null()))?,
        other => other,
    };
    let value: StoreId = match id_value {
        Value::Number(n) => n.as_u64().and_then(|v| StoreId::try_from(v).ok())?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    let label = raw
        .get("label")
        .or_else(|| raw.get("name"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("Store {}", value));
    Some(StoreOption { value, label })
}
