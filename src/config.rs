//! Runtime configuration, read from the environment (and `.env` when present).

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_API_BASE: &str = "http://localhost:5000/api";

/// Query sent to `/stores`.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreQuery {
    pub min_year: i32,
    pub min_points: u32,
    pub must_have_month: Option<String>,
}

impl Default for StoreQuery {
    fn default() -> Self {
        Self {
            min_year: 2023,
            min_points: 1,
            must_have_month: Some("2023-08".to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_base: String,
    pub db_path: PathBuf,
    pub explain_cache_ttl: Duration,
    pub stores_cache_ttl: Duration,
    pub store_query: StoreQuery,
    pub category_top_n: usize,
    pub request_timeout: Option<Duration>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            db_path: PathBuf::from("./data/insights.db"),
            explain_cache_ttl: Duration::from_secs(5 * 60),
            stores_cache_ttl: Duration::from_secs(6 * 60 * 60),
            store_query: StoreQuery::default(),
            category_top_n: 12,
            request_timeout: None,
        }
    }
}

impl AppConfig {
    /// Load `.env` (if any) and overlay environment variables on the defaults.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Unparsable values keep their default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = AppConfig::default();

        if let Some(base) = lookup("API_BASE").filter(|s| !s.trim().is_empty()) {
            cfg.api_base = base.trim().trim_end_matches('/').to_string();
        }
        if let Some(path) = lookup("INSIGHTS_DB_PATH").filter(|s| !s.trim().is_empty()) {
            cfg.db_path = PathBuf::from(path);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "EXPLAIN_CACHE_TTL_SECS") {
            cfg.explain_cache_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "STORES_CACHE_TTL_SECS") {
            cfg.stores_cache_ttl = Duration::from_secs(secs);
        }
        if let Some(year) = parse_var::<i32>(&lookup, "STORES_MIN_YEAR") {
            cfg.store_query.min_year = year;
        }
        if let Some(points) = parse_var::<u32>(&lookup, "STORES_MIN_POINTS") {
            cfg.store_query.min_points = points;
        }
        if let Some(month) = lookup("STORES_MUST_HAVE_MONTH") {
            let month = month.trim().to_string();
            cfg.store_query.must_have_month = if month.is_empty() { None } else { Some(month) };
        }
        if let Some(n) = parse_var::<usize>(&lookup, "CATEGORY_TOP_N") {
            cfg.category_top_n = n.max(1);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "REQUEST_TIMEOUT_SECS") {
            cfg.request_timeout = if secs == 0 { None } else { Some(Duration::from_secs(secs)) };
        }

        cfg
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring unparsable config value, using default");
            None
        }
    }
}
