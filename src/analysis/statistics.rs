use sqlx::SqlitePool;
use std::time::Duration;
use tracing::warn;
use crate::db;
use crate::models::TimePoint;

/// Percentage change from `base` to `current`. `None` when the base is zero or either side is
/// not finite.
pub fn pct_change(base: f64, current: f64) -> Option<f64> {
    if base == 0.0 || !base.is_finite() || !current.is_finite() {
        return None;
    }
    Some((current - base) / base.abs() * 100.0)
}

/// Lowest and highest point by value. The earliest point wins ties.
pub fn min_max(points: &[TimePoint]) -> Option<(&TimePoint, &TimePoint)> {
    let first = points.first()?;
    let mut low = first;
    let mut high = first;
    for p in &points[1..] {
        if p.value < low.value {
            low = p;
        }
        if p.value > high.value {
            high = p;
        }
    }
    Some((low, high))
}

/// Exponential moving average with weight 0.3 on the new sample, rounded to whole milliseconds.
pub fn update_ema(prev_ms: f64, sample_ms: f64) -> f64 {
    (prev_ms * 0.7 + sample_ms * 0.3).round()
}

/// Which load the estimate tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EtaKind {
    Forecast,
    Insight,
    Stores,
}

impl EtaKind {
    pub fn key(&self) -> &'static str {
        match self {
            EtaKind::Forecast => "forecastLoadEMA",
            EtaKind::Insight => "aiLoadEMA",
            EtaKind::Stores => "storesLoadEMA",
        }
    }

    pub fn default_ms(&self) -> f64 {
        match self {
            EtaKind::Forecast => 25_000.0,
            EtaKind::Insight => 8_000.0,
            EtaKind::Stores => 1_500.0,
        }
    }
}

/// Persisted load-time estimates, shown as progress hints while a request is pending.
#[derive(Clone)]
pub struct EtaTracker {
    pool: SqlitePool,
}

impl EtaTracker {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Stored EMA, or the default when missing, zero or unreadable.
    pub async fn estimate_ms(&self, kind: EtaKind) -> f64 {
        match db::get_setting(&self.pool, kind.key()).await {
            Ok(Some(raw)) => raw
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite() && *v > 0.0)
                .unwrap_or_else(|| kind.default_ms()),
            Ok(None) => kind.default_ms(),
            Err(e) => {
                warn!(key = kind.key(), error = %e, "ETA read failed, using default");
                kind.default_ms()
            }
        }
    }

    pub async fn estimate(&self, kind: EtaKind) -> Duration {
        Duration::from_millis(self.estimate_ms(kind).await.max(0.0) as u64)
    }

    /// Fold one observed duration into the estimate and persist it. Storage failures are logged,
    /// the new estimate is still returned.
    pub async fn record(&self, kind: EtaKind, elapsed: Duration) -> f64 {
        let prev = self.estimate_ms(kind).await;
        let next = update_ema(prev, elapsed.as_millis() as f64);
        if let Err(e) = db::save_setting(&self.pool, kind.key(), &next.to_string()).await {
            warn!(key = kind.key(), error = %e, "ETA write failed");
        }
        next
    }
}
