//! Explanation cache (strict TTL) and in-flight request registry (coalescing).

use crate::error::{InsightError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub stored_at: Instant,
    pub summary: String,
}

/// Summaries keyed by canonical payload JSON.
///
/// Entries are valid while `now - stored_at < ttl`. Reads never extend an entry's life.
/// Expired entries are dropped when they are read; there is no size bound.
#[derive(Debug)]
pub struct ResponseCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock();
        let fresh = match entries.get(key) {
            Some(entry) => entry.stored_at.elapsed() < self.ttl,
            None => return None,
        };
        if fresh {
            entries.get(key).map(|e| e.summary.clone())
        } else {
            entries.remove(key);
            None
        }
    }

    pub fn insert(&self, key: String, summary: String) {
        self.entries.lock().insert(
            key,
            CacheEntry {
                stored_at: Instant::now(),
                summary,
            },
        );
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        let ttl = self.ttl;
        entries.retain(|_, e| e.stored_at.elapsed() < ttl);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

type Outcome = Result<String>;

/// At most one outstanding request per key. The first caller leads, later callers follow and
/// receive a copy of the leader's outcome.
#[derive(Debug, Default)]
pub struct InFlightRegistry {
    pending: Mutex<HashMap<String, broadcast::Sender<Outcome>>>,
}

pub enum Slot<'a> {
    Leader(InFlightGuard<'a>),
    Follower(Follower),
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in `key`. Subscription happens under the registry lock, so a follower
    /// can never miss the leader's broadcast.
    pub fn join(&self, key: &str) -> Slot<'_> {
        let mut pending = self.pending.lock();
        if let Some(tx) = pending.get(key) {
            return Slot::Follower(Follower { rx: tx.subscribe() });
        }
        let (tx, _) = broadcast::channel(1);
        pending.insert(key.to_string(), tx.clone());
        Slot::Leader(InFlightGuard {
            registry: self,
            key: key.to_string(),
            sender: Some(tx),
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.pending.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Held by the leader. Removes the registry entry when completed or dropped.
pub struct InFlightGuard<'a> {
    registry: &'a InFlightRegistry,
    key: String,
    sender: Option<broadcast::Sender<Outcome>>,
}

impl InFlightGuard<'_> {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Publish the outcome to followers and deregister, atomically with respect to `join`.
    pub fn complete(mut self, outcome: Outcome) {
        let mut pending = self.registry.pending.lock();
        pending.remove(&self.key);
        if let Some(tx) = self.sender.take() {
            // No receivers is fine: nobody coalesced onto this request.
            let _ = tx.send(outcome);
        }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.sender.take().is_some() {
            // Leader abandoned (cancelled or panicked); followers see a closed channel.
            self.registry.pending.lock().remove(&self.key);
        }
    }
}

pub struct Follower {
    rx: broadcast::Receiver<Outcome>,
}

impl Follower {
    pub async fn wait(mut self) -> Outcome {
        match self.rx.recv().await {
            Ok(outcome) => outcome,
            Err(_) => Err(InsightError::Cancelled),
        }
    }
}
