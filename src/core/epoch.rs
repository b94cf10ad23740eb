//! Generation counters that let a scope discard responses from superseded requests.
//!
//! Each logical scope (store selection, point focus, category insight) owns one `Generation`.
//! Starting work calls [`Generation::begin`], which bumps the counter and hands back an
//! [`Epoch`] ticket. When the work resolves, its result may only touch shared state if
//! [`Generation::is_current`] still holds for that ticket. Bumping the counter also cancels the
//! token handed to the previous epoch so in-flight HTTP calls can be aborted.

use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;

/// Identity of one request within a scope.
#[derive(Debug, Clone)]
pub struct Epoch {
    id: u64,
    token: CancellationToken,
}

impl Epoch {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Cancelled as soon as a newer epoch starts or the scope is invalidated.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

#[derive(Debug)]
pub struct Generation {
    name: &'static str,
    counter: AtomicU64,
    current_token: Mutex<CancellationToken>,
}

impl Generation {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            counter: AtomicU64::new(0),
            current_token: Mutex::new(CancellationToken::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn current(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }

    /// Start a new request in this scope, superseding any outstanding one.
    pub fn begin(&self) -> Epoch {
        let mut slot = self.current_token.lock();
        slot.cancel();
        let token = CancellationToken::new();
        *slot = token.clone();
        let id = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::trace!(scope = self.name, epoch = id, "Epoch started");
        Epoch { id, token }
    }

    /// Invalidate outstanding work without starting anything new (selection cleared, popup closed).
    pub fn invalidate(&self) {
        let mut slot = self.current_token.lock();
        slot.cancel();
        *slot = CancellationToken::new();
        let id = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::trace!(scope = self.name, epoch = id, "Scope invalidated");
    }

    pub fn is_current(&self, epoch: &Epoch) -> bool {
        self.current() == epoch.id
    }

    /// Run `action` under a fresh epoch. `None` means a newer request superseded it.
    pub async fn guard<F, Fut, T>(&self, action: F) -> Option<T>
    where
        F: FnOnce(Epoch) -> Fut,
        Fut: Future<Output = T>,
    {
        let epoch = self.begin();
        let result = action(epoch.clone()).await;
        if self.is_current(&epoch) {
            Some(result)
        } else {
            tracing::debug!(scope = self.name, epoch = epoch.id, "Discarding superseded response");
            None
        }
    }

    /// Apply `f` only while `epoch` is still current. Returns whether it ran.
    pub fn apply_if_current(&self, epoch: &Epoch, f: impl FnOnce()) -> bool {
        if self.is_current(epoch) {
            f();
            true
        } else {
            tracing::debug!(scope = self.name, epoch = epoch.id, "Skipping stale update");
            false
        }
    }
}
