use std::future::Future;

use o2bridge_core::{O2Error, O2Result};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// `Uninitialized → (Initializing) → Ready | Failed`. `Initializing` is the window in which the
/// write lock is held; `Failed` is retried on the next call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitState<T> {
    Uninitialized,
    Ready(T),
    Failed(String),
}

/// Single-initialization guard for a cloneable handle (client, token, ...).
pub struct LazyInit<T> {
    name: &'static str,
    state: RwLock<InitState<T>>,
}

impl<T: Clone + Send + Sync> LazyInit<T> {
    pub fn new(name: &'static str) -> Self { Self { name, state: RwLock::new(InitState::Uninitialized) } }

    /// Return the ready value or run `init` exactly once across concurrent first callers.
    pub async fn get_or_try_init<F, Fut>(&self, init: F) -> O2Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = O2Result<T>>,
    {
        self.get_valid_or_try_init(|_| true, init).await
    }

    /// Like `get_or_try_init`, but a ready value failing `valid` (e.g. an expired token) is replaced.
    pub async fn get_valid_or_try_init<V, F, Fut>(&self, valid: V, init: F) -> O2Result<T>
    where
        V: Fn(&T) -> bool,
        F: FnOnce() -> Fut,
        Fut: Future<Output = O2Result<T>>,
    {
        {
            let st = self.state.read().await;
            if let InitState::Ready(v) = &*st {
                if valid(v) { return Ok(v.clone()); }
            }
        }
        let mut st = self.state.write().await;
        // another caller may have finished while we waited for the write lock
        if let InitState::Ready(v) = &*st {
            if valid(v) { return Ok(v.clone()); }
        }
        debug!(name = self.name, "initializing");
        match init().await {
            Ok(v) => {
                *st = InitState::Ready(v.clone());
                Ok(v)
            }
            Err(e) => {
                warn!(name = self.name, error = %e, "initialization failed; will retry on next call");
                *st = InitState::Failed(e.to_string());
                Err(e)
            }
        }
    }

    /// Current value without initializing.
    pub async fn peek(&self) -> Option<T> {
        match &*self.state.read().await { InitState::Ready(v) => Some(v.clone()), _ => None }
    }

    pub async fn state(&self) -> InitState<T> { self.state.read().await.clone() }

    /// Back to `Uninitialized` (used by `close`).
    pub async fn reset(&self) { *self.state.write().await = InitState::Uninitialized; }

    /// Error describing the last failure, if the guard is in `Failed`.
    pub async fn last_error(&self) -> Option<O2Error> {
        match &*self.state.read().await {
            InitState::Failed(msg) => Some(O2Error::ConnectionFailed(format!("{}: {}", self.name, msg))),
            _ => None,
        }
    }
}
