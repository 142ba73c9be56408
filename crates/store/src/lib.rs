//! o2bridge store: the only mutable state an adapter owns.
//!
//! - `SubscriptionStore`: in-memory O2-IMS subscriptions, cleared on close
//! - `LazyInit`: initialize-or-reuse guard for backend client handles

#![forbid(unsafe_code)]

mod lazy;

pub use lazy::{InitState, LazyInit};

use std::sync::{PoisonError, RwLock};

use o2bridge_core::{O2Error, O2Result, Subscription};
use rustc_hash::FxHashMap;
use tracing::info;
use uuid::Uuid;

/// Subscriptions owned by exactly one adapter instance. Reads share the lock; create/delete/clear
/// take it exclusively.
pub struct SubscriptionStore {
    backend: String,
    subs: RwLock<FxHashMap<String, Subscription>>,
}

impl SubscriptionStore {
    pub fn new(backend: &str) -> Self {
        Self { backend: backend.to_string(), subs: RwLock::new(FxHashMap::default()) }
    }

    /// Validate, assign an id when missing, and insert. A caller-supplied id that already exists
    /// is rejected and the existing entry is left untouched.
    pub fn create(&self, mut sub: Subscription) -> O2Result<Subscription> {
        if sub.callback.trim().is_empty() {
            return Err(O2Error::InvalidArgument("subscription callback is required".into()));
        }
        let mut map = self.subs.write().unwrap_or_else(PoisonError::into_inner);
        if sub.subscription_id.is_empty() {
            sub.subscription_id = loop {
                let id = Uuid::new_v4().to_string();
                if !map.contains_key(&id) { break id; }
            };
        } else if map.contains_key(&sub.subscription_id) {
            return Err(O2Error::AlreadyExists(format!("subscription {}", sub.subscription_id)));
        }
        map.insert(sub.subscription_id.clone(), sub.clone());
        metrics::gauge!("subscriptions_active", map.len() as f64, "backend" => self.backend.clone());
        info!(backend = %self.backend, id = %sub.subscription_id, callback = %sub.callback, "subscription created");
        Ok(sub)
    }

    pub fn get(&self, id: &str) -> O2Result<Subscription> {
        let map = self.subs.read().unwrap_or_else(PoisonError::into_inner);
        map.get(id).cloned().ok_or_else(|| O2Error::NotFound(format!("subscription {}", id)))
    }

    /// Snapshot ordered by id.
    pub fn list(&self) -> Vec<Subscription> {
        let map = self.subs.read().unwrap_or_else(PoisonError::into_inner);
        let mut out: Vec<Subscription> = map.values().cloned().collect();
        out.sort_by(|a, b| a.subscription_id.cmp(&b.subscription_id));
        out
    }

    pub fn delete(&self, id: &str) -> O2Result<()> {
        let mut map = self.subs.write().unwrap_or_else(PoisonError::into_inner);
        match map.remove(id) {
            Some(_) => {
                metrics::gauge!("subscriptions_active", map.len() as f64, "backend" => self.backend.clone());
                info!(backend = %self.backend, id = %id, "subscription deleted");
                Ok(())
            }
            None => Err(O2Error::NotFound(format!("subscription {}", id))),
        }
    }

    pub fn len(&self) -> usize { self.subs.read().unwrap_or_else(PoisonError::into_inner).len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    pub fn clear(&self) {
        let mut map = self.subs.write().unwrap_or_else(PoisonError::into_inner);
        let n = map.len();
        map.clear();
        metrics::gauge!("subscriptions_active", 0.0, "backend" => self.backend.clone());
        if n > 0 { info!(backend = %self.backend, dropped = n, "subscriptions cleared"); }
    }
}
