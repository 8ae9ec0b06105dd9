//! Before/after lifecycle hooks around write operations
//!
//! The [`HookMediator`] is a keyed registry of async callbacks. Each key is a
//! `(collection, verb, phase)` triple and holds at most one callback; a new
//! registration for the same key replaces the previous one.
//!
//! ```rust,ignore
//! let hooks = crud.hooks();
//! hooks
//!     .before_post("books", |doc| async move {
//!         tracing::info!(?doc, "creating book");
//!         Ok(())
//!     })
//!     .after_delete("books", |result| async move {
//!         audit(result).await
//!     });
//! ```
//!
//! The dispatcher awaits `fire_before` before the storage call and
//! `fire_after` before responding. A hook error fails the request.

use crate::core::error::HookError;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

/// Write verbs that fire hooks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verb {
    Post,
    Put,
    Patch,
    Delete,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Post => "POST",
            Verb::Put => "PUT",
            Verb::Patch => "PATCH",
            Verb::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// When a hook runs relative to the storage call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Before,
    After,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Before => "before",
            Phase::After => "after",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registry key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HookKey {
    pub collection: String,
    pub verb: Verb,
    pub phase: Phase,
}

impl HookKey {
    pub fn new(collection: impl Into<String>, verb: Verb, phase: Phase) -> Self {
        Self {
            collection: collection.into(),
            verb,
            phase,
        }
    }
}

impl fmt::Display for HookKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}{}", self.collection, self.phase, self.verb)
    }
}

/// A registered callback
pub type Hook = Arc<dyn Fn(Value) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Keyed registry of lifecycle hooks
///
/// Cloning yields a handle to the same registry, so hooks registered
/// after the router is built are still seen by the handlers.
#[derive(Clone, Default)]
pub struct HookMediator {
    hooks: Arc<RwLock<HashMap<HookKey, Hook>>>,
}

impl fmt::Debug for HookMediator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<String> = self
            .hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .map(ToString::to_string)
            .collect();
        keys.sort();
        f.debug_struct("HookMediator").field("hooks", &keys).finish()
    }
}

impl HookMediator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for a key, replacing any previous one
    pub fn on<F, Fut>(&self, collection: &str, verb: Verb, phase: Phase, callback: F) -> &Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let key = HookKey::new(collection, verb, phase);
        let hook: Hook = Arc::new(move |payload| Box::pin(callback(payload)));
        let previous = self
            .hooks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), hook);
        if previous.is_some() {
            tracing::debug!(hook = %key, "hook replaced");
        } else {
            tracing::debug!(hook = %key, "hook registered");
        }
        self
    }

    pub fn before_post<F, Fut>(&self, collection: &str, callback: F) -> &Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.on(collection, Verb::Post, Phase::Before, callback)
    }

    pub fn after_post<F, Fut>(&self, collection: &str, callback: F) -> &Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.on(collection, Verb::Post, Phase::After, callback)
    }

    pub fn before_put<F, Fut>(&self, collection: &str, callback: F) -> &Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.on(collection, Verb::Put, Phase::Before, callback)
    }

    pub fn after_put<F, Fut>(&self, collection: &str, callback: F) -> &Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.on(collection, Verb::Put, Phase::After, callback)
    }

    pub fn before_patch<F, Fut>(&self, collection: &str, callback: F) -> &Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.on(collection, Verb::Patch, Phase::Before, callback)
    }

    pub fn after_patch<F, Fut>(&self, collection: &str, callback: F) -> &Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.on(collection, Verb::Patch, Phase::After, callback)
    }

    pub fn before_delete<F, Fut>(&self, collection: &str, callback: F) -> &Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.on(collection, Verb::Delete, Phase::Before, callback)
    }

    pub fn after_delete<F, Fut>(&self, collection: &str, callback: F) -> &Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.on(collection, Verb::Delete, Phase::After, callback)
    }

    /// Whether a callback is registered for the key
    pub fn contains(&self, collection: &str, verb: Verb, phase: Phase) -> bool {
        self.lookup(&HookKey::new(collection, verb, phase)).is_some()
    }

    /// Drop the callback for a key, if any
    pub fn remove(&self, collection: &str, verb: Verb, phase: Phase) -> bool {
        self.hooks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&HookKey::new(collection, verb, phase))
            .is_some()
    }

    pub async fn fire_before(
        &self,
        collection: &str,
        verb: Verb,
        payload: Value,
    ) -> Result<(), HookError> {
        self.fire(HookKey::new(collection, verb, Phase::Before), payload)
            .await
    }

    pub async fn fire_after(
        &self,
        collection: &str,
        verb: Verb,
        payload: Value,
    ) -> Result<(), HookError> {
        self.fire(HookKey::new(collection, verb, Phase::After), payload)
            .await
    }

    fn lookup(&self, key: &HookKey) -> Option<Hook> {
        self.hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    async fn fire(&self, key: HookKey, payload: Value) -> Result<(), HookError> {
        // Clone the callback out so the lock is not held across the await
        let Some(hook) = self.lookup(&key) else {
            tracing::debug!(hook = %key, "no hook registered");
            return Ok(());
        };

        tracing::debug!(hook = %key, "firing hook");
        hook(payload).await.map_err(|source| HookError {
            collection: key.collection,
            verb: key.verb.to_string(),
            phase: key.phase.to_string(),
            source,
        })
    }
}
