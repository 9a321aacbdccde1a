//! Per-pass plumbing: application keys, per-key serialization and cancellation
//!
//! Reconciliation passes for the same Application never overlap: each pass
//! holds the key's lock for its whole duration. Passes for different keys run
//! concurrently. Every pass carries a cancellation token derived from the
//! controller's shutdown token and all cluster I/O is raced against it.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::Error;

/// Namespaced name of an Application
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ApplicationKey {
    /// Namespace of the Application
    pub namespace: String,
    /// Name of the Application
    pub name: String,
}

impl ApplicationKey {
    /// Create a key from a namespace and a name
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ApplicationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Registry of per-Application locks
///
/// Entries are created on first use and dropped with [`KeyedLocks::forget`]
/// after each pass, so the map only holds keys with a pass running or queued.
#[derive(Clone, Default)]
pub struct KeyedLocks {
    inner: Arc<DashMap<ApplicationKey, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`
    pub async fn lock(&self, key: &ApplicationKey) -> OwnedMutexGuard<()> {
        let mutex = self.inner.entry(key.clone()).or_default().clone();
        mutex.lock_owned().await
    }

    /// Drop the entry for `key` unless another pass is holding or waiting on it
    pub fn forget(&self, key: &ApplicationKey) {
        let removed = self
            .inner
            .remove_if(key, |_, mutex| Arc::strong_count(mutex) == 1)
            .is_some();
        if removed {
            debug!(application = %key, "released lock entry");
        }
    }

    /// Number of keys with a lock entry
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns true if no key has a lock entry
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// State carried through one reconciliation pass
#[derive(Clone, Debug)]
pub struct PassContext {
    key: ApplicationKey,
    cancel: CancellationToken,
}

impl PassContext {
    /// Start a pass for `key` that stops when `cancel` fires
    pub fn new(key: ApplicationKey, cancel: CancellationToken) -> Self {
        Self { key, cancel }
    }

    /// Key of the Application being reconciled
    pub fn key(&self) -> &ApplicationKey {
        &self.key
    }

    /// Run one cluster call, abandoning it if the pass is cancelled first
    pub async fn guard<T, F>(&self, op: F) -> Result<T, Error>
    where
        F: Future<Output = Result<T, Error>>,
    {
        if self.cancel.is_cancelled() {
            return Err(Error::cancelled(self.key.to_string()));
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::cancelled(self.key.to_string())),
            result = op => result,
        }
    }
}
