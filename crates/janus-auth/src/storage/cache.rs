//! Read-through/write-through cache over a grant store.
//!
//! Reference tokens are looked up on every introspection; a cache in front
//! of the durable store keeps that path cheap. The cache is never the
//! source of truth: every write goes through to the backing store, and
//! removals invalidate the cache entry before the backing delete returns,
//! so a consumed single-use grant cannot be served from cache afterwards.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::AuthResult;
use crate::storage::grant::GrantStore;
use crate::types::grant::Grant;

struct CachedEntry {
    grant: Grant,
    cached_at: Instant,
}

/// TTL'd read-through cache wrapping a durable grant store.
pub struct CachedGrantStore<S> {
    inner: S,
    ttl: Duration,
    entries: RwLock<HashMap<String, CachedEntry>>,
}

impl<S: GrantStore> CachedGrantStore<S> {
    /// Wraps a grant store with a cache of the given entry TTL.
    #[must_use]
    pub fn new(inner: S, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Drops a cache entry without touching the backing store.
    pub fn invalidate(&self, handle_hash: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(handle_hash);
        }
    }

    /// Returns the number of live cache entries (test observability).
    #[must_use]
    pub fn cached_len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    fn cache_get(&self, handle_hash: &str) -> Option<Grant> {
        let entries = self.entries.read().ok()?;
        entries
            .get(handle_hash)
            .filter(|e| e.cached_at.elapsed() < self.ttl)
            .map(|e| e.grant.clone())
    }

    fn cache_put(&self, grant: &Grant) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(
                grant.handle_hash.clone(),
                CachedEntry {
                    grant: grant.clone(),
                    cached_at: Instant::now(),
                },
            );
        }
    }
}

#[async_trait]
impl<S: GrantStore> GrantStore for CachedGrantStore<S> {
    async fn store(&self, grant: &Grant) -> AuthResult<()> {
        // Write-through: durable store first, cache only on success.
        self.inner.store(grant).await?;
        self.cache_put(grant);
        Ok(())
    }

    async fn find_by_hash(&self, handle_hash: &str) -> AuthResult<Option<Grant>> {
        if let Some(grant) = self.cache_get(handle_hash) {
            return Ok(Some(grant));
        }
        let grant = self.inner.find_by_hash(handle_hash).await?;
        if let Some(ref grant) = grant {
            self.cache_put(grant);
        }
        Ok(grant)
    }

    async fn remove_by_hash(&self, handle_hash: &str) -> AuthResult<()> {
        // Invalidate first so no reader can observe the grant through the
        // cache after the backing delete returns.
        self.invalidate(handle_hash);
        self.inner.remove_by_hash(handle_hash).await
    }

    async fn touch(&self, handle_hash: &str, used_at: OffsetDateTime) -> AuthResult<()> {
        self.inner.touch(handle_hash, used_at).await
    }
}
