use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::error::PosterError;
use crate::models::{PendingAuthorization, SessionKey, SessionRecord, TokenRecord};

/// Server-side storage for per-session OAuth state.
///
/// Implementations must make [`SessionStore::take_pending`] atomic: two
/// callbacks racing on the same key may not both receive the verifier.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, key: &SessionKey) -> Result<Option<TokenRecord>, PosterError>;

    async fn put(&self, key: &SessionKey, token: TokenRecord) -> Result<(), PosterError>;

    /// Forget everything held for `key`.
    async fn clear(&self, key: &SessionKey) -> Result<(), PosterError>;

    /// Store the verifier for an authorization in progress, replacing any earlier one.
    async fn stash_pending(
        &self,
        key: &SessionKey,
        pending: PendingAuthorization,
    ) -> Result<(), PosterError>;

    /// Remove and return the pending authorization.
    async fn take_pending(
        &self,
        key: &SessionKey,
    ) -> Result<Option<PendingAuthorization>, PosterError>;

    /// Drop records not read or written for longer than `max_idle`. Returns how many were removed.
    async fn prune_idle(&self, _max_idle: Duration) -> Result<usize, PosterError> {
        Ok(0)
    }
}

/// Process-local store. Lost on restart.
#[derive(Default)]
pub struct MemorySessionStore {
    records: DashMap<SessionKey, SessionRecord>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn keys(&self) -> Vec<SessionKey> {
        self.records.iter().map(|entry| entry.key().clone()).collect()
    }

    fn touch<R>(&self, key: &SessionKey, f: impl FnOnce(&mut SessionRecord) -> R) -> R {
        let now = Utc::now();
        let mut entry = self
            .records
            .entry(key.clone())
            .or_insert_with(|| SessionRecord::new(now));
        entry.touched_at = now;
        f(entry.value_mut())
    }

    fn prune_before(&self, cutoff: DateTime<Utc>) -> usize {
        let before = self.records.len();
        self.records.retain(|_, record| record.touched_at >= cutoff);
        before - self.records.len()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, key: &SessionKey) -> Result<Option<TokenRecord>, PosterError> {
        Ok(self.records.get_mut(key).and_then(|mut record| {
            record.touched_at = Utc::now();
            record.token.clone()
        }))
    }

    async fn put(&self, key: &SessionKey, token: TokenRecord) -> Result<(), PosterError> {
        self.touch(key, |record| record.token = Some(token));
        Ok(())
    }

    async fn clear(&self, key: &SessionKey) -> Result<(), PosterError> {
        self.records.remove(key);
        Ok(())
    }

    async fn stash_pending(
        &self,
        key: &SessionKey,
        pending: PendingAuthorization,
    ) -> Result<(), PosterError> {
        self.touch(key, |record| record.pending = Some(pending));
        Ok(())
    }

    async fn take_pending(
        &self,
        key: &SessionKey,
    ) -> Result<Option<PendingAuthorization>, PosterError> {
        Ok(self
            .records
            .get_mut(key)
            .and_then(|mut record| {
                record.touched_at = Utc::now();
                record.pending.take()
            }))
    }

    async fn prune_idle(&self, max_idle: Duration) -> Result<usize, PosterError> {
        Ok(self.prune_before(Utc::now() - max_idle))
    }
}
