//! Token-caching store wrapper.
//!
//! Lookups hit the cache first and fall through to the wrapped store on a
//! miss; the snapshot read from the database is pushed into the cache from a
//! spawned task so the request path never waits on cache population. The
//! database stays authoritative — a lost cache write costs a future miss,
//! nothing else. Quota writes advance the cached copy synchronously so
//! back-to-back authorizations observe the latest balance even while the
//! underlying row write is still queued.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use switchboard_core::{
    Ability, Channel, GatewayError, Store, Token, UsageDeltas, UsageKey,
};
use switchboard_types::{StatusWritePolicy, TokenStatus};

const DEFAULT_CAPACITY: u64 = 10_000;
const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Store wrapper that keeps token snapshots warm.
pub struct CachingStore {
    inner: Arc<dyn Store>,
    tokens: Cache<String, Token>,
    id_keys: Mutex<HashMap<i64, String>>,
    status_write: StatusWritePolicy,
}

impl CachingStore {
    /// Wrap a store with the default capacity and time-to-live.
    #[must_use]
    pub fn new(inner: Arc<dyn Store>, status_write: StatusWritePolicy) -> Self {
        Self::with_capacity_and_ttl(inner, status_write, DEFAULT_CAPACITY, DEFAULT_TTL)
    }

    /// Wrap a store with explicit cache sizing.
    #[must_use]
    pub fn with_capacity_and_ttl(
        inner: Arc<dyn Store>,
        status_write: StatusWritePolicy,
        capacity: u64,
        ttl: Duration,
    ) -> Self {
        Self {
            inner,
            tokens: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
            id_keys: Mutex::new(HashMap::new()),
            status_write,
        }
    }

    /// Access the wrapped store.
    #[must_use]
    pub fn inner(&self) -> &Arc<dyn Store> {
        &self.inner
    }

    /// Whether a snapshot for `key` is currently cached.
    pub async fn contains(&self, key: &str) -> bool {
        self.tokens.get(key).await.is_some()
    }

    /// Apply a mutation to the cached copy of token `id`, if present.
    async fn mutate_cached<F>(&self, id: i64, apply: F)
    where
        F: FnOnce(&mut Token),
    {
        let key = self
            .id_keys
            .lock()
            .expect("mutex poisoned")
            .get(&id)
            .cloned();
        let Some(key) = key else { return };
        if let Some(mut token) = self.tokens.get(&key).await {
            apply(&mut token);
            self.tokens.insert(key, token).await;
        }
    }

    /// Push a freshly read snapshot into the cache off the request path.
    fn populate(&self, token: &Token) {
        self.id_keys
            .lock()
            .expect("mutex poisoned")
            .insert(token.id, token.key.clone());
        let cache = self.tokens.clone();
        let token = token.clone();
        tokio::spawn(async move {
            cache.insert(token.key.clone(), token).await;
        });
    }
}

#[async_trait]
impl Store for CachingStore {
    async fn load_all_channels(&self) -> Result<Vec<Channel>, GatewayError> {
        self.inner.load_all_channels().await
    }

    async fn load_all_abilities(&self) -> Result<Vec<Ability>, GatewayError> {
        self.inner.load_all_abilities().await
    }

    async fn candidate_channels(
        &self,
        group: &str,
        model: &str,
    ) -> Result<Vec<Channel>, GatewayError> {
        self.inner.candidate_channels(group, model).await
    }

    async fn find_token_by_key(&self, key: &str) -> Result<Option<Token>, GatewayError> {
        if let Some(token) = self.tokens.get(key).await {
            return Ok(Some(token));
        }
        let found = self.inner.find_token_by_key(key).await?;
        if let Some(token) = &found {
            self.populate(token);
        }
        Ok(found)
    }

    async fn update_token_status(
        &self,
        id: i64,
        status: TokenStatus,
    ) -> Result<(), GatewayError> {
        self.mutate_cached(id, |token| token.status = status).await;
        match self.status_write {
            StatusWritePolicy::CacheOnly => Ok(()),
            StatusWritePolicy::Immediate => self.inner.update_token_status(id, status).await,
            _ => self.inner.update_token_status(id, status).await,
        }
    }

    async fn update_rate_limit_reset(&self, id: i64, at: i64) -> Result<(), GatewayError> {
        self.mutate_cached(id, |token| token.last_rate_limit_reset = at)
            .await;
        self.inner.update_rate_limit_reset(id, at).await
    }

    async fn credit_token_quota(&self, id: i64, delta: i64) -> Result<(), GatewayError> {
        self.mutate_cached(id, |token| {
            token.remain_quota += delta;
            token.used_quota -= delta;
        })
        .await;
        self.inner.credit_token_quota(id, delta).await
    }

    async fn debit_token_quota(&self, id: i64, delta: i64) -> Result<(), GatewayError> {
        self.mutate_cached(id, |token| {
            token.remain_quota -= delta;
            token.used_quota += delta;
        })
        .await;
        self.inner.debit_token_quota(id, delta).await
    }

    async fn insert_rate_log(&self, token_id: i64, at: i64) -> Result<(), GatewayError> {
        self.inner.insert_rate_log(token_id, at).await
    }

    async fn count_rate_log_since(
        &self,
        token_id: i64,
        since: i64,
    ) -> Result<i64, GatewayError> {
        self.inner.count_rate_log_since(token_id, since).await
    }

    async fn upsert_usage(
        &self,
        key: &UsageKey,
        deltas: &UsageDeltas,
    ) -> Result<(), GatewayError> {
        self.inner.upsert_usage(key, deltas).await
    }

    async fn increase_token_usage_count(
        &self,
        id: i64,
        today: &str,
    ) -> Result<(), GatewayError> {
        self.mutate_cached(id, |token| {
            token.total_usage_count += 1;
            token.daily_usage_count = if token.last_usage_date == today {
                token.daily_usage_count + 1
            } else {
                1
            };
            token.last_usage_date = today.to_string();
        })
        .await;
        self.inner.increase_token_usage_count(id, today).await
    }
}
