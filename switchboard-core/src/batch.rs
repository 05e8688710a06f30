//! Coalescing wrapper for the quota hot path.
//!
//! With batch updates enabled, per-request quota writes would otherwise issue
//! one UPDATE each. This wrapper nets credits against debits per token in
//! memory and lets a flusher task apply the remainder on an interval. All
//! other port operations pass straight through.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use switchboard_types::TokenStatus;

use crate::TaskHandle;
use crate::error::GatewayError;
use crate::store::Store;
use crate::types::{Ability, Channel, Token, UsageDeltas, UsageKey};

/// Store wrapper that queues quota writes and flushes them coalesced.
pub struct BatchingStore {
    inner: Arc<dyn Store>,
    pending: Mutex<HashMap<i64, i64>>,
}

impl BatchingStore {
    /// Wrap a store. Quota writes are queued until [`flush`](Self::flush).
    #[must_use]
    pub fn new(inner: Arc<dyn Store>) -> Self {
        Self {
            inner,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Access the wrapped store.
    #[must_use]
    pub fn inner(&self) -> &Arc<dyn Store> {
        &self.inner
    }

    /// Number of tokens with a queued net delta.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.lock().expect("mutex poisoned").len()
    }

    fn enqueue(&self, id: i64, delta: i64) {
        let mut pending = self.pending.lock().expect("mutex poisoned");
        *pending.entry(id).or_insert(0) += delta;
    }

    /// Apply every queued net delta through the wrapped store.
    ///
    /// Deltas that fail to apply are re-queued for the next flush.
    ///
    /// # Errors
    /// Returns the first store failure after attempting every entry.
    pub async fn flush(&self) -> Result<(), GatewayError> {
        let drained: HashMap<i64, i64> = {
            let mut pending = self.pending.lock().expect("mutex poisoned");
            std::mem::take(&mut *pending)
        };

        let mut first_error = None;
        for (id, delta) in drained {
            let result = match delta {
                0 => continue,
                d if d > 0 => self.inner.credit_token_quota(id, d).await,
                d => self.inner.debit_token_quota(id, -d).await,
            };
            if let Err(error) = result {
                tracing::warn!(token_id = id, delta, %error, "batched quota write failed; re-queued");
                self.enqueue(id, delta);
                first_error.get_or_insert(error);
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Spawn the interval flusher. Stopping the handle performs a final
    /// flush before the task exits.
    #[must_use]
    pub fn spawn_flusher(self: &Arc<Self>, interval: Duration) -> TaskHandle {
        let (stop_tx, mut stop_rx) = tokio::sync::oneshot::channel();
        let store = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = &mut stop_rx => {
                        if let Err(error) = store.flush().await {
                            tracing::warn!(%error, "final batch flush failed");
                        }
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(error) = store.flush().await {
                            tracing::warn!(%error, "batch flush failed");
                        }
                    }
                }
            }
        });
        TaskHandle::new(task, stop_tx)
    }
}

#[async_trait]
impl Store for BatchingStore {
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
        self.inner.find_token_by_key(key).await
    }

    async fn update_token_status(
        &self,
        id: i64,
        status: TokenStatus,
    ) -> Result<(), GatewayError> {
        self.inner.update_token_status(id, status).await
    }

    async fn update_rate_limit_reset(&self, id: i64, at: i64) -> Result<(), GatewayError> {
        self.inner.update_rate_limit_reset(id, at).await
    }

    async fn credit_token_quota(&self, id: i64, delta: i64) -> Result<(), GatewayError> {
        self.enqueue(id, delta);
        Ok(())
    }

    async fn debit_token_quota(&self, id: i64, delta: i64) -> Result<(), GatewayError> {
        self.enqueue(id, -delta);
        Ok(())
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
        self.inner.increase_token_usage_count(id, today).await
    }
}
