use std::sync::Arc;
use std::time::Duration;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use switchboard_core::{
    Accountant, AuthRejection, Authorizer, BatchingStore, ChannelIndex, Clock,
    CompletionRecord, GatewayError, Store, SystemClock, TaskHandle, Token,
    types::Channel,
};
use switchboard_core::{choose, normalize_model, select_one};
use switchboard_middleware::CachingStore;
use switchboard_types::{CacheCoherence, ChannelStatus, GatewayConfig, StatusWritePolicy};

use crate::context::{RequestContext, with_deadline};

/// The gateway core: channel selection, token authorization, and usage
/// accounting over a shared store.
pub struct Gateway {
    pub(crate) store: Arc<dyn Store>,
    pub(crate) batcher: Option<Arc<BatchingStore>>,
    pub(crate) index: ChannelIndex,
    pub(crate) authorizer: Authorizer,
    pub(crate) accountant: Accountant,
    pub(crate) cfg: GatewayConfig,
}

/// Builder for constructing a `Gateway` with custom configuration.
pub struct GatewayBuilder {
    store: Option<Arc<dyn Store>>,
    clock: Arc<dyn Clock>,
    cfg: GatewayConfig,
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GatewayBuilder {
    /// Create a new builder with sensible defaults.
    ///
    /// Behavior and trade-offs:
    /// - Starts with no store; you must register one via `with_store`.
    /// - Defaults are conservative: in-memory index on, token cache off,
    ///   per-request quota writes, 60s sync interval, UTC day windows.
    #[must_use]
    pub fn new() -> Self {
        Self {
            store: None,
            clock: Arc::new(SystemClock),
            cfg: GatewayConfig::default(),
        }
    }

    /// Register the persistence backend the gateway runs on.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replace the whole configuration in one call.
    #[must_use]
    pub fn config(mut self, cfg: GatewayConfig) -> Self {
        self.cfg = cfg;
        self
    }

    /// Inject a clock. Tests pin it; production keeps the system clock.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Toggle the in-memory channel index.
    ///
    /// Behavior and trade-offs:
    /// - Enabled, selection reads a lock-free snapshot rebuilt on the sync
    ///   interval; admin edits become visible at the next refresh.
    /// - Disabled, every selection queries the database for the candidate
    ///   list; always current, one extra round-trip per request.
    #[must_use]
    pub const fn memory_cache(mut self, yes: bool) -> Self {
        self.cfg.memory_cache_enabled = yes;
        self
    }

    /// Select the token-cache coherence mode.
    #[must_use]
    pub const fn cache_coherence(mut self, mode: CacheCoherence) -> Self {
        self.cfg.cache_coherence = mode;
        self
    }

    /// Coalesce quota writes and flush them on the sync interval.
    ///
    /// Cuts row contention on hot tokens; the on-disk balance lags by at
    /// most one interval while the cached copy stays current.
    #[must_use]
    pub const fn batch_update(mut self, yes: bool) -> Self {
        self.cfg.batch_update = yes;
        self
    }

    /// Set the interval for index rebuilds and batch flushes.
    #[must_use]
    pub const fn sync_interval(mut self, interval: Duration) -> Self {
        self.cfg.sync_interval = interval;
        self
    }

    /// Set the ordered group list tried when a request names `auto`.
    #[must_use]
    pub fn auto_groups(mut self, groups: Vec<String>) -> Self {
        self.cfg.auto_groups = groups;
        self
    }

    /// Set the additive weight smoothing used by the selector.
    #[must_use]
    pub const fn smoothing_factor(mut self, factor: i64) -> Self {
        self.cfg.smoothing_factor = factor;
        self
    }

    /// Set the local zone used for day windows and statistics dates.
    #[must_use]
    pub const fn local_zone(mut self, zone: chrono_tz::Tz) -> Self {
        self.cfg.local_zone = zone;
        self
    }

    /// Choose where expiry/exhaustion transitions are written.
    #[must_use]
    pub const fn status_write(mut self, policy: StatusWritePolicy) -> Self {
        self.cfg.status_write = policy;
        self
    }

    /// Build the `Gateway`, stacking the configured store wrappers.
    ///
    /// The effective store is `cache(batch(base))`: quota batching sits
    /// closest to the database so the cache always observes writes first.
    ///
    /// # Errors
    /// - `BadArgument` if no store has been registered.
    /// - `BadArgument` for a negative smoothing factor.
    pub fn build(self) -> Result<Gateway, GatewayError> {
        let Some(base) = self.store else {
            return Err(GatewayError::BadArgument(
                "no store configured; add one via with_store(...)".to_string(),
            ));
        };
        if self.cfg.smoothing_factor < 0 {
            return Err(GatewayError::bad_argument("smoothing_factor"));
        }

        let mut effective: Arc<dyn Store> = base;
        let mut batcher = None;
        if self.cfg.batch_update {
            let wrapper = Arc::new(BatchingStore::new(effective));
            batcher = Some(Arc::clone(&wrapper));
            effective = wrapper;
        }
        if self.cfg.cache_coherence == CacheCoherence::Redis {
            effective = Arc::new(CachingStore::new(effective, self.cfg.status_write));
        }

        let authorizer = Authorizer::new(
            Arc::clone(&effective),
            Arc::clone(&self.clock),
            self.cfg.local_zone,
        );
        let accountant = Accountant::new(
            Arc::clone(&effective),
            Arc::clone(&self.clock),
            self.cfg.local_zone,
        );

        Ok(Gateway {
            store: effective,
            batcher,
            index: ChannelIndex::new(),
            authorizer,
            accountant,
            cfg: self.cfg,
        })
    }
}

impl Gateway {
    /// Start building a new `Gateway`.
    #[must_use]
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::new()
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &GatewayConfig {
        &self.cfg
    }

    /// Rebuild the channel index from the store and swap it in atomically.
    ///
    /// A no-op when the in-memory index is disabled. Called automatically on
    /// the sync interval by [`spawn_refresh`](Self::spawn_refresh) and
    /// manually after bulk channel edits.
    ///
    /// # Errors
    /// Propagates the store failure; the previous index stays in place.
    pub async fn refresh(&self) -> Result<(), GatewayError> {
        if !self.cfg.memory_cache_enabled {
            return Ok(());
        }
        self.index.rebuild(self.store.as_ref()).await
    }

    /// Select one channel for `(group, model)` using an OS-seeded generator.
    ///
    /// See [`select_channel_with`](Self::select_channel_with) for the
    /// algorithm and failure modes.
    ///
    /// # Errors
    /// `NoChannel`, `NoChannelForTag`, `Inconsistency`, `BadArgument`, or a
    /// backend/deadline failure from the database path.
    pub async fn select_channel(
        &self,
        ctx: &RequestContext,
        group: &str,
        model: &str,
        retry: usize,
        tag: Option<&str>,
    ) -> Result<(Arc<Channel>, String), GatewayError> {
        let mut rng = SmallRng::from_os_rng();
        self.select_channel_with(ctx, &mut rng, group, model, retry, tag)
            .await
    }

    /// Select one channel, drawing randomness from the supplied generator.
    ///
    /// `retry` steps down the priority tiers: retry `r` targets the `r`-th
    /// distinct priority (descending, clamped), so each retry degrades to
    /// the next preference class instead of reshuffling the same one. A
    /// request for group `auto` walks the configured auto-group list in
    /// order and records the first group that yields a channel on `ctx`.
    ///
    /// # Errors
    /// `NoChannel`, `NoChannelForTag`, `Inconsistency`, `BadArgument` when
    /// `auto` is requested without configured auto groups, or a
    /// backend/deadline failure from the database path.
    pub async fn select_channel_with<R: Rng + Send + ?Sized>(
        &self,
        ctx: &RequestContext,
        rng: &mut R,
        group: &str,
        model: &str,
        retry: usize,
        tag: Option<&str>,
    ) -> Result<(Arc<Channel>, String), GatewayError> {
        if group != "auto" {
            let channel = self
                .select_in_group(ctx, rng, group, model, retry, tag)
                .await?;
            ctx.set_resolved_group(group);
            return Ok((channel, group.to_string()));
        }

        if self.cfg.auto_groups.is_empty() {
            return Err(GatewayError::BadArgument(
                "group 'auto' requested but no auto groups are configured".to_string(),
            ));
        }

        let mut last_miss = None;
        for auto_group in &self.cfg.auto_groups {
            match self
                .select_in_group(ctx, rng, auto_group, model, retry, tag)
                .await
            {
                Ok(channel) => {
                    ctx.set_resolved_group(auto_group);
                    return Ok((channel, auto_group.clone()));
                }
                Err(miss @ (GatewayError::NoChannel { .. } | GatewayError::NoChannelForTag { .. })) => {
                    last_miss = Some(miss);
                }
                Err(other) => return Err(other),
            }
        }
        Err(last_miss
            .unwrap_or_else(|| GatewayError::no_channel(group, normalize_model(model))))
    }

    async fn select_in_group<R: Rng + Send + ?Sized>(
        &self,
        ctx: &RequestContext,
        rng: &mut R,
        group: &str,
        model: &str,
        retry: usize,
        tag: Option<&str>,
    ) -> Result<Arc<Channel>, GatewayError> {
        if self.cfg.memory_cache_enabled {
            let snapshot = self.index.snapshot();
            let result = select_one(
                &snapshot,
                rng,
                group,
                model,
                retry,
                tag,
                self.cfg.smoothing_factor,
            );
            if let Err(GatewayError::Inconsistency { channel_id }) = &result {
                tracing::error!(
                    channel_id = *channel_id,
                    "channel index references a channel missing from the id map"
                );
            }
            return result;
        }

        let normalized = normalize_model(model);
        let candidates = with_deadline(
            ctx,
            "candidate query",
            self.store.candidate_channels(group, normalized),
        )
        .await?;
        let candidates: Vec<Arc<Channel>> = candidates.into_iter().map(Arc::new).collect();
        choose(
            rng,
            candidates,
            group,
            normalized,
            retry,
            tag,
            self.cfg.smoothing_factor,
        )
    }

    /// Validate a presented token key.
    ///
    /// # Errors
    /// An [`AuthRejection`] naming the first failed check, carrying the
    /// token snapshot when one was resolved. A deadline expiry maps to a
    /// bare `DeadlineExceeded` rejection.
    pub async fn validate_token(
        &self,
        ctx: &RequestContext,
        key: &str,
    ) -> Result<Token, AuthRejection> {
        let outcome = with_deadline(ctx, "token validation", async {
            Ok(self.authorizer.validate(key).await)
        })
        .await;
        match outcome {
            Ok(result) => result,
            Err(error) => Err(AuthRejection::bare(error)),
        }
    }

    /// Account one completed request: rate-log row, statistics upsert, and
    /// per-token call counters.
    ///
    /// # Errors
    /// `BadArgument` for an invalid record, otherwise the first store or
    /// deadline failure. The rate-log row may land even when a later step
    /// fails; the rate log stays authoritative either way.
    pub async fn record_completion(
        &self,
        ctx: &RequestContext,
        record: &CompletionRecord,
    ) -> Result<(), GatewayError> {
        with_deadline(
            ctx,
            "usage accounting",
            self.accountant.record_completion(record),
        )
        .await
    }

    /// Return `delta` quota from `used` back into `remain` for a token.
    ///
    /// # Errors
    /// `BadArgument` for a negative delta, otherwise the store failure.
    pub async fn credit_quota(&self, token_id: i64, delta: i64) -> Result<(), GatewayError> {
        if delta < 0 {
            return Err(GatewayError::bad_argument("delta"));
        }
        self.store.credit_token_quota(token_id, delta).await
    }

    /// Move `delta` quota from `remain` into `used` for a token.
    ///
    /// # Errors
    /// `BadArgument` for a negative delta, otherwise the store failure.
    pub async fn debit_quota(&self, token_id: i64, delta: i64) -> Result<(), GatewayError> {
        if delta < 0 {
            return Err(GatewayError::bad_argument("delta"));
        }
        self.store.debit_token_quota(token_id, delta).await
    }

    /// Look up a channel by id in the current index snapshot.
    #[must_use]
    pub fn channel(&self, id: i64) -> Option<Arc<Channel>> {
        self.index.get(id)
    }

    /// Flip a channel's status in the index, as the health monitor does
    /// between refreshes. Takes effect immediately for selection; the next
    /// rebuild reconciles with the database.
    pub fn set_channel_status(&self, id: i64, status: ChannelStatus) {
        self.index.set_status(id, status);
    }

    /// Apply any queued quota writes now instead of waiting for the flusher.
    ///
    /// # Errors
    /// The first store failure; failed deltas are re-queued.
    pub async fn flush_quota_writes(&self) -> Result<(), GatewayError> {
        match &self.batcher {
            Some(batcher) => batcher.flush().await,
            None => Ok(()),
        }
    }

    /// Spawn the periodic index refresh task.
    #[must_use]
    pub fn spawn_refresh(self: &Arc<Self>) -> TaskHandle {
        let (stop_tx, mut stop_rx) = tokio::sync::oneshot::channel();
        let gateway = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(gateway.cfg.sync_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // interval fires immediately; the initial build happened at startup
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        if let Err(error) = gateway.refresh().await {
                            tracing::warn!(%error, "channel index refresh failed");
                        }
                    }
                }
            }
        });
        TaskHandle::new(task, stop_tx)
    }

    /// Spawn the batch flusher, if batch updates are enabled.
    #[must_use]
    pub fn spawn_batch_flush(&self) -> Option<TaskHandle> {
        self.batcher
            .as_ref()
            .map(|batcher| batcher.spawn_flusher(self.cfg.sync_interval))
    }
}
