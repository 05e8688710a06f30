//! The persistence port consumed by the index, authorizer, and accountant.
//!
//! Implementations speak one SQL dialect each (or none, for the in-memory
//! test store); the trait keeps the result shapes uniform so nothing above
//! this seam knows which backend is configured. Middleware layers (token
//! cache, quota batching) wrap a `Store` and forward what they do not
//! intercept.

use async_trait::async_trait;
use switchboard_types::TokenStatus;

use crate::error::GatewayError;
use crate::types::{Ability, Channel, Token, UsageDeltas, UsageKey};

/// Narrow query surface over channels, tokens, rate-log rows, and usage rows.
#[async_trait]
pub trait Store: Send + Sync {
    /// Load every channel regardless of status (index rebuild).
    async fn load_all_channels(&self) -> Result<Vec<Channel>, GatewayError>;

    /// Load every ability row (index rebuild).
    async fn load_all_abilities(&self) -> Result<Vec<Ability>, GatewayError>;

    /// Enabled channels serving `(group, model)`, ordered by priority
    /// descending then id ascending. Used when the in-memory index is
    /// disabled; the candidate list is equivalent to an index bucket.
    async fn candidate_channels(
        &self,
        group: &str,
        model: &str,
    ) -> Result<Vec<Channel>, GatewayError>;

    /// Look up a token by its key. `Ok(None)` means no such token.
    async fn find_token_by_key(&self, key: &str) -> Result<Option<Token>, GatewayError>;

    /// Persist a token status transition (expiry, exhaustion, re-enable).
    async fn update_token_status(&self, id: i64, status: TokenStatus)
    -> Result<(), GatewayError>;

    /// Persist a refreshed `last_rate_limit_reset` timestamp.
    async fn update_rate_limit_reset(&self, id: i64, at: i64) -> Result<(), GatewayError>;

    /// Move `delta` from `used_quota` into `remain_quota` and touch
    /// `accessed_time`. `delta` is non-negative; callers validate.
    async fn credit_token_quota(&self, id: i64, delta: i64) -> Result<(), GatewayError>;

    /// Move `delta` from `remain_quota` into `used_quota` and touch
    /// `accessed_time`. `delta` is non-negative; callers validate.
    async fn debit_token_quota(&self, id: i64, delta: i64) -> Result<(), GatewayError>;

    /// Append one rate-log row. Rows are never updated.
    async fn insert_rate_log(&self, token_id: i64, at: i64) -> Result<(), GatewayError>;

    /// Count rate-log rows for `token_id` with `created_at >= since`.
    async fn count_rate_log_since(&self, token_id: i64, since: i64)
    -> Result<i64, GatewayError>;

    /// Atomically fold `deltas` into the statistics row for `key`, creating
    /// the row on first use. Two concurrent upserts for the same key must
    /// both land; the row equals the sum of all contributions.
    async fn upsert_usage(&self, key: &UsageKey, deltas: &UsageDeltas)
    -> Result<(), GatewayError>;

    /// Bump the per-token call counters in one atomic update:
    /// `total_usage_count + 1`, and `daily_usage_count` continues when
    /// `last_usage_date == today` or restarts at 1 otherwise.
    async fn increase_token_usage_count(&self, id: i64, today: &str)
    -> Result<(), GatewayError>;
}
