//! Usage accounting: the two sinks fired once per completed request.

use std::sync::Arc;

use chrono_tz::Tz;

use crate::clock::Clock;
use crate::error::GatewayError;
use crate::store::Store;
use crate::types::{CompletionRecord, UsageDeltas, UsageKey};
use crate::rate;

/// Records completed requests into the rate log, the statistics table, and
/// the per-token call counters.
///
/// The rate log is authoritative for rate limiting and is written first; the
/// statistics row and call counters are best-effort relative to it, so a
/// request cancelled mid-accounting can leave a rate-log row with no
/// statistics contribution.
pub struct Accountant {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    zone: Tz,
}

impl Accountant {
    /// Create an accountant over a store, clock, and local zone.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, zone: Tz) -> Self {
        Self { store, clock, zone }
    }

    /// Account one completed request.
    ///
    /// Appends the rate-log row, folds the deltas into the `(date, token,
    /// model)` statistics row, and bumps the token's total/daily call
    /// counters.
    ///
    /// # Errors
    /// `BadArgument` for a non-positive token id or empty model name;
    /// otherwise the first store failure.
    pub async fn record_completion(&self, record: &CompletionRecord) -> Result<(), GatewayError> {
        if record.token_id <= 0 {
            return Err(GatewayError::bad_argument("token_id"));
        }
        if record.model.is_empty() {
            return Err(GatewayError::bad_argument("model"));
        }

        let now = self.clock.now();
        self.store
            .insert_rate_log(record.token_id, now.timestamp())
            .await?;

        let today = rate::today(now, self.zone);
        let key = UsageKey {
            date: today.clone(),
            token_id: record.token_id,
            model_name: record.model.clone(),
        };
        self.store
            .upsert_usage(&key, &completion_deltas(record))
            .await?;

        self.store
            .increase_token_usage_count(record.token_id, &today)
            .await
    }
}

/// The additive statistics contribution of one completed request.
#[must_use]
pub fn completion_deltas(record: &CompletionRecord) -> UsageDeltas {
    UsageDeltas {
        token_name: record.token_name.clone(),
        total_requests: 1,
        successful_requests: i64::from(record.success),
        failed_requests: i64::from(!record.success),
        prompt_tokens: record.prompt_tokens,
        completion_tokens: record.completion_tokens,
        total_tokens: record.prompt_tokens + record.completion_tokens,
        total_quota: record.quota,
    }
}
