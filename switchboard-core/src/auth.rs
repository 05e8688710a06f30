//! Token authorization: the ordered check chain run on every request.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use switchboard_types::TokenStatus;
use thiserror::Error;

use crate::clock::Clock;
use crate::error::{GatewayError, RateWindow};
use crate::rate;
use crate::store::Store;
use crate::types::Token;

/// An authorization failure carrying the token snapshot that produced it.
///
/// The snapshot lets callers log the offending token (obfuscated key, id)
/// without a second lookup. It is `None` when the key matched nothing or the
/// lookup itself failed.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct AuthRejection {
    /// State of the token at rejection time, if one was found.
    pub snapshot: Option<Token>,
    /// The underlying failure.
    pub error: GatewayError,
}

impl AuthRejection {
    /// A rejection with a token snapshot attached.
    #[must_use]
    pub const fn new(snapshot: Option<Token>, error: GatewayError) -> Self {
        Self { snapshot, error }
    }

    /// A rejection raised before any token was resolved.
    #[must_use]
    pub const fn bare(error: GatewayError) -> Self {
        Self {
            snapshot: None,
            error,
        }
    }
}

/// Validates presented keys against status, expiry, quota, call caps, and the
/// fixed-window rate limits.
///
/// Checks run in a fixed order and the first failure short-circuits. Expiry
/// and exhaustion are state-mutating recoveries: the observed condition is
/// written back through the store (the cache layer decides whether the
/// database write is immediate or deferred). The rate-log table is the
/// authoritative counter for both rate windows; the per-token cap fields are
/// policy only.
pub struct Authorizer {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    zone: Tz,
}

impl Authorizer {
    /// Create an authorizer over a store, clock, and local zone.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, zone: Tz) -> Self {
        Self { store, clock, zone }
    }

    /// Run the full check chain for `key`.
    ///
    /// # Errors
    /// Returns an [`AuthRejection`] naming the first failed check, with the
    /// token snapshot attached whenever one was resolved.
    pub async fn validate(&self, key: &str) -> Result<Token, AuthRejection> {
        if key.is_empty() {
            return Err(AuthRejection::bare(GatewayError::bad_argument("key")));
        }

        let found = self
            .store
            .find_token_by_key(key)
            .await
            .map_err(AuthRejection::bare)?;
        let Some(mut token) = found else {
            return Err(AuthRejection::bare(GatewayError::TokenMissing));
        };

        match token.status {
            TokenStatus::Disabled => {
                return Err(AuthRejection::new(Some(token), GatewayError::TokenDisabled));
            }
            TokenStatus::Exhausted => {
                let key_hint = token.obfuscated_key();
                return Err(AuthRejection::new(
                    Some(token),
                    GatewayError::TokenExhausted { key_hint },
                ));
            }
            TokenStatus::Expired => {
                return Err(AuthRejection::new(Some(token), GatewayError::TokenExpired));
            }
            TokenStatus::Enabled => {}
        }

        let now = self.clock.now();

        if token.expired_time != -1 && token.expired_time < now.timestamp() {
            self.transition(&mut token, TokenStatus::Expired).await;
            return Err(AuthRejection::new(Some(token), GatewayError::TokenExpired));
        }

        if !token.unlimited_quota && token.remain_quota <= 0 {
            self.transition(&mut token, TokenStatus::Exhausted).await;
            let key_hint = token.obfuscated_key();
            return Err(AuthRejection::new(
                Some(token),
                GatewayError::TokenExhausted { key_hint },
            ));
        }

        if let Some(limit) = token.total_usage_limit
            && limit > 0
            && token.total_usage_count >= limit
        {
            let used = token.total_usage_count;
            return Err(AuthRejection::new(
                Some(token),
                GatewayError::CapExceeded { limit, used },
            ));
        }

        if let Err(error) = self.check_rate_limits(&mut token, now).await {
            return Err(AuthRejection::new(Some(token), error));
        }

        Ok(token)
    }

    /// Record a status transition on the snapshot and write it back.
    ///
    /// The write is best-effort: the caller rejects the request either way,
    /// and the next authorization re-observes the condition.
    async fn transition(&self, token: &mut Token, status: TokenStatus) {
        token.status = status;
        if let Err(error) = self.store.update_token_status(token.id, status).await {
            tracing::warn!(token_id = token.id, %error, "failed to persist token status transition");
        }
    }

    async fn check_rate_limits(
        &self,
        token: &mut Token,
        now: DateTime<Utc>,
    ) -> Result<(), GatewayError> {
        if token.rate_limit_per_minute <= 0 && token.rate_limit_per_day <= 0 {
            return Ok(());
        }

        if token.rate_limit_per_minute > 0 {
            let window = rate::minute_start(now);
            if token.last_rate_limit_reset < window {
                token.last_rate_limit_reset = now.timestamp();
                if let Err(error) = self
                    .store
                    .update_rate_limit_reset(token.id, token.last_rate_limit_reset)
                    .await
                {
                    tracing::warn!(token_id = token.id, %error, "failed to refresh rate-limit reset");
                }
            }
            let count = self.store.count_rate_log_since(token.id, window).await?;
            if count >= token.rate_limit_per_minute {
                return Err(GatewayError::RateExceeded {
                    window: RateWindow::Minute,
                });
            }
        }

        if token.rate_limit_per_day > 0 {
            let window = rate::day_start(now, self.zone);
            let count = self.store.count_rate_log_since(token.id, window).await?;
            if count >= token.rate_limit_per_day {
                return Err(GatewayError::RateExceeded {
                    window: RateWindow::Day,
                });
            }
        }

        Ok(())
    }
}
