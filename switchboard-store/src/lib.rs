//! switchboard-store
//!
//! `sqlx`-backed implementation of the persistence port over `AnyPool`.
//! MySQL, PostgreSQL, and SQLite are supported; the dialect only selects SQL
//! strings (see the `sql` module), never changes the shapes handed upward.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{AnyPool, Row};
use switchboard_core::{
    Ability, Channel, GatewayError, Store, Token, UsageDeltas, UsageKey,
};
use switchboard_types::{Backend, ChannelStatus, TokenStatus};

mod sql;

/// SQL-backed [`Store`].
pub struct SqlStore {
    pool: AnyPool,
    backend: Backend,
}

impl SqlStore {
    /// Connect to `url` and return a store speaking the given dialect.
    ///
    /// # Errors
    /// Returns a backend error if the pool cannot be established.
    pub async fn connect(backend: Backend, url: &str) -> Result<Self, GatewayError> {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await
            .map_err(GatewayError::backend)?;
        Ok(Self { pool, backend })
    }

    /// Wrap an existing pool (tests tune pool sizing themselves).
    #[must_use]
    pub const fn from_pool(pool: AnyPool, backend: Backend) -> Self {
        Self { pool, backend }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// Create the gateway tables if they do not exist.
    ///
    /// # Errors
    /// Returns the first DDL failure.
    pub async fn init_schema(&self) -> Result<(), GatewayError> {
        for statement in sql::schema(self.backend) {
            sqlx::query(&statement)
                .execute(&self.pool)
                .await
                .map_err(GatewayError::backend)?;
        }
        tracing::debug!(backend = ?self.backend, "gateway schema ensured");
        Ok(())
    }
}

fn channel_from_row(row: &AnyRow) -> Result<Channel, GatewayError> {
    let status_code: i64 = row.try_get("status").map_err(GatewayError::backend)?;
    let status = ChannelStatus::from_i64(status_code)
        .ok_or_else(|| GatewayError::backend(format!("unknown channel status {status_code}")))?;
    Ok(Channel {
        id: row.try_get("id").map_err(GatewayError::backend)?,
        name: row.try_get("name").map_err(GatewayError::backend)?,
        upstream: row.try_get("type").map_err(GatewayError::backend)?,
        status,
        key: row.try_get("key").map_err(GatewayError::backend)?,
        models: row.try_get("models").map_err(GatewayError::backend)?,
        groups: row.try_get("group").map_err(GatewayError::backend)?,
        priority: row.try_get("priority").map_err(GatewayError::backend)?,
        weight: row.try_get("weight").map_err(GatewayError::backend)?,
        tag: row.try_get("tag").map_err(GatewayError::backend)?,
        settings: row.try_get("settings").map_err(GatewayError::backend)?,
    })
}

fn token_from_row(row: &AnyRow) -> Result<Token, GatewayError> {
    let status_code: i64 = row.try_get("status").map_err(GatewayError::backend)?;
    let status = TokenStatus::from_i64(status_code)
        .ok_or_else(|| GatewayError::backend(format!("unknown token status {status_code}")))?;
    let unlimited: i64 = row
        .try_get("unlimited_quota")
        .map_err(GatewayError::backend)?;
    Ok(Token {
        id: row.try_get("id").map_err(GatewayError::backend)?,
        user_id: row.try_get("user_id").map_err(GatewayError::backend)?,
        key: row.try_get("key").map_err(GatewayError::backend)?,
        status,
        name: row.try_get("name").map_err(GatewayError::backend)?,
        created_time: row.try_get("created_time").map_err(GatewayError::backend)?,
        accessed_time: row.try_get("accessed_time").map_err(GatewayError::backend)?,
        expired_time: row.try_get("expired_time").map_err(GatewayError::backend)?,
        remain_quota: row.try_get("remain_quota").map_err(GatewayError::backend)?,
        used_quota: row.try_get("used_quota").map_err(GatewayError::backend)?,
        unlimited_quota: unlimited != 0,
        group: row.try_get("group").map_err(GatewayError::backend)?,
        allow_ips: row.try_get("allow_ips").map_err(GatewayError::backend)?,
        model_limits: row.try_get("model_limits").map_err(GatewayError::backend)?,
        daily_usage_count: row
            .try_get("daily_usage_count")
            .map_err(GatewayError::backend)?,
        total_usage_count: row
            .try_get("total_usage_count")
            .map_err(GatewayError::backend)?,
        last_usage_date: row
            .try_get("last_usage_date")
            .map_err(GatewayError::backend)?,
        rate_limit_per_minute: row
            .try_get("rate_limit_per_minute")
            .map_err(GatewayError::backend)?,
        rate_limit_per_day: row
            .try_get("rate_limit_per_day")
            .map_err(GatewayError::backend)?,
        last_rate_limit_reset: row
            .try_get("last_rate_limit_reset")
            .map_err(GatewayError::backend)?,
        channel_tag: row.try_get("channel_tag").map_err(GatewayError::backend)?,
        total_usage_limit: row
            .try_get("total_usage_limit")
            .map_err(GatewayError::backend)?,
    })
}

#[async_trait]
impl Store for SqlStore {
    async fn load_all_channels(&self) -> Result<Vec<Channel>, GatewayError> {
        let rows = sqlx::query(&sql::load_all_channels(self.backend))
            .fetch_all(&self.pool)
            .await
            .map_err(GatewayError::backend)?;
        rows.iter().map(channel_from_row).collect()
    }

    async fn load_all_abilities(&self) -> Result<Vec<Ability>, GatewayError> {
        let rows = sqlx::query(&sql::load_all_abilities(self.backend))
            .fetch_all(&self.pool)
            .await
            .map_err(GatewayError::backend)?;
        rows.iter()
            .map(|row| {
                Ok(Ability {
                    group: row.try_get("group").map_err(GatewayError::backend)?,
                    model: row.try_get("model").map_err(GatewayError::backend)?,
                    channel_id: row.try_get("channel_id").map_err(GatewayError::backend)?,
                })
            })
            .collect()
    }

    async fn candidate_channels(
        &self,
        group: &str,
        model: &str,
    ) -> Result<Vec<Channel>, GatewayError> {
        let rows = sqlx::query(&sql::candidate_channels(self.backend))
            .bind(group)
            .bind(model)
            .bind(ChannelStatus::Enabled.as_i64())
            .fetch_all(&self.pool)
            .await
            .map_err(GatewayError::backend)?;
        rows.iter().map(channel_from_row).collect()
    }

    async fn find_token_by_key(&self, key: &str) -> Result<Option<Token>, GatewayError> {
        let row = sqlx::query(&sql::find_token_by_key(self.backend))
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(GatewayError::backend)?;
        row.as_ref().map(token_from_row).transpose()
    }

    async fn update_token_status(
        &self,
        id: i64,
        status: TokenStatus,
    ) -> Result<(), GatewayError> {
        sqlx::query(&sql::update_token_status(self.backend))
            .bind(status.as_i64())
            .bind(Utc::now().timestamp())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(GatewayError::backend)?;
        Ok(())
    }

    async fn update_rate_limit_reset(&self, id: i64, at: i64) -> Result<(), GatewayError> {
        sqlx::query(&sql::update_rate_limit_reset(self.backend))
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(GatewayError::backend)?;
        Ok(())
    }

    async fn credit_token_quota(&self, id: i64, delta: i64) -> Result<(), GatewayError> {
        sqlx::query(&sql::credit_token_quota(self.backend))
            .bind(delta)
            .bind(delta)
            .bind(Utc::now().timestamp())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(GatewayError::backend)?;
        Ok(())
    }

    async fn debit_token_quota(&self, id: i64, delta: i64) -> Result<(), GatewayError> {
        sqlx::query(&sql::debit_token_quota(self.backend))
            .bind(delta)
            .bind(delta)
            .bind(Utc::now().timestamp())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(GatewayError::backend)?;
        Ok(())
    }

    async fn insert_rate_log(&self, token_id: i64, at: i64) -> Result<(), GatewayError> {
        sqlx::query(&sql::insert_rate_log(self.backend))
            .bind(token_id)
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(GatewayError::backend)?;
        Ok(())
    }

    async fn count_rate_log_since(
        &self,
        token_id: i64,
        since: i64,
    ) -> Result<i64, GatewayError> {
        let count: i64 = sqlx::query_scalar(&sql::count_rate_log_since(self.backend))
            .bind(token_id)
            .bind(since)
            .fetch_one(&self.pool)
            .await
            .map_err(GatewayError::backend)?;
        Ok(count)
    }

    async fn upsert_usage(
        &self,
        key: &UsageKey,
        deltas: &UsageDeltas,
    ) -> Result<(), GatewayError> {
        let now = Utc::now().timestamp();
        sqlx::query(&sql::upsert_usage(self.backend))
            .bind(key.date.as_str())
            .bind(key.token_id)
            .bind(deltas.token_name.as_str())
            .bind(key.model_name.as_str())
            .bind(deltas.total_requests)
            .bind(deltas.successful_requests)
            .bind(deltas.failed_requests)
            .bind(deltas.prompt_tokens)
            .bind(deltas.completion_tokens)
            .bind(deltas.total_tokens)
            .bind(deltas.total_quota)
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(GatewayError::backend)?;
        Ok(())
    }

    async fn increase_token_usage_count(
        &self,
        id: i64,
        today: &str,
    ) -> Result<(), GatewayError> {
        sqlx::query(&sql::increase_token_usage_count(self.backend))
            .bind(today)
            .bind(today)
            .bind(Utc::now().timestamp())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(GatewayError::backend)?;
        Ok(())
    }
}
