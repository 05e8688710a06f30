//! Configuration types shared across the gateway and its stores.

use std::time::Duration;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// SQL dialect the persistence layer speaks.
///
/// Dialect selection only changes the SQL strings emitted by the store; the
/// result shapes exposed to the rest of the workspace are uniform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum Backend {
    /// MySQL / MariaDB.
    Mysql,
    /// PostgreSQL.
    Postgres,
    /// SQLite (also the default for single-node deployments).
    #[default]
    Sqlite,
}

/// Whether an out-of-process coherence layer backs the token cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum CacheCoherence {
    /// A shared cache keeps token snapshots warm across instances.
    Redis,
    /// No token cache; every authorization reads the database.
    #[default]
    Off,
}

/// Where token expiry/exhaustion transitions are written when detected.
///
/// The authorizer flips a token to `expired` or `exhausted` the moment the
/// condition is observed. Deployments whose cache is treated as authoritative
/// may defer the database write to the cache layer instead of paying a
/// synchronous update on the request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub enum StatusWritePolicy {
    /// Write the status transition to the database immediately.
    #[default]
    Immediate,
    /// Record the transition in the cache only; the database row converges
    /// through later writes.
    CacheOnly,
}

/// Global configuration for the `Gateway`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Serve channel selection from the in-memory index. When disabled, every
    /// selection queries the database for the equivalent candidate list.
    pub memory_cache_enabled: bool,
    /// Token cache coherence mode.
    pub cache_coherence: CacheCoherence,
    /// Coalesce quota writes and flush them on an interval instead of issuing
    /// one UPDATE per request.
    pub batch_update: bool,
    /// Interval between automatic index rebuilds (and batch flushes).
    pub sync_interval: Duration,
    /// Ordered list of groups tried when a request names the `auto` group.
    pub auto_groups: Vec<String>,
    /// Additive smoothing applied to channel weights so zero-weight channels
    /// are never starved.
    pub smoothing_factor: i64,
    /// SQL dialect of the backing database.
    pub backend: Backend,
    /// Local zone used for day-window rate limits and statistics dates.
    pub local_zone: Tz,
    /// Write path for expiry/exhaustion transitions detected at authorization.
    pub status_write: StatusWritePolicy,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            memory_cache_enabled: true,
            cache_coherence: CacheCoherence::default(),
            batch_update: false,
            sync_interval: Duration::from_secs(60),
            auto_groups: Vec::new(),
            smoothing_factor: 10,
            backend: Backend::default(),
            local_zone: Tz::UTC,
            status_write: StatusWritePolicy::default(),
        }
    }
}
