//! Switchboard multiplexes LLM API requests across many upstream providers.
//!
//! Overview
//! - Selects a concrete channel per request from an in-memory reverse index
//!   keyed by `(group, model)`, rebuilt from the database on an interval and
//!   swapped in atomically.
//! - Authorizes the presented token against status, expiry, quota, a
//!   lifetime call cap, and fixed-window per-minute/per-day rate limits.
//! - Accounts every completed request into an append-only rate log, an
//!   atomically upserted `(date, token, model)` statistics row, and the
//!   per-token call counters.
//!
//! Key behaviors and trade-offs
//! - Selection: priority tiers express coarse preference classes; the retry
//!   ordinal steps down one tier per retry so failures degrade instead of
//!   reshuffling; weights split traffic within a tier with additive
//!   smoothing so zero-weight channels still see requests.
//! - The in-memory index trades freshness for latency; disabling it queries
//!   the database per selection with identical semantics.
//! - Rate limiting is fixed-window (`floor(now/60)` minutes, local-zone
//!   days) over the rate-log table; the log is the truth, cap fields are
//!   policy.
//! - Quota batching coalesces hot-token writes at the cost of the on-disk
//!   balance lagging one flush interval; the token cache absorbs the lag.
//!
//! Examples
//! - End-to-end request flow: see `./examples/01_request_flow.rs`.
#![warn(missing_docs)]

pub(crate) mod context;
pub(crate) mod core;

pub use context::{RequestContext, with_deadline};
pub use core::{Gateway, GatewayBuilder};

pub use switchboard_middleware::CachingStore;

// Re-export core types for convenience
pub use switchboard_core::{
    Ability,
    Accountant,
    AuthRejection,
    Authorizer,
    BatchingStore,
    Channel,
    ChannelIndex,
    Clock,
    CompletionRecord,
    GatewayError,
    IndexSnapshot,
    RateWindow,
    Store,
    SystemClock,
    TaskHandle,
    Token,
    UsageDeltas,
    UsageKey,
    UsageRow,
};
pub use switchboard_types::{
    Backend, CacheCoherence, ChannelStatus, GatewayConfig, StatusWritePolicy, TokenStatus,
};
