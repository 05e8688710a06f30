use thiserror::Error;

/// Fixed-window flavor named by a rate-limit rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateWindow {
    /// The window starting at `floor(now / 60) * 60`.
    Minute,
    /// The window starting at local midnight.
    Day,
}

impl std::fmt::Display for RateWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Minute => f.write_str("minute"),
            Self::Day => f.write_str("day"),
        }
    }
}

/// Unified error type for the switchboard workspace.
///
/// Covers selection misses, index consistency violations, the token-failure
/// taxonomy, quota/rate rejections, and opaque backend failures.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GatewayError {
    /// No enabled channel serves the requested group/model pair.
    #[error("no channel available for group '{group}' and model '{model}'")]
    NoChannel {
        /// Group the request was resolved against.
        group: String,
        /// Model name after normalization.
        model: String,
    },

    /// Candidates existed but none carried the requested tag.
    #[error("no available channel carries tag '{tag}'")]
    NoChannelForTag {
        /// Tag the token is pinned to.
        tag: String,
    },

    /// The index references a channel id that is missing from the id map.
    ///
    /// Operators must see the offending id; callers surface this to clients
    /// as a backend error.
    #[error("index inconsistency: channel #{channel_id} is referenced but does not exist")]
    Inconsistency {
        /// The dangling channel id.
        channel_id: i64,
    },

    /// No token matches the presented key.
    #[error("token not found")]
    TokenMissing,

    /// The token has been disabled by an operator.
    #[error("token is disabled")]
    TokenDisabled,

    /// The token is past its expiry timestamp.
    #[error("token has expired")]
    TokenExpired,

    /// The token has no remaining quota.
    #[error("token quota exhausted [{key_hint}]")]
    TokenExhausted {
        /// Obfuscated key (`abc***xyz`) safe for logs and client messages.
        key_hint: String,
    },

    /// The token reached its lifetime call cap.
    #[error("total call cap reached: limit {limit}, used {used}")]
    CapExceeded {
        /// Configured lifetime cap.
        limit: i64,
        /// Calls consumed so far.
        used: i64,
    },

    /// The token exceeded a fixed-window rate limit.
    #[error("rate limit exceeded for the current {window}")]
    RateExceeded {
        /// Which window rejected the request.
        window: RateWindow,
    },

    /// An operation exceeded the request deadline.
    #[error("{operation} exceeded the request deadline")]
    DeadlineExceeded {
        /// Label of the operation that timed out.
        operation: &'static str,
    },

    /// The storage backend failed; the cause is surfaced unchanged.
    #[error("backend error: {0}")]
    Backend(String),

    /// Invalid input argument.
    #[error("invalid argument: {0}")]
    BadArgument(String),
}

impl GatewayError {
    /// Helper: build a `NoChannel` miss for a group/model pair.
    pub fn no_channel(group: impl Into<String>, model: impl Into<String>) -> Self {
        Self::NoChannel {
            group: group.into(),
            model: model.into(),
        }
    }

    /// Helper: build a `NoChannelForTag` miss.
    pub fn no_channel_for_tag(tag: impl Into<String>) -> Self {
        Self::NoChannelForTag { tag: tag.into() }
    }

    /// Helper: build a `Backend` error from any displayable cause.
    pub fn backend(cause: impl std::fmt::Display) -> Self {
        Self::Backend(cause.to_string())
    }

    /// Helper: build a `BadArgument` error naming the offending field.
    pub fn bad_argument(field: impl Into<String>) -> Self {
        Self::BadArgument(field.into())
    }

    /// Helper: build a `DeadlineExceeded` error for an operation label.
    #[must_use]
    pub const fn deadline(operation: &'static str) -> Self {
        Self::DeadlineExceeded { operation }
    }
}
