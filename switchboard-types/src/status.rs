//! Channel and token lifecycle states with their stable wire codes.

use serde::{Deserialize, Serialize};

/// Lifecycle state of an upstream channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChannelStatus {
    /// The channel accepts traffic.
    Enabled,
    /// Disabled by an operator.
    Disabled,
    /// Disabled by the health monitor after repeated upstream failures.
    AutoDisabled,
}

impl ChannelStatus {
    /// Stable integer code persisted in the `channels.status` column.
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        match self {
            Self::Enabled => 1,
            Self::Disabled => 2,
            Self::AutoDisabled => 3,
        }
    }

    /// Decode a persisted status code. Unknown codes are rejected so schema
    /// drift surfaces as an error instead of silently enabling a channel.
    #[must_use]
    pub const fn from_i64(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Enabled),
            2 => Some(Self::Disabled),
            3 => Some(Self::AutoDisabled),
            _ => None,
        }
    }
}

/// Lifecycle state of an API token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TokenStatus {
    /// The token authorizes requests.
    Enabled,
    /// Disabled by an operator.
    Disabled,
    /// Past its expiry timestamp.
    Expired,
    /// Out of quota.
    Exhausted,
}

impl TokenStatus {
    /// Stable integer code persisted in the `tokens.status` column.
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        match self {
            Self::Enabled => 1,
            Self::Disabled => 2,
            Self::Expired => 3,
            Self::Exhausted => 4,
        }
    }

    /// Decode a persisted status code.
    #[must_use]
    pub const fn from_i64(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Enabled),
            2 => Some(Self::Disabled),
            3 => Some(Self::Expired),
            4 => Some(Self::Exhausted),
            _ => None,
        }
    }
}
