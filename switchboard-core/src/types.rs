//! Domain records shared by the index, selector, authorizer, and accountant.

use std::collections::HashSet;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use switchboard_types::{ChannelStatus, TokenStatus};

/// A configured upstream provider endpoint.
///
/// `models` and `groups` are stored comma-joined exactly as the admin surface
/// writes them; [`Channel::model_list`] and [`Channel::group_list`] split them
/// on demand. A channel is a selection candidate for `(g, m)` iff `g` is in
/// its groups, `m` is in its models, and its status is enabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    /// Stable identifier.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Upstream type tag (e.g. `openai`, `anthropic`).
    pub upstream: String,
    /// Lifecycle state.
    pub status: ChannelStatus,
    /// Opaque credential string presented to the upstream.
    pub key: String,
    /// Comma-joined list of served model names.
    pub models: String,
    /// Comma-joined list of groups this channel serves.
    pub groups: String,
    /// Preference class; higher is preferred.
    pub priority: i64,
    /// Intra-class share for the weighted draw.
    pub weight: i64,
    /// Optional tag tokens can be pinned to.
    pub tag: Option<String>,
    /// Free-form settings blob interpreted by the request transcoder.
    pub settings: Option<String>,
}

impl Channel {
    /// Served model names, split on comma.
    #[must_use]
    pub fn model_list(&self) -> Vec<&str> {
        if self.models.is_empty() {
            return Vec::new();
        }
        self.models.split(',').collect()
    }

    /// Group memberships, split on comma.
    #[must_use]
    pub fn group_list(&self) -> Vec<&str> {
        if self.groups.is_empty() {
            return Vec::new();
        }
        self.groups.split(',').collect()
    }

    /// Whether this channel is an eligible candidate for `(group, model)`.
    #[must_use]
    pub fn serves(&self, group: &str, model: &str) -> bool {
        self.status == ChannelStatus::Enabled
            && self.group_list().contains(&group)
            && self.model_list().contains(&model)
    }

    /// Tag with empty-string normalized away.
    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref().filter(|t| !t.is_empty())
    }
}

/// An API token presented by a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    /// Stable identifier.
    pub id: i64,
    /// Owning user id.
    pub user_id: i64,
    /// The 48-character secret key (unique).
    pub key: String,
    /// Lifecycle state.
    pub status: TokenStatus,
    /// Display name.
    pub name: String,
    /// Creation timestamp (epoch seconds).
    pub created_time: i64,
    /// Last access timestamp (epoch seconds).
    pub accessed_time: i64,
    /// Expiry timestamp (epoch seconds); `-1` means never.
    pub expired_time: i64,
    /// Remaining quota balance.
    pub remain_quota: i64,
    /// Lifetime quota spend.
    pub used_quota: i64,
    /// Quota checks are skipped when set.
    pub unlimited_quota: bool,
    /// Group the token belongs to.
    pub group: String,
    /// Optional newline-separated source-IP allow-list.
    pub allow_ips: Option<String>,
    /// Optional comma-separated model whitelist; `None` means unrestricted.
    pub model_limits: Option<String>,
    /// Calls made today (rolls over on `last_usage_date`).
    pub daily_usage_count: i64,
    /// Lifetime call count.
    pub total_usage_count: i64,
    /// Date (`YYYY-MM-DD`) of the most recent call.
    pub last_usage_date: String,
    /// Per-minute call cap; `0` disables the check.
    pub rate_limit_per_minute: i64,
    /// Per-day call cap; `0` disables the check.
    pub rate_limit_per_day: i64,
    /// Timestamp of the last rate-window reset observed for this token.
    pub last_rate_limit_reset: i64,
    /// Optional pin restricting selection to channels with this tag.
    pub channel_tag: Option<String>,
    /// Optional lifetime call cap; `None` means uncapped.
    pub total_usage_limit: Option<i64>,
}

impl Token {
    /// Key obfuscated to `abc***xyz` (first three and last three characters),
    /// safe for logs and user-facing rejection messages.
    #[must_use]
    pub fn obfuscated_key(&self) -> String {
        if self.key.len() >= 6 && self.key.is_char_boundary(3) {
            let tail = self.key.len() - 3;
            if self.key.is_char_boundary(tail) {
                return format!("{}***{}", &self.key[..3], &self.key[tail..]);
            }
        }
        "***".to_string()
    }

    /// Channel-tag pin with empty-string normalized away.
    #[must_use]
    pub fn channel_tag(&self) -> Option<&str> {
        self.channel_tag.as_deref().filter(|t| !t.is_empty())
    }

    /// Parsed source-IP allow-list. Entries that do not parse as IP addresses
    /// are dropped. An empty set means no IP restriction.
    #[must_use]
    pub fn allow_ip_set(&self) -> HashSet<IpAddr> {
        let Some(raw) = self.allow_ips.as_deref() else {
            return HashSet::new();
        };
        raw.replace(' ', "")
            .split('\n')
            .map(|line| line.replace(',', ""))
            .filter_map(|ip| ip.parse().ok())
            .collect()
    }

    /// Model whitelist, split on comma. Empty means unrestricted.
    #[must_use]
    pub fn model_whitelist(&self) -> Vec<String> {
        match self.model_limits.as_deref() {
            None | Some("") => Vec::new(),
            Some(raw) => raw.split(',').map(str::to_string).collect(),
        }
    }
}

/// A materialized `(group, model, channel)` fact.
///
/// The relational form of the reverse index; consumed only during index
/// rebuilds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ability {
    /// Group label.
    pub group: String,
    /// Model name.
    pub model: String,
    /// Channel serving the pair.
    pub channel_id: i64,
}

/// Natural key of a usage-statistics row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UsageKey {
    /// Local-zone date, `YYYY-MM-DD`.
    pub date: String,
    /// Token the usage is attributed to.
    pub token_id: i64,
    /// Model that served the request.
    pub model_name: String,
}

/// Additive contribution of one completed request to a statistics row.
///
/// `token_name` is not a counter: the most recent writer wins, keeping the
/// display name current.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageDeltas {
    /// Display name of the token at completion time.
    pub token_name: String,
    /// Requests to add (one per completion).
    pub total_requests: i64,
    /// Successful requests to add.
    pub successful_requests: i64,
    /// Failed requests to add.
    pub failed_requests: i64,
    /// Prompt tokens to add.
    pub prompt_tokens: i64,
    /// Completion tokens to add.
    pub completion_tokens: i64,
    /// Total tokens to add (prompt + completion).
    pub total_tokens: i64,
    /// Charged quota to add.
    pub total_quota: i64,
}

/// A fully materialized usage-statistics row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRow {
    /// Natural key.
    pub key: UsageKey,
    /// Display name of the token (last writer wins).
    pub token_name: String,
    /// Total requests recorded under the key.
    pub total_requests: i64,
    /// Successful requests.
    pub successful_requests: i64,
    /// Failed requests.
    pub failed_requests: i64,
    /// Prompt tokens.
    pub prompt_tokens: i64,
    /// Completion tokens.
    pub completion_tokens: i64,
    /// Total tokens.
    pub total_tokens: i64,
    /// Charged quota.
    pub total_quota: i64,
    /// Creation timestamp (epoch seconds).
    pub created_time: i64,
    /// Last update timestamp (epoch seconds).
    pub updated_time: i64,
}

/// Everything the accountant needs about one completed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRecord {
    /// Token that made the request.
    pub token_id: i64,
    /// Token display name at completion time.
    pub token_name: String,
    /// Model that served the request.
    pub model: String,
    /// Prompt tokens consumed.
    pub prompt_tokens: i64,
    /// Completion tokens produced.
    pub completion_tokens: i64,
    /// Quota charged for the request.
    pub quota: i64,
    /// Whether the upstream call succeeded.
    pub success: bool,
}
