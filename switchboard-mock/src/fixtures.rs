//! Fixture constructors with deterministic defaults.

use switchboard_core::{Ability, Channel, Token};
use switchboard_types::{ChannelStatus, TokenStatus};

/// A minimal enabled channel serving one group and a comma-joined model list.
#[must_use]
pub fn channel(id: i64, group: &str, models: &str, priority: i64, weight: i64) -> Channel {
    Channel {
        id,
        name: format!("channel-{id}"),
        upstream: "openai".to_string(),
        status: ChannelStatus::Enabled,
        key: format!("upstream-key-{id}"),
        models: models.to_string(),
        groups: group.to_string(),
        priority,
        weight,
        tag: None,
        settings: None,
    }
}

/// Same as [`channel`] but carrying a tag.
#[must_use]
pub fn tagged_channel(
    id: i64,
    group: &str,
    models: &str,
    priority: i64,
    weight: i64,
    tag: &str,
) -> Channel {
    let mut c = channel(id, group, models, priority, weight);
    c.tag = Some(tag.to_string());
    c
}

/// An enabled, never-expiring token with a healthy quota balance.
#[must_use]
pub fn token(id: i64, key: &str) -> Token {
    Token {
        id,
        user_id: 1,
        key: key.to_string(),
        status: TokenStatus::Enabled,
        name: format!("token-{id}"),
        created_time: 0,
        accessed_time: 0,
        expired_time: -1,
        remain_quota: 1_000_000,
        used_quota: 0,
        unlimited_quota: false,
        group: "default".to_string(),
        allow_ips: None,
        model_limits: None,
        daily_usage_count: 0,
        total_usage_count: 0,
        last_usage_date: String::new(),
        rate_limit_per_minute: 0,
        rate_limit_per_day: 0,
        last_rate_limit_reset: 0,
        channel_tag: None,
        total_usage_limit: None,
    }
}

/// Materialize one ability row per `(group, model)` pair served by each
/// enabled channel, mirroring what an admin import writes.
#[must_use]
pub fn derive_abilities(channels: &[Channel]) -> Vec<Ability> {
    let mut abilities = Vec::new();
    for channel in channels {
        if channel.status != ChannelStatus::Enabled {
            continue;
        }
        for group in channel.group_list() {
            for model in channel.model_list() {
                abilities.push(Ability {
                    group: group.to_string(),
                    model: model.to_string(),
                    channel_id: channel.id,
                });
            }
        }
    }
    abilities
}
