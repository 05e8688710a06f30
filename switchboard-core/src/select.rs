//! Channel selection: priority tiering plus a smoothed weighted draw.
//!
//! The caller supplies the retry ordinal; retry `r` targets the `r`-th
//! distinct priority tier (descending), clamped to the last tier. Within a
//! tier each channel is drawn with probability `(weight + S) / Σ(weight + S)`
//! where `S` is the smoothing constant, so zero-weight channels still see
//! traffic. The random source is injected for reproducible tests.

use std::sync::Arc;

use rand::Rng;

use crate::error::GatewayError;
use crate::index::IndexSnapshot;
use crate::types::Channel;

/// Default additive smoothing applied to channel weights.
pub const DEFAULT_SMOOTHING: i64 = 10;

/// Collapse sub-tooling model variants onto their shared bucket.
#[must_use]
pub fn normalize_model(model: &str) -> &str {
    if model.starts_with("gpt-4-gizmo") {
        "gpt-4-gizmo-*"
    } else if model.starts_with("gpt-4o-gizmo") {
        "gpt-4o-gizmo-*"
    } else {
        model
    }
}

/// Draw one channel from `candidates` for the given retry tier.
///
/// `candidates` must already be ordered best-first (priority descending, id
/// ascending); ties in the draw fall to the earlier entry. Returns `None`
/// only for an empty slice.
pub fn pick<R: Rng + ?Sized>(
    rng: &mut R,
    candidates: &[Arc<Channel>],
    retry: usize,
    smoothing: i64,
) -> Option<Arc<Channel>> {
    if candidates.is_empty() {
        return None;
    }
    if candidates.len() == 1 {
        return Some(Arc::clone(&candidates[0]));
    }

    let mut priorities: Vec<i64> = candidates.iter().map(|c| c.priority).collect();
    priorities.sort_unstable_by(|a, b| b.cmp(a));
    priorities.dedup();

    let tier = priorities[retry.min(priorities.len() - 1)];
    let tier_candidates: Vec<&Arc<Channel>> = candidates
        .iter()
        .filter(|c| c.priority == tier)
        .collect();

    if tier_candidates.len() == 1 {
        return Some(Arc::clone(tier_candidates[0]));
    }

    let total_weight: i64 = tier_candidates
        .iter()
        .map(|c| c.weight + smoothing)
        .sum();
    if total_weight <= 0 {
        // Unreachable while the smoothing constant is positive.
        let uniform = rng.random_range(0..tier_candidates.len());
        return Some(Arc::clone(tier_candidates[uniform]));
    }

    let mut remaining = rng.random_range(0..total_weight);
    for candidate in &tier_candidates {
        remaining -= candidate.weight + smoothing;
        if remaining < 0 {
            return Some(Arc::clone(candidate));
        }
    }
    Some(Arc::clone(tier_candidates[0]))
}

/// Apply the tag filter and the weighted draw to an ordered candidate list.
///
/// `model` must already be normalized; `group` and `model` only label the
/// failure when nothing matches.
///
/// # Errors
/// - `NoChannel` when `candidates` is empty.
/// - `NoChannelForTag` when a tag is requested and filters out every
///   candidate.
pub fn choose<R: Rng + ?Sized>(
    rng: &mut R,
    candidates: Vec<Arc<Channel>>,
    group: &str,
    model: &str,
    retry: usize,
    tag: Option<&str>,
    smoothing: i64,
) -> Result<Arc<Channel>, GatewayError> {
    if candidates.is_empty() {
        return Err(GatewayError::no_channel(group, model));
    }

    let filtered: Vec<Arc<Channel>> = match tag.filter(|t| !t.is_empty()) {
        Some(wanted) => {
            let kept: Vec<Arc<Channel>> = candidates
                .into_iter()
                .filter(|c| c.tag() == Some(wanted))
                .collect();
            if kept.is_empty() {
                return Err(GatewayError::no_channel_for_tag(wanted));
            }
            kept
        }
        None => candidates,
    };

    pick(rng, &filtered, retry, smoothing)
        .ok_or_else(|| GatewayError::no_channel(group, model))
}

/// Select one channel from an index snapshot.
///
/// Normalizes the model, resolves the bucket (reporting `Inconsistency` for
/// dangling ids), then delegates to [`choose`].
///
/// # Errors
/// `NoChannel`, `NoChannelForTag`, or `Inconsistency`.
pub fn select_one<R: Rng + ?Sized>(
    snapshot: &IndexSnapshot,
    rng: &mut R,
    group: &str,
    model: &str,
    retry: usize,
    tag: Option<&str>,
    smoothing: i64,
) -> Result<Arc<Channel>, GatewayError> {
    let model = normalize_model(model);
    let candidates = snapshot.resolve_candidates(group, model)?;
    choose(rng, candidates, group, model, retry, tag, smoothing)
}
