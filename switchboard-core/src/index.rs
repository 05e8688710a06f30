//! The in-memory reverse index from `(group, model)` to candidate channels.
//!
//! Two maps are maintained together: `by_id` holds every channel including
//! disabled ones, `by_group_model` holds only enabled candidates, sorted by
//! priority descending (ties id ascending, so tests can assert order). Both
//! are rebuilt off-side and swapped atomically; readers clone the `Arc` under
//! a read lock and never observe a half-built pair.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use switchboard_types::ChannelStatus;

use crate::error::GatewayError;
use crate::store::Store;
use crate::types::{Ability, Channel};

/// One immutable generation of the channel index.
#[derive(Debug, Default)]
pub struct IndexSnapshot {
    by_id: HashMap<i64, Arc<Channel>>,
    by_group_model: HashMap<(String, String), Vec<i64>>,
}

impl IndexSnapshot {
    /// Build a snapshot from full channel and ability dumps.
    ///
    /// Every channel lands in `by_id` regardless of status. Buckets are
    /// derived from enabled channels by splitting their comma-joined group
    /// and model lists; groups never mentioned by an ability row are skipped,
    /// since no token can resolve to them.
    #[must_use]
    pub fn build(channels: Vec<Channel>, abilities: &[Ability]) -> Self {
        let known_groups: HashSet<&str> = abilities.iter().map(|a| a.group.as_str()).collect();

        let mut by_id: HashMap<i64, Arc<Channel>> = HashMap::with_capacity(channels.len());
        for channel in channels {
            by_id.insert(channel.id, Arc::new(channel));
        }

        let mut by_group_model: HashMap<(String, String), Vec<i64>> = HashMap::new();
        for channel in by_id.values() {
            if channel.status != ChannelStatus::Enabled {
                continue;
            }
            for group in channel.group_list() {
                if !known_groups.contains(group) {
                    continue;
                }
                for model in channel.model_list() {
                    by_group_model
                        .entry((group.to_string(), model.to_string()))
                        .or_default()
                        .push(channel.id);
                }
            }
        }

        for ids in by_group_model.values_mut() {
            ids.sort_by_key(|id| {
                let priority = by_id.get(id).map_or(i64::MIN, |c| c.priority);
                (std::cmp::Reverse(priority), *id)
            });
        }

        Self {
            by_id,
            by_group_model,
        }
    }

    /// Assemble a snapshot from prebuilt maps.
    ///
    /// [`build`](Self::build) is the normal path; this exists for callers
    /// that materialize the maps themselves.
    #[must_use]
    pub const fn from_parts(
        by_id: HashMap<i64, Arc<Channel>>,
        by_group_model: HashMap<(String, String), Vec<i64>>,
    ) -> Self {
        Self {
            by_id,
            by_group_model,
        }
    }

    /// Candidate ids for `(group, model)`, best-first. Empty when the bucket
    /// does not exist.
    #[must_use]
    pub fn candidate_ids(&self, group: &str, model: &str) -> &[i64] {
        self.by_group_model
            .get(&(group.to_string(), model.to_string()))
            .map_or(&[], Vec::as_slice)
    }

    /// Look up a channel by id, disabled ones included.
    #[must_use]
    pub fn channel(&self, id: i64) -> Option<&Arc<Channel>> {
        self.by_id.get(&id)
    }

    /// Resolve the bucket for `(group, model)` into channel records.
    ///
    /// # Errors
    /// Returns `Inconsistency` naming the dangling id when the bucket
    /// references a channel missing from the id map.
    pub fn resolve_candidates(
        &self,
        group: &str,
        model: &str,
    ) -> Result<Vec<Arc<Channel>>, GatewayError> {
        self.candidate_ids(group, model)
            .iter()
            .map(|id| {
                self.by_id
                    .get(id)
                    .cloned()
                    .ok_or(GatewayError::Inconsistency { channel_id: *id })
            })
            .collect()
    }

    /// Number of channels known to this snapshot, disabled ones included.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.by_id.len()
    }
}

/// Process-wide holder for the current [`IndexSnapshot`].
///
/// The write lock is held only for the `Arc` swap; rebuild work happens
/// off-side, so selection is never blocked by anything but other readers.
#[derive(Debug, Default)]
pub struct ChannelIndex {
    inner: RwLock<Arc<IndexSnapshot>>,
}

impl ChannelIndex {
    /// Create an index with an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The current snapshot. Callers keep selecting against it even if a
    /// refresh swaps in a newer generation mid-request.
    #[must_use]
    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        Arc::clone(&self.inner.read().expect("index lock poisoned"))
    }

    /// Atomically replace the current snapshot.
    pub fn install(&self, snapshot: IndexSnapshot) {
        *self.inner.write().expect("index lock poisoned") = Arc::new(snapshot);
    }

    /// Reload both maps from the store and swap them in.
    ///
    /// # Errors
    /// Propagates the store error; the previous snapshot stays installed.
    pub async fn rebuild(&self, store: &dyn Store) -> Result<(), GatewayError> {
        let channels = store.load_all_channels().await?;
        let abilities = store.load_all_abilities().await?;
        let snapshot = IndexSnapshot::build(channels, &abilities);
        tracing::debug!(channels = snapshot.channel_count(), "channel index rebuilt");
        self.install(snapshot);
        Ok(())
    }

    /// Look up a channel by id in the current snapshot.
    #[must_use]
    pub fn get(&self, id: i64) -> Option<Arc<Channel>> {
        self.snapshot().channel(id).cloned()
    }

    /// Flip a channel's status in place, as the health monitor does between
    /// rebuilds.
    ///
    /// A channel leaving the enabled state is also dropped from every bucket
    /// so selection never returns it; a re-enabled channel rejoins the
    /// buckets at the next rebuild.
    pub fn set_status(&self, id: i64, status: ChannelStatus) {
        let current = self.snapshot();
        let Some(existing) = current.channel(id) else {
            return;
        };

        let mut by_id = current.by_id.clone();
        let mut channel = (**existing).clone();
        channel.status = status;
        by_id.insert(id, Arc::new(channel));

        let mut by_group_model = current.by_group_model.clone();
        if status != ChannelStatus::Enabled {
            for ids in by_group_model.values_mut() {
                ids.retain(|candidate| *candidate != id);
            }
        }

        self.install(IndexSnapshot {
            by_id,
            by_group_model,
        });
    }
}
