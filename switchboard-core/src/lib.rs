//! switchboard-core
//!
//! Core types, traits, and engines shared across the switchboard workspace.
//!
//! - `types`: domain records (channels, tokens, abilities, usage rows).
//! - `store`: the persistence port consumed by everything above it.
//! - `index`: the in-memory `(group, model)` reverse index with atomic swap.
//! - `select`: priority tiering and the smoothed weighted draw.
//! - `auth`: the ordered token-authorization check chain.
//! - `usage`: per-completion accounting sinks.
//! - `batch`: coalescing wrapper for quota writes.
#![warn(missing_docs)]

/// The ordered token-authorization check chain.
pub mod auth;
/// Coalescing store wrapper for quota writes.
pub mod batch;
/// Injectable wall-clock source.
pub mod clock;
/// Core error type shared by the gateway and its stores.
pub mod error;
/// The in-memory channel index and its snapshots.
pub mod index;
/// Fixed-window boundary arithmetic.
pub mod rate;
/// Channel selection.
pub mod select;
/// The persistence port.
pub mod store;
pub mod types;
/// Usage accounting.
pub mod usage;

/// Handle to a background maintenance task (index refresh, batch flush).
///
/// [`stop`](TaskHandle::stop) requests shutdown over the one-shot and waits
/// for the task's final iteration (the batch flusher uses it to flush once
/// more); [`abort`](TaskHandle::abort) cancels without waiting. A handle
/// dropped without either still signals the task and then aborts it, so a
/// forgotten handle never leaks its loop.
#[derive(Debug)]
pub struct TaskHandle {
    task: Option<tokio::task::JoinHandle<()>>,
    stop: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TaskHandle {
    /// Tie a spawned maintenance task to its stop channel.
    #[must_use]
    pub const fn new(
        task: tokio::task::JoinHandle<()>,
        stop: tokio::sync::oneshot::Sender<()>,
    ) -> Self {
        Self {
            task: Some(task),
            stop: Some(stop),
        }
    }

    /// Signal the task to shut down and wait until it has.
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    /// Cancel the task without waiting. A flusher aborted mid-cycle keeps
    /// its queued deltas for whoever flushes next.
    pub fn abort(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take()
            && !task.is_finished()
        {
            task.abort();
        }
    }
}

pub use auth::{AuthRejection, Authorizer};
pub use batch::BatchingStore;
pub use clock::{Clock, SystemClock};
pub use error::{GatewayError, RateWindow};
pub use index::{ChannelIndex, IndexSnapshot};
pub use select::{DEFAULT_SMOOTHING, choose, normalize_model, pick, select_one};
pub use store::Store;
pub use types::*;
pub use usage::{Accountant, completion_deltas};
