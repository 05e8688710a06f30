//! Per-request context: deadline propagation and the resolved group.

use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use switchboard_core::GatewayError;

/// State carried alongside one request through the gateway core.
///
/// The deadline bounds every database round-trip made on behalf of the
/// request; `resolved_group` records which group actually served a request
/// that asked for `auto`.
#[derive(Debug, Default)]
pub struct RequestContext {
    deadline: Option<Instant>,
    resolved_group: Mutex<Option<String>>,
}

impl RequestContext {
    /// A context with no deadline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A context whose database calls must finish within `timeout`.
    #[must_use]
    pub fn with_deadline(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
            resolved_group: Mutex::new(None),
        }
    }

    /// Time left before the deadline, or `None` when unbounded.
    ///
    /// An elapsed deadline yields `Duration::ZERO`, so in-flight calls fail
    /// fast instead of starting fresh work.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// The group a `auto` request was resolved to, once selection succeeds.
    #[must_use]
    pub fn resolved_group(&self) -> Option<String> {
        self.resolved_group.lock().expect("mutex poisoned").clone()
    }

    pub(crate) fn set_resolved_group(&self, group: &str) {
        *self.resolved_group.lock().expect("mutex poisoned") = Some(group.to_string());
    }
}

/// Run a fallible future under the context deadline.
///
/// # Errors
/// Returns `DeadlineExceeded` labeled with `operation` when the deadline
/// elapses first; otherwise the future's own result.
pub async fn with_deadline<T, Fut>(
    ctx: &RequestContext,
    operation: &'static str,
    fut: Fut,
) -> Result<T, GatewayError>
where
    Fut: Future<Output = Result<T, GatewayError>>,
{
    match ctx.remaining() {
        None => fut.await,
        Some(remaining) => (tokio::time::timeout(remaining, fut).await)
            .unwrap_or_else(|_| Err(GatewayError::deadline(operation))),
    }
}
