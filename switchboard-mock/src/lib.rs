//! In-memory store and manual clock for deterministic tests and examples.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use switchboard_core::clock::Clock;
use switchboard_core::{
    Ability, Channel, GatewayError, Store, Token, UsageDeltas, UsageKey, UsageRow,
};
use switchboard_types::TokenStatus;

pub mod fixtures;

#[derive(Default)]
struct State {
    channels: Vec<Channel>,
    abilities: Vec<Ability>,
    tokens: HashMap<i64, Token>,
    rate_log: Vec<(i64, i64)>,
    usage: HashMap<UsageKey, UsageRow>,
    find_token_calls: u64,
    fail: Option<String>,
}

/// In-memory [`Store`] with deterministic behavior and inspection hooks.
pub struct MockStore {
    state: Mutex<State>,
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MockStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    /// Seed channels, deriving one ability row per `(group, model)` pair the
    /// way an admin import materializes them.
    #[must_use]
    pub fn with_channels(self, channels: Vec<Channel>) -> Self {
        {
            let mut state = self.state.lock().expect("mutex poisoned");
            state.abilities = fixtures::derive_abilities(&channels);
            state.channels = channels;
        }
        self
    }

    /// Seed tokens keyed by id.
    #[must_use]
    pub fn with_tokens(self, tokens: Vec<Token>) -> Self {
        {
            let mut state = self.state.lock().expect("mutex poisoned");
            state.tokens = tokens.into_iter().map(|t| (t.id, t)).collect();
        }
        self
    }

    /// Replace the ability rows (by default derived from the channel seed).
    #[must_use]
    pub fn with_abilities(self, abilities: Vec<Ability>) -> Self {
        self.state.lock().expect("mutex poisoned").abilities = abilities;
        self
    }

    /// Replace the channel list at runtime (simulates an admin edit between
    /// index refreshes).
    pub fn replace_channels(&self, channels: Vec<Channel>) {
        let mut state = self.state.lock().expect("mutex poisoned");
        state.abilities = fixtures::derive_abilities(&channels);
        state.channels = channels;
    }

    /// Insert or replace a token at runtime.
    pub fn upsert_token(&self, token: Token) {
        self.state
            .lock()
            .expect("mutex poisoned")
            .tokens
            .insert(token.id, token);
    }

    /// Make every subsequent call fail with a backend error.
    pub fn fail_all(&self, message: &str) {
        self.state.lock().expect("mutex poisoned").fail = Some(message.to_string());
    }

    /// Clear a previous [`fail_all`](Self::fail_all).
    pub fn heal(&self) {
        self.state.lock().expect("mutex poisoned").fail = None;
    }

    /// Current state of a token, if present.
    #[must_use]
    pub fn token(&self, id: i64) -> Option<Token> {
        self.state
            .lock()
            .expect("mutex poisoned")
            .tokens
            .get(&id)
            .cloned()
    }

    /// Current statistics row for a key, if one has been created.
    #[must_use]
    pub fn usage_row(&self, key: &UsageKey) -> Option<UsageRow> {
        self.state
            .lock()
            .expect("mutex poisoned")
            .usage
            .get(key)
            .cloned()
    }

    /// Number of rate-log rows recorded for a token.
    #[must_use]
    pub fn rate_log_len(&self, token_id: i64) -> usize {
        self.state
            .lock()
            .expect("mutex poisoned")
            .rate_log
            .iter()
            .filter(|(id, _)| *id == token_id)
            .count()
    }

    /// How many times `find_token_by_key` has been called (cache-hit tests).
    #[must_use]
    pub fn find_token_calls(&self) -> u64 {
        self.state.lock().expect("mutex poisoned").find_token_calls
    }

    fn check_fail(state: &State) -> Result<(), GatewayError> {
        state
            .fail
            .as_ref()
            .map_or(Ok(()), |msg| Err(GatewayError::backend(msg)))
    }
}

#[async_trait]
impl Store for MockStore {
    async fn load_all_channels(&self) -> Result<Vec<Channel>, GatewayError> {
        let state = self.state.lock().expect("mutex poisoned");
        Self::check_fail(&state)?;
        Ok(state.channels.clone())
    }

    async fn load_all_abilities(&self) -> Result<Vec<Ability>, GatewayError> {
        let state = self.state.lock().expect("mutex poisoned");
        Self::check_fail(&state)?;
        Ok(state.abilities.clone())
    }

    async fn candidate_channels(
        &self,
        group: &str,
        model: &str,
    ) -> Result<Vec<Channel>, GatewayError> {
        let state = self.state.lock().expect("mutex poisoned");
        Self::check_fail(&state)?;
        let mut matching: Vec<Channel> = state
            .channels
            .iter()
            .filter(|c| c.serves(group, model))
            .cloned()
            .collect();
        matching.sort_by_key(|c| (std::cmp::Reverse(c.priority), c.id));
        Ok(matching)
    }

    async fn find_token_by_key(&self, key: &str) -> Result<Option<Token>, GatewayError> {
        let mut state = self.state.lock().expect("mutex poisoned");
        state.find_token_calls += 1;
        Self::check_fail(&state)?;
        Ok(state.tokens.values().find(|t| t.key == key).cloned())
    }

    async fn update_token_status(
        &self,
        id: i64,
        status: TokenStatus,
    ) -> Result<(), GatewayError> {
        let mut state = self.state.lock().expect("mutex poisoned");
        Self::check_fail(&state)?;
        if let Some(token) = state.tokens.get_mut(&id) {
            token.status = status;
        }
        Ok(())
    }

    async fn update_rate_limit_reset(&self, id: i64, at: i64) -> Result<(), GatewayError> {
        let mut state = self.state.lock().expect("mutex poisoned");
        Self::check_fail(&state)?;
        if let Some(token) = state.tokens.get_mut(&id) {
            token.last_rate_limit_reset = at;
        }
        Ok(())
    }

    async fn credit_token_quota(&self, id: i64, delta: i64) -> Result<(), GatewayError> {
        let mut state = self.state.lock().expect("mutex poisoned");
        Self::check_fail(&state)?;
        if let Some(token) = state.tokens.get_mut(&id) {
            token.remain_quota += delta;
            token.used_quota -= delta;
            token.accessed_time = Utc::now().timestamp();
        }
        Ok(())
    }

    async fn debit_token_quota(&self, id: i64, delta: i64) -> Result<(), GatewayError> {
        let mut state = self.state.lock().expect("mutex poisoned");
        Self::check_fail(&state)?;
        if let Some(token) = state.tokens.get_mut(&id) {
            token.remain_quota -= delta;
            token.used_quota += delta;
            token.accessed_time = Utc::now().timestamp();
        }
        Ok(())
    }

    async fn insert_rate_log(&self, token_id: i64, at: i64) -> Result<(), GatewayError> {
        let mut state = self.state.lock().expect("mutex poisoned");
        Self::check_fail(&state)?;
        state.rate_log.push((token_id, at));
        Ok(())
    }

    async fn count_rate_log_since(
        &self,
        token_id: i64,
        since: i64,
    ) -> Result<i64, GatewayError> {
        let state = self.state.lock().expect("mutex poisoned");
        Self::check_fail(&state)?;
        let count = state
            .rate_log
            .iter()
            .filter(|(id, at)| *id == token_id && *at >= since)
            .count();
        Ok(count as i64)
    }

    async fn upsert_usage(
        &self,
        key: &UsageKey,
        deltas: &UsageDeltas,
    ) -> Result<(), GatewayError> {
        let mut state = self.state.lock().expect("mutex poisoned");
        Self::check_fail(&state)?;
        let now = Utc::now().timestamp();
        let row = state.usage.entry(key.clone()).or_insert_with(|| UsageRow {
            key: key.clone(),
            token_name: String::new(),
            total_requests: 0,
            successful_requests: 0,
            failed_requests: 0,
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 0,
            total_quota: 0,
            created_time: now,
            updated_time: now,
        });
        row.token_name = deltas.token_name.clone();
        row.total_requests += deltas.total_requests;
        row.successful_requests += deltas.successful_requests;
        row.failed_requests += deltas.failed_requests;
        row.prompt_tokens += deltas.prompt_tokens;
        row.completion_tokens += deltas.completion_tokens;
        row.total_tokens += deltas.total_tokens;
        row.total_quota += deltas.total_quota;
        row.updated_time = now;
        Ok(())
    }

    async fn increase_token_usage_count(
        &self,
        id: i64,
        today: &str,
    ) -> Result<(), GatewayError> {
        let mut state = self.state.lock().expect("mutex poisoned");
        Self::check_fail(&state)?;
        if let Some(token) = state.tokens.get_mut(&id) {
            token.total_usage_count += 1;
            token.daily_usage_count = if token.last_usage_date == today {
                token.daily_usage_count + 1
            } else {
                1
            };
            token.last_usage_date = today.to_string();
            token.accessed_time = Utc::now().timestamp();
        }
        Ok(())
    }
}

/// Clock whose "now" is set by the test.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// A clock pinned at the given epoch second.
    ///
    /// # Panics
    /// Panics if `epoch` is out of chrono's representable range.
    #[must_use]
    pub fn at(epoch: i64) -> Self {
        Self {
            now: Mutex::new(
                DateTime::from_timestamp(epoch, 0).expect("epoch in representable range"),
            ),
        }
    }

    /// Jump the clock to the given epoch second.
    ///
    /// # Panics
    /// Panics if `epoch` is out of chrono's representable range.
    pub fn set(&self, epoch: i64) {
        *self.now.lock().expect("mutex poisoned") =
            DateTime::from_timestamp(epoch, 0).expect("epoch in representable range");
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().expect("mutex poisoned");
        *now += chrono::Duration::from_std(by).unwrap_or(chrono::Duration::zero());
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("mutex poisoned")
    }
}
