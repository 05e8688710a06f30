use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use sqlx::any::AnyPoolOptions;
use switchboard_core::{Store, UsageDeltas, UsageKey};
use switchboard_store::SqlStore;
use switchboard_types::{Backend, ChannelStatus, TokenStatus};

async fn setup_store() -> SqlStore {
    sqlx::any::install_default_drivers();
    // One connection keeps every caller on the same in-memory database.
    let pool = AnyPoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    let store = SqlStore::from_pool(pool, Backend::Sqlite);
    store.init_schema().await.expect("schema");
    store
}

async fn seed_channel(
    store: &SqlStore,
    id: i64,
    status: ChannelStatus,
    groups: &str,
    models: &str,
    priority: i64,
    weight: i64,
    tag: Option<&str>,
) {
    sqlx::query(
        "INSERT INTO channels (id, name, type, status, \"key\", models, \"group\", priority, weight, tag) \
         VALUES (?, ?, 'openai', ?, 'upstream-key', ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(format!("channel-{id}"))
    .bind(status.as_i64())
    .bind(models)
    .bind(groups)
    .bind(priority)
    .bind(weight)
    .bind(tag)
    .execute(store.pool())
    .await
    .expect("seed channel");

    for group in groups.split(',') {
        for model in models.split(',') {
            sqlx::query("INSERT INTO abilities (\"group\", model, channel_id) VALUES (?, ?, ?)")
                .bind(group)
                .bind(model)
                .bind(id)
                .execute(store.pool())
                .await
                .expect("seed ability");
        }
    }
}

async fn seed_token(store: &SqlStore, id: i64, key: &str, remain: i64, used: i64) {
    sqlx::query(
        "INSERT INTO tokens (id, user_id, \"key\", status, name, expired_time, remain_quota, \
         used_quota, unlimited_quota, \"group\", rate_limit_per_minute, rate_limit_per_day) \
         VALUES (?, 1, ?, ?, ?, -1, ?, ?, 0, 'default', 0, 0)",
    )
    .bind(id)
    .bind(key)
    .bind(TokenStatus::Enabled.as_i64())
    .bind(format!("token-{id}"))
    .bind(remain)
    .bind(used)
    .execute(store.pool())
    .await
    .expect("seed token");
}

#[tokio::test]
async fn schema_creation_is_idempotent() {
    let store = setup_store().await;
    store.init_schema().await.expect("second run");
}

#[tokio::test]
async fn channels_and_abilities_round_trip() {
    let store = setup_store().await;
    seed_channel(&store, 1, ChannelStatus::Enabled, "default,vip", "gpt-4,gpt-4o", 10, 3, Some("eu"))
        .await;
    seed_channel(&store, 2, ChannelStatus::Disabled, "default", "gpt-4", 5, 0, None).await;

    let channels = store.load_all_channels().await.unwrap();
    assert_eq!(channels.len(), 2);
    let first = channels.iter().find(|c| c.id == 1).unwrap();
    assert_eq!(first.groups, "default,vip");
    assert_eq!(first.models, "gpt-4,gpt-4o");
    assert_eq!(first.priority, 10);
    assert_eq!(first.weight, 3);
    assert_eq!(first.tag.as_deref(), Some("eu"));
    assert_eq!(first.status, ChannelStatus::Enabled);
    let second = channels.iter().find(|c| c.id == 2).unwrap();
    assert_eq!(second.status, ChannelStatus::Disabled);
    assert_eq!(second.tag, None);

    let abilities = store.load_all_abilities().await.unwrap();
    assert_eq!(abilities.len(), 5);
    assert!(
        abilities
            .iter()
            .any(|a| a.group == "vip" && a.model == "gpt-4o" && a.channel_id == 1)
    );
}

#[tokio::test]
async fn candidates_are_enabled_and_ordered() {
    let store = setup_store().await;
    seed_channel(&store, 3, ChannelStatus::Enabled, "default", "gpt-4", 5, 1, None).await;
    seed_channel(&store, 1, ChannelStatus::Enabled, "default", "gpt-4", 10, 1, None).await;
    seed_channel(&store, 2, ChannelStatus::Enabled, "default", "gpt-4", 10, 1, None).await;
    seed_channel(&store, 4, ChannelStatus::AutoDisabled, "default", "gpt-4", 99, 1, None).await;

    let candidates = store.candidate_channels("default", "gpt-4").await.unwrap();
    let ids: Vec<i64> = candidates.iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![1, 2, 3]);

    assert!(
        store
            .candidate_channels("default", "gpt-3.5")
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn token_lookup_and_field_updates() {
    let store = setup_store().await;
    seed_token(&store, 1, "k1", 500, 20).await;

    let token = store.find_token_by_key("k1").await.unwrap().unwrap();
    assert_eq!(token.id, 1);
    assert_eq!(token.remain_quota, 500);
    assert_eq!(token.used_quota, 20);
    assert_eq!(token.expired_time, -1);
    assert!(!token.unlimited_quota);
    assert_eq!(token.total_usage_limit, None);

    assert!(store.find_token_by_key("absent").await.unwrap().is_none());

    store
        .update_token_status(1, TokenStatus::Exhausted)
        .await
        .unwrap();
    let token = store.find_token_by_key("k1").await.unwrap().unwrap();
    assert_eq!(token.status, TokenStatus::Exhausted);

    store.update_rate_limit_reset(1, 12_345).await.unwrap();
    let token = store.find_token_by_key("k1").await.unwrap().unwrap();
    assert_eq!(token.last_rate_limit_reset, 12_345);
}

#[tokio::test]
async fn quota_moves_between_used_and_remain() {
    let store = setup_store().await;
    seed_token(&store, 1, "k1", 100, 40).await;

    store.debit_token_quota(1, 30).await.unwrap();
    let token = store.find_token_by_key("k1").await.unwrap().unwrap();
    assert_eq!(token.remain_quota, 70);
    assert_eq!(token.used_quota, 70);

    store.credit_token_quota(1, 30).await.unwrap();
    let token = store.find_token_by_key("k1").await.unwrap().unwrap();
    assert_eq!(token.remain_quota, 100);
    assert_eq!(token.used_quota, 40);
}

#[tokio::test]
async fn rate_log_counts_respect_the_window_start() {
    let store = setup_store().await;

    for at in [100, 140, 159, 160, 175] {
        store.insert_rate_log(1, at).await.unwrap();
    }
    store.insert_rate_log(2, 170).await.unwrap();

    assert_eq!(store.count_rate_log_since(1, 160).await.unwrap(), 2);
    assert_eq!(store.count_rate_log_since(1, 100).await.unwrap(), 5);
    assert_eq!(store.count_rate_log_since(1, 200).await.unwrap(), 0);
    assert_eq!(store.count_rate_log_since(2, 160).await.unwrap(), 1);
}

fn deltas(name: &str, success: bool) -> UsageDeltas {
    UsageDeltas {
        token_name: name.to_string(),
        total_requests: 1,
        successful_requests: i64::from(success),
        failed_requests: i64::from(!success),
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
        total_quota: 2,
    }
}

fn key(date: &str, token_id: i64) -> UsageKey {
    UsageKey {
        date: date.to_string(),
        token_id,
        model_name: "m".to_string(),
    }
}

async fn read_usage(store: &SqlStore, k: &UsageKey) -> (i64, i64, i64, i64, String) {
    use sqlx::Row;
    let row = sqlx::query(
        "SELECT total_requests, prompt_tokens, total_tokens, total_quota, token_name \
         FROM usage_statistics WHERE date = ? AND token_id = ? AND model_name = ?",
    )
    .bind(k.date.as_str())
    .bind(k.token_id)
    .bind(k.model_name.as_str())
    .fetch_one(store.pool())
    .await
    .expect("usage row");
    (
        row.get(0),
        row.get(1),
        row.get(2),
        row.get(3),
        row.get(4),
    )
}

#[tokio::test]
async fn upsert_creates_then_adds() {
    let store = setup_store().await;
    let k = key("2024-03-01", 7);

    store.upsert_usage(&k, &deltas("first", true)).await.unwrap();
    store.upsert_usage(&k, &deltas("second", false)).await.unwrap();

    let (requests, prompt, total, quota, name) = read_usage(&store, &k).await;
    assert_eq!(requests, 2);
    assert_eq!(prompt, 20);
    assert_eq!(total, 30);
    assert_eq!(quota, 4);
    assert_eq!(name, "second");

    // A different natural key gets its own row.
    let other = key("2024-03-02", 7);
    store.upsert_usage(&other, &deltas("first", true)).await.unwrap();
    let (requests, ..) = read_usage(&store, &other).await;
    assert_eq!(requests, 1);
}

/// File-backed store so writers hold separate connections and genuinely
/// contend on the row; the single-connection in-memory setup would
/// serialize them at the pool and mask a non-atomic upsert.
async fn setup_contended_store(max_connections: u32) -> (SqlStore, PathBuf) {
    static NEXT_DB: AtomicU32 = AtomicU32::new(0);

    sqlx::any::install_default_drivers();
    let path = std::env::temp_dir().join(format!(
        "switchboard-store-{}-{}.db",
        std::process::id(),
        NEXT_DB.fetch_add(1, Ordering::Relaxed),
    ));
    let pool = AnyPoolOptions::new()
        .max_connections(max_connections)
        .connect(&format!("sqlite://{}?mode=rwc", path.display()))
        .await
        .expect("file-backed sqlite");
    let store = SqlStore::from_pool(pool, Backend::Sqlite);
    store.init_schema().await.expect("schema");
    (store, path)
}

async fn teardown_contended_store(store: &SqlStore, path: &Path) {
    store.pool().close().await;
    for suffix in ["", "-journal", "-wal", "-shm"] {
        let mut file = path.as_os_str().to_owned();
        file.push(suffix);
        let _ = std::fs::remove_file(PathBuf::from(file));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn contended_upserts_sum_exactly() {
    const WRITERS: i64 = 4;
    const ROUNDS: i64 = 25;

    let (store, path) = setup_contended_store(WRITERS as u32).await;
    let store = Arc::new(store);
    let k = key("2024-03-01", 7);

    let tasks: Vec<_> = (0..WRITERS)
        .map(|_| {
            let store = Arc::clone(&store);
            let k = k.clone();
            tokio::spawn(async move {
                for _ in 0..ROUNDS {
                    store.upsert_usage(&k, &deltas("t", true)).await?;
                }
                Ok::<_, switchboard_core::GatewayError>(())
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let (requests, prompt, total, quota, _) = read_usage(&store, &k).await;
    assert_eq!(requests, WRITERS * ROUNDS);
    assert_eq!(prompt, WRITERS * ROUNDS * 10);
    assert_eq!(total, WRITERS * ROUNDS * 15);
    assert_eq!(quota, WRITERS * ROUNDS * 2);

    teardown_contended_store(&store, &path).await;
}

#[tokio::test]
async fn usage_counters_continue_or_restart_by_date() {
    let store = setup_store().await;
    seed_token(&store, 1, "k1", 100, 0).await;

    store.increase_token_usage_count(1, "2024-03-01").await.unwrap();
    store.increase_token_usage_count(1, "2024-03-01").await.unwrap();
    let token = store.find_token_by_key("k1").await.unwrap().unwrap();
    assert_eq!(token.total_usage_count, 2);
    assert_eq!(token.daily_usage_count, 2);
    assert_eq!(token.last_usage_date, "2024-03-01");

    store.increase_token_usage_count(1, "2024-03-02").await.unwrap();
    let token = store.find_token_by_key("k1").await.unwrap().unwrap();
    assert_eq!(token.total_usage_count, 3);
    assert_eq!(token.daily_usage_count, 1);
    assert_eq!(token.last_usage_date, "2024-03-02");
}
