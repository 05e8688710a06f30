//! Dialect-specific SQL strings.
//!
//! Everything dialect-aware lives here: identifier quoting (`group` and
//! `key` are reserved words), placeholder syntax, the additive upsert, and
//! the schema DDL. The store itself never branches on the backend outside
//! this module.

use switchboard_types::Backend;

/// Quote an identifier for the backend.
pub(crate) fn ident(backend: Backend, name: &str) -> String {
    match backend {
        Backend::Mysql => format!("`{name}`"),
        Backend::Postgres | Backend::Sqlite => format!("\"{name}\""),
        _ => unreachable!(),
    }
}

/// Rewrite `?` placeholders into `$1..$n` for PostgreSQL.
pub(crate) fn placeholders(backend: Backend, sql: &str) -> String {
    match backend {
        Backend::Postgres => {
            let mut out = String::with_capacity(sql.len() + 8);
            let mut n = 0;
            for ch in sql.chars() {
                if ch == '?' {
                    n += 1;
                    out.push('$');
                    out.push_str(&n.to_string());
                } else {
                    out.push(ch);
                }
            }
            out
        }
        Backend::Mysql | Backend::Sqlite => sql.to_string(),
        _ => unreachable!(),
    }
}

const CHANNEL_COLUMNS: &str = "id, name, type, status, {key}, models, {group}, priority, weight, tag, settings";

fn with_idents(backend: Backend, sql: &str) -> String {
    sql.replace("{group}", &ident(backend, "group"))
        .replace("{key}", &ident(backend, "key"))
}

pub(crate) fn load_all_channels(backend: Backend) -> String {
    with_idents(backend, &format!("SELECT {CHANNEL_COLUMNS} FROM channels"))
}

pub(crate) fn load_all_abilities(backend: Backend) -> String {
    with_idents(backend, "SELECT {group}, model, channel_id FROM abilities")
}

pub(crate) fn candidate_channels(backend: Backend) -> String {
    let columns = CHANNEL_COLUMNS
        .split(", ")
        .map(|c| format!("c.{c}"))
        .collect::<Vec<_>>()
        .join(", ");
    placeholders(
        backend,
        &with_idents(
            backend,
            &format!(
                "SELECT {columns} FROM channels c \
                 JOIN abilities a ON a.channel_id = c.id \
                 WHERE a.{{group}} = ? AND a.model = ? AND c.status = ? \
                 ORDER BY c.priority DESC, c.id ASC"
            ),
        ),
    )
}

pub(crate) fn find_token_by_key(backend: Backend) -> String {
    placeholders(
        backend,
        &with_idents(
            backend,
            "SELECT id, user_id, {key}, status, name, created_time, accessed_time, \
             expired_time, remain_quota, used_quota, unlimited_quota, {group}, allow_ips, \
             model_limits, daily_usage_count, total_usage_count, last_usage_date, \
             rate_limit_per_minute, rate_limit_per_day, last_rate_limit_reset, channel_tag, \
             total_usage_limit FROM tokens WHERE {key} = ?",
        ),
    )
}

pub(crate) fn update_token_status(backend: Backend) -> String {
    placeholders(
        backend,
        "UPDATE tokens SET status = ?, accessed_time = ? WHERE id = ?",
    )
}

pub(crate) fn update_rate_limit_reset(backend: Backend) -> String {
    placeholders(
        backend,
        "UPDATE tokens SET last_rate_limit_reset = ? WHERE id = ?",
    )
}

pub(crate) fn credit_token_quota(backend: Backend) -> String {
    placeholders(
        backend,
        "UPDATE tokens SET remain_quota = remain_quota + ?, used_quota = used_quota - ?, \
         accessed_time = ? WHERE id = ?",
    )
}

pub(crate) fn debit_token_quota(backend: Backend) -> String {
    placeholders(
        backend,
        "UPDATE tokens SET remain_quota = remain_quota - ?, used_quota = used_quota + ?, \
         accessed_time = ? WHERE id = ?",
    )
}

pub(crate) fn insert_rate_log(backend: Backend) -> String {
    placeholders(
        backend,
        "INSERT INTO token_usage_logs (token_id, created_at) VALUES (?, ?)",
    )
}

pub(crate) fn count_rate_log_since(backend: Backend) -> String {
    placeholders(
        backend,
        "SELECT COUNT(*) FROM token_usage_logs WHERE token_id = ? AND created_at >= ?",
    )
}

pub(crate) fn increase_token_usage_count(backend: Backend) -> String {
    placeholders(
        backend,
        "UPDATE tokens SET total_usage_count = total_usage_count + 1, \
         daily_usage_count = CASE WHEN last_usage_date = ? THEN daily_usage_count + 1 ELSE 1 END, \
         last_usage_date = ?, accessed_time = ? WHERE id = ?",
    )
}

/// The additive statistics upsert.
///
/// All three realizations are atomic per row: MySQL folds through
/// `VALUES(col)`, PostgreSQL through `EXCLUDED`, and SQLite through its
/// native `excluded` upsert. `token_name` and `updated_time` are overwritten
/// rather than summed.
pub(crate) fn upsert_usage(backend: Backend) -> String {
    const INSERT: &str = "INSERT INTO usage_statistics \
        (date, token_id, token_name, model_name, total_requests, successful_requests, \
         failed_requests, prompt_tokens, completion_tokens, total_tokens, total_quota, \
         created_time, updated_time) \
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";
    let sql = match backend {
        Backend::Mysql => format!(
            "{INSERT} ON DUPLICATE KEY UPDATE \
             token_name = VALUES(token_name), \
             total_requests = total_requests + VALUES(total_requests), \
             successful_requests = successful_requests + VALUES(successful_requests), \
             failed_requests = failed_requests + VALUES(failed_requests), \
             prompt_tokens = prompt_tokens + VALUES(prompt_tokens), \
             completion_tokens = completion_tokens + VALUES(completion_tokens), \
             total_tokens = total_tokens + VALUES(total_tokens), \
             total_quota = total_quota + VALUES(total_quota), \
             updated_time = VALUES(updated_time)"
        ),
        Backend::Postgres => format!(
            "{INSERT} ON CONFLICT (date, token_id, model_name) DO UPDATE SET \
             token_name = EXCLUDED.token_name, \
             total_requests = usage_statistics.total_requests + EXCLUDED.total_requests, \
             successful_requests = usage_statistics.successful_requests + EXCLUDED.successful_requests, \
             failed_requests = usage_statistics.failed_requests + EXCLUDED.failed_requests, \
             prompt_tokens = usage_statistics.prompt_tokens + EXCLUDED.prompt_tokens, \
             completion_tokens = usage_statistics.completion_tokens + EXCLUDED.completion_tokens, \
             total_tokens = usage_statistics.total_tokens + EXCLUDED.total_tokens, \
             total_quota = usage_statistics.total_quota + EXCLUDED.total_quota, \
             updated_time = EXCLUDED.updated_time"
        ),
        Backend::Sqlite => format!(
            "{INSERT} ON CONFLICT (date, token_id, model_name) DO UPDATE SET \
             token_name = excluded.token_name, \
             total_requests = total_requests + excluded.total_requests, \
             successful_requests = successful_requests + excluded.successful_requests, \
             failed_requests = failed_requests + excluded.failed_requests, \
             prompt_tokens = prompt_tokens + excluded.prompt_tokens, \
             completion_tokens = completion_tokens + excluded.completion_tokens, \
             total_tokens = total_tokens + excluded.total_tokens, \
             total_quota = total_quota + excluded.total_quota, \
             updated_time = excluded.updated_time"
        ),
        _ => unreachable!(),
    };
    placeholders(backend, &sql)
}

/// Schema DDL, one statement per entry.
pub(crate) fn schema(backend: Backend) -> Vec<String> {
    let pk = match backend {
        Backend::Mysql => "BIGINT PRIMARY KEY AUTO_INCREMENT",
        Backend::Postgres => "BIGSERIAL PRIMARY KEY",
        Backend::Sqlite => "INTEGER PRIMARY KEY AUTOINCREMENT",
        _ => unreachable!(),
    };

    let mut statements = vec![
        with_idents(
            backend,
            &format!(
                "CREATE TABLE IF NOT EXISTS channels (\
                 id {pk}, \
                 name TEXT NOT NULL, \
                 type TEXT NOT NULL, \
                 status BIGINT NOT NULL DEFAULT 1, \
                 {{key}} TEXT NOT NULL, \
                 models TEXT NOT NULL, \
                 {{group}} TEXT NOT NULL, \
                 priority BIGINT NOT NULL DEFAULT 0, \
                 weight BIGINT NOT NULL DEFAULT 0, \
                 tag TEXT, \
                 settings TEXT)"
            ),
        ),
        with_idents(
            backend,
            "CREATE TABLE IF NOT EXISTS abilities (\
             {group} VARCHAR(64) NOT NULL, \
             model VARCHAR(255) NOT NULL, \
             channel_id BIGINT NOT NULL, \
             PRIMARY KEY ({group}, model, channel_id))",
        ),
        with_idents(
            backend,
            &format!(
                "CREATE TABLE IF NOT EXISTS tokens (\
                 id {pk}, \
                 user_id BIGINT NOT NULL, \
                 {{key}} VARCHAR(48) NOT NULL UNIQUE, \
                 status BIGINT NOT NULL DEFAULT 1, \
                 name TEXT NOT NULL, \
                 created_time BIGINT NOT NULL DEFAULT 0, \
                 accessed_time BIGINT NOT NULL DEFAULT 0, \
                 expired_time BIGINT NOT NULL DEFAULT -1, \
                 remain_quota BIGINT NOT NULL DEFAULT 0, \
                 used_quota BIGINT NOT NULL DEFAULT 0, \
                 unlimited_quota BIGINT NOT NULL DEFAULT 0, \
                 {{group}} VARCHAR(64) NOT NULL DEFAULT '', \
                 allow_ips TEXT, \
                 model_limits TEXT, \
                 daily_usage_count BIGINT NOT NULL DEFAULT 0, \
                 total_usage_count BIGINT NOT NULL DEFAULT 0, \
                 last_usage_date VARCHAR(10) NOT NULL DEFAULT '', \
                 rate_limit_per_minute BIGINT NOT NULL DEFAULT 0, \
                 rate_limit_per_day BIGINT NOT NULL DEFAULT 0, \
                 last_rate_limit_reset BIGINT NOT NULL DEFAULT 0, \
                 channel_tag TEXT, \
                 total_usage_limit BIGINT)"
            ),
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS usage_statistics (\
             id {pk}, \
             date VARCHAR(10) NOT NULL, \
             token_id BIGINT NOT NULL, \
             token_name VARCHAR(255) NOT NULL DEFAULT '', \
             model_name VARCHAR(255) NOT NULL, \
             total_requests BIGINT NOT NULL DEFAULT 0, \
             successful_requests BIGINT NOT NULL DEFAULT 0, \
             failed_requests BIGINT NOT NULL DEFAULT 0, \
             prompt_tokens BIGINT NOT NULL DEFAULT 0, \
             completion_tokens BIGINT NOT NULL DEFAULT 0, \
             total_tokens BIGINT NOT NULL DEFAULT 0, \
             total_quota BIGINT NOT NULL DEFAULT 0, \
             created_time BIGINT NOT NULL, \
             updated_time BIGINT NOT NULL, \
             CONSTRAINT uk_date_token_model UNIQUE (date, token_id, model_name))"
        ),
    ];

    match backend {
        // Inline index: MySQL has no CREATE INDEX IF NOT EXISTS.
        Backend::Mysql => statements.push(
            "CREATE TABLE IF NOT EXISTS token_usage_logs (\
             id BIGINT PRIMARY KEY AUTO_INCREMENT, \
             token_id BIGINT NOT NULL, \
             created_at BIGINT NOT NULL, \
             INDEX idx_token_created (token_id, created_at))"
                .to_string(),
        ),
        Backend::Postgres | Backend::Sqlite => {
            statements.push(format!(
                "CREATE TABLE IF NOT EXISTS token_usage_logs (\
                 id {pk}, \
                 token_id BIGINT NOT NULL, \
                 created_at BIGINT NOT NULL)"
            ));
            statements.push(
                "CREATE INDEX IF NOT EXISTS idx_token_created \
                 ON token_usage_logs (token_id, created_at)"
                    .to_string(),
            );
        }
        _ => unreachable!(),
    }

    statements
}
