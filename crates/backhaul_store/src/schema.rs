//! Inline migrations. Enum/struct-valued columns (retention policy,
//! notification channel ids, execution logs, …) don't map to native SQLite
//! types cleanly, so they're stored as JSON text and (de)serialized at the
//! repository boundary.

use sqlx::SqlitePool;

use crate::error::StoreError;

const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS sources (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        kind TEXT NOT NULL,
        encrypted_config BLOB NOT NULL,
        detected_version TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS destinations (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        kind TEXT NOT NULL,
        encrypted_config BLOB NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS channels (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        kind TEXT NOT NULL,
        encrypted_config BLOB NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS encryption_profiles (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        description TEXT,
        wrapped_key BLOB NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS jobs (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        source_id TEXT NOT NULL REFERENCES sources(id),
        destination_id TEXT NOT NULL REFERENCES destinations(id),
        encryption_profile_id TEXT REFERENCES encryption_profiles(id),
        compression TEXT NOT NULL,
        cron_expression TEXT NOT NULL,
        enabled INTEGER NOT NULL,
        retention TEXT NOT NULL,
        notification_channel_ids TEXT NOT NULL,
        notification_condition TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS executions (
        id TEXT PRIMARY KEY,
        job_id TEXT NOT NULL REFERENCES jobs(id),
        kind TEXT NOT NULL,
        status TEXT NOT NULL,
        started_at TEXT NOT NULL,
        finished_at TEXT,
        progress REAL NOT NULL,
        artifact_size_bytes INTEGER,
        error TEXT,
        logs TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS executions_job_id_idx ON executions(job_id)",
    "CREATE INDEX IF NOT EXISTS executions_status_idx ON executions(job_id, status)",
];

pub async fn migrate(pool: &SqlitePool) -> Result<(), StoreError> {
    for statement in STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
