//! Pool creation: a SQLite connection with WAL mode and foreign keys on.

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use crate::error::StoreError;

/// Store connection configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub url: String,
    pub max_connections: u32,
}

impl StoreConfig {
    /// A file-backed store at `path`, created if missing.
    pub fn file(path: impl AsRef<str>) -> Self {
        Self {
            url: format!("sqlite:{}?mode=rwc", path.as_ref()),
            max_connections: 5,
        }
    }

    /// An in-memory store, for tests.
    pub fn memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
        }
    }
}

/// Opens the pool and applies the pragmas the store relies on: WAL for
/// concurrent readers during a write, foreign keys so orphaned rows are
/// rejected rather than silently accumulating.
pub async fn connect(config: StoreConfig) -> Result<SqlitePool, StoreError> {
    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await?;

    apply_pragmas(&pool).await?;
    crate::schema::migrate(&pool).await?;

    Ok(pool)
}

async fn apply_pragmas(pool: &SqlitePool) -> Result<(), StoreError> {
    sqlx::query("PRAGMA journal_mode=WAL").execute(pool).await?;
    sqlx::query("PRAGMA synchronous=NORMAL").execute(pool).await?;
    sqlx::query("PRAGMA foreign_keys=ON").execute(pool).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_connects_and_migrates() {
        let pool = connect(StoreConfig::memory()).await.unwrap();
        let row: (i64,) = sqlx::query_as("SELECT count(*) FROM jobs")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(row.0, 0);
    }
}
