//! Database connection pool management for Matrixon
//!
//! Author: arkSong <arksong2018@gmail.com>
//! Date: 2025-06-15
//! Version: 0.1.0
//!
//! Builds the sqlx pools for the SQLite and PostgreSQL backends, and the
//! exclusive writer SQLite needs because it only allows one writer at a time.

use std::{str::FromStr, sync::Arc, time::{Duration, Instant}};

use matrixon_core::{DatabaseConfig, MatrixonError, Result};
use metrics::histogram;
use sqlx::{
    postgres::{PgPool, PgPoolOptions},
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions},
};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument};

use crate::error::storage_err;

/// Serializes writes against one SQLite database.
///
/// Every table handle opened on the same file shares one writer.
#[derive(Debug, Clone, Default)]
pub struct ExclusiveWriter {
    lock: Arc<Mutex<()>>,
}

impl ExclusiveWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().await
    }
}

/// Create a SQLite pool, creating the database file if missing
#[instrument(level = "debug", skip(config), fields(url = %config.url))]
pub async fn create_sqlite_pool(config: &DatabaseConfig) -> Result<SqlitePool> {
    debug!("🔧 Creating SQLite connection pool");
    let start = Instant::now();

    let options = SqliteConnectOptions::from_str(&config.url)
        .map_err(|e| MatrixonError::InvalidConfig(format!("Invalid SQLite URL: {e}")))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(config.connection_timeout));

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.connection_timeout))
        .connect_with(options)
        .await
        .map_err(storage_err("connect sqlite"))?;

    histogram!("db.pool.create.time").record(start.elapsed().as_secs_f64());
    info!("✅ Created SQLite pool with {} max connections", config.max_connections);
    Ok(pool)
}

/// Create a PostgreSQL pool
#[instrument(level = "debug", skip(config))]
pub async fn create_postgres_pool(config: &DatabaseConfig) -> Result<PgPool> {
    debug!("🔧 Creating PostgreSQL connection pool");
    let start = Instant::now();

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.connection_timeout))
        .connect(&config.url)
        .await
        .map_err(storage_err("connect postgres"))?;

    histogram!("db.pool.create.time").record(start.elapsed().as_secs_f64());
    info!("✅ Created PostgreSQL pool with {} max connections", config.max_connections);
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use matrixon_core::DatabaseBackend;

    #[tokio::test]
    async fn test_sqlite_pool_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.db");
        let config = DatabaseConfig {
            backend: DatabaseBackend::Sqlite,
            url: format!("sqlite://{}", path.display()),
            max_connections: 2,
            ..DatabaseConfig::default()
        };

        let pool = create_sqlite_pool(&config).await.unwrap();
        sqlx::query("SELECT 1").execute(&pool).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_writer_is_shared_between_clones() {
        let writer = ExclusiveWriter::new();
        let clone = writer.clone();

        let guard = writer.acquire().await;
        assert!(clone.lock.try_lock().is_err());
        drop(guard);
        assert!(clone.lock.try_lock().is_ok());
    }
}
