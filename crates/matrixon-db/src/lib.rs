//! Matrixon Database Library
//!
//! Author: arkSong <arksong2018@gmail.com>
//! Version: 0.11.0-alpha
//! Date: 2024-03-21
//!
//! Persistent storage for room-scoped pseudo-identities and the numeric
//! identifier tables they are keyed by. Each table is a trait with one
//! implementation per backend (SQLite, PostgreSQL, memory); every backend
//! expresses the same get-or-create semantics in its own upsert idiom.

use std::{num::NonZeroUsize, sync::Arc, time::Instant};

use matrixon_core::{DatabaseBackend, DatabaseConfig, MatrixonError, Result};
use tracing::{debug, info, instrument};

mod error;
pub mod migrations;
pub mod pool;
pub mod short_ids;
pub mod user_room_keys;

pub use short_ids::{CachedShortIds, NidKind, ShortIds};
pub use user_room_keys::UserRoomKeys;

use short_ids::{MemoryShortIds, PostgresShortIds, SqliteShortIds};
use user_room_keys::{MemoryUserRoomKeys, PostgresUserRoomKeys, SqliteUserRoomKeys};

/// Open handles to every table
#[derive(Clone)]
pub struct Database {
    pub user_room_keys: Arc<dyn UserRoomKeys>,
    pub short_ids: Arc<dyn ShortIds>,
    backend: DatabaseBackend,
}

impl Database {
    /// Connect to the configured backend and create missing tables
    #[instrument(level = "debug", skip(config), fields(backend = ?config.backend))]
    pub async fn open(config: &DatabaseConfig) -> Result<Self> {
        debug!("🔧 Opening database");
        let start = Instant::now();

        let cache_capacity = NonZeroUsize::new(config.short_id_cache_capacity).ok_or_else(|| {
            MatrixonError::InvalidConfig("database.short_id_cache_capacity must be at least 1".into())
        })?;

        let (user_room_keys, short_ids): (Arc<dyn UserRoomKeys>, Arc<dyn ShortIds>) =
            match config.backend {
                DatabaseBackend::Sqlite => {
                    let pool = pool::create_sqlite_pool(config).await?;
                    migrations::run_sqlite_migrations(&pool).await?;
                    let writer = pool::ExclusiveWriter::new();
                    (
                        Arc::new(SqliteUserRoomKeys::new(pool.clone(), writer.clone())),
                        Arc::new(SqliteShortIds::new(pool, writer)),
                    )
                }
                DatabaseBackend::Postgres => {
                    let pool = pool::create_postgres_pool(config).await?;
                    migrations::run_postgres_migrations(&pool).await?;
                    (
                        Arc::new(PostgresUserRoomKeys::new(pool.clone())),
                        Arc::new(PostgresShortIds::new(pool)),
                    )
                }
                DatabaseBackend::Memory => (
                    Arc::new(MemoryUserRoomKeys::new()),
                    Arc::new(MemoryShortIds::new()),
                ),
            };

        let database = Self {
            user_room_keys,
            short_ids: Arc::new(CachedShortIds::new(short_ids, cache_capacity)),
            backend: config.backend,
        };

        info!("✅ {:?} database ready in {:?}", config.backend, start.elapsed());
        Ok(database)
    }

    /// A fresh, empty in-memory database
    pub fn memory() -> Self {
        Self {
            user_room_keys: Arc::new(MemoryUserRoomKeys::new()),
            short_ids: Arc::new(MemoryShortIds::new()),
            backend: DatabaseBackend::Memory,
        }
    }

    pub fn backend(&self) -> DatabaseBackend {
        self.backend
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_memory_backend() {
        let config = DatabaseConfig {
            backend: DatabaseBackend::Memory,
            url: String::new(),
            ..DatabaseConfig::default()
        };
        let db = Database::open(&config).await.unwrap();
        assert_eq!(db.backend(), DatabaseBackend::Memory);
    }

    #[tokio::test]
    async fn test_open_rejects_zero_cache_capacity() {
        let config = DatabaseConfig {
            backend: DatabaseBackend::Memory,
            short_id_cache_capacity: 0,
            ..DatabaseConfig::default()
        };
        assert!(matches!(
            Database::open(&config).await,
            Err(MatrixonError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_sqlite_database_survives_reopen() {
        let test_db = testing::sqlite_database().await;
        let nid = test_db
            .database
            .short_ids
            .get_or_create_nid(NidKind::Room, "!persisted:example.org")
            .await
            .unwrap();

        let dir = test_db.dir.as_ref().unwrap();
        let config = DatabaseConfig {
            backend: DatabaseBackend::Sqlite,
            url: format!("sqlite://{}", dir.path().join("matrixon.db").display()),
            ..DatabaseConfig::default()
        };
        let reopened = Database::open(&config).await.unwrap();
        assert_eq!(
            reopened.short_ids.get_nid(NidKind::Room, "!persisted:example.org").await.unwrap(),
            Some(nid)
        );
    }
}
