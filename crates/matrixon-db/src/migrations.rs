//! Database migrations for Matrixon
//!
//! Creates the pseudo-identity and numeric-identifier tables. Every
//! statement is idempotent, so opening an existing database is safe.

use matrixon_core::Result;
use sqlx::{postgres::PgPool, sqlite::SqlitePool};
use tracing::{debug, info, instrument};

use crate::error::storage_err;

/// Migration version
pub const MIGRATION_VERSION: &str = "20240321000000";

const SQLITE_SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS _migrations (
        version TEXT PRIMARY KEY,
        applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    )
    "#,
    // pseudo_id_key is NULL for users not local to this server
    r#"
    CREATE TABLE IF NOT EXISTS roomserver_user_room_keys (
        user_nid INTEGER NOT NULL,
        room_nid INTEGER NOT NULL,
        pseudo_id_key BLOB NULL,
        pseudo_id_pub_key BLOB NOT NULL,
        CONSTRAINT roomserver_user_room_keys_pk PRIMARY KEY (user_nid, room_nid)
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS roomserver_user_room_keys_pub_key_idx
        ON roomserver_user_room_keys (pseudo_id_pub_key)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS roomserver_short_ids (
        nid INTEGER PRIMARY KEY AUTOINCREMENT,
        kind TEXT NOT NULL,
        external_id TEXT NOT NULL,
        CONSTRAINT roomserver_short_ids_unique UNIQUE (kind, external_id)
    )
    "#,
];

const POSTGRES_SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS _migrations (
        version TEXT PRIMARY KEY,
        applied_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS roomserver_user_room_keys (
        user_nid BIGINT NOT NULL,
        room_nid BIGINT NOT NULL,
        pseudo_id_key BYTEA NULL,
        pseudo_id_pub_key BYTEA NOT NULL,
        CONSTRAINT roomserver_user_room_keys_pk PRIMARY KEY (user_nid, room_nid)
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS roomserver_user_room_keys_pub_key_idx
        ON roomserver_user_room_keys (pseudo_id_pub_key)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS roomserver_short_ids (
        nid BIGSERIAL PRIMARY KEY,
        kind TEXT NOT NULL,
        external_id TEXT NOT NULL,
        CONSTRAINT roomserver_short_ids_unique UNIQUE (kind, external_id)
    )
    "#,
];

/// Run SQLite migrations
#[instrument(level = "debug", skip(pool))]
pub async fn run_sqlite_migrations(pool: &SqlitePool) -> Result<()> {
    debug!("🔧 Starting SQLite migrations");

    for statement in SQLITE_SCHEMA {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(storage_err("sqlite migration"))?;
    }

    sqlx::query("INSERT INTO _migrations (version) VALUES (?1) ON CONFLICT (version) DO NOTHING")
        .bind(MIGRATION_VERSION)
        .execute(pool)
        .await
        .map_err(storage_err("record sqlite migration"))?;

    info!("✅ SQLite migrations completed");
    Ok(())
}

/// Run PostgreSQL migrations
#[instrument(level = "debug", skip(pool))]
pub async fn run_postgres_migrations(pool: &PgPool) -> Result<()> {
    debug!("🔧 Starting PostgreSQL migrations");

    for statement in POSTGRES_SCHEMA {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(storage_err("postgres migration"))?;
    }

    sqlx::query("INSERT INTO _migrations (version) VALUES ($1) ON CONFLICT (version) DO NOTHING")
        .bind(MIGRATION_VERSION)
        .execute(pool)
        .await
        .map_err(storage_err("record postgres migration"))?;

    info!("✅ PostgreSQL migrations completed");
    Ok(())
}
