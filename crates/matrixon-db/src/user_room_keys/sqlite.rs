use std::collections::HashMap;

use async_trait::async_trait;
use matrixon_core::{
    types::{PseudoIdKey, PseudoIdPublicKey, RoomNid, UserNid},
    Result,
};
use sqlx::{sqlite::SqlitePool, QueryBuilder, Sqlite};
use tracing::{debug, instrument};

use super::{
    decode_private_row, match_user_nid_rows, public_only_conflict, record_upsert, UserRoomKeys,
};
use crate::{
    error::{returned_row, storage_err},
    pool::ExclusiveWriter,
};

// SQLite caps host parameters per statement (999 on older builds).
const MAX_KEYS_PER_STATEMENT: usize = 500;

const INSERT_USER_ROOM_PRIVATE_KEY_SQL: &str = r#"
    INSERT INTO roomserver_user_room_keys (user_nid, room_nid, pseudo_id_key, pseudo_id_pub_key)
    VALUES (?1, ?2, ?3, ?4)
    ON CONFLICT (user_nid, room_nid) DO UPDATE SET pseudo_id_key = roomserver_user_room_keys.pseudo_id_key
    RETURNING pseudo_id_key, pseudo_id_pub_key
"#;

const INSERT_USER_ROOM_PUBLIC_KEY_SQL: &str = r#"
    INSERT INTO roomserver_user_room_keys (user_nid, room_nid, pseudo_id_pub_key)
    VALUES (?1, ?2, ?3)
    ON CONFLICT (user_nid, room_nid) DO UPDATE SET pseudo_id_pub_key = roomserver_user_room_keys.pseudo_id_pub_key
    RETURNING pseudo_id_pub_key
"#;

const SELECT_USER_ROOM_KEYS_SQL: &str = r#"
    SELECT pseudo_id_key, pseudo_id_pub_key FROM roomserver_user_room_keys
    WHERE user_nid = ?1 AND room_nid = ?2
"#;

const SELECT_USER_NIDS_PREFIX: &str =
    "SELECT user_nid, pseudo_id_pub_key FROM roomserver_user_room_keys WHERE pseudo_id_pub_key IN (";

/// SQLite backed pseudo-identity table
#[derive(Debug, Clone)]
pub struct SqliteUserRoomKeys {
    pool: SqlitePool,
    writer: ExclusiveWriter,
}

impl SqliteUserRoomKeys {
    pub fn new(pool: SqlitePool, writer: ExclusiveWriter) -> Self {
        Self { pool, writer }
    }

    async fn select_row(
        &self,
        user_nid: UserNid,
        room_nid: RoomNid,
    ) -> Result<Option<(Option<Vec<u8>>, Vec<u8>)>> {
        sqlx::query_as(SELECT_USER_ROOM_KEYS_SQL)
            .bind(user_nid.0)
            .bind(room_nid.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err("select user room key"))
    }
}

#[async_trait]
impl UserRoomKeys for SqliteUserRoomKeys {
    #[instrument(level = "debug", skip(self, key))]
    async fn insert_user_room_private_key(
        &self,
        user_nid: UserNid,
        room_nid: RoomNid,
        key: &PseudoIdKey,
    ) -> Result<PseudoIdKey> {
        let rows = {
            let _guard = self.writer.acquire().await;
            let mut tx = self.pool.begin().await.map_err(storage_err("begin user room private key"))?;
            let rows: Vec<(Option<Vec<u8>>, Vec<u8>)> = sqlx::query_as(INSERT_USER_ROOM_PRIVATE_KEY_SQL)
                .bind(user_nid.0)
                .bind(room_nid.0)
                .bind(key.to_bytes().to_vec())
                .bind(key.public_key().as_bytes().to_vec())
                .fetch_all(&mut *tx)
                .await
                .map_err(storage_err("insert user room private key"))?;
            // committed before the writer guard drops
            tx.commit().await.map_err(storage_err("commit user room private key"))?;
            rows
        };
        let (private_key, public_key) = returned_row(rows, "insert user room private key")?;

        let stored = decode_private_row(user_nid, room_nid, private_key, &public_key)?
            .ok_or_else(|| public_only_conflict(user_nid, room_nid))?;
        let won = stored == *key;
        record_upsert("private", won);
        debug!("🔑 Private pseudo-id for user {} in room {} (created: {})", user_nid, room_nid, won);
        Ok(stored)
    }

    #[instrument(level = "debug", skip(self, key))]
    async fn insert_user_room_public_key(
        &self,
        user_nid: UserNid,
        room_nid: RoomNid,
        key: &PseudoIdPublicKey,
    ) -> Result<PseudoIdPublicKey> {
        let rows = {
            let _guard = self.writer.acquire().await;
            let mut tx = self.pool.begin().await.map_err(storage_err("begin user room public key"))?;
            let rows: Vec<(Vec<u8>,)> = sqlx::query_as(INSERT_USER_ROOM_PUBLIC_KEY_SQL)
                .bind(user_nid.0)
                .bind(room_nid.0)
                .bind(key.as_bytes().to_vec())
                .fetch_all(&mut *tx)
                .await
                .map_err(storage_err("insert user room public key"))?;
            tx.commit().await.map_err(storage_err("commit user room public key"))?;
            rows
        };
        let (public_key,) = returned_row(rows, "insert user room public key")?;

        let stored = PseudoIdPublicKey::from_bytes(&public_key)?;
        record_upsert("public", stored == *key);
        Ok(stored)
    }

    #[instrument(level = "debug", skip(self))]
    async fn select_user_room_private_key(
        &self,
        user_nid: UserNid,
        room_nid: RoomNid,
    ) -> Result<Option<PseudoIdKey>> {
        match self.select_row(user_nid, room_nid).await? {
            Some((private_key, public_key)) => {
                decode_private_row(user_nid, room_nid, private_key, &public_key)
            }
            None => Ok(None),
        }
    }

    #[instrument(level = "debug", skip(self))]
    async fn select_user_room_public_key(
        &self,
        user_nid: UserNid,
        room_nid: RoomNid,
    ) -> Result<Option<PseudoIdPublicKey>> {
        self.select_row(user_nid, room_nid)
            .await?
            .map(|(_, public_key)| PseudoIdPublicKey::from_bytes(&public_key))
            .transpose()
    }

    #[instrument(level = "debug", skip_all, fields(keys = public_keys.len()))]
    async fn bulk_select_user_nids(
        &self,
        public_keys: &[PseudoIdPublicKey],
    ) -> Result<HashMap<PseudoIdPublicKey, UserNid>> {
        let mut result = HashMap::with_capacity(public_keys.len());

        for chunk in public_keys.chunks(MAX_KEYS_PER_STATEMENT) {
            let mut builder = QueryBuilder::<Sqlite>::new(SELECT_USER_NIDS_PREFIX);
            let mut params = builder.separated(", ");
            for key in chunk {
                params.push_bind(key.as_bytes().to_vec());
            }
            params.push_unseparated(")");

            let rows: Vec<(i64, Vec<u8>)> = builder
                .build_query_as()
                .fetch_all(&self.pool)
                .await
                .map_err(storage_err("bulk select user nids"))?;

            match_user_nid_rows(chunk, rows, &mut result);
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::run_sqlite_migrations;
    use matrixon_core::MatrixonError;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn open() -> SqliteUserRoomKeys {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        run_sqlite_migrations(&pool).await.unwrap();
        SqliteUserRoomKeys::new(pool, ExclusiveWriter::new())
    }

    #[tokio::test]
    async fn test_miss_is_not_a_fault() {
        let tab = open().await;
        let got = tab.select_user_room_private_key(UserNid(1), RoomNid(2)).await;
        assert!(matches!(got, Ok(None)));
    }

    #[tokio::test]
    async fn test_storage_fault_is_not_a_miss() {
        let tab = open().await;
        tab.pool.close().await;

        let err = tab.select_user_room_private_key(UserNid(1), RoomNid(2)).await.unwrap_err();
        assert!(err.is_storage_fault(), "{err}");

        let err = tab
            .insert_user_room_private_key(UserNid(1), RoomNid(2), &PseudoIdKey::generate())
            .await
            .unwrap_err();
        assert!(err.is_storage_fault(), "{err}");

        let err = tab
            .bulk_select_user_nids(&[PseudoIdKey::generate().public_key()])
            .await
            .unwrap_err();
        assert!(err.is_storage_fault(), "{err}");
    }

    #[tokio::test]
    async fn test_mismatched_stored_pair_is_reported() {
        let tab = open().await;
        let key = PseudoIdKey::generate();
        let other = PseudoIdKey::generate();
        sqlx::query("INSERT INTO roomserver_user_room_keys VALUES (?1, ?2, ?3, ?4)")
            .bind(1_i64)
            .bind(1_i64)
            .bind(key.to_bytes().to_vec())
            .bind(other.public_key().as_bytes().to_vec())
            .execute(&tab.pool)
            .await
            .unwrap();

        let err = tab.select_user_room_private_key(UserNid(1), RoomNid(1)).await.unwrap_err();
        assert!(matches!(err, MatrixonError::Database(_)), "{err}");
    }
}
