use std::collections::HashMap;

use async_trait::async_trait;
use matrixon_core::{
    types::{PseudoIdKey, PseudoIdPublicKey, RoomNid, UserNid},
    Result,
};
use sqlx::postgres::PgPool;
use tracing::{debug, instrument};

use super::{
    decode_private_row, match_user_nid_rows, public_only_conflict, record_upsert, UserRoomKeys,
};
use crate::error::{returned_row, storage_err};

const INSERT_USER_ROOM_PRIVATE_KEY_SQL: &str = r#"
    INSERT INTO roomserver_user_room_keys (user_nid, room_nid, pseudo_id_key, pseudo_id_pub_key)
    VALUES ($1, $2, $3, $4)
    ON CONFLICT ON CONSTRAINT roomserver_user_room_keys_pk
    DO UPDATE SET pseudo_id_key = roomserver_user_room_keys.pseudo_id_key
    RETURNING pseudo_id_key, pseudo_id_pub_key
"#;

const INSERT_USER_ROOM_PUBLIC_KEY_SQL: &str = r#"
    INSERT INTO roomserver_user_room_keys (user_nid, room_nid, pseudo_id_pub_key)
    VALUES ($1, $2, $3)
    ON CONFLICT ON CONSTRAINT roomserver_user_room_keys_pk
    DO UPDATE SET pseudo_id_pub_key = roomserver_user_room_keys.pseudo_id_pub_key
    RETURNING pseudo_id_pub_key
"#;

const SELECT_USER_ROOM_KEYS_SQL: &str = r#"
    SELECT pseudo_id_key, pseudo_id_pub_key FROM roomserver_user_room_keys
    WHERE user_nid = $1 AND room_nid = $2
"#;

const SELECT_USER_NIDS_SQL: &str = r#"
    SELECT user_nid, pseudo_id_pub_key FROM roomserver_user_room_keys
    WHERE pseudo_id_pub_key = ANY($1)
"#;

/// PostgreSQL backed pseudo-identity table
#[derive(Debug, Clone)]
pub struct PostgresUserRoomKeys {
    pool: PgPool,
}

impl PostgresUserRoomKeys {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
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
impl UserRoomKeys for PostgresUserRoomKeys {
    #[instrument(level = "debug", skip(self, key))]
    async fn insert_user_room_private_key(
        &self,
        user_nid: UserNid,
        room_nid: RoomNid,
        key: &PseudoIdKey,
    ) -> Result<PseudoIdKey> {
        let rows: Vec<(Option<Vec<u8>>, Vec<u8>)> = sqlx::query_as(INSERT_USER_ROOM_PRIVATE_KEY_SQL)
            .bind(user_nid.0)
            .bind(room_nid.0)
            .bind(key.to_bytes().to_vec())
            .bind(key.public_key().as_bytes().to_vec())
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err("insert user room private key"))?;
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
        let rows: Vec<(Vec<u8>,)> = sqlx::query_as(INSERT_USER_ROOM_PUBLIC_KEY_SQL)
            .bind(user_nid.0)
            .bind(room_nid.0)
            .bind(key.as_bytes().to_vec())
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err("insert user room public key"))?;
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
        if public_keys.is_empty() {
            return Ok(HashMap::new());
        }

        // one bytea[] parameter, so there is no bind limit to chunk around
        let params: Vec<Vec<u8>> = public_keys.iter().map(|key| key.as_bytes().to_vec()).collect();
        let rows: Vec<(i64, Vec<u8>)> = sqlx::query_as(SELECT_USER_NIDS_SQL)
            .bind(params)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err("bulk select user nids"))?;

        let mut result = HashMap::with_capacity(rows.len());
        match_user_nid_rows(public_keys, rows, &mut result);
        Ok(result)
    }
}
