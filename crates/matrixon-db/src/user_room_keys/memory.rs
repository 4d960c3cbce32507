use std::collections::{hash_map::Entry, HashMap};

use async_trait::async_trait;
use matrixon_core::{
    types::{PseudoIdKey, PseudoIdPublicKey, RoomNid, UserNid},
    Result,
};
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use super::{public_only_conflict, record_upsert, UserRoomKeys};

#[derive(Debug, Clone)]
struct Row {
    private_key: Option<PseudoIdKey>,
    public_key: PseudoIdPublicKey,
}

#[derive(Debug, Default)]
struct Tables {
    rows: HashMap<(UserNid, RoomNid), Row>,
    user_nid_by_public_key: HashMap<PseudoIdPublicKey, UserNid>,
}

impl Tables {
    /// Insert `row` unless the pair already has one; returns the stored row
    fn get_or_insert(&mut self, user_nid: UserNid, room_nid: RoomNid, row: Row) -> (Row, bool) {
        match self.rows.entry((user_nid, room_nid)) {
            Entry::Occupied(existing) => (existing.get().clone(), false),
            Entry::Vacant(vacant) => {
                self.user_nid_by_public_key
                    .entry(row.public_key)
                    .or_insert(user_nid);
                (vacant.insert(row).clone(), true)
            }
        }
    }
}

/// In-memory pseudo-identity table.
///
/// Get-or-create holds the write lock for the whole check-and-insert, and
/// the reverse index is updated under the same lock.
#[derive(Debug, Default)]
pub struct MemoryUserRoomKeys {
    tables: RwLock<Tables>,
}

impl MemoryUserRoomKeys {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRoomKeys for MemoryUserRoomKeys {
    #[instrument(level = "debug", skip(self, key))]
    async fn insert_user_room_private_key(
        &self,
        user_nid: UserNid,
        room_nid: RoomNid,
        key: &PseudoIdKey,
    ) -> Result<PseudoIdKey> {
        let candidate = Row {
            private_key: Some(key.clone()),
            public_key: key.public_key(),
        };
        let (row, won) = self.tables.write().await.get_or_insert(user_nid, room_nid, candidate);

        let stored = row
            .private_key
            .ok_or_else(|| public_only_conflict(user_nid, room_nid))?;
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
        let candidate = Row {
            private_key: None,
            public_key: *key,
        };
        let (row, won) = self.tables.write().await.get_or_insert(user_nid, room_nid, candidate);
        record_upsert("public", won);
        Ok(row.public_key)
    }

    async fn select_user_room_private_key(
        &self,
        user_nid: UserNid,
        room_nid: RoomNid,
    ) -> Result<Option<PseudoIdKey>> {
        let tables = self.tables.read().await;
        Ok(tables
            .rows
            .get(&(user_nid, room_nid))
            .and_then(|row| row.private_key.clone()))
    }

    async fn select_user_room_public_key(
        &self,
        user_nid: UserNid,
        room_nid: RoomNid,
    ) -> Result<Option<PseudoIdPublicKey>> {
        let tables = self.tables.read().await;
        Ok(tables.rows.get(&(user_nid, room_nid)).map(|row| row.public_key))
    }

    async fn bulk_select_user_nids(
        &self,
        public_keys: &[PseudoIdPublicKey],
    ) -> Result<HashMap<PseudoIdPublicKey, UserNid>> {
        let tables = self.tables.read().await;
        Ok(public_keys
            .iter()
            .filter_map(|key| {
                tables
                    .user_nid_by_public_key
                    .get(key)
                    .map(|user_nid| (*key, *user_nid))
            })
            .collect())
    }
}
