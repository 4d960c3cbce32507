//! Room-scoped pseudo-identity store
//!
//! Maps `(user NID, room NID)` to the key pair the user acts as inside that
//! room. A row is written at most once: every write funnels through an
//! insert whose conflict branch reasserts the stored value, so concurrent
//! callers all observe the first key that landed and nothing is ever
//! overwritten. Reads that find nothing return `Ok(None)`; only storage
//! faults are errors.

mod memory;
mod postgres;
mod sqlite;

use std::collections::HashMap;

use async_trait::async_trait;
use matrixon_core::{
    types::{PseudoIdKey, PseudoIdPublicKey, RoomNid, UserNid},
    MatrixonError, Result,
};
use metrics::counter;
use tracing::warn;

pub use memory::MemoryUserRoomKeys;
pub use postgres::PostgresUserRoomKeys;
pub use sqlite::SqliteUserRoomKeys;

#[async_trait]
pub trait UserRoomKeys: Send + Sync {
    /// Get-or-create the private identity for a pair.
    ///
    /// Stores `key` (both halves) if the pair has no row and returns it;
    /// otherwise ignores `key` and returns the stored private key. Fails
    /// with `InvalidState` if the stored row only has a public key.
    async fn insert_user_room_private_key(
        &self,
        user_nid: UserNid,
        room_nid: RoomNid,
        key: &PseudoIdKey,
    ) -> Result<PseudoIdKey>;

    /// Get-or-create a public-only identity, returning the canonical key
    async fn insert_user_room_public_key(
        &self,
        user_nid: UserNid,
        room_nid: RoomNid,
        key: &PseudoIdPublicKey,
    ) -> Result<PseudoIdPublicKey>;

    /// `Ok(None)` if the pair has no row or the row is public-only
    async fn select_user_room_private_key(
        &self,
        user_nid: UserNid,
        room_nid: RoomNid,
    ) -> Result<Option<PseudoIdKey>>;

    async fn select_user_room_public_key(
        &self,
        user_nid: UserNid,
        room_nid: RoomNid,
    ) -> Result<Option<PseudoIdPublicKey>>;

    /// Reverse lookup; keys without a row are left out of the result
    async fn bulk_select_user_nids(
        &self,
        public_keys: &[PseudoIdPublicKey],
    ) -> Result<HashMap<PseudoIdPublicKey, UserNid>>;
}

/// Decode the private half returned by the upsert/select statements and
/// check it still matches the stored public half.
pub(crate) fn decode_private_row(
    user_nid: UserNid,
    room_nid: RoomNid,
    private_key: Option<Vec<u8>>,
    public_key: &[u8],
) -> Result<Option<PseudoIdKey>> {
    let Some(bytes) = private_key else {
        return Ok(None);
    };
    let key = PseudoIdKey::from_bytes(&bytes)?;
    if key.public_key().as_bytes().as_slice() != public_key {
        return Err(MatrixonError::Database(format!(
            "stored pseudo-id key pair for user {user_nid} in room {room_nid} does not match"
        )));
    }
    Ok(Some(key))
}

/// The upsert returned a row without a private half
pub(crate) fn public_only_conflict(user_nid: UserNid, room_nid: RoomNid) -> MatrixonError {
    MatrixonError::InvalidState(format!(
        "user {user_nid} already has a public-only identity in room {room_nid}"
    ))
}

/// Pair reverse-lookup rows with the keys that were asked for.
///
/// Rows are matched back by their stored bytes instead of being decoded
/// again, so one damaged row cannot fail the batch. A row that matches no
/// requested key is logged and skipped.
pub(crate) fn match_user_nid_rows(
    requested: &[PseudoIdPublicKey],
    rows: Vec<(i64, Vec<u8>)>,
    result: &mut HashMap<PseudoIdPublicKey, UserNid>,
) {
    let by_bytes: HashMap<&[u8], &PseudoIdPublicKey> =
        requested.iter().map(|key| (key.as_bytes().as_slice(), key)).collect();

    for (user_nid, public_key) in rows {
        match by_bytes.get(public_key.as_slice()) {
            Some(key) => {
                result.insert(**key, UserNid(user_nid));
            }
            None => warn!(
                "⚠️ Skipping pseudo-id row for user {} with unexpected key of {} bytes",
                user_nid,
                public_key.len()
            ),
        }
    }
}

pub(crate) fn record_upsert(table: &'static str, won: bool) {
    let outcome = if won { "created" } else { "existing" };
    counter!("db.user_room_keys.upsert", "kind" => table, "outcome" => outcome).increment(1);
}
