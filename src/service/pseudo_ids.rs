//! Room-scoped sender identities
//!
//! Ties the numeric-id table and the pseudo-identity store together:
//! user and room ids become NIDs, NIDs key the stored ed25519 identity,
//! and the public half is what other servers and clients see as the
//! sender of events.

use std::{collections::HashMap, time::Instant};

use async_trait::async_trait;
use matrixon_core::{
    traits::IdentityResolver,
    types::{PseudoIdKey, PseudoIdPublicKey, RoomNid, SenderId, UserNid},
    MatrixonError, Result,
};
use matrixon_db::{Database, NidKind};
use ruma::{OwnedUserId, RoomId, UserId};
use tracing::{debug, info, instrument, warn};

pub struct PseudoIdService {
    db: Database,
}

impl PseudoIdService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// NIDs for an existing pair; `None` if either was never seen
    async fn existing_nids(&self, room_id: &RoomId, user_id: &UserId) -> Result<Option<(UserNid, RoomNid)>> {
        let Some(user_nid) = self.db.short_ids.get_nid(NidKind::User, user_id.as_str()).await? else {
            return Ok(None);
        };
        let Some(room_nid) = self.db.short_ids.get_nid(NidKind::Room, room_id.as_str()).await? else {
            return Ok(None);
        };
        Ok(Some((UserNid(user_nid), RoomNid(room_nid))))
    }

    async fn nids(&self, room_id: &RoomId, user_id: &UserId) -> Result<(UserNid, RoomNid)> {
        let user_nid = self.db.short_ids.get_or_create_nid(NidKind::User, user_id.as_str()).await?;
        let room_nid = self.db.short_ids.get_or_create_nid(NidKind::Room, room_id.as_str()).await?;
        Ok((UserNid(user_nid), RoomNid(room_nid)))
    }

    /// Get or create the identity a local user acts as in `room_id`.
    ///
    /// Safe to race: every caller gets the same sender id back.
    #[instrument(level = "debug", skip(self))]
    pub async fn claim_local_sender_identity(&self, room_id: &RoomId, user_id: &UserId) -> Result<SenderId> {
        let start = Instant::now();
        let (user_nid, room_nid) = self.nids(room_id, user_id).await?;

        let key = self
            .db
            .user_room_keys
            .insert_user_room_private_key(user_nid, room_nid, &PseudoIdKey::generate())
            .await?;
        let sender_id = SenderId::from_public_key(&key.public_key());

        debug!("✅ Sender {} claimed in {:?}", sender_id, start.elapsed());
        Ok(sender_id)
    }

    /// Record the identity a remote user announced for `room_id`.
    ///
    /// The first key recorded for the pair stays; a different key later on
    /// is ignored and the stored one returned.
    #[instrument(level = "debug", skip(self, public_key))]
    pub async fn record_remote_sender_identity(
        &self,
        room_id: &RoomId,
        user_id: &UserId,
        public_key: &PseudoIdPublicKey,
    ) -> Result<SenderId> {
        let (user_nid, room_nid) = self.nids(room_id, user_id).await?;
        let stored = self
            .db
            .user_room_keys
            .insert_user_room_public_key(user_nid, room_nid, public_key)
            .await?;

        if stored != *public_key {
            warn!("⚠️ Ignoring new pseudo-id for {} in {}, keeping the first one", user_id, room_id);
        }
        Ok(SenderId::from_public_key(&stored))
    }

    /// Map senders back to the users behind them. Unknown senders are left out.
    #[instrument(level = "debug", skip_all, fields(senders = sender_ids.len()))]
    pub async fn users_for_senders(&self, sender_ids: &[SenderId]) -> Result<HashMap<SenderId, OwnedUserId>> {
        let start = Instant::now();

        let public_keys: Vec<PseudoIdPublicKey> = sender_ids
            .iter()
            .filter_map(|sender_id| match sender_id.to_public_key() {
                Ok(key) => Some(key),
                Err(e) => {
                    debug!("Skipping sender {}: {}", sender_id, e);
                    None
                }
            })
            .collect();

        let user_nids = self.db.user_room_keys.bulk_select_user_nids(&public_keys).await?;

        let mut users = HashMap::with_capacity(user_nids.len());
        for (public_key, user_nid) in user_nids {
            let external_id = self
                .db
                .short_ids
                .get_external_id(NidKind::User, user_nid.0)
                .await?
                .ok_or_else(|| MatrixonError::Database(format!("user NID {user_nid} has no user id")))?;
            let user_id = UserId::parse(external_id.as_str())
                .map_err(|e| MatrixonError::Database(format!("stored user id {external_id} is invalid: {e}")))?;
            users.insert(SenderId::from_public_key(&public_key), user_id);
        }

        info!("✅ Resolved {}/{} senders in {:?}", users.len(), sender_ids.len(), start.elapsed());
        Ok(users)
    }
}

#[async_trait]
impl IdentityResolver for PseudoIdService {
    /// Lookup only; a user never seen in the room gets `NotFound`
    #[instrument(level = "debug", skip(self))]
    async fn resolve_sender_identity(&self, room_id: &RoomId, user_id: &UserId) -> Result<SenderId> {
        let not_found = || MatrixonError::NotFound(format!("no sender identity for {user_id} in {room_id}"));

        let (user_nid, room_nid) = self.existing_nids(room_id, user_id).await?.ok_or_else(not_found)?;
        let public_key = self
            .db
            .user_room_keys
            .select_user_room_public_key(user_nid, room_nid)
            .await?
            .ok_or_else(not_found)?;

        Ok(SenderId::from_public_key(&public_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ruma::{room_id, user_id};
    use test_log::test;

    fn service() -> PseudoIdService {
        PseudoIdService::new(Database::memory())
    }

    #[test(tokio::test)]
    async fn test_claimed_identity_resolves() {
        let service = service();
        let room = room_id!("!room:example.org");
        let alice = user_id!("@alice:example.org");

        let claimed = service.claim_local_sender_identity(room, alice).await.unwrap();
        assert_eq!(service.claim_local_sender_identity(room, alice).await.unwrap(), claimed);
        assert_eq!(service.resolve_sender_identity(room, alice).await.unwrap(), claimed);
    }

    #[test(tokio::test)]
    async fn test_identities_are_scoped_per_room() {
        let service = service();
        let alice = user_id!("@alice:example.org");

        let first = service
            .claim_local_sender_identity(room_id!("!one:example.org"), alice)
            .await
            .unwrap();
        let second = service
            .claim_local_sender_identity(room_id!("!two:example.org"), alice)
            .await
            .unwrap();
        assert_ne!(first, second);
    }

    #[test(tokio::test)]
    async fn test_unknown_user_or_room_is_not_found() {
        let service = service();
        let room = room_id!("!room:example.org");
        service
            .claim_local_sender_identity(room, user_id!("@alice:example.org"))
            .await
            .unwrap();

        let err = service
            .resolve_sender_identity(room, user_id!("@bob:example.org"))
            .await
            .unwrap_err();
        assert!(err.is_not_found(), "{err}");

        let err = service
            .resolve_sender_identity(room_id!("!other:example.org"), user_id!("@alice:example.org"))
            .await
            .unwrap_err();
        assert!(err.is_not_found(), "{err}");
    }

    #[test(tokio::test)]
    async fn test_remote_identity_keeps_first_key() {
        let service = service();
        let room = room_id!("!room:example.org");
        let bob = user_id!("@bob:remote.example");
        let first = PseudoIdKey::generate().public_key();

        let sender = service.record_remote_sender_identity(room, bob, &first).await.unwrap();
        assert_eq!(sender, SenderId::from_public_key(&first));

        let rotated = PseudoIdKey::generate().public_key();
        let sender = service.record_remote_sender_identity(room, bob, &rotated).await.unwrap();
        assert_eq!(sender, SenderId::from_public_key(&first));
        assert_eq!(service.resolve_sender_identity(room, bob).await.unwrap(), sender);

        // a remote user's pair has no private half to claim
        let err = service.claim_local_sender_identity(room, bob).await.unwrap_err();
        assert!(matches!(err, MatrixonError::InvalidState(_)), "{err}");
    }

    #[test(tokio::test)]
    async fn test_users_for_senders_omits_unknown() {
        let service = service();
        let room = room_id!("!room:example.org");
        let alice = user_id!("@alice:example.org");
        let bob = user_id!("@bob:remote.example");

        let alice_sender = service.claim_local_sender_identity(room, alice).await.unwrap();
        let bob_sender = service
            .record_remote_sender_identity(room, bob, &PseudoIdKey::generate().public_key())
            .await
            .unwrap();
        let stranger = SenderId::from_public_key(&PseudoIdKey::generate().public_key());

        let users = service
            .users_for_senders(&[alice_sender.clone(), bob_sender.clone(), stranger])
            .await
            .unwrap();
        assert_eq!(
            users,
            HashMap::from([(alice_sender, alice.to_owned()), (bob_sender, bob.to_owned())])
        );
        assert!(service.users_for_senders(&[]).await.unwrap().is_empty());
    }
}
