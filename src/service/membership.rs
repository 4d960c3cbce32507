//! In-process membership engine
//!
//! Keeps joined `(room, sender)` pairs in memory and applies the one leave
//! policy this server enforces: server notice rooms cannot be left.

use std::collections::HashSet;

use async_trait::async_trait;
use matrixon_core::{
    traits::{MembershipEngine, PerformLeaveError},
    types::{PerformLeaveRequest, SenderId},
};
use ruma::{OwnedRoomId, RoomId};
use tokio::sync::RwLock;
use tracing::{debug, instrument};

const FORBIDDEN: u16 = 403;

pub struct RoomMembership {
    server_notice_rooms: HashSet<OwnedRoomId>,
    joined: RwLock<HashSet<(OwnedRoomId, SenderId)>>,
}

impl RoomMembership {
    pub fn new(server_notice_rooms: impl IntoIterator<Item = OwnedRoomId>) -> Self {
        Self {
            server_notice_rooms: server_notice_rooms.into_iter().collect(),
            joined: RwLock::new(HashSet::new()),
        }
    }

    pub async fn join(&self, room_id: &RoomId, sender_id: SenderId) {
        debug!("➕ {} joined {}", sender_id, room_id);
        self.joined.write().await.insert((room_id.to_owned(), sender_id));
    }

    pub async fn is_joined(&self, room_id: &RoomId, sender_id: &SenderId) -> bool {
        self.joined
            .read()
            .await
            .contains(&(room_id.to_owned(), sender_id.clone()))
    }
}

#[async_trait]
impl MembershipEngine for RoomMembership {
    #[instrument(level = "debug", skip_all, fields(room_id = %request.room_id, user_id = %request.leaver.user_id))]
    async fn perform_leave(
        &self,
        request: PerformLeaveRequest,
    ) -> Result<(), PerformLeaveError> {
        if self.server_notice_rooms.contains(&request.room_id) {
            return Err(PerformLeaveError::Rejected {
                status: FORBIDDEN,
                message: "You cannot leave a server notice room".to_owned(),
            });
        }

        let membership = (request.room_id, request.leaver.sender_id);
        if !self.joined.write().await.remove(&membership) {
            return Err(PerformLeaveError::Failed(format!(
                "user {} is not joined to room {}",
                request.leaver.user_id, membership.0
            )));
        }

        debug!("➖ {} left {}", membership.1, membership.0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matrixon_core::types::{PseudoIdKey, SenderUserIdPair};
    use ruma::{room_id, user_id};

    fn leave(room_id: &RoomId, sender_id: &SenderId) -> PerformLeaveRequest {
        PerformLeaveRequest {
            room_id: room_id.to_owned(),
            leaver: SenderUserIdPair {
                sender_id: sender_id.clone(),
                user_id: user_id!("@alice:example.org").to_owned(),
            },
        }
    }

    fn sender() -> SenderId {
        SenderId::from_public_key(&PseudoIdKey::generate().public_key())
    }

    #[tokio::test]
    async fn test_joined_sender_can_leave_once() {
        let engine = RoomMembership::new([]);
        let room = room_id!("!room:example.org");
        let alice = sender();
        engine.join(room, alice.clone()).await;

        engine.perform_leave(leave(room, &alice)).await.unwrap();
        assert!(!engine.is_joined(room, &alice).await);

        let err = engine.perform_leave(leave(room, &alice)).await.unwrap_err();
        assert!(matches!(err, PerformLeaveError::Failed(_)), "{err}");
    }

    #[tokio::test]
    async fn test_server_notice_room_is_rejected_by_policy() {
        let notices = room_id!("!notices:example.org");
        let engine = RoomMembership::new([notices.to_owned()]);
        let alice = sender();
        engine.join(notices, alice.clone()).await;

        let err = engine.perform_leave(leave(notices, &alice)).await.unwrap_err();
        assert!(matches!(err, PerformLeaveError::Rejected { status: 403, .. }), "{err}");
        assert!(engine.is_joined(notices, &alice).await);
    }
}
