//! Core traits for Matrixon
//!
//! The seams between the leave handling code and the services it consumes.
//! Each trait is object safe so the request layer can hold `Arc<dyn _>`
//! and tests can swap in mocks.

use async_trait::async_trait;
use ruma::{RoomId, UserId};
use thiserror::Error;

use crate::{
    types::{Device, PerformLeaveRequest, SenderId},
    Result,
};

/// Resolves the pseudo-identity a user acts as inside a room
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Returns the sender id bound to `(room_id, user_id)`.
    ///
    /// Fails when the user has no recorded identity in the room.
    async fn resolve_sender_identity(&self, room_id: &RoomId, user_id: &UserId) -> Result<SenderId>;
}

/// Failure reported by the membership engine for a leave
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PerformLeaveError {
    /// A named policy refused the leave, e.g. a server notice room
    #[error("leave rejected by policy ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Anything else went wrong
    #[error("{0}")]
    Failed(String),
}

/// Authorizes and executes membership changes
#[async_trait]
pub trait MembershipEngine: Send + Sync {
    async fn perform_leave(
        &self,
        request: PerformLeaveRequest,
    ) -> std::result::Result<(), PerformLeaveError>;
}

/// Maps access tokens to authenticated devices
#[async_trait]
pub trait DeviceLookup: Send + Sync {
    /// `Ok(None)` when the token is unknown
    async fn device_for_token(&self, access_token: &str) -> Result<Option<Device>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PseudoIdKey, SenderUserIdPair};
    use mockall::mock;

    mock! {
        Engine {}
        #[async_trait]
        impl MembershipEngine for Engine {
            async fn perform_leave(
                &self,
                request: PerformLeaveRequest,
            ) -> std::result::Result<(), PerformLeaveError>;
        }
    }

    fn leave_request() -> PerformLeaveRequest {
        PerformLeaveRequest {
            room_id: ruma::room_id!("!room:example.org").to_owned(),
            leaver: SenderUserIdPair {
                sender_id: SenderId::from_public_key(&PseudoIdKey::generate().public_key()),
                user_id: ruma::user_id!("@alice:example.org").to_owned(),
            },
        }
    }

    #[test]
    fn test_rejection_display_carries_status() {
        let err = PerformLeaveError::Rejected {
            status: 403,
            message: "server notice room".to_owned(),
        };
        assert_eq!(err.to_string(), "leave rejected by policy (403): server notice room");
        assert_eq!(PerformLeaveError::Failed("boom".to_owned()).to_string(), "boom");
    }

    #[tokio::test]
    async fn test_engine_is_usable_as_trait_object() {
        let mut mock = MockEngine::new();
        mock.expect_perform_leave()
            .times(1)
            .returning(|_| Err(PerformLeaveError::Failed("not joined".to_owned())));

        let engine: Box<dyn MembershipEngine> = Box::new(mock);
        let result = engine.perform_leave(leave_request()).await;
        assert_eq!(result, Err(PerformLeaveError::Failed("not joined".to_owned())));
    }
}
