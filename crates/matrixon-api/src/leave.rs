//! Leave room orchestration
//!
//! Checks who is asking, finds the pseudo-identity they act as in the
//! room, and hands the leave to the membership engine. The only real work
//! here is keeping the engine's policy rejections apart from its other
//! failures.

use std::{sync::Arc, time::Instant};

use matrixon_core::{
    traits::{IdentityResolver, MembershipEngine, PerformLeaveError},
    types::{Device, PerformLeaveRequest, SenderUserIdPair},
};
use ruma::{RoomId, UserId};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::error::LeaveError;

/// Empty JSON object returned on success
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct LeaveResponse {}

pub struct LeaveOrchestrator {
    resolver: Arc<dyn IdentityResolver>,
    engine: Arc<dyn MembershipEngine>,
}

impl LeaveOrchestrator {
    pub fn new(resolver: Arc<dyn IdentityResolver>, engine: Arc<dyn MembershipEngine>) -> Self {
        Self { resolver, engine }
    }

    #[instrument(level = "debug", skip(self, device), fields(user_id = %device.user_id))]
    pub async fn leave_room_by_id(
        &self,
        device: &Device,
        room_id: &str,
    ) -> Result<LeaveResponse, LeaveError> {
        debug!("🔧 Leaving room {}", room_id);
        let start = Instant::now();

        let user_id = UserId::parse(device.user_id.as_str())
            .map_err(|_| LeaveError::InvalidRequest("device userID is invalid".to_owned()))?;

        // A malformed room id cannot have a sender identity either.
        let resolved = match RoomId::parse(room_id) {
            Ok(room_id) => match self.resolver.resolve_sender_identity(&room_id, &user_id).await {
                Ok(sender_id) => Ok((room_id, sender_id)),
                Err(e) => Err(e.to_string()),
            },
            Err(e) => Err(e.to_string()),
        };
        let (room_id, sender_id) = resolved.map_err(|cause| {
            warn!("⚠️ No sender identity for {} in {}: {}", user_id, room_id, cause);
            LeaveError::InvalidRequest("could not find senderID for this user".to_owned())
        })?;

        let request = PerformLeaveRequest {
            room_id,
            leaver: SenderUserIdPair { sender_id, user_id },
        };

        match self.engine.perform_leave(request).await {
            Ok(()) => {
                info!("✅ Left room in {:?}", start.elapsed());
                Ok(LeaveResponse::default())
            }
            Err(PerformLeaveError::Rejected { status, message }) => {
                info!("🚫 Leave rejected by policy: {}", message);
                Err(LeaveError::PolicyRejection { status, message })
            }
            Err(PerformLeaveError::Failed(message)) => {
                warn!("❌ Leave failed: {}", message);
                Err(LeaveError::Unknown(message))
            }
        }
    }
}
