//! Services behind the client API

pub mod devices;
pub mod membership;
pub mod pseudo_ids;

use std::{collections::HashMap, sync::Arc};

use axum::Router;
use matrixon_api::{create_router, AppState, LeaveOrchestrator};
use matrixon_core::{config::StaticMembership, types::SenderId, Config, MatrixonError, Result};
use matrixon_db::Database;
use ruma::{OwnedUserId, RoomId, UserId};
use tracing::{debug, info, instrument};

pub use devices::StaticDevices;
pub use membership::RoomMembership;
pub use pseudo_ids::PseudoIdService;

pub struct Services {
    pub pseudo_ids: Arc<PseudoIdService>,
    pub membership: Arc<RoomMembership>,
    pub devices: Arc<StaticDevices>,
}

impl Services {
    /// Wire the services together and restore configured memberships
    pub async fn build(config: &Config, db: Database) -> Result<Self> {
        let server_notice_rooms = config
            .server_notices
            .room_ids
            .iter()
            .map(|room_id| RoomId::parse(room_id.as_str()))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        info!(
            "🔧 Services ready: {} server notice rooms, {} devices",
            server_notice_rooms.len(),
            config.devices.len()
        );

        let services = Self {
            pseudo_ids: Arc::new(PseudoIdService::new(db)),
            membership: Arc::new(RoomMembership::new(server_notice_rooms)),
            devices: Arc::new(StaticDevices::new(&config.devices)),
        };
        services.restore_memberships(&config.memberships).await?;
        Ok(services)
    }

    /// Join every configured member, claiming or recording its pseudo-identity
    #[instrument(level = "debug", skip_all, fields(memberships = memberships.len()))]
    async fn restore_memberships(&self, memberships: &[StaticMembership]) -> Result<()> {
        let mut members: HashMap<SenderId, OwnedUserId> = HashMap::with_capacity(memberships.len());

        for membership in memberships {
            let room_id = RoomId::parse(membership.room_id.as_str())?;
            let user_id = UserId::parse(membership.user_id.as_str())?;

            let sender_id = match &membership.sender_id {
                Some(raw) => {
                    let announced = SenderId::parse(raw.as_str())?;
                    self.pseudo_ids
                        .record_remote_sender_identity(&room_id, &user_id, &announced.to_public_key()?)
                        .await?
                }
                None => self.pseudo_ids.claim_local_sender_identity(&room_id, &user_id).await?,
            };

            debug!("🔧 Restoring {} in {} as {}", user_id, room_id, sender_id);
            self.membership.join(&room_id, sender_id.clone()).await;
            members.insert(sender_id, user_id);
        }

        // each joined sender has to lead back to the member it was restored for
        let senders: Vec<SenderId> = members.keys().cloned().collect();
        let resolved = self.pseudo_ids.users_for_senders(&senders).await?;
        if resolved != members {
            return Err(MatrixonError::InvalidState(format!(
                "restored senders do not map back to their users ({} of {} resolved)",
                resolved.len(),
                members.len()
            )));
        }

        info!("✅ Restored {} memberships", members.len());
        Ok(())
    }

    pub fn router(&self) -> Router {
        let leave = LeaveOrchestrator::new(self.pseudo_ids.clone(), self.membership.clone());
        create_router(AppState {
            leave: Arc::new(leave),
            devices: self.devices.clone(),
        })
    }
}
