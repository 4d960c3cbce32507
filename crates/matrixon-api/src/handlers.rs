//! Request handlers for Matrixon API

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use matrixon_core::types::Device;
use serde::Serialize;

use crate::{error::LeaveError, leave::LeaveResponse, routes::AppState};

/// Version response
#[derive(Debug, Serialize)]
pub struct VersionResponse {
    /// Supported versions
    pub versions: Vec<String>,
}

/// Version handler
pub async fn versions() -> impl IntoResponse {
    let response = VersionResponse {
        versions: vec!["r0.6.1".to_owned(), "v1.1".to_owned()],
    };

    (StatusCode::OK, Json(response))
}

/// `POST /_matrix/client/{r0,v3}/rooms/{roomId}/leave`
pub async fn leave_room(
    State(state): State<AppState>,
    Extension(device): Extension<Device>,
    Path(room_id): Path<String>,
) -> Result<Json<LeaveResponse>, LeaveError> {
    state
        .leave
        .leave_room_by_id(&device, &room_id)
        .await
        .map(Json)
}
