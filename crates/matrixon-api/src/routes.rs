//! API routes for Matrixon
//!
//! This module defines the client API routes for the Matrixon server.

use std::sync::Arc;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use matrixon_core::traits::DeviceLookup;

use crate::{handlers, leave::LeaveOrchestrator, middleware};

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub leave: Arc<LeaveOrchestrator>,
    pub devices: Arc<dyn DeviceLookup>,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let authenticated = Router::new()
        .route("/_matrix/client/r0/rooms/:room_id/leave", post(handlers::leave_room))
        .route("/_matrix/client/v3/rooms/:room_id/leave", post(handlers::leave_room))
        .route_layer(from_fn_with_state(state.clone(), middleware::authenticate));

    let (trace_layer, cors_layer) = middleware::create_middleware_stack();

    Router::new()
        .route("/_matrix/client/versions", get(handlers::versions))
        .merge(authenticated)
        .layer(trace_layer)
        .layer(cors_layer)
        .with_state(state)
}
