//! Matrixon API Library
//!
//! Author: arkSong <arksong2018@gmail.com>
//! Version: 0.11.0-alpha
//! Date: 2024-03-21
//!
//! The client API surface for leaving rooms: the leave orchestrator, the
//! Matrix error mapping, and the axum router with access token
//! authentication.

pub mod error;
pub mod handlers;
pub mod leave;
pub mod middleware;
pub mod routes;

pub use error::{AuthError, LeaveError};
pub use leave::{LeaveOrchestrator, LeaveResponse};
pub use routes::{create_router, AppState};
