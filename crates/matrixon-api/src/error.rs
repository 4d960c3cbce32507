//! Client-facing errors for Matrixon API
//!
//! Every failure leaves the server as a Matrix error body,
//! `{"errcode": "M_...", "error": "..."}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub errcode: &'static str,
    pub error: String,
}

impl ErrorResponse {
    fn into_response_with(self, status: StatusCode) -> Response {
        (status, Json(self)).into_response()
    }
}

/// Ways a leave request can fail.
///
/// A policy rejection keeps the status and reason the membership engine
/// chose; it must never be folded into `Unknown`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LeaveError {
    /// Malformed caller identity or no recorded sender identity
    #[error("{0}")]
    InvalidRequest(String),

    /// The membership engine refused the leave by policy
    #[error("{message}")]
    PolicyRejection { status: u16, message: String },

    #[error("{0}")]
    Unknown(String),
}

impl LeaveError {
    pub fn status(&self) -> StatusCode {
        match self {
            LeaveError::InvalidRequest(_) | LeaveError::Unknown(_) => StatusCode::BAD_REQUEST,
            LeaveError::PolicyRejection { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::FORBIDDEN)
            }
        }
    }

    pub fn errcode(&self) -> &'static str {
        match self {
            LeaveError::PolicyRejection { .. } => "M_CANNOT_LEAVE_SERVER_NOTICE_ROOM",
            LeaveError::InvalidRequest(_) | LeaveError::Unknown(_) => "M_UNKNOWN",
        }
    }
}

impl IntoResponse for LeaveError {
    fn into_response(self) -> Response {
        let status = self.status();
        ErrorResponse {
            errcode: self.errcode(),
            error: self.to_string(),
        }
        .into_response_with(status)
    }
}

/// Access token failures raised before a handler runs
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Missing access token")]
    MissingToken,

    #[error("Unrecognised access token")]
    UnknownToken,

    #[error("Device lookup failed: {0}")]
    Unavailable(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, errcode) = match &self {
            AuthError::MissingToken => (StatusCode::UNAUTHORIZED, "M_MISSING_TOKEN"),
            AuthError::UnknownToken => (StatusCode::UNAUTHORIZED, "M_UNKNOWN_TOKEN"),
            AuthError::Unavailable(_) => (StatusCode::INTERNAL_SERVER_ERROR, "M_UNKNOWN"),
        };
        ErrorResponse {
            errcode,
            error: self.to_string(),
        }
        .into_response_with(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::{json, Value};

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_invalid_request_is_bad_request() {
        let response = LeaveError::InvalidRequest("device userID is invalid".to_owned()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await,
            json!({"errcode": "M_UNKNOWN", "error": "device userID is invalid"})
        );
    }

    #[tokio::test]
    async fn test_policy_rejection_keeps_engine_status() {
        let err = LeaveError::PolicyRejection {
            status: 403,
            message: "You cannot leave a server notice room".to_owned(),
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            body_json(response).await["errcode"],
            "M_CANNOT_LEAVE_SERVER_NOTICE_ROOM"
        );
    }

    #[test]
    fn test_policy_rejection_with_bogus_status_falls_back() {
        let err = LeaveError::PolicyRejection {
            status: 42,
            message: String::new(),
        };
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_auth_errors() {
        let response = AuthError::MissingToken.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["errcode"], "M_MISSING_TOKEN");

        let response = AuthError::UnknownToken.into_response();
        assert_eq!(body_json(response).await["errcode"], "M_UNKNOWN_TOKEN");
    }
}
