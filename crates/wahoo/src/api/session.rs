use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use serde::{Deserialize, Serialize};
use tracing::info;
use wahoo_ipc::SessionTransport;

use super::error::ApiError;
use super::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub recipient: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct SendResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// POST /api/send
///
/// A rejected send is still a 200; only a malformed body is a client error.
/// The body is read as JSON whatever its declared content type.
pub async fn send_message<T: SessionTransport>(
    State(state): State<AppState<T>>,
    body: Bytes,
) -> Result<Json<SendResponse>, ApiError> {
    let req: SendRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid request body: {}", e)))?;

    let outcome = state.session.send_message(&req.recipient, &req.message).await;
    if outcome.ok {
        info!(recipient = %req.recipient, "Message sent");
        Ok(Json(SendResponse {
            success: true,
            message: Some(outcome.detail),
            error: None,
        }))
    } else {
        Ok(Json(SendResponse {
            success: false,
            message: None,
            error: Some(outcome.detail),
        }))
    }
}

/// Any other method on /api/send.
pub async fn send_requires_post() -> ApiError {
    ApiError::MethodNotAllowed("POST")
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub connected: bool,
    pub state: &'static str,
}

/// GET /api/status
pub async fn status<T: SessionTransport>(State(state): State<AppState<T>>) -> Json<StatusResponse> {
    let session_state = state.session.state();
    Json(StatusResponse {
        connected: session_state.is_connected(),
        state: session_state.as_str(),
    })
}
