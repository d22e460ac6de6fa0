//! Handlers for the `/system` resource (operator announcements).

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use darkroom_core::error::CoreError;
use darkroom_core::notifications::MSG_TYPE_SYSTEM_NOTICE;
use darkroom_events::PipelineEvent;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::state::AppState;

/// Request body for `POST /system/notice`.
#[derive(Debug, Deserialize)]
pub struct NoticeRequest {
    pub message: String,
}

/// POST /api/v1/system/notice
///
/// Broadcast an announcement to every connected client. Delivery goes
/// through the event bus so it follows the same path as job events.
pub async fn notice(
    State(state): State<AppState>,
    user: AuthUser,
    Json(input): Json<NoticeRequest>,
) -> AppResult<StatusCode> {
    let message = input.message.trim();
    if message.is_empty() {
        return Err(AppError::Core(CoreError::Validation(
            "Notice message must not be empty".into(),
        )));
    }

    state.event_bus.publish(
        PipelineEvent::new(MSG_TYPE_SYSTEM_NOTICE).with_payload(serde_json::json!({
            "message": message,
            "from": user.username,
        })),
    );

    tracing::info!(user_id = user.user_id, "System notice published");

    Ok(StatusCode::ACCEPTED)
}
