use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::validation::validation_message;
use crate::core::state::AppState;
use crate::schemas::assistant::{ChatRequest, ChatResponse, ChatRole};
use crate::services::assistant::{AssistantError, FALLBACK_REPLY};

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/chat", post(chat))
}

async fn chat(
    State(state): State<AppState>,
    Json(payload): Json<ChatRequest>,
) -> Result<(StatusCode, Json<ChatResponse>), ApiError> {
    payload.validate().map_err(|errors| ApiError::BadRequest(validation_message(&errors)))?;
    if payload.messages.last().map(|message| message.role) != Some(ChatRole::User) {
        return Err(not_awaiting_reply());
    }

    match state.assistant().reply(&payload.messages).await {
        Ok(reply) => Ok((StatusCode::OK, Json(ChatResponse { reply }))),
        Err(AssistantError::NotAwaitingReply) => Err(not_awaiting_reply()),
        Err(err) => {
            tracing::warn!(error = %err, "Assistant reply failed");
            Ok((StatusCode::BAD_GATEWAY, Json(ChatResponse { reply: FALLBACK_REPLY.to_string() })))
        }
    }
}

fn not_awaiting_reply() -> ApiError {
    ApiError::BadRequest(
        "The last message in the conversation must come from the user.".to_string(),
    )
}
