use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
};
use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use helpmate_db::models::{MessageRow, format_timestamp};
use helpmate_types::api::{Claims, SendMessageRequest};
use helpmate_types::events::GatewayEvent;
use helpmate_types::models::Message;

use crate::error::{ApiError, ApiResult};
use crate::extract::{AppJson, AppPath};
use crate::{AppState, convert, with_db};

/// `POST /messages/send/{receiver_id}`: store the message in the pair's
/// conversation, then push it to the receiver if they are connected.
pub async fn send_message(
    State(state): State<AppState>,
    AppPath(receiver_id): AppPath<Uuid>,
    Extension(claims): Extension<Claims>,
    AppJson(req): AppJson<SendMessageRequest>,
) -> ApiResult<(StatusCode, Json<Message>)> {
    if req.message.trim().is_empty() {
        return Err(ApiError::Validation("Message cannot be empty".into()));
    }

    let row = MessageRow {
        id: Uuid::new_v4().to_string(),
        sender_id: claims.sub.to_string(),
        receiver_id: receiver_id.to_string(),
        message: req.message,
        created_at: format_timestamp(Utc::now()),
    };
    let conversation_id = Uuid::new_v4().to_string();

    let sent = with_db(&state, move |db| Ok(db.send_message(&conversation_id, &row)?)).await?;

    if sent.conversation_created {
        info!(
            "Conversation {} started between {} and {}",
            sent.conversation_id, claims.sub, receiver_id
        );
    }

    let message = convert::message(sent.message);

    // Fire-and-forget: an offline receiver picks the message up from history
    let delivered = state
        .dispatcher
        .send_to_user(receiver_id, GatewayEvent::NewMessage(message.clone()))
        .await;
    debug!("Message {} pushed to {}: {}", message.id, receiver_id, delivered);

    Ok((StatusCode::CREATED, Json(message)))
}

/// `GET /messages/{other_user_id}`: the requester's conversation with another
/// user, oldest first. Empty when they never talked.
pub async fn get_messages(
    State(state): State<AppState>,
    AppPath(other_user_id): AppPath<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<Message>>> {
    let me = claims.sub.to_string();
    let other = other_user_id.to_string();

    let rows = with_db(&state, move |db| Ok(db.get_messages_between(&me, &other)?)).await?;

    Ok(Json(rows.into_iter().map(convert::message).collect()))
}
