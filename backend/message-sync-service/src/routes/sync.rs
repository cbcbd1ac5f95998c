use crate::error::AppError;
use crate::middleware::guards::User;
use crate::models::{SyncMessagesRequest, SyncMessagesResponse, SyncRequest};
use crate::state::AppState;
use actix_web::{post, web, HttpResponse};

/// Full (`lastSyncTime == 0`) or incremental sync
/// POST /api/v1/sync
#[post("/sync")]
pub async fn sync_state(
    state: web::Data<AppState>,
    user: User,
    body: web::Json<SyncRequest>,
) -> Result<HttpResponse, AppError> {
    let response = state
        .sync
        .full_or_incremental_sync(user.id, body.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(response))
}

/// Message catch-up only
/// POST /api/v1/sync/messages
#[post("/sync/messages")]
pub async fn sync_messages(
    state: web::Data<AppState>,
    user: User,
    body: web::Json<SyncMessagesRequest>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let conversations = state
        .sync
        .catch_up_messages(user.id, &body.conversation_cursors, body.limit_per_conversation)
        .await?;
    Ok(HttpResponse::Ok().json(SyncMessagesResponse { conversations }))
}
