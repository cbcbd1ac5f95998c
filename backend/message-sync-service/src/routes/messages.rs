use crate::error::AppError;
use crate::middleware::guards::User;
use crate::models::{GetMessagesQuery, SearchMessagesQuery, SendMessageRequest};
use crate::state::AppState;
use actix_web::{delete, get, post, web, HttpResponse};
use uuid::Uuid;

/// Send a message
/// POST /api/v1/messages
#[post("/messages")]
pub async fn send_message(
    state: web::Data<AppState>,
    user: User,
    body: web::Json<SendMessageRequest>,
) -> Result<HttpResponse, AppError> {
    let sent = state.messages.send_message(user.id, body.into_inner()).await?;
    Ok(HttpResponse::Created().json(sent))
}

/// Page through a conversation by sequence
/// GET /api/v1/conversations/{conversation_id}/messages?startSeq&endSeq&limit&reverse
#[get("/conversations/{conversation_id}/messages")]
pub async fn get_messages(
    state: web::Data<AppState>,
    user: User,
    path: web::Path<Uuid>,
    query: web::Query<GetMessagesQuery>,
) -> Result<HttpResponse, AppError> {
    let page = state
        .messages
        .get_messages(user.id, path.into_inner(), query.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(page))
}

/// GET /api/v1/messages/search?conversationId&keyword&contentType&limit&offset
#[get("/messages/search")]
pub async fn search_messages(
    state: web::Data<AppState>,
    user: User,
    query: web::Query<SearchMessagesQuery>,
) -> Result<HttpResponse, AppError> {
    let messages = state.messages.search(user.id, query.into_inner()).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "messages": messages })))
}

/// Recall a message within the recall window (sender only)
/// POST /api/v1/messages/{message_id}/recall
#[post("/messages/{message_id}/recall")]
pub async fn recall_message(
    state: web::Data<AppState>,
    user: User,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let message_id = path.into_inner();
    state.messages.recall_message(user.id, message_id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "messageId": message_id,
        "status": "recalled"
    })))
}

/// Soft-delete a message (sender only, idempotent)
/// DELETE /api/v1/messages/{message_id}
#[delete("/messages/{message_id}")]
pub async fn delete_message(
    state: web::Data<AppState>,
    user: User,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    state.messages.delete_message(user.id, path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}
