use crate::error::AppError;
use crate::middleware::guards::User;
use crate::models::{MarkAsReadRequest, UnreadCountQuery};
use crate::state::AppState;
use actix_web::{get, post, web, HttpResponse};
use uuid::Uuid;

/// POST /api/v1/conversations/{conversation_id}/read
#[post("/conversations/{conversation_id}/read")]
pub async fn mark_as_read(
    state: web::Data<AppState>,
    user: User,
    path: web::Path<Uuid>,
    body: web::Json<MarkAsReadRequest>,
) -> Result<HttpResponse, AppError> {
    let receipt = state
        .messages
        .mark_as_read(user.id, path.into_inner(), body.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(receipt))
}

/// GET /api/v1/conversations/{conversation_id}/unread?lastReadSeq
#[get("/conversations/{conversation_id}/unread")]
pub async fn get_unread_count(
    state: web::Data<AppState>,
    user: User,
    path: web::Path<Uuid>,
    query: web::Query<UnreadCountQuery>,
) -> Result<HttpResponse, AppError> {
    let unread = state
        .messages
        .get_unread_count(user.id, path.into_inner(), query.last_read_seq)
        .await?;
    Ok(HttpResponse::Ok().json(unread))
}

/// Read positions of every member
/// GET /api/v1/conversations/{conversation_id}/receipts
#[get("/conversations/{conversation_id}/receipts")]
pub async fn get_receipts(
    state: web::Data<AppState>,
    user: User,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let receipts = state.messages.receipts(user.id, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "receipts": receipts })))
}
