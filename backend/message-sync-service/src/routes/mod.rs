pub mod messages;
pub mod receipts;
pub mod sync;

use crate::metrics;
use actix_web::{get, web, HttpResponse};

#[get("/health")]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

/// Register every route. Authentication is applied by the caller's `JwtAuth`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health)
        .route("/metrics", web::get().to(metrics::metrics_handler))
        .service(
            web::scope("/api/v1")
                .service(messages::send_message)
                .service(messages::search_messages)
                .service(messages::get_messages)
                .service(messages::recall_message)
                .service(messages::delete_message)
                .service(receipts::mark_as_read)
                .service(receipts::get_unread_count)
                .service(receipts::get_receipts)
                .service(sync::sync_state)
                .service(sync::sync_messages),
        );
}
