use crate::error::AppError;
use actix_web::{http::StatusCode, HttpResponse};
use error_types::ErrorResponse;

pub fn map_error(err: &AppError) -> (StatusCode, ErrorResponse) {
    let kind = err.kind();
    let status =
        StatusCode::from_u16(kind.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    if kind.is_internal() {
        tracing::error!(error = %err, "request failed with internal error");
    }

    let response = ErrorResponse::from_kind(kind, &err.public_message()).with_code(err.code());
    (status, response)
}

pub fn into_response(err: &AppError) -> HttpResponse {
    let (status, response) = map_error(err);
    HttpResponse::build(status).json(response)
}
